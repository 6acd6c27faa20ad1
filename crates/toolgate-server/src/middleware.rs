//! Bearer authentication middleware
//!
//! Runs the authenticator on every request it guards. On success the
//! [`AuthenticatedSession`](toolgate_auth::AuthenticatedSession) is inserted
//! into the request extensions for handlers to extract; on failure the
//! request never reaches the handler and the challenge is answered here.
//! Tokens are validated on every request; nothing is remembered between them.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use toolgate_auth::Authenticator;

use crate::error::AuthRejection;

/// Require a valid bearer token
///
/// ```rust,no_run
/// use axum::{Router, middleware, routing::post};
/// use toolgate_auth::Authenticator;
/// use toolgate_server::middleware::require_bearer;
///
/// # fn example(auth: Authenticator) -> Router {
/// Router::new()
///     .route("/mcp", post(|| async { "ok" }))
///     .route_layer(middleware::from_fn_with_state(auth, require_bearer))
/// # }
/// ```
pub async fn require_bearer(
    State(auth): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    match auth.authenticate(request.headers()).await {
        Ok(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(rejection) => AuthRejection(rejection).into_response(),
    }
}
