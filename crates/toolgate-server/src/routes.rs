//! HTTP routes
//!
//! | Method | Path | Auth |
//! |---|---|---|
//! | `GET` | `/.well-known/oauth-protected-resource` | none |
//! | `GET` | `/.well-known/oauth-authorization-server` | none |
//! | `POST` | `/mcp` | bearer token |

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware};
use toolgate_auth::{
    AUTHORIZATION_SERVER_METADATA_PATH, AuthenticatedSession, Authenticator,
    AuthorizationServerMetadata, PROTECTED_RESOURCE_METADATA_PATH, ProtectedResourceMetadata,
    Rejection,
};
use tracing::debug;

use crate::error::AuthRejection;
use crate::jsonrpc::{JSONRPC_VERSION, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::middleware::require_bearer;
use crate::tools::ToolRegistry;

/// Path of the tool endpoint
pub const MCP_PATH: &str = "/mcp";

/// Shared state for all routes
#[derive(Debug, Clone)]
pub struct AppState {
    auth: Authenticator,
    tools: Arc<ToolRegistry>,
    resource_metadata: Arc<ProtectedResourceMetadata>,
    server_metadata: Arc<AuthorizationServerMetadata>,
}

impl AppState {
    /// Build state; the discovery documents are computed once here
    pub fn new(auth: Authenticator, tools: ToolRegistry) -> Self {
        let resource_metadata = ProtectedResourceMetadata::from_config(auth.config());
        let server_metadata = AuthorizationServerMetadata::from_config(auth.config());
        Self {
            auth,
            tools: Arc::new(tools),
            resource_metadata: Arc::new(resource_metadata),
            server_metadata: Arc::new(server_metadata),
        }
    }

    /// The authenticator guarding `/mcp`
    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(MCP_PATH, post(handle_mcp))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_bearer,
        ));

    Router::new()
        .route(
            PROTECTED_RESOURCE_METADATA_PATH,
            get(serve_protected_resource_metadata),
        )
        .route(
            AUTHORIZATION_SERVER_METADATA_PATH,
            get(serve_authorization_server_metadata),
        )
        .merge(protected)
        .with_state(state)
}

async fn serve_protected_resource_metadata(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.resource_metadata.as_ref().clone())
}

async fn serve_authorization_server_metadata(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.server_metadata.as_ref().clone())
}

/// JSON-RPC tool endpoint
///
/// Protocol errors are answered with HTTP 200 and a JSON-RPC error; a scope
/// denial is answered with 403.
async fn handle_mcp(
    State(state): State<AppState>,
    Extension(session): Extension<AuthenticatedSession>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Unparseable JSON-RPC body");
            return Json(JsonRpcResponse::error(None, JsonRpcError::parse_error())).into_response();
        }
    };

    if request.jsonrpc != JSONRPC_VERSION {
        let error = JsonRpcError::invalid_request("jsonrpc must be \"2.0\"");
        return Json(JsonRpcResponse::error(request.id, error)).into_response();
    }

    match state.tools.dispatch(&session, request) {
        Ok(response) => Json(response).into_response(),
        Err(error) => {
            let base_url = state.auth.base_url(&headers);
            AuthRejection(Rejection::new(error, base_url)).into_response()
        }
    }
}
