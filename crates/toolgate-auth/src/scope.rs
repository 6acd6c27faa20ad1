//! Per-operation scope requirements
//!
//! Every registered operation declares a [`RequiredScopeSet`]. All of its
//! scopes must be granted (AND semantics); an empty set authorizes everyone
//! who is authenticated.

use std::collections::BTreeSet;

use crate::context::AuthenticatedSession;
use crate::error::AuthError;

/// Immutable set of scopes an operation demands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredScopeSet {
    scopes: BTreeSet<String>,
}

impl RequiredScopeSet {
    /// An open operation: any authenticated session is authorized
    pub fn none() -> Self {
        Self::default()
    }

    /// Require every scope in `scopes`
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    /// The required scopes, sorted
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    /// Whether no scope is required
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// True iff every required scope is granted to `session`
    pub fn authorize(&self, session: &AuthenticatedSession) -> bool {
        self.is_satisfied_by(session.scopes())
    }

    /// True iff every required scope is in `granted`
    pub fn is_satisfied_by(&self, granted: &BTreeSet<String>) -> bool {
        self.scopes.is_subset(granted)
    }

    /// Required scopes the session lacks, sorted
    pub fn missing(&self, session: &AuthenticatedSession) -> Vec<String> {
        self.scopes
            .difference(session.scopes())
            .cloned()
            .collect()
    }

    /// Authorize or fail with [`AuthError::ScopeDenied`]
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ScopeDenied`] listing the missing scopes.
    pub fn enforce(&self, session: &AuthenticatedSession) -> Result<(), AuthError> {
        let missing = self.missing(session);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthError::ScopeDenied { missing })
        }
    }
}

impl<S: Into<String>> FromIterator<S> for RequiredScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Scope gate as a free function
pub fn authorize(session: &AuthenticatedSession, required: &RequiredScopeSet) -> bool {
    required.authorize(session)
}
