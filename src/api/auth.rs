use std::collections::HashMap;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::api::{responses::ApiError, AppState};
use crate::config::AdminCredential;
use crate::domain::{
    error::IngestionError,
    models::{AdminSession, Role},
    ports::Authenticator,
};

/// Bearer tokens from configuration, standing in for an external session issuer.
pub struct StaticTokenAuthenticator {
    sessions: HashMap<String, AdminSession>,
}

impl StaticTokenAuthenticator {
    pub fn new(credentials: &[AdminCredential]) -> Self {
        debug!("Initializing token authenticator with {} credential(s)", credentials.len());
        let sessions = credentials
            .iter()
            .map(|c| {
                (
                    c.token.clone(),
                    AdminSession {
                        admin_id: c.admin_id,
                        role: c.role,
                    },
                )
            })
            .collect();
        Self { sessions }
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, bearer_token: &str) -> Option<AdminSession> {
        self.sessions.get(bearer_token).cloned()
    }
}

/// Rejects the request with 401 before its body is read unless the bearer
/// token belongs to an admin. The session is handed on as an extension.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| state.authenticator.authenticate(token.trim()));

    match session {
        Some(session) if session.role == Role::Admin => {
            debug!("Authorized admin {} for {}", session.admin_id, request.uri().path());
            request.extensions_mut().insert(session);
            Ok(next.run(request).await)
        }
        Some(session) => {
            warn!("Non-admin {} tried {}", session.admin_id, request.uri().path());
            Err(ApiError(IngestionError::Unauthorized))
        }
        None => {
            warn!("Missing or unknown bearer token for {}", request.uri().path());
            Err(ApiError(IngestionError::Unauthorized))
        }
    }
}
