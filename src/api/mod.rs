pub mod auth;
pub mod responses;
pub mod routes;

use std::sync::Arc;

use crate::application::ingestion_service::IngestionService;
use crate::domain::ports::Authenticator;

pub use routes::router;

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IngestionService>,
    pub authenticator: Arc<dyn Authenticator>,
    /// Request body ceiling; leaves room for the multipart envelope around a file.
    pub body_limit: usize,
}
