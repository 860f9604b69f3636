//! Application state shared across all handlers.

use qr_router::Router;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(router: Router) -> Self {
        Self::from_shared(Arc::new(router))
    }

    pub fn from_shared(router: Arc<Router>) -> Self {
        Self { router, start_time: Instant::now() }
    }
}
