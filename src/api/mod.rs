// ============================================================================
// HTTP API - actix-web handlers over the order, account and review services
// ============================================================================

pub mod error;
pub mod identity;
pub mod routes;

pub use error::ApiError;
pub use identity::Identity;
pub use routes::{configure, AppState};
