pub mod handlers;
pub mod ingestion;
pub mod routes;
pub mod state;

pub use ingestion::{IngestionOptions, IngestionStats};
pub use routes::create_router;
pub use state::AppState;
