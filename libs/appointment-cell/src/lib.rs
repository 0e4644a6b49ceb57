pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

// Re-export models and services for the API binary and tests
pub use models::*;
pub use router::{appointment_routes, availability_routes, SchedulingState};
pub use services::*;
