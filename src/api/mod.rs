//! API endpoint modules.

pub mod health;
pub mod joins;

pub use health::configure_health_routes;
pub use joins::configure_join_routes;
