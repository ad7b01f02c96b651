pub mod auth;
pub mod config;
pub mod error;
pub mod external;
pub mod models;
pub mod openapi;
pub mod proxy;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod routes;
pub mod security;
pub mod slug;
pub mod upload;

// Re-export commonly used items for tests / external users
pub use routes::{config as routes_config, AppState};
pub use security::SecurityHeaders;
