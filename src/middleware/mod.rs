pub mod auth;

// Re-export middleware functions
pub use auth::{AuthContext, auth_middleware};
