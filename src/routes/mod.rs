//! HTTP route handlers

pub mod api;
pub mod health;

pub use api::handle_api_request;
pub use health::{health_check, version_info};
