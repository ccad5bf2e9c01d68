pub mod auth;
pub mod request_log;

pub use auth::RequireKeyAuth;
pub use request_log::log_request;
