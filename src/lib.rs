pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod rut;
pub mod service;
pub mod types;
pub mod validators;

pub use config::Config;
pub use db::Database;
pub use error::EntregasError;
