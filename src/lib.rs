pub mod backend;
pub mod config;
pub mod error;
pub mod formats;
pub mod guard;
pub mod relay;
pub mod routes;
pub mod validate;
