//! BildOut API Library
//!
//! This crate contains the API server components for BildOut.

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
