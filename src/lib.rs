//! Book discovery and review client: catalog search aggregation, like state
//! and review lists over the auth/review/like backend.

pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
mod http;
pub mod likes;
pub mod model;
pub mod reviews;
pub mod search;
pub mod session;
pub mod store;

pub use error::{ApiError, Error, FieldError, Result};
