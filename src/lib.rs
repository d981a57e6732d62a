pub mod config;
pub mod data;
pub mod engines;
pub mod environment;
pub mod error;
pub mod services;
pub mod types;

pub use error::{EvolveError, Result};
