//! wsfs Core Application Logic
//!
//! This crate contains:
//! - Application state management
//! - Configuration
//! - Error types

pub mod state;
pub mod config;
pub mod error;

pub use state::AppState;
pub use config::{AppConfig, FilesConfig, GeneralConfig, WatcherConfig};
pub use error::AppError;
