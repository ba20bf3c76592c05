//! Configuration, paths, logging, and shared error types for the FxA sample.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_CLIENT_ID, DEFAULT_CONTENT_URL, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_LOG_LEVEL,
    DEFAULT_PAIRING_CONTENT_URL, DEFAULT_REDIRECT_URI,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, LogFormat};
pub use paths::Paths;
