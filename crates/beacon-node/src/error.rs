//! Error types for the replica binary.
//!
//! [`NodeError`] wraps every failure mode during startup and serving so that
//! `main` can propagate with `?`.

/// Top-level error for the replica binary.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// The peer HTTP client could not be built.
    #[error("http client error: {source}")]
    HttpClient {
        /// The underlying client builder error.
        #[from]
        source: reqwest::Error,
    },

    /// The HTTP server failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: beacon_server::ServerError,
    },

    /// Logging could not be initialized.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the logging failure.
        message: String,
    },
}
