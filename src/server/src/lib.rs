pub mod error;
pub mod http;
pub mod metrics;

// Re-export commonly used types
pub use error::ServerError;
pub use http::NodeServer;
pub use metrics::Metrics;
