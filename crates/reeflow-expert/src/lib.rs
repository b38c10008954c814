pub mod client;
pub mod error;
pub mod http;
pub mod sse;
pub mod types;

pub use client::{ChunkSink, ExpertClient};
pub use error::ExpertError;
pub use http::HttpExpertClient;
pub use types::{ExpertResult, ExpertSettings};
