pub mod backoff;
pub mod client;
pub mod error;
pub mod http;
pub mod types;

pub use backoff::backoff_delay;
pub use client::{ChunkSink, LlmClient};
pub use error::LlmError;
pub use http::HttpLlmClient;
pub use types::{LlmCallResult, LlmConfig, LlmUsage, Message, Role};
