use async_trait::async_trait;
use reeflow_llm::{LlmClient, LlmConfig, LlmUsage};

use crate::error::Result;

/// Shared capability every LLM-backed pipeline stage implements.
///
/// Each stage is a distinct struct implementing this for its own `In`/`Out`
/// pair — there is no shared base class or runtime class hierarchy.
#[async_trait]
pub trait Stage<In, Out>: Send + Sync {
    async fn run(&self, input: In, llm: &dyn LlmClient, config: &LlmConfig) -> Result<(Out, LlmUsage)>;

    /// The exact system prompt text this stage sends to the LLM, colocated
    /// with the stage so tests can assert on prompt content without parsing
    /// the LLM call site.
    fn prompt(&self) -> &str;
}
