pub mod intent;
pub mod query_rewrite;
pub mod routing;
pub mod synthesis;

pub use intent::{IntentInput, IntentStage};
pub use query_rewrite::{QueryRewriteInput, QueryRewriteStage};
pub use routing::{RoutingInput, RoutingStage};
pub use synthesis::SynthesisStage;
