/// Fixed agent type for the conversational expert. Lives here, not in
/// `reeflow-expert`, since that client stays domain-agnostic — other
/// domains would pass their own label.
pub const CONVERSATIONAL_AGENT_TYPE: &str = "japan";

/// History window loaded for one turn, matching
/// `reeflow_history::store::DEFAULT_RECENT_LIMIT`.
pub const TURN_HISTORY_LIMIT: usize = reeflow_history::store::DEFAULT_RECENT_LIMIT;

/// Retries attempted for a `RetryableUpstream` LLM error, on top of the
/// initial attempt.
pub const LLM_MAX_RETRIES: u32 = 2;
