use reeflow_history::{LlmMessage as HistoryMessage, Role as HistoryRole};
use reeflow_llm::{Message as LlmMessage, Role as LlmRole};

/// Map a history-store role onto the LLM client's own role type — two
/// independent enums with identical variants, converted here rather than
/// shared, since `reeflow-llm` stays free of a storage dependency.
fn map_role(role: HistoryRole) -> LlmRole {
    match role {
        HistoryRole::User => LlmRole::User,
        HistoryRole::Assistant => LlmRole::Assistant,
        HistoryRole::System => LlmRole::System,
    }
}

pub fn to_llm_messages(history: &[HistoryMessage]) -> Vec<LlmMessage> {
    history
        .iter()
        .map(|m| LlmMessage {
            role: map_role(m.role),
            content: m.content.clone(),
        })
        .collect()
}
