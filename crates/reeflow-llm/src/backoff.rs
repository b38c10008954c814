use std::time::Duration;

/// Base delay for the first retry.
pub const BACKOFF_BASE_MS: u64 = 250;
/// Multiplier applied per additional attempt.
pub const BACKOFF_FACTOR: u64 = 2;

/// Exponential backoff with no jitter: `attempt=0` → 250ms, `1` → 500ms, …
///
/// Shared by `reeflow-llm` and `reeflow-expert` call sites (the orchestrator
/// owns the retry loop; this is just the delay schedule), grounded on
/// `skynet_channels::manager`'s doubling-with-cap shape, minus the jitter:
/// the retry schedule here is an exact base/factor with no jitter term.
pub fn backoff_delay(attempt: u32) -> Duration {
    let millis = BACKOFF_BASE_MS.saturating_mul(BACKOFF_FACTOR.saturating_pow(attempt));
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_is_base_delay() {
        assert_eq!(backoff_delay(0), Duration::from_millis(250));
    }

    #[test]
    fn delay_doubles_each_attempt() {
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_millis(1000));
    }
}
