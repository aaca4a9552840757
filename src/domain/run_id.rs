//! Deterministic run identifiers.
//!
//! A run_id is a content hash of the inputs that produced it — never a
//! random UUID, never wall-clock-derived — so the same command run twice
//! always yields the same id. Implemented with `sha2`, the same way this
//! codebase content-addresses anything else that needs a stable key.

use sha2::{Digest, Sha256};

/// Hashes `{command, strategy_id, mint, alert_ts, caller_name}`
/// into a stable hex run_id. Fields are joined with a separator that cannot
/// appear inside any single field's expected alphabet, so two distinct
/// tuples never collide on concatenation.
pub fn compute_run_id(
    command: &str,
    strategy_id: Option<&str>,
    mint: &str,
    alert_ts_ms: i64,
    caller_name: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());
    hasher.update(b"\0");
    hasher.update(strategy_id.unwrap_or("none").as_bytes());
    hasher.update(b"\0");
    hasher.update(mint.as_bytes());
    hasher.update(b"\0");
    hasher.update(alert_ts_ms.to_le_bytes());
    hasher.update(b"\0");
    hasher.update(caller_name.unwrap_or("none").as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_yield_same_run_id() {
        let a = compute_run_id("optimize", Some("s1"), "mint1", 1000, Some("alpha"));
        let b = compute_run_id("optimize", Some("s1"), "mint1", 1000, Some("alpha"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_yield_different_run_ids() {
        let a = compute_run_id("optimize", Some("s1"), "mint1", 1000, Some("alpha"));
        let b = compute_run_id("optimize", Some("s1"), "mint2", 1000, Some("alpha"));
        assert_ne!(a, b);
    }

    #[test]
    fn missing_optional_fields_are_stable() {
        let a = compute_run_id("replay", None, "mint1", 1000, None);
        let b = compute_run_id("replay", None, "mint1", 1000, None);
        assert_eq!(a, b);
    }
}
