//! Action Grammar
//!
//! Turns a decision object into a zero-based option index. The grammar is
//! the same for both decode paths: the literal `stop`, or `Waypoint_<N>`.
//! The last option slot is reserved for the stop action, so `stop` resolves
//! to `candidate_count - 1`.

use tracing::debug;

use crate::types::NavDecision;

/// Prefix of a waypoint selection in the model's answer.
const WAYPOINT_PREFIX: &str = "Waypoint_";

/// Extract the chosen option index from a decision.
///
/// `stop` resolves to the reserved last slot (`candidate_count - 1`).
/// `Waypoint_<N>` resolves to `N`. Anything else - a missing action field,
/// a malformed suffix - yields `None`, which is recoverable: the caller
/// substitutes its fallback action (stop).
pub fn extract_waypoint_number(decision: &NavDecision, candidate_count: usize) -> Option<usize> {
    let action = decision.action.as_deref().unwrap_or("");

    if action == "stop" {
        return candidate_count.checked_sub(1);
    }

    if action.starts_with(WAYPOINT_PREFIX) {
        return action.split('_').nth(1).and_then(|n| n.parse().ok());
    }

    debug!(action, "answer does not match the action grammar");
    None
}
