use codegraph_core::{CodeGraphError, Result};

use crate::session::WorkspaceSession;

/// Result of a passed readiness check: whether the caller should degrade to
/// lexical-only retrieval, and why (§4.9).
#[derive(Debug, Clone, Default)]
pub struct ReadinessOutcome {
    pub degraded: bool,
    pub hint: Option<String>,
}

/// Precondition check run before every analysis operation (§4.9). Graph
/// freshness is a hard gate (`NOT_READY` unless `stale_ok`); missing vector
/// coverage is a soft degrade to lexical-only retrieval, never a refusal.
pub fn check_readiness(session: &WorkspaceSession, needs_vector: bool, stale_ok: bool) -> Result<ReadinessOutcome> {
    if !stale_ok {
        if let Some(rebuild_id) = session.rebuilder.pending_rebuild_id() {
            return Err(CodeGraphError::NotReady(format!("rebuild {rebuild_id} in progress")));
        }
    }

    if needs_vector && session.vector.coverage(&session.index) <= 0.0 {
        return Ok(ReadinessOutcome {
            degraded: true,
            hint: Some("embedding coverage is zero; degrading to lexical-only retrieval".into()),
        });
    }

    Ok(ReadinessOutcome::default())
}
