//! Simulated application of schema change proposals.
//!
//! Nothing here touches a real schema file. A plan lists the actions an
//! application would take and is stamped with a digest of the proposal content.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{ActionKind, ProposalStatus, SchemaChangeProposal, SimulatedAction};

/// Outcome of `apply`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub proposal_id: String,
    pub success: bool,
    pub status: ProposalStatus,
    pub simulated_actions: Vec<SimulatedAction>,
    /// SHA-256 of the proposal content, hex encoded
    pub digest: String,
    pub error: Option<String>,
}

/// Hex SHA-256 over the fields that define a proposal's content
pub fn content_digest(proposal: &SchemaChangeProposal) -> String {
    let mut hasher = Sha256::new();
    for field in [
        proposal.target_schema.as_str(),
        proposal.description.as_str(),
        proposal.justification.as_str(),
    ] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Snapshot, write and revert steps for a proposal
pub fn plan_actions(proposal: &SchemaChangeProposal, digest: &str) -> Vec<SimulatedAction> {
    let target = proposal.target_schema.clone();
    let snapshot = format!("{}.snapshot-{}", target, &digest[..digest.len().min(12)]);
    vec![
        SimulatedAction {
            kind: ActionKind::Snapshot,
            target: target.clone(),
            detail: format!("copy current schema to {}", snapshot),
        },
        SimulatedAction {
            kind: ActionKind::Write,
            target: target.clone(),
            detail: proposal.description.clone(),
        },
        SimulatedAction {
            kind: ActionKind::Revert,
            target,
            detail: format!("restore from {} if the write is rolled back", snapshot),
        },
    ]
}

/// Whether `target` is in the schema catalog. An empty catalog admits anything.
pub fn is_known_schema(known_schemas: &[String], target: &str) -> bool {
    if known_schemas.is_empty() {
        return true;
    }
    known_schemas.iter().any(|pattern| match glob::Pattern::new(pattern) {
        Ok(p) => p.matches(target),
        Err(e) => {
            log::warn!("Ignoring invalid schema pattern '{}': {}", pattern, e);
            false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal() -> SchemaChangeProposal {
        SchemaChangeProposal::new("schemas/loop_summary.json", "add field cost_breakdown", "dashboards need it", None)
    }

    #[test]
    fn test_digest_is_stable_and_content_sensitive() {
        let p = proposal();
        let digest = content_digest(&p);
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, content_digest(&p.clone()));

        let mut other = p.clone();
        other.description = "drop field cost_breakdown".to_string();
        assert_ne!(digest, content_digest(&other));
    }

    #[test]
    fn test_plan_has_snapshot_write_revert() {
        let p = proposal();
        let actions = plan_actions(&p, &content_digest(&p));
        let kinds: Vec<ActionKind> = actions.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::Snapshot, ActionKind::Write, ActionKind::Revert]);
        assert!(actions.iter().all(|a| a.target == "schemas/loop_summary.json"));
    }

    #[test]
    fn test_known_schema_patterns() {
        assert!(is_known_schema(&[], "anything"));
        let catalog = vec!["schemas/*.json".to_string()];
        assert!(is_known_schema(&catalog, "schemas/loop_summary.json"));
        assert!(!is_known_schema(&catalog, "config/app.yml"));
        assert!(!is_known_schema(&["[".to_string()], "["));
    }
}
