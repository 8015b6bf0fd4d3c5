//! Error types for cogctl
//!
//! Centralized error handling using thiserror. Normal gating outcomes
//! (proceed/escalate/reject, accepted/rejected/pending review) are result
//! variants on their own types, not errors.

use thiserror::Error;

/// All error types that can occur in cogctl
#[derive(Debug, Error)]
pub enum CogctlError {
    /// Agent key could not be resolved from the registry
    #[error("Agent not found in registry: {0}")]
    AgentResolution(String),

    /// A spend was attempted that the ledger cannot cover
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// A budget scope was found in a corrupt state and refuses spends
    #[error("Ledger halted for scope {0}; manual reconciliation required")]
    LedgerHalted(String),

    /// Loop summary was rejected by the validator
    #[error("Summary rejected: {0}")]
    SummaryRejected(String),

    /// Schema change proposal was rejected by an operator
    #[error("Proposal rejected: {0}")]
    ProposalRejected(String),

    /// Schema change proposal not found in storage
    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    /// Invalid state transition or operation
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// An agent failed while running
    #[error("Agent error: {0}")]
    Agent(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for cogctl operations
pub type Result<T> = std::result::Result<T, CogctlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_resolution_error() {
        let err = CogctlError::AgentResolution("critic".to_string());
        assert_eq!(err.to_string(), "Agent not found in registry: critic");
    }

    #[test]
    fn test_budget_exceeded_error() {
        let err = CogctlError::BudgetExceeded("global needs 50, has 10".to_string());
        assert_eq!(err.to_string(), "Budget exceeded: global needs 50, has 10");
    }

    #[test]
    fn test_ledger_halted_error() {
        let err = CogctlError::LedgerHalted("domain:coding".to_string());
        assert_eq!(
            err.to_string(),
            "Ledger halted for scope domain:coding; manual reconciliation required"
        );
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = CogctlError::InvalidTransition("applied_simulated -> approved".to_string());
        assert_eq!(err.to_string(), "Invalid transition: applied_simulated -> approved");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CogctlError = io_err.into();
        assert!(matches!(err, CogctlError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: CogctlError = json_err.into();
        assert!(matches!(err, CogctlError::Json(_)));
    }
}
