//! Loop intent: what the caller wants a loop to do, submitted before it starts.

use serde::{Deserialize, Serialize};

use crate::id::generate_loop_id;

/// A loop's stated intent. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopIntent {
    loop_id: String,
    description: String,
    declared_domain: String,
    estimated_cost: u64,
}

impl LoopIntent {
    /// Create an intent with a freshly generated loop id
    pub fn new(description: impl Into<String>, declared_domain: impl Into<String>, estimated_cost: u64) -> Self {
        Self::with_id(generate_loop_id(), description, declared_domain, estimated_cost)
    }

    /// Create an intent for a caller-chosen loop id
    pub fn with_id(
        loop_id: impl Into<String>,
        description: impl Into<String>,
        declared_domain: impl Into<String>,
        estimated_cost: u64,
    ) -> Self {
        Self {
            loop_id: loop_id.into(),
            description: description.into(),
            declared_domain: declared_domain.into(),
            estimated_cost,
        }
    }

    pub fn loop_id(&self) -> &str {
        &self.loop_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn declared_domain(&self) -> &str {
        &self.declared_domain
    }

    pub fn estimated_cost(&self) -> u64 {
        self.estimated_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_generates_loop_id() {
        let intent = LoopIntent::new("implement feature X", "coding", 10);
        assert!(intent.loop_id().starts_with("loop-"));
        assert_eq!(intent.description(), "implement feature X");
        assert_eq!(intent.declared_domain(), "coding");
        assert_eq!(intent.estimated_cost(), 10);
    }

    #[test]
    fn test_with_id_keeps_caller_id() {
        let intent = LoopIntent::with_id("L-7", "explore caching", "infra", 3);
        assert_eq!(intent.loop_id(), "L-7");
    }
}
