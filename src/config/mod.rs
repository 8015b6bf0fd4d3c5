//! Configuration for cogctl.
//!
//! Search order:
//! 1. Explicit path if provided
//! 2. .cogctl.yml in current directory (project config)
//! 3. ~/.config/cogctl/cogctl.yml (user config)
//! 4. Default values

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::controller::{ControllerSettings, RosterPolicy};
use crate::cost::CostTable;
use crate::gate::GatePolicy;
use crate::governor::GovernorPolicy;
use crate::ledger::BudgetPolicy;
use crate::registry::AgentProfile;
use crate::validation::ValidationPolicy;

/// Project config file name
pub const PROJECT_CONFIG: &str = ".cogctl.yml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CogctlConfig {
    /// Initial complexity budget allotments.
    pub budget: BudgetPolicy,

    /// Budget gate override wait.
    pub gate: GatePolicy,

    /// Summary acceptance thresholds.
    pub validation: ValidationPolicy,

    /// Schema catalog and decision timeout.
    pub governor: GovernorPolicy,

    /// Agents run per archetype.
    pub roster: RosterPolicy,

    /// Per-agent execution costs.
    pub costs: CostTable,

    /// Static agent profiles for dry runs, keyed by agent key.
    pub agents: HashMap<String, AgentProfile>,

    /// Where the JSONL collections live.
    pub storage: StorageConfig,
}

/// Storage settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("cogctl"),
        }
    }
}

impl CogctlConfig {
    /// Load configuration with fallback chain.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path takes precedence
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(PROJECT_CONFIG);
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from {}", PROJECT_CONFIG);
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load {}: {}", PROJECT_CONFIG, e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("cogctl").join("cogctl.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.budget.global < 0 {
            eyre::bail!("budget.global must be >= 0");
        }
        if self.budget.default_archetype_allotment < 0 || self.budget.default_domain_allotment < 0 {
            eyre::bail!("budget default allotments must be >= 0");
        }
        if let Some((archetype, _)) = self.budget.per_archetype.iter().find(|(_, v)| **v < 0) {
            eyre::bail!("budget.per-archetype.{} must be >= 0", archetype);
        }
        if let Some((domain, _)) = self.budget.per_domain.iter().find(|(_, v)| **v < 0) {
            eyre::bail!("budget.per-domain.{} must be >= 0", domain);
        }
        if !(0.0..=1.0).contains(&self.validation.min_trust_score) {
            eyre::bail!("validation.min-trust-score must be within 0.0..=1.0");
        }
        if !(0.0..=1.0).contains(&self.validation.max_drift_score) {
            eyre::bail!("validation.max-drift-score must be within 0.0..=1.0");
        }
        if self.gate.override_timeout_ms == 0 {
            eyre::bail!("gate.override-timeout-ms must be > 0");
        }
        if self.governor.decision_timeout_ms == 0 {
            eyre::bail!("governor.decision-timeout-ms must be > 0");
        }
        for pattern in &self.governor.known_schemas {
            glob::Pattern::new(pattern).with_context(|| format!("governor.known-schemas: invalid pattern '{}'", pattern))?;
        }
        if self.roster.default.is_empty() {
            eyre::bail!("roster.default must list at least one agent");
        }
        Ok(())
    }

    /// Policies the loop controller runs with
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            gate: self.gate.clone(),
            validation: self.validation.clone(),
            roster: self.roster.clone(),
            costs: self.costs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Archetype;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CogctlConfig::default();
        assert_eq!(config.budget.global, 1000);
        assert_eq!(config.gate.override_timeout_ms, 30_000);
        assert_eq!(config.validation.required_validators, vec!["critic".to_string()]);
        assert!(config.governor.known_schemas.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = CogctlConfig::default();
        config.validation.min_trust_score = 1.5;
        assert!(config.validate().is_err());

        let mut config = CogctlConfig::default();
        config.budget.per_domain.insert("coding".to_string(), -1);
        assert!(config.validate().is_err());

        let mut config = CogctlConfig::default();
        config.governor.known_schemas = vec!["[".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
budget:
  global: 2000
  per-archetype:
    implement: 800
  per-domain:
    coding: 300
gate:
  override-timeout-ms: 5000
validation:
  min-trust-score: 0.75
  required-validators: [critic, auditor]
governor:
  known-schemas: ["schemas/*.json"]
roster:
  per-archetype:
    explore: [researcher]
costs:
  default-agent-cost: 2
  per-agent:
    executor: 10
agents:
  critic:
    trust-score: 0.9
storage:
  data-dir: /tmp/cogctl
"#;
        let config: CogctlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.budget.global, 2000);
        assert_eq!(config.budget.per_archetype.get(&Archetype::Implement), Some(&800));
        assert_eq!(config.budget.default_domain_allotment, 500);
        assert_eq!(config.gate.override_timeout_ms, 5000);
        assert_eq!(config.validation.min_trust_score, 0.75);
        assert_eq!(config.validation.max_drift_score, 1.0);
        assert_eq!(config.validation.required_validators.len(), 2);
        assert_eq!(config.roster.agents_for(Archetype::Explore), ["researcher".to_string()]);
        assert_eq!(config.costs.cost_of("executor"), 10);
        assert_eq!(config.costs.cost_of("planner"), 2);
        assert_eq!(config.agents["critic"].trust_score, 0.9);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/cogctl"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cogctl.yml");
        fs::write(&path, "budget:\n  global: 42\n").unwrap();

        let config = CogctlConfig::load(Some(&path)).unwrap();
        assert_eq!(config.budget.global, 42);
    }

    #[test]
    fn test_load_explicit_path_missing() {
        let path = PathBuf::from("/nonexistent/cogctl.yml");
        assert!(CogctlConfig::load(Some(&path)).is_err());
    }
}
