//! Cache TTL per operation class.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::TtlPolicyConfig;

#[derive(Debug, Clone)]
pub struct TtlPolicy {
    default: Duration,
    operations: HashMap<String, Duration>,
}

impl TtlPolicy {
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            operations: HashMap::new(),
        }
    }

    pub fn from_config(config: &TtlPolicyConfig) -> Self {
        Self {
            default: Duration::from_secs(config.default_secs),
            operations: config
                .operations
                .iter()
                .map(|(name, secs)| (name.clone(), Duration::from_secs(*secs)))
                .collect(),
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>, ttl: Duration) -> Self {
        self.operations.insert(operation.into(), ttl);
        self
    }

    pub fn ttl_for(&self, operation: &str) -> Duration {
        self.operations.get(operation).copied().unwrap_or(self.default)
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&TtlPolicyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.ttl_for("api_test"), Duration::from_secs(300));
        assert_eq!(policy.ttl_for("github_analysis"), Duration::from_secs(3600));
        assert_eq!(policy.ttl_for("anything_else"), Duration::from_secs(300));
    }

    #[test]
    fn test_override() {
        let policy = TtlPolicy::new(Duration::from_secs(1)).with_operation("slow", Duration::from_secs(90));
        assert_eq!(policy.ttl_for("slow"), Duration::from_secs(90));
        assert_eq!(policy.ttl_for("fast"), Duration::from_secs(1));
    }
}
