//! Process-wide, read-only registry of limit rules.

use std::collections::HashMap;

use super::{LimitRule, RuleConfig, RuleError, ScopeKind};

/// Resolves which rule applies to a scope.
///
/// Built once at startup; construction fails on the first invalid or
/// conflicting rule so a misconfigured process never starts serving.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    defaults: HashMap<ScopeKind, LimitRule>,
    endpoints: HashMap<String, LimitRule>,
}

impl RuleRegistry {
    /// Builds a registry from already-validated rules.
    pub fn new(rules: impl IntoIterator<Item = LimitRule>) -> Result<Self, RuleError> {
        let mut registry = Self::default();
        for rule in rules {
            registry.insert(rule)?;
        }
        Ok(registry)
    }

    /// Builds a registry from raw configuration entries.
    pub fn from_config(entries: &[RuleConfig]) -> Result<Self, RuleError> {
        let rules = entries
            .iter()
            .cloned()
            .map(RuleConfig::into_rule)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rules)
    }

    fn insert(&mut self, rule: LimitRule) -> Result<(), RuleError> {
        match rule.path_override() {
            Some(path) => {
                if self.endpoints.contains_key(path) {
                    return Err(RuleError::Duplicate {
                        scope: rule.scope(),
                        path: Some(path.to_string()),
                    });
                }
                self.endpoints.insert(path.to_string(), rule);
            }
            None => {
                if self.defaults.contains_key(&rule.scope()) {
                    return Err(RuleError::Duplicate {
                        scope: rule.scope(),
                        path: None,
                    });
                }
                self.defaults.insert(rule.scope(), rule);
            }
        }
        Ok(())
    }

    /// Looks up the rule for a scope kind and request path.
    ///
    /// Resolution order: exact path match (per-endpoint only), then the
    /// default rule for the kind, then nothing (the scope is skipped).
    pub fn lookup(&self, kind: ScopeKind, path: &str) -> Option<&LimitRule> {
        if kind == ScopeKind::PerEndpoint {
            if let Some(rule) = self.endpoints.get(path) {
                return Some(rule);
            }
        }
        self.defaults.get(&kind)
    }

    /// Number of configured rules.
    pub fn len(&self) -> usize {
        self.defaults.len() + self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(kind: ScopeKind, max: u32, window: u32) -> LimitRule {
        LimitRule::new(kind, max, window).unwrap()
    }

    fn registry() -> RuleRegistry {
        RuleRegistry::new(vec![
            rule(ScopeKind::Global, 1000, 60),
            rule(ScopeKind::PerClient, 100, 60),
            rule(ScopeKind::PerEndpoint, 5, 300)
                .for_path("/api/v1/auth/login")
                .unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn exact_path_match_wins_for_endpoint_scope() {
        let registry = registry();
        let found = registry
            .lookup(ScopeKind::PerEndpoint, "/api/v1/auth/login")
            .unwrap();
        assert_eq!(found.max_requests(), 5);
    }

    #[test]
    fn unmatched_endpoint_without_default_is_skipped() {
        let registry = registry();
        assert!(registry.lookup(ScopeKind::PerEndpoint, "/api/v1/articles").is_none());
    }

    #[test]
    fn endpoint_default_applies_when_no_exact_match() {
        let registry = RuleRegistry::new(vec![
            rule(ScopeKind::PerEndpoint, 50, 60),
            rule(ScopeKind::PerEndpoint, 5, 300).for_path("/login").unwrap(),
        ])
        .unwrap();

        assert_eq!(registry.lookup(ScopeKind::PerEndpoint, "/other").unwrap().max_requests(), 50);
        assert_eq!(registry.lookup(ScopeKind::PerEndpoint, "/login").unwrap().max_requests(), 5);
    }

    #[test]
    fn non_endpoint_scopes_ignore_path() {
        let registry = registry();
        let found = registry.lookup(ScopeKind::PerClient, "/api/v1/auth/login").unwrap();
        assert_eq!(found.max_requests(), 100);
        assert!(registry.lookup(ScopeKind::PerUser, "/").is_none());
    }

    #[test]
    fn duplicate_default_rules_are_rejected() {
        let result = RuleRegistry::new(vec![
            rule(ScopeKind::Global, 10, 60),
            rule(ScopeKind::Global, 20, 60),
        ]);
        assert!(matches!(result, Err(RuleError::Duplicate { path: None, .. })));
    }

    #[test]
    fn duplicate_path_overrides_are_rejected() {
        let result = RuleRegistry::new(vec![
            rule(ScopeKind::PerEndpoint, 10, 60).for_path("/x").unwrap(),
            rule(ScopeKind::PerEndpoint, 20, 60).for_path("/x").unwrap(),
        ]);
        assert!(matches!(result, Err(RuleError::Duplicate { path: Some(_), .. })));
    }

    #[test]
    fn from_config_fails_closed_on_zero_window() {
        let entries = vec![
            RuleConfig {
                scope: ScopeKind::Global,
                max_requests: 100,
                window_seconds: 60,
                burst_allowance: None,
                path_override: None,
            },
            RuleConfig {
                scope: ScopeKind::PerClient,
                max_requests: 10,
                window_seconds: 0,
                burst_allowance: None,
                path_override: None,
            },
        ];
        let err = RuleRegistry::from_config(&entries).unwrap_err();
        assert_eq!(err, RuleError::ZeroWindow { scope: ScopeKind::PerClient });
    }

    #[test]
    fn len_counts_defaults_and_overrides() {
        assert_eq!(registry().len(), 3);
        assert!(RuleRegistry::default().is_empty());
    }
}
