//! Tag Policy Evaluator
//!
//! Reference [`PolicyEvaluator`] driven by a JSON policy document of
//! required tags, allowed values and naming patterns.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::providers::PolicyEvaluator;
use super::types::{Severity, Violation, ViolationKind};

/// One tag every matching resource must carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredTag {
    pub name: String,
    /// Accepted values; any value is accepted when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    /// Naming rule the value must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Resource types this rule covers; empty means all
    #[serde(default)]
    pub applies_to: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
}

impl RequiredTag {
    pub fn new(name: &str, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            allowed_values: None,
            pattern: None,
            applies_to: Vec::new(),
            severity,
        }
    }

    fn applies_to(&self, resource_type: &str) -> bool {
        self.applies_to.is_empty() || self.applies_to.iter().any(|t| t == resource_type)
    }
}

/// Organizational tagging policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagPolicy {
    pub required_tags: Vec<RequiredTag>,
}

impl TagPolicy {
    /// Load a policy from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file: {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid policy file: {:?}", path))
    }
}

/// Evaluates resources against a compiled [`TagPolicy`]
pub struct TagPolicyEvaluator {
    rules: Vec<(RequiredTag, Option<Regex>)>,
}

impl TagPolicyEvaluator {
    pub fn new(policy: TagPolicy) -> Result<Self> {
        let rules = policy
            .required_tags
            .into_iter()
            .map(|rule| {
                let pattern = rule
                    .pattern
                    .as_deref()
                    .map(Regex::new)
                    .transpose()
                    .with_context(|| format!("Invalid pattern for tag {}", rule.name))?;
                Ok((rule, pattern))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Add a required tag with no value constraints
    pub fn with_tag(mut self, name: &str, severity: Severity) -> Self {
        self.rules.push((RequiredTag::new(name, severity), None));
        self
    }

    /// Check one resource's tags
    pub fn evaluate(
        &self,
        resource_id: &str,
        resource_type: &str,
        region: &str,
        tags: &BTreeMap<String, String>,
        cost_impact: f64,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (rule, pattern) in &self.rules {
            if !rule.applies_to(resource_type) {
                continue;
            }

            let current = tags.get(&rule.name);
            let kind = match current {
                None => Some(ViolationKind::MissingRequiredTag),
                Some(value) => {
                    let allowed = rule
                        .allowed_values
                        .as_ref()
                        .map(|values| values.iter().any(|v| v == value))
                        .unwrap_or(true);
                    if !allowed {
                        Some(ViolationKind::InvalidValue)
                    } else if pattern.as_ref().is_some_and(|re| !re.is_match(value)) {
                        Some(ViolationKind::InvalidFormat)
                    } else {
                        None
                    }
                }
            };

            if let Some(kind) = kind {
                violations.push(Violation {
                    resource_id: resource_id.to_string(),
                    resource_type: resource_type.to_string(),
                    region: region.to_string(),
                    violation_type: kind,
                    tag_name: rule.name.clone(),
                    severity: rule.severity,
                    current_value: current.cloned(),
                    allowed_values: rule.allowed_values.clone(),
                    cost_impact_monthly: cost_impact,
                });
            }
        }

        violations
    }
}

#[async_trait]
impl PolicyEvaluator for TagPolicyEvaluator {
    async fn validate(
        &self,
        resource_id: &str,
        resource_type: &str,
        region: &str,
        tags: &BTreeMap<String, String>,
        cost_impact: f64,
    ) -> Vec<Violation> {
        self.evaluate(resource_id, resource_type, region, tags, cost_impact)
    }
}
