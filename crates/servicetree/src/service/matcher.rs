//! Rule condition evaluation.
//!
//! Rules are compiled once per evaluation pass: field names are parsed into
//! [`FieldPath`]s, regexes are compiled and `in`/`not_in` value lists are
//! split up front. A [`RuleSet`] then matches instances against the compiled
//! rules in priority order, stopping at the first rule whose conditions all
//! match.

use regex::Regex;
use tracing::warn;

use crate::types::{BindingRule, FieldPath, Instance, Operator, RuleCondition};

#[derive(Debug, Clone)]
enum Predicate {
    Equals(String),
    NotEquals(String),
    Contains(String),
    /// `None` when the pattern did not compile; such a condition never
    /// matches.
    Regex(Option<Regex>),
    In(Vec<String>),
    NotIn(Vec<String>),
    Exists,
}

/// A condition ready to be evaluated.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    field: FieldPath,
    predicate: Predicate,
}

impl CompiledCondition {
    /// Compiles a condition.
    ///
    /// An invalid regex is logged and yields a condition that never matches.
    pub fn compile(condition: &RuleCondition) -> Self {
        let value = condition.value.as_str();
        let predicate = match condition.operator {
            Operator::Equals => Predicate::Equals(value.to_string()),
            Operator::NotEquals => Predicate::NotEquals(value.to_string()),
            Operator::Contains => Predicate::Contains(value.to_string()),
            Operator::Regex => match Regex::new(value) {
                Ok(re) => Predicate::Regex(Some(re)),
                Err(e) => {
                    warn!(
                        field = %condition.field,
                        pattern = %value,
                        error = %e,
                        "Invalid regex in rule condition"
                    );
                    Predicate::Regex(None)
                }
            },
            Operator::In => Predicate::In(split_values(value)),
            Operator::NotIn => Predicate::NotIn(split_values(value)),
            Operator::Exists => Predicate::Exists,
        };

        Self {
            field: FieldPath::parse(&condition.field),
            predicate,
        }
    }

    /// Evaluates the condition against an instance.
    pub fn matches(&self, instance: &Instance) -> bool {
        let actual = instance.field_value(&self.field);
        match &self.predicate {
            Predicate::Equals(expected) => actual == expected,
            Predicate::NotEquals(expected) => actual != expected,
            Predicate::Contains(expected) => actual.contains(expected.as_str()),
            Predicate::Regex(re) => re.as_ref().is_some_and(|re| re.is_match(actual)),
            Predicate::In(values) => values.iter().any(|v| v == actual),
            Predicate::NotIn(values) => !values.iter().any(|v| v == actual),
            Predicate::Exists => !actual.is_empty(),
        }
    }
}

fn split_values(value: &str) -> Vec<String> {
    value.split(',').map(|v| v.trim().to_string()).collect()
}

/// A rule with its conditions compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: BindingRule,
    conditions: Vec<CompiledCondition>,
}

impl CompiledRule {
    /// Compiles every condition of a rule.
    pub fn compile(rule: BindingRule) -> Self {
        let conditions = rule
            .conditions
            .iter()
            .map(CompiledCondition::compile)
            .collect();
        Self { rule, conditions }
    }

    /// The underlying rule.
    pub fn rule(&self) -> &BindingRule {
        &self.rule
    }

    /// Returns `true` if every condition matches.
    ///
    /// A rule without conditions never matches.
    pub fn matches(&self, instance: &Instance) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(|c| c.matches(instance))
    }
}

/// Enabled rules of a tenant, compiled and kept in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compiles `rules`, sorting them by `(priority, id)`.
    ///
    /// Disabled rules are dropped.
    pub fn compile(mut rules: Vec<BindingRule>) -> Self {
        rules.retain(|r| r.enabled);
        rules.sort_by_key(|r| (r.priority, r.id));
        Self {
            rules: rules.into_iter().map(CompiledRule::compile).collect(),
        }
    }

    /// Number of rules in the set.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if the set holds no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the highest-priority rule matching the instance.
    pub fn first_match(&self, instance: &Instance) -> Option<&BindingRule> {
        self.rules
            .iter()
            .find(|r| r.matches(instance))
            .map(CompiledRule::rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> Instance {
        let mut instance = Instance::new(7, "t1", "web-01")
            .with_attribute("region", "us-east-1")
            .with_attribute("cpu", 4_i64)
            .with_tag("team", "payments");
        instance.asset_id = "i-0abc".to_string();
        instance.model_uid = "cloud_vm".to_string();
        instance
    }

    fn check(field: &str, operator: Operator, value: &str) -> bool {
        CompiledCondition::compile(&RuleCondition::new(field, operator, value)).matches(&instance())
    }

    #[test]
    fn test_equals() {
        assert!(check("attributes.region", Operator::Equals, "us-east-1"));
        assert!(!check("attributes.region", Operator::Equals, "us-west-2"));
        assert!(!check("attributes.zone", Operator::Equals, "us-east-1"));
        assert!(check("model_uid", Operator::Equals, "cloud_vm"));
        assert!(check("asset_id", Operator::Equals, "i-0abc"));
    }

    #[test]
    fn test_not_equals() {
        assert!(check("name", Operator::NotEquals, "db-01"));
        assert!(!check("name", Operator::NotEquals, "web-01"));
        // Absent fields read as empty and are therefore different
        assert!(check("attributes.zone", Operator::NotEquals, "a"));
    }

    #[test]
    fn test_contains() {
        assert!(check("name", Operator::Contains, "web"));
        assert!(!check("name", Operator::Contains, "db"));
    }

    #[test]
    fn test_regex() {
        assert!(check("name", Operator::Regex, "^web-\\d+$"));
        assert!(check("name", Operator::Regex, "eb"));
        assert!(!check("name", Operator::Regex, "^db-"));
        assert!(!check("name", Operator::Regex, "(unclosed"));
    }

    #[test]
    fn test_in_and_not_in() {
        assert!(check("attributes.region", Operator::In, "us-west-2, us-east-1"));
        assert!(!check("attributes.region", Operator::In, "eu-west-1,ap-south-1"));
        assert!(check("attributes.region", Operator::NotIn, "eu-west-1, ap-south-1"));
        assert!(!check("attributes.region", Operator::NotIn, "us-east-1"));
    }

    #[test]
    fn test_exists() {
        assert!(check("tag.team", Operator::Exists, ""));
        assert!(!check("tag.owner", Operator::Exists, ""));
        // Non-string values read as empty
        assert!(!check("attributes.cpu", Operator::Exists, ""));
        assert!(!check("hostname", Operator::Exists, ""));
    }

    #[test]
    fn test_tags() {
        assert!(check("tag.team", Operator::Equals, "payments"));
        assert!(!check("attributes.team", Operator::Equals, "payments"));
    }

    #[test]
    fn test_rule_requires_all_conditions() {
        let rule = BindingRule::new("t1", "web east", 1, 1)
            .with_condition(RuleCondition::new("name", Operator::Regex, "^web-"))
            .with_condition(RuleCondition::new(
                "attributes.region",
                Operator::Equals,
                "us-west-2",
            ));
        assert!(!CompiledRule::compile(rule).matches(&instance()));
    }

    #[test]
    fn test_rule_without_conditions_never_matches() {
        let rule = BindingRule::new("t1", "empty", 1, 1);
        assert!(!CompiledRule::compile(rule).matches(&instance()));
    }

    #[test]
    fn test_first_match_uses_priority() {
        let mut low = BindingRule::new("t1", "low", 20, 1)
            .with_priority(2)
            .with_condition(RuleCondition::new("name", Operator::Contains, "web"));
        low.id = 1;
        let mut high = BindingRule::new("t1", "high", 10, 1)
            .with_priority(1)
            .with_condition(RuleCondition::new("name", Operator::Contains, "web"));
        high.id = 2;
        let mut disabled = BindingRule::new("t1", "off", 30, 1)
            .with_priority(0)
            .with_enabled(false)
            .with_condition(RuleCondition::new("name", Operator::Contains, "web"));
        disabled.id = 3;

        let set = RuleSet::compile(vec![low, disabled, high]);
        assert_eq!(set.len(), 2);
        let winner = set.first_match(&instance()).unwrap();
        assert_eq!(winner.name, "high");
        assert_eq!(winner.node_id, 10);
    }

    #[test]
    fn test_no_match() {
        let rule = BindingRule::new("t1", "db", 1, 1)
            .with_condition(RuleCondition::new("name", Operator::Regex, "^db-"));
        let set = RuleSet::compile(vec![rule]);
        assert!(set.first_match(&instance()).is_none());
        assert!(RuleSet::default().is_empty());
    }
}
