//! Attribute-based access rules with explicit-deny precedence.
//!
//! The evaluator starts from a default deny. Rules are tested in
//! registration order: a matching deny rule short-circuits to an explicit
//! deny; a matching allow rule flips the decision to allow but scanning
//! continues, so a later deny still wins. A rule matches when both its
//! resource and action patterns match (literal string or `*`) and every
//! condition holds.
//!
//! Conditions are deliberately forgiving about shape: any type/operator/
//! value mismatch evaluates to false, so a mal-typed rule becomes inert
//! instead of failing the whole evaluation.

use crate::domain::{Identity, RuleId};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Whether a matching rule grants or refuses access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleEffect {
    Allow,
    Deny,
}

/// Which request attribute a condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    /// The current hour, local to the evaluator
    Time,
    /// The request ip
    Ip,
    /// The actor's role names
    Role,
    /// Evaluator-defined extension hook
    Custom,
}

/// How the condition value is compared against the attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    In,
    Between,
    Matches,
}

/// One condition attached to an access rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub operator: ConditionOperator,
    /// Shape dictated by the operator: scalar for equals/matches, list for
    /// in, two-element numeric pair for between
    pub value: serde_json::Value,
}

/// An access rule: resource/action patterns, effect, and conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRule {
    pub id: RuleId,
    /// Resource pattern; `*` matches any resource
    pub resource: String,
    /// Action pattern; `*` matches any action
    pub action: String,
    pub effect: RuleEffect,
    #[serde(default)]
    pub conditions: Vec<AccessCondition>,
}

/// Per-request attributes the conditions evaluate against.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Request ip, if the transport knows it
    pub ip: Option<String>,
    /// Hour of day; defaults to the evaluator's local clock
    pub hour: Option<u32>,
    /// Free-form attributes for custom conditions
    pub custom: HashMap<String, serde_json::Value>,
}

impl RequestContext {
    /// Context stamped with the evaluator's current local hour.
    pub fn now() -> Self {
        Self { hour: Some(chrono::Local::now().hour()), ..Self::default() }
    }

    /// Attach the request ip.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }
}

/// A single access evaluation request.
#[derive(Debug, Clone)]
pub struct AccessRequest<'a> {
    pub identity: &'a Identity,
    pub resource: &'a str,
    pub action: &'a str,
    pub context: RequestContext,
}

/// The outcome of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied,
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Hook type for `custom` conditions.
pub type CustomConditionFn =
    dyn for<'a> Fn(&AccessCondition, &AccessRequest<'a>) -> bool + Send + Sync;

/// A registered rule plus its `matches` patterns, compiled once at
/// registration so evaluation never touches the regex compiler.
///
/// The vector parallels the rule's conditions; an entry is `None` for
/// conditions that are not string `matches` or whose pattern does not
/// compile (those conditions evaluate false, keeping mal-typed rules
/// inert).
struct CompiledRule {
    rule: AccessRule,
    patterns: Vec<Option<regex::Regex>>,
}

impl CompiledRule {
    fn new(rule: AccessRule) -> Self {
        let patterns = rule
            .conditions
            .iter()
            .map(|condition| match condition.operator {
                ConditionOperator::Matches => condition
                    .value
                    .as_str()
                    .and_then(|pattern| regex::Regex::new(pattern).ok()),
                _ => None,
            })
            .collect();
        Self { rule, patterns }
    }
}

/// Ordered rule list plus the evaluation engine.
pub struct AccessPolicyEngine {
    rules: RwLock<Vec<CompiledRule>>,
    custom_evaluator: Option<Arc<CustomConditionFn>>,
}

impl std::fmt::Debug for AccessPolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("AccessPolicyEngine")
            .field("rule_count", &rules.len())
            .field("has_custom_evaluator", &self.custom_evaluator.is_some())
            .finish()
    }
}

impl Default for AccessPolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessPolicyEngine {
    /// Engine with no rules: everything evaluates to the default deny.
    pub fn new() -> Self {
        Self { rules: RwLock::new(Vec::new()), custom_evaluator: None }
    }

    /// Engine with a hook for `custom` conditions.
    pub fn with_custom_evaluator(evaluator: Arc<CustomConditionFn>) -> Self {
        Self { rules: RwLock::new(Vec::new()), custom_evaluator: Some(evaluator) }
    }

    /// Append a rule; evaluation order is registration order. Any
    /// `matches` patterns are compiled here, off the evaluation path.
    pub fn add_rule(&self, rule: AccessRule) {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CompiledRule::new(rule));
    }

    /// Remove a rule by id. Returns whether anything was removed.
    pub fn remove_rule(&self, id: &RuleId) -> bool {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let before = rules.len();
        rules.retain(|compiled| &compiled.rule.id != id);
        rules.len() != before
    }

    /// Snapshot of the current rule list.
    pub fn rules(&self) -> Vec<AccessRule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|compiled| compiled.rule.clone())
            .collect()
    }

    /// Evaluate a request against the registered rules.
    ///
    /// Default deny; explicit deny overrides any allow regardless of order.
    pub fn evaluate(&self, request: &AccessRequest<'_>) -> AccessDecision {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        let mut decision = AccessDecision::Denied;

        for compiled in rules.iter() {
            if !self.rule_matches(compiled, request) {
                continue;
            }
            match compiled.rule.effect {
                RuleEffect::Deny => {
                    debug!(rule_id = %compiled.rule.id, resource = request.resource, "Explicit deny");
                    return AccessDecision::Denied;
                }
                RuleEffect::Allow => decision = AccessDecision::Allowed,
            }
        }

        decision
    }

    fn rule_matches(&self, compiled: &CompiledRule, request: &AccessRequest<'_>) -> bool {
        pattern_matches(&compiled.rule.resource, request.resource)
            && pattern_matches(&compiled.rule.action, request.action)
            && compiled
                .rule
                .conditions
                .iter()
                .zip(compiled.patterns.iter())
                .all(|(condition, pattern)| {
                    self.condition_holds(condition, pattern.as_ref(), request)
                })
    }

    fn condition_holds(
        &self,
        condition: &AccessCondition,
        pattern: Option<&regex::Regex>,
        request: &AccessRequest<'_>,
    ) -> bool {
        match condition.condition_type {
            ConditionType::Time => {
                let Some(hour) = request.context.hour else { return false };
                numeric_condition_holds(condition, f64::from(hour))
            }
            ConditionType::Ip => {
                let Some(ip) = request.context.ip.as_deref() else { return false };
                string_condition_holds(condition, pattern, ip)
            }
            ConditionType::Role => role_condition_holds(condition, request.identity),
            ConditionType::Custom => match &self.custom_evaluator {
                Some(evaluator) => evaluator(condition, request),
                None => false,
            },
        }
    }
}

fn pattern_matches(pattern: &str, value: &str) -> bool {
    pattern == "*" || pattern == value
}

fn numeric_condition_holds(condition: &AccessCondition, context: f64) -> bool {
    match condition.operator {
        ConditionOperator::Equals => condition.value.as_f64() == Some(context),
        ConditionOperator::In => match condition.value.as_array() {
            Some(values) => values.iter().any(|v| v.as_f64() == Some(context)),
            None => false,
        },
        ConditionOperator::Between => match condition.value.as_array() {
            Some(bounds) if bounds.len() == 2 => {
                match (bounds[0].as_f64(), bounds[1].as_f64()) {
                    (Some(lo), Some(hi)) => lo <= context && context <= hi,
                    _ => false,
                }
            }
            _ => false,
        },
        // A numeric context is never a string, so `matches` cannot apply.
        ConditionOperator::Matches => false,
    }
}

fn string_condition_holds(
    condition: &AccessCondition,
    pattern: Option<&regex::Regex>,
    context: &str,
) -> bool {
    match condition.operator {
        ConditionOperator::Equals => condition.value.as_str() == Some(context),
        ConditionOperator::In => match condition.value.as_array() {
            Some(values) => values.iter().any(|v| v.as_str() == Some(context)),
            None => false,
        },
        ConditionOperator::Between => false,
        // Compiled at registration; a pattern that failed to compile (or a
        // non-string value) never produced one.
        ConditionOperator::Matches => pattern.map_or(false, |re| re.is_match(context)),
    }
}

fn role_condition_holds(condition: &AccessCondition, identity: &Identity) -> bool {
    let roles = identity.role_names();
    match condition.operator {
        ConditionOperator::Equals => match condition.value.as_str() {
            Some(expected) => roles.iter().any(|role| *role == expected),
            None => false,
        },
        ConditionOperator::In => match condition.value.as_array() {
            Some(values) => values
                .iter()
                .filter_map(|v| v.as_str())
                .any(|listed| roles.iter().any(|role| *role == listed)),
            None => false,
        },
        // The role attribute is a set, not a scalar; these cannot apply.
        ConditionOperator::Between | ConditionOperator::Matches => false,
    }
}
