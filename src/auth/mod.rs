//! The authorization kernel: role gate, ABAC evaluator, session tracking.
//!
//! Every lifecycle state transition passes through the role gate in
//! [`roles`]; the rule-based evaluator in [`abac`] serves callers that
//! need attribute-level decisions on top of it.

pub mod abac;
pub mod roles;
pub mod session;

pub use abac::{
    AccessCondition, AccessDecision, AccessPolicyEngine, AccessRequest, AccessRule,
    ConditionOperator, ConditionType, RequestContext, RuleEffect,
};
pub use roles::{allow_action, required_role};
pub use session::{Session, SessionManager, DEFAULT_SESSION_TIMEOUT_MS};
