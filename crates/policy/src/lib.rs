//! Request-time route access for the report workflow.
//!
//! An [`AccessEngine`] runs an ordered [`RuleSet`] against one request path.
//! Rules read remote report state through a per-request [`RuleContext`], which
//! fetches each kind of state at most once. The first applicable rule that
//! fails decides the redirect; any fetch error redirects to the fail-closed
//! path instead.
//!
//! This crate is transport-free: the remote reads sit behind
//! [`ReportStateSource`] and the HTTP wiring lives in the gateway.

mod context;
mod engine;
mod rule;
pub mod rules;
mod source;

#[cfg(test)]
mod testing;

pub use context::RuleContext;
pub use engine::{AccessEngine, AccessRequest, CallerClass, EngineConfig, Evaluation};
pub use rule::{DuplicateRuleName, Rule, RuleError, RuleSet};
pub use rules::{standard_rule_set, standard_rules};
pub use source::{FetchError, ReportStateSource};
