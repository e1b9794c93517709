use async_trait::async_trait;
use rptflow_contracts::{ReportRoute, ReportRoutes, ReportVersionId};

use crate::context::RuleContext;
use crate::source::FetchError;

/// One independent navigation constraint.
///
/// Rules hold no per-request state; everything they learn about the report
/// comes through the [`RuleContext`] they are handed.
#[async_trait]
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    async fn is_applicable(&self, route: &ReportRoute, ctx: &RuleContext)
    -> Result<bool, FetchError>;

    /// `true` lets the request through; `false` sends it to [`Rule::redirect_target`].
    async fn validate(&self, route: &ReportRoute, ctx: &RuleContext) -> Result<bool, FetchError>;

    fn redirect_target(&self, report_version_id: ReportVersionId, routes: &ReportRoutes) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleError {
    pub rule: &'static str,
    pub source: FetchError,
}

impl std::fmt::Display for RuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rule `{}` failed: {}", self.rule, self.source)
    }
}

impl std::error::Error for RuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRuleName(pub &'static str);

impl std::fmt::Display for DuplicateRuleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rule name `{}` is declared more than once", self.0)
    }
}

impl std::error::Error for DuplicateRuleName {}

/// Rules in precedence order. The first applicable rule that fails wins.
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Result<Self, DuplicateRuleName> {
        let mut seen = Vec::with_capacity(rules.len());
        for rule in &rules {
            if seen.contains(&rule.name()) {
                return Err(DuplicateRuleName(rule.name()));
            }
            seen.push(rule.name());
        }
        Ok(Self { rules })
    }

    /// For built-in lists whose name uniqueness is covered by tests.
    pub(crate) fn from_declared(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Walks the rules sequentially and stops at the first applicable rule
    /// whose validation fails. Later rules are never consulted once one fails
    /// or errors.
    pub async fn first_failure(
        &self,
        route: &ReportRoute,
        ctx: &RuleContext,
    ) -> Result<Option<&dyn Rule>, RuleError> {
        for rule in &self.rules {
            let rule = rule.as_ref();
            let applicable = rule
                .is_applicable(route, ctx)
                .await
                .map_err(|source| RuleError {
                    rule: rule.name(),
                    source,
                })?;
            if !applicable {
                continue;
            }

            let valid = rule.validate(route, ctx).await.map_err(|source| RuleError {
                rule: rule.name(),
                source,
            })?;
            tracing::debug!(
                rule = rule.name(),
                report_version_id = %route.report_version_id,
                valid,
                "route access rule evaluated"
            );
            if !valid {
                return Ok(Some(rule));
            }
        }

        Ok(None)
    }
}
