use std::sync::Arc;

use rptflow_contracts::{Decision, IdentityToken, ReportRoute, ReportRoutes, ReportVersionId};

use crate::context::RuleContext;
use crate::rule::RuleSet;
use crate::source::ReportStateSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerClass {
    /// External operator-side users; the only callers the rules apply to.
    Constrained,
    Unconstrained,
}

#[derive(Debug, Clone)]
pub struct AccessRequest<'a> {
    pub path: &'a str,
    pub caller: CallerClass,
    pub token: IdentityToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub reports_segment: String,
    pub routes: ReportRoutes,
    pub fail_closed_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reports_segment: "reports".to_string(),
            routes: ReportRoutes::default(),
            fail_closed_path: "/onboarding".to_string(),
        }
    }
}

/// What the engine decided and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    pub report_version_id: Option<ReportVersionId>,
    /// Rule that produced the redirect, or the rule whose fetch failed.
    pub rule: Option<&'static str>,
    pub fetches: usize,
    pub fail_closed: bool,
}

impl Evaluation {
    fn proceed(report_version_id: Option<ReportVersionId>, fetches: usize) -> Self {
        Self {
            decision: Decision::Proceed,
            report_version_id,
            rule: None,
            fetches,
            fail_closed: false,
        }
    }
}

pub struct AccessEngine {
    rules: RuleSet,
    source: Arc<dyn ReportStateSource>,
    config: EngineConfig,
}

impl AccessEngine {
    pub fn new(rules: RuleSet, source: Arc<dyn ReportStateSource>, config: EngineConfig) -> Self {
        Self {
            rules,
            source,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn evaluate(&self, request: &AccessRequest<'_>) -> Decision {
        self.assess(request).await.decision
    }

    pub async fn assess(&self, request: &AccessRequest<'_>) -> Evaluation {
        if request.caller != CallerClass::Constrained {
            return Evaluation::proceed(None, 0);
        }

        let Some(route) = ReportRoute::parse(request.path, &self.config.reports_segment) else {
            return Evaluation::proceed(None, 0);
        };
        let report_version_id = route.report_version_id;

        let ctx = RuleContext::new(self.source.clone(), request.token.clone());
        let outcome = self.rules.first_failure(&route, &ctx).await;
        let fetches = ctx.fetch_count();

        match outcome {
            Ok(None) => Evaluation::proceed(Some(report_version_id), fetches),
            Ok(Some(rule)) => Evaluation {
                decision: Decision::RedirectTo(
                    rule.redirect_target(report_version_id, &self.config.routes),
                ),
                report_version_id: Some(report_version_id),
                rule: Some(rule.name()),
                fetches,
                fail_closed: false,
            },
            Err(err) => {
                tracing::warn!(
                    report_version_id = %report_version_id,
                    rule = err.rule,
                    error = %err.source,
                    "route access evaluation failed; redirecting to fail-closed path"
                );
                Evaluation {
                    decision: Decision::RedirectTo(self.config.fail_closed_path.clone()),
                    report_version_id: Some(report_version_id),
                    rule: Some(err.rule),
                    fetches,
                    fail_closed: true,
                }
            }
        }
    }
}
