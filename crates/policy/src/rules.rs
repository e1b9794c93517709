//! The report-workflow navigation rules and their precedence.
//!
//! Two families share one ordered list. Restricted steps gate a single step on
//! a fact about the report. Route corrections move a report whose state pins it
//! to a fixed set of steps back onto that set. Reordering [`standard_rule_set`]
//! changes which redirect a user sees when several rules would fire.

use async_trait::async_trait;
use rptflow_contracts::{
    OperationType, RegistrationPurpose, ReportRoute, ReportRoutes, ReportStatus, ReportVersionId,
    steps,
};

use crate::context::RuleContext;
use crate::rule::{Rule, RuleSet};
use crate::source::FetchError;

/// Steps a submitted report may still show.
pub const SUBMITTED_STEPS: &[&str] = &[steps::SUBMITTED];

/// Steps a reporting-only operation may show. It has no compliance obligation
/// and never carries new-entrant or electricity-import data.
pub const REPORTING_OPERATION_STEPS: &[&str] = &[
    steps::REVIEW_OPERATION_INFORMATION,
    steps::PERSON_RESPONSIBLE,
    steps::REVIEW_FACILITIES,
    steps::FACILITIES,
    steps::ADDITIONAL_REPORTING_DATA,
    steps::VERIFICATION,
    steps::ATTACHMENTS,
    steps::FINAL_REVIEW,
    steps::SIGN_OFF,
    steps::SUBMITTED,
    steps::CHANGE_REVIEW,
];

/// A fact about a report version, resolved through the rule context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Purpose(RegistrationPurpose),
    OperationType(OperationType),
    Status(ReportStatus),
    VerificationRequired,
    Supplementary,
}

impl Condition {
    pub async fn holds(self, id: ReportVersionId, ctx: &RuleContext) -> Result<bool, FetchError> {
        Ok(match self {
            Condition::Purpose(expected) => ctx.registration_purpose(id).await? == expected,
            Condition::OperationType(expected) => {
                ctx.operation_summary(id).await?.operation_type == expected
            }
            Condition::Status(expected) => ctx.operation_summary(id).await?.status == expected,
            Condition::VerificationRequired => ctx.verification_required(id).await?,
            Condition::Supplementary => ctx.is_supplementary(id).await?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Step(&'static str),
    ReportsIndex,
}

impl Target {
    fn resolve(self, id: ReportVersionId, routes: &ReportRoutes) -> String {
        match self {
            Target::Step(slug) => routes.step(id, slug),
            Target::ReportsIndex => routes.index(),
        }
    }
}

/// Gates one step on a precondition about the report.
#[derive(Debug, Clone)]
pub struct RestrictedStep {
    pub name: &'static str,
    pub step: &'static str,
    pub requires: Condition,
    pub redirect: Target,
}

#[async_trait]
impl Rule for RestrictedStep {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn is_applicable(
        &self,
        route: &ReportRoute,
        _ctx: &RuleContext,
    ) -> Result<bool, FetchError> {
        Ok(route.has_step(self.step))
    }

    async fn validate(&self, route: &ReportRoute, ctx: &RuleContext) -> Result<bool, FetchError> {
        self.requires.holds(route.report_version_id, ctx).await
    }

    fn redirect_target(&self, id: ReportVersionId, routes: &ReportRoutes) -> String {
        self.redirect.resolve(id, routes)
    }
}

/// Applies while `when` holds and keeps the request on `allowed` steps.
#[derive(Debug, Clone)]
pub struct RouteCorrection {
    pub name: &'static str,
    pub when: Condition,
    pub allowed: &'static [&'static str],
    pub redirect: Target,
}

#[async_trait]
impl Rule for RouteCorrection {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn is_applicable(
        &self,
        route: &ReportRoute,
        ctx: &RuleContext,
    ) -> Result<bool, FetchError> {
        self.when.holds(route.report_version_id, ctx).await
    }

    async fn validate(&self, route: &ReportRoute, _ctx: &RuleContext) -> Result<bool, FetchError> {
        Ok(route.step_in(self.allowed))
    }

    fn redirect_target(&self, id: ReportVersionId, routes: &ReportRoutes) -> String {
        self.redirect.resolve(id, routes)
    }
}

const REVIEW: Target = Target::Step(steps::REVIEW_OPERATION_INFORMATION);

pub fn standard_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(RestrictedStep {
            name: "new_entrant_information",
            step: steps::NEW_ENTRANT_INFORMATION,
            requires: Condition::Purpose(RegistrationPurpose::NewEntrantOperation),
            redirect: REVIEW,
        }),
        Box::new(RestrictedStep {
            name: "electricity_import_data",
            step: steps::ELECTRICITY_IMPORT_DATA,
            requires: Condition::Purpose(RegistrationPurpose::ElectricityImportOperation),
            redirect: REVIEW,
        }),
        Box::new(RestrictedStep {
            name: "linear_facility_only",
            step: steps::REVIEW_FACILITIES,
            requires: Condition::OperationType(OperationType::LinearFacility),
            redirect: REVIEW,
        }),
        Box::new(RestrictedStep {
            name: "submitted_only",
            step: steps::SUBMITTED,
            requires: Condition::Status(ReportStatus::Submitted),
            redirect: REVIEW,
        }),
        Box::new(RestrictedStep {
            name: "verification_required",
            step: steps::VERIFICATION,
            requires: Condition::VerificationRequired,
            redirect: REVIEW,
        }),
        Box::new(RestrictedStep {
            name: "supplementary_only",
            step: steps::CHANGE_REVIEW,
            requires: Condition::Supplementary,
            redirect: Target::ReportsIndex,
        }),
        Box::new(RouteCorrection {
            name: "submitted_route_correction",
            when: Condition::Status(ReportStatus::Submitted),
            allowed: SUBMITTED_STEPS,
            redirect: Target::Step(steps::SUBMITTED),
        }),
        Box::new(RouteCorrection {
            name: "reporting_operation_route_correction",
            when: Condition::Purpose(RegistrationPurpose::ReportingOperation),
            allowed: REPORTING_OPERATION_STEPS,
            redirect: REVIEW,
        }),
    ]
}

pub fn standard_rule_set() -> RuleSet {
    RuleSet::from_declared(standard_rules())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSource;
    use rptflow_contracts::StateKind;
    use std::sync::Arc;

    fn route(step: &str) -> ReportRoute {
        ReportRoute::new(ReportVersionId(42), &[step])
    }

    fn context_for(source: FakeSource) -> (RuleContext, Arc<FakeSource>) {
        let source = Arc::new(source);
        (RuleContext::new(source.clone(), FakeSource::token()), source)
    }

    #[test]
    fn standard_order_is_stable() {
        assert_eq!(
            standard_rule_set().names(),
            vec![
                "new_entrant_information",
                "electricity_import_data",
                "linear_facility_only",
                "submitted_only",
                "verification_required",
                "supplementary_only",
                "submitted_route_correction",
                "reporting_operation_route_correction",
            ]
        );
    }

    #[tokio::test]
    async fn restricted_step_only_applies_on_its_step() {
        let rule = RestrictedStep {
            name: "verification_required",
            step: steps::VERIFICATION,
            requires: Condition::VerificationRequired,
            redirect: REVIEW,
        };
        let (ctx, source) = context_for(FakeSource::new(
            RegistrationPurpose::RegulatedOperation,
            OperationType::SingleFacility,
            ReportStatus::Draft,
        ));

        assert!(!rule.is_applicable(&route(steps::FINAL_REVIEW), &ctx).await.unwrap());
        assert!(rule.is_applicable(&route(steps::VERIFICATION), &ctx).await.unwrap());
        assert_eq!(source.total_calls(), 0);

        assert!(!rule.validate(&route(steps::VERIFICATION), &ctx).await.unwrap());
        assert_eq!(
            rule.redirect_target(ReportVersionId(42), &ReportRoutes::default()),
            "/reports/42/review-operation-information"
        );
    }

    #[tokio::test]
    async fn supplementary_rule_redirects_to_reports_index() {
        let rules = standard_rules();
        let rule = rules
            .iter()
            .find(|rule| rule.name() == "supplementary_only")
            .expect("rule exists");
        let (ctx, _) = context_for(FakeSource::new(
            RegistrationPurpose::RegulatedOperation,
            OperationType::SingleFacility,
            ReportStatus::Draft,
        ));

        assert!(!rule.validate(&route(steps::CHANGE_REVIEW), &ctx).await.unwrap());
        assert_eq!(
            rule.redirect_target(ReportVersionId(42), &ReportRoutes::default()),
            "/reports"
        );
    }

    #[tokio::test]
    async fn route_correction_applies_only_when_condition_holds() {
        let rule = RouteCorrection {
            name: "submitted_route_correction",
            when: Condition::Status(ReportStatus::Submitted),
            allowed: SUBMITTED_STEPS,
            redirect: Target::Step(steps::SUBMITTED),
        };

        let (draft, _) = context_for(FakeSource::new(
            RegistrationPurpose::RegulatedOperation,
            OperationType::SingleFacility,
            ReportStatus::Draft,
        ));
        assert!(!rule.is_applicable(&route(steps::FINAL_REVIEW), &draft).await.unwrap());

        let (submitted, source) = context_for(FakeSource::new(
            RegistrationPurpose::RegulatedOperation,
            OperationType::SingleFacility,
            ReportStatus::Submitted,
        ));
        assert!(rule.is_applicable(&route(steps::FINAL_REVIEW), &submitted).await.unwrap());
        assert!(!rule.validate(&route(steps::FINAL_REVIEW), &submitted).await.unwrap());
        assert!(rule.validate(&route(steps::SUBMITTED), &submitted).await.unwrap());
        assert!(
            !rule
                .validate(&ReportRoute::new(ReportVersionId(42), &[]), &submitted)
                .await
                .unwrap()
        );
        assert_eq!(source.calls(StateKind::OperationSummary), 1);
    }

    #[test]
    fn reporting_operation_steps_exclude_compliance_and_special_sections() {
        for blocked in [
            steps::COMPLIANCE_SUMMARY,
            steps::NEW_ENTRANT_INFORMATION,
            steps::ELECTRICITY_IMPORT_DATA,
        ] {
            assert!(!REPORTING_OPERATION_STEPS.contains(&blocked));
        }
        for slug in steps::ALL {
            if ![
                steps::COMPLIANCE_SUMMARY,
                steps::NEW_ENTRANT_INFORMATION,
                steps::ELECTRICITY_IMPORT_DATA,
            ]
            .contains(slug)
            {
                assert!(REPORTING_OPERATION_STEPS.contains(slug), "{}", slug);
            }
        }
    }

    #[tokio::test]
    async fn condition_errors_propagate() {
        let (ctx, _) = context_for(
            FakeSource::new(
                RegistrationPurpose::RegulatedOperation,
                OperationType::SingleFacility,
                ReportStatus::Draft,
            )
            .failing(StateKind::RegistrationPurpose),
        );
        let err = Condition::Purpose(RegistrationPurpose::NewEntrantOperation)
            .holds(ReportVersionId(42), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unavailable(_)));
    }
}
