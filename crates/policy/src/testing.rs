use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rptflow_contracts::{
    IdentityToken, OperationSummary, OperationType, RegistrationPurpose, ReportStatus,
    ReportVersionId, StateKind,
};

use crate::source::{FetchError, ReportStateSource};

pub(crate) struct FakeSource {
    purpose: RegistrationPurpose,
    summary: OperationSummary,
    verification_required: bool,
    supplementary: bool,
    failing: Vec<StateKind>,
    delay: Option<Duration>,
    calls: [AtomicUsize; 4],
}

impl FakeSource {
    pub(crate) fn new(
        purpose: RegistrationPurpose,
        operation_type: OperationType,
        status: ReportStatus,
    ) -> Self {
        Self {
            purpose,
            summary: OperationSummary {
                operation_type,
                status,
            },
            verification_required: false,
            supplementary: false,
            failing: Vec::new(),
            delay: None,
            calls: Default::default(),
        }
    }

    pub(crate) fn token() -> IdentityToken {
        IdentityToken::UserGuid("00000000-0000-0000-0000-000000000001".to_string())
    }

    pub(crate) fn with_verification(mut self, required: bool) -> Self {
        self.verification_required = required;
        self
    }

    pub(crate) fn with_supplementary(mut self, supplementary: bool) -> Self {
        self.supplementary = supplementary;
        self
    }

    pub(crate) fn failing(mut self, kind: StateKind) -> Self {
        self.failing.push(kind);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self, kind: StateKind) -> usize {
        self.calls[slot(kind)].load(Ordering::SeqCst)
    }

    pub(crate) fn total_calls(&self) -> usize {
        StateKind::ALL.iter().map(|kind| self.calls(*kind)).sum()
    }

    async fn hit(&self, kind: StateKind) -> Result<(), FetchError> {
        self.calls[slot(kind)].fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&kind) {
            return Err(FetchError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

fn slot(kind: StateKind) -> usize {
    match kind {
        StateKind::RegistrationPurpose => 0,
        StateKind::OperationSummary => 1,
        StateKind::VerificationRequirement => 2,
        StateKind::SupplementaryFlag => 3,
    }
}

#[async_trait]
impl ReportStateSource for FakeSource {
    async fn registration_purpose(
        &self,
        _report_version_id: ReportVersionId,
        _token: &IdentityToken,
    ) -> Result<RegistrationPurpose, FetchError> {
        self.hit(StateKind::RegistrationPurpose).await?;
        Ok(self.purpose)
    }

    async fn operation_summary(
        &self,
        _report_version_id: ReportVersionId,
        _token: &IdentityToken,
    ) -> Result<OperationSummary, FetchError> {
        self.hit(StateKind::OperationSummary).await?;
        Ok(self.summary)
    }

    async fn verification_required(
        &self,
        _report_version_id: ReportVersionId,
        _token: &IdentityToken,
    ) -> Result<bool, FetchError> {
        self.hit(StateKind::VerificationRequirement).await?;
        Ok(self.verification_required)
    }

    async fn is_supplementary(
        &self,
        _report_version_id: ReportVersionId,
        _token: &IdentityToken,
    ) -> Result<bool, FetchError> {
        self.hit(StateKind::SupplementaryFlag).await?;
        Ok(self.supplementary)
    }
}
