use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rptflow_contracts::{
    IdentityToken, OperationSummary, RegistrationPurpose, ReportVersionId, StateKind,
};
use tokio::sync::{Mutex, OnceCell};

use crate::source::{FetchError, ReportStateSource};

/// Outcome memo for one state kind. Callers racing on the same id share a
/// single in-flight fetch; errors are stored like successes.
struct StateCache<T> {
    cells: Mutex<HashMap<ReportVersionId, Arc<OnceCell<Result<T, FetchError>>>>>,
}

impl<T: Clone> StateCache<T> {
    fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    async fn get_or_fetch<F, Fut>(&self, id: ReportVersionId, fetch: F) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let cell = {
            let mut cells = self.cells.lock().await;
            cells.entry(id).or_default().clone()
        };

        cell.get_or_init(fetch).await.clone()
    }
}

/// Per-evaluation view of remote report state.
///
/// Built fresh for every request and dropped with it, so nothing fetched here
/// outlives the request that fetched it.
pub struct RuleContext {
    source: Arc<dyn ReportStateSource>,
    token: IdentityToken,
    purposes: StateCache<RegistrationPurpose>,
    summaries: StateCache<OperationSummary>,
    verification: StateCache<bool>,
    supplementary: StateCache<bool>,
    fetches: AtomicUsize,
}

impl RuleContext {
    pub fn new(source: Arc<dyn ReportStateSource>, token: IdentityToken) -> Self {
        Self {
            source,
            token,
            purposes: StateCache::new(),
            summaries: StateCache::new(),
            verification: StateCache::new(),
            supplementary: StateCache::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub async fn registration_purpose(
        &self,
        id: ReportVersionId,
    ) -> Result<RegistrationPurpose, FetchError> {
        self.purposes
            .get_or_fetch(id, || {
                self.observe(StateKind::RegistrationPurpose, id, async {
                    self.source.registration_purpose(id, &self.token).await
                })
            })
            .await
    }

    pub async fn operation_summary(
        &self,
        id: ReportVersionId,
    ) -> Result<OperationSummary, FetchError> {
        self.summaries
            .get_or_fetch(id, || {
                self.observe(StateKind::OperationSummary, id, async {
                    self.source.operation_summary(id, &self.token).await
                })
            })
            .await
    }

    pub async fn verification_required(&self, id: ReportVersionId) -> Result<bool, FetchError> {
        self.verification
            .get_or_fetch(id, || {
                self.observe(StateKind::VerificationRequirement, id, async {
                    self.source.verification_required(id, &self.token).await
                })
            })
            .await
    }

    pub async fn is_supplementary(&self, id: ReportVersionId) -> Result<bool, FetchError> {
        self.supplementary
            .get_or_fetch(id, || {
                self.observe(StateKind::SupplementaryFlag, id, async {
                    self.source.is_supplementary(id, &self.token).await
                })
            })
            .await
    }

    /// Remote fetches issued through this context so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    async fn observe<T>(
        &self,
        kind: StateKind,
        id: ReportVersionId,
        fetch: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let result = fetch.await;
        if let Err(err) = &result {
            tracing::warn!(
                kind = kind.as_str(),
                report_version_id = %id,
                error = %err,
                "report state fetch failed"
            );
        }
        result
    }
}
