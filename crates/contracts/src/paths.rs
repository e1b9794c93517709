use crate::ReportVersionId;

/// Finds the first `reports_segment` in `path` and parses the segment after it.
///
/// Purely syntactic: no percent-decoding, signs, or whitespace are accepted, so
/// `/reports/abc`, `/reports/-4` and `/reports` all yield `None`.
pub fn report_version_id_from_path(path: &str, reports_segment: &str) -> Option<ReportVersionId> {
    ReportRoute::parse(path, reports_segment).map(|route| route.report_version_id)
}

fn parse_id_segment(raw: &str) -> Option<ReportVersionId> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<i64>().ok().map(ReportVersionId)
}

/// A request path that addresses one report version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRoute {
    pub report_version_id: ReportVersionId,
    steps: Vec<String>,
}

impl ReportRoute {
    /// Parses the path component only; anything from the first `?` or `#` on
    /// is ignored.
    pub fn parse(path: &str, reports_segment: &str) -> Option<Self> {
        let path = path.find(['?', '#']).map_or(path, |end| &path[..end]);
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        segments.find(|s| *s == reports_segment)?;
        let report_version_id = parse_id_segment(segments.next()?)?;
        let steps = segments.map(|s| s.to_string()).collect::<Vec<_>>();

        Some(Self {
            report_version_id,
            steps,
        })
    }

    pub fn new(report_version_id: ReportVersionId, steps: &[&str]) -> Self {
        Self {
            report_version_id,
            steps: steps.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The step slug directly after the id, if any.
    pub fn step(&self) -> Option<&str> {
        self.steps.first().map(|s| s.as_str())
    }

    /// Whole-segment match anywhere below the id.
    pub fn has_step(&self, slug: &str) -> bool {
        self.steps.iter().any(|s| s == slug)
    }

    pub fn step_in(&self, allowed: &[&str]) -> bool {
        self.step().is_some_and(|step| allowed.contains(&step))
    }
}

/// Builds absolute redirect targets under a fixed reports base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRoutes {
    base: String,
}

impl ReportRoutes {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn index(&self) -> String {
        if self.base.is_empty() {
            "/".to_string()
        } else {
            self.base.clone()
        }
    }

    pub fn step(&self, report_version_id: ReportVersionId, slug: &str) -> String {
        format!("{}/{}/{}", self.base, report_version_id, slug)
    }
}

impl Default for ReportRoutes {
    fn default() -> Self {
        Self::new("/reports")
    }
}
