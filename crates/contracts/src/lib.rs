use std::fmt;

use serde::{Deserialize, Serialize};

pub mod paths;
pub mod steps;

pub use paths::{ReportRoute, ReportRoutes, report_version_id_from_path};

/// One submission of a regulatory report, as addressed in portal paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportVersionId(pub i64);

impl ReportVersionId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ReportVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The independently fetched aspects of a report version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    RegistrationPurpose,
    OperationSummary,
    VerificationRequirement,
    SupplementaryFlag,
}

impl StateKind {
    pub const ALL: [StateKind; 4] = [
        StateKind::RegistrationPurpose,
        StateKind::OperationSummary,
        StateKind::VerificationRequirement,
        StateKind::SupplementaryFlag,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StateKind::RegistrationPurpose => "registration_purpose",
            StateKind::OperationSummary => "operation_summary",
            StateKind::VerificationRequirement => "verification_requirement",
            StateKind::SupplementaryFlag => "supplementary_flag",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationPurpose {
    #[serde(rename = "OBPS Regulated Operation")]
    RegulatedOperation,
    #[serde(rename = "Opted-in Operation")]
    OptedInOperation,
    #[serde(rename = "New Entrant Operation")]
    NewEntrantOperation,
    #[serde(rename = "Reporting Operation")]
    ReportingOperation,
    #[serde(rename = "Electricity Import Operation")]
    ElectricityImportOperation,
    #[serde(rename = "Potential Reporting Operation")]
    PotentialReportingOperation,
    #[serde(other)]
    Other,
}

impl RegistrationPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationPurpose::RegulatedOperation => "OBPS Regulated Operation",
            RegistrationPurpose::OptedInOperation => "Opted-in Operation",
            RegistrationPurpose::NewEntrantOperation => "New Entrant Operation",
            RegistrationPurpose::ReportingOperation => "Reporting Operation",
            RegistrationPurpose::ElectricityImportOperation => "Electricity Import Operation",
            RegistrationPurpose::PotentialReportingOperation => "Potential Reporting Operation",
            RegistrationPurpose::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    #[serde(rename = "Single Facility Operation")]
    SingleFacility,
    #[serde(rename = "Linear Facility Operation")]
    LinearFacility,
    #[serde(rename = "Electricity Import Operation")]
    ElectricityImport,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    #[serde(rename = "Draft")]
    Draft,
    #[serde(rename = "Draft Supplementary")]
    DraftSupplementary,
    #[serde(rename = "Submitted")]
    Submitted,
    #[serde(rename = "Submitted Supplementary")]
    SubmittedSupplementary,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub operation_type: OperationType,
    #[serde(rename = "report_status")]
    pub status: ReportStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistrationPurposeResponse {
    pub registration_purpose: RegistrationPurpose,
}

/// Credential forwarded to the report API on behalf of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityToken {
    /// Raw `Authorization` header value presented by the caller.
    Bearer(String),
    UserGuid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    RedirectTo(String),
}

impl Decision {
    pub fn location(&self) -> Option<&str> {
        match self {
            Decision::Proceed => None,
            Decision::RedirectTo(location) => Some(location.as_str()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Proceed => "proceed",
            Decision::RedirectTo(_) => "redirect",
        }
    }
}
