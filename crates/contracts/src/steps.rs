//! Well-known step slugs of the report workflow, in workflow order.

pub const REVIEW_OPERATION_INFORMATION: &str = "review-operation-information";
pub const PERSON_RESPONSIBLE: &str = "person-responsible";
pub const REVIEW_FACILITIES: &str = "review-facilities";
pub const FACILITIES: &str = "facilities";
pub const ADDITIONAL_REPORTING_DATA: &str = "additional-reporting-data";
pub const NEW_ENTRANT_INFORMATION: &str = "new-entrant-information";
pub const ELECTRICITY_IMPORT_DATA: &str = "electricity-import-data";
pub const COMPLIANCE_SUMMARY: &str = "compliance-summary";
pub const VERIFICATION: &str = "verification";
pub const ATTACHMENTS: &str = "attachments";
pub const FINAL_REVIEW: &str = "final-review";
pub const SIGN_OFF: &str = "sign-off";
pub const SUBMITTED: &str = "submitted";
pub const CHANGE_REVIEW: &str = "change-review";

pub const ALL: &[&str] = &[
    REVIEW_OPERATION_INFORMATION,
    PERSON_RESPONSIBLE,
    REVIEW_FACILITIES,
    FACILITIES,
    ADDITIONAL_REPORTING_DATA,
    NEW_ENTRANT_INFORMATION,
    ELECTRICITY_IMPORT_DATA,
    COMPLIANCE_SUMMARY,
    VERIFICATION,
    ATTACHMENTS,
    FINAL_REVIEW,
    SIGN_OFF,
    SUBMITTED,
    CHANGE_REVIEW,
];
