use serde::{Deserialize, Serialize};
use validator::Validate;

use super::case::CaseSnapshot;
use super::session::SessionSnapshot;

#[derive(Debug, Deserialize, Validate)]
pub struct FileReportRequest {
    #[validate(length(
        max = 2000,
        message = "Description must be at most 2000 characters"
    ))]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportReceipt {
    pub report_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FileReportResponse {
    pub report_id: Option<i64>,
    pub session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct CaseReportResponse {
    pub report_id: Option<i64>,
    pub case: CaseSnapshot,
}
