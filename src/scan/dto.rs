use serde::Serialize;
use uuid::Uuid;

use super::scanner::{ScanError, ScanState};
use crate::profiles::Profile;

/// What a finished scan resolved to. `profile` is `None` for ids the store
/// has never issued.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ScanError>,
}

/// Result slot of the most recent live scan. Only the session named here
/// may fill `report`.
#[derive(Debug, Default)]
pub struct LastScan {
    pub session: Option<Uuid>,
    pub report: Option<ScanReport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatus {
    pub is_scanning: bool,
    pub state: ScanState,
    pub last_result: Option<ScanReport>,
}

#[derive(Debug, Serialize)]
pub struct FrameAck {
    pub accepted: bool,
}
