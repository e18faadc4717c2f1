use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Page {
    Status,
    Settings,
    Security,
}

impl Page {
    pub fn path(self) -> &'static str {
        match self {
            Self::Status => "/",
            Self::Settings => "/setup",
            Self::Security => "/pass",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Status => "STATUS",
            Self::Settings => "SETTINGS",
            Self::Security => "SECURITY",
        }
    }
}

/// What the bridge currently believes about the charger.
#[derive(Debug, Clone, PartialEq)]
pub struct MirroredState {
    pub voltage: f32,
    pub current: f32,
    pub session_energy: f32,
    pub total_energy: f32,
    pub duration_s: u32,
    pub status_text: String,
    pub target_amps: f32,
    pub led_on: bool,
    pub ground_check: bool,
    pub locked: bool,
    pub session_active: bool,
}

impl Default for MirroredState {
    fn default() -> Self {
        Self {
            voltage: 0.0,
            current: 0.0,
            session_energy: 0.0,
            total_energy: 0.0,
            duration_s: 0,
            status_text: "Wait...".to_string(),
            target_amps: 6.0,
            led_on: false,
            ground_check: false,
            locked: false,
            session_active: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeStatus {
    pub online: bool,
    pub phase: &'static str,
    #[serde(rename = "statusText")]
    pub status_text: String,
    pub voltage: f32,
    pub current: f32,
    #[serde(rename = "sessionEnergy")]
    pub session_energy: f32,
    #[serde(rename = "totalEnergy")]
    pub total_energy: f32,
    #[serde(rename = "durationSec")]
    pub duration_s: u32,
    #[serde(rename = "targetAmps")]
    pub target_amps: f32,
    #[serde(rename = "ledOn")]
    pub led_on: bool,
    #[serde(rename = "groundCheck")]
    pub ground_check: bool,
    pub locked: bool,
    #[serde(rename = "sessionActive")]
    pub session_active: bool,
    #[serde(rename = "commandPending")]
    pub command_pending: bool,
    #[serde(rename = "verifyPending")]
    pub verify_pending: bool,
    #[serde(rename = "lastSuccessAgoMs")]
    pub last_success_ago_ms: u64,
}
