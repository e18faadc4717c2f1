use crate::command::Intent;

pub const TOPIC_BRIDGE_STATE: &str = "chargeu/bridge/state";
pub const TOPIC_BRIDGE_AVAILABILITY: &str = "chargeu/bridge/availability";

pub const TOPIC_CMD_AMPS: &str = "chargeu/cmnd/amps";
pub const TOPIC_CMD_LED: &str = "chargeu/cmnd/led";
pub const TOPIC_CMD_GROUND: &str = "chargeu/cmnd/ground";
pub const TOPIC_CMD_LOCK: &str = "chargeu/cmnd/lock";
pub const TOPIC_CMD_SESSION: &str = "chargeu/cmnd/session";

pub const COMMAND_TOPICS: [&str; 5] = [
    TOPIC_CMD_AMPS,
    TOPIC_CMD_LED,
    TOPIC_CMD_GROUND,
    TOPIC_CMD_LOCK,
    TOPIC_CMD_SESSION,
];

pub fn parse_switch(payload: &str) -> Option<bool> {
    match payload.trim().to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Some(true),
        "off" | "0" | "false" => Some(false),
        _ => None,
    }
}

/// Maps a command topic and its payload to an intent; `None` for anything unrecognized.
pub fn intent_for_topic(topic: &str, payload: &str) -> Option<Intent> {
    match topic {
        TOPIC_CMD_AMPS => {
            let amps = payload.trim().parse::<f32>().ok()?;
            if !amps.is_finite() || amps < 0.0 {
                return None;
            }
            Some(Intent::CurrentLimit(amps.trunc() as u32))
        }
        TOPIC_CMD_LED => parse_switch(payload).map(Intent::Led),
        TOPIC_CMD_GROUND => parse_switch(payload).map(Intent::GroundCheck),
        TOPIC_CMD_LOCK => parse_switch(payload).map(Intent::Lock),
        TOPIC_CMD_SESSION => parse_switch(payload).map(Intent::Session),
        _ => None,
    }
}
