use crate::{
    transport::{DeviceRequest, Method},
    types::{MirroredState, Page},
};

/// A user request for one device property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    CurrentLimit(u32),
    Led(bool),
    GroundCheck(bool),
    Lock(bool),
    Session(bool),
}

impl Intent {
    /// Page the command is posted to.
    pub fn page(self) -> Page {
        match self {
            Self::CurrentLimit(_) | Self::Led(_) | Self::GroundCheck(_) => Page::Settings,
            Self::Lock(_) | Self::Session(_) => Page::Security,
        }
    }

    pub fn form_body(self) -> String {
        let flag = |on: bool| u8::from(on);
        match self {
            Self::CurrentLimit(amps) => format!("change=%24AMPS+{amps}"),
            Self::Led(on) => format!("change=%24LED+{}", flag(on)),
            Self::GroundCheck(on) => format!("change=%24GROUND+{}", flag(on)),
            Self::Lock(locked) => format!("change1=%24AVAIL+{}", flag(locked)),
            Self::Session(active) => format!("change1=%24TEMPS+{}", flag(active)),
        }
    }

    /// Pages that must be re-read to confirm the command.
    pub fn verify(self) -> VerifyFlags {
        match self.page() {
            Page::Security => VerifyFlags {
                settings: false,
                security: true,
            },
            _ => VerifyFlags {
                settings: true,
                security: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyFlags {
    pub settings: bool,
    pub security: bool,
}

impl VerifyFlags {
    pub fn merge(self, other: Self) -> Self {
        Self {
            settings: self.settings || other.settings,
            security: self.security || other.security,
        }
    }

    pub fn pages(self) -> Vec<Page> {
        let mut pages = Vec::with_capacity(2);
        if self.settings {
            pages.push(Page::Settings);
        }
        if self.security {
            pages.push(Page::Security);
        }
        pages
    }
}

/// Values requested by the newest intent, applied once the device acknowledges it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimisticTargets {
    pub amps: Option<u32>,
    pub led: Option<bool>,
    pub ground_check: Option<bool>,
    pub locked: Option<bool>,
    pub session: Option<bool>,
}

impl OptimisticTargets {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Replaces every slot with the single value carried by `intent`.
    pub fn replace_with(&mut self, intent: Intent) {
        self.clear();
        match intent {
            Intent::CurrentLimit(amps) => self.amps = Some(amps).filter(|amps| *amps > 0),
            Intent::Led(on) => self.led = Some(on),
            Intent::GroundCheck(on) => self.ground_check = Some(on),
            Intent::Lock(locked) => self.locked = Some(locked),
            Intent::Session(active) => self.session = Some(active),
        }
    }

    /// Writes the filled slots into `state` and empties them.
    pub fn apply_to(&mut self, state: &mut MirroredState) {
        if let Some(amps) = self.amps {
            state.target_amps = amps as f32;
        }
        if let Some(on) = self.led {
            state.led_on = on;
        }
        if let Some(on) = self.ground_check {
            state.ground_check = on;
        }
        if let Some(locked) = self.locked {
            state.locked = locked;
        }
        if let Some(active) = self.session {
            state.session_active = active;
        }
        self.clear();
    }
}

/// The single queued command waiting for its anti-flap delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub intent: Intent,
    pub body: String,
    pub verify: VerifyFlags,
    pub issued_ms: u64,
}

impl PendingCommand {
    pub fn new(intent: Intent, now_ms: u64) -> Self {
        Self {
            intent,
            body: intent.form_body(),
            verify: intent.verify(),
            issued_ms: now_ms,
        }
    }

    pub fn is_due(&self, now_ms: u64, anti_flap_delay_ms: u64) -> bool {
        now_ms.saturating_sub(self.issued_ms) >= anti_flap_delay_ms
    }

    pub fn request(&self, timeout_ms: u64) -> DeviceRequest {
        DeviceRequest {
            method: Method::Post,
            path: self.intent.page().path(),
            body: Some(self.body.clone()),
            timeout_ms,
        }
    }
}

/// Re-read deadline armed by an acknowledged command or a session reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationTimer {
    pub deadline_ms: u64,
    pub verify: VerifyFlags,
}

impl VerificationTimer {
    pub fn is_due(&self, now_ms: u64) -> bool {
        now_ms >= self.deadline_ms
    }
}
