use tracing::{debug, info, warn};

use crate::{
    command::{Intent, OptimisticTargets, PendingCommand, VerificationTimer, VerifyFlags},
    config::BridgeConfig,
    extract::{LiveReading, SecurityReading, SettingsReading},
    scheduler::{next_action, Phase, SchedulerInputs, TickAction},
    transport::{DeviceRequest, Transport},
    types::{BridgeStatus, MirroredState, Page},
    watchdog::ConnectivityWatchdog,
};

/// Mirror of one charger, driven by repeated calls to [`ChargerBridge::tick`].
///
/// All device I/O happens inside `tick`, one blocking request at a time.
/// The `set_*` operations only queue work for a later tick.
pub struct ChargerBridge<T> {
    pub config: BridgeConfig,
    transport: T,

    state: MirroredState,
    watchdog: ConnectivityWatchdog,
    dirty: bool,

    started_ms: u64,
    link_up: bool,
    initial_sync_done: bool,
    last_live_ms: u64,
    previous_duration_s: u32,

    pending: Option<PendingCommand>,
    optimistic: OptimisticTargets,
    verification: Option<VerificationTimer>,
}

impl<T: Transport> ChargerBridge<T> {
    pub fn new(mut config: BridgeConfig, transport: T, now_ms: u64) -> Self {
        config.sanitize();
        Self {
            watchdog: ConnectivityWatchdog::new(config.offline_timeout_ms, now_ms),
            config,
            transport,
            state: MirroredState::default(),
            dirty: false,
            started_ms: now_ms,
            link_up: false,
            initial_sync_done: false,
            last_live_ms: now_ms,
            previous_duration_s: 0,
            pending: None,
            optimistic: OptimisticTargets::default(),
            verification: None,
        }
    }

    pub fn state(&self) -> &MirroredState {
        &self.state
    }

    pub fn is_online(&self) -> bool {
        self.watchdog.is_online()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns whether new data was available and clears the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn pending_command(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    pub fn optimistic(&self) -> &OptimisticTargets {
        &self.optimistic
    }

    pub fn verification(&self) -> Option<VerificationTimer> {
        self.verification
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn phase(&self) -> Phase {
        self.scheduler_inputs(self.started_ms).phase()
    }

    pub fn status(&self, now_ms: u64) -> BridgeStatus {
        BridgeStatus {
            online: self.is_online(),
            phase: self.phase().as_str(),
            status_text: self.state.status_text.clone(),
            voltage: self.state.voltage,
            current: self.state.current,
            session_energy: self.state.session_energy,
            total_energy: self.state.total_energy,
            duration_s: self.state.duration_s,
            target_amps: self.state.target_amps,
            led_on: self.state.led_on,
            ground_check: self.state.ground_check,
            locked: self.state.locked,
            session_active: self.state.session_active,
            command_pending: self.pending.is_some(),
            verify_pending: self.verification.is_some(),
            last_success_ago_ms: self.watchdog.silence_ms(now_ms),
        }
    }

    /// Queues a new current limit. Limits below 1 A are refused.
    pub fn set_current_limit(&mut self, amps: f32, now_ms: u64) -> bool {
        if !amps.is_finite() || amps < 1.0 {
            warn!("refusing current limit {amps} A: minimum is 1 A");
            return false;
        }
        self.queue(Intent::CurrentLimit(amps.trunc() as u32), now_ms)
    }

    pub fn set_led(&mut self, on: bool, now_ms: u64) -> bool {
        self.queue(Intent::Led(on), now_ms)
    }

    pub fn set_ground_check(&mut self, on: bool, now_ms: u64) -> bool {
        self.queue(Intent::GroundCheck(on), now_ms)
    }

    pub fn set_lock(&mut self, locked: bool, now_ms: u64) -> bool {
        self.queue(Intent::Lock(locked), now_ms)
    }

    /// Starts or stops a session. Ignored unless the charger is locked.
    pub fn set_session(&mut self, active: bool, now_ms: u64) -> bool {
        if !self.state.locked {
            debug!("ignoring session change while unlocked");
            return false;
        }
        self.queue(Intent::Session(active), now_ms)
    }

    pub fn submit(&mut self, intent: Intent, now_ms: u64) -> bool {
        match intent {
            Intent::CurrentLimit(amps) => self.set_current_limit(amps as f32, now_ms),
            Intent::Led(on) => self.set_led(on, now_ms),
            Intent::GroundCheck(on) => self.set_ground_check(on, now_ms),
            Intent::Lock(locked) => self.set_lock(locked, now_ms),
            Intent::Session(active) => self.set_session(active, now_ms),
        }
    }

    /// Runs at most one scheduled action and reports which one it was.
    pub fn tick(&mut self, now_ms: u64, link_up: bool) -> TickAction {
        self.link_up = link_up;

        let reason = self.config.offline_reason();
        if self.watchdog.check_timeout(now_ms, &reason) {
            self.state.status_text = reason;
            self.dirty = true;
        }

        let action = next_action(&self.scheduler_inputs(now_ms), &self.config);
        match action {
            TickAction::Wait => {}
            TickAction::InitialSync => {
                info!("initial sync with charger");
                self.fetch_page(Page::Settings, now_ms);
                self.fetch_page(Page::Security, now_ms);
                self.initial_sync_done = true;
                self.last_live_ms = now_ms;
                self.dirty = true;
            }
            TickAction::DispatchCommand => {
                self.execute_command(now_ms);
                self.last_live_ms = now_ms;
            }
            TickAction::Verify(verify) => {
                self.verification = None;
                for page in verify.pages() {
                    self.fetch_page(page, now_ms);
                }
                self.dirty = true;
            }
            TickAction::PollLive => {
                self.fetch_page(Page::Status, now_ms);
                self.last_live_ms = now_ms;
            }
        }

        action
    }

    fn scheduler_inputs(&self, now_ms: u64) -> SchedulerInputs {
        SchedulerInputs {
            now_ms,
            uptime_ms: now_ms.saturating_sub(self.started_ms),
            link_up: self.link_up,
            initial_sync_done: self.initial_sync_done,
            command_issued_ms: self.pending.as_ref().map(|command| command.issued_ms),
            verification: self.verification,
            last_live_ms: self.last_live_ms,
        }
    }

    fn queue(&mut self, intent: Intent, now_ms: u64) -> bool {
        self.optimistic.replace_with(intent);
        let command = PendingCommand::new(intent, now_ms);
        debug!("queued {:?} ({})", intent, command.body);
        self.pending = Some(command);
        true
    }

    fn execute_command(&mut self, now_ms: u64) {
        let Some(command) = self.pending.take() else {
            return;
        };

        let request = command.request(self.config.command_timeout_ms);
        let response = match self.transport.request(&request) {
            Ok(response) => response,
            Err(err) => {
                warn!("CMD: {} failed: {err}", command.body);
                return;
            }
        };

        info!("CMD: {} -> {}", command.body, response.status);
        self.mark_success(now_ms);

        if response.status != 200 {
            return;
        }

        self.optimistic.apply_to(&mut self.state);
        self.arm_verification(now_ms + self.config.verify_delay_ms, command.verify);
        self.dirty = true;
    }

    fn arm_verification(&mut self, deadline_ms: u64, verify: VerifyFlags) {
        let verify = self
            .verification
            .map(|timer| timer.verify.merge(verify))
            .unwrap_or(verify);
        self.verification = Some(VerificationTimer {
            deadline_ms,
            verify,
        });
    }

    fn mark_success(&mut self, now_ms: u64) {
        if self.watchdog.mark_success(now_ms) {
            self.dirty = true;
        }
    }

    fn fetch_page(&mut self, page: Page, now_ms: u64) {
        let timeout_ms = match page {
            Page::Status => self.config.live_timeout_ms,
            Page::Settings | Page::Security => self.config.page_timeout_ms,
        };
        let Some(html) = self.fetch(page, timeout_ms, now_ms) else {
            return;
        };

        let before = self.state.clone();
        match page {
            Page::Status => self.apply_live(LiveReading::parse(&html), now_ms),
            Page::Settings => {
                SettingsReading::parse(&html, self.state.total_energy).apply(&mut self.state)
            }
            Page::Security => SecurityReading::parse(&html).apply(&mut self.state),
        }

        if self.state != before {
            self.dirty = true;
        }
    }

    fn apply_live(&mut self, reading: LiveReading, now_ms: u64) {
        // A duration that falls back to zero usually means the device reset its session.
        if self.previous_duration_s > 0 && reading.duration_s == 0 {
            info!("session duration reset; re-reading settings");
            self.arm_verification(
                now_ms + self.config.reset_verify_delay_ms,
                VerifyFlags {
                    settings: true,
                    security: false,
                },
            );
        }
        self.previous_duration_s = reading.duration_s;
        reading.apply(&mut self.state);
    }

    fn fetch(&mut self, page: Page, timeout_ms: u64, now_ms: u64) -> Option<String> {
        let request = DeviceRequest::get(page.path(), timeout_ms);
        match self.transport.request(&request) {
            Ok(response) => {
                self.mark_success(now_ms);
                if response.is_success() {
                    Some(response.body)
                } else {
                    warn!("{} page answered {}", page.as_str(), response.status);
                    None
                }
            }
            Err(err) => {
                warn!("{} page fetch failed: {err}", page.as_str());
                None
            }
        }
    }
}
