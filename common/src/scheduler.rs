//! Per-tick decision table, kept free of I/O so the priority order can be
//! checked on its own.

use crate::{
    command::{VerificationTimer, VerifyFlags},
    config::BridgeConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    InitialSyncing,
    Idle,
    CommandPending,
    Verifying,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::InitialSyncing => "INITIAL_SYNCING",
            Self::Idle => "IDLE",
            Self::CommandPending => "COMMAND_PENDING",
            Self::Verifying => "VERIFYING",
        }
    }
}

/// The one thing a tick is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    Wait,
    InitialSync,
    DispatchCommand,
    Verify(VerifyFlags),
    PollLive,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerInputs {
    pub now_ms: u64,
    pub uptime_ms: u64,
    pub link_up: bool,
    pub initial_sync_done: bool,
    pub command_issued_ms: Option<u64>,
    pub verification: Option<VerificationTimer>,
    pub last_live_ms: u64,
}

impl SchedulerInputs {
    pub fn phase(&self) -> Phase {
        if !self.link_up {
            Phase::Disconnected
        } else if !self.initial_sync_done {
            Phase::InitialSyncing
        } else if self.command_issued_ms.is_some() {
            Phase::CommandPending
        } else if self.verification.is_some() {
            Phase::Verifying
        } else {
            Phase::Idle
        }
    }
}

pub fn next_action(inputs: &SchedulerInputs, config: &BridgeConfig) -> TickAction {
    match inputs.phase() {
        Phase::Disconnected => TickAction::Wait,
        Phase::InitialSyncing => {
            if inputs.uptime_ms > config.initial_sync_delay_ms {
                TickAction::InitialSync
            } else {
                TickAction::Wait
            }
        }
        _ => {
            if let Some(issued_ms) = inputs.command_issued_ms {
                if inputs.now_ms.saturating_sub(issued_ms) >= config.anti_flap_delay_ms {
                    return TickAction::DispatchCommand;
                }
            }

            if let Some(timer) = inputs.verification {
                // An armed verification also holds back routine polling.
                return if timer.is_due(inputs.now_ms) {
                    TickAction::Verify(timer.verify)
                } else {
                    TickAction::Wait
                };
            }

            let live_due = inputs.now_ms.saturating_sub(inputs.last_live_ms)
                >= config.live_poll_interval_ms;
            if live_due {
                TickAction::PollLive
            } else {
                TickAction::Wait
            }
        }
    }
}
