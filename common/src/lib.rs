pub mod bridge;
pub mod command;
pub mod config;
pub mod extract;
pub mod scheduler;
pub mod topics;
pub mod transport;
pub mod types;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod fixtures;

pub use bridge::ChargerBridge;
pub use command::{Intent, OptimisticTargets, PendingCommand, VerificationTimer, VerifyFlags};
pub use config::{BridgeConfig, DeviceConfig, MqttConfig, RuntimeConfig};
pub use scheduler::{Phase, TickAction};
pub use topics::*;
pub use transport::{DeviceRequest, DeviceResponse, Method, Transport, TransportError};
pub use types::{BridgeStatus, MirroredState, Page};
pub use watchdog::ConnectivityWatchdog;
