use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeConfig {
    pub offline_timeout_ms: u64,
    pub anti_flap_delay_ms: u64,
    pub verify_delay_ms: u64,
    pub reset_verify_delay_ms: u64,
    pub live_poll_interval_ms: u64,
    pub initial_sync_delay_ms: u64,
    pub live_timeout_ms: u64,
    pub page_timeout_ms: u64,
    pub command_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            offline_timeout_ms: 45_000,
            anti_flap_delay_ms: 1_000,
            verify_delay_ms: 5_000,
            reset_verify_delay_ms: 1_000,
            live_poll_interval_ms: 7_000,
            initial_sync_delay_ms: 5_000,
            live_timeout_ms: 1_500,
            page_timeout_ms: 2_000,
            command_timeout_ms: 5_000,
        }
    }
}

impl BridgeConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        if self.offline_timeout_ms == 0 {
            self.offline_timeout_ms = defaults.offline_timeout_ms;
        }
        if self.live_poll_interval_ms == 0 {
            self.live_poll_interval_ms = defaults.live_poll_interval_ms;
        }
        self.live_timeout_ms = self.live_timeout_ms.clamp(500, 10_000);
        self.page_timeout_ms = self.page_timeout_ms.clamp(500, 10_000);
        self.command_timeout_ms = self.command_timeout_ms.clamp(500, 10_000);

        // Silence must outlast the slowest poll cycle, or a healthy device reads as offline.
        let floor = self.live_poll_interval_ms + self.command_timeout_ms;
        if self.offline_timeout_ms < floor {
            self.offline_timeout_ms = floor;
        }
    }

    pub fn offline_reason(&self) -> String {
        format!("Timeout (>{}s)", self.offline_timeout_ms / 1_000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    pub base_url: String,
    pub wifi_ssid: String,
    pub wifi_pass: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.4.1".to_string(),
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
        }
    }
}

impl DeviceConfig {
    pub fn sanitize(&mut self) {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        self.base_url = if trimmed.is_empty() {
            Self::default().base_url
        } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };
    }

    /// `host:port` of the device, used for link probing.
    pub fn socket_authority(&self) -> String {
        let without_scheme = self
            .base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.base_url);
        let authority = without_scheme.split('/').next().unwrap_or(without_scheme);

        if authority.contains(':') {
            authority.to_string()
        } else {
            format!("{authority}:80")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub client_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: 1883,
            user: String::new(),
            pass: String::new(),
            client_id: "chargeu-bridge".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_link_probe_interval_ms")]
    pub link_probe_interval_ms: u64,
}

fn default_http_port() -> u16 {
    8080
}

fn default_link_probe_interval_ms() -> u64 {
    5_000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            device: DeviceConfig::default(),
            mqtt: MqttConfig::default(),
            http_port: default_http_port(),
            link_probe_interval_ms: default_link_probe_interval_ms(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.bridge.sanitize();
        self.device.sanitize();
        if self.mqtt.client_id.trim().is_empty() {
            self.mqtt.client_id = MqttConfig::default().client_id;
        }
        self.link_probe_interval_ms = self.link_probe_interval_ms.clamp(250, 60_000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_device_timing() {
        let config = BridgeConfig::default();

        assert_eq!(config.offline_timeout_ms, 45_000);
        assert_eq!(config.anti_flap_delay_ms, 1_000);
        assert_eq!(config.verify_delay_ms, 5_000);
        assert_eq!(config.live_poll_interval_ms, 7_000);
        assert_eq!(config.initial_sync_delay_ms, 5_000);
        assert_eq!(config.offline_reason(), "Timeout (>45s)");
    }

    #[test]
    fn sanitize_keeps_offline_timeout_above_poll_cycle() {
        let mut config = BridgeConfig {
            offline_timeout_ms: 3_000,
            ..BridgeConfig::default()
        };
        config.sanitize();

        assert_eq!(config.offline_timeout_ms, 12_000);
    }

    #[test]
    fn base_url_is_normalized() {
        let mut device = DeviceConfig {
            base_url: " 192.168.4.1/ ".to_string(),
            ..DeviceConfig::default()
        };
        device.sanitize();

        assert_eq!(device.base_url, "http://192.168.4.1");
        assert_eq!(device.socket_authority(), "192.168.4.1:80");

        device.base_url = "http://charger.local:8081/".to_string();
        device.sanitize();
        assert_eq!(device.socket_authority(), "charger.local:8081");
    }

    #[test]
    fn partial_runtime_json_fills_defaults() {
        let runtime: RuntimeConfig =
            serde_json::from_str(r#"{"device":{"base_url":"http://10.0.0.7","wifi_ssid":"","wifi_pass":""}}"#)
                .unwrap();

        assert_eq!(runtime.device.base_url, "http://10.0.0.7");
        assert_eq!(runtime.bridge, BridgeConfig::default());
        assert_eq!(runtime.http_port, 8080);
    }
}
