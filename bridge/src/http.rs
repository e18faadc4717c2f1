use std::time::Duration;

use anyhow::Context;
use chargeu_common::{DeviceRequest, DeviceResponse, Method, Transport, TransportError};
use reqwest::{blocking::Client, header::CONTENT_TYPE};

const CONNECT_TIMEOUT_MS: u64 = 1_500;

/// Blocking HTTP access to the charger's web UI.
///
/// Must be created and dropped outside the async runtime; the bridge actor
/// thread owns it.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(CONNECT_TIMEOUT_MS))
            .build()
            .context("failed to build device http client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Transport for HttpTransport {
    fn request(&mut self, request: &DeviceRequest) -> Result<DeviceResponse, TransportError> {
        let url = self.url(request.path);
        let builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(request.body.clone().unwrap_or_default()),
        };

        let response = builder
            .timeout(Duration::from_millis(request.timeout_ms))
            .send()
            .map_err(|err| classify(err, request.timeout_ms))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| classify(err, request.timeout_ms))?;

        Ok(DeviceResponse { status, body })
    }
}

fn classify(err: reqwest::Error, timeout_ms: u64) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout_ms)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
