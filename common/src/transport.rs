use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    pub method: Method,
    pub path: &'static str,
    /// Urlencoded form body; only present on POST.
    pub body: Option<String>,
    pub timeout_ms: u64,
}

impl DeviceRequest {
    pub fn get(path: &'static str, timeout_ms: u64) -> Self {
        Self {
            method: Method::Get,
            path,
            body: None,
            timeout_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResponse {
    pub status: u16,
    pub body: String,
}

impl DeviceResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// Blocking request/response access to the charger's web server.
///
/// Called at most once at a time; implementations must honor `timeout_ms`.
pub trait Transport {
    fn request(&mut self, request: &DeviceRequest) -> Result<DeviceResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn request(&mut self, request: &DeviceRequest) -> Result<DeviceResponse, TransportError> {
        (**self).request(request)
    }
}
