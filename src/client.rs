// HTTP client for the rover API (teleop, scripts, smoke tests)

use std::time::Duration;

use reqwest::{Client, Response};
use tracing::{debug, info};

use crate::messages::{ActionReply, ErrorReply, StatusReply};
use crate::motor::Maneuver;

/// Timeout for calls that wait on hardware (motion, capture)
pub const HARDWARE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for quick calls (stop, status)
pub const QUICK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rover replied {status}: {message}")]
    Rejected { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Talks to one rover at `base_url` (e.g. `http://192.168.1.100`)
#[derive(Debug, Clone)]
pub struct RoverClient {
    http: Client,
    base_url: String,
}

impl RoverClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Client for a rover known by address only
    pub fn for_host(host: &str) -> Self {
        Self::new(format!("http://{}", host))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a maneuver for `duration_ms` (the rover clamps it to 50-5000)
    pub async fn drive(&self, maneuver: Maneuver, duration_ms: u32) -> Result<ActionReply> {
        if maneuver == Maneuver::Stop {
            return self.stop().await;
        }
        info!("Requesting {} for {}ms", maneuver, duration_ms);
        let response = self
            .http
            .get(self.url(&format!("/api/motor/{}", maneuver.action())))
            .query(&[("duration", duration_ms)])
            .timeout(HARDWARE_TIMEOUT)
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    pub async fn stop(&self) -> Result<ActionReply> {
        info!("Requesting stop");
        let response = self
            .http
            .get(self.url("/api/motor/stop"))
            .timeout(QUICK_TIMEOUT)
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    /// Capture a photo and return the JPEG bytes
    pub async fn capture_photo(&self) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(self.url("/api/camera/photo"))
            .timeout(HARDWARE_TIMEOUT)
            .send()
            .await?;
        let bytes = checked(response).await?.bytes().await?;
        info!("Photo received ({} bytes)", bytes.len());
        Ok(bytes.to_vec())
    }

    pub async fn status(&self) -> Result<StatusReply> {
        let response = self
            .http
            .get(self.url("/api/status"))
            .timeout(QUICK_TIMEOUT)
            .send()
            .await?;
        let status: StatusReply = checked(response).await?.json().await?;
        debug!("Status: {:?}", status);
        Ok(status)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn non-2xx replies into `Rejected`, using the JSON error message if any
async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorReply>(&body)
        .map(|e| e.message)
        .unwrap_or(body);
    Err(ClientError::Rejected {
        status: status.as_u16(),
        message,
    })
}
