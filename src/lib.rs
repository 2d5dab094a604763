//! Client for the littleBits cloudBit HTTP API: read the current input
//! level off the device's push feed, drive the output, and check whether
//! the device is connected. Device id and access token come from
//! <http://control.littlebitscloud.cc/>.

mod wire;

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use reqwest::header;

use wire::StreamLine;
pub use wire::{
    DeviceRef, DeviceStatusEntry, ErrorEnvelope, EventPayload, EventSource, InputEvent, ServerRef,
    UserRef,
};

const DEFAULT_API_BASE: &str = "https://api-http.littlebitscloud.cc";
const ACCEPT_V2: &str = "application/vnd.littlebits.v2+json";
const REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Result of one input read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Current input level, 0-100.
    Ok(u8),
    /// The service refused the read, either as a real HTTP status or as an
    /// error envelope sent down the stream.
    HttpError(u16),
    /// Nothing usable arrived before the deadline. A disconnected device
    /// produces no stream data at all, so this usually means "offline",
    /// not "broken".
    Timeout,
}

/// Result of one output write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Ok,
    HttpError(u16),
    Timeout,
}

/// Connectivity of the configured device, per the account listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Connected,
    Disconnected,
    RequestTimeout,
    /// The listing came back but wasn't a parseable device array.
    InvalidResponse,
    /// The listing parsed but doesn't mention the configured device.
    NotFound,
}

impl fmt::Display for ReadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadOutcome::Ok(percent) => write!(f, "read OK: {percent}"),
            ReadOutcome::HttpError(code) => write!(f, "HTTP error: {code}"),
            ReadOutcome::Timeout => write!(f, "request timed out"),
        }
    }
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOutcome::Ok => write!(f, "sent OK"),
            WriteOutcome::HttpError(code) => write!(f, "HTTP error: {code}"),
            WriteOutcome::Timeout => write!(f, "request timed out"),
        }
    }
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectivityStatus::Connected => "connected",
            ConnectivityStatus::Disconnected => "disconnected",
            ConnectivityStatus::RequestTimeout => "request timed out",
            ConnectivityStatus::InvalidResponse => "invalid response",
            ConnectivityStatus::NotFound => "not found",
        })
    }
}

pub struct Client {
    http: reqwest::Client,
    api_base: String,
    device_id: String,
    token: String,
    timeout: Duration,
}

impl Client {
    pub fn from_env() -> Result<Self> {
        Self::new(
            std::env::var("CLOUDBIT_DEVICE_ID")?,
            std::env::var("CLOUDBIT_ACCESS_TOKEN")?,
        )
    }

    pub fn new(device_id: impl ToString, token: impl ToString) -> Result<Self> {
        Self::with_host(DEFAULT_API_BASE, device_id, token)
    }

    pub fn with_host(
        api_base: impl ToString,
        device_id: impl ToString,
        token: impl ToString,
    ) -> Result<Self> {
        Self::build(
            api_base.to_string(),
            device_id.to_string(),
            token.to_string(),
            REQUEST_TIMEOUT,
        )
    }

    /// Replace the request deadline (applies to the whole client, not to
    /// individual calls).
    pub fn with_timeout(self, timeout: Duration) -> Result<Self> {
        Self::build(self.api_base, self.device_id, self.token, timeout)
    }

    fn build(api_base: String, device_id: String, token: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Client {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            device_id,
            token,
            timeout,
        })
    }

    /// Read the device's current input level off the push feed.
    ///
    /// The endpoint holds the connection open and emits events as they
    /// happen; only the first meaningful line is consumed, then the feed is
    /// hung up. A device that isn't connected never produces data, so a
    /// `Timeout` here is the expected way to observe "offline".
    pub async fn read_setting(&self) -> ReadOutcome {
        match tokio::time::timeout(self.timeout, self.stream_input()).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                log::debug!("input read failed: {err:#}");
                ReadOutcome::Timeout
            }
            Err(_) => ReadOutcome::Timeout,
        }
    }

    /// Set the device's output to `percent` for `duration_ms` milliseconds
    /// (-1: hold until the next write).
    ///
    /// NOTE: the service accepts writes for offline devices, so `Ok` does
    /// not mean the setting reached the hardware. Check `read_status`
    /// first if that matters.
    pub async fn send_setting(&self, percent: u8, duration_ms: i64) -> WriteOutcome {
        match tokio::time::timeout(self.timeout, self.post_output(percent, duration_ms)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                log::debug!("output write failed: {err:#}");
                WriteOutcome::Timeout
            }
            Err(_) => WriteOutcome::Timeout,
        }
    }

    /// Look the device up in the account-wide listing and report whether
    /// the cloud currently sees it.
    pub async fn read_status(&self) -> ConnectivityStatus {
        match tokio::time::timeout(self.timeout, self.fetch_devices()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                log::debug!("status read failed: {err:#}");
                ConnectivityStatus::RequestTimeout
            }
            Err(_) => ConnectivityStatus::RequestTimeout,
        }
    }

    async fn stream_input(&self) -> Result<ReadOutcome> {
        let url = format!("{}/devices/{}/input", self.api_base, self.device_id);
        log::debug!("opening input feed: {url}");

        // returns at response headers; the body is the live feed
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, ACCEPT_V2)
            .send()
            .await?;

        let mut stream = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        let mut eof = false;

        loop {
            let raw = loop {
                if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let mut line: Vec<u8> = buf.drain(..=pos).collect();
                    line.pop();
                    break Some(line);
                }
                if eof {
                    // the feed ended mid-line; classify what's left
                    if buf.is_empty() {
                        break None;
                    }
                    break Some(std::mem::take(&mut buf));
                }
                match stream.next().await {
                    Some(chunk) => buf.extend_from_slice(&chunk?),
                    None => eof = true,
                }
            };

            let raw = match raw {
                Some(raw) => raw,
                None => return Ok(ReadOutcome::Timeout),
            };
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }

            return Ok(match wire::classify_line(line) {
                StreamLine::Error(envelope) => {
                    log::debug!(
                        "in-stream error: {} {}",
                        envelope.status_code,
                        envelope.message
                    );
                    ReadOutcome::HttpError(envelope.status_code)
                }
                StreamLine::Reading(event) => {
                    // the feed never closes itself; hang up now that we
                    // have our event
                    drop(stream);
                    ReadOutcome::Ok(event.payload.percent)
                }
                StreamLine::Unparseable => {
                    log::warn!("unparseable line on input feed, giving up");
                    ReadOutcome::Timeout
                }
            });
        }
    }

    async fn post_output(&self, percent: u8, duration_ms: i64) -> Result<WriteOutcome> {
        let url = format!("{}/devices/{}/output", self.api_base, self.device_id);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&wire::OutputCommand {
                percent,
                duration_ms,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Ok(WriteOutcome::HttpError(status.as_u16()));
        }

        // drain whatever the service echoes back; it carries nothing we use
        resp.text().await?;
        Ok(WriteOutcome::Ok)
    }

    async fn fetch_devices(&self) -> Result<ConnectivityStatus> {
        let url = format!("{}/devices", self.api_base);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, ACCEPT_V2)
            .send()
            .await?;

        let body = resp.text().await?;
        let devices: Vec<DeviceStatusEntry> = match serde_json::from_str(&body) {
            Ok(devices) => devices,
            Err(err) => {
                log::warn!("device listing is not a device array: {err}");
                return Ok(ConnectivityStatus::InvalidResponse);
            }
        };

        Ok(match devices.iter().find(|d| d.id == self.device_id) {
            Some(device) if device.is_connected => ConnectivityStatus::Connected,
            Some(_) => ConnectivityStatus::Disconnected,
            None => ConnectivityStatus::NotFound,
        })
    }
}
