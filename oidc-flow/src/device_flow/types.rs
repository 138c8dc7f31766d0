//! Types for OAuth 2.0 Device Authorization Grant.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::token::{TokenErrorResponse, TokenSet};

/// Increment applied to the polling interval on `slow_down` (RFC 8628 Section 3.5).
pub const SLOW_DOWN_INCREMENT_SECS: u64 = 5;

/// Polling interval used when the provider does not send one.
pub const DEFAULT_INTERVAL_SECS: u64 = 5;

/// Floor on the polling interval; a provider sending `interval: 0` is
/// polled once per second.
pub const MIN_INTERVAL_SECS: u64 = 1;

/// Largest `expires_in` honoured when computing the expiry timestamp.
const MAX_LIFETIME_SECS: u64 = (i64::MAX / 1000) as u64;

/// Response from the device authorization endpoint.
#[derive(Clone, Deserialize, Serialize)]
pub struct DeviceAuthorizationResponse {
    /// The device verification code.
    pub device_code: String,

    /// The end-user verification code displayed to the user.
    pub user_code: String,

    /// The URI the user should visit to authorize.
    pub verification_uri: String,

    /// Optional verification URI that includes the user_code.
    #[serde(default)]
    pub verification_uri_complete: Option<String>,

    /// Lifetime of the device_code in seconds.
    pub expires_in: u64,

    /// Minimum polling interval in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl fmt::Debug for DeviceAuthorizationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAuthorizationResponse")
            .field("device_code", &"<redacted>")
            .field("user_code", &self.user_code)
            .field("verification_uri", &self.verification_uri)
            .field("verification_uri_complete", &self.verification_uri_complete)
            .field("expires_in", &self.expires_in)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Outcome of a single device token poll.
#[derive(Debug, Clone)]
pub enum DevicePollResponse {
    /// The user approved; tokens issued.
    Token(TokenSet),
    /// The authorization request is still pending user action.
    AuthorizationPending,
    /// The client is polling too fast; should slow down.
    SlowDown,
    /// The user denied the authorization request.
    AccessDenied,
    /// The device code has expired.
    ExpiredToken,
    /// Any other error response.
    Failed {
        status: u16,
        error: String,
        description: Option<String>,
        body: String,
    },
}

impl TokenErrorResponse {
    /// Classify an error response received while polling; `body` is the raw
    /// response it was parsed from.
    pub fn into_poll_response(self, status: u16, body: String) -> DevicePollResponse {
        match self.error.as_str() {
            "authorization_pending" => DevicePollResponse::AuthorizationPending,
            "slow_down" => DevicePollResponse::SlowDown,
            "access_denied" => DevicePollResponse::AccessDenied,
            "expired_token" => DevicePollResponse::ExpiredToken,
            _ => DevicePollResponse::Failed {
                status,
                error: self.error,
                description: self.error_description,
                body,
            },
        }
    }
}

/// Lifecycle of a device authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Requesting,
    Pending,
    Authorized,
    Denied,
    Expired,
    Error,
}

impl DeviceStatus {
    /// Authorized, Denied, Expired and Error are final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeviceStatus::Authorized
                | DeviceStatus::Denied
                | DeviceStatus::Expired
                | DeviceStatus::Error
        )
    }

    fn rank(&self) -> u8 {
        match self {
            DeviceStatus::Requesting => 0,
            DeviceStatus::Pending => 1,
            _ => 2,
        }
    }
}

/// State of one device authorization, owned by the flow that started it.
#[derive(Clone, Serialize, Deserialize)]
pub struct DeviceAuthorizationSession {
    device_code: String,
    user_code: String,
    verification_uri: String,
    verification_uri_complete: Option<String>,
    interval: u64,
    expires_in: u64,
    expires_at: DateTime<Utc>,
    status: DeviceStatus,
}

impl DeviceAuthorizationSession {
    /// Populate a session from the device authorization response.
    pub fn from_response(response: DeviceAuthorizationResponse, now: DateTime<Utc>) -> Self {
        // Saturates so a hostile expires_in cannot overflow the timestamp
        let lifetime = Duration::seconds(response.expires_in.min(MAX_LIFETIME_SECS) as i64);
        Self {
            device_code: response.device_code,
            user_code: response.user_code,
            verification_uri: response.verification_uri,
            verification_uri_complete: response.verification_uri_complete,
            interval: response.interval.max(MIN_INTERVAL_SECS),
            expires_in: response.expires_in,
            expires_at: now
                .checked_add_signed(lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            status: DeviceStatus::Pending,
        }
    }

    pub fn device_code(&self) -> &str {
        &self.device_code
    }

    /// Code the user types at the verification URI.
    pub fn user_code(&self) -> &str {
        &self.user_code
    }

    pub fn verification_uri(&self) -> &str {
        &self.verification_uri
    }

    pub fn verification_uri_complete(&self) -> Option<&str> {
        self.verification_uri_complete.as_deref()
    }

    /// Current polling interval in seconds.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Lifetime of the device code in seconds, as granted.
    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Apply a `slow_down` response; the new interval holds for all later polls.
    pub fn slow_down(&mut self) {
        self.interval = self.interval.saturating_add(SLOW_DOWN_INCREMENT_SECS);
    }

    /// Move to `to`. Returns false, leaving the status unchanged, when the
    /// move would go backwards or leave a terminal state.
    pub fn transition(&mut self, to: DeviceStatus) -> bool {
        if self.status.is_terminal() || to.rank() < self.status.rank() {
            return false;
        }
        self.status = to;
        true
    }
}

impl fmt::Debug for DeviceAuthorizationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAuthorizationSession")
            .field("device_code", &"<redacted>")
            .field("user_code", &self.user_code)
            .field("verification_uri", &self.verification_uri)
            .field("verification_uri_complete", &self.verification_uri_complete)
            .field("interval", &self.interval)
            .field("expires_at", &self.expires_at)
            .field("status", &self.status)
            .finish()
    }
}
