//! Cancellable polling loop for the device authorization grant.
//!
//! [`DevicePoller::start`] spawns the loop on the tokio runtime and hands
//! back a [`DevicePollHandle`]. The presentation layer reads
//! [`DeviceFlowEvent`]s from the handle to show the user code and follow
//! progress, and may cancel at any time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::types::{
    DeviceAuthorizationResponse, DeviceAuthorizationSession, DevicePollResponse, DeviceStatus,
    MIN_INTERVAL_SECS,
};
use crate::error::OidcError;
use crate::token::TokenSet;

/// Upper bound on any single wait derived from provider-supplied values
const MAX_WAIT_SECS: u64 = 60 * 60 * 24 * 365;

/// Network operations the poller needs. Implemented by
/// [`TokenClient`](crate::token::TokenClient); tests script it.
#[async_trait]
pub trait DeviceGrant: Send + Sync {
    /// POST to the device authorization endpoint.
    async fn request_device_authorization(
        &self,
        scope: &str,
    ) -> Result<DeviceAuthorizationResponse, OidcError>;

    /// Poll the token endpoint once with the device code grant.
    async fn poll_device_token(&self, device_code: &str) -> Result<DevicePollResponse, OidcError>;
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Scope sent with the device authorization request
    pub scope: String,
    /// Give up earlier than the device code's own expiry
    pub timeout: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            scope: "openid".to_string(),
            timeout: None,
        }
    }
}

/// Progress notifications, in order.
///
/// `Pending` is sent when the session is first established and again after
/// every non-terminal poll response, carrying the current interval. The
/// state sequence `Requesting -> Pending x3 -> Authorized` for three
/// `authorization_pending` answers therefore yields four `Pending` events:
/// one on entry and one per pending answer. Exactly one terminal event
/// closes the stream, unless the flow is cancelled, in which case nothing
/// further is sent.
#[derive(Debug, Clone)]
pub enum DeviceFlowEvent {
    Requesting,
    Pending(DeviceAuthorizationSession),
    Authorized(TokenSet),
    Denied,
    Expired,
    Error {
        code: Option<String>,
        message: String,
    },
}

/// How a device flow ended.
#[derive(Debug)]
pub enum DeviceFlowOutcome {
    Authorized(TokenSet),
    Denied,
    Expired,
    Error(OidcError),
    Cancelled,
}

/// Drives one device authorization from request to terminal state.
pub struct DevicePoller<G: ?Sized> {
    grant: Arc<G>,
    config: PollerConfig,
}

impl<G: DeviceGrant + ?Sized + 'static> DevicePoller<G> {
    pub fn new(grant: Arc<G>, config: PollerConfig) -> Self {
        Self { grant, config }
    }

    /// Spawn the polling task. Must be called within a tokio runtime.
    pub fn start(self) -> DevicePollHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let emitter = Emitter {
            events: event_tx,
            cancel: cancel_rx.clone(),
        };
        let task = tokio::spawn(run(self.grant, self.config, cancel_rx, emitter));

        DevicePollHandle {
            cancel: cancel_tx,
            events: event_rx,
            task,
        }
    }
}

/// Owner's side of a running device flow. Dropping it cancels the flow.
pub struct DevicePollHandle {
    cancel: watch::Sender<bool>,
    events: mpsc::UnboundedReceiver<DeviceFlowEvent>,
    task: JoinHandle<DeviceFlowOutcome>,
}

impl DevicePollHandle {
    /// Stop polling. Takes effect immediately: the pending timer is dropped,
    /// no further request is sent and no further event is delivered.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Next progress event; `None` once the flow has finished or was cancelled.
    pub async fn next_event(&mut self) -> Option<DeviceFlowEvent> {
        if self.is_cancelled() {
            return None;
        }
        let event = self.events.recv().await?;
        if self.is_cancelled() {
            return None;
        }
        Some(event)
    }

    /// Wait for the flow to finish.
    pub async fn outcome(self) -> DeviceFlowOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => DeviceFlowOutcome::Cancelled,
        }
    }
}

struct Emitter {
    events: mpsc::UnboundedSender<DeviceFlowEvent>,
    cancel: watch::Receiver<bool>,
}

impl Emitter {
    fn emit(&self, event: DeviceFlowEvent) {
        if *self.cancel.borrow() {
            return;
        }
        // The receiver may already be gone; the flow still runs to its end
        let _ = self.events.send(event);
    }

    fn error(&self, error: &OidcError) {
        self.emit(DeviceFlowEvent::Error {
            code: error.oauth_error().map(str::to_string),
            message: error.to_string(),
        });
    }
}

/// Resolves once cancellation is requested or the handle is dropped.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

async fn run<G: DeviceGrant + ?Sized>(
    grant: Arc<G>,
    config: PollerConfig,
    mut cancel: watch::Receiver<bool>,
    emitter: Emitter,
) -> DeviceFlowOutcome {
    emitter.emit(DeviceFlowEvent::Requesting);

    let requested = tokio::select! {
        biased;
        _ = cancelled(&mut cancel) => return DeviceFlowOutcome::Cancelled,
        result = grant.request_device_authorization(&config.scope) => result,
    };

    let response = match requested {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Device authorization request failed");
            emitter.error(&e);
            return DeviceFlowOutcome::Error(e);
        }
    };

    let started = Instant::now();
    let mut deadline = started + Duration::from_secs(response.expires_in.min(MAX_WAIT_SECS));
    if let Some(timeout) = config.timeout {
        if let Some(limit) = started.checked_add(timeout) {
            deadline = deadline.min(limit);
        }
    }

    let mut session = DeviceAuthorizationSession::from_response(response, Utc::now());
    info!(
        verification_uri = session.verification_uri(),
        interval = session.interval(),
        expires_in = session.expires_in(),
        "Device authorization pending"
    );
    emitter.emit(DeviceFlowEvent::Pending(session.clone()));

    loop {
        let interval = session.interval().clamp(MIN_INTERVAL_SECS, MAX_WAIT_SECS);
        let next_poll = Instant::now() + Duration::from_secs(interval);

        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return DeviceFlowOutcome::Cancelled,
            _ = sleep_until(next_poll.min(deadline)) => {}
        }

        if Instant::now() >= deadline {
            info!("Device authorization deadline reached");
            session.transition(DeviceStatus::Expired);
            emitter.emit(DeviceFlowEvent::Expired);
            return DeviceFlowOutcome::Expired;
        }

        let polled = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return DeviceFlowOutcome::Cancelled,
            result = grant.poll_device_token(session.device_code()) => result,
        };

        match polled {
            Ok(DevicePollResponse::Token(tokens)) => {
                info!("Device authorization granted");
                session.transition(DeviceStatus::Authorized);
                emitter.emit(DeviceFlowEvent::Authorized(tokens.clone()));
                return DeviceFlowOutcome::Authorized(tokens);
            }
            Ok(DevicePollResponse::AuthorizationPending) => {
                debug!("Authorization pending");
                emitter.emit(DeviceFlowEvent::Pending(session.clone()));
            }
            Ok(DevicePollResponse::SlowDown) => {
                session.slow_down();
                debug!(interval = session.interval(), "Slowing down polling");
                emitter.emit(DeviceFlowEvent::Pending(session.clone()));
            }
            Ok(DevicePollResponse::AccessDenied) => {
                info!("Device authorization denied");
                session.transition(DeviceStatus::Denied);
                emitter.emit(DeviceFlowEvent::Denied);
                return DeviceFlowOutcome::Denied;
            }
            Ok(DevicePollResponse::ExpiredToken) => {
                info!("Device code expired");
                session.transition(DeviceStatus::Expired);
                emitter.emit(DeviceFlowEvent::Expired);
                return DeviceFlowOutcome::Expired;
            }
            Ok(DevicePollResponse::Failed {
                status,
                error,
                description,
                body,
            }) => {
                warn!(status, error = %error, "Device token poll failed");
                session.transition(DeviceStatus::Error);
                emitter.emit(DeviceFlowEvent::Error {
                    code: Some(error.clone()),
                    message: description.unwrap_or_else(|| error.clone()),
                });
                return DeviceFlowOutcome::Error(OidcError::TokenExchangeFailed {
                    status,
                    error: Some(error),
                    body,
                });
            }
            Err(e) => {
                warn!(error = %e, "Device token poll failed");
                session.transition(DeviceStatus::Error);
                emitter.error(&e);
                return DeviceFlowOutcome::Error(e);
            }
        }
    }
}
