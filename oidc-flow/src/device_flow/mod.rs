//! OAuth 2.0 Device Authorization Grant (RFC 8628) implementation.
//!
//! Lets users authenticate on devices with limited input capabilities by
//! completing authentication on a secondary device (phone, browser), while
//! the client polls the token endpoint in a cancellable background task.

pub mod client;
pub mod poller;
pub mod types;

pub use client::DEVICE_CODE_GRANT_TYPE;
pub use poller::{
    DeviceFlowEvent, DeviceFlowOutcome, DeviceGrant, DevicePollHandle, DevicePoller, PollerConfig,
};
pub use types::{
    DeviceAuthorizationResponse, DeviceAuthorizationSession, DevicePollResponse, DeviceStatus,
};
