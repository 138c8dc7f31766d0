//! Token endpoint grants and client authentication.

mod auth;
mod client;
mod types;

pub use auth::ClientAuth;
pub use client::{TokenClient, HTTP_TIMEOUT_SECS};
pub use types::{TokenErrorResponse, TokenSet, TokenTypeHint};

pub(crate) use client::{network_error, parse_token_set, read_body};
