//! Fuzz target for ID token decoding
//!
//! Exercises header/payload decoding and claim parsing on malformed input.
//! Signatures are not verified here.

#![no_main]

use libfuzzer_sys::fuzz_target;
use oidc_flow::oidc::{decode_unverified, ValidationReason};

fuzz_target!(|data: &[u8]| {
    if let Ok(token) = std::str::from_utf8(data) {
        match decode_unverified(token) {
            Ok(decoded) => {
                assert_eq!(token.split('.').count(), 3);
                let _ = decoded.payload.aud.contains(&decoded.payload.sub);
            }
            Err(e) => assert_eq!(e.reason, ValidationReason::Structural),
        }
    }
});
