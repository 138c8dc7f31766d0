//! ID token handling and validation.

pub mod keys;
pub mod token;
pub mod validation;

pub use keys::{KeyResolutionError, KeyResolver, StaticKeyResolver};
pub use token::{decode_unverified, DecodedIdToken, IdTokenClaims, IdTokenHeader, StringOrVec};
pub use validation::{
    ExpectedClaims, IdTokenValidationError, IdTokenValidator, ValidationConfig, ValidationReason,
};
