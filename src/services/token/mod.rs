//! Signed tokens this server issues or accepts: the JWS codec, access tokens
//! (PATs included) and ID tokens.

pub mod access_token;
pub mod error;
pub mod id_token;
pub mod jwt;

pub use access_token::{AccessTokenService, IssuedAccessToken, VerifiedAccessToken};
pub use error::TokenError;
pub use id_token::{IdTokenFactory, IdTokenRequest};
pub use jwt::{JwtHeader, JwtSigner, JwtVerifier, SignedToken};
