//! JWS primitives: algorithm table, signature engines, hash bindings.
//!
//! Nothing in here knows about keys rotation or token formats; callers hand in
//! key material and an opaque signing input.

pub mod algorithm;
pub mod error;
pub mod hash_binding;
pub mod key_material;
pub mod random;
pub mod signature;

pub use algorithm::{AlgorithmFamily, DigestAlgorithm, SignatureAlgorithm};
pub use error::CryptoError;
pub use hash_binding::HashBinder;
pub use key_material::KeyMaterial;
pub use signature::{SignatureEngine, engine_for};
