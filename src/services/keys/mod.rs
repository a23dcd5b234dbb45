pub mod error;
pub mod generator;
pub mod registry;
pub mod signing_key;

pub use error::KeyError;
pub use registry::{JwkSet, KeyRegistry, KeySettings};
pub use signing_key::{KeyStatus, SigningKey};
