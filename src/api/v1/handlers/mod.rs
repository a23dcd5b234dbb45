pub mod health;
pub mod introspection;
pub mod jwks;
pub mod permission;
pub mod resources;
pub mod token;
