pub mod introspection;
pub mod permission;
pub mod resources;
pub mod token;
