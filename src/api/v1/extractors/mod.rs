mod auth_ctx;
mod request_meta;

pub use auth_ctx::{AuthCtx, AuthCtxExtractor};
pub use request_meta::RequestMeta;
