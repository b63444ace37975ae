pub mod auth;
pub mod builder;
pub mod context;
pub mod headers;

pub use auth::{decode_tenant_from_token, AuthHeaderPlanner};
pub use builder::PipelineBuilder;
pub use context::{ModuleInstance, ProxyContext};
pub use headers::HeaderList;
