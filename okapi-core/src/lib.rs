pub mod catalog;
pub mod config;
pub mod discovery;
pub mod error;
pub mod module;
pub mod route;
pub mod tenant;

pub use catalog::ModuleCatalog;
pub use config::OkapiConfig;
pub use discovery::{DeploymentDescriptor, DiscoveryManager};
pub use error::OkapiError;
pub use module::{Interface, ModuleDescriptor};
pub use route::{ProxyType, RoutingEntry};
pub use tenant::{Tenant, TenantRegistry};
