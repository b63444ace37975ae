use crate::headers::HeaderList;
use okapi_core::module::ModuleDescriptor;
use okapi_core::route::RoutingEntry;
use std::sync::Arc;

/// One pipeline hop: a matched module, the routing entry that matched,
/// the request uri as rewritten by any redirect, and the state the
/// proxy engine fills in just before dispatch (spec.md §3,
/// "ModuleInstance (pipeline hop)").
#[derive(Debug, Clone)]
pub struct ModuleInstance {
    pub module: Arc<ModuleDescriptor>,
    pub entry: RoutingEntry,
    pub uri: String,

    /// Resolved upstream base URL — filled in by discovery just before
    /// dispatch, not at pipeline-build time (spec.md §4.4).
    pub url: Option<String>,

    /// Defaults to the client's token; overwritten from the auth
    /// module's module-token map (spec.md §3, §4.3).
    pub auth_token: Option<String>,
}

impl ModuleInstance {
    pub fn module_name(&self) -> &str {
        self.module.name.as_deref().unwrap_or(&self.module.id)
    }
}

/// Per-request state threaded through pipeline construction, header
/// planning, and proxying. Owned by the request that created it; dies
/// with the response (spec.md §3, "Ownership").
pub struct ProxyContext {
    pub method: String,
    pub uri: String,
    pub client_ip: String,
    pub tenant_id: String,

    /// The inbound request headers, normalized by the auth planner
    /// before the first hop runs.
    pub headers: HeaderList,

    pub hops: Vec<ModuleInstance>,

    /// Diagnostic trace entries appended after every upstream exchange
    /// (spec.md §4.5).
    pub trace: Vec<String>,
}

impl ProxyContext {
    pub fn new(method: String, uri: String, client_ip: String, headers: HeaderList) -> Self {
        Self {
            method,
            uri,
            client_ip,
            tenant_id: String::new(),
            headers,
            hops: Vec::new(),
            trace: Vec::new(),
        }
    }
}
