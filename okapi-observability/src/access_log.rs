use serde::{Deserialize, Serialize};

/// Structured access log entry for one proxied request. Emitted once the
/// pipeline terminates, whether by a normal upstream response or an
/// error (spec.md §7, "successful pipelines always include trace
/// headers").
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub timestamp: String,
    pub tenant_id: String,
    pub client_ip: String,
    pub method: String,
    pub uri: String,
    pub response_status: u16,
    pub latency_ms: f64,
    pub hop_count: usize,
}

impl AccessLogEntry {
    /// Emits this entry as a structured tracing event rather than a
    /// formatted line — the operator's tracing subscriber decides
    /// whether that becomes JSON, plain text, or a sink.
    pub fn emit(&self) {
        tracing::info!(
            timestamp = %self.timestamp,
            tenant_id = %self.tenant_id,
            client_ip = %self.client_ip,
            method = %self.method,
            uri = %self.uri,
            status = self.response_status,
            latency_ms = self.latency_ms,
            hops = self.hop_count,
            "request"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_to_expected_fields() {
        let entry = AccessLogEntry {
            timestamp: "2026-07-27T00:00:00Z".to_string(),
            tenant_id: "t1".to_string(),
            client_ip: "127.0.0.1".to_string(),
            method: "POST".to_string(),
            uri: "/echo".to_string(),
            response_status: 200,
            latency_ms: 1.5,
            hop_count: 1,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"tenant_id\":\"t1\""));
        assert!(json.contains("\"hop_count\":1"));
    }
}
