use crate::engine;
use crate::pool::ConnPool;
use crate::response::build_response;
use crate::worker::SharedState;
use monoio::io::{AsyncReadRent, AsyncWriteRentExt};
use monoio::net::TcpStream;
use okapi_core::error::OkapiError;
use okapi_observability::AccessLogEntry;
use okapi_pipeline::{AuthHeaderPlanner, HeaderList, ModuleInstance, PipelineBuilder, ProxyContext};
use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Instant;

/// Handles one client connection end to end: parses each HTTP/1.1
/// request, builds and runs its pipeline, writes the response, and
/// loops for keepalive (spec.md §5, §6).
pub async fn handle_connection(
    mut client: TcpStream,
    peer_addr: SocketAddr,
    shared: Rc<SharedState>,
    conn_pool: Rc<RefCell<ConnPool>>,
) -> std::io::Result<()> {
    let client_ip = peer_addr.ip().to_string();
    let mut read_buf = vec![0u8; 8192];
    let mut resp_buf = Vec::with_capacity(4096);

    loop {
        let (res, returned) = client.read(read_buf).await;
        read_buf = returned;
        let n = match res {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) => return Err(e),
        };

        let mut headers_raw = [httparse::EMPTY_HEADER; 64];
        let mut req = httparse::Request::new(&mut headers_raw);
        let body_offset = match req.parse(&read_buf[..n]) {
            Ok(httparse::Status::Complete(off)) => off,
            Ok(httparse::Status::Partial) => {
                build_response(&mut resp_buf, 400, &[], b"incomplete request", false);
                let _ = client.write_all(resp_buf.clone()).await.0;
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(error = %e, "malformed request");
                build_response(&mut resp_buf, 400, &[], b"bad request", false);
                let _ = client.write_all(resp_buf.clone()).await.0;
                return Ok(());
            }
        };

        let method = req.method.unwrap_or("GET").to_string();
        let uri = req.path.unwrap_or("/").to_string();
        let mut headers = HeaderList::new();
        let mut content_length = 0usize;
        for h in req.headers.iter() {
            if h.name.is_empty() {
                break;
            }
            let value = std::str::from_utf8(h.value).unwrap_or("").to_string();
            if h.name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            }
            headers.append(h.name.to_string(), value);
        }

        let mut body = read_buf[body_offset..n].to_vec();
        while body.len() < content_length {
            let remaining = content_length - body.len();
            let chunk_len = remaining.min(65536);
            let (res, chunk) = client.read(vec![0u8; chunk_len]).await;
            let got = res?;
            if got == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..got]);
        }

        let client_wants_close = headers
            .get("Connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false);

        let outcome = process_request(&shared, &conn_pool, &client_ip, method, uri, headers, body).await;

        let keep_alive = !client_wants_close;
        build_response(&mut resp_buf, outcome.status, &outcome.headers, &outcome.body, keep_alive);
        client.write_all(resp_buf.clone()).await.0?;

        if !keep_alive {
            return Ok(());
        }
    }
}

struct HandledResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

fn error_response(err: OkapiError) -> HandledResponse {
    HandledResponse {
        status: err.status_code(),
        headers: vec![("content-type".to_string(), "text/plain".to_string())],
        body: err.to_plain_body(),
    }
}

async fn process_request(
    shared: &SharedState,
    conn_pool: &Rc<RefCell<ConnPool>>,
    client_ip: &str,
    method: String,
    uri: String,
    mut headers: HeaderList,
    body: Vec<u8>,
) -> HandledResponse {
    let (tenant_id, client_token) = match AuthHeaderPlanner::normalize_headers(&mut headers) {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };

    let hops = match PipelineBuilder::build(&shared.catalog, &shared.tenants, &tenant_id, &method, &uri)
    {
        Ok(h) => h,
        Err(e) => return error_response(e),
    };

    let mut ctx = ProxyContext::new(method, uri, client_ip.to_string(), headers);
    ctx.tenant_id = tenant_id;
    ctx.hops = match resolve_hop_urls(shared, hops) {
        Ok(h) => h,
        Err(e) => return error_response(e),
    };

    ctx.headers.set("X-Okapi-Url", shared.config.okapi_url.clone());
    AuthHeaderPlanner::plan(&mut ctx, client_token.as_deref());

    let hop_count = ctx.hops.len();
    let started = Instant::now();
    let mut pool = conn_pool.borrow_mut();
    let outcome = engine::run_pipeline(&mut ctx, body, &mut *pool).await;
    drop(pool);

    AccessLogEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        tenant_id: ctx.tenant_id.clone(),
        client_ip: client_ip.to_string(),
        method: ctx.method.clone(),
        uri: ctx.uri.clone(),
        response_status: outcome.status,
        latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        hop_count,
    }
    .emit();

    let mut response_headers = outcome.headers;
    for entry in &outcome.trace {
        response_headers.push(("X-Okapi-Trace".to_string(), entry.clone()));
    }

    HandledResponse {
        status: outcome.status,
        headers: response_headers,
        body: outcome.body,
    }
}

/// Looks up each hop's module in discovery, filling in `url`. A module
/// with no running instance fails the whole request with a 404
/// (spec.md §4.4).
fn resolve_hop_urls(
    shared: &SharedState,
    mut hops: Vec<ModuleInstance>,
) -> Result<Vec<ModuleInstance>, OkapiError> {
    for hop in hops.iter_mut() {
        let candidates = shared.discovery.resolve(&hop.module.id);
        let url = candidates.into_iter().next().ok_or_else(|| {
            OkapiError::NotFound(format!(
                "No running module instance found for {}",
                hop.module.id
            ))
        })?;
        hop.url = Some(url);
    }
    Ok(hops)
}
