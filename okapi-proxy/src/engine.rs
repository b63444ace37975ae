use crate::pool::{self, ConnPool};
use crate::response::{build_request_head, status_text};
use monoio::io::{AsyncReadRent, AsyncWriteRentExt};
use monoio::net::TcpStream;
use okapi_core::error::OkapiError;
use okapi_core::route::ProxyType;
use okapi_pipeline::{AuthHeaderPlanner, HeaderList, ModuleInstance, ProxyContext};
use std::time::Instant;

const READ_CHUNK: usize = 65536;

/// The body the engine carries between hops: either a fully-materialized
/// buffer, or a live upstream connection with a known number of response
/// bytes still unread (spec.md §4.5, "two alternative body
/// representations... at most one is non-empty").
pub enum Body {
    Empty,
    Buffered(Vec<u8>),
    Stream { prefix: Vec<u8>, stream: TcpStream, remaining: usize },
}

impl Body {
    fn len_if_buffered(&self) -> Option<usize> {
        match self {
            Body::Buffered(b) => Some(b.len()),
            Body::Empty => Some(0),
            Body::Stream { .. } => None,
        }
    }

    /// Reads this body into memory completely, consuming it.
    async fn materialize(self) -> std::io::Result<Vec<u8>> {
        match self {
            Body::Empty => Ok(Vec::new()),
            Body::Buffered(b) => Ok(b),
            Body::Stream { prefix, mut stream, mut remaining } => {
                let mut out = prefix;
                out.reserve(remaining);
                while remaining > 0 {
                    let chunk_len = remaining.min(READ_CHUNK);
                    let (res, buf) = stream.read(vec![0u8; chunk_len]).await;
                    let n = res?;
                    if n == 0 {
                        break;
                    }
                    out.extend_from_slice(&buf[..n]);
                    remaining -= n;
                }
                Ok(out)
            }
        }
    }
}

/// Final outcome of walking the whole pipeline: what to relay to the
/// client.
pub struct Outcome {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub trace: Vec<String>,
}

/// Terminal response from a single upstream exchange, before the engine
/// decides whether to continue or stop (status + headers always read;
/// body left as a `Stream` so the caller can choose to forward it
/// lazily or materialize it).
struct HopResponse {
    status: u16,
    headers: HeaderList,
    body: Body,
}

/// Writes `body` to `stream` (if any), draining a prior `Stream`
/// representation in fixed-size chunks rather than buffering it whole.
async fn write_body(stream: &mut TcpStream, body: &Body) -> std::io::Result<()> {
    match body {
        Body::Empty => Ok(()),
        Body::Buffered(b) => {
            if !b.is_empty() {
                let (res, _) = stream.write_all(b.clone()).await;
                res?;
            }
            Ok(())
        }
        Body::Stream { prefix, .. } => {
            // The live portion is only reached via `forward_stream`,
            // which takes the stream by value — see `dispatch_hop`. Any
            // already-read prefix still needs relaying here.
            if !prefix.is_empty() {
                let (res, _) = stream.write_all(prefix.clone()).await;
                res?;
            }
            Ok(())
        }
    }
}

/// Forwards `remaining` bytes from `from` to `to` in bounded chunks,
/// without ever holding the whole body in memory.
async fn forward_stream(
    from: &mut TcpStream,
    to: &mut TcpStream,
    mut remaining: usize,
) -> std::io::Result<()> {
    while remaining > 0 {
        let chunk_len = remaining.min(READ_CHUNK);
        let (res, buf) = from.read(vec![0u8; chunk_len]).await;
        let n = res?;
        if n == 0 {
            break;
        }
        let (res, _) = to.write_all(buf[..n].to_vec()).await;
        res?;
        remaining -= n;
    }
    Ok(())
}

fn addr_from_url(url: &str) -> &str {
    let without_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);
    match without_scheme.find('/') {
        Some(idx) => &without_scheme[..idx],
        None => without_scheme,
    }
}

/// Opens (or reuses) a connection to `hop.url`, sends the request, and
/// reads back status + headers. The response body is left as an open
/// `Stream` with its declared length, or materialized to empty when
/// there is none.
async fn dispatch_hop(
    hop: &ModuleInstance,
    method: &str,
    headers: &HeaderList,
    body: Body,
    send_body: bool,
    pool: &mut ConnPool,
) -> Result<HopResponse, OkapiError> {
    let url = hop
        .url
        .as_deref()
        .ok_or_else(|| OkapiError::Internal(format!("hop '{}' has no resolved url", hop.module.id)))?;
    let addr = addr_from_url(url).to_string();

    let body_len = if send_body { body.len_if_buffered() } else { None };

    let mut stream = match pool.take(&addr) {
        Some(s) => s,
        None => pool::connect(&addr)
            .await
            .map_err(|e| OkapiError::Internal(format!("connect url {}: {}", addr, e)))?,
    };

    let mut req_buf = Vec::with_capacity(512);
    build_request_head(&mut req_buf, method, &hop.uri, headers, body_len);
    stream
        .write_all(req_buf)
        .await
        .0
        .map_err(|e| OkapiError::Internal(format!("connect url {}: {}", addr, e)))?;

    if send_body {
        match body {
            Body::Stream { prefix, stream: mut from_stream, remaining } => {
                if !prefix.is_empty() {
                    stream
                        .write_all(prefix)
                        .await
                        .0
                        .map_err(|e| OkapiError::Internal(format!("connect url {}: {}", addr, e)))?;
                }
                forward_stream(&mut from_stream, &mut stream, remaining)
                    .await
                    .map_err(|e| OkapiError::Internal(format!("connect url {}: {}", addr, e)))?;
            }
            other => {
                write_body(&mut stream, &other)
                    .await
                    .map_err(|e| OkapiError::Internal(format!("connect url {}: {}", addr, e)))?;
            }
        }
    }

    read_response(stream, &addr, pool).await
}

async fn read_response(
    mut stream: TcpStream,
    addr: &str,
    pool: &mut ConnPool,
) -> Result<HopResponse, OkapiError> {
    let mut buf = vec![0u8; 8192];
    let mut filled = 0usize;
    let (status, headers, header_len, content_length) = loop {
        let (res, returned) = stream.read(buf).await;
        buf = returned;
        let n = res.map_err(|e| OkapiError::Internal(format!("connect url {}: {}", addr, e)))?;
        if n == 0 {
            return Err(OkapiError::Internal(format!(
                "connect url {}: upstream closed without a response",
                addr
            )));
        }
        filled += n;
        if filled > buf.len() {
            buf.resize(filled, 0);
        }

        let mut raw_headers = [httparse::EMPTY_HEADER; 64];
        let mut resp = httparse::Response::new(&mut raw_headers);
        match resp.parse(&buf[..filled]) {
            Ok(httparse::Status::Complete(header_len)) => {
                let status = resp.code.unwrap_or(502);
                let mut headers = HeaderList::new();
                let mut content_length = 0usize;
                for h in resp.headers.iter() {
                    if h.name.is_empty() {
                        break;
                    }
                    let value = std::str::from_utf8(h.value).unwrap_or("").to_string();
                    if h.name.eq_ignore_ascii_case("content-length") {
                        content_length = value.parse().unwrap_or(0);
                    }
                    headers.append(h.name.to_string(), value);
                }
                break (status, headers, header_len, content_length);
            }
            Ok(httparse::Status::Partial) => {
                if filled == buf.len() {
                    buf.resize(buf.len() * 2, 0);
                }
                continue;
            }
            Err(e) => {
                return Err(OkapiError::Internal(format!(
                    "connect url {}: bad upstream response: {}",
                    addr, e
                )));
            }
        }
    };

    let already_read = filled - header_len;
    let body = if content_length == 0 {
        pool.put(addr.to_string(), stream);
        Body::Empty
    } else if already_read >= content_length {
        let buffered = buf[header_len..header_len + content_length].to_vec();
        pool.put(addr.to_string(), stream);
        Body::Buffered(buffered)
    } else {
        // The response body wasn't fully in hand after the header read —
        // leave it as a live stream so the caller can pipe it straight
        // to the next hop (or the client) without buffering it whole.
        let remaining = content_length - already_read;
        let prefix = buf[header_len..filled].to_vec();
        Body::Stream { prefix, stream, remaining }
    };

    Ok(HopResponse { status, headers, body })
}

/// Merges `X-`/`x-` response headers back into the request headers
/// carried forward between hops (spec.md §6).
fn merge_x_headers(ctx_headers: &mut HeaderList, response_headers: &HeaderList) {
    for (name, value) in response_headers.x_headers() {
        ctx_headers.set(name, value.to_string());
    }
}

/// Walks the whole pipeline per spec.md §4.5, returning what to relay
/// to the client.
pub async fn run_pipeline(
    ctx: &mut ProxyContext,
    client_body: Vec<u8>,
    pool: &mut ConnPool,
) -> Outcome {
    let n_hops = ctx.hops.len();
    let mut body = Body::Buffered(client_body);

    for i in 0..n_hops {
        let is_last = i == n_hops - 1;
        let proxy_type = ctx.hops[i].entry.proxy_type.clone();

        if proxy_type == ProxyType::Redirect {
            if is_last {
                ctx.trace.push(format!(
                    "{} {} {} : 999 0us",
                    ctx.method,
                    ctx.hops[i].module_name(),
                    strip_query(&ctx.hops[i].uri)
                ));
                return Outcome {
                    status: 999,
                    headers: Vec::new(),
                    body: Vec::new(),
                    trace: std::mem::take(&mut ctx.trace),
                };
            }
            continue;
        }

        set_hop_token(&mut ctx.headers, ctx.hops[i].auth_token.as_deref());

        let start = Instant::now();
        let send_body = proxy_type != ProxyType::Headers;

        // REQUEST_ONLY and HEADERS both carry the pre-hop body forward
        // unchanged regardless of what the upstream does with it, so
        // stash a copy (or the body itself) before dispatch consumes
        // whatever it's given (spec.md §4.5).
        let (hop_body, carry_forward) = match proxy_type {
            ProxyType::RequestOnly => match materialize(body).await {
                Ok(b) => (Body::Buffered(b.clone()), Some(Body::Buffered(b))),
                Err(e) => return error_outcome(ctx, e),
            },
            ProxyType::Headers => (Body::Empty, Some(body)),
            _ => (body, None),
        };

        let method = ctx.method.clone();
        let result = dispatch_hop(&ctx.hops[i], &method, &ctx.headers, hop_body, send_body, pool).await;
        let micros = start.elapsed().as_micros();

        let resp = match result {
            Ok(r) => r,
            Err(e) => return error_outcome(ctx, e),
        };

        ctx.trace.push(format!(
            "{} {} {} : {} {}us",
            ctx.method,
            ctx.hops[i].module_name(),
            strip_query(&ctx.hops[i].uri),
            resp.status,
            micros
        ));

        let ok2xx = (200..300).contains(&resp.status);
        let stop = resp.headers.contains("X-Okapi-Stop");

        if !ok2xx || stop || is_last {
            return match materialize_hop(resp).await {
                Ok((status, headers, final_body)) => Outcome {
                    status,
                    headers,
                    body: final_body,
                    trace: std::mem::take(&mut ctx.trace),
                },
                Err(e) => error_outcome(ctx, e),
            };
        }

        merge_x_headers(&mut ctx.headers, &resp.headers);
        if let Some(tokens_json) = resp.headers.get("X-Okapi-Module-Tokens").map(|s| s.to_string()) {
            AuthHeaderPlanner::apply_module_tokens(&mut ctx.hops[i + 1..], &tokens_json);
        }
        ctx.headers.remove("X-Okapi-Module-Tokens");

        body = match proxy_type {
            ProxyType::RequestOnly | ProxyType::Headers => {
                // Upstream's own response body plays no further part —
                // only its headers and status mattered.
                drop(resp.body);
                carry_forward.unwrap_or(Body::Empty)
            }
            _ => resp.body,
        };
    }

    // Pipeline had zero hops — builder invariants prevent this, but
    // degrade to an empty 204 rather than panic.
    Outcome {
        status: 204,
        headers: Vec::new(),
        body: Vec::new(),
        trace: std::mem::take(&mut ctx.trace),
    }
}

async fn materialize(body: Body) -> std::io::Result<Vec<u8>> {
    body.materialize().await
}

async fn materialize_hop(resp: HopResponse) -> Result<(u16, Vec<(String, String)>, Vec<u8>), OkapiError> {
    let body = resp
        .body
        .materialize()
        .await
        .map_err(|e| OkapiError::Internal(e.to_string()))?;
    Ok((resp.status, resp.headers.0, body))
}

fn set_hop_token(headers: &mut HeaderList, token: Option<&str>) {
    match token {
        Some(t) if !t.is_empty() => headers.set("X-Okapi-Token", t.to_string()),
        _ => headers.remove("X-Okapi-Token"),
    }
}

fn strip_query(uri: &str) -> &str {
    uri.split(['?', '#']).next().unwrap_or(uri)
}

fn error_outcome(ctx: &mut ProxyContext, err: OkapiError) -> Outcome {
    Outcome {
        status: err.status_code(),
        headers: vec![("content-type".to_string(), "text/plain".to_string())],
        body: err.to_plain_body(),
        trace: std::mem::take(&mut ctx.trace),
    }
}

pub fn status_line(status: u16) -> &'static str {
    status_text(status)
}
