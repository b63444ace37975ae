use monoio::net::TcpStream;
use std::collections::{HashMap, VecDeque};

/// Thread-local upstream connection pool, keyed by `host:port`. Avoids a
/// TCP handshake on every hop. One pool per worker thread — connections
/// never cross threads (spec.md §5, "per-request state touched by
/// exactly one loop").
pub struct ConnPool {
    pools: HashMap<String, VecDeque<TcpStream>>,
    max_idle: usize,
}

impl ConnPool {
    pub fn new(max_idle_per_host: usize) -> Self {
        Self {
            pools: HashMap::with_capacity(16),
            max_idle: max_idle_per_host,
        }
    }

    pub fn take(&mut self, addr: &str) -> Option<TcpStream> {
        self.pools.get_mut(addr).and_then(|q| q.pop_front())
    }

    pub fn put(&mut self, addr: String, stream: TcpStream) {
        let queue = self
            .pools
            .entry(addr)
            .or_insert_with(|| VecDeque::with_capacity(self.max_idle));
        if queue.len() < self.max_idle {
            queue.push_back(stream);
        }
    }
}

/// Opens a fresh connection to `addr` (`host:port`), resolving DNS via
/// std's blocking lookup when `addr` isn't already a socket address
/// literal. Only runs when the pool is empty for this host — never on
/// the steady-state hot path.
pub async fn connect(addr: &str) -> std::io::Result<TcpStream> {
    if let Ok(sa) = addr.parse::<std::net::SocketAddr>() {
        let stream = TcpStream::connect(sa).await?;
        let _ = stream.set_nodelay(true);
        return Ok(stream);
    }
    use std::net::ToSocketAddrs;
    let candidates: Vec<std::net::SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e))?
        .collect();
    let mut last_err = None;
    for sa in candidates {
        match TcpStream::connect(sa).await {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
    }))
}
