//! Address normalization for loopback probing.
//!
//! An empty host or `localhost` is pinned to `127.0.0.1` so probes never
//! touch an external interface (which would trigger host firewall prompts).

/// IPv4 loopback used in place of empty or `localhost` hosts.
pub const LOOPBACK_V4: &str = "127.0.0.1";

/// Normalize a `host:port` address.
///
/// Input without a `:` is returned verbatim; the HTTP layer reports it.
pub fn resolve(addr: &str) -> String {
    match addr.rsplit_once(':') {
        Some((host, port)) if host.is_empty() || host == "localhost" => {
            format!("{LOOPBACK_V4}:{port}")
        }
        _ => addr.to_string(),
    }
}

/// Base URL for a resolved endpoint.
pub fn base_url(endpoint: &str) -> String {
    format!("http://{endpoint}")
}
