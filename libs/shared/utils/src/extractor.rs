use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, Request},
};

pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the caller's address for keying per-client state.
///
/// Proxy headers win when `trust_proxy_headers` is set: the first hop of
/// `X-Forwarded-For`, then `X-Real-IP`. Otherwise the socket peer recorded by
/// `into_make_service_with_connect_info` is used.
pub fn client_address<B>(request: &Request<B>, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(address) = forwarded_address(request.headers()) {
            return address;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_address(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(address) = forwarded {
        return Some(address.to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn first_forwarded_hop_wins() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "198.51.100.2")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_address(&request, true), "203.0.113.7");
    }

    #[test]
    fn real_ip_used_without_forwarded_for() {
        let request = Request::builder()
            .header("x-real-ip", "198.51.100.2")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_address(&request, true), "198.51.100.2");
    }

    #[test]
    fn proxy_headers_ignored_when_untrusted() {
        let mut request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 51000))));

        assert_eq!(client_address(&request, false), "192.0.2.10");
    }

    #[test]
    fn falls_back_to_unknown() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_address(&request, true), UNKNOWN_CLIENT);
    }
}
