use axum::http::HeaderMap;
use axum::http::header::HeaderName;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;

pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

const UNKNOWN_CLIENT: &str = "unknown";

// Address of the requester. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ClientAddress(String);

impl ClientAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Typed view of the X-Forwarded-For chain ("client, proxy1, proxy2")
pub struct ForwardedFor<'a>(&'a str);

impl<'a> ForwardedFor<'a> {
    // HeaderMap lookups are case-insensitive
    pub fn from_headers(headers: &'a HeaderMap) -> Option<Self> {
        headers
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .map(ForwardedFor)
    }

    // First hop is the originating client
    pub fn originating(&self) -> Option<&'a str> {
        let first = self.0.split(',').next().unwrap_or_default().trim();
        (!first.is_empty()).then_some(first)
    }
}

/// Resolve the client address for a request.
///
/// The first entry of `X-Forwarded-For` wins; otherwise the transport peer
/// IP is used. Values are not validated as IP syntax and are taken verbatim.
pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientAddress {
    if let Some(ip) = ForwardedFor::from_headers(headers).and_then(|f| f.originating()) {
        return ClientAddress(ip.to_string());
    }

    match peer {
        Some(addr) => ClientAddress(addr.ip().to_string()),
        None => ClientAddress(UNKNOWN_CLIENT.to_string()),
    }
}
