//! Small helpers for input normalization and origin address handling.

use axum::http::HeaderMap;
use regex::Regex;
use std::net::{IpAddr, SocketAddr};

/// Normalize an email for lookup/uniqueness checks and ledger keys.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Parse an origin address. Accepts a bare IP or an `ip:port` socket address.
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) come back as plain IPv4.
pub(crate) fn parse_origin(origin: &str) -> Option<IpAddr> {
    let origin = origin.trim();
    origin
        .parse::<IpAddr>()
        .ok()
        .or_else(|| origin.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
        .map(|ip| ip.to_canonical())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Client address claimed by a reverse proxy: first `X-Forwarded-For` hop, else `X-Real-IP`.
///
/// Only meaningful behind a trusted proxy; the value is not validated here.
pub fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|hops| hops.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(str::to_string)
}
