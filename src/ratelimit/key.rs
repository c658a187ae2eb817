//! Key extraction from incoming requests.

use std::net::SocketAddr;

/// Derives the rate-limit key for a request.
///
/// Any `Fn(&R) -> String` closure is an extractor.
pub trait KeyExtractor<R: ?Sized> {
    fn extract_key(&self, request: &R) -> String;
}

impl<R: ?Sized, F> KeyExtractor<R> for F
where
    F: Fn(&R) -> String,
{
    fn extract_key(&self, request: &R) -> String {
        self(request)
    }
}

/// Keys requests by client IP address, ignoring the port.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientAddr;

impl KeyExtractor<SocketAddr> for ClientAddr {
    fn extract_key(&self, request: &SocketAddr) -> String {
        request.ip().to_string()
    }
}
