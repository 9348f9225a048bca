//! HTTP surface of the narrator.
//!
//! A small blocking HTTP/1.1 server: one thread accepts, one thread per
//! connection reads a single request, routes it and closes.

mod http;
mod router;
mod server;

pub use http::{read_request, HttpRequest, MAX_BODY_BYTES, MAX_HEAD_BYTES};
pub use router::{
    resolve_route, GatewayRouter, RequestError, Route, RouteReply, UsageDescriptor, UsageExample,
};
pub use server::{GatewayHandle, GatewayServer};
