//! Offline caching gateway.
//!
//! Every outbound request of the notes app is offered to [`Gateway`], which
//! classifies it and applies one of four strategies:
//!
//! - dynamic backends (auth, realtime database, tokens, generative API),
//!   non-GET and non-http requests pass through untouched
//! - navigations are network-first with an app-shell fallback
//! - font providers are cache-first with an empty 204 fallback
//! - everything else is stale-while-revalidate
//!
//! The install phase fills the versioned store from fixed manifests; the
//! activate phase claims control and deletes stores of older versions.

mod lifecycle;
mod network;
mod request;
mod response;
mod rules;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use network::HttpNetwork;
pub use request::{Method, Request};
pub use response::{Body, Response, ResponseKind};
pub use rules::Rules;
pub use worker::Gateway;
