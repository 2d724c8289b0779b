//! All bits and pieces concerning the HTTP mock server are in this module.
//!
//! `bare_server::BareMockServer` is the "front-end" to drive behaviour for the `hyper` HTTP
//! server running in the background, defined in the `hyper` sub-module. Every incoming request
//! is handed to the `Session` of the `BareMockServer`, which decides what to answer.
//!
//! `bare_server::BareMockServer` is not exposed directly: crate users only get to interact with
//! `exposed_server::MockServer`, which is nothing more than a wrapper around a `BareMockServer`
//! retrieved from an object pool - see the `pool` submodule for more details on our pooling
//! strategy.
mod bare_server;
mod builder;
mod exposed_server;
mod hyper;
mod pool;

pub use builder::MockServerBuilder;
pub use exposed_server::MockServer;
