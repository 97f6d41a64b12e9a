//! sockrpc Client
//!
//! Connects to a sockrpc responder, receives its description and exposes
//! it as a proxy tree of [`RemoteFunction`]s and [`RemoteGenerator`]s.

pub mod client;
pub mod config;
pub mod generator;
pub mod proxy;

pub use client::{Client, Endpoint};
pub use config::ClientConfig;
pub use generator::{CallState, GeneratorCall};
pub use proxy::{ProxyModule, ProxyNode, RemoteFunction, RemoteGenerator};
