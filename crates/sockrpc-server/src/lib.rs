//! sockrpc Server
//!
//! This crate provides the responder half of sockrpc: describing a tree of
//! functions and generators as a [`Module`], serving it over a
//! [`SocketTransport`](sockrpc_common::transport::SocketTransport) with a
//! [`Responder`], and accepting connections with [`WebSocketServer`] or
//! [`TcpServer`].

pub mod config;
pub mod module;
pub mod responder;
pub mod server;

pub use config::ResponderConfig;
pub use module::{Coroutine, Generator, IterGenerator, Leaf, Module, Step, Yielder};
pub use responder::Responder;
pub use server::{TcpServer, WebSocketServer};
