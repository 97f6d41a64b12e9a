//! The proxy tree.
//!
//! [`ProxyModule::build`] walks a received [`Schema`] and mirrors it: every
//! branch becomes a nested [`ProxyModule`], every `"function"` leaf a
//! [`RemoteFunction`] and every `"generator"` leaf a [`RemoteGenerator`].
//! Leaves remember their fully-qualified, dot-joined path.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use sockrpc_common::protocol::schema::qualify;
use sockrpc_common::protocol::{Args, Filter, LeafKind, Message, RpcError, Schema, SchemaNode, Value};
use sockrpc_common::transport::SocketTransport;
use sockrpc_common::Result;

use crate::generator::GeneratorCall;

/// A node of the proxy tree.
#[derive(Debug, Clone)]
pub enum ProxyNode {
    Function(RemoteFunction),
    Generator(RemoteGenerator),
    Module(ProxyModule),
}

impl ProxyNode {
    /// `"function"`, `"generator"` or `"module"`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ProxyNode::Function(_) => LeafKind::Function.as_str(),
            ProxyNode::Generator(_) => LeafKind::Generator.as_str(),
            ProxyNode::Module(_) => "module",
        }
    }
}

/// A branch of the proxy tree.
#[derive(Debug, Clone)]
pub struct ProxyModule {
    prefix: Option<String>,
    entries: BTreeMap<String, ProxyNode>,
}

impl ProxyModule {
    /// Builds the proxy tree for `schema`, calling through `transport`.
    pub fn build(transport: &SocketTransport, schema: &Schema) -> Self {
        Self::build_at(transport, schema, None)
    }

    fn build_at(transport: &SocketTransport, schema: &Schema, prefix: Option<&str>) -> Self {
        let entries = schema
            .iter()
            .map(|(name, node)| {
                let path = qualify(prefix, name);
                let proxy = match node {
                    SchemaNode::Leaf(LeafKind::Function) => ProxyNode::Function(RemoteFunction {
                        transport: transport.clone(),
                        path,
                    }),
                    SchemaNode::Leaf(LeafKind::Generator) => ProxyNode::Generator(RemoteGenerator {
                        transport: transport.clone(),
                        path,
                    }),
                    SchemaNode::Branch(branch) => ProxyNode::Module(Self::build_at(transport, branch, Some(&path))),
                };
                (name.clone(), proxy)
            })
            .collect();

        Self {
            prefix: prefix.map(str::to_string),
            entries,
        }
    }

    /// Direct child by name.
    pub fn get(&self, name: &str) -> Option<&ProxyNode> {
        self.entries.get(name)
    }

    /// Names of the direct children, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Path of this branch; `None` at the root.
    pub fn path(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Resolves a dot-joined path relative to this module.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::MethodNotFound`] with the fully-qualified path if
    /// any segment is missing or descends into a leaf.
    pub fn resolve(&self, path: &str) -> Result<&ProxyNode> {
        let not_found = || RpcError::MethodNotFound(qualify(self.path(), path));

        let mut segments = path.split('.');
        let first = segments.next().ok_or_else(not_found)?;
        let mut node = self.entries.get(first).ok_or_else(not_found)?;
        for segment in segments {
            node = match node {
                ProxyNode::Module(module) => module.entries.get(segment).ok_or_else(not_found)?,
                _ => return Err(not_found()),
            };
        }
        Ok(node)
    }

    /// Resolves `path` to a nested module.
    pub fn module(&self, path: &str) -> Result<&ProxyModule> {
        match self.resolve(path)? {
            ProxyNode::Module(module) => Ok(module),
            other => Err(self.wrong_kind(path, "module", other)),
        }
    }

    /// Resolves `path` to a plain function.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::WrongLeafKind`] if the path names a generator or
    /// a module, and [`RpcError::MethodNotFound`] if it names nothing.
    pub fn function(&self, path: &str) -> Result<&RemoteFunction> {
        match self.resolve(path)? {
            ProxyNode::Function(function) => Ok(function),
            other => Err(self.wrong_kind(path, LeafKind::Function.as_str(), other)),
        }
    }

    /// Resolves `path` to a generator.
    pub fn generator(&self, path: &str) -> Result<&RemoteGenerator> {
        match self.resolve(path)? {
            ProxyNode::Generator(generator) => Ok(generator),
            other => Err(self.wrong_kind(path, LeafKind::Generator.as_str(), other)),
        }
    }

    fn wrong_kind(&self, path: &str, expected: &'static str, actual: &ProxyNode) -> RpcError {
        RpcError::WrongLeafKind {
            path: qualify(self.path(), path),
            expected,
            actual: actual.kind_name(),
        }
    }

    /// Calls the function at `path`.
    pub async fn call(&self, path: &str, args: Args) -> Result<Value> {
        self.function(path)?.call(args).await
    }

    /// Starts the generator at `path`.
    pub fn stream(&self, path: &str, args: Args) -> Result<GeneratorCall> {
        Ok(self.generator(path)?.start(args))
    }
}

/// A remote plain function.
#[derive(Clone)]
pub struct RemoteFunction {
    transport: SocketTransport,
    path: String,
}

impl RemoteFunction {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Calls the function and waits for its result.
    ///
    /// No timeout is applied; a call whose reply never arrives waits until
    /// the transport stops. See [`call_timeout`](Self::call_timeout).
    ///
    /// # Errors
    ///
    /// - [`RpcError::Remote`] with the remote error text if the function failed
    /// - [`RpcError::Closed`] if the transport stopped first
    pub async fn call(&self, args: Args) -> Result<Value> {
        let id = self.transport.next_call_id();
        let reply = self.transport.expect_one(Filter::method_result(id));
        self.transport.send(&Message::call(id, self.path.clone(), args));

        match Message::from_value(reply.await?)? {
            Message::MethodResult(result) => result.into_outcome(),
            other => Err(RpcError::Protocol(format!(
                "expected method result for call {}, got {}",
                id,
                other.kind()
            ))),
        }
    }

    /// Calls the function and deserialises its result.
    pub async fn call_as<T: DeserializeOwned>(&self, args: Args) -> Result<T> {
        let value = self.call(args).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Calls the function, giving up after `timeout`.
    ///
    /// A reply arriving after the timeout is ignored.
    pub async fn call_timeout(&self, args: Args, timeout: Duration) -> Result<Value> {
        tokio::time::timeout(timeout, self.call(args))
            .await
            .map_err(|_| RpcError::Timeout(timeout.as_millis() as u64))?
    }
}

impl std::fmt::Debug for RemoteFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RemoteFunction").field(&self.path).finish()
    }
}

/// A remote generator.
#[derive(Clone)]
pub struct RemoteGenerator {
    transport: SocketTransport,
    path: String,
}

impl RemoteGenerator {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Prepares a new streaming call with its own id.
    ///
    /// Nothing is sent until the returned call is first resumed.
    pub fn start(&self, args: Args) -> GeneratorCall {
        GeneratorCall::new(self.transport.clone(), self.path.clone(), args)
    }
}

impl std::fmt::Debug for RemoteGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RemoteGenerator").field(&self.path).finish()
    }
}
