//! The method dispatcher.
//!
//! A [`Responder`] serves one [`Module`] over any number of connections.
//! Per connection it:
//!
//! 1. registers one standing `method call` listener per leaf, keyed on the
//!    leaf's fully-qualified name
//! 2. sends the `description` message
//! 3. answers calls until the connection's transport stops
//!
//! Plain calls are each handled on their own task, so a slow handler never
//! delays other calls, including later calls to the same method. A failing
//! or panicking handler produces an `error` result and the listener keeps
//! serving.
//!
//! Streaming calls run the per-call exchange on their own task:
//!
//! ```text
//! caller                              responder
//!   │── method call {id} ──────────────▶│ create generator
//!   │◀──────────────── method start {id}│
//!   │── method next {id} ──────────────▶│ resume
//!   │◀──── method result {id, done:false}│
//!   │            ...                    │
//!   │── method next {id, args} ────────▶│ resume
//!   │◀───── method result {id, done:true}│ stop listening for id
//! ```
//!
//! A generator whose factory or step panics gets the same `error` result as
//! a panicking handler, so the caller never waits on a dead call.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use sockrpc_common::protocol::{CallId, Filter, Message, MethodName, Value};
use sockrpc_common::transport::{Connection, SocketTransport, Subscription};
use sockrpc_common::Args;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ResponderConfig;
use crate::module::{GeneratorFactory, Handler, Leaf, Module, Step};

/// Serves a [`Module`] to callers.
///
/// Cheap to clone; clones share the module.
#[derive(Clone)]
pub struct Responder {
    module: Arc<Module>,
    config: ResponderConfig,
}

impl Responder {
    pub fn new(module: Module) -> Self {
        Self {
            module: Arc::new(module),
            config: ResponderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResponderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    /// Serves the module on one already-open connection until it closes.
    ///
    /// Listeners are in place before the connection is read from, so calls
    /// a reconnecting client flushes straight away are not lost.
    pub async fn serve_connection(&self, connection: Connection) {
        let transport = SocketTransport::new(self.config.transport.clone());
        let listeners = self.register(&transport);
        if let Err(e) = transport.attach(connection) {
            warn!("Failed to attach connection: {}", e);
            return;
        }
        Self::wait(listeners).await;
    }

    async fn wait(mut listeners: JoinSet<()>) {
        while listeners.join_next().await.is_some() {}
        debug!("Responder finished");
    }

    /// Registers one listener task per leaf and queues the description.
    ///
    /// Runs before the connection is attached, so every leaf listener is in
    /// place before anything is read and the description goes out first.
    fn register(&self, transport: &SocketTransport) -> JoinSet<()> {
        let mut listeners = JoinSet::new();

        for (path, leaf) in self.module.leaves() {
            let calls = transport.expect_many(Filter::method_call(&path));
            match leaf {
                Leaf::Function(handler) => {
                    listeners.spawn(serve_function(transport.clone(), path, handler.clone(), calls));
                }
                Leaf::Generator(factory) => {
                    listeners.spawn(serve_generator(transport.clone(), path, factory.clone(), calls));
                }
            }
        }

        info!("Serving {} methods", listeners.len());
        transport.send(&Message::description(self.module.schema()));
        listeners
    }
}

fn parse_call(value: Value) -> Option<(CallId, Args)> {
    match Message::from_value(value) {
        Ok(Message::MethodCall { id, args, .. }) => Some((id, args)),
        Ok(other) => {
            warn!("Ignoring unexpected {} message on a call listener", other.kind());
            None
        }
        Err(e) => {
            warn!("Ignoring malformed method call: {}", e);
            None
        }
    }
}

async fn serve_function(transport: SocketTransport, path: MethodName, handler: Handler, mut calls: Subscription) {
    while let Some(value) = calls.next().await {
        let Some((id, args)) = parse_call(value) else {
            continue;
        };
        debug!("Call {} to {}", id, path);

        let transport = transport.clone();
        let handler = handler.clone();
        let path = path.clone();
        tokio::spawn(async move {
            let reply = match tokio::spawn(async move { handler(args).await }).await {
                Ok(Ok(result)) => Message::result(id, result),
                Ok(Err(e)) => {
                    debug!("Call {} to {} failed: {}", id, path, e);
                    Message::error(id, e.to_string())
                }
                Err(e) => {
                    warn!("Handler for {} panicked: {}", path, e);
                    Message::error(id, panic_message(&path))
                }
            };
            transport.send(&reply);
        });
    }
}

async fn serve_generator(
    transport: SocketTransport,
    path: MethodName,
    factory: GeneratorFactory,
    mut calls: Subscription,
) {
    while let Some(value) = calls.next().await {
        let Some((id, args)) = parse_call(value) else {
            continue;
        };
        debug!("Streaming call {} to {}", id, path);
        tokio::spawn(run_stream(transport.clone(), path.clone(), factory.clone(), id, args));
    }
}

/// Drives one streaming call until its generator returns or the transport
/// stops.
///
/// A generator that panics is dropped: the panicking step is answered with
/// an error and any later resumption with a final `null` result.
async fn run_stream(transport: SocketTransport, path: MethodName, factory: GeneratorFactory, id: CallId, args: Args) {
    let mut generator = match std::panic::catch_unwind(AssertUnwindSafe(|| factory(args))) {
        Ok(Ok(generator)) => Some(generator),
        Ok(Err(e)) => {
            debug!("Failed to start {} for call {}: {}", path, id, e);
            transport.send(&Message::error(id, e.to_string()));
            return;
        }
        Err(_) => {
            warn!("Generator factory for {} panicked", path);
            transport.send(&Message::error(id, panic_message(&path)));
            return;
        }
    };

    let mut resumptions = transport.expect_many(Filter::method_next(id));
    transport.send(&Message::start(id));

    while let Some(value) = resumptions.next().await {
        let input = match Message::from_value(value) {
            Ok(Message::MethodNext { args, .. }) => args,
            Ok(_) | Err(_) => {
                warn!("Ignoring malformed method next for call {}", id);
                continue;
            }
        };

        let Some(current) = generator.as_mut() else {
            transport.send(&Message::step(id, Value::Null, true));
            return;
        };

        let outcome = AssertUnwindSafe(current.resume(input)).catch_unwind().await;
        match outcome {
            Ok(Ok(Step::Yield(value))) => transport.send(&Message::step(id, value, false)),
            Ok(Ok(Step::Return(value))) => {
                transport.send(&Message::step(id, value, true));
                debug!("Streaming call {} to {} done", id, path);
                return;
            }
            Ok(Err(e)) => {
                debug!("Step of call {} to {} failed: {}", id, path, e);
                transport.send(&Message::error(id, e.to_string()));
            }
            Err(_) => {
                warn!("Generator for {} panicked during call {}", path, id);
                generator = None;
                transport.send(&Message::error(id, panic_message(&path)));
            }
        }
    }

    debug!("Transport closed during streaming call {} to {}", id, path);
}

fn panic_message(path: &str) -> String {
    format!("method '{}' panicked", path)
}
