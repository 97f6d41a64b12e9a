//! Exposed function collections.
//!
//! A [`Module`] is an explicitly described tree of named leaves. Each leaf
//! is either a plain function (one call, one result) or a generator (a
//! streaming call driven through `method start` / `method next`). The
//! tree is walked once per connection to produce the [`Schema`] sent to
//! the caller.
//!
//! # Example
//!
//! ```
//! use sockrpc_server::Module;
//! use serde_json::json;
//!
//! let module = Module::new()
//!     .sync_function("greet", |args| {
//!         let name = args.first().and_then(|v| v.as_str()).unwrap_or("world");
//!         Ok(json!(format!("Hello, {}!", name)))
//!     })
//!     .module(
//!         "math",
//!         Module::new().sync_function("add", |args| {
//!             Ok(json!(args[0].as_f64().unwrap_or(0.0) + args[1].as_f64().unwrap_or(0.0)))
//!         }),
//!     )
//!     .coroutine("countTo", |args, yielder| async move {
//!         let n = args.first().and_then(|v| v.as_u64()).unwrap_or(0);
//!         for i in 1..n {
//!             yielder.yield_(json!(i)).await;
//!         }
//!         Ok(json!(n))
//!     });
//!
//! assert_eq!(
//!     serde_json::to_value(module.schema()).unwrap(),
//!     json!({"greet": "function", "math": {"add": "function"}, "countTo": "generator"})
//! );
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;

use parking_lot::Mutex;
use sockrpc_common::protocol::schema::qualify;
use sockrpc_common::transport::BoxFuture;
use sockrpc_common::{Args, LeafKind, Schema, SchemaNode, Value};

/// Async handler behind a plain function leaf.
pub type Handler = Arc<dyn Fn(Args) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Creates a fresh generator for each streaming call.
pub type GeneratorFactory = Arc<dyn Fn(Args) -> anyhow::Result<Box<dyn Generator>> + Send + Sync>;

/// One step of a generator.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// An intermediate value; the generator can be resumed again.
    Yield(Value),
    /// The final value; the generator is finished.
    Return(Value),
}

impl Step {
    pub fn is_return(&self) -> bool {
        matches!(self, Step::Return(_))
    }
}

/// A resumable computation producing a sequence of values.
///
/// `resume` is called once per `method next`. The input of the first
/// resumption is always ignored, matching generator semantics where the
/// first value fed in has no pending yield to land on.
pub trait Generator: Send {
    fn resume(&mut self, input: Option<Value>) -> BoxFuture<'_, anyhow::Result<Step>>;
}

/// A leaf of a [`Module`].
#[derive(Clone)]
pub enum Leaf {
    Function(Handler),
    Generator(GeneratorFactory),
}

impl Leaf {
    pub fn kind(&self) -> LeafKind {
        match self {
            Leaf::Function(_) => LeafKind::Function,
            Leaf::Generator(_) => LeafKind::Generator,
        }
    }
}

impl std::fmt::Debug for Leaf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Leaf::{:?}", self.kind())
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Leaf(Leaf),
    Module(Module),
}

/// A named tree of functions and generators.
///
/// Inserting a name twice replaces the earlier entry.
#[derive(Debug, Clone, Default)]
pub struct Module {
    entries: BTreeMap<String, Entry>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an async function.
    pub fn function<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |args| Box::pin(f(args)));
        self.leaf(name, Leaf::Function(handler))
    }

    /// Adds a synchronous function.
    pub fn sync_function<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(move |args| {
            let outcome = f(args);
            Box::pin(async move { outcome })
        });
        self.leaf(name, Leaf::Function(handler))
    }

    /// Adds a generator built by `factory` for every streaming call.
    ///
    /// A factory error is reported to the caller instead of `method start`.
    pub fn generator<F, G>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Args) -> anyhow::Result<G> + Send + Sync + 'static,
        G: Generator + 'static,
    {
        let factory: GeneratorFactory =
            Arc::new(move |args| factory(args).map(|generator| Box::new(generator) as Box<dyn Generator>));
        self.leaf(name, Leaf::Generator(factory))
    }

    /// Adds a generator written as an async body that yields through a
    /// [`Yielder`]. The body's return value ends the stream.
    pub fn coroutine<F, Fut>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Args, Yielder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.generator(name, move |args| Ok(Coroutine::new(|yielder| body(args, yielder))))
    }

    /// Adds a generator that yields every item of an iterator and then
    /// returns `null`.
    pub fn iterator<F, I>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> anyhow::Result<I> + Send + Sync + 'static,
        I: IntoIterator<Item = Value>,
        I::IntoIter: Send + 'static,
    {
        self.generator(name, move |args| Ok(IterGenerator::new(f(args)?)))
    }

    /// Nests another module under `name`.
    pub fn module(mut self, name: impl Into<String>, module: Module) -> Self {
        self.entries.insert(name.into(), Entry::Module(module));
        self
    }

    fn leaf(mut self, name: impl Into<String>, leaf: Leaf) -> Self {
        self.entries.insert(name.into(), Entry::Leaf(leaf));
        self
    }

    /// Describes the tree: every leaf tagged by kind, every nested module
    /// as a branch.
    pub fn schema(&self) -> Schema {
        let mut schema = Schema::new();
        for (name, entry) in &self.entries {
            let node = match entry {
                Entry::Leaf(leaf) => SchemaNode::Leaf(leaf.kind()),
                Entry::Module(module) => SchemaNode::Branch(module.schema()),
            };
            schema.insert(name.clone(), node);
        }
        schema
    }

    /// Every leaf with its dot-joined path, depth first.
    pub fn leaves(&self) -> Vec<(String, &Leaf)> {
        let mut leaves = Vec::new();
        self.collect_leaves(None, &mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, prefix: Option<&str>, out: &mut Vec<(String, &'a Leaf)>) {
        for (name, entry) in &self.entries {
            let path = qualify(prefix, name);
            match entry {
                Entry::Leaf(leaf) => out.push((path, leaf)),
                Entry::Module(module) => module.collect_leaves(Some(&path), out),
            }
        }
    }

    /// Finds a leaf by its dot-joined path.
    pub fn lookup(&self, path: &str) -> Option<&Leaf> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        match (self.entries.get(head)?, rest) {
            (Entry::Leaf(leaf), None) => Some(leaf),
            (Entry::Module(module), Some(rest)) => module.lookup(rest),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Generator over an iterator; returns `null` once the iterator is empty.
pub struct IterGenerator<I> {
    iter: I,
}

impl<I> IterGenerator<I>
where
    I: Iterator<Item = Value> + Send,
{
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: iter.into_iter(),
        }
    }
}

impl<I> Generator for IterGenerator<I>
where
    I: Iterator<Item = Value> + Send,
{
    fn resume(&mut self, _input: Option<Value>) -> BoxFuture<'_, anyhow::Result<Step>> {
        let step = match self.iter.next() {
            Some(value) => Step::Yield(value),
            None => Step::Return(Value::Null),
        };
        Box::pin(async move { Ok(step) })
    }
}

#[derive(Default)]
struct Exchange {
    yielded: Option<Value>,
    input: Option<Option<Value>>,
}

/// The yield side of a [`Coroutine`].
///
/// Must only be awaited from within the coroutine's own body.
#[derive(Clone)]
pub struct Yielder {
    exchange: Arc<Mutex<Exchange>>,
}

impl Yielder {
    /// Yields `value` to the caller and suspends until the next resumption,
    /// returning the value fed in by that resumption.
    pub async fn yield_(&self, value: Value) -> Option<Value> {
        self.exchange.lock().yielded = Some(value);
        std::future::poll_fn(|_| match self.exchange.lock().input.take() {
            Some(input) => Poll::Ready(input),
            None => Poll::Pending,
        })
        .await
    }
}

type Body = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

/// A generator whose steps are the suspension points of an async body.
///
/// The body is polled only while a `resume` is in progress. It starts on
/// the first resumption, runs until it yields or returns, and stays parked
/// in between. Once it has returned or failed, further resumptions return
/// `Step::Return(null)`.
pub struct Coroutine {
    body: Option<Body>,
    exchange: Arc<Mutex<Exchange>>,
    started: bool,
}

impl Coroutine {
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(Yielder) -> Fut,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let exchange = Arc::new(Mutex::new(Exchange::default()));
        let yielder = Yielder {
            exchange: exchange.clone(),
        };
        Self {
            body: Some(Box::pin(body(yielder))),
            exchange,
            started: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.body.is_none()
    }
}

impl Generator for Coroutine {
    fn resume(&mut self, input: Option<Value>) -> BoxFuture<'_, anyhow::Result<Step>> {
        Box::pin(async move {
            let Some(body) = self.body.as_mut() else {
                return Ok(Step::Return(Value::Null));
            };

            if self.started {
                self.exchange.lock().input = Some(input);
            } else {
                self.started = true;
            }

            let exchange = self.exchange.clone();
            let outcome = std::future::poll_fn(|cx| {
                if let Poll::Ready(finished) = body.as_mut().poll(cx) {
                    return Poll::Ready(Err(finished));
                }
                match exchange.lock().yielded.take() {
                    Some(value) => Poll::Ready(Ok(value)),
                    None => Poll::Pending,
                }
            })
            .await;

            match outcome {
                Ok(value) => Ok(Step::Yield(value)),
                Err(finished) => {
                    self.body = None;
                    finished.map(Step::Return)
                }
            }
        })
    }
}
