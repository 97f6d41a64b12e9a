//! Caller side of a streaming call.
//!
//! A [`GeneratorCall`] is an explicit state machine over one call id:
//!
//! ```text
//! Created ──first resumption: method call, wait for method start──▶ Started
//! Started ──method next──▶ Awaiting ──method result {done: false}──▶ Started
//!                                   ──method result {done: true}───▶ Done
//! ```
//!
//! Resumption takes `&mut self`, so at most one `method next` is ever
//! outstanding for a call. A step that fails on the remote side yields an
//! error and leaves the call in `Started`; the caller decides whether to
//! keep resuming or drop it. Once `Done` the call sends nothing more.
//!
//! If a resumption future is dropped while `Awaiting`, the next resumption
//! waits for that outstanding reply instead of sending another
//! `method next`.

use futures_util::Stream;
use sockrpc_common::protocol::{Args, CallId, Filter, Message, MethodResult, RpcError, Value};
use sockrpc_common::transport::{SocketTransport, Subscription};
use sockrpc_common::Result;
use tracing::debug;

/// Where a [`GeneratorCall`] is in the streaming exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Nothing sent yet.
    Created,
    /// The remote generator exists; no `method next` is outstanding.
    Started,
    /// A `method next` was sent and its result has not arrived.
    Awaiting,
    /// The remote generator returned, failed to start, or the transport
    /// stopped.
    Done,
}

/// One invocation of a remote generator.
///
/// Created lazily by [`RemoteGenerator::start`](crate::RemoteGenerator::start):
/// the `method call` goes out on the first [`next`](Self::next) or
/// [`send`](Self::send).
///
/// # Example
///
/// ```no_run
/// # async fn run(api: &sockrpc_client::ProxyModule) -> sockrpc_common::Result<()> {
/// use serde_json::json;
///
/// let mut count = api.generator("countTo")?.start(vec![json!(4)]);
/// while let Some(step) = count.next().await {
///     println!("{}", step?);
/// }
/// println!("returned {:?}", count.return_value());
/// # Ok(())
/// # }
/// ```
pub struct GeneratorCall {
    transport: SocketTransport,
    path: String,
    id: CallId,
    args: Option<Args>,
    state: CallState,
    replies: Option<Subscription>,
    return_value: Option<Value>,
}

impl GeneratorCall {
    pub(crate) fn new(transport: SocketTransport, path: String, args: Args) -> Self {
        let id = transport.next_call_id();
        Self {
            transport,
            path,
            id,
            args: Some(args),
            state: CallState::Created,
            replies: None,
            return_value: None,
        }
    }

    /// Resumes the remote generator without a value.
    ///
    /// Returns the next yielded value, `Some(Err(..))` if the step failed,
    /// or `None` once the generator has returned.
    pub async fn next(&mut self) -> Option<Result<Value>> {
        self.resume(None).await
    }

    /// Resumes the remote generator, feeding `value` into it.
    ///
    /// The first resumption starts the call and never carries a value, so
    /// a value passed to it is dropped.
    pub async fn send(&mut self, value: Value) -> Option<Result<Value>> {
        self.resume(Some(value)).await
    }

    async fn resume(&mut self, mut input: Option<Value>) -> Option<Result<Value>> {
        loop {
            match self.state {
                CallState::Done => return None,
                CallState::Created => {
                    if let Err(e) = self.start().await {
                        self.finish();
                        return Some(Err(e));
                    }
                    input = None;
                    self.state = CallState::Started;
                }
                CallState::Started => {
                    self.transport.send(&Message::next(self.id, input.take()));
                    self.state = CallState::Awaiting;
                }
                CallState::Awaiting => return self.await_step().await,
            }
        }
    }

    /// Sends the `method call` and waits for `method start`.
    async fn start(&mut self) -> Result<()> {
        if self.replies.is_none() {
            let replies = self.transport.expect_many(Filter::any().with("id", self.id));
            let args = self.args.take().unwrap_or_default();
            self.transport.send(&Message::call(self.id, self.path.clone(), args));
            self.replies = Some(replies);
        }
        let Some(replies) = self.replies.as_mut() else {
            return Err(RpcError::Closed);
        };

        loop {
            let value = replies.next().await.ok_or(RpcError::Closed)?;
            match Message::from_value(value) {
                Ok(Message::MethodStart { .. }) => {
                    debug!("Streaming call {} to {} started", self.id, self.path);
                    return Ok(());
                }
                Ok(Message::MethodResult(MethodResult {
                    error: Some(message), ..
                })) => return Err(RpcError::Remote(message)),
                _ => debug!("Ignoring unexpected message while starting call {}", self.id),
            }
        }
    }

    async fn await_step(&mut self) -> Option<Result<Value>> {
        let Some(replies) = self.replies.as_mut() else {
            self.state = CallState::Done;
            return Some(Err(RpcError::Closed));
        };

        loop {
            let Some(value) = replies.next().await else {
                self.finish();
                return Some(Err(RpcError::Closed));
            };
            let result = match Message::from_value(value) {
                Ok(Message::MethodResult(result)) => result,
                _ => {
                    debug!("Ignoring unexpected message for call {}", self.id);
                    continue;
                }
            };

            if let Some(message) = result.error {
                self.state = CallState::Started;
                return Some(Err(RpcError::Remote(message)));
            }

            let value = result.result.unwrap_or(Value::Null);
            if result.done == Some(true) {
                self.return_value = Some(value);
                self.finish();
                return None;
            }

            self.state = CallState::Started;
            return Some(Ok(value));
        }
    }

    fn finish(&mut self) {
        self.state = CallState::Done;
        self.replies = None;
    }

    /// The generator's final return value, once it has returned.
    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == CallState::Done
    }

    /// The call id; allocated by `start`, before anything is sent.
    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Turns the call into a stream of steps. The return value is not part
    /// of the stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<Value>> + Send {
        futures_util::stream::unfold(self, |mut call| async move {
            let step = call.next().await?;
            Some((step, call))
        })
    }
}

impl std::fmt::Debug for GeneratorCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorCall")
            .field("path", &self.path)
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}
