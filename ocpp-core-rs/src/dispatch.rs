//! Request/response correlation and inbound call dispatch
//!
//! A [`Dispatcher`] exists once per role (CSMS or charging station) and owns
//! the request id counter, the action [`Router`] and the observation
//! [`Hooks`]. It hands out one [`Endpoint`] per live connection.
//!
//! Outbound: `Endpoint::call` validates, registers a waiter keyed by request
//! id, writes the CALL frame and waits for the matching CALLRESULT/CALLERROR,
//! bounded by a timeout and an optional cancellation token. Responses may
//! arrive in any order.
//!
//! Inbound: `Endpoint::handle_frame` decodes a frame, completes a waiter for
//! responses, or routes a CALL to its handler on a separate task and writes
//! the correlated response. Handler failures and panics turn into CALLERROR
//! frames; the connection keeps running.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::{Action, OcppRequest};
use crate::error::{CallFailure, CallOutcome, OcppError, ValidationError};
use crate::messages::{Call, CallError, CallResult, ErrorCode, OcppMessage};
use crate::observer::Observers;
use crate::transport::FrameSink;
use crate::types::StationId;

/// Timed-out and canceled ids remembered to classify late responses
const RETIRED_IDS: usize = 256;

/// Which side of the protocol an endpoint speaks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Csms,
    ChargingStation,
}

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Default bound on waiting for a response
    pub request_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl DispatchConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Monotonic request id source, shared by all endpoints of one role
#[derive(Debug, Clone, Default)]
pub struct RequestIds(Arc<AtomicU64>);

impl RequestIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        (self.0.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    pub event_tracking_id: Option<String>,
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_event_tracking_id(mut self, id: impl Into<String>) -> Self {
        self.event_tracking_id = Some(id.into());
        self
    }
}

// ============================================================================
// Envelopes and hook events
// ============================================================================

/// An outbound request as it was sent
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub request_id: String,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    pub event_tracking_id: String,
    pub timeout: Duration,
    pub payload: Value,
}

/// The response matched to a request
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub result: CallOutcome<Value>,
}

#[derive(Debug, Clone)]
pub struct RequestSent {
    pub identity: StationId,
    pub request: RequestEnvelope,
}

#[derive(Debug, Clone)]
pub struct ResponseReceived {
    pub identity: StationId,
    pub received_at: DateTime<Utc>,
    pub request: RequestEnvelope,
    pub response: ResponseEnvelope,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct RequestReceived {
    pub context: CallContext,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct ResponseSent {
    pub context: CallContext,
    pub response: ResponseEnvelope,
    pub elapsed: Duration,
}

/// Observation points around both call directions
#[derive(Debug)]
pub struct Hooks {
    pub request_sent: Observers<RequestSent>,
    pub response_received: Observers<ResponseReceived>,
    pub request_received: Observers<RequestReceived>,
    pub response_sent: Observers<ResponseSent>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            request_sent: Observers::new("request_sent"),
            response_received: Observers::new("response_received"),
            request_received: Observers::new("request_received"),
            response_sent: Observers::new("response_sent"),
        }
    }
}

// ============================================================================
// Routing
// ============================================================================

/// What an inbound handler knows about the call it serves
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Station identity authenticated for this connection
    pub identity: StationId,
    pub connection_id: Uuid,
    pub request_id: String,
    pub action: Action,
    pub event_tracking_id: String,
    pub received_at: DateTime<Utc>,
}

type Handler = Arc<dyn Fn(CallContext, Value) -> BoxFuture<'static, CallOutcome<Value>> + Send + Sync>;

/// Action name to handler table
#[derive(Default)]
pub struct Router {
    handlers: HashMap<Action, Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `R::ACTION`, replacing any previous one.
    /// The payload is decoded and validated before the handler runs.
    pub fn on<R, F, Fut>(mut self, handler: F) -> Self
    where
        R: OcppRequest,
        F: Fn(CallContext, R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallOutcome<R::Response>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: Handler = Arc::new(move |ctx: CallContext, payload: Value| {
            invoke::<R, F, Fut>(Arc::clone(&handler), ctx, payload).boxed()
        });
        self.handlers.insert(R::ACTION, erased);
        self
    }

    /// Register a synchronous handler that works on shared state
    pub fn on_state<R, S, F>(self, state: &Arc<S>, handler: F) -> Self
    where
        R: OcppRequest,
        S: Send + Sync + 'static,
        F: Fn(&S, &CallContext, R) -> CallOutcome<R::Response> + Send + Sync + 'static,
    {
        let state = Arc::clone(state);
        self.on::<R, _, _>(move |ctx, request| std::future::ready(handler(&state, &ctx, request)))
    }

    pub fn handles(&self, action: Action) -> bool {
        self.handlers.contains_key(&action)
    }

    pub fn actions(&self) -> Vec<Action> {
        self.handlers.keys().copied().collect()
    }
}

async fn invoke<R, F, Fut>(handler: Arc<F>, ctx: CallContext, payload: Value) -> CallOutcome<Value>
where
    R: OcppRequest,
    F: Fn(CallContext, R) -> Fut,
    Fut: Future<Output = CallOutcome<R::Response>>,
{
    let request: R = ValidationError::from_payload(payload)?;
    request.validate()?;
    let response = (*handler)(ctx, request).await?;
    serde_json::to_value(response)
        .map_err(|e| CallFailure::handler(format!("{} response not serializable: {}", R::ACTION, e)))
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("actions", &self.handlers.len())
            .finish()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Per-role factory for endpoints
#[derive(Debug, Clone)]
pub struct Dispatcher {
    role: Role,
    ids: RequestIds,
    router: Arc<Router>,
    hooks: Arc<Hooks>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(role: Role, router: Router, config: DispatchConfig) -> Self {
        Self {
            role,
            ids: RequestIds::new(),
            router: Arc::new(router),
            hooks: Arc::new(Hooks::default()),
            config,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Endpoint for a freshly established connection
    pub fn endpoint(&self, identity: impl Into<StationId>, sink: FrameSink) -> Arc<Endpoint> {
        let endpoint = Arc::new(Endpoint {
            role: self.role,
            identity: identity.into(),
            sink,
            ids: self.ids.clone(),
            router: Arc::clone(&self.router),
            hooks: Arc::clone(&self.hooks),
            config: self.config.clone(),
            pending: Mutex::new(HashMap::new()),
            retired: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        });
        debug!(
            "{:?} endpoint for {} on connection {}",
            endpoint.role,
            endpoint.identity,
            endpoint.connection_id()
        );
        endpoint
    }
}

struct Waiter {
    action: Action,
    tx: oneshot::Sender<CallOutcome<Value>>,
}

/// One connection in one role
pub struct Endpoint {
    role: Role,
    identity: StationId,
    sink: FrameSink,
    ids: RequestIds,
    router: Arc<Router>,
    hooks: Arc<Hooks>,
    config: DispatchConfig,
    pending: Mutex<HashMap<String, Waiter>>,
    retired: Mutex<VecDeque<String>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("role", &self.role)
            .field("identity", &self.identity)
            .field("connection_id", &self.sink.connection_id())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Endpoint {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn connection_id(&self) -> Uuid {
        self.sink.connection_id()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of outbound requests awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Resolves once the connection has been closed
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    /// Send a request and wait for its typed response
    pub async fn call<R: OcppRequest>(
        &self,
        request: R,
        options: CallOptions,
    ) -> CallOutcome<R::Response> {
        request.validate()?;

        let action = R::ACTION;
        let payload = serde_json::to_value(&request)
            .map_err(|e| CallFailure::protocol(format!("{} not serializable: {}", action, e)))?;

        let request_id = self.ids.next_id();
        let timeout = options.timeout.unwrap_or(self.config.request_timeout);
        let envelope = RequestEnvelope {
            request_id: request_id.clone(),
            action,
            timestamp: Utc::now(),
            event_tracking_id: options
                .event_tracking_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            timeout,
            payload: payload.clone(),
        };

        let frame = OcppMessage::Call(Call {
            message_id: request_id.clone(),
            action: action.as_str().to_string(),
            payload,
        })
        .to_text()
        .map_err(|e| CallFailure::protocol(e.to_string()))?;

        // Created
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if self.is_closed() {
                return Err(CallFailure::unreachable());
            }
            pending.insert(request_id.clone(), Waiter { action, tx });
        }

        self.hooks.request_sent.notify(&RequestSent {
            identity: self.identity.clone(),
            request: envelope.clone(),
        });

        debug!("[{}] -> {}", self.identity, frame);
        if self.sink.send(frame).await.is_err() {
            self.pending.lock().remove(&request_id);
            warn!("[{}] {} ({}) could not be written", self.identity, action, request_id);
            return Err(CallFailure::unreachable());
        }

        // Sent
        let started = Instant::now();
        let cancel = options.cancel.unwrap_or_default();

        let result = tokio::select! {
            response = rx => match response {
                Ok(result) => result,
                Err(_) => Err(CallFailure::unreachable()),
            },
            _ = tokio::time::sleep(timeout) => {
                self.retire(&request_id);
                warn!("[{}] {} ({}) timed out after {:?}", self.identity, action, request_id, timeout);
                return Err(CallFailure::timeout(action.as_str(), &request_id));
            }
            _ = cancel.cancelled() => {
                self.retire(&request_id);
                debug!("[{}] {} ({}) canceled", self.identity, action, request_id);
                return Err(CallFailure::canceled(action.as_str(), &request_id));
            }
        };

        let elapsed = started.elapsed();
        self.hooks.response_received.notify(&ResponseReceived {
            identity: self.identity.clone(),
            received_at: Utc::now(),
            request: envelope,
            response: ResponseEnvelope {
                request_id: request_id.clone(),
                result: result.clone(),
            },
            elapsed,
        });

        let value = result?;
        serde_json::from_value(value).map_err(|e| {
            CallFailure::protocol(format!("{} ({}) response undecodable: {}", action, request_id, e))
        })
    }

    /// Feed one received text frame
    pub async fn handle_frame(self: &Arc<Self>, text: &str) {
        debug!("[{}] <- {}", self.identity, text);

        match OcppMessage::parse(text.as_bytes()) {
            Ok(OcppMessage::Call(call)) => self.dispatch_call(call).await,
            Ok(OcppMessage::CallResult(result)) => {
                self.complete(&result.message_id, Ok(result.payload));
            }
            Ok(OcppMessage::CallError(err)) => {
                let failure =
                    CallFailure::remote(err.error_code, err.error_description, err.error_details);
                self.complete(&err.message_id, Err(failure));
            }
            Err(e) => {
                warn!("[{}] Failed to parse OCPP message: {}", self.identity, e);
                if let Some(message_id) = OcppMessage::salvage_call_id(text.as_bytes()) {
                    let code = match e {
                        OcppError::UnknownMessageType(_) => ErrorCode::MessageTypeNotSupported,
                        _ => ErrorCode::FormatViolation,
                    };
                    self.write(OcppMessage::CallError(CallError::new(message_id, code, e.to_string())))
                        .await;
                }
            }
        }
    }

    /// Pump received frames until the carrier goes away or the endpoint is
    /// closed, then close it
    pub async fn run(self: Arc<Self>, frames: mpsc::Receiver<String>) {
        self.run_with(frames, || async {}).await
    }

    /// [`Endpoint::run`], awaiting `on_frame` before each received frame is
    /// handled
    pub async fn run_with<F, Fut>(self: Arc<Self>, mut frames: mpsc::Receiver<String>, mut on_frame: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(text) => {
                        on_frame().await;
                        self.handle_frame(&text).await;
                    }
                    None => break,
                },
                _ = self.shutdown.cancelled() => break,
            }
        }
        self.close();
    }

    /// Tear down: every outstanding waiter fails with a routing failure
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();

        let drained: Vec<(String, Waiter)> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            info!(
                "[{}] Connection closed with {} outstanding requests",
                self.identity,
                drained.len()
            );
        }
        for (request_id, waiter) in drained {
            debug!("[{}] Failing {} ({})", self.identity, waiter.action, request_id);
            let _ = waiter.tx.send(Err(CallFailure::unreachable()));
        }
    }

    fn complete(&self, request_id: &str, result: CallOutcome<Value>) {
        let waiter = self.pending.lock().remove(request_id);
        match waiter {
            Some(waiter) => {
                if waiter.tx.send(result).is_err() {
                    debug!("[{}] Waiter for {} ({}) already gone", self.identity, waiter.action, request_id);
                }
            }
            None if self.retired.lock().iter().any(|id| id == request_id) => {
                debug!("[{}] Discarding late response for {}", self.identity, request_id);
            }
            None => {
                warn!(
                    "[{}] Discarding response {} with no outstanding request",
                    self.identity, request_id
                );
            }
        }
    }

    fn retire(&self, request_id: &str) {
        self.pending.lock().remove(request_id);
        let mut retired = self.retired.lock();
        if retired.len() == RETIRED_IDS {
            retired.pop_front();
        }
        retired.push_back(request_id.to_string());
    }

    async fn dispatch_call(self: &Arc<Self>, call: Call) {
        let action = match Action::from_name(&call.action) {
            Some(action) if self.router.handles(action) => action,
            Some(_) => {
                warn!("[{}] No handler for {}", self.identity, call.action);
                let err = CallError::new(
                    call.message_id,
                    ErrorCode::NotSupported,
                    format!("Action {} is not supported", call.action),
                );
                self.write(OcppMessage::CallError(err)).await;
                return;
            }
            None => {
                warn!("[{}] Unknown action {}", self.identity, call.action);
                let err = CallError::new(
                    call.message_id,
                    ErrorCode::NotImplemented,
                    format!("Unknown action {}", call.action),
                );
                self.write(OcppMessage::CallError(err)).await;
                return;
            }
        };
        let Some(handler) = self.router.handlers.get(&action).cloned() else {
            return;
        };

        let context = CallContext {
            identity: self.identity.clone(),
            connection_id: self.connection_id(),
            request_id: call.message_id,
            action,
            event_tracking_id: Uuid::new_v4().to_string(),
            received_at: Utc::now(),
        };

        self.hooks.request_received.notify(&RequestReceived {
            context: context.clone(),
            payload: call.payload.clone(),
        });

        let endpoint = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            let task = tokio::spawn((*handler)(context.clone(), call.payload));
            let result = match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(
                        "[{}] {} handler ({}) aborted: {}",
                        endpoint.identity, context.action, context.request_id, e
                    );
                    Err(CallFailure::handler(format!("{} handler failed", context.action)))
                }
            };
            endpoint.respond(context, result, started.elapsed()).await;
        });
    }

    async fn respond(&self, context: CallContext, result: CallOutcome<Value>, elapsed: Duration) {
        self.hooks.response_sent.notify(&ResponseSent {
            context: context.clone(),
            response: ResponseEnvelope {
                request_id: context.request_id.clone(),
                result: result.clone(),
            },
            elapsed,
        });

        let message = match result {
            Ok(payload) => OcppMessage::CallResult(CallResult {
                message_id: context.request_id,
                payload,
            }),
            Err(failure) => {
                warn!(
                    "[{}] {} ({}) failed: {}",
                    self.identity, context.action, context.request_id, failure
                );
                OcppMessage::CallError(
                    CallError::new(context.request_id, failure.wire_code(), failure.message)
                        .with_details(failure.details),
                )
            }
        };
        self.write(message).await;
    }

    async fn write(&self, message: OcppMessage) {
        let text = match message.to_text() {
            Ok(text) => text,
            Err(e) => {
                error!("[{}] Failed to serialize message: {}", self.identity, e);
                return;
            }
        };
        debug!("[{}] -> {}", self.identity, text);
        if self.sink.send(text).await.is_err() {
            debug!("[{}] Connection gone, response dropped", self.identity);
        }
    }
}
