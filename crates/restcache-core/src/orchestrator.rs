// ── Request orchestrator ──
//
// Owns the cache state and the background tasks that keep it consistent
// with the backing API: one worker per intent kind, a single state writer
// that folds every event through the reducer, and the GC timer.

use std::collections::HashMap;
use std::sync::Arc;

use restcache_api::{HttpTransport, Transport, TransportConfig};
use strum::IntoEnumIterator;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{GcConfig, OrchestratorConfig};
use crate::error::CoreError;
use crate::event::{CrudEvent, WireEvent};
use crate::intent::{Intent, IntentKind};
use crate::model::{CrudState, Millis, Verb, now_millis};
use crate::normalize::{FlatNormalizer, Normalizer};
use crate::store::reduce;
use crate::stream::StateStream;

const EVENT_CHANNEL_SIZE: usize = 256;

/// Wall-clock source for fetch times and GC sweeps.
pub type Clock = Arc<dyn Fn() -> Millis + Send + Sync>;

// ── RunState ─────────────────────────────────────────────────────

/// Lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopped,
}

/// An intent on its way to a worker, with an optional reply channel
/// that receives the result event once it has been folded in.
struct IntentEnvelope {
    intent: Intent,
    reply: Option<oneshot::Sender<Arc<CrudEvent>>>,
}

/// One event for the state writer.
struct StateUpdate {
    event: CrudEvent,
    reply: Option<oneshot::Sender<Arc<CrudEvent>>>,
}

impl StateUpdate {
    fn new(event: CrudEvent) -> Self {
        Self { event, reply: None }
    }
}

// ── Orchestrator ─────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<OrchestratorInner>`. Call
/// [`start()`](Self::start) to spawn the background tasks, then
/// [`dispatch()`](Self::dispatch) intents and read snapshots with
/// [`state()`](Self::state) or [`subscribe()`](Self::subscribe).
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    config: OrchestratorConfig,
    transport: Arc<dyn Transport>,
    normalizer: Arc<dyn Normalizer>,
    clock: Clock,
    state: watch::Sender<Arc<CrudState>>,
    run_state: watch::Sender<RunState>,
    event_tx: broadcast::Sender<Arc<CrudEvent>>,
    /// Single-writer channel: every state change goes through here.
    update_tx: mpsc::UnboundedSender<StateUpdate>,
    update_rx: Mutex<Option<mpsc::UnboundedReceiver<StateUpdate>>>,
    intent_txs: HashMap<IntentKind, mpsc::Sender<IntentEnvelope>>,
    intent_rxs: Mutex<Vec<(IntentKind, mpsc::Receiver<IntentEnvelope>)>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Builder for an [`Orchestrator`] with a custom normalizer or clock.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    transport: Arc<dyn Transport>,
    normalizer: Arc<dyn Normalizer>,
    clock: Clock,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    #[must_use]
    pub fn clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> Millis + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> Orchestrator {
        let (state, _) = watch::channel(Arc::new(CrudState::new()));
        let (run_state, _) = watch::channel(RunState::Idle);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        let capacity = self.config.intent_channel_size.max(1);
        let mut intent_txs = HashMap::new();
        let mut intent_rxs = Vec::new();
        for kind in IntentKind::iter() {
            let (tx, rx) = mpsc::channel(capacity);
            intent_txs.insert(kind, tx);
            intent_rxs.push((kind, rx));
        }

        Orchestrator {
            inner: Arc::new(OrchestratorInner {
                config: self.config,
                transport: self.transport,
                normalizer: self.normalizer,
                clock: self.clock,
                state,
                run_state,
                event_tx,
                update_tx,
                update_rx: Mutex::new(Some(update_rx)),
                intent_txs,
                intent_rxs: Mutex::new(intent_rxs),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl Orchestrator {
    /// Create an orchestrator over `transport`. Does NOT start it --
    /// call [`start()`](Self::start) to spawn the background tasks.
    pub fn new(config: OrchestratorConfig, transport: Arc<dyn Transport>) -> Self {
        Self::builder(config, transport).build()
    }

    pub fn builder(config: OrchestratorConfig, transport: Arc<dyn Transport>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            transport,
            normalizer: Arc::new(FlatNormalizer),
            clock: Arc::new(now_millis),
        }
    }

    /// Orchestrator backed by the reqwest transport.
    pub fn with_http(
        config: OrchestratorConfig,
        transport: &TransportConfig,
    ) -> Result<Self, CoreError> {
        let http = HttpTransport::new(transport)?;
        Ok(Self::new(config, Arc::new(http)))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the state writer, one worker per intent kind, and the GC
    /// timer (when enabled).
    pub async fn start(&self) -> Result<(), CoreError> {
        match *self.inner.run_state.borrow() {
            RunState::Idle => {}
            RunState::Running => return Err(CoreError::AlreadyStarted),
            RunState::Stopped => return Err(CoreError::Stopped),
        }
        let Some(update_rx) = self.inner.update_rx.lock().await.take() else {
            return Err(CoreError::AlreadyStarted);
        };

        let cancel = self.inner.cancel.clone();
        let mut handles = self.inner.task_handles.lock().await;

        // State writer: single consumer of every state change.
        handles.push(tokio::spawn(state_writer_task(
            Arc::clone(&self.inner),
            update_rx,
            cancel.clone(),
        )));

        let ctx = RequestContext {
            transport: Arc::clone(&self.inner.transport),
            normalizer: Arc::clone(&self.inner.normalizer),
            clock: Arc::clone(&self.inner.clock),
            update_tx: self.inner.update_tx.clone(),
        };
        for (kind, rx) in self.inner.intent_rxs.lock().await.drain(..) {
            handles.push(tokio::spawn(intent_worker_task(
                ctx.clone(),
                kind,
                rx,
                cancel.clone(),
            )));
        }

        let gc = self.inner.config.gc.clone();
        if gc.enabled && !gc.period.is_zero() {
            handles.push(tokio::spawn(gc_timer_task(
                gc,
                Arc::clone(&self.inner.clock),
                self.inner.update_tx.clone(),
                cancel,
            )));
        } else if gc.enabled {
            warn!("gc period is zero; garbage collection disabled");
        }

        let _ = self.inner.run_state.send(RunState::Running);
        info!(tasks = handles.len(), "orchestrator started");
        Ok(())
    }

    /// Cancel the background tasks and wait for them to finish.
    ///
    /// In-flight requests are abandoned; their slices keep whatever
    /// pending shape they had.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        let _ = self.inner.run_state.send(RunState::Stopped);
        info!("orchestrator stopped");
    }

    // ── Intents ──────────────────────────────────────────────────

    /// Queue an intent.
    ///
    /// The matching started event is folded in first; the outcome lands
    /// in the state tree later as a success or failure event. Only
    /// malformed intents and a stopped orchestrator are reported here.
    pub async fn dispatch(&self, intent: Intent) -> Result<(), CoreError> {
        self.enqueue(intent, None).await
    }

    /// Queue an intent and wait until its result event has been folded
    /// into the state. A failed request is still `Ok`: inspect the event.
    pub async fn request(&self, intent: Intent) -> Result<Arc<CrudEvent>, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(intent, Some(tx)).await?;
        rx.await.map_err(|_| CoreError::Stopped)
    }

    async fn enqueue(
        &self,
        intent: Intent,
        reply: Option<oneshot::Sender<Arc<CrudEvent>>>,
    ) -> Result<(), CoreError> {
        intent.validate()?;
        if *self.inner.run_state.borrow() != RunState::Running {
            return Err(CoreError::Stopped);
        }

        let tx = self
            .inner
            .intent_txs
            .get(&intent.kind)
            .ok_or_else(|| CoreError::Internal(format!("no worker for {} intents", intent.kind)))?;

        if let Some(started) = intent.started_event() {
            self.send_update(started)?;
        }

        debug!(
            kind = %intent.kind,
            model = %intent.model,
            path = %intent.request.path,
            "intent queued"
        );
        tx.send(IntentEnvelope { intent, reply })
            .await
            .map_err(|_| CoreError::Stopped)
    }

    // ── Direct events ────────────────────────────────────────────

    /// Queue an event for the state writer.
    ///
    /// Events applied before [`start()`](Self::start) are folded in once
    /// the writer runs.
    pub fn apply(&self, event: CrudEvent) -> Result<(), CoreError> {
        if *self.inner.run_state.borrow() == RunState::Stopped {
            return Err(CoreError::Stopped);
        }
        self.send_update(event)
    }

    /// Parse and queue an event in its JSON wire form.
    pub fn apply_wire(&self, wire: WireEvent) -> Result<(), CoreError> {
        self.apply(CrudEvent::try_from(wire)?)
    }

    pub fn clear_action_status(&self, model: &str, verb: Verb) -> Result<(), CoreError> {
        self.apply(CrudEvent::ClearActionStatus {
            model: model.to_owned(),
            verb,
        })
    }

    pub fn clear_model(&self, model: &str) -> Result<(), CoreError> {
        self.apply(CrudEvent::ClearModel {
            model: model.to_owned(),
        })
    }

    fn send_update(&self, event: CrudEvent) -> Result<(), CoreError> {
        self.inner
            .update_tx
            .send(StateUpdate::new(event))
            .map_err(|_| CoreError::Stopped)
    }

    // ── State observation ────────────────────────────────────────

    /// Current snapshot.
    pub fn state(&self) -> Arc<CrudState> {
        Arc::clone(&self.inner.state.borrow())
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> StateStream {
        StateStream::new(self.inner.state.subscribe())
    }

    /// Subscribe to every folded event, including generic-call results.
    pub fn events(&self) -> broadcast::Receiver<Arc<CrudEvent>> {
        self.inner.event_tx.subscribe()
    }

    /// Subscribe to lifecycle changes.
    pub fn run_state(&self) -> watch::Receiver<RunState> {
        self.inner.run_state.subscribe()
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Folds queued events into the state, one at a time, in enqueue order.
///
/// Publishes a new snapshot only when the reducer produced one, then
/// broadcasts the event and answers any waiting requester.
async fn state_writer_task(
    inner: Arc<OrchestratorInner>,
    mut rx: mpsc::UnboundedReceiver<StateUpdate>,
    cancel: CancellationToken,
) {
    loop {
        let update = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            update = rx.recv() => match update {
                Some(update) => update,
                None => break,
            },
        };

        let StateUpdate { event, reply } = update;
        let event = Arc::new(event);
        let changed = inner.state.send_if_modified(|state| {
            let next = reduce(state, &event);
            if Arc::ptr_eq(state, &next) {
                return false;
            }
            *state = next;
            true
        });
        trace!(kind = event.kind_name(), changed, "event folded");

        // No subscribers is fine.
        let _ = inner.event_tx.send(Arc::clone(&event));
        if let Some(reply) = reply {
            let _ = reply.send(event);
        }
    }
    debug!("state writer stopped");
}

/// What a request handler needs, detached from the orchestrator.
#[derive(Clone)]
struct RequestContext {
    transport: Arc<dyn Transport>,
    normalizer: Arc<dyn Normalizer>,
    clock: Clock,
    update_tx: mpsc::UnboundedSender<StateUpdate>,
}

/// Receives intents of one kind and runs each in its own handler.
///
/// Handlers run concurrently; identical intents are not merged.
async fn intent_worker_task(
    ctx: RequestContext,
    kind: IntentKind,
    mut rx: mpsc::Receiver<IntentEnvelope>,
    cancel: CancellationToken,
) {
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    warn!(%kind, error = %e, "request handler failed");
                }
            }
            envelope = rx.recv() => match envelope {
                Some(envelope) => {
                    in_flight.spawn(perform_request(ctx.clone(), envelope));
                }
                None => break,
            },
        }
    }
    in_flight.abort_all();
    debug!(%kind, "intent worker stopped");
}

/// Issue one request and queue its result event.
///
/// Transport errors never escape: they become failure events.
async fn perform_request(ctx: RequestContext, envelope: IntentEnvelope) {
    let IntentEnvelope { intent, reply } = envelope;
    let fetch_time = (ctx.clock)();
    let request = &intent.request;

    debug!(
        kind = %intent.kind,
        model = %intent.model,
        method = %request.method,
        path = %request.path,
        "issuing request"
    );

    let event = match ctx
        .transport
        .request(request.method, &request.path, request.options())
        .await
    {
        Ok(response) => intent.success_event(response, ctx.normalizer.as_ref(), fetch_time),
        Err(err) => {
            warn!(
                kind = %intent.kind,
                model = %intent.model,
                path = %request.path,
                error = %err,
                "request failed"
            );
            intent.failure_event(&err, fetch_time)
        }
    };

    if ctx.update_tx.send(StateUpdate { event, reply }).is_err() {
        debug!(model = %intent.model, "state writer gone, result dropped");
    }
}

/// Emits a garbage-collect event after the initial delay and then once
/// per period.
async fn gc_timer_task(
    gc: GcConfig,
    clock: Clock,
    update_tx: mpsc::UnboundedSender<StateUpdate>,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        () = tokio::time::sleep(gc.initial_delay) => {}
    }

    let mut interval = tokio::time::interval(gc.period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let now = clock();
                debug!(now, "garbage collection sweep");
                if update_tx.send(StateUpdate::new(CrudEvent::GarbageCollect { now })).is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use restcache_api::{ApiResponse, Method, RequestOptions};

    struct Unreachable;

    #[async_trait::async_trait]
    impl Transport for Unreachable {
        async fn request(
            &self,
            _method: Method,
            _path: &str,
            _options: RequestOptions,
        ) -> Result<ApiResponse, restcache_api::Error> {
            Err(restcache_api::Error::Tls("unreachable".into()))
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(OrchestratorConfig::default().without_gc(), Arc::new(Unreachable))
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let orch = orchestrator();
        orch.start().await.unwrap();
        assert!(matches!(orch.start().await, Err(CoreError::AlreadyStarted)));
        orch.shutdown().await;
        assert!(matches!(orch.start().await, Err(CoreError::Stopped)));
        assert_eq!(*orch.run_state().borrow(), RunState::Stopped);
    }

    #[tokio::test]
    async fn events_applied_before_start_are_folded_on_start() {
        let orch = orchestrator();
        orch.clear_model("books").unwrap();
        assert!(orch.state().is_empty());

        let mut stream = orch.subscribe();
        orch.start().await.unwrap();
        let state = stream.wait_until(|s| s.model("books").is_some()).await.unwrap();
        assert_eq!(state.len(), 1);
        orch.shutdown().await;
    }

    #[tokio::test]
    async fn apply_after_shutdown_fails() {
        let orch = orchestrator();
        orch.start().await.unwrap();
        orch.shutdown().await;
        assert!(matches!(orch.clear_model("books"), Err(CoreError::Stopped)));
    }
}
