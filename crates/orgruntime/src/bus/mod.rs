//! The in-memory message bus, spec.md §4.1.
//!
//! Per-recipient `VecDeque<Envelope>` queues guarded by a
//! `parking_lot::Mutex`, a `BinaryHeap`-backed min-heap for the delayed
//! queue keyed on `(deliverAt, sendSeq)`, and one `tokio::sync::Notify`
//! per recipient for `waitForMessage`. Generalized from the teacher's
//! `mofa-kernel::bus::traits::MessageBus` (publish/subscribe/send/receive
//! shape) narrowed from topic pub-sub to direct per-agent queues, and
//! from `mofa-kernel::bus::queue::EventQueue`'s `Mutex<VecDeque>` +
//! `Notify` pairing.

mod delayed;

use delayed::DelayedQueue;
use orgkernel::{ComputeStatus, CoreError, CoreResult, Envelope, ShutdownSignal};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

/// Looks up an agent's current [`ComputeStatus`] without requiring the
/// bus to own the agent registry itself (that belongs to OrgPrimitives).
pub trait AgentStatusLookup: Send + Sync {
    fn status_of(&self, agent_id: &str) -> ComputeStatus;

    /// Whether `agent_id` has ever been registered (spawned or
    /// bootstrapped). `send` to an unknown agent rejects rather than
    /// silently queuing forever (spec.md §9 open question: "this spec
    /// chooses reject").
    fn exists(&self, agent_id: &str) -> bool;
}

/// Invoked before enqueueing a message to a recipient the bus observes as
/// actively processing (spec.md §4.1 "Interruption hook"). The envelope
/// is enqueued regardless of what this callback does or whether it
/// panics-equivalent-errors; it exists purely to let the LlmHandler abort
/// the in-flight call so the next turn observes the new message too.
#[async_trait::async_trait]
pub trait InterruptionHook: Send + Sync {
    async fn on_interruption_needed(&self, agent_id: &str, msg: &Envelope);
}

/// A no-op hook, used by tests and by any deployment that doesn't wire a
/// real LlmHandler (e.g. pure bus property tests).
pub struct NoopInterruptionHook;

#[async_trait::async_trait]
impl InterruptionHook for NoopInterruptionHook {
    async fn on_interruption_needed(&self, _agent_id: &str, _msg: &Envelope) {}
}

/// Fields needed to send one envelope (spec.md §4.1 `send` operation).
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub to: String,
    pub from: String,
    pub payload: serde_json::Value,
    pub task_id: Option<String>,
    /// Negative values are normalised to zero (spec.md §4.1).
    pub delay_ms: Option<i64>,
}

impl SendRequest {
    pub fn new(to: impl Into<String>, from: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { to: to.into(), from: from.into(), payload, task_id: None, delay_ms: None }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: i64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }
}

/// Successful outcome of [`MessageBus::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub message_id: Uuid,
    pub scheduled_delivery_time: Option<u64>,
}

struct RecipientState {
    queue: VecDeque<Envelope>,
    notify: Arc<Notify>,
}

impl RecipientState {
    fn new() -> Self {
        Self { queue: VecDeque::new(), notify: Arc::new(Notify::new()) }
    }
}

/// The message bus itself. Cheap to clone (everything behind `Arc`).
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<Inner>,
}

struct Inner {
    clock: Arc<dyn orgkernel::Clock>,
    recipients: Mutex<HashMap<String, RecipientState>>,
    delayed: Mutex<DelayedQueue>,
    send_seq: AtomicUsize,
    status_lookup: Mutex<Option<Arc<dyn AgentStatusLookup>>>,
    interruption_hook: Mutex<Arc<dyn InterruptionHook>>,
}

impl MessageBus {
    pub fn new(clock: Arc<dyn orgkernel::Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                recipients: Mutex::new(HashMap::new()),
                delayed: Mutex::new(DelayedQueue::new()),
                send_seq: AtomicUsize::new(0),
                status_lookup: Mutex::new(None),
                interruption_hook: Mutex::new(Arc::new(NoopInterruptionHook)),
            }),
        }
    }

    /// Wire the status lookup used by `send`'s rejection and interruption
    /// decisions. Done post-construction because OrgPrimitives and the
    /// bus are typically constructed together and each needs a handle to
    /// the other (spec.md §9 "Global mutable state": no ambient globals,
    /// so this wiring happens once in the `Runtime` aggregate).
    pub fn set_status_lookup(&self, lookup: Arc<dyn AgentStatusLookup>) {
        *self.inner.status_lookup.lock() = Some(lookup);
    }

    pub fn set_interruption_hook(&self, hook: Arc<dyn InterruptionHook>) {
        *self.inner.interruption_hook.lock() = hook;
    }

    fn status_of(&self, agent_id: &str) -> ComputeStatus {
        match self.inner.status_lookup.lock().as_ref() {
            Some(lookup) => lookup.status_of(agent_id),
            // Before wiring (e.g. bus-only unit tests) every agent is idle.
            None => ComputeStatus::Idle,
        }
    }

    /// Before wiring (bus-only unit tests), every agent is assumed to
    /// exist so those tests don't need a full `OrgPrimitives`.
    fn exists(&self, agent_id: &str) -> bool {
        match self.inner.status_lookup.lock().as_ref() {
            Some(lookup) => lookup.exists(agent_id),
            None => true,
        }
    }

    fn recipient_notify(&self, agent_id: &str) -> Arc<Notify> {
        let mut recipients = self.inner.recipients.lock();
        recipients.entry(agent_id.to_string()).or_insert_with(RecipientState::new).notify.clone()
    }

    /// Enqueue `msg` and send `to`, rejecting if the recipient is
    /// terminating/terminated and firing the interruption hook if the
    /// recipient is actively processing (spec.md §4.1).
    pub async fn send(&self, req: SendRequest) -> CoreResult<SendOutcome> {
        if !self.exists(&req.to) {
            tracing::warn!(to = %req.to, from = %req.from, "send rejected: agent_not_found");
            return Err(CoreError::AgentNotFound(req.to));
        }
        let status = self.status_of(&req.to);
        if status.rejects_sends() {
            tracing::warn!(to = %req.to, from = %req.from, "send rejected: agent_terminating");
            return Err(CoreError::AgentTerminating(req.to));
        }

        let mut envelope = Envelope::new(req.to.clone(), req.from.clone(), req.payload);
        if let Some(task_id) = req.task_id {
            envelope = envelope.with_task_id(task_id);
        }

        if status.is_actively_processing() {
            let hook = self.inner.interruption_hook.lock().clone();
            hook.on_interruption_needed(&req.to, &envelope).await;
        }

        let delay_ms = req.delay_ms.unwrap_or(0).max(0) as u64;
        let message_id = envelope.id;

        if delay_ms == 0 {
            tracing::debug!(to = %req.to, from = %req.from, %message_id, "send accepted: immediate");
            self.enqueue_immediate(envelope);
            Ok(SendOutcome { message_id, scheduled_delivery_time: None })
        } else {
            let deliver_at = self.inner.clock.now_millis() + delay_ms;
            envelope = envelope.with_deliver_at(deliver_at);
            let seq = self.inner.send_seq.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(to = %req.to, from = %req.from, %message_id, deliver_at, "send accepted: delayed");
            self.inner.delayed.lock().push(deliver_at, seq, envelope);
            Ok(SendOutcome { message_id, scheduled_delivery_time: Some(deliver_at) })
        }
    }

    fn enqueue_immediate(&self, envelope: Envelope) {
        let to = envelope.to.clone();
        let notify = {
            let mut recipients = self.inner.recipients.lock();
            let state = recipients.entry(to).or_insert_with(RecipientState::new);
            state.queue.push_back(envelope);
            state.notify.clone()
        };
        notify.notify_waiters();
    }

    /// Pop the next envelope addressed to `agent_id`, or `None` if its
    /// queue is empty (spec.md §4.1 `receiveNext`).
    pub fn receive_next(&self, agent_id: &str) -> Option<Envelope> {
        let mut recipients = self.inner.recipients.lock();
        recipients.get_mut(agent_id).and_then(|state| state.queue.pop_front())
    }

    /// Resolve once `agent_id`'s queue is non-empty or `shutdown` fires,
    /// whichever comes first (spec.md §4.1 `waitForMessage`).
    pub async fn wait_for_message(&self, agent_id: &str, shutdown: &ShutdownSignal) {
        if self.get_queue_depth(agent_id) > 0 || shutdown.is_requested() {
            return;
        }
        let notify = self.recipient_notify(agent_id);
        tokio::select! {
            _ = notify.notified() => {}
            _ = shutdown.cancelled() => {}
        }
    }

    /// Deliver every delayed envelope whose `deliverAt <= now`, in
    /// `(deliverAt, sendSeq)` order (spec.md §4.1, Property 5). Returns
    /// the number delivered.
    pub fn deliver_due_messages(&self) -> usize {
        self.deliver_up_to(self.inner.clock.now_millis())
    }

    /// Deliver every delayed envelope whose `deliverAt <= now`, used on
    /// graceful shutdown so in-flight timers due by the stop instant are
    /// still observed (spec.md §4.2, Property 6). Identical to
    /// [`MessageBus::deliver_due_messages`] — kept as a distinct method
    /// because the scheduler calls it as an explicit, final step.
    pub fn force_deliver_all_delayed(&self) -> usize {
        self.deliver_due_messages()
    }

    /// Drop every still-pending delayed envelope without delivering it
    /// (spec.md §4.2 "Forced" shutdown). Returns the number discarded.
    pub fn discard_all_delayed(&self) -> usize {
        let drained = self.inner.delayed.lock().drain_all();
        let count = drained.len();
        if count > 0 {
            tracing::warn!(count, "forced shutdown: discarding pending delayed messages");
        }
        count
    }

    fn deliver_up_to(&self, now: u64) -> usize {
        let due = self.inner.delayed.lock().pop_due(now);
        let count = due.len();
        for envelope in due {
            tracing::debug!(to = %envelope.to, id = %envelope.id, "delayed message delivered");
            self.enqueue_immediate(envelope);
        }
        count
    }

    pub fn get_queue_depth(&self, agent_id: &str) -> usize {
        self.inner.recipients.lock().get(agent_id).map(|s| s.queue.len()).unwrap_or(0)
    }

    pub fn get_delayed_count(&self) -> usize {
        self.inner.delayed.lock().len()
    }

    /// Agent IDs with a non-empty queue, in FIFO order of their oldest
    /// queued message (used by the scheduler's "oldest-queued first"
    /// dispatch rule, spec.md §4.2 step 3).
    pub fn agents_with_pending_messages(&self) -> Vec<String> {
        let recipients = self.inner.recipients.lock();
        let mut ordered: Vec<(&String, chrono::DateTime<chrono::Utc>)> = recipients
            .iter()
            .filter_map(|(id, state)| state.queue.front().map(|env| (id, env.created_at)))
            .collect();
        ordered.sort_by_key(|(_, created_at)| *created_at);
        ordered.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Remove all bookkeeping for a terminated agent's queue (spec.md
    /// §3.8 "Lifecycle": "a terminated agent's queue ... is removed").
    pub fn drop_recipient(&self, agent_id: &str) {
        self.inner.recipients.lock().remove(agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgkernel::SystemClock;
    use std::sync::atomic::AtomicU64;

    struct FixedClock(AtomicU64);
    impl orgkernel::Clock for FixedClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct AllIdle;
    impl AgentStatusLookup for AllIdle {
        fn status_of(&self, _agent_id: &str) -> ComputeStatus {
            ComputeStatus::Idle
        }
        fn exists(&self, _agent_id: &str) -> bool {
            true
        }
    }

    struct AllTerminating;
    impl AgentStatusLookup for AllTerminating {
        fn status_of(&self, _agent_id: &str) -> ComputeStatus {
            ComputeStatus::Terminating
        }
        fn exists(&self, _agent_id: &str) -> bool {
            true
        }
    }

    fn bus_with_clock(clock: Arc<dyn orgkernel::Clock>) -> MessageBus {
        let bus = MessageBus::new(clock);
        bus.set_status_lookup(Arc::new(AllIdle));
        bus
    }

    #[tokio::test]
    async fn p1_fifo_within_one_recipient() {
        let bus = bus_with_clock(Arc::new(SystemClock));
        bus.send(SendRequest::new("a", "user", serde_json::json!({"n": 1}))).await.unwrap();
        bus.send(SendRequest::new("a", "user", serde_json::json!({"n": 2}))).await.unwrap();
        let first = bus.receive_next("a").unwrap();
        let second = bus.receive_next("a").unwrap();
        assert_eq!(first.payload["n"], 1);
        assert_eq!(second.payload["n"], 2);
    }

    #[tokio::test]
    async fn p4_zero_delay_equals_immediate() {
        let bus = bus_with_clock(Arc::new(SystemClock));
        bus.send(SendRequest::new("a", "user", serde_json::json!({})).with_delay_ms(0)).await.unwrap();
        assert_eq!(bus.get_queue_depth("a"), 1);
        assert_eq!(bus.get_delayed_count(), 0);
    }

    #[tokio::test]
    async fn scenario_2_delayed_delivery() {
        let clock = Arc::new(FixedClock(AtomicU64::new(1_000)));
        let bus = bus_with_clock(clock.clone());
        bus.send(SendRequest::new("a", "user", serde_json::json!({"text": "x"})).with_delay_ms(100))
            .await
            .unwrap();
        assert_eq!(bus.get_queue_depth("a"), 0);
        assert_eq!(bus.get_delayed_count(), 1);

        clock.0.store(1_120, Ordering::SeqCst);
        let delivered = bus.deliver_due_messages();
        assert_eq!(delivered, 1);
        assert_eq!(bus.get_queue_depth("a"), 1);
    }

    #[tokio::test]
    async fn p2_not_visible_before_deliver_at() {
        let clock = Arc::new(FixedClock(AtomicU64::new(0)));
        let bus = bus_with_clock(clock.clone());
        bus.send(SendRequest::new("a", "user", serde_json::json!({})).with_delay_ms(500)).await.unwrap();
        clock.0.store(100, Ordering::SeqCst);
        assert_eq!(bus.deliver_due_messages(), 0);
        assert!(bus.receive_next("a").is_none());
    }

    #[tokio::test]
    async fn p5_stable_tie_break_on_equal_deliver_at() {
        let clock = Arc::new(FixedClock(AtomicU64::new(0)));
        let bus = bus_with_clock(clock.clone());
        bus.send(SendRequest::new("a", "user", serde_json::json!({"n": 1})).with_delay_ms(100))
            .await
            .unwrap();
        bus.send(SendRequest::new("a", "user", serde_json::json!({"n": 2})).with_delay_ms(100))
            .await
            .unwrap();
        clock.0.store(200, Ordering::SeqCst);
        assert_eq!(bus.deliver_due_messages(), 2);
        assert_eq!(bus.receive_next("a").unwrap().payload["n"], 1);
        assert_eq!(bus.receive_next("a").unwrap().payload["n"], 2);
    }

    #[tokio::test]
    async fn p6_graceful_shutdown_flushes_due_delayed() {
        let clock = Arc::new(FixedClock(AtomicU64::new(0)));
        let bus = bus_with_clock(clock.clone());
        bus.send(SendRequest::new("a", "user", serde_json::json!({})).with_delay_ms(50)).await.unwrap();
        clock.0.store(60, Ordering::SeqCst);
        assert_eq!(bus.force_deliver_all_delayed(), 1);
        assert_eq!(bus.get_queue_depth("a"), 1);
    }

    #[tokio::test]
    async fn scenario_5_terminating_recipient_rejects_send() {
        let bus = MessageBus::new(Arc::new(SystemClock));
        bus.set_status_lookup(Arc::new(AllTerminating));
        let err = bus.send(SendRequest::new("c", "parent", serde_json::json!({}))).await.unwrap_err();
        assert!(matches!(err, CoreError::AgentTerminating(id) if id == "c"));
    }

    #[tokio::test]
    async fn send_to_unregistered_agent_rejects() {
        struct NoneRegistered;
        impl AgentStatusLookup for NoneRegistered {
            fn status_of(&self, _agent_id: &str) -> ComputeStatus {
                ComputeStatus::Idle
            }
            fn exists(&self, _agent_id: &str) -> bool {
                false
            }
        }
        let bus = MessageBus::new(Arc::new(SystemClock));
        bus.set_status_lookup(Arc::new(NoneRegistered));
        let err = bus.send(SendRequest::new("ghost", "user", serde_json::json!({}))).await.unwrap_err();
        assert!(matches!(err, CoreError::AgentNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn negative_delay_normalises_to_zero() {
        let bus = bus_with_clock(Arc::new(SystemClock));
        bus.send(SendRequest::new("a", "user", serde_json::json!({})).with_delay_ms(-50)).await.unwrap();
        assert_eq!(bus.get_queue_depth("a"), 1);
        assert_eq!(bus.get_delayed_count(), 0);
    }

    #[tokio::test]
    async fn interruption_hook_fires_for_actively_processing_recipient() {
        struct Recorder(std::sync::Mutex<Vec<String>>);
        #[async_trait::async_trait]
        impl InterruptionHook for Recorder {
            async fn on_interruption_needed(&self, agent_id: &str, _msg: &Envelope) {
                self.0.lock().unwrap().push(agent_id.to_string());
            }
        }
        struct WaitingLlm;
        impl AgentStatusLookup for WaitingLlm {
            fn status_of(&self, _agent_id: &str) -> ComputeStatus {
                ComputeStatus::WaitingLlm
            }
            fn exists(&self, _agent_id: &str) -> bool {
                true
            }
        }

        let bus = MessageBus::new(Arc::new(SystemClock));
        bus.set_status_lookup(Arc::new(WaitingLlm));
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        bus.set_interruption_hook(recorder.clone());

        bus.send(SendRequest::new("b", "user", serde_json::json!({"text": "stop"}))).await.unwrap();
        assert_eq!(recorder.0.lock().unwrap().as_slice(), ["b"]);
        // Envelope is enqueued regardless of the hook's own behaviour.
        assert_eq!(bus.get_queue_depth("b"), 1);
    }

    #[tokio::test]
    async fn wait_for_message_resolves_on_send() {
        let bus = bus_with_clock(Arc::new(SystemClock));
        let shutdown = ShutdownSignal::new();
        let bus2 = bus.clone();
        let shutdown2 = shutdown.clone();
        let handle = tokio::spawn(async move {
            bus2.wait_for_message("a", &shutdown2).await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        bus.send(SendRequest::new("a", "user", serde_json::json!({}))).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_millis(200), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_for_message_resolves_on_shutdown() {
        let bus = bus_with_clock(Arc::new(SystemClock));
        let shutdown = ShutdownSignal::new();
        let bus2 = bus.clone();
        let shutdown2 = shutdown.clone();
        let handle = tokio::spawn(async move {
            bus2.wait_for_message("nobody", &shutdown2).await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        shutdown.request();
        tokio::time::timeout(std::time::Duration::from_millis(200), handle).await.unwrap().unwrap();
    }
}
