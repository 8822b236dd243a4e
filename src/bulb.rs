use crate::connection::{Connection, Event};
use crate::correlator::Correlator;
use crate::error::{BulbError, Result};
use crate::projection::project;
use crate::protocol::{ErrorBody, Inbound, Method, DEVICE_OFF_CODE};
use crate::recovery::{compensation_for, RetryGuard};
use crate::subscription::{BulbEvent, StateReceiver};
use crate::types::{BulbState, Change, Connectivity, Endpoint, LinkState, Switch, UpdateSource};
use serde_json::{Map, Value};
use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

/// Pause between tearing down an old connection and opening a new one
const SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Delay before the property refresh that follows every (re)connect
const RESYNC_DELAY: Duration = Duration::from_secs(1);

/// Fixed delay between reconnect attempts
pub const RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Background tasks owned by a session
#[derive(Default)]
struct Tasks {
    supervisor: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
}

impl Tasks {
    /// Abort every task and wait until each one has actually stopped
    async fn abort_all(&mut self) {
        for handle in [self.supervisor.take(), self.poller.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
            let _ = handle.await;
        }
    }
}

struct Inner {
    endpoint: Mutex<Endpoint>,
    state: Mutex<BulbState>,
    link: Mutex<LinkState>,
    guard: Mutex<RetryGuard>,
    correlator: Correlator,
    /// Send queue of the open connection, `None` while disconnected
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Held for the whole of initialize/shutdown so those never interleave
    tasks: tokio::sync::Mutex<Tasks>,
    events: broadcast::Sender<BulbEvent>,
}

/// Control session for a single bulb
///
/// A `Bulb` owns at most one TCP connection to its endpoint. It keeps the
/// connection alive in the background, reconnecting after a fixed delay,
/// polls the bulb's properties periodically and keeps a canonical
/// [`BulbState`] up to date from replies and property pushes.
///
/// Cloning a `Bulb` yields another handle to the same session.
///
/// # Example
///
/// ```no_run
/// use yeelight_lan::{Bulb, Endpoint};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let bulb = Bulb::new(Endpoint::new("192.168.1.50"));
///     bulb.initialize().await?;
///
///     bulb.on();
///     bulb.set_color_temperature(2700, Some(60), None);
///
///     let mut events = bulb.subscribe();
///     while let Ok(event) = events.recv().await {
///         println!("{:?}", event);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Bulb {
    inner: Arc<Inner>,
}

impl Bulb {
    /// Create a session for `endpoint`; nothing is opened until [`Bulb::initialize`]
    pub fn new(endpoint: Endpoint) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            inner: Arc::new(Inner {
                endpoint: Mutex::new(endpoint),
                state: Mutex::new(BulbState::default()),
                link: Mutex::new(LinkState::Idle),
                guard: Mutex::new(RetryGuard::Normal),
                correlator: Correlator::new(),
                outbound: Mutex::new(None),
                tasks: tokio::sync::Mutex::new(Tasks::default()),
                events,
            }),
        }
    }

    /// (Re)start the session
    ///
    /// Cancels any running connection and poll loop, closes the socket, then
    /// connects and schedules polling. Calling it again is always safe and
    /// never leaves duplicate background loops behind.
    ///
    /// Fails only when the endpoint address is missing or not a dotted-quad
    /// IPv4 address, in which case nothing is scheduled. Transport failures
    /// are retried in the background.
    pub async fn initialize(&self) -> Result<()> {
        let mut tasks = self.inner.tasks.lock().await;
        self.teardown(&mut tasks).await;

        sleep(SETTLE_DELAY).await;

        let endpoint = self.endpoint();
        let peer = match endpoint.socket_addr() {
            Ok(peer) => peer,
            Err(e) => {
                tracing::error!("Not connecting: {}", e);
                return Err(e);
            }
        };

        tasks.supervisor = Some(tokio::spawn(self.clone().supervise(peer)));
        tasks.poller = endpoint.poll_interval().map(|period| self.spawn_poller(period));

        Ok(())
    }

    /// Replace the endpoint and re-initialize the session
    pub async fn reconfigure(&self, endpoint: Endpoint) -> Result<()> {
        tracing::info!("Reconfiguring bulb: {:?}", endpoint);
        *lock(&self.inner.endpoint) = endpoint;
        self.initialize().await
    }

    /// Stop all background work and close the connection
    pub async fn shutdown(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        self.teardown(&mut tasks).await;
    }

    /// Snapshot of the canonical state
    pub fn state(&self) -> BulbState {
        lock(&self.inner.state).clone()
    }

    /// The endpoint the session connects to
    pub fn endpoint(&self) -> Endpoint {
        lock(&self.inner.endpoint).clone()
    }

    /// Where the connection lifecycle currently stands
    pub fn link_state(&self) -> LinkState {
        *lock(&self.inner.link)
    }

    /// Subscribe to state and connectivity events
    pub fn subscribe(&self) -> StateReceiver {
        StateReceiver::new(self.inner.events.subscribe())
    }

    /// Whether a power-on compensation is currently in flight
    pub fn retry_guard(&self) -> RetryGuard {
        *lock(&self.inner.guard)
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    async fn teardown(&self, tasks: &mut Tasks) {
        // once awaited, the old supervisor can no longer publish a sender or link state
        tasks.abort_all().await;
        lock(&self.inner.outbound).take();

        let was = std::mem::replace(&mut *lock(&self.inner.link), LinkState::Idle);
        if was == LinkState::Connected {
            self.apply(
                vec![Change::Connectivity(Connectivity::Disconnected)],
                UpdateSource::Confirmed,
            );
        }
    }

    fn spawn_poller(&self, period: Duration) -> JoinHandle<()> {
        let bulb = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                bulb.poll();
            }
        })
    }

    /// Connection loop: connect, serve until the link drops, wait, repeat
    async fn supervise(self, peer: SocketAddrV4) {
        loop {
            self.set_link(LinkState::Connecting);

            match Connection::open(peer).await {
                Ok((connection, tx)) => {
                    *lock(&self.inner.outbound) = Some(tx);
                    self.set_link(LinkState::Connected);
                    tracing::info!("Connected to {}", peer);
                    self.apply(
                        vec![Change::Connectivity(Connectivity::Connected)],
                        UpdateSource::Confirmed,
                    );

                    let reason = self.serve(connection).await;
                    tracing::warn!("Connection to {} lost: {}", peer, reason);
                }
                Err(e) => {
                    tracing::warn!("Failed to connect to {}: {}", peer, e);
                }
            }

            self.mark_disconnected();
            tracing::info!("Reconnecting to {} in {:?}", peer, RECONNECT_DELAY);
            sleep(RECONNECT_DELAY).await;
        }
    }

    async fn serve(&self, mut connection: Connection) -> BulbError {
        let resync = sleep(RESYNC_DELAY);
        tokio::pin!(resync);
        let mut resynced = false;

        let reason = loop {
            tokio::select! {
                event = connection.next_event() => match event {
                    Ok(Event::Inbound(line)) => self.handle_line(&line),
                    // written outside the select so the resync timer cannot cut it short
                    Ok(Event::Outbound(line)) => {
                        if let Err(e) = connection.write_line(&line).await {
                            break e;
                        }
                    }
                    Err(e) => break e,
                },
                () = &mut resync, if !resynced => {
                    resynced = true;
                    self.refresh();
                }
            }
        };

        connection.close().await;
        reason
    }

    fn mark_disconnected(&self) {
        lock(&self.inner.outbound).take();
        self.set_link(LinkState::Disconnected);
        self.apply(
            vec![Change::Connectivity(Connectivity::Disconnected)],
            UpdateSource::Confirmed,
        );
    }

    fn set_link(&self, link: LinkState) {
        *lock(&self.inner.link) = link;
    }

    /// Apply changes to the canonical state and publish them
    pub(crate) fn apply(&self, changes: Vec<Change>, source: UpdateSource) {
        if changes.is_empty() {
            return;
        }
        // published under the state lock so subscribers see changes in apply order
        let mut state = lock(&self.inner.state);
        for change in changes {
            state.apply(&change);
            let _ = self.inner.events.send(BulbEvent { change, source });
        }
    }

    /// Queue a request on the open connection and register it as pending
    ///
    /// Commands issued while disconnected are dropped.
    pub(crate) fn send(&self, method: Method, params: Vec<Value>) {
        // held across register + queue so wire order follows id order
        let outbound = lock(&self.inner.outbound);
        let Some(tx) = outbound.as_ref() else {
            tracing::debug!("Not connected, dropping {:?} {:?}", method, params);
            return;
        };

        let request = self.inner.correlator.register(method, params, Instant::now());
        let line = match request.encode() {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to encode {:?}: {}", method, e);
                self.inner.correlator.cancel(request.id);
                return;
            }
        };

        if tx.send(line).is_err() {
            tracing::debug!("Connection closed, dropping {:?}", method);
            self.inner.correlator.cancel(request.id);
        }
    }

    /// Handle one inbound line
    pub(crate) fn handle_line(&self, line: &str) {
        let message = match Inbound::decode(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping malformed message {:?}: {}", line, e);
                return;
            }
        };

        let now = Instant::now();
        match message {
            Inbound::Result { id, result } => self.handle_result(id, result, now),
            Inbound::Error { id, error } => self.handle_error(id, error, now),
            Inbound::Notification { params } => {
                self.inner.correlator.sweep(now);
                self.apply(project(&params), UpdateSource::Confirmed);
            }
        }
    }

    fn handle_result(&self, id: u64, result: Vec<Value>, now: Instant) {
        let pending = self.inner.correlator.take(id, now);
        self.set_guard(RetryGuard::Normal);

        let Some(pending) = pending else {
            tracing::debug!("Ignoring reply to unknown request {}", id);
            return;
        };

        if pending.method == Method::GetProp {
            let props: Map<String, Value> = pending
                .params
                .iter()
                .filter_map(|name| name.as_str().map(str::to_string))
                .zip(result)
                .collect();
            self.apply(project(&props), UpdateSource::Confirmed);
        }
    }

    fn handle_error(&self, id: Option<u64>, error: ErrorBody, now: Instant) {
        let Some(id) = id else {
            // some firmware answers with an id-less error; nothing to match
            self.inner.correlator.sweep(now);
            tracing::debug!("Ignoring error without id: {:?}", error);
            return;
        };

        let pending = self.inner.correlator.take(id, now);
        let guard = self.retry_guard();

        match pending {
            Some(failed)
                if error.code == DEVICE_OFF_CODE
                    && failed.method.is_compensable()
                    && guard == RetryGuard::Normal =>
            {
                match compensation_for(&failed, &self.state()) {
                    Some(params) => {
                        tracing::info!(
                            "Bulb is off, replaying {:?} {:?} as a power-on scene",
                            failed.method,
                            failed.params
                        );
                        self.set_guard(RetryGuard::AwaitingCompensation);
                        self.apply(vec![Change::Switch(Switch::On)], UpdateSource::Optimistic);
                        self.send(Method::SetScene, params);
                    }
                    None => {
                        tracing::warn!("Cannot compensate {:?} {:?}", failed.method, failed.params);
                    }
                }
            }
            other => {
                let method = other.map(|p| p.method);
                let err = BulbError::Device {
                    code: error.code,
                    message: error.message,
                };
                tracing::warn!("Request {} ({:?}) failed: {}", id, method, err);

                if guard.is_awaiting() {
                    tracing::warn!("Compensating command failed, not retrying again");
                    self.set_guard(RetryGuard::Normal);
                }
            }
        }
    }

    fn set_guard(&self, guard: RetryGuard) {
        *lock(&self.inner.guard) = guard;
    }

    /// Install a send queue without a socket so tests can inspect outgoing lines
    #[cfg(test)]
    pub(crate) fn attach_queue(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.inner.outbound) = Some(tx);
        rx
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
