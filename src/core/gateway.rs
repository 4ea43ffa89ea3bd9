// src/core/gateway.rs

//! The gateway: a single task that owns every connection's state, reassembles
//! requests from transport chunks, dispatches them to the pipeline and answers
//! each connection exactly once.
//!
//! All handlers run to completion without awaiting. The only suspension point is
//! the `select!` in [`Gateway::run`], which waits on transport events, completion
//! events, the sweep timer and shutdown.

use crate::config::Config;
use crate::connection::ConnectionWriter;
use crate::core::GatewayError;
use crate::core::assembler::{FrameAssembler, MalformedReason, RawRequest, RequestState};
use crate::core::dispatcher::WorkDispatcher;
use crate::core::events::CompletionEvent;
use crate::core::identity::ConnectionIdentity;
use crate::core::metrics::MALFORMED_REQUESTS_TOTAL;
use crate::core::protocol::{HttpRequest, HttpResponse};
use crate::core::pubsub::{CompletionSubscription, InterruptBus};
use crate::core::router::{ResultRouter, RouteResult, deliver};
use crate::core::state::{ConnectionState, ConnectionTable, GatewayStats};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// The most events taken from each channel per drain pass.
const DRAIN_BATCH: usize = 64;

/// The body of the canned health check response.
pub const HEALTH_CHECK_BODY: &str = "OK";

/// What the transport reports about a connection.
#[derive(Debug)]
pub enum TransportEvent {
    Connected {
        identity: ConnectionIdentity,
        writer: ConnectionWriter,
    },
    Data {
        identity: ConnectionIdentity,
        chunk: Bytes,
    },
    Disconnected {
        identity: ConnectionIdentity,
    },
}

/// The limits and options the gateway applies to every connection.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub max_request_size: usize,
    pub assembly_timeout: Duration,
    pub request_timeout: Duration,
    pub sweep_interval: Duration,
    pub health_check_path: Option<String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            max_request_size: 8192,
            assembly_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_millis(250),
            health_check_path: None,
        }
    }
}

impl From<&Config> for GatewaySettings {
    fn from(config: &Config) -> Self {
        Self {
            max_request_size: config.limits.max_request_size,
            assembly_timeout: config.limits.assembly_timeout,
            request_timeout: config.limits.request_timeout,
            sweep_interval: config.limits.sweep_interval,
            health_check_path: config.health_check_path.clone(),
        }
    }
}

pub struct Gateway {
    settings: GatewaySettings,
    table: ConnectionTable,
    assembler: FrameAssembler,
    dispatcher: WorkDispatcher,
    router: ResultRouter,
    interrupts: InterruptBus,
    stats: Arc<GatewayStats>,
}

impl Gateway {
    pub fn new(
        settings: GatewaySettings,
        dispatcher: WorkDispatcher,
        interrupts: InterruptBus,
        stats: Arc<GatewayStats>,
    ) -> Self {
        let assembler = FrameAssembler::new(settings.max_request_size, settings.assembly_timeout);
        Self {
            settings,
            table: ConnectionTable::new(),
            assembler,
            dispatcher,
            router: ResultRouter::new(),
            interrupts,
            stats,
        }
    }

    /// Handles one transport event observed at `now`.
    pub fn handle_transport(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Connected { identity, writer } => {
                debug!("Connection {} opened", identity);
                if let Some(evicted) = self.table.open(identity.clone(), writer, now) {
                    warn!(
                        "Token reused by {} while {} was still registered",
                        identity, evicted.identity
                    );
                    self.abandon(&evicted.identity, evicted.state());
                    evicted.writer.close();
                }
                self.stats.increment_total_connections();
            }
            TransportEvent::Data { identity, chunk } => self.on_data(identity, chunk, now),
            TransportEvent::Disconnected { identity } => {
                if let Some(entry) = self.table.remove(&identity) {
                    debug!("Connection {} closed by client", identity);
                    self.abandon(&identity, entry.state());
                }
                self.assembler.release(&identity);
            }
        }
        self.sync_stats();
    }

    /// Routes a completion event to its connection.
    pub fn handle_completion(&mut self, event: CompletionEvent) -> RouteResult {
        let result = self.router.on_event(&mut self.table, event);
        match result {
            RouteResult::Delivered(_) => self.stats.increment_responses_sent(),
            RouteResult::Orphaned => self.stats.increment_orphan_events(),
        }
        self.sync_stats();
        result
    }

    /// Rejects stalled and idle connections and times out requests the pipeline
    /// has not answered.
    pub fn sweep(&mut self, now: Instant) {
        let assembly_timeout = self.settings.assembly_timeout;
        for identity in self.assembler.sweep_stalled(now) {
            if self.table.state_of(&identity) == Some(ConnectionState::OpenAwaitingRequest) {
                self.reject(&identity, MalformedReason::Stalled(assembly_timeout));
            }
        }
        for identity in self.table.idle_awaiting(now, assembly_timeout) {
            if !self.assembler.is_buffering(&identity) {
                self.reject(&identity, MalformedReason::Stalled(assembly_timeout));
            }
        }

        let request_timeout = self.settings.request_timeout;
        for identity in self.table.expired_dispatched(now, request_timeout) {
            warn!("Request {} timed out after {:?}", identity, request_timeout);
            self.interrupts.interrupt(identity.clone());
            let e = GatewayError::RequestTimeout(request_timeout);
            self.respond_and_close(&identity, HttpResponse::error(e.status(), &e.to_string()));
        }
        self.sync_stats();
    }

    pub fn stats(&self) -> &Arc<GatewayStats> {
        &self.stats
    }

    pub fn table(&self) -> &ConnectionTable {
        &self.table
    }

    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    /// The main event loop. Runs until shutdown or until the transport goes away.
    pub async fn run(
        mut self,
        mut intake: mpsc::UnboundedReceiver<TransportEvent>,
        mut results: CompletionSubscription,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Gateway started.");
        let mut sweep = tokio::time::interval(self.settings.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Gateway received shutdown signal.");
                    break;
                }
                Some(event) = results.recv() => {
                    self.handle_completion(event);
                }
                maybe_event = intake.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_transport(event, Instant::now()),
                        None => {
                            info!("Transport intake closed.");
                            break;
                        }
                    }
                }
                _ = sweep.tick() => {
                    self.sweep(Instant::now());
                }
            }
            self.drain(&mut intake, &mut results);
        }

        self.close_all();
        info!("Gateway stopped.");
    }

    /// Takes whatever is immediately available from both channels, alternating so
    /// neither starves the other.
    fn drain(
        &mut self,
        intake: &mut mpsc::UnboundedReceiver<TransportEvent>,
        results: &mut CompletionSubscription,
    ) {
        for _ in 0..DRAIN_BATCH {
            let mut progressed = false;
            if let Some(event) = results.try_recv() {
                self.handle_completion(event);
                progressed = true;
            }
            if let Ok(event) = intake.try_recv() {
                self.handle_transport(event, Instant::now());
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    fn on_data(&mut self, identity: ConnectionIdentity, chunk: Bytes, now: Instant) {
        match self.table.state_of(&identity) {
            Some(ConnectionState::OpenAwaitingRequest) => {
                match self.assembler.feed_at(&identity, &chunk, now) {
                    RequestState::Incomplete => {}
                    RequestState::Complete(raw) => self.on_request(identity, raw, now),
                    RequestState::Malformed(reason) => self.reject(&identity, reason),
                }
            }
            Some(ConnectionState::RequestDispatched) => {
                if let RequestState::Complete(_) = self.assembler.feed_at(&identity, &chunk, now) {
                    self.reject_duplicate(&identity);
                }
            }
            Some(state) => {
                debug!("Ignoring data for {} in state {}", identity, state);
            }
            None => {
                warn!("Data for unknown connection {}", identity);
            }
        }
    }

    fn on_request(&mut self, identity: ConnectionIdentity, raw: RawRequest, now: Instant) {
        let request = match HttpRequest::parse(raw.as_bytes()) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejecting request from {}: {}", identity, e);
                MALFORMED_REQUESTS_TOTAL
                    .with_label_values(&["unparseable"])
                    .inc();
                self.respond_and_close(&identity, HttpResponse::error(e.status(), &e.to_string()));
                return;
            }
        };

        if self
            .settings
            .health_check_path
            .as_deref()
            .is_some_and(|path| path == request.path)
        {
            self.respond_and_close(&identity, HttpResponse::ok(HEALTH_CHECK_BODY));
            return;
        }

        match self.dispatcher.dispatch(identity.clone(), raw) {
            Ok(()) => {
                self.table
                    .transition(&identity, ConnectionState::RequestDispatched, now);
                self.stats.increment_requests_dispatched();
            }
            Err(e) => {
                warn!("Could not dispatch request from {}: {}", identity, e);
                self.respond_and_close(&identity, HttpResponse::error(e.status(), &e.to_string()));
            }
        }
    }

    /// Answers a second request on a connection that is still waiting for its first.
    /// The connection stays open and the pending request is untouched.
    ///
    /// The 400 is written ahead of the pending request's response on the same
    /// stream, so a client that reads one response per connection sees the 400
    /// as the answer to its first request.
    fn reject_duplicate(&mut self, identity: &ConnectionIdentity) {
        let Some(entry) = self.table.get_mut(identity) else {
            return;
        };
        if entry.extra_request_rejected {
            return;
        }
        entry.extra_request_rejected = true;
        let e = GatewayError::DuplicateDispatch(identity.to_string());
        debug!("{}", e);
        entry
            .writer
            .write(HttpResponse::error(e.status(), &e.to_string()));
    }

    fn reject(&mut self, identity: &ConnectionIdentity, reason: MalformedReason) {
        debug!("Rejecting input from {}: {}", identity, reason);
        MALFORMED_REQUESTS_TOTAL
            .with_label_values(&[reason.label()])
            .inc();
        let e = GatewayError::MalformedRequest(reason.to_string());
        self.respond_and_close(identity, HttpResponse::error(e.status(), &e.to_string()));
    }

    /// Writes `response`, closes the connection and forgets it.
    fn respond_and_close(&mut self, identity: &ConnectionIdentity, response: HttpResponse) -> bool {
        self.assembler.release(identity);
        self.table
            .transition(identity, ConnectionState::ResponseSent, Instant::now());
        match self.table.remove(identity) {
            Some(entry) => {
                deliver(entry, response);
                self.stats.increment_responses_sent();
                true
            }
            None => false,
        }
    }

    /// Tells the workers a connection's outstanding request is no longer wanted.
    fn abandon(&mut self, identity: &ConnectionIdentity, state: ConnectionState) {
        self.assembler.release(identity);
        if state == ConnectionState::RequestDispatched {
            self.interrupts.interrupt(identity.clone());
        }
    }

    fn close_all(&mut self) {
        let entries = self.table.drain();
        if !entries.is_empty() {
            info!("Closing {} open connections.", entries.len());
        }
        for entry in entries {
            if entry.dispatched_at.is_some() {
                self.interrupts.interrupt(entry.identity.clone());
            }
            self.assembler.release(&entry.identity);
            let e = GatewayError::Internal("server is shutting down".to_string());
            deliver(entry, HttpResponse::error(e.status(), &e.to_string()));
        }
        self.sync_stats();
    }

    fn sync_stats(&self) {
        self.stats
            .set_occupancy(self.table.len(), self.table.dispatched_count());
    }
}
