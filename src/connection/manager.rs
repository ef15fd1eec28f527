//! Connection Manager
//!
//! Owns the single logical session to the store: connects, notices
//! failures, backs off, retries and reports readiness.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use crate::connection::backoff::BackoffPolicy;
use crate::connection::state::{ConnectionEvent, ConnectionInfo, ConnectionState};
use crate::connection::transport::{Connector, Transport};
use crate::error::{CacheError, Result};

/// Lifecycle events buffered per subscriber.
const EVENT_BUFFER: usize = 64;

#[derive(Default)]
struct Inner {
    /// Consecutive failures in the current sequence
    attempt: u32,
    transport: Option<Arc<dyn Transport>>,
    connected_at: Option<DateTime<Utc>>,
    reconnects: u64,
    last_error: Option<String>,
    /// Bumped by `disconnect()`; a sequence started in an older epoch stops
    epoch: u64,
}

// == Connection Manager ==
/// Shared, injectable handle to the store connection.
///
/// State writes happen under the `inner` lock so that claiming a
/// (re)connection sequence is a single check-and-set: at most one sequence
/// runs at a time.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    policy: BackoffPolicy,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    inner: Mutex<Inner>,
}

impl ConnectionManager {
    // == Constructor ==
    /// Creates a disconnected manager. Call `connect()` before use.
    pub fn new(connector: Arc<dyn Connector>, policy: BackoffPolicy) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self {
            connector,
            policy,
            state,
            events,
            inner: Mutex::new(Inner::default()),
        })
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: ConnectionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    // == Readiness ==
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Snapshot for health endpoints.
    pub fn connection_info(&self) -> ConnectionInfo {
        let inner = self.inner();
        ConnectionInfo {
            state: self.state(),
            endpoint: self.connector.endpoint(),
            attempt: inner.attempt,
            reconnects: inner.reconnects,
            connected_at: inner.connected_at,
            last_error: inner.last_error.clone(),
        }
    }

    // == Connect ==
    /// Connects, retrying per the backoff policy.
    ///
    /// From `Disconnected` or `Exhausted` this starts a fresh sequence with
    /// the attempt counter reset. If a sequence is already running the call
    /// waits for its outcome instead of starting another one.
    ///
    /// # Errors
    /// `ConnectionExhausted` once `max_attempts` consecutive attempts failed.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        let epoch = {
            let mut inner = self.inner();
            match self.state() {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Connecting | ConnectionState::Reconnecting => None,
                ConnectionState::Disconnected | ConnectionState::Exhausted => {
                    inner.attempt = 0;
                    self.set_state(ConnectionState::Connecting);
                    Some(inner.epoch)
                }
            }
        };

        match epoch {
            Some(epoch) => {
                info!(endpoint = %self.connector.endpoint(), "Connecting to store");
                self.run_sequence(epoch, false).await
            }
            None => self.wait_settled().await,
        }
    }

    /// Waits until no sequence is running and reports the outcome.
    pub async fn wait_settled(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        let state = *rx
            .wait_for(|state| !state.is_transitional())
            .await
            .map_err(|_| CacheError::Connection("connection manager closed".to_string()))?;

        match state {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Exhausted => Err(CacheError::ConnectionExhausted {
                attempts: self.inner().attempt,
            }),
            other => Err(CacheError::Connection(format!("connection is {other}"))),
        }
    }

    async fn run_sequence(self: &Arc<Self>, epoch: u64, reconnect: bool) -> Result<()> {
        loop {
            let outcome = self.connector.connect().await;

            let delay = {
                let mut inner = self.inner();
                if inner.epoch != epoch {
                    return Err(CacheError::Connection(
                        "connection sequence cancelled".to_string(),
                    ));
                }

                match outcome {
                    Ok(transport) => {
                        inner.transport = Some(transport);
                        inner.attempt = 0;
                        inner.connected_at = Some(Utc::now());
                        if reconnect {
                            inner.reconnects += 1;
                        }
                        self.set_state(ConnectionState::Ready);
                        drop(inner);

                        if reconnect {
                            info!("Store connection re-established");
                            self.emit(ConnectionEvent::Reconnected);
                        } else {
                            info!("Store connection ready");
                            self.emit(ConnectionEvent::Connected);
                        }
                        return Ok(());
                    }
                    Err(err) => {
                        inner.attempt += 1;
                        inner.last_error = Some(err.to_string());
                        let attempt = inner.attempt;

                        warn!(attempt, error = %err, "Store connection attempt failed");
                        self.emit(ConnectionEvent::Error {
                            attempt,
                            message: err.to_string(),
                        });

                        if self.policy.is_exhausted(attempt) {
                            self.set_state(ConnectionState::Exhausted);
                            drop(inner);
                            error!(attempts = attempt, "Giving up on store connection");
                            self.emit(ConnectionEvent::Exhausted { attempts: attempt });
                            return Err(CacheError::ConnectionExhausted { attempts: attempt });
                        }

                        let delay = self.policy.delay(attempt);
                        self.emit(ConnectionEvent::Reconnecting {
                            attempt,
                            delay_ms: delay.as_millis() as u64,
                        });
                        delay
                    }
                }
            };

            tokio::time::sleep(delay).await;
        }
    }

    // == Failure Reporting ==
    /// Called when an operation hit a transport failure.
    ///
    /// Only the first report against a `Ready` connection starts the
    /// background reconnection; later reports are no-ops until it settles.
    pub fn report_failure(self: &Arc<Self>, reason: &str) {
        let epoch = {
            let mut inner = self.inner();
            if self.state() != ConnectionState::Ready {
                return;
            }
            inner.transport = None;
            inner.attempt = 0;
            inner.last_error = Some(reason.to_string());
            self.set_state(ConnectionState::Reconnecting);
            inner.epoch
        };

        warn!(reason, "Store connection lost, reconnecting");
        self.emit(ConnectionEvent::Disconnected {
            reason: reason.to_string(),
        });

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = manager.run_sequence(epoch, true).await {
                error!(error = %err, "Background reconnection ended");
            }
        });
    }

    // == Disconnect ==
    /// Drops the session and cancels any running sequence.
    pub fn disconnect(&self) {
        {
            let mut inner = self.inner();
            inner.epoch += 1;
            inner.transport = None;
            inner.connected_at = None;
            self.set_state(ConnectionState::Disconnected);
        }
        info!("Store connection closed");
        self.emit(ConnectionEvent::Disconnected {
            reason: "disconnect requested".to_string(),
        });
    }

    // == Transport Access ==
    /// Returns the live session, failing fast when not ready.
    pub fn transport(&self) -> Result<Arc<dyn Transport>> {
        let inner = self.inner();
        match self.state() {
            ConnectionState::Ready => inner
                .transport
                .clone()
                .ok_or_else(|| CacheError::StoreUnavailable("no active session".to_string())),
            ConnectionState::Exhausted => Err(CacheError::ConnectionExhausted {
                attempts: inner.attempt,
            }),
            state => Err(CacheError::StoreUnavailable(format!("connection is {state}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryConnector;
    use std::time::Duration;

    fn policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(100), Duration::from_millis(500), max_attempts)
    }

    fn manager(max_attempts: u32) -> (MemoryConnector, Arc<ConnectionManager>) {
        let connector = MemoryConnector::new();
        let manager = ConnectionManager::new(Arc::new(connector.clone()), policy(max_attempts));
        (connector, manager)
    }

    #[tokio::test]
    async fn test_connect_reaches_ready() {
        let (_, manager) = manager(3);
        let mut events = manager.subscribe();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.transport().is_err());

        manager.connect().await.unwrap();

        assert!(manager.is_ready());
        assert!(manager.transport().is_ok());
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);
        let info = manager.connection_info();
        assert_eq!(info.endpoint, "memory");
        assert!(info.connected_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_with_backoff() {
        let (connector, manager) = manager(5);
        connector.refuse_next_connects(2);

        let started = tokio::time::Instant::now();
        manager.connect().await.unwrap();

        assert!(manager.is_ready());
        assert_eq!(connector.connect_attempts(), 3);
        // 100ms after the first failure, 200ms after the second
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(350));
        assert_eq!(manager.connection_info().attempt, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_terminal_until_explicit_connect() {
        let (connector, manager) = manager(3);
        connector.set_offline(true);

        let result = manager.connect().await;
        assert_eq!(result, Err(CacheError::ConnectionExhausted { attempts: 3 }));
        assert_eq!(manager.state(), ConnectionState::Exhausted);
        assert_eq!(connector.connect_attempts(), 3);
        assert!(matches!(
            manager.transport(),
            Err(CacheError::ConnectionExhausted { .. })
        ));

        // nothing retries on its own
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.connect_attempts(), 3);

        connector.set_offline(false);
        manager.connect().await.unwrap();
        assert!(manager.is_ready());
        assert_eq!(connector.connect_attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_connect_resets_attempt_counter() {
        let (connector, manager) = manager(2);
        connector.set_offline(true);
        assert!(manager.connect().await.is_err());

        // two more failures are allowed again after a fresh connect()
        connector.set_offline(false);
        connector.refuse_next_connects(1);
        manager.connect().await.unwrap();
        assert_eq!(connector.connect_attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failure_reports_start_one_reconnect() {
        let (connector, manager) = manager(5);
        manager.connect().await.unwrap();
        let mut events = manager.subscribe();

        connector.drop_connections();
        connector.refuse_next_connects(2);
        for _ in 0..10 {
            manager.report_failure("connection reset");
        }
        assert_eq!(manager.state(), ConnectionState::Reconnecting);

        manager.wait_settled().await.unwrap();

        // one initial connect, then one loop: two refusals and a success
        assert_eq!(connector.connect_attempts(), 4);
        assert_eq!(manager.connection_info().reconnects, 1);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        let disconnects = seen
            .iter()
            .filter(|e| matches!(e, ConnectionEvent::Disconnected { .. }))
            .count();
        assert_eq!(disconnects, 1);
        assert_eq!(seen.last(), Some(&ConnectionEvent::Reconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_reconnect_can_exhaust() {
        let (connector, manager) = manager(3);
        manager.connect().await.unwrap();

        connector.set_offline(true);
        manager.report_failure("connection reset");

        let result = manager.wait_settled().await;
        assert_eq!(result, Err(CacheError::ConnectionExhausted { attempts: 3 }));
        assert_eq!(manager.state(), ConnectionState::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connect_calls_share_one_sequence() {
        let (connector, manager) = manager(5);
        connector.refuse_next_connects(1);

        let (a, b) = tokio::join!(manager.connect(), manager.connect());

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(connector.connect_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_reconnection() {
        let (connector, manager) = manager(10);
        manager.connect().await.unwrap();

        connector.set_offline(true);
        manager.report_failure("connection reset");
        manager.disconnect();
        connector.set_offline(false);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(
            manager.transport(),
            Err(CacheError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_report_failure_ignored_when_not_ready() {
        let (connector, manager) = manager(3);

        manager.report_failure("boom");

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connector.connect_attempts(), 0);
    }
}
