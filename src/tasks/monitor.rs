//! Connection Monitor Task
//!
//! Follows the manager's lifecycle events and resolves once the store
//! connection is given up on, so the owner can shut down.

use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::connection::ConnectionEvent;

/// Spawns a task that logs connection events until exhaustion.
///
/// # Arguments
/// * `events` - Receiver from `ConnectionManager::subscribe`
///
/// # Returns
/// A JoinHandle resolving to the attempt count when an `Exhausted` event
/// arrives, or `None` when the manager is dropped.
pub fn spawn_connection_monitor(mut events: Receiver<ConnectionEvent>) -> JoinHandle<Option<u32>> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::Exhausted { attempts }) => {
                    error!(attempts, "Store connection exhausted");
                    return Some(attempts);
                }
                Ok(event) => debug!(?event, "Connection event"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Connection monitor fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{BackoffPolicy, ConnectionManager, MemoryConnector};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_monitor_resolves_on_background_exhaustion() {
        let connector = MemoryConnector::new();
        let policy = BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(50), 2);
        let manager = ConnectionManager::new(Arc::new(connector.clone()), policy);
        manager.connect().await.unwrap();

        let monitor = spawn_connection_monitor(manager.subscribe());
        connector.set_offline(true);
        manager.report_failure("connection reset by peer");

        assert_eq!(monitor.await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_monitor_ends_when_manager_dropped() {
        let manager = ConnectionManager::new(
            Arc::new(MemoryConnector::new()),
            BackoffPolicy::default(),
        );
        let monitor = spawn_connection_monitor(manager.subscribe());
        drop(manager);

        assert_eq!(monitor.await.unwrap(), None);
    }
}
