//! Process shutdown for the gateway.
//!
//! Order matters: the relay engine closes every viewer (1001) and every
//! upstream first, then the listener token fires and the HTTP server drains.

use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::EngineHandle;

/// Used when the caller does not pass a drain deadline.
const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

/// Owns the token the HTTP listener stops on.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    listener_stop: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator whose token has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to `axum::serve(..).with_graceful_shutdown`.
    pub fn token(&self) -> CancellationToken {
        self.listener_stop.clone()
    }

    /// Stop accepting connections. Idempotent.
    pub fn shutdown(&self) {
        self.listener_stop.cancel();
    }

    /// `true` once [`shutdown`](Self::shutdown) has run.
    pub fn is_shutting_down(&self) -> bool {
        self.listener_stop.is_cancelled()
    }

    /// Close viewers and upstreams through `engine`, stop the listener, then
    /// give `tasks` until `deadline` to finish.
    pub async fn graceful_shutdown(
        &self,
        engine: &EngineHandle,
        tasks: Vec<JoinHandle<()>>,
        deadline: Option<Duration>,
    ) {
        let deadline = deadline.unwrap_or(DRAIN_DEADLINE);

        if let Err(err) = engine.shutdown().await {
            warn!(error = %err, "relay engine was not running");
        } else {
            info!("viewers and upstreams closed");
        }
        self.shutdown();

        let pending = tasks.len();
        info!(pending, deadline_secs = deadline.as_secs(), "draining gateway tasks");
        if tokio::time::timeout(deadline, join_all(tasks)).await.is_err() {
            warn!(pending, "drain deadline passed, abandoning remaining tasks");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use gateway_core::{Location, LocationRegistry};
    use tokio::sync::mpsc;

    use crate::config::EngineConfig;
    use crate::engine::clients::{ClientConnection, ClientId, Outbound};
    use crate::engine::spawn_engine;
    use crate::engine::upstream::{UpstreamConnector, UpstreamHandle, UpstreamSink};

    struct NeverConnects;

    impl UpstreamConnector for NeverConnects {
        fn open(&self, _location: &Location, _sink: UpstreamSink) -> UpstreamHandle {
            UpstreamHandle::new(CancellationToken::new())
        }
    }

    fn engine() -> (EngineHandle, JoinHandle<()>) {
        let registry = LocationRegistry::from_config([("north", "ws://north/WS/")], None).unwrap();
        spawn_engine(registry, Arc::new(NeverConnects), &EngineConfig::default())
    }

    #[test]
    fn fresh_coordinator_is_running() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert!(!coord.token().is_cancelled());
    }

    #[test]
    fn shutdown_fires_tokens_handed_out_earlier() {
        let coord = ShutdownCoordinator::default();
        let listener = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(listener.is_cancelled());
    }

    #[tokio::test]
    async fn viewers_get_going_away_before_tasks_drain() {
        let coord = ShutdownCoordinator::new();
        let (engine, engine_task) = engine();
        let (tx, mut rx) = mpsc::channel(4);
        engine
            .subscribe(ClientConnection::new(ClientId::new(), vec!["north".into()], tx))
            .await
            .unwrap();
        let stop = coord.token();
        let listener = tokio::spawn(async move { stop.cancelled().await });

        coord
            .graceful_shutdown(&engine, vec![listener, engine_task], None)
            .await;

        assert!(coord.is_shutting_down());
        assert!(matches!(rx.recv().await, Some(Outbound::Text(_))));
        assert!(matches!(
            rx.recv().await,
            Some(Outbound::Close { code: 1001, .. })
        ));
        assert!(engine.status().await.is_err());
    }

    #[tokio::test]
    async fn stopped_engine_still_stops_listener() {
        let coord = ShutdownCoordinator::new();
        let (engine, task) = engine();
        engine.shutdown().await.unwrap();
        task.await.unwrap();
        coord.graceful_shutdown(&engine, Vec::new(), None).await;
        assert!(coord.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_task_is_abandoned_after_deadline() {
        let coord = ShutdownCoordinator::new();
        let (engine, _task) = engine();
        let stuck = tokio::spawn(tokio::time::sleep(Duration::from_secs(300)));
        coord
            .graceful_shutdown(&engine, vec![stuck], Some(Duration::from_millis(100)))
            .await;
        assert!(coord.is_shutting_down());
    }
}
