//! Zero-downtime spec reload.
//!
//! Raw file events are coalesced by [`debounce`] into reload triggers. The
//! [`ReloadOrchestrator`] owns at most one running server and replaces it
//! with stop-then-start ordering, so two listeners never share a port.

use crate::config::{load_spec, MockSpec, SpecError};
use crate::history::HistoryRecorder;
use crate::server::{build_router, ServerError, ServerHandle, SpecMeta};
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Window used to coalesce bursts of file events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Error building or starting a server.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Builds and tears down server instances.
#[async_trait]
pub trait Launcher: Send + Sync {
    type Server: Send + 'static;

    /// Load the spec and start listening.
    async fn launch(&self) -> Result<Self::Server, ReloadError>;

    /// Stop a server and release its listener.
    async fn shutdown(&self, server: Self::Server) -> Result<(), ReloadError>;

    /// Single recovery start after a failed reload.
    async fn recover(&self) -> Result<Self::Server, ReloadError> {
        self.launch().await
    }
}

/// Launches HTTP servers for the spec file at a fixed address.
pub struct SpecLauncher {
    spec_path: PathBuf,
    addr: SocketAddr,
    history: Arc<HistoryRecorder>,
    last_good: Mutex<Option<Arc<MockSpec>>>,
}

impl SpecLauncher {
    pub fn new(spec_path: impl Into<PathBuf>, addr: SocketAddr, history: Arc<HistoryRecorder>) -> Self {
        Self {
            spec_path: spec_path.into(),
            addr,
            history,
            last_good: Mutex::new(None),
        }
    }

    async fn serve(&self, spec: Arc<MockSpec>) -> Result<ServerHandle, ReloadError> {
        let meta = SpecMeta::new(self.spec_path.display().to_string());
        let router = build_router(spec, meta, Arc::clone(&self.history))?;
        Ok(ServerHandle::start(self.addr, router).await?)
    }

    fn last_good(&self) -> Option<Arc<MockSpec>> {
        self.last_good
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Launcher for SpecLauncher {
    type Server = ServerHandle;

    async fn launch(&self) -> Result<ServerHandle, ReloadError> {
        let spec = Arc::new(load_spec(&self.spec_path)?);
        info!(
            path = %self.spec_path.display(),
            endpoints = spec.endpoints.len(),
            variants = spec.variant_count(),
            "Spec loaded"
        );

        let server = self.serve(Arc::clone(&spec)).await?;
        *self
            .last_good
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(spec);
        Ok(server)
    }

    async fn shutdown(&self, server: ServerHandle) -> Result<(), ReloadError> {
        Ok(server.stop().await?)
    }

    /// Re-read the file; if it is still invalid, serve the last valid spec.
    async fn recover(&self) -> Result<ServerHandle, ReloadError> {
        match self.launch().await {
            Err(ReloadError::Spec(err)) => match self.last_good() {
                Some(spec) => {
                    warn!(error = %err, "Spec still invalid, serving the last valid spec");
                    self.serve(spec).await
                }
                None => Err(err.into()),
            },
            result => result,
        }
    }
}

/// Orchestrator state. Triggers seen while `Reloading` are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    Reloading,
}

/// How a reload ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// New server built from the updated spec is running
    Reloaded,
    /// Reload failed but the recovery start succeeded
    Recovered,
    /// Reload and recovery both failed; nothing is listening
    Down,
}

/// Sole owner of the active server.
pub struct ReloadOrchestrator<L: Launcher> {
    launcher: L,
    active: Option<L::Server>,
    state: ReloadState,
}

impl<L: Launcher> ReloadOrchestrator<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            active: None,
            state: ReloadState::Idle,
        }
    }

    /// Initial start. Errors are returned, not recovered.
    pub async fn start(&mut self) -> Result<(), ReloadError> {
        let server = self.launcher.launch().await?;
        self.active = Some(server);
        Ok(())
    }

    pub fn state(&self) -> ReloadState {
        self.state
    }

    pub fn active(&self) -> Option<&L::Server> {
        self.active.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Stop the active server, then start a new one from the spec.
    pub async fn reload(&mut self) -> ReloadOutcome {
        self.state = ReloadState::Reloading;
        let outcome = self.replace_active().await;
        self.state = ReloadState::Idle;
        outcome
    }

    async fn replace_active(&mut self) -> ReloadOutcome {
        if let Some(server) = self.active.take() {
            if let Err(err) = self.launcher.shutdown(server).await {
                warn!(error = %err, "Previous server did not stop cleanly");
            }
        }

        let err = match self.launcher.launch().await {
            Ok(server) => {
                self.active = Some(server);
                info!("Spec reloaded");
                return ReloadOutcome::Reloaded;
            }
            Err(err) => err,
        };
        error!(error = %err, "Reload failed");

        // Nothing is listening now; one recovery start
        match self.launcher.recover().await {
            Ok(server) => {
                self.active = Some(server);
                warn!("Recovered after failed reload");
                ReloadOutcome::Recovered
            }
            Err(err) => {
                error!(error = %err, "Recovery failed, server is down until the next spec change");
                ReloadOutcome::Down
            }
        }
    }

    /// Reload on each trigger until `shutdown` resolves or triggers close.
    ///
    /// An in-flight reload always runs to completion; triggers queued
    /// meanwhile are discarded.
    pub async fn run<F>(&mut self, mut triggers: mpsc::UnboundedReceiver<()>, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                trigger = triggers.recv() => {
                    if trigger.is_none() {
                        break;
                    }
                    let outcome = self.reload().await;
                    debug!(?outcome, "Reload finished");

                    let mut dropped = 0usize;
                    while triggers.try_recv().is_ok() {
                        dropped += 1;
                    }
                    if dropped > 0 {
                        debug!(dropped, "Ignored triggers received during reload");
                    }
                }
            }
        }
    }

    /// Stop the active server, if any.
    pub async fn shutdown(&mut self) -> Result<(), ReloadError> {
        match self.active.take() {
            Some(server) => self.launcher.shutdown(server).await,
            None => Ok(()),
        }
    }
}

/// Coalesce raw events into triggers.
///
/// The first event opens a fixed window; everything arriving before it
/// closes collapses into one trigger. Returns when `events` closes.
pub async fn debounce(
    mut events: mpsc::UnboundedReceiver<()>,
    triggers: mpsc::UnboundedSender<()>,
    window: Duration,
) {
    while events.recv().await.is_some() {
        let deadline = tokio::time::Instant::now() + window;
        let mut closed = false;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                event = events.recv() => {
                    if event.is_none() {
                        closed = true;
                        break;
                    }
                }
            }
        }

        debug!("Spec change settled, triggering reload");
        if triggers.send(()).is_err() || closed {
            return;
        }
    }
}
