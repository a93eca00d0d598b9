//! Observer events and background refresh
//!
//! Managers publish `ManagerEvent`s to any number of subscribers. The
//! `RefreshHandle` drives the combined coordinator from a background task and
//! reports each cycle to the front end over a tokio channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::combined::CombinedForecastManager;
use crate::data::CombinedForecast;
use crate::manager::CacheInfo;

/// Events published by a forecast manager or the combined coordinator
#[derive(Debug, Clone)]
pub enum ManagerEvent<F> {
    /// A fresh forecast replaced the cached one
    ForecastUpdated(F),
    /// A fetch failed; the message is user-presentable
    FetchError(String),
    /// A fetch started (`true`) or finished (`false`)
    LoadingStateChanged(bool),
    /// The cache was filled or cleared
    CacheStatusChanged(CacheInfo),
}

/// Registered event subscribers
///
/// Subscribers whose receiver has been dropped are pruned on the next send.
pub struct Subscribers<F> {
    senders: Mutex<Vec<mpsc::UnboundedSender<ManagerEvent<F>>>>,
}

impl<F: Clone> Subscribers<F> {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new subscriber
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ManagerEvent<F>> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut senders) = self.senders.lock() {
            senders.push(tx);
        }
        rx
    }

    /// Sends an event to every live subscriber
    pub fn emit(&self, event: ManagerEvent<F>) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Emits `LoadingStateChanged(true)` now and `LoadingStateChanged(false)`
    /// when the returned guard drops
    pub fn loading(&self) -> LoadingGuard<'_, F> {
        self.emit(ManagerEvent::LoadingStateChanged(true));
        LoadingGuard { subscribers: self }
    }
}

impl<F: Clone> Default for Subscribers<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Reports the end of a fetch on every exit path
pub struct LoadingGuard<'a, F: Clone> {
    subscribers: &'a Subscribers<F>,
}

impl<F: Clone> Drop for LoadingGuard<'_, F> {
    fn drop(&mut self) {
        self.subscribers
            .emit(ManagerEvent::LoadingStateChanged(false));
    }
}

/// Messages sent from background refresh to the front end
#[derive(Debug, Clone)]
pub enum RefreshMessage {
    /// Refresh started
    RefreshStarted,
    /// Combined forecast updated
    CombinedUpdated(Box<CombinedForecast>),
    /// An error occurred during refresh
    RefreshError(String),
    /// Refresh completed
    RefreshCompleted,
}

/// Configuration for the refresh interval
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Interval between combined refreshes
    pub interval: Duration,
    /// Whether auto-refresh is enabled
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300), // 5 minutes
            enabled: true,
        }
    }
}

/// Handle for controlling the background refresh task
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    /// Requests an out-of-schedule forced refresh
    refresh_tx: mpsc::Sender<()>,
    /// Flag to signal shutdown
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Spawns the background refresh task for `coordinator`
    ///
    /// The first cycle runs one interval after spawning; call
    /// `request_refresh` to run one sooner.
    pub fn spawn(coordinator: Arc<CombinedForecastManager>, config: RefreshConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.interval);
                // Skip the first tick (immediate)
                interval.tick().await;

                loop {
                    let force = tokio::select! {
                        _ = interval.tick() => false,
                        Some(()) = refresh_rx.recv() => true,
                        _ = shutdown_rx.recv() => break,
                    };
                    if !run_cycle(&coordinator, &msg_tx, force).await {
                        debug!("Refresh receiver dropped, stopping");
                        break;
                    }
                }
            });
        }

        Self {
            receiver: msg_rx,
            refresh_tx,
            shutdown_tx,
        }
    }

    /// Requests an immediate forced refresh
    ///
    /// A request made while one is already pending is merged into it.
    pub async fn request_refresh(&self) {
        let _ = self.refresh_tx.try_send(());
    }

    /// Shuts down the background refresh task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Runs one refresh cycle; returns false once nobody is listening
async fn run_cycle(
    coordinator: &CombinedForecastManager,
    tx: &mpsc::Sender<RefreshMessage>,
    force: bool,
) -> bool {
    if tx.send(RefreshMessage::RefreshStarted).await.is_err() {
        return false;
    }

    let update = match coordinator.get_combined_forecast(None, force).await {
        Ok(forecast) => RefreshMessage::CombinedUpdated(Box::new(forecast)),
        Err(e) => {
            warn!(error = %e, "Background refresh failed");
            RefreshMessage::RefreshError(e.to_string())
        }
    };

    tx.send(update).await.is_ok() && tx.send(RefreshMessage::RefreshCompleted).await.is_ok()
}

/// Checks for pending refresh messages without blocking
///
/// # Returns
/// * `Some(RefreshMessage)` if a message was available
/// * `None` if no messages are pending
pub fn try_recv(handle: &mut RefreshHandle) -> Option<RefreshMessage> {
    handle.receiver.try_recv().ok()
}
