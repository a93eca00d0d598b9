//! Sliding-window rate limiting decorator
//!
//! Requests over budget are delayed until the oldest request in the window
//! ages out. Nothing is ever rejected.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::ForecastSource;
use crate::data::Location;
use crate::error::ApiError;

/// Length of the sliding window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

/// Wraps a source with a request budget per sliding window
pub struct RateLimitedSource<S> {
    inner: S,
    budget: usize,
    window: Duration,
    recent: Mutex<VecDeque<Instant>>,
}

impl<S: ForecastSource> RateLimitedSource<S> {
    /// Allows `requests_per_hour` calls per sliding hour
    pub fn new(inner: S, requests_per_hour: usize) -> Self {
        Self {
            inner,
            budget: requests_per_hour.max(1),
            window: DEFAULT_WINDOW,
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Overrides the window length
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Requests recorded inside the current window
    pub async fn requests_in_window(&self) -> usize {
        let mut recent = self.recent.lock().await;
        prune(&mut recent, Instant::now(), self.window);
        recent.len()
    }

    /// Waits until the budget allows another request, then records it
    async fn acquire(&self) {
        loop {
            let wait = {
                let mut recent = self.recent.lock().await;
                let now = Instant::now();
                prune(&mut recent, now, self.window);

                if recent.len() < self.budget {
                    recent.push_back(now);
                    return;
                }
                match recent.front() {
                    Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            warn!(
                source = self.inner.name(),
                budget = self.budget,
                wait_secs = wait.as_secs_f64(),
                "Rate limit budget exhausted, delaying request"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

fn prune(recent: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = recent.front() {
        if now.saturating_duration_since(oldest) >= window {
            recent.pop_front();
        } else {
            break;
        }
    }
}

#[async_trait]
impl<S: ForecastSource> ForecastSource for RateLimitedSource<S> {
    type Forecast = S::Forecast;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch_forecast(
        &self,
        location: &Location,
        days: u32,
    ) -> Result<Self::Forecast, ApiError> {
        self.acquire().await;
        debug!(source = self.inner.name(), "Rate limiter admitted request");
        self.inner.fetch_forecast(location, days).await
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await
    }
}
