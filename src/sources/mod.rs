//! Forecast sources
//!
//! A `ForecastSource` turns `(location, days)` into one domain's forecast.
//! Raw sources (NASA aggregator, Open-Meteo) and decorators (rate limiting,
//! caching) all implement the same trait, so they stack in any order.

pub mod nasa;
pub mod rate_limit;
pub mod weather;

pub use nasa::NasaAstronomySource;
pub use rate_limit::RateLimitedSource;
pub use weather::OpenMeteoSource;

use std::sync::Arc;

use async_trait::async_trait;

use crate::data::Location;
use crate::error::ApiError;

/// Type-erased source stack, as held by the managers
pub type SharedSource<F> = Arc<dyn ForecastSource<Forecast = F>>;

/// Produces a forecast for a location
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Forecast type this source produces
    type Forecast: Clone + Send + Sync + 'static;

    /// Source name for logs and forecast metadata
    fn name(&self) -> &str;

    /// Fetches a forecast covering `days` days starting today
    async fn fetch_forecast(
        &self,
        location: &Location,
        days: u32,
    ) -> Result<Self::Forecast, ApiError>;

    /// Releases owned resources and shuts down wrapped sources
    async fn shutdown(&self);
}

#[async_trait]
impl<S: ForecastSource + ?Sized> ForecastSource for Arc<S> {
    type Forecast = S::Forecast;

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch_forecast(
        &self,
        location: &Location,
        days: u32,
    ) -> Result<Self::Forecast, ApiError> {
        (**self).fetch_forecast(location, days).await
    }

    async fn shutdown(&self) {
        (**self).shutdown().await
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted source for decorator and manager tests

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// Returns scripted results in order, then repeats `fallback`
    pub struct MockSource<F> {
        script: Mutex<VecDeque<Result<F, ApiError>>>,
        fallback: Result<F, ApiError>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        pub shut_down: AtomicBool,
    }

    impl<F: Clone + Send + Sync + 'static> MockSource<F> {
        pub fn returning(value: F) -> Self {
            Self::with_fallback(Ok(value))
        }

        pub fn failing(err: ApiError) -> Self {
            Self::with_fallback(Err(err))
        }

        fn with_fallback(fallback: Result<F, ApiError>) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback,
                delay: None,
                calls: AtomicUsize::new(0),
                shut_down: AtomicBool::new(false),
            }
        }

        /// Queues a one-off result ahead of the fallback
        pub fn then(self, result: Result<F, ApiError>) -> Self {
            self.script.lock().unwrap().push_back(result);
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<F: Clone + Send + Sync + 'static> ForecastSource for MockSource<F> {
        type Forecast = F;

        fn name(&self) -> &str {
            "mock"
        }

        async fn fetch_forecast(&self, _location: &Location, _days: u32) -> Result<F, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let scripted = self.script.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| self.fallback.clone())
        }

        async fn shutdown(&self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }
    }
}
