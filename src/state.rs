use std::sync::Arc;

use actix_web::web;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use failsafe::backoff::EqualJittered;
use failsafe::failure_policy::{ConsecutiveFailures, OrElse, SuccessRateOverTimeWindow};
use failsafe::{CircuitBreaker, StateMachine};
use log::warn;

use crate::auth::TokenService;
use crate::cache::FoodCache;
use crate::clock::Clock;
use crate::error::ApiError;
use crate::store::Store;

pub type CircuitBreakerType = StateMachine<
    OrElse<SuccessRateOverTimeWindow<EqualJittered>, ConsecutiveFailures<EqualJittered>>,
    (),
>;

/// Everything a blocking store call may touch.
pub struct Backend {
    pub store: Box<dyn Store>,
    pub cache: FoodCache,
}

#[derive(Clone)]
pub struct AppState {
    backend: Arc<Backend>,
    breaker: CircuitBreakerType,
    pub tokens: TokenService,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl AppState {
    pub fn new(
        backend: Backend,
        tokens: TokenService,
        clock: Arc<dyn Clock>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            backend: Arc::new(backend),
            breaker: failsafe::Config::new().build(),
            tokens,
            clock,
            offset,
        }
    }

    /// Runs `f` on the blocking pool behind the circuit breaker. Only store
    /// outages count as failures; an open breaker answers 503.
    pub async fn run<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Backend) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let breaker = self.breaker.clone();
        let result = web::block(move || {
            breaker.call_with(|err: &ApiError| err.is_outage(), || f(&backend))
        })
        .await?;

        result.map_err(|err| match err {
            failsafe::Error::Inner(err) => err,
            failsafe::Error::Rejected => {
                warn!("circuit breaker open, rejecting store call");
                ApiError::Unavailable
            }
        })
    }

    pub fn utc_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current instant as stored on records (UTC).
    pub fn now(&self) -> NaiveDateTime {
        self.utc_now().naive_utc()
    }

    /// Calendar date in the service timezone.
    pub fn today(&self) -> NaiveDate {
        self.utc_now().with_timezone(&self.offset).date_naive()
    }
}
