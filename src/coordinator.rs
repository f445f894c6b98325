use crate::api::{self, jwt};
use crate::model::{AuthState, ProductionSnapshot, Session};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

pub const DEFAULT_SCAN_INTERVAL: u64 = 30;

#[derive(Debug, Default)]
struct UpdateState {
    data: Option<ProductionSnapshot>,
    last_update_success: bool,
    last_error: Option<String>,
    /// Timestamp of last successful update
    last_update: Option<Instant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub host: String,
    pub state: AuthState,
    pub serial_number: Option<String>,
    pub connected: bool,
    /// `exp` claim of the cached token, seconds since the epoch
    pub token_expires_at: Option<i64>,
}

/// Periodically polls one Envoy and keeps the latest snapshot.
///
/// All access to the session goes through an async mutex, so the poll loop and
/// control commands never overlap on the wire.
pub struct Coordinator {
    session: tokio::sync::Mutex<Session>,
    state: Mutex<UpdateState>,
    interval: Duration,
}

impl Coordinator {
    pub fn new(session: Session, interval: Duration) -> Self {
        log::info!(
            "Coordinator for {} initialized with {} second update interval",
            session.host,
            interval.as_secs()
        );
        Coordinator {
            session: tokio::sync::Mutex::new(session),
            state: Mutex::new(UpdateState::default()),
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    async fn authenticated_status(
        session: &mut Session,
    ) -> Result<ProductionSnapshot, api::Error> {
        api::authenticate(session).await?;
        api::get_production_status(session).await
    }

    /// Authenticate, then fetch the first snapshot.
    pub async fn first_refresh(&self) -> Result<ProductionSnapshot, api::Error> {
        let mut session = self.session.lock().await;
        let result = Self::authenticated_status(&mut session).await;
        self.record(&result);
        result
    }

    /// Fetch a new snapshot. After a failed update the session logs in again
    /// first, so an expired or revoked token is replaced.
    pub async fn refresh(&self) -> Result<ProductionSnapshot, api::Error> {
        let mut session = self.session.lock().await;
        let result = if self.last_update_success() {
            api::get_production_status(&mut session).await
        } else {
            log::info!("Last update failed, authenticating {} again", session.host);
            Self::authenticated_status(&mut session).await
        };
        self.record(&result);
        result
    }

    /// Refresh now, logging instead of returning failures.
    pub async fn request_refresh(&self) {
        if let Err(e) = self.refresh().await {
            log::warn!("Requested refresh failed: {}", e);
        }
    }

    fn record(&self, result: &Result<ProductionSnapshot, api::Error>) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => {
                log::trace!("Unable to lock update state, result dropped");
                return;
            }
        };

        match result {
            Ok(snapshot) => {
                state.data = Some(*snapshot);
                state.last_update_success = true;
                state.last_error = None;
                state.last_update = Some(Instant::now());
            }
            Err(e) => {
                log::error!("Error communicating with Envoy: {}", e);
                state.last_update_success = false;
                state.last_error = Some(e.to_string());
            }
        }
    }

    /// Latest snapshot. Stays at the last good value after a failed update.
    pub fn data(&self) -> Option<ProductionSnapshot> {
        self.state.lock().ok().and_then(|s| s.data)
    }

    pub fn last_update_success(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.last_update_success)
            .unwrap_or(false)
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().ok().and_then(|s| s.last_error.clone())
    }

    /// Seconds since the last successful update
    pub fn data_age(&self) -> Option<u64> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.last_update.map(|t| t.elapsed().as_secs()))
    }

    pub async fn set_production_power(&self, enabled: bool) -> Result<(), api::Error> {
        let mut session = self.session.lock().await;
        api::set_production_power(&mut session, enabled).await
    }

    pub async fn session_summary(&self) -> SessionSummary {
        let session = self.session.lock().await;
        let token_expires_at = session
            .token()
            .and_then(|token| jwt::decode_claims(token).ok())
            .and_then(|claims| jwt::expires_at(&claims));

        SessionSummary {
            host: session.host.clone(),
            state: session.state(),
            serial_number: session.serial_number.clone(),
            connected: session.is_connected(),
            token_expires_at,
        }
    }

    /// Poll forever. The first tick is skipped since `first_refresh` covers it.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            log::debug!("Starting scheduled update");
            if let Err(e) = self.refresh().await {
                log::warn!(
                    "Update failed, retrying in {}s: {}",
                    self.interval.as_secs(),
                    e
                );
            }
        }
    }

    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        api::close(&mut session);
    }
}
