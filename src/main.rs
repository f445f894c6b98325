#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate rocket;

use config::Config;
use envoy_toggle_rs::api;
use envoy_toggle_rs::api::endpoint;
use envoy_toggle_rs::coordinator::{Coordinator, SessionSummary, DEFAULT_SCAN_INTERVAL};
use envoy_toggle_rs::model::{ClientOptions, Endpoints, Session};
use envoy_toggle_rs::setup;
use envoy_toggle_rs::switch::ProductionSwitch;
use rocket::serde::json::Json;
use rocket::State;
use std::sync::Arc;
use std::time::Duration;

mod metrics;

#[derive(Clone, serde::Deserialize)]
pub struct EnvoyConfig {
    host: String,
    username: String,
    password: String,
    serial_number: Option<String>,
    interval: u64,
    cloud_url: String,
    power_device_id: u64,
    debug_responses: bool,
}

impl EnvoyConfig {
    fn session(&self) -> Session {
        let endpoints = Endpoints {
            cloud_url: self.cloud_url.clone(),
            ..Endpoints::for_host(&self.host)
        };
        let options = ClientOptions {
            debug_responses: self.debug_responses,
            power_device_id: self.power_device_id,
            ..ClientOptions::default()
        };

        api::session(
            self.host.clone(),
            self.username.clone(),
            self.password.clone(),
        )
        .with_serial_number(self.serial_number.clone())
        .with_endpoints(endpoints)
        .with_options(options)
    }
}

/// Structure containing state for API handlers.
pub struct StateData {
    host: String,
    coordinator: Arc<Coordinator>,
    switch: ProductionSwitch,
}

#[derive(serde::Serialize)]
struct StatusReport {
    name: String,
    available: bool,
    is_on: bool,
    current_power: f64,
    is_producing: bool,
    last_error: Option<String>,
    /// Seconds since the last successful update
    data_age: Option<u64>,
}

impl StatusReport {
    fn read(state: &StateData) -> Self {
        let attributes = state.switch.attributes();
        StatusReport {
            name: state.switch.name().to_string(),
            available: state.switch.available(),
            is_on: state.switch.is_on(),
            current_power: attributes.current_power,
            is_producing: attributes.is_producing,
            last_error: state.coordinator.last_error(),
            data_age: state.coordinator.data_age(),
        }
    }
}

pub fn read_settings() -> Result<EnvoyConfig, config::ConfigError> {
    let mut settings = Config::default();
    settings
        .set_default("interval", DEFAULT_SCAN_INTERVAL as i64)?
        .set_default("cloud_url", endpoint::DEFAULT_CLOUD_URL)?
        .set_default("power_device_id", endpoint::DEFAULT_POWER_DEVICE_ID as i64)?
        .set_default("debug_responses", false)?
        .merge(config::Environment::with_prefix("ENVOY"))?;

    settings.try_into()
}

#[get("/metrics")]
fn metrics_route(state: &State<StateData>) -> Result<String, api::Error> {
    metrics::record(&state.host, &state.coordinator);
    metrics::read()
}

#[get("/status")]
fn status_route(state: &State<StateData>) -> Json<StatusReport> {
    Json(StatusReport::read(state))
}

#[post("/production/on")]
async fn turn_on_route(state: &State<StateData>) -> Result<Json<StatusReport>, api::Error> {
    state.switch.turn_on().await?;
    Ok(Json(StatusReport::read(state)))
}

#[post("/production/off")]
async fn turn_off_route(state: &State<StateData>) -> Result<Json<StatusReport>, api::Error> {
    state.switch.turn_off().await?;
    Ok(Json(StatusReport::read(state)))
}

#[get("/session")]
async fn session_route(state: &State<StateData>) -> Json<SessionSummary> {
    Json(state.coordinator.session_summary().await)
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let settings = read_settings()?;
    let title = setup::validate_input(settings.session()).await?;
    log::info!("Configuration accepted for {}", title);

    let coordinator = Arc::new(Coordinator::new(
        settings.session(),
        Duration::from_secs(settings.interval),
    ));
    if let Err(e) = coordinator.first_refresh().await {
        log::warn!("Initial update failed, will retry on schedule: {}", e);
    }
    let poller = tokio::spawn(Arc::clone(&coordinator).run());

    let state = StateData {
        host: settings.host.clone(),
        coordinator: Arc::clone(&coordinator),
        switch: ProductionSwitch::new(Arc::clone(&coordinator)),
    };

    let _rocket = rocket::build()
        .manage(state)
        .mount(
            "/",
            routes![
                metrics_route,
                status_route,
                turn_on_route,
                turn_off_route,
                session_route
            ],
        )
        .launch()
        .await?;

    poller.abort();
    coordinator.shutdown().await;
    Ok(())
}
