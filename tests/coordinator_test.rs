// Scheduler, switch and configuration validation against a wiremock Envoy.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use envoy_toggle_rs::api;
use envoy_toggle_rs::coordinator::Coordinator;
use envoy_toggle_rs::model::{AuthState, Endpoints, Session};
use envoy_toggle_rs::setup;
use envoy_toggle_rs::switch::{ProductionSwitch, SwitchAttributes, DEFAULT_NAME};
use envoy_toggle_rs::Error;

const HOST: &str = "192.0.2.1";
const POWER_PATH: &str = "/ivp/mod/603980032/mode/power";

// ── Helpers ─────────────────────────────────────────────────────────

fn session_for(server: &MockServer) -> Session {
    api::session(HOST.into(), "owner@example.com".into(), "secret".into())
        .with_serial_number(Some("122112345678".into()))
        .with_endpoints(Endpoints {
            cloud_url: server.uri(),
            device_url: server.uri(),
            info_url: server.uri(),
        })
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "https://192.0.2.1/auth/callback?code=abc123"),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok1"})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/check_jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Valid token."))
        .mount(server)
        .await;
}

async fn start() -> (MockServer, Arc<Coordinator>) {
    let server = MockServer::start().await;
    let coordinator = Arc::new(Coordinator::new(
        session_for(&server),
        Duration::from_secs(30),
    ));
    (server, coordinator)
}

// ── Coordinator ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_refresh() {
    let (server, coordinator) = start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/production.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"production": [{"wNow": 5000}]})),
        )
        .mount(&server)
        .await;

    let snapshot = coordinator.first_refresh().await.unwrap();

    assert_eq!(5000.0, snapshot.current_power);
    assert_eq!(Some(snapshot), coordinator.data());
    assert!(coordinator.last_update_success());
    assert_eq!(None, coordinator.last_error());
    assert_eq!(Some(0), coordinator.data_age());

    let summary = coordinator.session_summary().await;
    assert_eq!(AuthState::Validated, summary.state);
    assert_eq!(Some("122112345678".to_string()), summary.serial_number);
    assert!(summary.connected);
    // opaque token, no expiry to report
    assert_eq!(None, summary.token_expires_at);
}

#[tokio::test]
async fn test_failed_refresh_keeps_stale_data() {
    let (server, coordinator) = start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/production.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"production": [{"wNow": 1200}]})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/production.json"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    coordinator.first_refresh().await.unwrap();
    let result = coordinator.refresh().await;

    assert!(matches!(result, Err(Error::ApiError { status: 503, .. })));
    assert!(!coordinator.last_update_success());
    assert_eq!(Some(1200.0), coordinator.data().map(|d| d.current_power));
    assert_eq!(
        Some("device responded 503: busy".to_string()),
        coordinator.last_error()
    );
}

#[tokio::test]
async fn test_refresh_after_rejected_token_logs_in_again() {
    let (server, coordinator) = start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "https://192.0.2.1/auth/callback?code=abc123"),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok1"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok2"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/check_jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Valid token."))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/production.json"))
        .and(header("Authorization", "Bearer tok1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"production": [{"wNow": 800}]})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/production.json"))
        .and(header("Authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/production.json"))
        .and(header("Authorization", "Bearer tok2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"production": [{"wNow": 900}]})),
        )
        .mount(&server)
        .await;

    coordinator.first_refresh().await.unwrap();
    let rejected = coordinator.refresh().await;
    assert!(
        matches!(rejected, Err(Error::ApiError { status: 401, .. })),
        "expected ApiError, got: {:?}",
        rejected
    );

    let snapshot = coordinator.refresh().await.unwrap();

    assert_eq!(900.0, snapshot.current_power);
    assert!(coordinator.last_update_success());
    assert_eq!(AuthState::Validated, coordinator.session_summary().await.state);
}

#[tokio::test]
async fn test_first_refresh_login_failure() {
    let (server, coordinator) = start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = coordinator.first_refresh().await;

    assert!(matches!(result, Err(Error::LoginError(_))));
    assert!(!coordinator.last_update_success());
    assert_eq!(None, coordinator.data());
    assert_eq!(
        AuthState::Unauthenticated,
        coordinator.session_summary().await.state
    );
}

#[tokio::test]
async fn test_minimum_interval() {
    let server = MockServer::start().await;
    let coordinator = Coordinator::new(session_for(&server), Duration::from_secs(0));
    assert_eq!(Duration::from_secs(1), coordinator.interval());
}

#[tokio::test]
async fn test_shutdown_closes_session() {
    let (server, coordinator) = start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/production.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"production": []})))
        .mount(&server)
        .await;

    coordinator.first_refresh().await.unwrap();
    coordinator.shutdown().await;
    coordinator.shutdown().await;

    assert!(!coordinator.session_summary().await.connected);
}

// ── Switch ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_switch_without_data() {
    let (_server, coordinator) = start().await;
    let switch = ProductionSwitch::new(coordinator);

    assert_eq!(DEFAULT_NAME, switch.name());
    assert!(!switch.is_on());
    assert!(!switch.available());
    assert_eq!(
        SwitchAttributes {
            current_power: 0.0,
            is_producing: false
        },
        switch.attributes()
    );
}

#[tokio::test]
async fn test_switch_turn_off_refreshes() {
    let (server, coordinator) = start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/production.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"production": [{"wNow": 0}]})),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(POWER_PATH))
        .and(body_json(json!({"length": 1, "arr": [1]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    coordinator.first_refresh().await.unwrap();
    let switch = ProductionSwitch::new(Arc::clone(&coordinator));
    switch.turn_off().await.unwrap();

    assert!(switch.available());
    // the Envoy does not report whether production is enabled
    assert!(switch.is_on());
    assert_eq!(
        SwitchAttributes {
            current_power: 0.0,
            is_producing: false
        },
        switch.attributes()
    );
}

#[tokio::test]
async fn test_switch_turn_on_failure_propagates() {
    let (server, coordinator) = start().await;
    mount_login(&server).await;
    Mock::given(method("PUT"))
        .and(path(POWER_PATH))
        .and(body_json(json!({"length": 1, "arr": [0]})))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/production.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let switch = ProductionSwitch::new(coordinator);
    let result = switch.turn_on().await;

    assert!(matches!(result, Err(Error::ApiError { status: 500, .. })));
}

// ── Configuration validation ────────────────────────────────────────

#[tokio::test]
async fn test_validate_input() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let title = setup::validate_input(session_for(&server)).await.unwrap();

    assert_eq!("Enphase Envoy (192.0.2.1)", title);
}

#[tokio::test]
async fn test_validate_input_cannot_connect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let error = setup::validate_input(session_for(&server))
        .await
        .unwrap_err();

    assert_eq!(HOST, error.host);
    assert!(matches!(error.source, Error::LoginError(_)));
    assert_eq!("cannot connect to Envoy at 192.0.2.1", error.to_string());
}
