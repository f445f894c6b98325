use crate::api::endpoint;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

type Watts = f64;

/// Base URLs the client talks to. Derived from the device host by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Enphase cloud (login and token exchange)
    pub cloud_url: String,
    /// Device over HTTPS (token check, telemetry, control)
    pub device_url: String,
    /// Device over plain HTTP (unauthenticated info document)
    pub info_url: String,
}

impl Endpoints {
    pub fn for_host(host: &str) -> Self {
        Endpoints {
            cloud_url: endpoint::DEFAULT_CLOUD_URL.to_string(),
            device_url: format!("https://{}", host),
            info_url: format!("http://{}", host),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Log excerpts of every response body at debug level.
    pub debug_responses: bool,
    /// Device id embedded in the power mode endpoint.
    pub power_device_id: u64,
    pub login_timeout: Duration,
    pub token_timeout: Duration,
    pub validation_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            debug_responses: false,
            power_device_id: endpoint::DEFAULT_POWER_DEVICE_ID,
            login_timeout: Duration::from_secs(30),
            token_timeout: Duration::from_secs(300),
            validation_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    /// Login form submitted, waiting for the redirect carrying the code
    AwaitingCode,
    /// Code received, exchanging it and validating the resulting token
    AwaitingToken,
    Validated,
}

/// Connection state for a single Envoy.
///
/// Owns the HTTP client (created on first use, dropped by `api::close`) and the
/// bearer token obtained by `api::authenticate`. Not meant to be shared between
/// concurrent callers; wrap it in a lock if it has to be.
pub struct Session {
    pub host: String,
    pub username: String,
    pub password: String,
    pub serial_number: Option<String>,
    pub endpoints: Endpoints,
    pub options: ClientOptions,
    pub(crate) token: Option<String>,
    pub(crate) client: Option<reqwest::Client>,
    pub(crate) state: AuthState,
}

impl Session {
    pub fn new(host: String, username: String, password: String) -> Self {
        let endpoints = Endpoints::for_host(&host);
        Session {
            host,
            username,
            password,
            serial_number: None,
            endpoints,
            options: ClientOptions::default(),
            token: None,
            client: None,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn with_serial_number(mut self, serial_number: Option<String>) -> Self {
        self.serial_number = serial_number;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Whether the HTTP client is currently open.
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("serial_number", &self.serial_number)
            .field("endpoints", &self.endpoints)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("connected", &self.client.is_some())
            .field("state", &self.state)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub part_number: Option<String>,
    pub software: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProductionSnapshot {
    pub is_producing: bool,
    pub current_power: Watts,
    /// The device does not report this; always `true`.
    pub production_enabled: bool,
}

impl ProductionSnapshot {
    pub fn from_power(current_power: Watts) -> Self {
        ProductionSnapshot {
            is_producing: current_power > 0.0,
            current_power,
            production_enabled: true,
        }
    }
}
