pub mod endpoint;
pub mod error;
pub mod jwt;
pub mod pkce;
pub mod response;

use crate::model::{self, AuthState};
pub use error::{Error, ErrorKind};
use http::StatusCode;
use pkce::AuthorizationMaterial;
use reqwest::{Response, Url};
use response::{current_power, is_valid_token_response, EnvoyInfo, PowerMode, TokenResponse};
use serde_json::Value;

const EXCERPT_LEN: usize = 200;
const CLIENT: &str = "envoy-ui";
const CLIENT_ID: &str = "envoy-ui-client";
const CONTROL_SUCCESS: [StatusCode; 3] =
    [StatusCode::OK, StatusCode::CREATED, StatusCode::NO_CONTENT];

pub fn session(host: String, username: String, password: String) -> model::Session {
    model::Session::new(host, username, password)
}

/// Map transport-level failures (DNS, refused connection, timeout, TLS) to Error
fn map_transport_err(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::Timeout(error.to_string())
    } else {
        Error::Connection(error.to_string())
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_LEN).collect()
}

/// First characters of a secret, safe to log.
fn prefix(secret: &str) -> String {
    secret.chars().take(8).collect()
}

fn log_body(session: &model::Session, path: &endpoint::Endpoint, status: StatusCode, text: &str) {
    if session.options.debug_responses {
        log::debug!("{} responded {}: {}", path, status, excerpt(text));
    } else {
        log::trace!("{} responded {}", path, status);
    }
}

/// Returns the session's HTTP client, building it on first use. The device
/// serves a self-signed certificate and the login step must observe the
/// redirect itself, hence no certificate checks and no redirect following.
fn ensure_client(session: &mut model::Session) -> Result<reqwest::Client, Error> {
    if let Some(client) = &session.client {
        return Ok(client.clone());
    }

    log::debug!("Creating HTTP client for {}", session.host);
    let client = reqwest::ClientBuilder::new()
        .cookie_store(true)
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| Error::InternalError(e.to_string()))?;
    session.client = Some(client.clone());
    Ok(client)
}

async fn read_text(response: Response) -> Result<(StatusCode, String), Error> {
    let status = response.status();
    response
        .text()
        .await
        .map_err(map_transport_err)
        .map(|text| (status, text))
}

async fn fetch_device_info(
    session: &model::Session,
    client: &reqwest::Client,
) -> Result<model::DeviceInfo, Error> {
    let url = format!("{}{}", session.endpoints.info_url, endpoint::INFO);
    log::debug!("GET {}", url);

    let response = client.get(url).send().await.map_err(map_transport_err)?;
    let (status, text) = read_text(response).await?;
    log_body(session, endpoint::INFO, status, &text);

    if status != StatusCode::OK {
        return Err(Error::ApiError {
            status: status.as_u16(),
            excerpt: excerpt(&text),
        });
    }

    let info = EnvoyInfo::from_xml(&text).map_err(|e| {
        log::error!("Unable to parse {}: {}", endpoint::INFO, e);
        Error::SerialNumberNotFound
    })?;

    let serial_number = info
        .serial_number()
        .ok_or(Error::SerialNumberNotFound)?
        .to_string();

    Ok(model::DeviceInfo {
        serial_number,
        part_number: info.device.pn,
        software: info.device.software,
    })
}

/// Read the unauthenticated device info document.
pub async fn device_info(session: &mut model::Session) -> Result<model::DeviceInfo, Error> {
    let client = ensure_client(session)?;
    fetch_device_info(session, &client).await
}

/// Extract `code` from the query of a redirect `Location`.
fn authorization_code(response: &Response) -> Result<String, Error> {
    let location = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(Error::MissingAuthorizationCode)?;
    log::debug!("Redirect location: {}", location);

    let url = Url::parse(location)
        .or_else(|_| Url::parse("https://localhost/").and_then(|base| base.join(location)))
        .map_err(|_| Error::MissingAuthorizationCode)?;

    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
        .ok_or(Error::MissingAuthorizationCode)
}

async fn request_authorization_code(
    session: &model::Session,
    client: &reqwest::Client,
    material: &AuthorizationMaterial,
    redirect_uri: &str,
    serial_number: &str,
) -> Result<String, Error> {
    let url = format!("{}{}", session.endpoints.cloud_url, endpoint::LOGIN);
    log::debug!("Authenticating with Enphase cloud at {}", url);

    let form = [
        ("username", session.username.as_str()),
        ("password", session.password.as_str()),
        ("codeChallenge", material.code_challenge.as_str()),
        ("redirectUri", redirect_uri),
        ("client", CLIENT),
        ("clientId", CLIENT_ID),
        ("authFlow", "oauth"),
        ("serialNum", serial_number),
        ("granttype", "authorize"),
        ("state", ""),
        ("invalidSerialNum", ""),
    ];

    let response = client
        .post(url)
        .form(&form)
        .timeout(session.options.login_timeout)
        .send()
        .await
        .map_err(map_transport_err)?;

    let status = response.status();
    if status != StatusCode::FOUND {
        let (_, text) = read_text(response).await?;
        log_body(session, endpoint::LOGIN, status, &text);
        return Err(Error::LoginError(format!(
            "expected redirect, server responded {}",
            status
        )));
    }

    let code = authorization_code(&response)?;
    log::info!("Received authorization code {}...", prefix(&code));
    Ok(code)
}

async fn exchange_code(
    session: &model::Session,
    client: &reqwest::Client,
    material: &AuthorizationMaterial,
    code: &str,
    redirect_uri: &str,
    serial_number: &str,
) -> Result<String, Error> {
    let url = format!("{}{}", session.endpoints.cloud_url, endpoint::TOKEN);
    log::debug!("Exchanging authorization code at {}", url);

    let form = [
        ("client_id", CLIENT_ID),
        ("code", code),
        ("code_verifier", material.code_verifier.as_str()),
        ("grant_type", "authorization_code"),
        ("redirect_uri", redirect_uri),
        ("serial_number", serial_number),
    ];

    let response = client
        .post(url)
        .form(&form)
        .header(reqwest::header::ACCEPT, "application/json")
        .timeout(session.options.token_timeout)
        .send()
        .await
        .map_err(map_transport_err)?;
    let (status, text) = read_text(response).await?;
    log_body(session, endpoint::TOKEN, status, &text);

    if status != StatusCode::OK {
        return Err(Error::TokenExchange {
            status: status.as_u16(),
            excerpt: excerpt(&text),
        });
    }

    serde_json::from_str::<TokenResponse>(&text)
        .map_err(|e| Error::InvalidResponse(excerpt(&text), e.to_string()))?
        .into_token()
        .ok_or(Error::MissingToken)
}

async fn validate_token(
    session: &model::Session,
    client: &reqwest::Client,
    token: &str,
) -> Result<(), Error> {
    let url = format!("{}{}", session.endpoints.device_url, endpoint::CHECK_JWT);
    log::debug!("Validating token with Envoy at {}", url);

    let response = client
        .post(url)
        .bearer_auth(token)
        .header(reqwest::header::ACCEPT, "*/*")
        .timeout(session.options.validation_timeout)
        .send()
        .await
        .map_err(map_transport_err)?;
    let (status, text) = read_text(response).await?;
    log_body(session, endpoint::CHECK_JWT, status, &text);

    if status == StatusCode::OK && is_valid_token_response(&text) {
        Ok(())
    } else {
        Err(Error::TokenRejected {
            status: status.as_u16(),
            excerpt: excerpt(&text),
        })
    }
}

async fn login(session: &mut model::Session, client: &reqwest::Client) -> Result<String, Error> {
    let serial_number = match &session.serial_number {
        Some(serial_number) => serial_number.to_owned(),
        None => {
            log::debug!("Serial number not configured, reading it from the Envoy");
            let info = fetch_device_info(session, client).await?;
            log::debug!("Retrieved serial number {}", info.serial_number);
            session.serial_number = Some(info.serial_number.clone());
            info.serial_number
        }
    };

    let material = AuthorizationMaterial::generate();
    let redirect_uri = format!("https://{}{}", session.host, endpoint::AUTH_CALLBACK);

    session.state = AuthState::AwaitingCode;
    let code =
        request_authorization_code(session, client, &material, &redirect_uri, &serial_number)
            .await?;

    session.state = AuthState::AwaitingToken;
    let token = exchange_code(
        session,
        client,
        &material,
        &code,
        &redirect_uri,
        &serial_number,
    )
    .await?;
    log::debug!("Obtained token {}...", prefix(&token));

    validate_token(session, client, &token).await?;
    Ok(token)
}

/// Run the full login sequence and cache the resulting bearer token.
///
/// Cloud login yields an authorization code, the code is exchanged for a token,
/// and the token is checked against the Envoy itself. Resolves the serial number
/// from the device first when the session has none. On failure the cached token
/// is dropped and the session is back to `Unauthenticated`.
pub async fn authenticate(session: &mut model::Session) -> Result<(), Error> {
    log::debug!("Starting authentication for {}", session.host);
    let client = ensure_client(session)?;

    match login(session, &client).await {
        Ok(token) => {
            session.token = Some(token);
            session.state = AuthState::Validated;
            log::info!("Authenticated with Envoy at {}", session.host);
            Ok(())
        }
        Err(e) => {
            session.token = None;
            session.state = AuthState::Unauthenticated;
            log::error!("Authentication with {} failed: {}", session.host, e);
            Err(e)
        }
    }
}

/// Client and token for an authenticated call, logging in first if no token is cached.
async fn authorized(session: &mut model::Session) -> Result<(reqwest::Client, String), Error> {
    if session.token.is_none() {
        log::debug!("No token cached, authenticating first");
        authenticate(session).await?;
    }

    let client = ensure_client(session)?;
    let token = session.token.clone().ok_or(Error::MissingToken)?;
    Ok((client, token))
}

/// Read current production from the Envoy.
pub async fn get_production_status(
    session: &mut model::Session,
) -> Result<model::ProductionSnapshot, Error> {
    let (client, token) = authorized(session).await?;
    let url = format!("{}{}", session.endpoints.device_url, endpoint::PRODUCTION);
    log::debug!("GET {}", url);

    let response = client
        .get(url)
        .bearer_auth(&token)
        .send()
        .await
        .map_err(map_transport_err)?;
    let (status, text) = read_text(response).await?;
    log_body(session, endpoint::PRODUCTION, status, &text);

    if status != StatusCode::OK {
        log::error!("Failed to get production status, status: {}", status);
        return Err(Error::ApiError {
            status: status.as_u16(),
            excerpt: excerpt(&text),
        });
    }

    let value = serde_json::from_str::<Value>(&text)
        .map_err(|e| Error::InvalidResponse(excerpt(&text), e.to_string()))?;
    let snapshot = model::ProductionSnapshot::from_power(current_power(&value));

    log::info!(
        "Production status: {} W, producing: {}",
        snapshot.current_power,
        snapshot.is_producing
    );
    Ok(snapshot)
}

/// Enable or disable production.
pub async fn set_production_power(
    session: &mut model::Session,
    enabled: bool,
) -> Result<(), Error> {
    log::info!(
        "Setting production power to {}",
        if enabled { "enabled" } else { "disabled" }
    );

    let (client, token) = authorized(session).await?;
    let path = endpoint::power_mode(session.options.power_device_id);
    let url = format!("{}{}", session.endpoints.device_url, path);
    let payload = PowerMode::new(enabled);
    log::debug!("PUT {} {:?}", url, payload);

    let response = client
        .put(url)
        .bearer_auth(&token)
        .json(&payload)
        .send()
        .await
        .map_err(map_transport_err)?;
    let (status, text) = read_text(response).await?;
    log_body(session, &path, status, &text);

    if CONTROL_SUCCESS.contains(&status) {
        return Ok(());
    }

    log::error!("Failed to set production power, status: {}", status);
    Err(Error::ApiError {
        status: status.as_u16(),
        excerpt: excerpt(&text),
    })
}

/// Drop the HTTP client. Safe to call repeatedly.
pub fn close(session: &mut model::Session) {
    match session.client.take() {
        Some(_) => log::debug!("Closed HTTP client for {}", session.host),
        None => log::debug!("No HTTP client to close for {}", session.host),
    }
}
