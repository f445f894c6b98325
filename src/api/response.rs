use serde::{Deserialize, Serialize};
use serde_json::Value;

/* GET /info.xml */
#[derive(Debug, Deserialize)]
pub struct EnvoyInfo {
    pub device: InfoDevice,
}

#[derive(Debug, Deserialize)]
pub struct InfoDevice {
    pub sn: String,
    pub pn: Option<String>,
    pub software: Option<String>,
}

impl EnvoyInfo {
    pub fn from_xml(xml: &str) -> Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(xml)
    }

    /// Serial number, if it is the expected string of digits.
    pub fn serial_number(&self) -> Option<&str> {
        let sn = self.device.sn.trim();
        if !sn.is_empty() && sn.chars().all(|c| c.is_ascii_digit()) {
            Some(sn)
        } else {
            None
        }
    }
}

/* POST /oauth/token */
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub token: Option<String>,
}

impl TokenResponse {
    /// `access_token`, falling back to `token`. Empty strings count as missing.
    pub fn into_token(self) -> Option<String> {
        let TokenResponse {
            access_token,
            token,
        } = self;
        access_token
            .filter(|t| !t.is_empty())
            .or_else(|| token.filter(|t| !t.is_empty()))
    }
}

/* PUT /ivp/mod/{id}/mode/power */
#[derive(Debug, PartialEq, Serialize)]
pub struct PowerMode {
    pub length: u8,
    pub arr: [u8; 1],
}

impl PowerMode {
    /// The device expects the "forced off" flag, the inverse of `enabled`.
    pub fn new(enabled: bool) -> Self {
        let forced_off = if enabled { 0 } else { 1 };
        PowerMode {
            length: 1,
            arr: [forced_off],
        }
    }
}

/* GET /production.json */

/// `production[0].wNow`, 0 when any part is missing. Negative readings are clamped to 0.
pub fn current_power(value: &Value) -> f64 {
    value
        .get("production")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("wNow"))
        .and_then(Value::as_f64)
        .map(|w| w.max(0.0))
        .unwrap_or(0.0)
}

/// Text accepted from the token check endpoint, depending on firmware.
pub fn is_valid_token_response(body: &str) -> bool {
    body.contains("Valid token") || body.contains("<!DOCTYPE html>")
}
