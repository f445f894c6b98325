pub type Endpoint = str;

pub const DEFAULT_CLOUD_URL: &str = "https://entrez.enphaseenergy.com";
/// EMU device id used by the power mode endpoint. Assumed constant across models.
pub const DEFAULT_POWER_DEVICE_ID: u64 = 603980032;

/* Enphase cloud */
pub const LOGIN: &Endpoint = "/login";
pub const TOKEN: &Endpoint = "/oauth/token";

/* Envoy */
pub const INFO: &Endpoint = "/info.xml";
pub const AUTH_CALLBACK: &Endpoint = "/auth/callback";
pub const CHECK_JWT: &Endpoint = "/auth/check_jwt";
pub const PRODUCTION: &Endpoint = "/production.json";

pub fn power_mode(device_id: u64) -> String {
    format!("/ivp/mod/{}/mode/power", device_id)
}
