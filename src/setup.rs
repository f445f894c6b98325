use crate::api;
use crate::model::Session;

/// Any failure while checking a new configuration.
#[derive(Debug, thiserror::Error)]
#[error("cannot connect to Envoy at {host}")]
pub struct CannotConnect {
    pub host: String,
    #[source]
    pub source: api::Error,
}

/// Authenticate once with a fresh session to prove the configuration works.
///
/// Returns the entry title. The session is closed whatever the outcome.
pub async fn validate_input(mut session: Session) -> Result<String, CannotConnect> {
    log::debug!("Validating configuration for {}", session.host);
    let result = api::authenticate(&mut session).await;
    api::close(&mut session);

    match result {
        Ok(()) => {
            log::info!("Successfully authenticated with Envoy at {}", session.host);
            Ok(format!("Enphase Envoy ({})", session.host))
        }
        Err(source) => {
            log::error!(
                "Failed to authenticate with Envoy at {}: {}",
                session.host,
                source
            );
            Err(CannotConnect {
                host: session.host,
                source,
            })
        }
    }
}
