use crate::api;
use crate::coordinator::Coordinator;
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_NAME: &str = "Enphase Production";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchAttributes {
    pub current_power: f64,
    pub is_producing: bool,
}

/// On/off control for production, backed by the coordinator's snapshot.
pub struct ProductionSwitch {
    coordinator: Arc<Coordinator>,
    name: String,
}

impl ProductionSwitch {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        ProductionSwitch {
            coordinator,
            name: DEFAULT_NAME.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_on(&self) -> bool {
        self.coordinator
            .data()
            .map(|d| d.production_enabled)
            .unwrap_or(false)
    }

    pub fn available(&self) -> bool {
        self.coordinator.last_update_success()
    }

    pub fn attributes(&self) -> SwitchAttributes {
        match self.coordinator.data() {
            Some(data) => SwitchAttributes {
                current_power: data.current_power,
                is_producing: data.is_producing,
            },
            None => SwitchAttributes {
                current_power: 0.0,
                is_producing: false,
            },
        }
    }

    pub async fn turn_on(&self) -> Result<(), api::Error> {
        self.set(true).await
    }

    pub async fn turn_off(&self) -> Result<(), api::Error> {
        self.set(false).await
    }

    async fn set(&self, enabled: bool) -> Result<(), api::Error> {
        let action = if enabled { "ON" } else { "OFF" };
        log::info!("Turning {} production", action);

        if let Err(e) = self.coordinator.set_production_power(enabled).await {
            log::error!("Failed to turn {} production: {}", action, e);
            return Err(e);
        }

        self.coordinator.request_refresh().await;
        Ok(())
    }
}
