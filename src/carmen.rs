use bytes::Bytes;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::{Deserialize, Serialize};

use crate::{config::CarmenConfig, error::AgentError};

/// Plate text used when the vendor finds no usable plate.
pub const NO_PLATE: &str = "SIN_MATRICULA";
/// Vendor artifact produced by frames of the closed gate. Treated like
/// "no plate" for persistence.
pub const CLOSED_GATE: &str = "CERRADA";

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct CarmenResponse {
    #[serde(default)]
    pub data: CarmenData,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct CarmenData {
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    #[serde(default)]
    pub plate: Option<Plate>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub unicode_text: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Plate {
    #[serde(default)]
    pub found: bool,
    #[serde(default)]
    pub separated_text: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VehicleAttributes {
    pub category: Option<String>,
    pub heading: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub unicode_text: Option<String>,
}

/// Normalized recognition result. Attributes are present only when the
/// vendor matched a vehicle with a found plate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlateReading {
    pub plate_text: String,
    pub attributes: Option<VehicleAttributes>,
}

impl PlateReading {
    pub fn no_plate() -> PlateReading {
        PlateReading {
            plate_text: NO_PLATE.to_string(),
            attributes: None,
        }
    }

    /// Single-lane assumption: only the first vehicle in the response is
    /// considered.
    pub fn from_response(response: &CarmenResponse) -> PlateReading {
        let Some(vehicle) = response.data.vehicles.first() else {
            return PlateReading::no_plate();
        };
        let Some(plate) = &vehicle.plate else {
            return PlateReading::no_plate();
        };
        if !plate.found {
            return PlateReading::no_plate();
        }
        let Some(text) = &plate.separated_text else {
            return PlateReading::no_plate();
        };
        PlateReading {
            plate_text: text.clone(),
            attributes: Some(VehicleAttributes {
                category: vehicle.category.clone(),
                heading: vehicle.heading.clone(),
                make: vehicle.make.clone(),
                model: vehicle.model.clone(),
                unicode_text: vehicle.unicode_text.clone(),
            }),
        }
    }

    /// Plates in the excluded sentinel set are never sent to the durable
    /// sink.
    pub fn is_excluded(&self) -> bool {
        self.plate_text == NO_PLATE || self.plate_text == CLOSED_GATE
    }
}

pub struct CarmenClient {
    client: Client,
    config: CarmenConfig,
}

impl CarmenClient {
    pub fn new(client: Client, config: CarmenConfig) -> CarmenClient {
        CarmenClient { client, config }
    }

    /// Submits the JPEG to the vendor and normalizes the response. Any
    /// vendor failure aborts the current cycle; nothing is persisted.
    pub async fn recognize(&self, image: Bytes) -> Result<PlateReading, AgentError> {
        let part = Part::bytes(image.to_vec())
            .file_name("snapshot.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| AgentError::Recognition(e.to_string()))?;
        let form = Form::new().part("image", part);
        let response = self
            .client
            .post(self.config.url.clone())
            .header("X-Api-Key", &self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AgentError::Recognition(format!("carmen request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AgentError::Recognition(format!(
                "carmen HTTP status {}",
                response.status()
            )));
        }
        let parsed: CarmenResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Recognition(format!("carmen response parse failed: {e}")))?;
        Ok(PlateReading::from_response(&parsed))
    }
}
