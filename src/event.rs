use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::carmen::PlateReading;

/// Value recorded when the lane's MAC address has no entry in the
/// location map. A miss never aborts the cycle.
pub const LOCATION_NOT_FOUND: &str = "Ubicacion no encontrada";

/// One unit of work, built fresh each cycle the trigger fires and dropped
/// when the cycle ends.
pub struct CaptureEvent {
    pub lane: String,
    pub mac_address: String,
    pub captured_at: DateTime<Local>,
    pub reading: PlateReading,
    pub image: Bytes,
}

impl CaptureEvent {
    /// `{plateText}_{yyyyMMdd_HHmmss}.jpg` — unique per event since the
    /// loop processes at most one event per second-granularity cycle.
    pub fn snapshot_file_name(&self) -> String {
        format!(
            "{}_{}.jpg",
            self.reading.plate_text,
            self.captured_at.format("%Y%m%d_%H%M%S")
        )
    }

    pub fn saved_image_path(&self, snapshot_dir: &Path) -> PathBuf {
        snapshot_dir.join(self.snapshot_file_name())
    }

    pub fn to_record(
        &self,
        locations: &IndexMap<String, String>,
        saved_path: &Path,
    ) -> PlateRecord {
        let location = locations
            .get(&self.mac_address)
            .cloned()
            .unwrap_or_else(|| LOCATION_NOT_FOUND.to_string());
        let attributes = self.reading.attributes.clone().unwrap_or_default();
        PlateRecord {
            placa: self.reading.plate_text.clone(),
            direccion_mac: self.mac_address.clone(),
            id_parqueadero_horus: location,
            fecha_snapshot: self.captured_at,
            ruta_snapshot: saved_path.to_string_lossy().into_owned(),
            category: attributes.category,
            heading: attributes.heading,
            make: attributes.make,
            model: attributes.model,
            unicode_text: attributes.unicode_text,
        }
    }
}

/// The durable-sink shape. Field names on the wire are owned by the Horus
/// backend and stay as-is.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PlateRecord {
    #[serde(rename = "Placa")]
    pub placa: String,
    #[serde(rename = "DireccionMAC")]
    pub direccion_mac: String,
    #[serde(rename = "IdParqueaderoHorus")]
    pub id_parqueadero_horus: String,
    #[serde(rename = "FechaSnapshot")]
    pub fecha_snapshot: DateTime<Local>,
    #[serde(rename = "RutaSnapshot")]
    pub ruta_snapshot: String,
    #[serde(rename = "Category")]
    pub category: Option<String>,
    #[serde(rename = "Heading")]
    pub heading: Option<String>,
    #[serde(rename = "Make")]
    pub make: Option<String>,
    #[serde(rename = "Model")]
    pub model: Option<String>,
    #[serde(rename = "UnicodeText")]
    pub unicode_text: Option<String>,
}
