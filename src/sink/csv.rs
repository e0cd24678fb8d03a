use std::path::{Path, PathBuf};

use log::info;
use tokio::io::AsyncWriteExt;

use crate::{error::AgentError, event::PlateRecord};

pub const CSV_FILE_NAME: &str = "logs.csv";
const CSV_HEADER: &str =
    "Matricula,RutaGuardada,FechaEntrada,MAC,Parqueadero,Category,Heading,Make,Model,UnicodeText";

/// Local CSV sink, one row per recorded event, header written when the
/// file is created.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(snapshot_dir: &Path) -> CsvSink {
        CsvSink {
            path: snapshot_dir.join(CSV_FILE_NAME),
        }
    }

    pub async fn record(&self, record: &PlateRecord) -> Result<(), AgentError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        // the opened handle decides whether a header is needed; a pre-open
        // existence probe can race with file rotation
        let new_file = file.metadata().await?.len() == 0;
        let mut out = String::new();
        if new_file {
            out.push_str(CSV_HEADER);
            out.push('\n');
        }
        out.push_str(&format_row(record));
        out.push('\n');
        file.write_all(out.as_bytes()).await?;
        file.flush().await?;
        info!("plate '{}' logged to {}", record.placa, self.path.display());
        Ok(())
    }
}

fn format_row(record: &PlateRecord) -> String {
    [
        escape_field(&record.placa),
        escape_field(&record.ruta_snapshot),
        record.fecha_snapshot.format("%d/%m/%Y %H:%M:%S").to_string(),
        escape_field(&record.direccion_mac),
        escape_field(&record.id_parqueadero_horus),
        escape_field(record.category.as_deref().unwrap_or_default()),
        escape_field(record.heading.as_deref().unwrap_or_default()),
        escape_field(record.make.as_deref().unwrap_or_default()),
        escape_field(record.model.as_deref().unwrap_or_default()),
        escape_field(record.unicode_text.as_deref().unwrap_or_default()),
    ]
    .join(",")
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
