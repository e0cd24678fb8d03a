use std::time::Duration;

use chrono::Local;
use log::{error, info};
use sqlx::{Connection, PgConnection};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{error::AgentError, event::PlateRecord};

const CONNECT_RETRY: Duration = Duration::from_secs(5);
const CREATED_BY: &str = "rpr";

/// Direct-database backend. Database unavailability is treated as
/// recoverable: the connect loop retries indefinitely, so a permanently
/// unreachable database stalls the lane rather than dropping events on
/// the floor. A failed insert on a live connection is not retried.
pub struct DatabaseSink {
    url: String,
    cancel: CancellationToken,
}

impl DatabaseSink {
    pub fn new(url: String, cancel: CancellationToken) -> DatabaseSink {
        DatabaseSink { url, cancel }
    }

    async fn connect(&self) -> Result<PgConnection, AgentError> {
        loop {
            match PgConnection::connect(&self.url).await {
                Ok(conn) => {
                    info!("connected to plate database");
                    return Ok(conn);
                }
                Err(e) => {
                    error!(
                        "database connection failed, retrying in {}s: {e}",
                        CONNECT_RETRY.as_secs()
                    );
                }
            }
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(AgentError::Persistence(
                        "shutdown requested during database connect".to_string(),
                    ));
                }
                _ = tokio::time::sleep(CONNECT_RETRY) => {}
            }
        }
    }

    pub async fn record(&self, record: &PlateRecord) -> Result<(), AgentError> {
        let mut conn = self.connect().await?;
        let now = Local::now();
        let result = sqlx::query(
            r#"
            INSERT INTO placas (
                "Id", "CreateTime", "UpdateTime", "CreatedBy", "UpdatedBy",
                "IdParqueaderoHorus", "Placa", "DireccionMAC", "FechaSnapshot",
                "RutaSnapshot", "Category", "Heading", "Make", "Model", "UnicodeText"
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(CREATED_BY)
        .bind(CREATED_BY)
        .bind(&record.id_parqueadero_horus)
        .bind(&record.placa)
        .bind(&record.direccion_mac)
        .bind(record.fecha_snapshot)
        .bind(&record.ruta_snapshot)
        .bind(&record.category)
        .bind(&record.heading)
        .bind(&record.make)
        .bind(&record.model)
        .bind(&record.unicode_text)
        .execute(&mut conn)
        .await;
        let _ = conn.close().await;
        result.map_err(|e| AgentError::Persistence(format!("insert failed: {e}")))?;
        Ok(())
    }
}
