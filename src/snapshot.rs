use bytes::Bytes;
use reqwest::Client;
use url::Url;

use crate::error::AgentError;

/// Fetches one JPEG frame from the camera. The full image is buffered in
/// memory; writing it to disk is the recorder's job.
pub async fn fetch_image(client: &Client, url: &Url) -> Result<Bytes, AgentError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| AgentError::Network {
            context: "camera",
            message: e.to_string(),
        })?;
    if !response.status().is_success() {
        return Err(AgentError::Network {
            context: "camera",
            message: format!("HTTP status {}", response.status()),
        });
    }
    response.bytes().await.map_err(|e| AgentError::Network {
        context: "camera",
        message: format!("failed reading image body: {e}"),
    })
}
