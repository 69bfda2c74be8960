//! Client for a screen-parsing HTTP service.
//!
//! Posts the frame as base64 PNG and reads back `parsed_content_list`,
//! one entry per detected element with a normalised `bbox`.

use std::io::Cursor;
use std::time::Instant;

use async_trait::async_trait;
use base64::Engine as _;
use image::RgbaImage;
use serde::Deserialize;

use crate::errors::{PilotError, PilotResult};
use crate::perception::traits::ControlDetector;
use crate::perception::types::{ControlKind, DetectedControl};

pub struct RemoteDetector {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parsed_content_list: Vec<ParsedElement>,
    #[serde(default)]
    latency: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ParsedElement {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    bbox: [f64; 4],
}

impl RemoteDetector {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }
}

fn encode_png_base64(frame: &RgbaImage) -> PilotResult<String> {
    let mut png = Vec::new();
    frame
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| PilotError::Detection(format!("PNG encode: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&png))
}

fn parse_response(body: &str) -> PilotResult<Vec<DetectedControl>> {
    let parsed: ParseResponse = serde_json::from_str(body)
        .map_err(|e| PilotError::Detection(format!("unexpected parser response: {e}")))?;
    if let Some(latency) = parsed.latency {
        tracing::trace!(latency, "parser-reported latency");
    }
    Ok(parsed
        .parsed_content_list
        .into_iter()
        .map(|el| DetectedControl {
            kind: ControlKind::from_label(&el.kind),
            content: el.content.unwrap_or_default().trim().to_string(),
            bbox: el.bbox.map(|v| v.clamp(0.0, 1.0)),
        })
        .collect())
}

#[async_trait(?Send)]
impl ControlDetector for RemoteDetector {
    async fn detect(&mut self, frame: &RgbaImage) -> PilotResult<Vec<DetectedControl>> {
        let started = Instant::now();
        let body = serde_json::json!({ "base64_image": encode_png_base64(frame)? });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| PilotError::Detection(format!("parser request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PilotError::Detection(format!("{status}: {err_body}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| PilotError::Detection(format!("parser body: {e}")))?;
        let controls = parse_response(&text)?;
        tracing::debug!(
            count = controls.len(),
            ms = started.elapsed().as_millis() as u64,
            "remote detection complete"
        );
        Ok(controls)
    }
}
