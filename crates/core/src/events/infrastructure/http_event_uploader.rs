use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;

use crate::events::domain::detection_event::DetectionEvent;
use crate::events::domain::event_uploader::{EventUploader, UploadError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts each event as a multipart form with `file`, `name`,
/// `classification` and `timestamp` fields.
pub struct HttpEventUploader {
    client: Client,
    url: String,
}

impl HttpEventUploader {
    pub fn new(url: impl Into<String>) -> Result<Self, UploadError> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn form(image_path: &Path, event: &DetectionEvent) -> Result<Form, UploadError> {
        let bytes = fs::read(image_path)?;
        let file_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| event.file_name());
        let file = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        Ok(Form::new()
            .part("file", file)
            .text("name", event.label.clone())
            .text("classification", event.classification.as_str())
            .text("timestamp", event.upload_timestamp()))
    }
}

impl EventUploader for HttpEventUploader {
    fn upload(&self, image_path: &Path, event: &DetectionEvent) -> Result<(), UploadError> {
        let form = Self::form(image_path, event)?;
        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        log::info!("Frame sent: {}, {}", status.as_u16(), body);
        Ok(())
    }
}
