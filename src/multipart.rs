//! Multipart upload support (SPEC_FULL §4.5): fields map + files map,
//! re-materialized from source on every retry attempt so a consumed file
//! handle never leaks into a second attempt (spec §4.8).

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Where one file part's bytes come from. Re-read from `source` every
/// time [`MultipartBody::to_form`] is called, so retries never reuse an
/// already-consumed stream.
#[derive(Debug, Clone)]
pub enum MultipartSource {
    Bytes {
        filename: String,
        content_type: Option<String>,
        data: Vec<u8>,
    },
    Path {
        path: PathBuf,
        filename: Option<String>,
        content_type: Option<String>,
    },
}

impl MultipartSource {
    pub fn from_bytes(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self::Bytes { filename: filename.into(), content_type: None, data }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path { path: path.into(), filename: None, content_type: None }
    }

    async fn to_part(&self) -> Result<reqwest::multipart::Part> {
        match self {
            MultipartSource::Bytes { filename, content_type, data } => {
                let mut part = reqwest::multipart::Part::bytes(data.clone()).file_name(filename.clone());
                if let Some(ct) = content_type {
                    part = part
                        .mime_str(ct)
                        .map_err(|e| Error::ConfigurationError(format!("invalid multipart content-type '{ct}': {e}")))?;
                }
                Ok(part)
            }
            MultipartSource::Path { path, filename, content_type } => {
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|e| Error::ConfigurationError(format!("reading multipart file '{}': {e}", path.display())))?;
                let name = filename.clone().unwrap_or_else(|| {
                    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
                });
                let mut part = reqwest::multipart::Part::bytes(data).file_name(name);
                if let Some(ct) = content_type {
                    part = part
                        .mime_str(ct)
                        .map_err(|e| Error::ConfigurationError(format!("invalid multipart content-type '{ct}': {e}")))?;
                }
                Ok(part)
            }
        }
    }
}

/// One multipart request body: plain text fields plus file parts. Re-
/// materialized into a fresh `reqwest::multipart::Form` per attempt.
#[derive(Debug, Clone, Default)]
pub struct MultipartBody {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, MultipartSource>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_file(mut self, name: impl Into<String>, source: MultipartSource) -> Self {
        self.files.insert(name.into(), source);
        self
    }

    pub async fn to_form(&self) -> Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for (name, source) in &self.files {
            form = form.part(name.clone(), source.to_part().await?);
        }
        Ok(form)
    }
}
