use std::path::{Path, PathBuf};

use aura_llm::InlineData;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use snafu::{ResultExt, Snafu, ensure};

use crate::message::AttachmentMeta;

/// Extensions the file picker accepts. Checked once, when the file is chosen.
pub const ALLOWED_EXTENSIONS: [&str; 9] = [
    "pdf", "docx", "xlsx", "pptx", "jpg", "jpeg", "png", "mp4", "zip",
];

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AttachmentError {
    #[snafu(display("file type of '{name}' is not supported"))]
    UnsupportedKind { stage: &'static str, name: String },
    #[snafu(display("failed to inspect attachment at {path:?}: {source}"))]
    Metadata {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to read attachment at {path:?}: {source}"))]
    Read {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A file picked in the composer, not yet read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    path: PathBuf,
    name: String,
    mime_type: String,
    size_bytes: u64,
}

impl Attachment {
    /// Accepts a file from the picker, enforcing the extension allow-list.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AttachmentError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let extension = path
            .extension()
            .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        ensure!(
            is_allowed_extension(&extension),
            UnsupportedKindSnafu {
                stage: "attachment-from-path",
                name: name.clone(),
            }
        );

        let metadata = std::fs::metadata(path).context(MetadataSnafu {
            stage: "attachment-metadata",
            path: path.to_path_buf(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            name,
            mime_type: mime_type_for_extension(&extension).to_string(),
            size_bytes: metadata.len(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Summary kept on the user message after the payload is discarded.
    pub fn meta(&self) -> AttachmentMeta {
        AttachmentMeta {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes,
        }
    }

    /// Reads the whole file and returns it as an inline base64 part.
    pub async fn encode(&self) -> Result<InlineData, AttachmentError> {
        let bytes = tokio::fs::read(&self.path).await.context(ReadSnafu {
            stage: "attachment-read",
            path: self.path.clone(),
        })?;
        let encoded = BASE64_STANDARD.encode(bytes);
        let data = strip_data_url_prefix(&encoded).to_string();

        tracing::debug!(
            name = %self.name,
            mime_type = %self.mime_type,
            encoded_len = data.len(),
            "encoded attachment"
        );

        Ok(InlineData::new(self.mime_type.clone(), data))
    }
}

/// Case-insensitive check against [`ALLOWED_EXTENSIONS`].
pub fn is_allowed_extension(extension: &str) -> bool {
    let extension = extension.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&extension.as_str())
}

/// MIME type sent with the inline part. Unknown extensions fall back to
/// `application/octet-stream`.
fn mime_type_for_extension(extension: &str) -> &'static str {
    mime_guess::from_ext(extension)
        .first_raw()
        .unwrap_or("application/octet-stream")
}

/// The payload must be bare base64; a `data:<mime>;base64,` header is dropped.
fn strip_data_url_prefix(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((header, data)) if header.starts_with("data:") => data,
        _ => payload,
    }
}

/// Human-readable size for the attachment chip.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{value:.1} {}", UNITS[unit])
}
