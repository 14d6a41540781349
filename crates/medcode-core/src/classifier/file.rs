use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info, instrument, warn};

use super::{
    extract::{extract_preview, DocumentKind},
    ClassificationResult, Outcome, NAME_MATCH_CONFIDENCE,
};
use crate::llm::ImageInput;
use crate::oracle::{ClassificationOracle, FileBody, FileRequest, OracleRequest, RawProposal};
use crate::taxonomy::{TaxonomyStore, SENTINEL_CODE};

/// Largest image that is read and sent inline, exclusive.
pub const IMAGE_SIZE_CEILING: u64 = 10_000_000;
/// Largest non-image artifact that is read for text extraction, exclusive.
pub const DOCUMENT_SIZE_CEILING: u64 = 5_000_000;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];
const DEFAULT_IMAGE_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Image,
    Document,
}

impl Modality {
    /// A declared content type wins; the filename extension is only used without one.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Self {
        let is_image = match content_type {
            Some(content_type) => content_type.trim().to_ascii_lowercase().starts_with("image/"),
            None => Path::new(filename)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false),
        };
        if is_image {
            Self::Image
        } else {
            Self::Document
        }
    }

    pub fn size_ceiling(self) -> u64 {
        match self {
            Self::Image => IMAGE_SIZE_CEILING,
            Self::Document => DOCUMENT_SIZE_CEILING,
        }
    }
}

#[derive(Debug, Clone)]
enum ArtifactBody {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// An uploaded file: its name, declared content type and contents.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub filename: String,
    pub content_type: Option<String>,
    body: ArtifactBody,
}

impl Artifact {
    pub fn from_bytes(
        filename: impl Into<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            body: ArtifactBody::Bytes(bytes),
        }
    }

    /// Artifact backed by a file on disk; contents are only read if under the ceiling.
    pub fn from_path(path: impl Into<PathBuf>, content_type: Option<String>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            filename,
            content_type,
            body: ArtifactBody::Path(path),
        }
    }

    fn size(&self) -> Option<u64> {
        match &self.body {
            ArtifactBody::Bytes(bytes) => Some(bytes.len() as u64),
            ArtifactBody::Path(path) => fs::metadata(path).ok().map(|meta| meta.len()),
        }
    }

    /// Contents when non-empty and strictly smaller than `ceiling`. Blocking.
    fn read_below(&self, ceiling: u64) -> Option<Vec<u8>> {
        let size = self.size()?;
        if size == 0 || size >= ceiling {
            debug!(filename = %self.filename, size, ceiling, "artifact not read");
            return None;
        }
        match &self.body {
            ArtifactBody::Bytes(bytes) => Some(bytes.clone()),
            ArtifactBody::Path(path) => match fs::read(path) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to read artifact");
                    None
                }
            },
        }
    }

    /// Prompt body for this artifact: inline image or extracted text preview. Blocking.
    fn prompt_body(&self) -> FileBody {
        let modality = Modality::detect(&self.filename, self.content_type.as_deref());
        match (modality, self.read_below(modality.size_ceiling())) {
            (Modality::Image, Some(data)) => FileBody::Image(ImageInput {
                media_type: self
                    .content_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_IMAGE_TYPE.to_string()),
                data,
            }),
            (Modality::Document, Some(data)) => {
                let kind = DocumentKind::from_filename(&self.filename);
                let preview = extract_preview(kind, &data).unwrap_or_else(|err| {
                    warn!(error = %err, "text extraction failed; classifying without preview");
                    None
                });
                FileBody::Text { preview }
            }
            (_, None) => FileBody::Text { preview: None },
        }
    }
}

/// Artifact to code. Never extends the taxonomy: unknown proposals fall back to a
/// filename match and then the sentinel.
pub struct FileClassifier {
    store: Arc<TaxonomyStore>,
    oracle: Arc<dyn ClassificationOracle>,
}

impl FileClassifier {
    pub fn new(store: Arc<TaxonomyStore>, oracle: Arc<dyn ClassificationOracle>) -> Self {
        Self { store, oracle }
    }

    #[instrument(skip_all, fields(filename = %artifact.filename))]
    pub async fn classify(&self, artifact: &Artifact, description: &str) -> ClassificationResult {
        let request = OracleRequest::File(self.build_request(artifact, description).await);
        match self.oracle.classify(&request).await {
            RawProposal::Code(proposal) if proposal.code == SENTINEL_CODE => {
                info!("oracle chose general access");
                ClassificationResult::fallback()
            }
            RawProposal::Code(proposal) if self.store.contains(proposal.code) => {
                info!(code = proposal.code, confidence = proposal.confidence, "matched existing code");
                ClassificationResult::new(
                    proposal.code,
                    self.store.resolve_name(proposal.code),
                    proposal.confidence,
                    Outcome::Matched,
                )
            }
            RawProposal::Code(proposal) => {
                warn!(code = proposal.code, "proposed code not in taxonomy");
                self.filename_fallback(&artifact.filename)
            }
            RawProposal::Failed(failure) => {
                warn!(%failure, "file classification failed");
                self.filename_fallback(&artifact.filename)
            }
            other => {
                warn!(proposal = ?other, "unexpected proposal kind");
                self.filename_fallback(&artifact.filename)
            }
        }
    }

    async fn build_request(&self, artifact: &Artifact, description: &str) -> FileRequest {
        let owned = artifact.clone();
        let body = match tokio::task::spawn_blocking(move || owned.prompt_body()).await {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "artifact loading task failed; classifying without contents");
                FileBody::Text { preview: None }
            }
        };
        FileRequest {
            filename: artifact.filename.clone(),
            content_type: artifact.content_type.clone(),
            description: description.to_string(),
            body,
            catalogue: self.store.all_specializations(),
        }
    }

    fn filename_fallback(&self, filename: &str) -> ClassificationResult {
        match self.store.resolve_code(filename) {
            Some(code) if code != SENTINEL_CODE => {
                info!(code, "filename matched existing name");
                ClassificationResult::new(
                    code,
                    self.store.resolve_name(code),
                    NAME_MATCH_CONFIDENCE,
                    Outcome::NameMatch,
                )
            }
            _ => {
                warn!(filename, "no filename match; falling back");
                ClassificationResult::fallback()
            }
        }
    }
}
