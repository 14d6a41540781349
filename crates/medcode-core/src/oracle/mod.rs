pub mod prompt;
pub mod proposal;
pub mod repair;

use std::{env, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::llm::{ImageInput, LlmClient};
use crate::taxonomy::{Code, OutlineEntry, SpecializationEntry};

pub use proposal::{
    AccessProposal, CodeProposal, OracleFailure, PlacementProposal, RawProposal,
    DEFAULT_BASE_CODE, DEFAULT_CONFIDENCE,
};
pub use repair::ReplyError;

const DEBUG_ENV: &str = "MEDCODE_DEBUG";

/// A question for the classification oracle, together with the taxonomy snapshot it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleRequest {
    /// Map free text to an existing code.
    Direct {
        specialization: String,
        catalogue: Vec<SpecializationEntry>,
    },
    /// Place free text into a category/specialty so a new code can be minted.
    Placement {
        specialization: String,
        outline: Vec<OutlineEntry>,
    },
    /// Map an uploaded artifact to an existing code.
    File(FileRequest),
    /// List the diagnostic/support codes a holder of `code` needs.
    Access {
        code: Code,
        name: String,
        catalogue: Vec<SpecializationEntry>,
    },
}

impl OracleRequest {
    fn kind(&self) -> &'static str {
        match self {
            Self::Direct { .. } => "direct",
            Self::Placement { .. } => "placement",
            Self::File(_) => "file",
            Self::Access { .. } => "access",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileRequest {
    pub filename: String,
    pub content_type: Option<String>,
    pub description: String,
    pub body: FileBody,
    pub catalogue: Vec<SpecializationEntry>,
}

/// What of the artifact itself reaches the oracle.
#[derive(Debug, Clone, PartialEq)]
pub enum FileBody {
    Image(ImageInput),
    Text { preview: Option<String> },
}

/// The external classifier. Implementations never fail; problems surface as
/// [`RawProposal::Failed`] so callers can pick their own fallback.
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    async fn classify(&self, request: &OracleRequest) -> RawProposal;
}

/// Oracle backed by a language model: builds the prompt, makes one call, repairs the reply.
pub struct LlmOracle {
    client: Arc<dyn LlmClient>,
}

impl LlmOracle {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClassificationOracle for LlmOracle {
    async fn classify(&self, request: &OracleRequest) -> RawProposal {
        let prompt = prompt::build(request);
        let kind = request.kind();
        let raw = match self.client.complete(&prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(kind, error = %format!("{err:#}"), "oracle call failed");
                return RawProposal::Failed(OracleFailure::Transport(format!("{err:#}")));
            }
        };
        if debug_enabled() {
            warn!(kind, raw = %raw, "oracle raw reply");
        } else {
            debug!(kind, bytes = raw.len(), "oracle replied");
        }
        interpret(request, &raw)
    }
}

/// Parse `raw` into the proposal shape `request` expects.
pub fn interpret(request: &OracleRequest, raw: &str) -> RawProposal {
    let parsed = match request {
        OracleRequest::Direct { .. } | OracleRequest::File(_) => {
            repair::parse_reply::<CodeProposal>(raw).map(RawProposal::Code)
        }
        OracleRequest::Placement { .. } => {
            repair::parse_reply::<PlacementProposal>(raw).map(RawProposal::Placement)
        }
        OracleRequest::Access { .. } => {
            repair::parse_reply::<AccessProposal>(raw).map(RawProposal::Access)
        }
    };
    parsed.unwrap_or_else(|err| {
        warn!(kind = request.kind(), raw = %raw, error = %err, "oracle reply unparseable");
        RawProposal::Failed(OracleFailure::Unparseable {
            raw: raw.to_string(),
            reason: err.to_string(),
        })
    })
}

fn debug_enabled() -> bool {
    matches!(env::var(DEBUG_ENV), Ok(val) if !val.is_empty() && val != "0")
}
