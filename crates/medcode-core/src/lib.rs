pub mod classifier;
pub mod llm;
pub mod oracle;
pub mod report;
pub mod service;
pub mod taxonomy;

pub use classifier::{AccessSet, Artifact, ClassificationResult, Outcome};
pub use llm::{build_client, LlmClient, LlmSettings, NoopLlmClient, ScriptedLlmClient};
pub use oracle::{ClassificationOracle, LlmOracle, OracleRequest, RawProposal};
pub use service::{ClassificationService, CodeDetails, SpecializationList};
pub use taxonomy::{
    Code, FileTaxonomyRepository, MemoryTaxonomyRepository, TaxonomyError, TaxonomyRepository,
    TaxonomyStore, SENTINEL_CODE, SENTINEL_NAME,
};
