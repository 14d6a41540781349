use std::sync::Arc;

use serde::Serialize;

use crate::classifier::{
    AccessExpander, AccessSet, Artifact, ClassificationResult, FileClassifier,
    SpecializationClassifier,
};
use crate::llm::LlmClient;
use crate::oracle::{ClassificationOracle, LlmOracle};
use crate::taxonomy::{Code, SpecializationEntry, TaxonomyStore, UNKNOWN_NAME};

/// Every known code with its name, in index order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecializationList {
    pub specializations: Vec<SpecializationEntry>,
    pub count: usize,
}

/// A code with the category/specialty digits its value encodes and, when it lives in
/// the tree, the ids of the groups that actually hold it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeDetails {
    pub code: Code,
    pub name: String,
    pub category: Code,
    pub specialty: Code,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialty_id: Option<String>,
}

/// Caller-facing operations over one taxonomy and one oracle.
pub struct ClassificationService {
    store: Arc<TaxonomyStore>,
    specialization: SpecializationClassifier,
    file: FileClassifier,
    access: AccessExpander,
}

impl ClassificationService {
    pub fn new(store: Arc<TaxonomyStore>, oracle: Arc<dyn ClassificationOracle>) -> Self {
        Self {
            specialization: SpecializationClassifier::new(store.clone(), oracle.clone()),
            file: FileClassifier::new(store.clone(), oracle.clone()),
            access: AccessExpander::new(store.clone(), oracle),
            store,
        }
    }

    /// Service whose oracle is a language model behind `client`.
    pub fn with_llm(store: Arc<TaxonomyStore>, client: Arc<dyn LlmClient>) -> Self {
        Self::new(store, Arc::new(LlmOracle::new(client)))
    }

    pub fn store(&self) -> &TaxonomyStore {
        &self.store
    }

    pub async fn classify(&self, specialization: &str) -> ClassificationResult {
        self.specialization.classify(specialization).await
    }

    pub async fn classify_file(&self, artifact: &Artifact, description: &str) -> ClassificationResult {
        self.file.classify(artifact, description).await
    }

    pub fn list_specializations(&self) -> SpecializationList {
        let specializations = self.store.all_specializations();
        SpecializationList {
            count: specializations.len(),
            specializations,
        }
    }

    /// `None` when the code is unknown.
    pub fn code_details(&self, code: Code) -> Option<CodeDetails> {
        let name = self.store.resolve_name(code);
        if name == UNKNOWN_NAME {
            return None;
        }
        let located = self.store.locate(code);
        Some(CodeDetails {
            code,
            name,
            category: code / 1000,
            specialty: (code / 100) % 100,
            category_id: located.as_ref().map(|(category, _)| category.clone()),
            specialty_id: located.map(|(_, specialty)| specialty),
        })
    }

    pub async fn determine_access(&self, code: Code) -> AccessSet {
        self.access.expand(code).await
    }
}
