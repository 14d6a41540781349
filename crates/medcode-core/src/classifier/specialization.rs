use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::{title_case, ClassificationResult, Outcome, EXTENDED_CONFIDENCE};
use crate::oracle::{ClassificationOracle, OracleRequest, PlacementProposal, RawProposal};
use crate::taxonomy::{Placement, TaxonomyStore, SENTINEL_CODE};

/// Free text to code: direct match first, dynamic extension second, sentinel last.
pub struct SpecializationClassifier {
    store: Arc<TaxonomyStore>,
    oracle: Arc<dyn ClassificationOracle>,
}

impl SpecializationClassifier {
    pub fn new(store: Arc<TaxonomyStore>, oracle: Arc<dyn ClassificationOracle>) -> Self {
        Self { store, oracle }
    }

    #[instrument(skip_all, fields(input = %specialization))]
    pub async fn classify(&self, specialization: &str) -> ClassificationResult {
        let request = OracleRequest::Direct {
            specialization: specialization.to_string(),
            catalogue: self.store.all_specializations(),
        };
        match self.oracle.classify(&request).await {
            RawProposal::Code(proposal) if self.store.contains(proposal.code) => {
                info!(code = proposal.code, confidence = proposal.confidence, "matched existing code");
                return ClassificationResult::new(
                    proposal.code,
                    self.store.resolve_name(proposal.code),
                    proposal.confidence,
                    Outcome::Matched,
                );
            }
            RawProposal::Code(proposal) => {
                warn!(code = proposal.code, "proposed code not in taxonomy; extending");
            }
            RawProposal::Failed(failure) => {
                warn!(%failure, "direct classification failed; extending");
            }
            other => {
                warn!(proposal = ?other, "unexpected proposal kind; extending");
            }
        }
        self.extend(specialization).await
    }

    async fn extend(&self, specialization: &str) -> ClassificationResult {
        let request = OracleRequest::Placement {
            specialization: specialization.to_string(),
            outline: self.store.outline(),
        };
        let proposal = match self.oracle.classify(&request).await {
            RawProposal::Placement(proposal) if proposal.base_code != SENTINEL_CODE => proposal,
            RawProposal::Placement(_) => {
                warn!("placement proposed base code 0; falling back");
                return ClassificationResult::fallback();
            }
            RawProposal::Failed(failure) => {
                warn!(%failure, "placement failed; falling back");
                return ClassificationResult::fallback();
            }
            other => {
                warn!(proposal = ?other, "unexpected proposal kind; falling back");
                return ClassificationResult::fallback();
            }
        };

        let name = title_case(specialization);
        if name.is_empty() {
            warn!("blank specialization cannot be minted; falling back");
            return ClassificationResult::fallback();
        }
        let placement = placement_for(&proposal, &name);
        match self.store.mint_in_group(proposal.base_code, &name, &placement) {
            Ok(code) => {
                info!(
                    code,
                    base_code = proposal.base_code,
                    category = %placement.category_id,
                    specialty = %placement.specialty_id,
                    "minted new code"
                );
                ClassificationResult::new(code, name, EXTENDED_CONFIDENCE, Outcome::Extended)
            }
            Err(err) => {
                warn!(error = %err, base_code = proposal.base_code, "extension failed; falling back");
                ClassificationResult::fallback()
            }
        }
    }
}

/// A new specialty without a proposed name is named after the code being minted.
fn placement_for(proposal: &PlacementProposal, name: &str) -> Placement {
    Placement {
        category_id: proposal.category_id.clone(),
        category_name: proposal.category_name.clone(),
        specialty_id: proposal.specialty_id.clone(),
        specialty_name: proposal
            .specialty_name
            .clone()
            .or_else(|| Some(name.to_string())),
    }
}
