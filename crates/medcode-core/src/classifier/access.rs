use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::oracle::{ClassificationOracle, OracleRequest, RawProposal};
use crate::taxonomy::{Code, TaxonomyStore, SENTINEL_CODE, UNKNOWN_NAME};

/// Every code a holder of `primary_code` may see. Contains the primary code unless it is the sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessSet {
    pub codes: Vec<Code>,
    pub primary_code: Code,
}

impl AccessSet {
    pub fn primary_only(primary_code: Code) -> Self {
        Self {
            codes: vec![primary_code],
            primary_code,
        }
    }
}

/// Asks the oracle which diagnostic/support codes go with a confirmed primary code.
pub struct AccessExpander {
    store: Arc<TaxonomyStore>,
    oracle: Arc<dyn ClassificationOracle>,
}

impl AccessExpander {
    pub fn new(store: Arc<TaxonomyStore>, oracle: Arc<dyn ClassificationOracle>) -> Self {
        Self { store, oracle }
    }

    #[instrument(skip(self))]
    pub async fn expand(&self, primary_code: Code) -> AccessSet {
        let name = self.store.resolve_name(primary_code);
        if name == UNKNOWN_NAME {
            info!("primary code unknown; granting it alone");
            return AccessSet::primary_only(primary_code);
        }

        let request = OracleRequest::Access {
            code: primary_code,
            name: name.clone(),
            catalogue: self.store.all_specializations(),
        };
        let proposal = match self.oracle.classify(&request).await {
            RawProposal::Access(proposal) => proposal,
            RawProposal::Failed(failure) => {
                warn!(%failure, "access expansion failed; granting primary code only");
                return AccessSet::primary_only(primary_code);
            }
            other => {
                warn!(proposal = ?other, "unexpected proposal kind; granting primary code only");
                return AccessSet::primary_only(primary_code);
            }
        };

        let mut codes: Vec<Code> = Vec::with_capacity(proposal.codes.len() + 1);
        for code in proposal.codes {
            if code != SENTINEL_CODE && !self.store.contains(code) {
                warn!(code, "dropping unknown access code");
                continue;
            }
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        if primary_code != SENTINEL_CODE && !codes.contains(&primary_code) {
            codes.push(primary_code);
        }
        info!(specialization = %name, ?codes, "related access codes");
        AccessSet {
            codes,
            primary_code,
        }
    }
}
