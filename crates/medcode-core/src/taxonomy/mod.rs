use std::{
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod file_repository;
pub mod store;

pub use file_repository::FileTaxonomyRepository;
pub use store::TaxonomyStore;

/// Numeric specialization code. Codes are globally unique across the taxonomy.
pub type Code = u32;

/// Reserved code meaning "unclassified / general access". Never stored in the tree.
pub const SENTINEL_CODE: Code = 0;
pub const SENTINEL_NAME: &str = "All Specializations (General Access)";
/// Name reported for codes absent from the taxonomy.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Category id used when the oracle cannot place a specialization.
pub const DEFAULT_CATEGORY_ID: &str = "9";
pub const DEFAULT_SPECIALTY_ID: &str = "91";

/// Durable document shape: category id -> category, in document order.
pub type TaxonomyTree = IndexMap<String, Category>;

/// Flat code -> name index: sentinel first, then codes in tree order, minted codes last.
pub type FlatIndex = IndexMap<Code, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Category {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub specialties: IndexMap<String, Specialty>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Specialty {
    #[serde(default)]
    pub name: String,
    /// Serialized with stringified code keys (`"1200": "General Medicine"`).
    #[serde(default)]
    pub codes: IndexMap<Code, String>,
}

/// Where a new code should be inserted. Names are only consulted when the
/// category or specialty does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Placement {
    pub category_id: String,
    pub category_name: Option<String>,
    pub specialty_id: String,
    pub specialty_name: Option<String>,
}

impl Placement {
    pub fn existing(category_id: impl Into<String>, specialty_id: impl Into<String>) -> Self {
        Self {
            category_id: category_id.into(),
            specialty_id: specialty_id.into(),
            ..Self::default()
        }
    }
}

/// One specialty row of the hierarchy, as shown to the oracle when placing a new specialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    pub category_id: String,
    pub category_name: String,
    pub specialty_id: String,
    pub specialty_name: String,
    /// Lowest code of the specialty, `0` when it has none.
    pub base_code: Code,
}

/// Flat `{code, name}` pair exposed to callers and prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecializationEntry {
    pub code: Code,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("taxonomy document not found at {path}")]
    Missing { path: PathBuf },
    #[error("failed to read taxonomy document at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed taxonomy document at {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to persist taxonomy document to {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize taxonomy document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("code 0 is reserved and cannot be stored in the hierarchy")]
    ReservedCode,
    #[error("code {code} already exists as `{existing}`")]
    DuplicateCode { code: Code, existing: String },
    #[error("no free code left after {base_code} in its hundred-block")]
    CodeSpaceExhausted { base_code: Code },
    #[error("new category `{category_id}` requires a display name")]
    UnnamedCategory { category_id: String },
    #[error("new specialty `{specialty_id}` in category `{category_id}` requires a display name")]
    UnnamedSpecialty {
        category_id: String,
        specialty_id: String,
    },
}

/// Build the flat code -> name index, including the sentinel.
///
/// Fails when a code is stored twice or when the reserved sentinel appears in the tree.
pub fn flat_index(tree: &TaxonomyTree) -> Result<FlatIndex, TaxonomyError> {
    let mut index = FlatIndex::new();
    index.insert(SENTINEL_CODE, SENTINEL_NAME.to_string());
    for category in tree.values() {
        for specialty in category.specialties.values() {
            for (&code, name) in &specialty.codes {
                if code == SENTINEL_CODE {
                    return Err(TaxonomyError::ReservedCode);
                }
                if let Some(existing) = index.insert(code, name.clone()) {
                    return Err(TaxonomyError::DuplicateCode { code, existing });
                }
            }
        }
    }
    Ok(index)
}

/// Insert `code` under the placement, creating the category/specialty when needed.
///
/// Does not check global uniqueness; callers validate against the flat index first.
pub fn insert_code(
    tree: &mut TaxonomyTree,
    code: Code,
    name: &str,
    placement: &Placement,
) -> Result<(), TaxonomyError> {
    if code == SENTINEL_CODE {
        return Err(TaxonomyError::ReservedCode);
    }
    let category = tree.get(&placement.category_id);
    let new_category_name = match category {
        Some(_) => None,
        None => Some(non_blank(placement.category_name.as_deref()).ok_or_else(|| {
            TaxonomyError::UnnamedCategory {
                category_id: placement.category_id.clone(),
            }
        })?),
    };
    let has_specialty =
        category.is_some_and(|c| c.specialties.contains_key(&placement.specialty_id));
    let new_specialty_name = if has_specialty {
        None
    } else {
        Some(non_blank(placement.specialty_name.as_deref()).ok_or_else(|| {
            TaxonomyError::UnnamedSpecialty {
                category_id: placement.category_id.clone(),
                specialty_id: placement.specialty_id.clone(),
            }
        })?)
    };

    let category = tree
        .entry(placement.category_id.clone())
        .or_insert_with(|| Category {
            name: new_category_name.unwrap_or_default(),
            specialties: IndexMap::new(),
        });
    let specialty = category
        .specialties
        .entry(placement.specialty_id.clone())
        .or_insert_with(|| Specialty {
            name: new_specialty_name.unwrap_or_default(),
            codes: IndexMap::new(),
        });
    specialty.codes.insert(code, name.to_string());
    Ok(())
}

/// Locate the `(category_id, specialty_id)` holding `code`.
pub fn locate(tree: &TaxonomyTree, code: Code) -> Option<(String, String)> {
    tree.iter().find_map(|(category_id, category)| {
        category
            .specialties
            .iter()
            .find(|(_, specialty)| specialty.codes.contains_key(&code))
            .map(|(specialty_id, _)| (category_id.clone(), specialty_id.clone()))
    })
}

/// Specialty rows in tree order, each with its group base code.
pub fn outline(tree: &TaxonomyTree) -> Vec<OutlineEntry> {
    let mut rows = Vec::new();
    for (category_id, category) in tree {
        for (specialty_id, specialty) in &category.specialties {
            rows.push(OutlineEntry {
                category_id: category_id.clone(),
                category_name: category.name.clone(),
                specialty_id: specialty_id.clone(),
                specialty_name: specialty.name.clone(),
                base_code: specialty.codes.keys().min().copied().unwrap_or(0),
            });
        }
    }
    rows
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Persistence backend for the taxonomy document so file and in-memory stores can be swapped.
pub trait TaxonomyRepository: Send + Sync {
    /// Read the full document.
    fn load(&self) -> Result<TaxonomyTree, TaxonomyError>;

    /// Durably replace the stored document with `tree`.
    fn persist(&self, tree: &TaxonomyTree) -> Result<(), TaxonomyError>;

    /// Human-readable location used in log lines.
    fn describe(&self) -> String;
}

/// Repository keeping the document in memory; persisted snapshots are readable back via `load`.
#[derive(Debug, Default)]
pub struct MemoryTaxonomyRepository {
    tree: Mutex<TaxonomyTree>,
}

impl MemoryTaxonomyRepository {
    pub fn new(tree: TaxonomyTree) -> Self {
        Self {
            tree: Mutex::new(tree),
        }
    }
}

impl TaxonomyRepository for MemoryTaxonomyRepository {
    fn load(&self) -> Result<TaxonomyTree, TaxonomyError> {
        Ok(self
            .tree
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn persist(&self, tree: &TaxonomyTree) -> Result<(), TaxonomyError> {
        *self.tree.lock().unwrap_or_else(PoisonError::into_inner) = tree.clone();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}
