use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard};

use tracing::{debug, info, warn};

use super::{
    flat_index, insert_code, locate, outline, Code, FlatIndex, OutlineEntry, Placement,
    SpecializationEntry, TaxonomyError, TaxonomyRepository, TaxonomyTree, SENTINEL_CODE,
    UNKNOWN_NAME,
};

struct TaxonomyState {
    tree: TaxonomyTree,
    index: FlatIndex,
}

/// Process-wide taxonomy: the category tree, its flat code index, and the backing repository.
///
/// Reads take a shared lock and never wait on disk. Mutations are serialized by a
/// writer lock held across compute, persist and swap, and the in-memory state only
/// changes after the repository accepted the new document.
pub struct TaxonomyStore {
    repo: Box<dyn TaxonomyRepository>,
    state: RwLock<TaxonomyState>,
    writer: Mutex<()>,
}

impl TaxonomyStore {
    /// Load the document from `repo` and build the flat index.
    pub fn load(repo: impl TaxonomyRepository + 'static) -> Result<Self, TaxonomyError> {
        let tree = repo.load()?;
        let index = flat_index(&tree)?;
        info!(
            source = %repo.describe(),
            codes = index.len() - 1,
            categories = tree.len(),
            "taxonomy loaded"
        );
        Ok(Self {
            repo: Box::new(repo),
            state: RwLock::new(TaxonomyState { tree, index }),
            writer: Mutex::new(()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, TaxonomyState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Display name for `code`, or `"Unknown"`.
    pub fn resolve_name(&self, code: Code) -> String {
        self.read()
            .index
            .get(&code)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_NAME.to_string())
    }

    /// Whether `code` is in the flat index (the sentinel always is).
    pub fn contains(&self, code: Code) -> bool {
        self.read().index.contains_key(&code)
    }

    /// First code whose name contains the fragment, or is contained by it, ignoring case.
    ///
    /// Scans the flat index in insertion order: the sentinel, then codes as they appear
    /// in the document, then codes minted since load. This is a heuristic lookup, not a
    /// ranking.
    pub fn resolve_code(&self, fragment: &str) -> Option<Code> {
        let query = fragment.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        self.read().index.iter().find_map(|(&code, name)| {
            let name = name.trim().to_lowercase();
            if name.is_empty() {
                return None;
            }
            (name.contains(&query) || query.contains(&name)).then_some(code)
        })
    }

    pub fn all_codes(&self) -> Vec<Code> {
        self.read().index.keys().copied().collect()
    }

    pub fn all_specializations(&self) -> Vec<SpecializationEntry> {
        self.read()
            .index
            .iter()
            .map(|(&code, name)| SpecializationEntry {
                code,
                name: name.clone(),
            })
            .collect()
    }

    /// Snapshot of the category tree.
    pub fn tree(&self) -> TaxonomyTree {
        self.read().tree.clone()
    }

    pub fn outline(&self) -> Vec<OutlineEntry> {
        outline(&self.read().tree)
    }

    /// `(category_id, specialty_id)` holding `code`.
    pub fn locate(&self, code: Code) -> Option<(String, String)> {
        locate(&self.read().tree, code)
    }

    /// Insert `code` under the placement and persist the document.
    ///
    /// On any error the in-memory taxonomy is left untouched.
    pub fn add_specialization(
        &self,
        code: Code,
        name: &str,
        placement: &Placement,
    ) -> Result<(), TaxonomyError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.insert_locked(code, name, placement)
    }

    /// Mint the next free code in the hundred-block of `base_code` and insert it.
    ///
    /// The next code is one past the largest existing code with the same `code / 100`,
    /// or `base_code + 1` when the block is empty. Computing and inserting happen under
    /// the writer lock, so concurrent extensions of the same block get distinct codes.
    /// Fails with [`TaxonomyError::CodeSpaceExhausted`] when the next code would pass `u32::MAX`.
    pub fn mint_in_group(
        &self,
        base_code: Code,
        name: &str,
        placement: &Placement,
    ) -> Result<Code, TaxonomyError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let code = next_code_in_group(&self.read().index, base_code)
            .ok_or(TaxonomyError::CodeSpaceExhausted { base_code })?;
        self.insert_locked(code, name, placement)?;
        Ok(code)
    }

    fn insert_locked(
        &self,
        code: Code,
        name: &str,
        placement: &Placement,
    ) -> Result<(), TaxonomyError> {
        if code == SENTINEL_CODE {
            return Err(TaxonomyError::ReservedCode);
        }
        let mut next = {
            let state = self.read();
            if let Some(existing) = state.index.get(&code) {
                return Err(TaxonomyError::DuplicateCode {
                    code,
                    existing: existing.clone(),
                });
            }
            state.tree.clone()
        };
        insert_code(&mut next, code, name, placement)?;

        if let Err(err) = self.repo.persist(&next) {
            warn!(code, name, error = %err, "failed to persist taxonomy; in-memory state unchanged");
            return Err(err);
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.tree = next;
        state.index.insert(code, name.to_string());
        debug!(
            code,
            name,
            category = %placement.category_id,
            specialty = %placement.specialty_id,
            "taxonomy extended"
        );
        Ok(())
    }
}

/// Next code in the hundred-block of `base_code`, `None` once the code space is used up.
pub fn next_code_in_group(index: &FlatIndex, base_code: Code) -> Option<Code> {
    let group = base_code / 100;
    match index.keys().copied().filter(|code| code / 100 == group).max() {
        Some(max) => max.checked_add(1),
        None => base_code.checked_add(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{
        file_repository::FileTaxonomyRepository, MemoryTaxonomyRepository, SENTINEL_NAME,
    };
    use proptest::prelude::*;
    use std::{collections::HashSet, sync::Arc, thread};

    fn sample_tree() -> TaxonomyTree {
        serde_json::from_str(
            r#"{
                "1": {"name": "Medicine", "specialties": {
                    "12": {"name": "General Medicine", "codes": {"1200": "General Medicine"}}
                }},
                "2": {"name": "Surgery", "specialties": {
                    "21": {"name": "General Surgery", "codes": {"2100": "General Surgery", "2101": "Trauma Surgery"}}
                }},
                "4": {"name": "Mental Health", "specialties": {
                    "41": {"name": "Psychiatry", "codes": {"4100": "Psychiatry"}}
                }}
            }"#,
        )
        .unwrap()
    }

    fn memory_store() -> TaxonomyStore {
        TaxonomyStore::load(MemoryTaxonomyRepository::new(sample_tree())).unwrap()
    }

    struct ReadOnlyRepository(TaxonomyTree);

    impl TaxonomyRepository for ReadOnlyRepository {
        fn load(&self) -> Result<TaxonomyTree, TaxonomyError> {
            Ok(self.0.clone())
        }

        fn persist(&self, _tree: &TaxonomyTree) -> Result<(), TaxonomyError> {
            Err(TaxonomyError::Persist {
                path: "read-only".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }

        fn describe(&self) -> String {
            "read-only".into()
        }
    }

    #[test]
    fn resolves_names_and_sentinel() {
        let store = memory_store();
        assert_eq!(store.resolve_name(1200), "General Medicine");
        assert_eq!(store.resolve_name(0), SENTINEL_NAME);
        assert_eq!(store.resolve_name(9999), UNKNOWN_NAME);
        assert!(store.contains(0));
    }

    #[test]
    fn lookup_is_stable_across_reads() {
        let store = memory_store();
        let before: Vec<_> = store.all_codes().iter().map(|&c| store.resolve_name(c)).collect();
        for _ in 0..5 {
            let _ = store.all_specializations();
            let _ = store.resolve_code("surgery");
        }
        let after: Vec<_> = store.all_codes().iter().map(|&c| store.resolve_name(c)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn resolve_code_matches_in_both_directions() {
        let store = memory_store();
        assert_eq!(store.resolve_code("TRAUMA"), Some(2101));
        assert_eq!(store.resolve_code("psychiatry_notes_2024.pdf"), Some(4100));
        assert_eq!(store.resolve_code("ophthalmology"), None);
        assert_eq!(store.resolve_code("   "), None);
    }

    #[test]
    fn resolve_code_follows_document_order() {
        let tree: TaxonomyTree = serde_json::from_str(
            r#"{
                "3": {"name": "Cardiovascular", "specialties": {
                    "31": {"name": "Cardiac Surgery", "codes": {"3100": "Cardiac Surgery"}}
                }},
                "1": {"name": "Medicine", "specialties": {
                    "13": {"name": "Cardiology", "codes": {"1300": "Cardiology"}}
                }}
            }"#,
        )
        .unwrap();
        let store = TaxonomyStore::load(MemoryTaxonomyRepository::new(tree)).unwrap();
        assert_eq!(store.resolve_code("cardi"), Some(3100));
        assert_eq!(store.all_codes(), vec![0, 3100, 1300]);
        let names: Vec<_> = store.all_specializations().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec![SENTINEL_NAME, "Cardiac Surgery", "Cardiology"]);
    }

    #[test]
    fn minted_codes_are_scanned_last() {
        let store = memory_store();
        store
            .add_specialization(1100, "Surgical Oncology", &Placement::existing("1", "12"))
            .unwrap();
        assert_eq!(store.all_codes().last(), Some(&1100));
        // 2100 was in the document before 1100 was added.
        assert_eq!(store.resolve_code("surgery"), Some(2100));
        assert_eq!(store.resolve_code("oncology"), Some(1100));
    }

    #[test]
    fn add_specialization_updates_index_and_repository() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("hierarchy.json");
        FileTaxonomyRepository::new(&path).persist(&sample_tree()).unwrap();

        let store = TaxonomyStore::load(FileTaxonomyRepository::new(&path)).unwrap();
        store
            .add_specialization(4101, "Child Psychiatry", &Placement::existing("4", "41"))
            .unwrap();
        assert_eq!(store.resolve_name(4101), "Child Psychiatry");

        let reloaded = TaxonomyStore::load(FileTaxonomyRepository::new(&path)).unwrap();
        assert_eq!(reloaded.tree(), store.tree());
        assert_eq!(reloaded.resolve_name(4101), "Child Psychiatry");
    }

    #[test]
    fn add_specialization_creates_named_groups() {
        let store = memory_store();
        let placement = Placement {
            category_id: "7".into(),
            category_name: Some("Dermatology & Skin".into()),
            specialty_id: "71".into(),
            specialty_name: Some("Dermatology".into()),
        };
        store
            .add_specialization(7101, "Cosmetic Dermatology", &placement)
            .unwrap();
        let tree = store.tree();
        assert_eq!(tree["7"].name, "Dermatology & Skin");
        assert_eq!(tree["7"].specialties["71"].name, "Dermatology");
        assert_eq!(store.locate(7101), Some(("7".into(), "71".into())));
    }

    #[test]
    fn duplicate_and_reserved_codes_are_rejected() {
        let store = memory_store();
        let err = store
            .add_specialization(2101, "Other", &Placement::existing("2", "21"))
            .unwrap_err();
        assert!(matches!(err, TaxonomyError::DuplicateCode { code: 2101, .. }));
        let err = store
            .add_specialization(0, "Zero", &Placement::existing("2", "21"))
            .unwrap_err();
        assert!(matches!(err, TaxonomyError::ReservedCode));
        assert_eq!(store.resolve_name(2101), "Trauma Surgery");
    }

    #[test]
    fn persist_failure_leaves_state_unchanged() {
        let store = TaxonomyStore::load(ReadOnlyRepository(sample_tree())).unwrap();
        let before = store.tree();
        let err = store
            .add_specialization(2102, "Hand Surgery", &Placement::existing("2", "21"))
            .unwrap_err();
        assert!(matches!(err, TaxonomyError::Persist { .. }));
        assert_eq!(store.tree(), before);
        assert_eq!(store.resolve_name(2102), UNKNOWN_NAME);
    }

    #[test]
    fn next_code_uses_group_maximum() {
        let index = flat_index(&sample_tree()).unwrap();
        assert_eq!(next_code_in_group(&index, 2100), Some(2102));
        assert_eq!(next_code_in_group(&index, 4100), Some(4101));
        assert_eq!(next_code_in_group(&index, 3100), Some(3101));
        assert_eq!(next_code_in_group(&index, u32::MAX), None);
    }

    #[test]
    fn mint_after_largest_code_reports_exhaustion() {
        let tree: TaxonomyTree = serde_json::from_str(
            r#"{"9": {"name": "Other", "specialties": {
                "91": {"name": "Misc", "codes": {"4294967295": "Edge"}}
            }}}"#,
        )
        .unwrap();
        let store = TaxonomyStore::load(MemoryTaxonomyRepository::new(tree)).unwrap();
        let before = store.tree();
        let err = store
            .mint_in_group(4294967200, "Beyond", &Placement::existing("9", "91"))
            .unwrap_err();
        assert!(matches!(
            err,
            TaxonomyError::CodeSpaceExhausted { base_code: 4294967200 }
        ));
        assert_eq!(store.tree(), before);
        assert_eq!(store.all_codes(), vec![0, u32::MAX]);
    }

    #[test]
    fn mint_in_group_overflow_into_taken_code_is_rejected() {
        let tree: TaxonomyTree = serde_json::from_str(
            r#"{"3": {"name": "Paediatrics", "specialties": {
                "31": {"name": "General Paediatrics", "codes": {"3199": "Neonatology"}},
                "32": {"name": "Paediatric Surgery", "codes": {"3200": "Paediatric Surgery"}}
            }}}"#,
        )
        .unwrap();
        let store = TaxonomyStore::load(MemoryTaxonomyRepository::new(tree)).unwrap();
        let err = store
            .mint_in_group(3100, "Perinatology", &Placement::existing("3", "31"))
            .unwrap_err();
        assert!(matches!(err, TaxonomyError::DuplicateCode { code: 3200, .. }));
    }

    #[test]
    fn concurrent_mints_get_distinct_codes() {
        let store = Arc::new(memory_store());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .mint_in_group(2100, &format!("Surgery {i}"), &Placement::existing("2", "21"))
                        .unwrap()
                })
            })
            .collect();
        let codes: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(codes.len(), 8);
        assert!(codes.iter().all(|c| (2102..=2109).contains(c)));
        assert_eq!(store.tree()["2"].specialties["21"].codes.len(), 10);
    }

    proptest! {
        #[test]
        fn codes_stay_unique_after_mints(
            groups in proptest::collection::vec(prop_oneof![Just(1200u32), Just(2100u32), Just(4100u32)], 1..24)
        ) {
            let store = memory_store();
            for (i, base) in groups.iter().enumerate() {
                let placement = match base {
                    1200 => Placement::existing("1", "12"),
                    2100 => Placement::existing("2", "21"),
                    _ => Placement::existing("4", "41"),
                };
                store.mint_in_group(*base, &format!("Minted {i}"), &placement).unwrap();
            }
            let tree = store.tree();
            let mut seen = HashSet::new();
            for category in tree.values() {
                for specialty in category.specialties.values() {
                    for code in specialty.codes.keys() {
                        prop_assert!(seen.insert(*code), "code {} stored twice", code);
                    }
                }
            }
            prop_assert_eq!(seen.len() + 1, store.all_codes().len());
        }
    }
}
