use std::{
    fs,
    path::{Path, PathBuf},
};

use super::{TaxonomyError, TaxonomyRepository, TaxonomyTree};

/// Loads and persists the taxonomy as a pretty-printed JSON document on disk.
pub struct FileTaxonomyRepository {
    path: PathBuf,
}

impl FileTaxonomyRepository {
    /// Create a repository backed by the JSON document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "taxonomy.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TaxonomyRepository for FileTaxonomyRepository {
    fn load(&self) -> Result<TaxonomyTree, TaxonomyError> {
        if !self.path.exists() {
            return Err(TaxonomyError::Missing {
                path: self.path.clone(),
            });
        }
        let raw = fs::read_to_string(&self.path).map_err(|source| TaxonomyError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| TaxonomyError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    fn persist(&self, tree: &TaxonomyTree) -> Result<(), TaxonomyError> {
        let mut body = serde_json::to_string_pretty(tree)?;
        body.push('\n');
        // Write beside the target and rename so readers never observe a truncated document.
        let staging = self.staging_path();
        fs::write(&staging, body).map_err(|source| TaxonomyError::Persist {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &self.path).map_err(|source| TaxonomyError::Persist {
            path: self.path.clone(),
            source,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{flat_index, insert_code, Placement};
    use proptest::prelude::*;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn loads_document_with_string_code_keys() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("hierarchy.json");
        write(
            &path,
            r#"
{
  "4": {
    "name": "Mental Health",
    "specialties": {
      "41": {"name": "Psychiatry", "codes": {"4100": "Psychiatry", "4101": "Child Psychiatry"}}
    }
  }
}
"#,
        );

        let repo = FileTaxonomyRepository::new(&path);
        let tree = repo.load().unwrap();
        assert_eq!(tree["4"].name, "Mental Health");
        assert_eq!(tree["4"].specialties["41"].codes[&4101u32], "Child Psychiatry");
    }

    #[test]
    fn missing_document_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let repo = FileTaxonomyRepository::new(temp.path().join("absent.json"));
        let err = repo.load().unwrap_err();
        assert!(matches!(err, TaxonomyError::Missing { .. }));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn malformed_document_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("hierarchy.json");
        write(&path, "{ \"1\": [1, 2, 3] }");
        let err = FileTaxonomyRepository::new(&path).load().unwrap_err();
        assert!(matches!(err, TaxonomyError::Malformed { .. }));
    }

    #[test]
    fn persist_leaves_no_staging_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("hierarchy.json");
        let repo = FileTaxonomyRepository::new(&path);
        repo.persist(&TaxonomyTree::new()).unwrap();
        assert!(path.exists());
        assert!(!temp.path().join("hierarchy.json.tmp").exists());
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written.trim(), "{}");
    }

    #[test]
    fn persist_fails_when_directory_missing() {
        let temp = tempfile::tempdir().unwrap();
        let repo = FileTaxonomyRepository::new(temp.path().join("gone/hierarchy.json"));
        let err = repo.persist(&TaxonomyTree::new()).unwrap_err();
        assert!(matches!(err, TaxonomyError::Persist { .. }));
    }

    #[test]
    fn loads_sample_taxonomy_from_repo() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../data/medical_hierarchy.json")
            .canonicalize()
            .expect("sample taxonomy should exist");
        let tree = FileTaxonomyRepository::new(path)
            .load()
            .expect("sample taxonomy should parse");
        let index = flat_index(&tree).expect("sample taxonomy codes should be unique");
        assert!(index.contains_key(&1200), "sample should provide General Medicine");
        assert!(index.contains_key(&6100), "sample should provide Radiology");
        assert!(index.contains_key(&4100), "sample should provide Psychiatry");
    }

    fn label() -> impl Strategy<Value = String> {
        proptest::string::string_regex("[A-Za-z][A-Za-z \\-]{2,30}").unwrap()
    }

    proptest! {
        #[test]
        fn persisted_tree_round_trips(
            entries in proptest::collection::vec(
                (1u32..9, 1u32..9, 0u32..99, label()),
                1..16
            )
        ) {
            let temp = tempfile::tempdir().unwrap();
            let repo = FileTaxonomyRepository::new(temp.path().join("hierarchy.json"));
            let mut tree = TaxonomyTree::new();
            for (category, specialty, offset, name) in &entries {
                let code = category * 1000 + specialty * 100 + offset + 1;
                let placement = Placement {
                    category_id: category.to_string(),
                    category_name: Some(format!("Category {category}")),
                    specialty_id: format!("{category}{specialty}"),
                    specialty_name: Some(format!("Specialty {category}{specialty}")),
                };
                insert_code(&mut tree, code, name, &placement).unwrap();
            }
            repo.persist(&tree).unwrap();
            let reloaded = repo.load().unwrap();
            prop_assert_eq!(
                flat_index(&reloaded).unwrap().into_iter().collect::<Vec<_>>(),
                flat_index(&tree).unwrap().into_iter().collect::<Vec<_>>()
            );
            prop_assert_eq!(reloaded, tree);
        }
    }
}
