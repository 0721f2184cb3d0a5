use crate::catalog::Material;
use crate::storage::{LocalStorage, StorageError};

/// Storage slot holding the saved materials as a JSON array.
pub const BACKPACK_KEY: &str = "backpackItems";

/// Materials the user saved for later, persisted after every change.
pub struct Backpack {
    storage: LocalStorage,
    items: Vec<Material>,
}

impl Backpack {
    /// An unreadable slot starts an empty backpack rather than failing startup.
    pub fn load(storage: LocalStorage) -> Self {
        let items = match storage.get(BACKPACK_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "discarding unreadable backpack");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read backpack");
                Vec::new()
            }
        };

        Self { storage, items }
    }

    pub fn items(&self) -> &[Material] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|m| m.id == id)
    }

    /// Returns false if the material was already saved.
    pub fn add(&mut self, material: &Material) -> Result<bool, StorageError> {
        if self.contains(&material.id) {
            return Ok(false);
        }
        let mut items = self.items.clone();
        items.push(material.clone());
        self.persist(&items)?;
        self.items = items;
        Ok(true)
    }

    /// Returns false if nothing with that id was saved.
    pub fn remove(&mut self, id: &str) -> Result<bool, StorageError> {
        if !self.contains(id) {
            return Ok(false);
        }
        let items: Vec<Material> = self.items.iter().filter(|m| m.id != id).cloned().collect();
        self.persist(&items)?;
        self.items = items;
        Ok(true)
    }

    /// The in-memory list only changes once the write succeeded.
    fn persist(&self, items: &[Material]) -> Result<(), StorageError> {
        if items.is_empty() {
            return self.storage.remove(BACKPACK_KEY);
        }

        let raw = serde_json::to_string(items).map_err(|source| StorageError::Corrupt {
            path: self.storage.path().to_path_buf(),
            source,
        })?;
        self.storage.set(BACKPACK_KEY, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    #[test]
    fn add_remove_contains() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::builtin();
        let os = catalog.get("os-syllabus").unwrap();
        let mut backpack = Backpack::load(LocalStorage::open(dir.path().join("s.json")));

        assert!(backpack.add(os).unwrap());
        assert!(!backpack.add(os).unwrap());
        assert_eq!(backpack.len(), 1);
        assert!(backpack.contains("os-syllabus"));

        assert!(backpack.remove("os-syllabus").unwrap());
        assert!(!backpack.remove("os-syllabus").unwrap());
        assert!(backpack.is_empty());
    }

    #[test]
    fn persists_across_reload_and_clears_slot_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let catalog = Catalog::builtin();

        let mut backpack = Backpack::load(LocalStorage::open(&path));
        backpack.add(catalog.get("ds-qp-2023").unwrap()).unwrap();
        backpack.add(catalog.get("cn-notes-full").unwrap()).unwrap();

        let reloaded = Backpack::load(LocalStorage::open(&path));
        let ids: Vec<&str> = reloaded.items().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["ds-qp-2023", "cn-notes-full"]);

        backpack.remove("ds-qp-2023").unwrap();
        backpack.remove("cn-notes-full").unwrap();
        assert_eq!(LocalStorage::open(&path).get(BACKPACK_KEY).unwrap(), None);
    }

    #[test]
    fn failed_write_leaves_items_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let catalog = Catalog::builtin();
        let os = catalog.get("os-syllabus").unwrap();

        let mut backpack = Backpack::load(LocalStorage::open(&path));
        backpack.add(catalog.get("ds-qp-2023").unwrap()).unwrap();

        // A directory where the file should be makes every read and write fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(backpack.add(os).is_err());
        assert!(!backpack.contains("os-syllabus"));
        assert!(backpack.remove("ds-qp-2023").is_err());
        assert!(backpack.contains("ds-qp-2023"));

        // Once storage works again the same add goes through
        std::fs::remove_dir(&path).unwrap();
        assert!(backpack.add(os).unwrap());
        let reloaded = Backpack::load(LocalStorage::open(&path));
        assert!(reloaded.contains("os-syllabus"));
    }
}
