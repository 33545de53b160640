use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A saved expression and the result it produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub expression: String,
    pub result: String,
    pub added_at: DateTime<Utc>,
}

/// Default location of the favorites file
pub fn default_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".local").join("share"))
                .unwrap_or_else(|| PathBuf::from("/tmp"))
        })
        .join("nova")
        .join("converter-favorites.json")
}

/// Favorites persisted as JSON, newest first, one entry per expression
pub struct FavoriteStore {
    path: PathBuf,
    items: Vec<Favorite>,
}

impl FavoriteStore {
    /// Load favorites from `path`; a missing or unreadable file starts empty
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let items = if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(items) => items,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to parse favorites");
                        Vec::new()
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read favorites");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Self { path, items }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn items(&self) -> &[Favorite] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add a favorite, replacing any entry with the same expression
    pub fn add(&mut self, expression: &str, result: &str) {
        let expression = expression.trim();
        // Remove if already exists (move to front)
        self.items.retain(|f| f.expression != expression);
        self.items.insert(
            0,
            Favorite {
                expression: expression.to_string(),
                result: result.to_string(),
                added_at: Utc::now(),
            },
        );
    }

    /// Returns true if an entry was removed
    pub fn remove(&mut self, expression: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|f| f.expression != expression.trim());
        self.items.len() != before
    }

    pub fn save(&self) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create favorites directory: {}", e))?;
        }

        let content = serde_json::to_string_pretty(&self.items)
            .map_err(|e| format!("Failed to serialize favorites: {}", e))?;

        fs::write(&self.path, content).map_err(|e| format!("Failed to write favorites: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_add_deduplicates_by_expression() {
        let dir = tempdir().unwrap();
        let mut store = FavoriteStore::load(dir.path().join("favorites.json"));

        store.add("100 usd in eur", "€80.00");
        store.add("1 btc", "$50000.00");
        store.add(" 100 usd in eur ", "€81.00");

        assert_eq!(store.len(), 2);
        assert_eq!(store.items()[0].expression, "100 usd in eur");
        assert_eq!(store.items()[0].result, "€81.00");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nova").join("favorites.json");

        let mut store = FavoriteStore::load(&path);
        store.add("1h in min", "60 minutes");
        store.save().unwrap();

        let reloaded = FavoriteStore::load(&path);
        assert_eq!(reloaded.items(), store.items());
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let mut store = FavoriteStore::load(dir.path().join("favorites.json"));
        store.add("2+2", "4");

        assert!(store.remove("2+2"));
        assert!(!store.remove("2+2"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("favorites.json");
        fs::write(&path, "{not json").unwrap();

        assert!(FavoriteStore::load(&path).is_empty());
    }
}
