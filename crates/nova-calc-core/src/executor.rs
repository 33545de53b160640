use crate::services::favorites::FavoriteStore;

/// The action to perform when a result is executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionAction {
    /// Copy text to clipboard with notification
    CopyToClipboard {
        content: String,
        notification: String,
    },

    /// Remember the expression and its result
    AddToFavorite { expression: String, result: String },
}

/// Clipboard write capability supplied by the host
pub trait ClipboardAccess {
    fn set_text(&mut self, text: &str) -> Result<(), String>;
}

impl ExecutionAction {
    /// Short label for menus
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionAction::CopyToClipboard { .. } => "Copy",
            ExecutionAction::AddToFavorite { .. } => "Add to favorites",
        }
    }

    /// Run the action, returning the notification text to show
    pub fn execute(
        &self,
        clipboard: &mut dyn ClipboardAccess,
        favorites: &mut FavoriteStore,
    ) -> Result<String, String> {
        match self {
            ExecutionAction::CopyToClipboard {
                content,
                notification,
            } => {
                clipboard.set_text(content)?;
                Ok(notification.clone())
            }
            ExecutionAction::AddToFavorite { expression, result } => {
                favorites.add(expression, result);
                favorites.save()?;
                Ok(format!("Saved {} = {}", expression, result))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Default)]
    struct MemoryClipboard {
        text: Option<String>,
    }

    impl ClipboardAccess for MemoryClipboard {
        fn set_text(&mut self, text: &str) -> Result<(), String> {
            self.text = Some(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_copy_action() {
        let dir = tempdir().unwrap();
        let mut favorites = FavoriteStore::load(dir.path().join("favorites.json"));
        let mut clipboard = MemoryClipboard::default();

        let action = ExecutionAction::CopyToClipboard {
            content: "€80.00".to_string(),
            notification: "100usd in eur = €80.00".to_string(),
        };
        let shown = action.execute(&mut clipboard, &mut favorites).unwrap();

        assert_eq!(clipboard.text.as_deref(), Some("€80.00"));
        assert_eq!(shown, "100usd in eur = €80.00");
        assert!(favorites.is_empty());
    }

    #[test]
    fn test_favorite_action_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("favorites.json");
        let mut favorites = FavoriteStore::load(&path);
        let mut clipboard = MemoryClipboard::default();

        let action = ExecutionAction::AddToFavorite {
            expression: "1+2*3".to_string(),
            result: "9".to_string(),
        };
        action.execute(&mut clipboard, &mut favorites).unwrap();

        assert!(clipboard.text.is_none());
        assert_eq!(FavoriteStore::load(&path).len(), 1);
    }
}
