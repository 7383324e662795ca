//! Scalar application preferences, stored next to the session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::StoreError,
    session::{KeyValueStore, Versioned, get_versioned, set_serialized},
};

pub const PREFERENCES_KEY: &str = "preferences";
pub const PREFERENCES_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabLayout {
    #[default]
    Horizontal,
    Vertical,
}

/// Every field defaults when absent, so older files keep loading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub version: u32,
    pub theme: Theme,
    pub language: String,
    pub tab_layout: TabLayout,
    pub global_variables: BTreeMap<String, String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            theme: Theme::default(),
            language: "en".to_owned(),
            tab_layout: TabLayout::default(),
            global_variables: BTreeMap::new(),
        }
    }
}

impl Versioned for Preferences {
    fn version(&self) -> u32 {
        self.version
    }
}

impl Preferences {
    /// Stored preferences, or defaults when absent or unreadable.
    #[must_use]
    pub fn load(store: &dyn KeyValueStore) -> Self {
        match get_versioned::<Self>(store, PREFERENCES_KEY, PREFERENCES_VERSION) {
            Ok(prefs) => prefs.unwrap_or_default(),
            Err(err) => {
                warn!("using default preferences: {err}");
                Self::default()
            }
        }
    }

    /// Adds or replaces a global variable. The name is trimmed; an empty name
    /// is refused and returns `false`.
    pub fn set_variable(&mut self, name: &str, value: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.global_variables
            .insert(name.to_owned(), value.to_owned());
        true
    }

    /// Removes a global variable, returning its value.
    pub fn remove_variable(&mut self, name: &str) -> Option<String> {
        self.global_variables.remove(name.trim())
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        let current = Self {
            version: PREFERENCES_VERSION,
            ..self.clone()
        };
        set_serialized(store, PREFERENCES_KEY, &current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStore;

    #[test]
    fn defaults_when_absent() {
        let store = MemoryStore::default();
        assert_eq!(Preferences::load(&store), Preferences::default());
    }

    #[test]
    fn round_trip() {
        let store = MemoryStore::default();
        let mut prefs = Preferences {
            theme: Theme::Dark,
            tab_layout: TabLayout::Vertical,
            language: "ja".to_owned(),
            ..Preferences::default()
        };
        prefs
            .global_variables
            .insert("author".to_owned(), "Hippo".to_owned());

        assert!(prefs.save(&store).is_ok());
        assert_eq!(Preferences::load(&store), prefs);
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let store = MemoryStore::default();
        store.set(PREFERENCES_KEY, "theme = \"dark\"\n").ok();
        let prefs = Preferences::load(&store);
        assert_eq!(prefs.theme, Theme::Dark);
        assert_eq!(prefs.language, "en");
        assert_eq!(prefs.version, PREFERENCES_VERSION);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let store = MemoryStore::default();
        store.set(PREFERENCES_KEY, "theme = 12\n").ok();
        assert_eq!(Preferences::load(&store), Preferences::default());
    }

    #[test]
    fn variables_are_set_trimmed_and_removed() {
        let mut prefs = Preferences::default();
        assert!(prefs.set_variable(" author ", "Hippo"));
        assert!(prefs.set_variable("author", "Otter"), "existing names are replaced");
        assert!(!prefs.set_variable("   ", "ignored"));
        assert_eq!(
            prefs.global_variables.get("author").map(String::as_str),
            Some("Otter")
        );
        assert_eq!(prefs.global_variables.len(), 1);

        assert_eq!(prefs.remove_variable("author ").as_deref(), Some("Otter"));
        assert_eq!(prefs.remove_variable("author"), None);
        assert!(prefs.global_variables.is_empty());
    }

    #[test]
    fn theme_toggles() {
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
    }
}
