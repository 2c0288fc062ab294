//! User preferences persisted next to the history ledger.
//!
//! Only the theme is stored today. Like the ledger it is read once at startup
//! and written through on every change.

use crate::error::StoreError;
use crate::store::{KvStore, THEME_KEY};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{other}' (expected light or dark)")),
        }
    }
}

/// Theme preference backed by a [`KvStore`].
pub struct Preferences {
    store: Arc<dyn KvStore>,
    theme: Mutex<Theme>,
}

impl Preferences {
    /// Read the stored theme. Missing or unrecognised values fall back to
    /// [`Theme::Dark`].
    pub fn load(store: Arc<dyn KvStore>) -> Result<Self, StoreError> {
        let theme = match store.get(THEME_KEY)? {
            Some(bytes) => {
                let raw = String::from_utf8_lossy(&bytes);
                raw.parse().unwrap_or_else(|e| {
                    warn!("Ignoring stored theme: {}", e);
                    Theme::default()
                })
            }
            None => Theme::default(),
        };
        Ok(Self {
            store,
            theme: Mutex::new(theme),
        })
    }

    pub fn theme(&self) -> Theme {
        *self.lock()
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), StoreError> {
        let mut current = self.lock();
        self.persist(&mut current, theme)
    }

    /// Flip between light and dark; returns the new theme.
    ///
    /// Read, flip and write happen under one guard, so concurrent toggles
    /// never collapse into one.
    pub fn toggle_theme(&self) -> Result<Theme, StoreError> {
        let mut current = self.lock();
        let next = current.toggled();
        self.persist(&mut current, next)?;
        Ok(next)
    }

    fn lock(&self) -> MutexGuard<'_, Theme> {
        self.theme.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, current: &mut Theme, theme: Theme) -> Result<(), StoreError> {
        self.store.put(THEME_KEY, theme.as_str().as_bytes())?;
        *current = theme;
        debug!("Theme set to {}", theme);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn defaults_to_dark() {
        let prefs = Preferences::load(Arc::new(MemoryStore::new())).unwrap();
        assert_eq!(prefs.theme(), Theme::Dark);
    }

    #[test]
    fn garbage_falls_back_to_dark() {
        let store = Arc::new(MemoryStore::new());
        store.put(THEME_KEY, b"solarized").unwrap();
        let prefs = Preferences::load(store).unwrap();
        assert_eq!(prefs.theme(), Theme::Dark);
    }

    #[test]
    fn set_and_toggle_write_through() {
        let store = Arc::new(MemoryStore::new());
        let prefs = Preferences::load(store.clone()).unwrap();

        prefs.set_theme(Theme::Light).unwrap();
        assert_eq!(store.get(THEME_KEY).unwrap(), Some(b"light".to_vec()));

        assert_eq!(prefs.toggle_theme().unwrap(), Theme::Dark);
        assert_eq!(store.get(THEME_KEY).unwrap(), Some(b"dark".to_vec()));

        let reloaded = Preferences::load(store).unwrap();
        assert_eq!(reloaded.theme(), Theme::Dark);
    }

    #[test]
    fn concurrent_toggles_all_count() {
        let store = Arc::new(MemoryStore::new());
        let prefs = Arc::new(Preferences::load(store.clone()).unwrap());

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let prefs = Arc::clone(&prefs);
                std::thread::spawn(move || prefs.toggle_theme().unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // An even number of flips lands back on the default.
        assert_eq!(prefs.theme(), Theme::Dark);
        assert_eq!(store.get(THEME_KEY).unwrap(), Some(b"dark".to_vec()));
    }
}
