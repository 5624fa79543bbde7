//! Bot state file
//!
//! A JSON document shaped like
//! `{"positions": {"DOGE/USD": {"qty": 40.0, "entry_price": 0.25}}}`, written with
//! four-space indentation. Loading never fails: a missing or unreadable file is
//! treated as "no positions" so a fresh bot can always start.

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("State file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State file {0} does not contain a JSON object")]
    NotAnObject(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatePosition {
    pub qty: f64,
    pub entry_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InvestedAsset {
    pub qty: f64,
    pub price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotState {
    #[serde(default)]
    pub positions: BTreeMap<String, StatePosition>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub invested_assets: BTreeMap<String, InvestedAsset>,
}

impl BotState {
    pub fn holds(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.invested_assets.is_empty()
    }
}

/// Load/save a `BotState` at a fixed path
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> BotState {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "State file {} not found, starting with an empty state",
                    self.path.display()
                );
                return BotState::default();
            }
            Err(e) => {
                error!("Failed to read state file {}: {}", self.path.display(), e);
                return BotState::default();
            }
        };

        match serde_json::from_str::<BotState>(&raw) {
            Ok(state) => {
                debug!(
                    "Loaded state from {} ({} positions)",
                    self.path.display(),
                    state.positions.len()
                );
                state
            }
            Err(e) => {
                error!(
                    "State file {} is corrupt ({}), starting with an empty state",
                    self.path.display(),
                    e
                );
                BotState::default()
            }
        }
    }

    pub fn save(&self, state: &BotState) -> Result<(), StateError> {
        write_pretty(&self.path, state)?;
        debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

/// Merge `entries` into the top-level object stored at `path`
///
/// Existing keys not in `entries` are kept. A missing or corrupt file starts from `{}`.
pub fn merge_into_state_file(path: &Path, entries: Map<String, Value>) -> Result<(), StateError> {
    let mut document = match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(
                    "{} does not hold a JSON object, replacing it",
                    path.display()
                );
                Map::new()
            }
            Err(e) => {
                warn!("{} is corrupt ({}), replacing it", path.display(), e);
                Map::new()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
        Err(e) => return Err(StateError::Io(e)),
    };

    document.extend(entries);
    write_pretty(path, &Value::Object(document))
}

/// Read back a file written by `merge_into_state_file`
pub fn read_state_object(path: &Path) -> Result<Map<String, Value>, StateError> {
    let raw = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(StateError::NotAnObject(path.display().to_string())),
    }
}

fn write_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, buffer)?;
    Ok(())
}
