use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{Map, Value};

use crate::i18n::Language;
use crate::products::{seed_products, Product};

pub const CATALOG_KEY: &str = "halal_products";
pub const FAVORITES_KEY: &str = "halal_favorites";
pub const LANGUAGE_KEY: &str = "halal_lang";

/// Keyed persistence behind the three state slices.
pub trait PersistencePort {
    fn load(&mut self, key: &str) -> Option<Value>;
    fn save(&mut self, key: &str, value: Value) -> anyhow::Result<()>;
}

/// One JSON object on disk holding every slice.
///
/// Reads always refresh from disk. Writes merge only the keys this instance
/// changed, so two stores pointed at the same file keep each other's slices.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    payload: Option<Map<String, Value>>,
    dirty_keys: Vec<String>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            payload: None,
            dirty_keys: Vec::new(),
        }
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        if self.payload.is_none() || self.dirty_keys.is_empty() {
            return Ok(());
        }

        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        if let Some(payload) = &self.payload {
            for key in &self.dirty_keys {
                if let Some(value) = payload.get(key) {
                    on_disk.insert(key.clone(), value.clone());
                }
            }
        }
        write_json_object(&self.path, &on_disk)?;
        self.payload = Some(on_disk);
        self.dirty_keys.clear();
        Ok(())
    }

    fn refresh(&mut self) -> &mut Map<String, Value> {
        self.payload
            .insert(read_json_object(&self.path).unwrap_or_default())
    }
}

impl PersistencePort for JsonFileStore {
    fn load(&mut self, key: &str) -> Option<Value> {
        self.refresh().get(key).cloned()
    }

    fn save(&mut self, key: &str, value: Value) -> anyhow::Result<()> {
        let payload = self.refresh();
        if payload.get(key) == Some(&value) {
            return Ok(());
        }
        payload.insert(key.to_string(), value);
        if !self.dirty_keys.iter().any(|existing| existing == key) {
            self.dirty_keys.push(key.to_string());
        }
        self.flush()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot(mut self, key: &str, value: Value) -> Self {
        self.slots.insert(key.to_string(), value);
        self
    }

    pub fn slot(&self, key: &str) -> Option<&Value> {
        self.slots.get(key)
    }
}

impl PersistencePort for MemoryStore {
    fn load(&mut self, key: &str) -> Option<Value> {
        self.slots.get(key).cloned()
    }

    fn save(&mut self, key: &str, value: Value) -> anyhow::Result<()> {
        self.slots.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceOrigin {
    Stored,
    Missing,
    Recovered,
}

impl SliceOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Missing => "missing",
            Self::Recovered => "recovered",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub origin: SliceOrigin,
}

/// Typed access to the catalog, favorites and language slices.
///
/// Loads never fail: absent or corrupt slices fall back to their defaults.
/// Each slice is written independently.
#[derive(Debug)]
pub struct StateStore<P: PersistencePort> {
    port: P,
}

impl<P: PersistencePort> StateStore<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn load_catalog(&mut self) -> Loaded<Vec<Product>> {
        self.load_slice(CATALOG_KEY, seed_products, |value| {
            serde_json::from_value::<Vec<Product>>(value).ok()
        })
    }

    pub fn load_favorites(&mut self) -> Loaded<Vec<String>> {
        self.load_slice(FAVORITES_KEY, Vec::new, |value| {
            serde_json::from_value::<Vec<String>>(value).ok()
        })
    }

    pub fn load_language(&mut self) -> Loaded<Language> {
        self.load_slice(LANGUAGE_KEY, Language::default, |value| {
            value.as_str().and_then(|code| code.parse::<Language>().ok())
        })
    }

    pub fn save_catalog(&mut self, products: &[Product]) -> anyhow::Result<()> {
        let value = serde_json::to_value(products).context("catalog serialization failed")?;
        self.port.save(CATALOG_KEY, value)
    }

    pub fn save_favorites(&mut self, favorites: &[String]) -> anyhow::Result<()> {
        self.port.save(
            FAVORITES_KEY,
            Value::Array(favorites.iter().cloned().map(Value::String).collect()),
        )
    }

    pub fn save_language(&mut self, language: Language) -> anyhow::Result<()> {
        self.port
            .save(LANGUAGE_KEY, Value::String(language.code().to_string()))
    }

    fn load_slice<T>(
        &mut self,
        key: &str,
        default: impl FnOnce() -> T,
        decode: impl FnOnce(Value) -> Option<T>,
    ) -> Loaded<T> {
        let Some(raw) = self.port.load(key) else {
            return Loaded {
                value: default(),
                origin: SliceOrigin::Missing,
            };
        };
        match decode(raw) {
            Some(value) => Loaded {
                value,
                origin: SliceOrigin::Stored,
            },
            None => Loaded {
                value: default(),
                origin: SliceOrigin::Recovered,
            },
        }
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )
    .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
