use crate::entity::EntityCategory;
use crate::providers::{Credentials, ProviderId};
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::de::{self, DeserializeOwned, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

// Accepts both the numeric form (1-5) and the string form ("trace", "debug", etc.)
impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LogLevelVisitor;

        impl<'de> Visitor<'de> for LogLevelVisitor {
            type Value = LogLevel;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string or integer representing log level")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<LogLevel, E> {
                match value.to_lowercase().as_str() {
                    "trace" => Ok(LogLevel::Trace),
                    "debug" => Ok(LogLevel::Debug),
                    "info" => Ok(LogLevel::Info),
                    "warn" => Ok(LogLevel::Warn),
                    "error" => Ok(LogLevel::Error),
                    _ => Err(E::unknown_variant(
                        value,
                        &["trace", "debug", "info", "warn", "error"],
                    )),
                }
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<LogLevel, E> {
                match value {
                    1 => Ok(LogLevel::Trace),
                    2 => Ok(LogLevel::Debug),
                    3 => Ok(LogLevel::Info),
                    4 => Ok(LogLevel::Warn),
                    5 => Ok(LogLevel::Error),
                    _ => Err(E::invalid_value(de::Unexpected::Unsigned(value), &"1-5")),
                }
            }
        }

        deserializer.deserialize_any(LogLevelVisitor)
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayPosition {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

/// CSS-style offsets for the bubble container; `None` means `auto`.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub top: Option<u32>,
    pub bottom: Option<u32>,
    pub left: Option<u32>,
    pub right: Option<u32>,
}

impl DisplayPosition {
    pub fn placement(&self, offset: u32) -> Placement {
        let at = |cond: bool| cond.then_some(offset);
        let top = matches!(self, DisplayPosition::TopLeft | DisplayPosition::TopRight);
        let left = matches!(self, DisplayPosition::TopLeft | DisplayPosition::BottomLeft);

        Placement {
            top: at(top),
            bottom: at(!top),
            left: at(left),
            right: at(!left),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ColorSettings {
    #[serde(alias = "gradientStart")]
    pub gradient_start: String,
    #[serde(alias = "gradientEnd")]
    pub gradient_end: String,
    #[serde(alias = "textColor")]
    pub text_color: String,
}

impl ColorSettings {
    fn new(gradient_start: &str, gradient_end: &str, text_color: &str) -> Self {
        Self {
            gradient_start: gradient_start.to_string(),
            gradient_end: gradient_end.to_string(),
            text_color: text_color.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ColorScheme {
    pub person: ColorSettings,
    pub organization: ColorSettings,
    pub location: ColorSettings,
    #[serde(alias = "keyConcept")]
    pub key_concept: ColorSettings,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            person: ColorSettings::new("#e73c7e", "#23a6d5", "#FFFFFF"),
            organization: ColorSettings::new("#11998e", "#38ef7d", "#FFFFFF"),
            location: ColorSettings::new("#f12711", "#f5af19", "#FFFFFF"),
            key_concept: ColorSettings::new("#667eea", "#764ba2", "#FFFFFF"),
        }
    }
}

impl ColorScheme {
    pub fn for_category(&self, category: EntityCategory) -> &ColorSettings {
        match category {
            EntityCategory::Person => &self.person,
            EntityCategory::Organization => &self.organization,
            EntityCategory::Location => &self.location,
            EntityCategory::Concept => &self.key_concept,
        }
    }
}

/// Keys understood by the settings store. The string form is the field name
/// of [`ExtractionConfiguration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    ScrollThresholdPixels,
    MaxCharacters,
    MaxEntities,
    DisplayPosition,
    DisplayOffset,
    ColorScheme,
    ApiCredentials,
    ProviderSelection,
    SelectedModels,
    RequestTimeout,
    ReextractOnShow,
    LogLevel,
}

impl SettingKey {
    pub const ALL: [SettingKey; 12] = [
        SettingKey::ScrollThresholdPixels,
        SettingKey::MaxCharacters,
        SettingKey::MaxEntities,
        SettingKey::DisplayPosition,
        SettingKey::DisplayOffset,
        SettingKey::ColorScheme,
        SettingKey::ApiCredentials,
        SettingKey::ProviderSelection,
        SettingKey::SelectedModels,
        SettingKey::RequestTimeout,
        SettingKey::ReextractOnShow,
        SettingKey::LogLevel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::ScrollThresholdPixels => "scroll_threshold_pixels",
            SettingKey::MaxCharacters => "max_characters",
            SettingKey::MaxEntities => "max_entities",
            SettingKey::DisplayPosition => "display_position",
            SettingKey::DisplayOffset => "display_offset",
            SettingKey::ColorScheme => "color_scheme",
            SettingKey::ApiCredentials => "api_keys",
            SettingKey::ProviderSelection => "provider",
            SettingKey::SelectedModels => "selected_models",
            SettingKey::RequestTimeout => "request_timeout_secs",
            SettingKey::ReextractOnShow => "reextract_on_show",
            SettingKey::LogLevel => "log_level",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        SettingKey::ALL.into_iter().find(|key| key.as_str() == s)
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key-value persistence with change notification. Each notification carries
/// the keys whose stored value actually changed.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: SettingKey) -> Option<Value>;

    fn set_many(&self, entries: Vec<(SettingKey, Value)>) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<Vec<SettingKey>>;

    fn set(&self, key: SettingKey, value: Value) -> Result<()> {
        self.set_many(vec![(key, value)])
    }
}

const CHANGE_CHANNEL_CAPACITY: usize = 32;

/// JSON-backed store. With a path every write is persisted; without one it
/// lives in memory only.
pub struct JsonSettingsStore {
    path: Option<PathBuf>,
    data: RwLock<Map<String, Value>>,
    changes: broadcast::Sender<Vec<SettingKey>>,
}

impl JsonSettingsStore {
    pub fn in_memory() -> Self {
        Self::with_data(None, Map::new())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            read_map(&path)?
        } else {
            debug!("No settings file at {}, starting empty", path.display());
            Map::new()
        };
        Ok(Self::with_data(Some(path), data))
    }

    fn with_data(path: Option<PathBuf>, data: Map<String, Value>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path,
            data: RwLock::new(data),
            changes,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-reads the backing file and notifies about every key that differs.
    pub fn reload(&self) -> Result<Vec<SettingKey>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        let fresh = read_map(path)?;

        let changed: Vec<SettingKey> = {
            let mut guard = self.write_guard();
            let changed = SettingKey::ALL
                .into_iter()
                .filter(|key| guard.get(key.as_str()) != fresh.get(key.as_str()))
                .collect();
            *guard = fresh;
            changed
        };

        self.notify(&changed);
        Ok(changed)
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Map<String, Value>> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Map<String, Value>> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, data: &Map<String, Value>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    fn notify(&self, changed: &[SettingKey]) {
        if changed.is_empty() {
            return;
        }
        debug!("Settings changed: {:?}", changed);
        // No subscribers is fine.
        let _ = self.changes.send(changed.to_vec());
    }
}

fn read_map(path: &Path) -> Result<Map<String, Value>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) | Err(_) => {
            warn!(
                "Settings file {} is not a JSON object, ignoring its contents",
                path.display()
            );
            Ok(Map::new())
        }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get(&self, key: SettingKey) -> Option<Value> {
        self.read_guard().get(key.as_str()).cloned()
    }

    fn set_many(&self, entries: Vec<(SettingKey, Value)>) -> Result<()> {
        let changed = {
            let mut guard = self.write_guard();
            let mut updated = guard.clone();
            let mut changed = Vec::new();
            for (key, value) in entries {
                if updated.get(key.as_str()) != Some(&value) {
                    updated.insert(key.as_str().to_string(), value);
                    if !changed.contains(&key) {
                        changed.push(key);
                    }
                }
            }
            if changed.is_empty() {
                return Ok(());
            }
            // Memory only changes once the file write succeeded.
            self.persist(&updated)?;
            *guard = updated;
            changed
        };

        self.notify(&changed);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<SettingKey>> {
        self.changes.subscribe()
    }
}

/// All user-controlled parameters, always fully populated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExtractionConfiguration {
    #[serde(default = "default_scroll_threshold_pixels")]
    pub scroll_threshold_pixels: u32,
    #[serde(default = "default_max_characters")]
    pub max_characters: usize,
    #[serde(default = "default_max_entities")]
    pub max_entities: u32,
    #[serde(default)]
    pub display_position: DisplayPosition,
    #[serde(default = "default_display_offset")]
    pub display_offset: u32,
    #[serde(default)]
    pub color_scheme: ColorScheme,
    #[serde(default)]
    pub provider: ProviderId,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
    #[serde(default)]
    pub selected_models: HashMap<String, String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub reextract_on_show: bool,
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_scroll_threshold_pixels() -> u32 {
    1000
}

fn default_max_characters() -> usize {
    16000
}

fn default_max_entities() -> u32 {
    8
}

fn default_display_offset() -> u32 {
    20
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ExtractionConfiguration {
    fn default() -> Self {
        Self {
            scroll_threshold_pixels: default_scroll_threshold_pixels(),
            max_characters: default_max_characters(),
            max_entities: default_max_entities(),
            display_position: DisplayPosition::default(),
            display_offset: default_display_offset(),
            color_scheme: ColorScheme::default(),
            provider: ProviderId::default(),
            api_keys: HashMap::new(),
            selected_models: HashMap::new(),
            request_timeout_secs: default_request_timeout_secs(),
            reextract_on_show: false,
            log_level: LogLevel::default(),
        }
    }
}

fn decode<T: DeserializeOwned>(key: SettingKey, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!("Ignoring invalid value for setting '{}': {}", key, e);
            None
        }
    }
}

macro_rules! apply_field {
    ($target:expr, $key:expr, $value:expr) => {
        match decode($key, $value) {
            Some(decoded) => {
                $target = decoded;
                true
            }
            None => false,
        }
    };
}

impl ExtractionConfiguration {
    /// Reads every key once. Missing or malformed keys keep their default.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let mut config = Self::default();
        for key in SettingKey::ALL {
            if let Some(value) = store.get(key) {
                config.apply(key, value);
            }
        }
        config
    }

    pub fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        store.set_many(self.to_entries()?)
    }

    /// Restores defaults while keeping the provider choice, API keys and models.
    pub fn reset_to_defaults(store: &dyn SettingsStore) -> Result<Self> {
        let current = Self::load(store);
        let reset = Self {
            provider: current.provider,
            api_keys: current.api_keys,
            selected_models: current.selected_models,
            ..Self::default()
        };
        reset.save(store)?;
        Ok(reset)
    }

    /// Applies one stored value. Returns false if the value was rejected.
    pub fn apply(&mut self, key: SettingKey, value: Value) -> bool {
        let applied = match key {
            SettingKey::ScrollThresholdPixels => {
                apply_field!(self.scroll_threshold_pixels, key, value)
            }
            SettingKey::MaxCharacters => apply_field!(self.max_characters, key, value),
            SettingKey::MaxEntities => apply_field!(self.max_entities, key, value),
            SettingKey::DisplayPosition => apply_field!(self.display_position, key, value),
            SettingKey::DisplayOffset => apply_field!(self.display_offset, key, value),
            SettingKey::ColorScheme => apply_field!(self.color_scheme, key, value),
            SettingKey::ApiCredentials => apply_field!(self.api_keys, key, value),
            SettingKey::ProviderSelection => apply_field!(self.provider, key, value),
            SettingKey::SelectedModels => apply_field!(self.selected_models, key, value),
            SettingKey::RequestTimeout => apply_field!(self.request_timeout_secs, key, value),
            SettingKey::ReextractOnShow => apply_field!(self.reextract_on_show, key, value),
            SettingKey::LogLevel => apply_field!(self.log_level, key, value),
        };
        self.sanitize();
        applied
    }

    pub fn to_entries(&self) -> Result<Vec<(SettingKey, Value)>> {
        let Value::Object(mut map) = serde_json::to_value(self)? else {
            anyhow::bail!("configuration did not serialize to an object");
        };
        Ok(SettingKey::ALL
            .into_iter()
            .filter_map(|key| map.remove(key.as_str()).map(|value| (key, value)))
            .collect())
    }

    fn sanitize(&mut self) {
        self.max_characters = self.max_characters.max(1);
        self.max_entities = self.max_entities.max(1);
        self.request_timeout_secs = self.request_timeout_secs.max(1);
    }

    pub fn api_key(&self, provider: ProviderId) -> Option<&str> {
        self.api_keys
            .get(provider.as_str())
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.api_key(self.provider).unwrap_or_default())
    }

    pub fn model(&self, provider: ProviderId) -> &str {
        self.selected_models
            .get(provider.as_str())
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .unwrap_or(provider.default_model())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
