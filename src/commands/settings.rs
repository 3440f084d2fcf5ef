use crate::providers::{self, ProviderId, ProviderInfo, ProviderRegistry};
use crate::settings::{ExtractionConfiguration, SettingKey, SettingsStore};
use serde_json::Value;

fn parse_provider(provider_id: &str) -> Result<ProviderId, String> {
    ProviderId::parse(provider_id).ok_or_else(|| format!("Unknown provider: {}", provider_id))
}

fn save(store: &dyn SettingsStore, config: &ExtractionConfiguration) -> Result<(), String> {
    config
        .save(store)
        .map_err(|e| format!("Failed to save settings: {:#}", e))
}

pub fn get_extraction_config(store: &dyn SettingsStore) -> ExtractionConfiguration {
    ExtractionConfiguration::load(store)
}

pub fn save_extraction_config(
    store: &dyn SettingsStore,
    config: ExtractionConfiguration,
) -> Result<(), String> {
    save(store, &config)
}

/// Updates one setting by key name. Values that do not fit the setting are
/// rejected instead of being stored.
pub fn set_setting(store: &dyn SettingsStore, key: &str, value: Value) -> Result<(), String> {
    let key = SettingKey::parse(key).ok_or_else(|| format!("Unknown setting: {}", key))?;

    let mut config = ExtractionConfiguration::load(store);
    if !config.apply(key, value) {
        return Err(format!("Invalid value for setting '{}'", key));
    }
    save(store, &config)
}

pub fn set_provider(store: &dyn SettingsStore, provider_id: String) -> Result<(), String> {
    let mut config = ExtractionConfiguration::load(store);
    config.provider = parse_provider(&provider_id)?;
    save(store, &config)
}

pub fn set_api_key(
    store: &dyn SettingsStore,
    provider_id: String,
    api_key: String,
) -> Result<(), String> {
    let provider = parse_provider(&provider_id)?;
    let mut config = ExtractionConfiguration::load(store);
    config
        .api_keys
        .insert(provider.as_str().to_string(), api_key.trim().to_string());
    save(store, &config)
}

pub fn set_model(
    store: &dyn SettingsStore,
    provider_id: String,
    model_id: String,
) -> Result<(), String> {
    let provider = parse_provider(&provider_id)?;
    let mut config = ExtractionConfiguration::load(store);
    config
        .selected_models
        .insert(provider.as_str().to_string(), model_id);
    save(store, &config)
}

pub fn reset_all_settings(store: &dyn SettingsStore) -> Result<ExtractionConfiguration, String> {
    ExtractionConfiguration::reset_to_defaults(store)
        .map_err(|e| format!("Failed to reset settings: {:#}", e))
}

pub fn get_providers() -> Vec<ProviderInfo> {
    providers::get_available_providers()
}

/// Uses the configured request timeout. Errors read "<title>: <message>".
pub async fn test_provider_connection(
    store: &dyn SettingsStore,
    registry: &ProviderRegistry,
    provider_id: String,
    api_key: String,
) -> Result<bool, String> {
    let provider = parse_provider(&provider_id)?;
    let timeout = ExtractionConfiguration::load(store).request_timeout();

    registry
        .test_connection(provider, &api_key, timeout)
        .await
        .map(|()| true)
        .map_err(|e| {
            let notice = e.notice();
            format!("{}: {}", notice.title, notice.message)
        })
}
