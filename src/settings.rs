//! Persisted user settings and system-prompt presets.
//!
//! [`AppSettings`] is stored as one JSON record under [`SETTINGS_KEY`]. On
//! load the record is layered over the defaults (unknown fields ignored,
//! missing fields defaulted) and the service list is merged with the current
//! built-in table, see [`crate::services::merge_builtin_services`].
//!
//! Storage failures never stop the program: a record that cannot be read or
//! parsed yields the defaults, a failed save is logged and the in-memory
//! settings stay authoritative.

use crate::error::Pdf2MdError;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use crate::provider::GenerationSettings;
use crate::services::{builtin_services, merge_builtin_services, LlmService, FALLBACK_SERVICE_ID};
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key for the settings record.
pub const SETTINGS_KEY: &str = "pdf2md-settings";

pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// A named, reusable system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemPromptPreset {
    pub id: String,
    pub name: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

/// Everything the user can configure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub services: Vec<LlmService>,
    pub active_service_id: String,
    pub current_model: String,
    pub system_prompt: String,
    pub temperature: f32,
    /// Maximum output tokens requested from the provider.
    pub output_length: u32,
    pub system_prompt_presets: Vec<SystemPromptPreset>,
    /// Use SSE streaming for OpenAI-format services.
    pub stream: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        let services = builtin_services();
        let current_model = services
            .iter()
            .find(|s| s.id == FALLBACK_SERVICE_ID)
            .map(|s| s.default_model.clone())
            .unwrap_or_default();
        Self {
            services,
            active_service_id: FALLBACK_SERVICE_ID.to_string(),
            current_model,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.1,
            output_length: 8192,
            system_prompt_presets: Vec::new(),
            stream: true,
        }
    }
}

impl AppSettings {
    /// Rebuild settings read from storage: merge built-ins, clamp numeric
    /// fields and repair the active selection.
    pub fn from_persisted(mut persisted: AppSettings) -> Self {
        persisted.services = merge_builtin_services(std::mem::take(&mut persisted.services));
        persisted.set_temperature(persisted.temperature);
        persisted.set_output_length(persisted.output_length);
        if persisted.system_prompt.trim().is_empty() {
            persisted.system_prompt = DEFAULT_SYSTEM_PROMPT.to_string();
        }
        persisted.reconcile_active();
        persisted
    }

    /// Set the sampling temperature, clamped to 0–2.
    pub fn set_temperature(&mut self, temperature: f32) {
        self.temperature = if temperature.is_finite() {
            temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
        } else {
            0.1
        };
    }

    /// Set the output token budget; at least 1.
    pub fn set_output_length(&mut self, tokens: u32) {
        self.output_length = tokens.max(1);
    }

    /// Per-call generation parameters for `service`.
    ///
    /// Uses `current_model` when set, else the service's default model.
    pub fn generation_settings(&self, service: &LlmService) -> GenerationSettings {
        let model = if self.current_model.trim().is_empty() {
            service.default_model.clone()
        } else {
            self.current_model.clone()
        };
        GenerationSettings {
            model,
            temperature: self.temperature,
            output_length: self.output_length,
            stream: self.stream,
        }
    }

    // ── Presets ──────────────────────────────────────────────────────────

    pub fn preset(&self, id: &str) -> Option<&SystemPromptPreset> {
        self.system_prompt_presets.iter().find(|p| p.id == id)
    }

    /// Save `prompt` as a new preset and return its id.
    pub fn add_preset(&mut self, name: &str, prompt: &str) -> Result<String, Pdf2MdError> {
        if name.trim().is_empty() {
            return Err(Pdf2MdError::InvalidConfig("preset name is required".into()));
        }
        if prompt.trim().is_empty() {
            return Err(Pdf2MdError::InvalidConfig("preset prompt is empty".into()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.system_prompt_presets.push(SystemPromptPreset {
            id: id.clone(),
            name: name.trim().to_string(),
            prompt: prompt.to_string(),
            created_at: Utc::now(),
        });
        debug!("Added preset {} ({})", name, id);
        Ok(id)
    }

    pub fn update_preset(
        &mut self,
        id: &str,
        name: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<(), Pdf2MdError> {
        let preset = self
            .system_prompt_presets
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Pdf2MdError::PresetNotFound { id: id.to_string() })?;
        if let Some(name) = name {
            preset.name = name.trim().to_string();
        }
        if let Some(prompt) = prompt {
            preset.prompt = prompt.to_string();
        }
        Ok(())
    }

    pub fn remove_preset(&mut self, id: &str) -> Result<SystemPromptPreset, Pdf2MdError> {
        let index = self
            .system_prompt_presets
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Pdf2MdError::PresetNotFound { id: id.to_string() })?;
        Ok(self.system_prompt_presets.remove(index))
    }

    /// Copy a preset's prompt into the working system prompt.
    pub fn apply_preset(&mut self, id: &str) -> Result<(), Pdf2MdError> {
        let prompt = self
            .preset(id)
            .map(|p| p.prompt.clone())
            .ok_or_else(|| Pdf2MdError::PresetNotFound { id: id.to_string() })?;
        self.system_prompt = prompt;
        Ok(())
    }

    /// Restore the built-in system prompt.
    pub fn reset_system_prompt(&mut self) {
        self.system_prompt = DEFAULT_SYSTEM_PROMPT.to_string();
    }
}

/// Loads and saves [`AppSettings`] through a [`KeyValueStore`].
#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load settings, falling back to defaults on any storage problem.
    pub fn load(&self) -> AppSettings {
        let value = match self.store.get(SETTINGS_KEY) {
            Ok(Some(value)) => value,
            Ok(None) => return AppSettings::default(),
            Err(e) => {
                warn!("Could not read settings, using defaults: {}", e);
                return AppSettings::default();
            }
        };
        match serde_json::from_value::<AppSettings>(value) {
            Ok(persisted) => AppSettings::from_persisted(persisted),
            Err(e) => {
                warn!("Stored settings are unreadable, using defaults: {}", e);
                AppSettings::default()
            }
        }
    }

    /// Persist `settings`. Failures are logged, not returned.
    pub fn save(&self, settings: &AppSettings) {
        if let Err(e) = self.try_save(settings) {
            warn!("Could not save settings: {}", e);
        }
    }

    /// Persist `settings`, reporting failures to the caller.
    pub fn try_save(&self, settings: &AppSettings) -> Result<(), Pdf2MdError> {
        let value = serde_json::to_value(settings).map_err(|e| Pdf2MdError::Storage {
            key: SETTINGS_KEY.to_string(),
            detail: e.to_string(),
        })?;
        self.store.set(SETTINGS_KEY, &value)
    }

    /// Erase the stored record and return fresh defaults.
    pub fn reset(&self) -> AppSettings {
        if let Err(e) = self.store.remove(SETTINGS_KEY) {
            warn!("Could not erase settings: {}", e);
        }
        AppSettings::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServicePatch;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn store() -> (Arc<MemoryStore>, SettingsStore) {
        let mem = Arc::new(MemoryStore::new());
        let settings = SettingsStore::new(mem.clone());
        (mem, settings)
    }

    #[test]
    fn empty_store_loads_defaults() {
        let (_, s) = store();
        let settings = s.load();
        assert_eq!(settings, AppSettings::default());
        assert!(settings.stream);
        assert_eq!(settings.active_service().unwrap().id, "openai");
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_, s) = store();
        let mut settings = AppSettings::default();
        settings.switch_active_service("gemini").unwrap();
        settings.set_temperature(0.7);
        settings.add_preset("Tables", "Focus on tables").unwrap();
        s.save(&settings);

        assert_eq!(s.load(), settings);
    }

    #[test]
    fn builtin_default_model_survives_reload() {
        let (_, s) = store();
        let mut settings = AppSettings::default();
        settings
            .update_service(
                "openai",
                ServicePatch {
                    default_model: Some("gpt-4.1".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        s.try_save(&settings).unwrap();

        let reloaded = s.load();
        assert_eq!(reloaded.service("openai").unwrap().default_model, "gpt-4.1");
    }

    #[test]
    fn partial_record_is_layered_over_defaults() {
        let (mem, s) = store();
        mem.set(SETTINGS_KEY, &json!({ "temperature": 0.5, "legacyField": 1 }))
            .unwrap();
        let settings = s.load();
        assert_eq!(settings.temperature, 0.5);
        assert_eq!(settings.output_length, 8192);
        assert_eq!(settings.services, builtin_services());
    }

    #[test]
    fn corrupt_record_falls_back_to_defaults() {
        let (mem, s) = store();
        mem.set(SETTINGS_KEY, &json!({ "services": "not a list" })).unwrap();
        assert_eq!(s.load(), AppSettings::default());
    }

    #[test]
    fn load_clamps_out_of_range_numbers() {
        let (mem, s) = store();
        mem.set(SETTINGS_KEY, &json!({ "temperature": 9.0, "outputLength": 0 }))
            .unwrap();
        let settings = s.load();
        assert_eq!(settings.temperature, MAX_TEMPERATURE);
        assert_eq!(settings.output_length, 1);
    }

    #[test]
    fn unknown_active_id_is_repaired() {
        let (mem, s) = store();
        mem.set(SETTINGS_KEY, &json!({ "activeServiceId": "gone", "currentModel": "" }))
            .unwrap();
        let settings = s.load();
        assert_eq!(settings.active_service_id, "openai");
        assert_eq!(settings.current_model, "gpt-4o");
        assert_eq!(settings.services.iter().filter(|s| s.is_active).count(), 1);
    }

    #[test]
    fn reset_erases_record() {
        let (mem, s) = store();
        s.save(&AppSettings::default());
        assert!(mem.contains(SETTINGS_KEY));
        s.reset();
        assert!(!mem.contains(SETTINGS_KEY));
    }

    #[test]
    fn preset_lifecycle() {
        let mut settings = AppSettings::default();
        let id = settings.add_preset("Academic", "Keep citations").unwrap();
        settings.update_preset(&id, Some("Papers"), None).unwrap();
        assert_eq!(settings.preset(&id).unwrap().name, "Papers");

        settings.apply_preset(&id).unwrap();
        assert_eq!(settings.system_prompt, "Keep citations");

        settings.reset_system_prompt();
        assert_eq!(settings.system_prompt, DEFAULT_SYSTEM_PROMPT);

        settings.remove_preset(&id).unwrap();
        assert!(matches!(
            settings.apply_preset(&id),
            Err(Pdf2MdError::PresetNotFound { .. })
        ));
    }

    #[test]
    fn empty_preset_is_rejected() {
        let mut settings = AppSettings::default();
        assert!(settings.add_preset("", "x").is_err());
        assert!(settings.add_preset("x", "  ").is_err());
    }

    #[test]
    fn generation_settings_fall_back_to_service_default() {
        let mut settings = AppSettings::default();
        settings.current_model.clear();
        let service = settings.active_service().unwrap().clone();
        let generation = settings.generation_settings(&service);
        assert_eq!(generation.model, "gpt-4o");
        assert_eq!(generation.output_length, 8192);
        assert!(generation.stream);
    }

    #[test]
    fn non_finite_temperature_resets() {
        let mut settings = AppSettings::default();
        settings.set_temperature(f32::NAN);
        assert_eq!(settings.temperature, 0.1);
        settings.set_temperature(-1.0);
        assert_eq!(settings.temperature, 0.0);
    }
}
