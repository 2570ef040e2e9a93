//! LLM service registry: built-in providers, user-added services and the
//! single active selection.
//!
//! Services live inside [`AppSettings`] so that one persisted record holds the
//! whole configuration. The operations here keep two invariants:
//!
//! * exactly one service carries `is_active = true` once a registry has been
//!   reconciled, and it is the one named by `active_service_id`;
//! * built-in services cannot be removed, and their name/URL/model list
//!   always come from [`builtin_services`], never from storage.
//!
//! ## Merge on load
//!
//! [`merge_builtin_services`] rebuilds the registry from the current built-in
//! table, carrying over `api_key`, `is_active` and, while the table still
//! lists it, `default_model` from the persisted copy, then appends every
//! persisted service whose id is not built in. A
//! new release that changes a provider's base URL therefore takes effect
//! immediately while user credentials and custom services survive.

use crate::error::Pdf2MdError;
use crate::settings::AppSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Id used when no other service can become active.
pub const FALLBACK_SERVICE_ID: &str = "openai";

/// Wire format spoken by a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// OpenAI chat-completions.
    #[serde(alias = "openai-compatible")]
    OpenAi,
    /// Google Gemini `generateContent`.
    Gemini,
    /// User-defined endpoint; speaks the OpenAI format.
    Custom,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::OpenAi => "openai",
            ServiceKind::Gemini => "gemini",
            ServiceKind::Custom => "custom",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One configured LLM provider profile.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmService {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub default_model: String,
    #[serde(default)]
    pub is_built_in: bool,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
}

impl fmt::Debug for LlmService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmService")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("models", &self.models)
            .field("default_model", &self.default_model)
            .field("is_built_in", &self.is_built_in)
            .field("is_active", &self.is_active)
            .finish()
    }
}

impl LlmService {
    /// Whether a non-blank API key is configured.
    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Base URL without trailing slashes, ready for path concatenation.
    pub fn endpoint_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

fn builtin(
    id: &str,
    name: &str,
    kind: ServiceKind,
    base_url: &str,
    models: &[&str],
    description: &str,
) -> LlmService {
    LlmService {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        base_url: base_url.to_string(),
        api_key: String::new(),
        models: models.iter().map(|m| m.to_string()).collect(),
        default_model: models[0].to_string(),
        is_built_in: true,
        is_active: id == FALLBACK_SERVICE_ID,
        description: Some(description.to_string()),
        icon_path: Some(format!("icons/{id}.svg")),
    }
}

/// The current built-in service table.
pub fn builtin_services() -> Vec<LlmService> {
    vec![
        builtin(
            "openai",
            "OpenAI",
            ServiceKind::OpenAi,
            "https://api.openai.com/v1",
            &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini"],
            "OpenAI chat-completions with vision models",
        ),
        builtin(
            "gemini",
            "Google Gemini",
            ServiceKind::Gemini,
            "https://generativelanguage.googleapis.com",
            &["gemini-2.5-flash", "gemini-2.5-pro", "gemini-2.0-flash"],
            "Google Gemini generateContent API",
        ),
        builtin(
            "openrouter",
            "OpenRouter",
            ServiceKind::OpenAi,
            "https://openrouter.ai/api/v1",
            &[
                "openai/gpt-4o",
                "anthropic/claude-sonnet-4",
                "google/gemini-2.5-pro",
            ],
            "OpenAI-compatible gateway to many vision models",
        ),
    ]
}

/// Rebuild a persisted service list against the current built-in table.
pub fn merge_builtin_services(persisted: Vec<LlmService>) -> Vec<LlmService> {
    let builtins = builtin_services();

    let mut merged: Vec<LlmService> = builtins
        .iter()
        .map(|current| match persisted.iter().find(|p| p.id == current.id) {
            Some(stored) => LlmService {
                api_key: stored.api_key.clone(),
                is_active: stored.is_active,
                default_model: if current.models.contains(&stored.default_model) {
                    stored.default_model.clone()
                } else {
                    current.default_model.clone()
                },
                ..current.clone()
            },
            None => current.clone(),
        })
        .collect();

    merged.extend(
        persisted
            .into_iter()
            .filter(|p| !builtins.iter().any(|b| b.id == p.id)),
    );
    merged
}

/// Fields for a new user-defined service.
#[derive(Debug, Clone, Default)]
pub struct ServiceDraft {
    pub name: String,
    pub kind: Option<ServiceKind>,
    pub base_url: String,
    pub api_key: String,
    pub models: Vec<String>,
    pub default_model: Option<String>,
    pub description: Option<String>,
}

/// Partial update to an existing service; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ServicePatch {
    pub name: Option<String>,
    pub kind: Option<ServiceKind>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub models: Option<Vec<String>>,
    pub default_model: Option<String>,
    pub description: Option<String>,
}

impl ServicePatch {
    fn touches_builtin_metadata(&self) -> bool {
        self.name.is_some()
            || self.kind.is_some()
            || self.base_url.is_some()
            || self.models.is_some()
            || self.description.is_some()
    }
}

impl AppSettings {
    /// The service named by `active_service_id`, if it exists.
    pub fn active_service(&self) -> Option<&LlmService> {
        self.service(&self.active_service_id)
    }

    pub fn service(&self, id: &str) -> Option<&LlmService> {
        self.services.iter().find(|s| s.id == id)
    }

    /// Make `id` the active service and select its default model.
    pub fn switch_active_service(&mut self, id: &str) -> Result<(), Pdf2MdError> {
        let default_model = self
            .service(id)
            .map(|s| s.default_model.clone())
            .ok_or_else(|| Pdf2MdError::ServiceNotFound { id: id.to_string() })?;

        self.active_service_id = id.to_string();
        self.mirror_active_flags();
        self.current_model = default_model;
        info!("Active service → {} ({})", id, self.current_model);
        Ok(())
    }

    /// Register a user-defined service and return its fresh id.
    pub fn add_custom_service(&mut self, draft: ServiceDraft) -> Result<String, Pdf2MdError> {
        if draft.name.trim().is_empty() {
            return Err(Pdf2MdError::InvalidConfig("service name is required".into()));
        }
        if draft.base_url.trim().is_empty() {
            return Err(Pdf2MdError::InvalidConfig("service base URL is required".into()));
        }

        let id = format!("custom-{}", uuid::Uuid::new_v4());
        let default_model = draft
            .default_model
            .filter(|m| !m.trim().is_empty())
            .or_else(|| draft.models.first().cloned())
            .unwrap_or_default();

        self.services.push(LlmService {
            id: id.clone(),
            name: draft.name.trim().to_string(),
            kind: draft.kind.unwrap_or(ServiceKind::Custom),
            base_url: draft.base_url.trim().to_string(),
            api_key: draft.api_key,
            models: draft.models,
            default_model,
            is_built_in: false,
            is_active: false,
            description: draft.description,
            icon_path: None,
        });
        debug!("Added custom service {}", id);
        Ok(id)
    }

    /// Apply `patch` to service `id`.
    ///
    /// Built-in services only accept credential and default-model changes,
    /// and the default model must be one the built-in table lists; their
    /// other metadata is owned by [`builtin_services`].
    pub fn update_service(&mut self, id: &str, patch: ServicePatch) -> Result<(), Pdf2MdError> {
        let service = self
            .services
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Pdf2MdError::ServiceNotFound { id: id.to_string() })?;

        if service.is_built_in && patch.touches_builtin_metadata() {
            return Err(Pdf2MdError::BuiltInService {
                id: id.to_string(),
                reason: "only the API key and default model can be changed".into(),
            });
        }
        if let Some(model) = &patch.default_model {
            if service.is_built_in && !service.models.contains(model) {
                return Err(Pdf2MdError::BuiltInService {
                    id: id.to_string(),
                    reason: format!("default model must be one of: {}", service.models.join(", ")),
                });
            }
        }

        if let Some(name) = patch.name {
            service.name = name;
        }
        if let Some(kind) = patch.kind {
            service.kind = kind;
        }
        if let Some(url) = patch.base_url {
            service.base_url = url;
        }
        if let Some(key) = patch.api_key {
            service.api_key = key;
        }
        if let Some(models) = patch.models {
            service.models = models;
        }
        if let Some(model) = patch.default_model {
            service.default_model = model;
        }
        if let Some(description) = patch.description {
            service.description = Some(description);
        }
        Ok(())
    }

    /// Remove a custom service, re-electing an active service if needed.
    pub fn remove_service(&mut self, id: &str) -> Result<LlmService, Pdf2MdError> {
        let index = self
            .services
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Pdf2MdError::ServiceNotFound { id: id.to_string() })?;

        if self.services[index].is_built_in {
            return Err(Pdf2MdError::BuiltInService {
                id: id.to_string(),
                reason: "built-in services cannot be removed".into(),
            });
        }

        let removed = self.services.remove(index);
        if self.active_service_id == removed.id {
            self.active_service_id = self.fallback_active_id();
            self.mirror_active_flags();
            if let Some(model) = self.active_service().map(|s| s.default_model.clone()) {
                self.current_model = model;
            }
            info!("Removed active service {}; now {}", id, self.active_service_id);
        }
        Ok(removed)
    }

    /// Repair `active_service_id`, `is_active` flags and `current_model`
    /// after loading or bulk edits.
    pub fn reconcile_active(&mut self) {
        if self.active_service().is_none() {
            self.active_service_id = self.fallback_active_id();
        }
        self.mirror_active_flags();
        if self.current_model.trim().is_empty() {
            if let Some(model) = self.active_service().map(|s| s.default_model.clone()) {
                self.current_model = model;
            }
        }
    }

    fn fallback_active_id(&self) -> String {
        self.services
            .iter()
            .find(|s| s.is_active)
            .or_else(|| self.services.first())
            .map(|s| s.id.clone())
            .unwrap_or_else(|| FALLBACK_SERVICE_ID.to_string())
    }

    fn mirror_active_flags(&mut self) {
        let active = self.active_service_id.clone();
        for service in &mut self.services {
            service.is_active = service.id == active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> ServiceDraft {
        ServiceDraft {
            name: name.into(),
            base_url: "http://localhost:8000/v1".into(),
            models: vec!["qwen2.5-vl".into()],
            ..Default::default()
        }
    }

    fn active_count(s: &AppSettings) -> usize {
        s.services.iter().filter(|s| s.is_active).count()
    }

    #[test]
    fn builtin_table_has_unique_ids_and_defaults() {
        let table = builtin_services();
        for s in &table {
            assert!(s.is_built_in);
            assert!(s.models.contains(&s.default_model), "{}", s.id);
        }
        assert!(table.iter().any(|s| s.id == FALLBACK_SERVICE_ID));
        assert_eq!(table.iter().filter(|s| s.is_active).count(), 1);
    }

    #[test]
    fn switch_leaves_exactly_one_active_and_resets_model() {
        let mut s = AppSettings::default();
        s.current_model = "something-else".into();
        s.switch_active_service("gemini").unwrap();
        assert_eq!(active_count(&s), 1);
        assert_eq!(s.active_service().unwrap().id, "gemini");
        assert_eq!(s.current_model, "gemini-2.5-flash");
    }

    #[test]
    fn switch_to_unknown_service_fails() {
        let mut s = AppSettings::default();
        let err = s.switch_active_service("nope").unwrap_err();
        assert!(matches!(err, Pdf2MdError::ServiceNotFound { .. }));
        assert_eq!(s.active_service_id, FALLBACK_SERVICE_ID);
    }

    #[test]
    fn add_custom_assigns_fresh_id() {
        let mut s = AppSettings::default();
        let a = s.add_custom_service(draft("Local vLLM")).unwrap();
        let b = s.add_custom_service(draft("Other")).unwrap();
        assert_ne!(a, b);
        let svc = s.service(&a).unwrap();
        assert!(!svc.is_built_in);
        assert_eq!(svc.kind, ServiceKind::Custom);
        assert_eq!(svc.default_model, "qwen2.5-vl");
    }

    #[test]
    fn add_custom_requires_url() {
        let mut s = AppSettings::default();
        let mut d = draft("x");
        d.base_url = " ".into();
        assert!(s.add_custom_service(d).is_err());
    }

    #[test]
    fn builtin_accepts_key_but_not_url() {
        let mut s = AppSettings::default();
        s.update_service(
            "openai",
            ServicePatch {
                api_key: Some("sk-test".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(s.service("openai").unwrap().has_credential());

        let err = s
            .update_service(
                "openai",
                ServicePatch {
                    base_url: Some("http://evil".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Pdf2MdError::BuiltInService { .. }));
    }

    #[test]
    fn builtin_default_model_must_be_listed() {
        let mut s = AppSettings::default();
        let patch = |model: &str| ServicePatch {
            default_model: Some(model.into()),
            ..Default::default()
        };
        s.update_service("openai", patch("gpt-4.1")).unwrap();
        assert_eq!(s.service("openai").unwrap().default_model, "gpt-4.1");

        let err = s.update_service("openai", patch("made-up-model")).unwrap_err();
        assert!(matches!(err, Pdf2MdError::BuiltInService { .. }));
        assert_eq!(s.service("openai").unwrap().default_model, "gpt-4.1");
    }

    #[test]
    fn custom_service_is_fully_editable() {
        let mut s = AppSettings::default();
        let id = s.add_custom_service(draft("Local")).unwrap();
        s.update_service(
            &id,
            ServicePatch {
                name: Some("Renamed".into()),
                base_url: Some("http://10.0.0.2/v1".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let svc = s.service(&id).unwrap();
        assert_eq!(svc.name, "Renamed");
        assert_eq!(svc.endpoint_base(), "http://10.0.0.2/v1");
    }

    #[test]
    fn builtin_cannot_be_removed() {
        let mut s = AppSettings::default();
        assert!(s.remove_service("gemini").is_err());
        assert!(s.service("gemini").is_some());
    }

    #[test]
    fn removing_active_custom_falls_back_to_first_service() {
        let mut s = AppSettings::default();
        let id = s.add_custom_service(draft("Local")).unwrap();
        s.switch_active_service(&id).unwrap();
        s.remove_service(&id).unwrap();
        assert_eq!(s.active_service_id, "openai");
        assert_eq!(active_count(&s), 1);
        assert_eq!(s.current_model, "gpt-4o");
    }

    #[test]
    fn removing_active_prefers_another_flagged_service() {
        let mut s = AppSettings::default();
        let id = s.add_custom_service(draft("Local")).unwrap();
        s.active_service_id = id.clone();
        // Inconsistent flags as they might come out of an old record.
        for svc in &mut s.services {
            svc.is_active = svc.id == "gemini" || svc.id == id;
        }
        s.remove_service(&id).unwrap();
        assert_eq!(s.active_service_id, "gemini");
        assert_eq!(active_count(&s), 1);
    }

    #[test]
    fn removing_last_service_uses_fixed_fallback_id() {
        let mut s = AppSettings {
            services: Vec::new(),
            ..AppSettings::default()
        };
        let id = s.add_custom_service(draft("Only")).unwrap();
        s.switch_active_service(&id).unwrap();
        s.remove_service(&id).unwrap();
        assert_eq!(s.active_service_id, FALLBACK_SERVICE_ID);
    }

    #[test]
    fn merge_takes_metadata_from_table_and_key_from_storage() {
        let mut stale = builtin_services();
        stale[0].base_url = "https://old.example/v0".into();
        stale[0].models = vec!["gpt-3".into()];
        stale[0].api_key = "sk-kept".into();

        let merged = merge_builtin_services(stale);
        let openai = merged.iter().find(|s| s.id == "openai").unwrap();
        assert_eq!(openai.base_url, "https://api.openai.com/v1");
        assert_eq!(openai.api_key, "sk-kept");
        assert!(openai.models.contains(&"gpt-4o".to_string()));
    }

    #[test]
    fn merge_keeps_listed_default_model_only() {
        let mut stored = builtin_services();
        stored[0].default_model = "gpt-4.1-mini".into();
        stored[1].default_model = "gemini-1.0-retired".into();

        let merged = merge_builtin_services(stored);
        assert_eq!(merged[0].default_model, "gpt-4.1-mini");
        assert_eq!(merged[1].default_model, "gemini-2.5-flash");
    }

    #[test]
    fn merge_keeps_custom_services_verbatim() {
        let mut s = AppSettings::default();
        let id = s.add_custom_service(draft("Local")).unwrap();
        let custom = s.service(&id).unwrap().clone();

        let merged = merge_builtin_services(s.services.clone());
        assert_eq!(merged.len(), builtin_services().len() + 1);
        assert_eq!(merged.last().unwrap(), &custom);
    }

    #[test]
    fn merge_restores_missing_builtins() {
        let merged = merge_builtin_services(Vec::new());
        assert_eq!(merged, builtin_services());
    }

    #[test]
    fn service_kind_accepts_long_alias() {
        let kind: ServiceKind = serde_json::from_str("\"openai-compatible\"").unwrap();
        assert_eq!(kind, ServiceKind::OpenAi);
        assert_eq!(serde_json::to_string(&ServiceKind::OpenAi).unwrap(), "\"openai\"");
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut svc = builtin_services().remove(0);
        svc.api_key = "sk-secret".into();
        let dbg = format!("{svc:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
