use contracts::shared::form_state::FormSchema;
use serde::Deserialize;
use wasm_bindgen::JsCast;

#[derive(Debug, Deserialize, Clone)]
pub struct FichaConfig {
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub steps: FormSchema,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    /// Name of the single storage slot holding the envelope.
    pub storage_key: String,
    pub version: String,
    pub max_age_hours: i64,
    /// Serialized envelope size above which blank entries are compacted away.
    pub max_bytes: usize,
    /// Minimum interval between two throttled captures.
    pub capture_interval_ms: i64,
    pub navigation_cooldown_ms: i64,
    /// Locks older than this are considered abandoned.
    pub lock_timeout_ms: i64,
    pub max_rows_per_group: usize,
}

impl PersistenceConfig {
    pub fn max_age_ms(&self) -> i64 {
        self.max_age_hours * 60 * 60 * 1000
    }
}

/// Id of the page element that may carry a TOML override.
pub const CONFIG_ELEMENT_ID: &str = "ficha-config";

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[persistence]
storage_key = "ficha_previdenciaria_state"
version = "2.0"
max_age_hours = 24
max_bytes = 5242880
capture_interval_ms = 300
navigation_cooldown_ms = 500
lock_timeout_ms = 5000
max_rows_per_group = 50

[[steps.personal.row_groups]]
id = "autores"
fields = ["autor_nome", "autor_cpf", "autor_data_nascimento", "autor_parentesco"]
row_selector = ".autor-row"

[[steps.social.row_groups]]
id = "familiares"
fields = ["familiar_nome", "familiar_parentesco", "familiar_idade", "familiar_renda", "familiar_cpf"]
row_selector = ".familiar-row"

[[steps.incapacity.row_groups]]
id = "doencas"
fields = ["doenca_cid", "doenca_nome", "doenca_data_inicio"]
row_selector = ".doenca-row"

[[steps.professional.row_groups]]
id = "atividades"
fields = ["atividade_tipo", "atividade_local", "atividade_inicio", "atividade_fim", "atividade_segurado"]
row_selector = ".atividade-row"

[steps.documents]
external = ["documentos_json"]

[[steps.documents.row_groups]]
id = "documentos"
fields = ["documento_nome", "documento_tipo", "documento_observacao"]
row_selector = ".documento-row"
seed_field = "documentos_anexados"
"#;

/// Parse configuration. A non-blank override document replaces the embedded
/// default entirely.
pub fn load_config(override_toml: Option<&str>) -> anyhow::Result<FichaConfig> {
    match override_toml {
        Some(text) if !text.trim().is_empty() => {
            log::info!("Loading form config from page override");
            Ok(toml::from_str(text)?)
        }
        _ => default_config(),
    }
}

pub fn default_config() -> anyhow::Result<FichaConfig> {
    log::info!("Using default embedded form configuration");
    Ok(toml::from_str(DEFAULT_CONFIG)?)
}

/// Configuration for the running page: the `<script id="ficha-config">`
/// override when present and valid, the embedded default otherwise.
pub fn config_from_document() -> anyhow::Result<FichaConfig> {
    let override_text = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(CONFIG_ELEMENT_ID))
        .and_then(|el| el.dyn_into::<web_sys::HtmlScriptElement>().ok())
        .and_then(|script| script.text().ok());

    match load_config(override_text.as_deref()) {
        Ok(config) => Ok(config),
        Err(err) => {
            log::warn!("Invalid page config override ({}), using default", err);
            default_config()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::shared::form_state::StepId;

    #[test]
    fn test_default_config_loads() {
        let config = default_config().unwrap();
        assert_eq!(config.persistence.storage_key, "ficha_previdenciaria_state");
        assert_eq!(config.persistence.max_age_ms(), 86_400_000);
        assert_eq!(config.persistence.max_bytes, 5 * 1024 * 1024);
        for step in StepId::ALL {
            assert_eq!(config.steps.row_groups(step).len(), 1, "{step}");
        }
        let docs = config.steps.group(StepId::Documents, "documentos").unwrap();
        assert_eq!(docs.seed_field.as_deref(), Some("documentos_anexados"));
        assert!(config.steps.is_external(StepId::Documents, "documentos_anexados"));
        assert!(config.steps.is_external(StepId::Documents, "documentos_json"));
    }

    #[test]
    fn test_override_replaces_default() {
        let config = load_config(Some(
            r#"
            [persistence]
            storage_key = "other"
            version = "3"
            max_age_hours = 1
            max_bytes = 1000
            capture_interval_ms = 0
            navigation_cooldown_ms = 0
            lock_timeout_ms = 10
            max_rows_per_group = 3
            "#,
        ))
        .unwrap();
        assert_eq!(config.persistence.storage_key, "other");
        assert!(config.steps.row_groups(StepId::Personal).is_empty());
    }

    #[test]
    fn test_blank_override_falls_back() {
        let config = load_config(Some("   ")).unwrap();
        assert_eq!(config.persistence.version, "2.0");
    }

    #[test]
    fn test_unknown_step_table_is_an_error() {
        let err = load_config(Some(
            r#"
            [persistence]
            storage_key = "x"
            version = "1"
            max_age_hours = 1
            max_bytes = 1
            capture_interval_ms = 0
            navigation_cooldown_ms = 0
            lock_timeout_ms = 0
            max_rows_per_group = 1

            [steps.review]
            "#,
        ));
        assert!(err.is_err());
    }
}
