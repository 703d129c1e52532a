//! Prompt resolution: stored overrides first, tenant code defaults second.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use homeviz_shared::{HomeVizError, ProductOptions, PromptOverride, Result, Scope, StepType};
use homeviz_storage::Storage;
use homeviz_tenants::{Tenant, TenantProvider};

use crate::template::{self, PromptVars};

/// Option values every insertion prompt starts from; caller variables win.
pub const INSERTION_DEFAULTS: [(&str, &str); 2] = [("color", "Black"), ("mesh_type", "Standard")];

/// Resolves the effective prompt text for a tenant's pipeline step and
/// manages the override history behind it.
pub struct PromptService {
    tenants: Arc<dyn TenantProvider>,
    store: Arc<Storage>,
}

impl PromptService {
    pub fn new(tenants: Arc<dyn TenantProvider>, store: Arc<Storage>) -> Self {
        Self { tenants, store }
    }

    pub fn tenants(&self) -> &Arc<dyn TenantProvider> {
        &self.tenants
    }

    /// Effective prompt for `step_name`.
    ///
    /// An active override is formatted with `vars`; if it references a
    /// variable that was not supplied, the tenant code default is used
    /// instead. Overrides and code defaults are never merged.
    #[instrument(skip_all, fields(tenant = tenant_id, step = step_name))]
    pub async fn resolve(&self, step_name: &str, tenant_id: &str, vars: &PromptVars) -> Result<String> {
        let tenant = self.tenants.get_config(tenant_id)?;

        if let Some(active) = self.store.active_override(tenant.id(), step_name).await? {
            match template::render(&active.prompt_text, vars) {
                Ok(text) => {
                    info!(version = active.version, "using prompt override");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(
                        version = active.version,
                        error = %e,
                        "prompt override unusable, falling back to code default"
                    );
                }
            }
        }

        code_default(&tenant, step_name, vars)
    }

    /// Store `prompt_text` as the next, sole active version for the pair.
    pub async fn create_override(
        &self,
        tenant_id: &str,
        step_name: &str,
        prompt_text: &str,
        created_by: Option<&str>,
    ) -> Result<PromptOverride> {
        let tenant = self.tenants.get_config(tenant_id)?;
        if tenant.config.step_config(step_name).is_none() {
            return Err(HomeVizError::config(format!(
                "tenant '{tenant_id}' has no step '{step_name}'"
            )));
        }
        if prompt_text.trim().is_empty() {
            return Err(HomeVizError::validation("prompt text must not be empty"));
        }
        self.store
            .create_override(tenant_id, step_name, prompt_text, created_by)
            .await
    }

    /// Reactivate the previous version; `None` if there is none.
    pub async fn rollback(&self, tenant_id: &str, step_name: &str) -> Result<Option<PromptOverride>> {
        self.store.rollback_override(tenant_id, step_name).await
    }

    /// Active overrides across every step of a tenant.
    pub async fn active_overrides(&self, tenant_id: &str) -> Result<Vec<PromptOverride>> {
        self.tenants.get_config(tenant_id)?;
        self.store.list_active_overrides(tenant_id).await
    }

    /// All stored versions, newest first.
    pub async fn history(&self, tenant_id: &str, step_name: &str) -> Result<Vec<PromptOverride>> {
        self.store.list_overrides(tenant_id, step_name).await
    }

    pub async fn active_override(
        &self,
        tenant_id: &str,
        step_name: &str,
    ) -> Result<Option<PromptOverride>> {
        self.store.active_override(tenant_id, step_name).await
    }
}

/// The tenant's code-default prompt for a step, chosen by step type.
pub fn code_default(tenant: &Tenant, step_name: &str, vars: &PromptVars) -> Result<String> {
    let step_config = tenant.config.step_config(step_name).ok_or_else(|| {
        HomeVizError::config(format!(
            "tenant '{}' has no step '{step_name}'",
            tenant.id()
        ))
    })?;

    match &step_config.step_type {
        Some(StepType::Cleanup) => Ok(tenant.prompts.cleanup_prompt()),
        Some(StepType::QualityCheck) => Ok(tenant.prompts.quality_prompt(&scope_from_vars(vars))),
        Some(StepType::Insertion) => {
            if !tenant.prompts.supports_insertion() {
                return Err(HomeVizError::config(format!(
                    "tenant '{}' does not support insertion (step '{step_name}')",
                    tenant.id()
                )));
            }
            let feature_name = step_config.feature_name.as_deref().unwrap_or(step_name);
            let options = insertion_options(vars);
            debug!(feature = feature_name, "using code-default insertion prompt");
            tenant
                .prompts
                .insertion_prompt(feature_name, &options)
                .ok_or_else(|| {
                    HomeVizError::config(format!(
                        "tenant '{}' has no insertion prompt for step '{step_name}'",
                        tenant.id()
                    ))
                })
        }
        Some(StepType::StructuralPrep) => tenant
            .prompts
            .structural_prompts()
            .map(|structural| structural.build_out)
            .ok_or_else(|| {
                HomeVizError::config(format!(
                    "tenant '{}' does not support structural prep (step '{step_name}')",
                    tenant.id()
                ))
            }),
        Some(other) => Err(HomeVizError::config(format!(
            "no default prompt for step type '{other}' (step '{step_name}')"
        ))),
        None => Err(HomeVizError::config(format!(
            "step '{step_name}' has no type"
        ))),
    }
}

/// Insertion option values: [`INSERTION_DEFAULTS`] overlaid by scalar vars.
pub fn insertion_options(vars: &PromptVars) -> ProductOptions {
    let mut options: ProductOptions = INSERTION_DEFAULTS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    for (key, value) in vars {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Bool(_) | Value::Number(_) => value.to_string(),
            _ => continue,
        };
        options.insert(key.clone(), text);
    }
    options
}

/// The `scope` variable as a feature map; missing or malformed means empty.
pub fn scope_from_vars(vars: &PromptVars) -> Scope {
    vars.get("scope")
        .and_then(Value::as_object)
        .map(|scope| {
            scope
                .iter()
                .filter_map(|(k, v)| v.as_bool().map(|on| (k.clone(), on)))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use homeviz_shared::StepConfig;
    use homeviz_tenants::{PromptProvider, TenantConfig, TenantRegistry};
    use serde_json::json;
    use uuid::Uuid;

    struct NoInsertion;

    impl PromptProvider for NoInsertion {
        fn cleanup_prompt(&self) -> String {
            "clean".into()
        }
        fn supports_insertion(&self) -> bool {
            false
        }
        fn insertion_prompt(&self, _feature: &str, _options: &ProductOptions) -> Option<String> {
            None
        }
        fn quality_prompt(&self, _scope: &Scope) -> String {
            "rate".into()
        }
    }

    fn bare_tenant() -> Tenant {
        let config = TenantConfig {
            tenant_id: "bare".into(),
            display_name: "Bare".into(),
            product_schema: vec![],
            pipeline_steps: vec![
                "cleanup".into(),
                "fence".into(),
                "prep".into(),
                "sky".into(),
            ],
            step_configs: BTreeMap::from([
                ("cleanup".to_string(), StepConfig::new(StepType::Cleanup, "Cleaning", 10)),
                ("fence".to_string(), StepConfig::new(StepType::Insertion, "Fence", 50)),
                (
                    "prep".to_string(),
                    StepConfig::new(StepType::StructuralPrep, "Prep", 60),
                ),
                (
                    "sky".to_string(),
                    StepConfig::new(StepType::Custom("sky_replace".into()), "Sky", 70),
                ),
            ]),
        };
        Tenant::new(config, Arc::new(NoInsertion))
    }

    async fn service() -> PromptService {
        let mut registry = TenantRegistry::with_builtins().unwrap();
        registry.insert(bare_tenant()).unwrap();
        let tmp = std::env::temp_dir().join(format!("hv_prompts_{}.db", Uuid::now_v7()));
        let store = Storage::open(&tmp).await.unwrap();
        PromptService::new(Arc::new(registry), Arc::new(store))
    }

    fn vars(value: Value) -> PromptVars {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn code_default_without_override() {
        let svc = service().await;
        let prompt = svc.resolve("cleanup", "roofs", &PromptVars::new()).await.unwrap();
        assert!(prompt.contains("roof visualization preparation"));
    }

    #[tokio::test]
    async fn newest_override_wins_and_rollback_restores() {
        let svc = service().await;
        svc.create_override("boss", "cleanup", "Version 1", None).await.unwrap();
        svc.create_override("boss", "cleanup", "Version 2", None).await.unwrap();
        assert_eq!(
            svc.resolve("cleanup", "boss", &PromptVars::new()).await.unwrap(),
            "Version 2"
        );

        let restored = svc.rollback("boss", "cleanup").await.unwrap().unwrap();
        assert_eq!(restored.version, 1);
        assert_eq!(
            svc.resolve("cleanup", "boss", &PromptVars::new()).await.unwrap(),
            "Version 1"
        );
        assert_eq!(svc.history("boss", "cleanup").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn override_is_formatted_with_vars() {
        let svc = service().await;
        svc.create_override("boss", "doors", "Install {color} screens on {feature_name}", None)
            .await
            .unwrap();
        let prompt = svc
            .resolve(
                "doors",
                "boss",
                &vars(json!({"color": "Bronze", "feature_name": "entry doors"})),
            )
            .await
            .unwrap();
        assert_eq!(prompt, "Install Bronze screens on entry doors");
    }

    #[tokio::test]
    async fn missing_variable_falls_back_to_code_default() {
        let svc = service().await;
        svc.create_override("boss", "cleanup", "Hello {customer_name}", None)
            .await
            .unwrap();
        let prompt = svc.resolve("cleanup", "boss", &PromptVars::new()).await.unwrap();
        assert_ne!(prompt, "Hello {customer_name}");
        assert!(!prompt.contains("customer_name"));
    }

    #[tokio::test]
    async fn insertion_defaults_apply_and_caller_wins() {
        let svc = service().await;
        let defaults = svc.resolve("doors", "boss", &PromptVars::new()).await.unwrap();
        assert!(defaults.contains("Frame Color: Black"));
        assert!(defaults.contains("Mesh: Standard"));
        assert!(defaults.contains("entry doors"));

        let bronze = svc
            .resolve("doors", "boss", &vars(json!({"color": "bronze"})))
            .await
            .unwrap();
        assert!(bronze.contains("Frame Color: Bronze"));
    }

    #[tokio::test]
    async fn quality_default_reads_scope_var() {
        let svc = service().await;
        let prompt = svc
            .resolve(
                "quality_check",
                "pools",
                &vars(json!({"scope": {"pool": true, "deck": false}})),
            )
            .await
            .unwrap();
        assert!(prompt.contains("Features that should be present: pool"));
    }

    #[tokio::test]
    async fn configuration_errors() {
        let svc = service().await;
        let empty = PromptVars::new();

        let missing_insertion = svc.resolve("fence", "bare", &empty).await.unwrap_err();
        assert!(matches!(missing_insertion, HomeVizError::Config { .. }));

        let no_structural = svc.resolve("prep", "bare", &empty).await.unwrap_err();
        assert!(no_structural.to_string().contains("structural prep"));

        let custom = svc.resolve("sky", "bare", &empty).await.unwrap_err();
        assert!(custom.to_string().contains("sky_replace"));

        let unknown_step = svc.resolve("gutters", "boss", &empty).await.unwrap_err();
        assert!(matches!(unknown_step, HomeVizError::Config { .. }));

        let unknown_tenant = svc.resolve("cleanup", "nobody", &empty).await.unwrap_err();
        assert!(matches!(unknown_tenant, HomeVizError::Config { .. }));
    }

    #[tokio::test]
    async fn structural_prep_default_is_build_out_prompt() {
        let svc = service().await;
        let prompt = svc.resolve("build_out", "boss", &PromptVars::new()).await.unwrap();
        assert!(prompt.contains("structural build-outs"));
    }

    #[tokio::test]
    async fn active_overrides_lists_one_per_step() {
        let svc = service().await;
        svc.create_override("boss", "cleanup", "c1", None).await.unwrap();
        svc.create_override("boss", "cleanup", "c2", None).await.unwrap();
        svc.create_override("boss", "doors", "d1", None).await.unwrap();

        let active = svc.active_overrides("boss").await.unwrap();
        let summary: Vec<(String, u32)> = active
            .iter()
            .map(|o| (o.step_name.clone(), o.version))
            .collect();
        assert_eq!(summary, vec![("cleanup".to_string(), 2), ("doors".to_string(), 1)]);
        assert!(svc.active_overrides("nobody").await.is_err());
    }

    #[tokio::test]
    async fn create_rejects_unknown_step() {
        let svc = service().await;
        let err = svc
            .create_override("boss", "gutters", "text", None)
            .await
            .unwrap_err();
        assert!(matches!(err, HomeVizError::Config { .. }));
        assert!(svc.history("boss", "gutters").await.unwrap().is_empty());
    }

    #[test]
    fn insertion_options_skip_structured_vars() {
        let options = insertion_options(&vars(json!({
            "mesh_type": "12x12",
            "panels": 3,
            "scope": {"doors": true}
        })));
        assert_eq!(options["color"], "Black");
        assert_eq!(options["mesh_type"], "12x12");
        assert_eq!(options["panels"], "3");
        assert!(!options.contains_key("scope"));
    }
}
