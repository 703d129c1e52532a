//! Tenant configuration contract and built-in tenants for HomeViz.
//!
//! A [`Tenant`] pairs a data-only [`TenantConfig`] (product schema, ordered
//! pipeline steps, step configs) with a [`PromptProvider`] supplying the
//! code-default prompts. Tenants are looked up through a [`TenantProvider`].

pub mod builtin;
pub mod config;
pub mod prompts;

use std::collections::BTreeMap;
use std::sync::Arc;

use homeviz_shared::{HomeVizError, Result};
use tracing::debug;

pub use config::TenantConfig;
pub use prompts::{DEFAULT_REFINE_PROMPT, PromptProvider, StructuralPrompts, display_value};

/// A configured product vertical: data plus code-default prompts.
#[derive(Clone)]
pub struct Tenant {
    pub config: TenantConfig,
    pub prompts: Arc<dyn PromptProvider>,
}

impl Tenant {
    pub fn new(config: TenantConfig, prompts: Arc<dyn PromptProvider>) -> Self {
        Self { config, prompts }
    }

    pub fn id(&self) -> &str {
        &self.config.tenant_id
    }
}

impl std::fmt::Debug for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tenant")
            .field("tenant_id", &self.config.tenant_id)
            .field("pipeline_steps", &self.config.pipeline_steps)
            .finish_non_exhaustive()
    }
}

/// Source of tenant configurations. Read-only to the pipeline.
pub trait TenantProvider: Send + Sync {
    /// Look up a tenant; unknown ids are a configuration error.
    fn get_config(&self, tenant_id: &str) -> Result<Arc<Tenant>>;

    /// All known tenant ids, sorted.
    fn all_tenants(&self) -> Vec<String>;
}

/// In-memory tenant registry.
#[derive(Debug, Default, Clone)]
pub struct TenantRegistry {
    tenants: BTreeMap<String, Arc<Tenant>>,
}

impl TenantRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in tenant.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        for tenant in builtin::all() {
            registry.insert(tenant)?;
        }
        Ok(registry)
    }

    /// Validate and add a tenant. Ids are unique; a second tenant with the
    /// same id is a configuration error.
    pub fn insert(&mut self, tenant: Tenant) -> Result<()> {
        tenant.config.validate()?;
        if self.tenants.contains_key(tenant.id()) {
            return Err(HomeVizError::config(format!(
                "tenant '{}' is already registered",
                tenant.id()
            )));
        }
        debug!(tenant = %tenant.id(), "registered tenant");
        self.tenants
            .insert(tenant.id().to_string(), Arc::new(tenant));
        Ok(())
    }
}

impl TenantProvider for TenantRegistry {
    fn get_config(&self, tenant_id: &str) -> Result<Arc<Tenant>> {
        self.tenants
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| HomeVizError::config(format!("unknown tenant '{tenant_id}'")))
    }

    fn all_tenants(&self) -> Vec<String> {
        self.tenants.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homeviz_shared::StepType;

    #[test]
    fn builtin_tenants_registered() {
        let registry = TenantRegistry::with_builtins().expect("builtins validate");
        assert_eq!(
            registry.all_tenants(),
            vec!["boss", "pools", "roofs", "windows"]
        );
        let windows = registry.get_config("windows").expect("windows loadable");
        assert_eq!(windows.id(), "windows");
    }

    #[test]
    fn unknown_tenant_is_config_error() {
        let registry = TenantRegistry::with_builtins().unwrap();
        let err = registry.get_config("gutters").unwrap_err();
        assert!(matches!(err, HomeVizError::Config { .. }));
    }

    #[test]
    fn every_builtin_starts_with_cleanup_and_ends_with_quality_check() {
        let registry = TenantRegistry::with_builtins().unwrap();
        for id in registry.all_tenants() {
            let tenant = registry.get_config(&id).unwrap();
            let steps = tenant.config.ordered_steps().unwrap();
            assert_eq!(
                steps.first().unwrap().1.step_type,
                Some(StepType::Cleanup),
                "{id}"
            );
            assert_eq!(
                steps.last().unwrap().1.step_type,
                Some(StepType::QualityCheck),
                "{id}"
            );
        }
    }

    #[test]
    fn duplicate_tenant_id_is_rejected() {
        let mut registry = TenantRegistry::with_builtins().unwrap();
        let err = registry.insert(builtin::roofs::tenant()).unwrap_err();
        assert!(matches!(err, HomeVizError::Config { .. }));
        assert!(err.to_string().contains("roofs"));
        assert_eq!(registry.all_tenants().len(), 4);
    }

    #[test]
    fn every_builtin_supports_insertion() {
        let registry = TenantRegistry::with_builtins().unwrap();
        for id in registry.all_tenants() {
            let tenant = registry.get_config(&id).unwrap();
            assert!(tenant.prompts.supports_insertion(), "{id}");
            let prompt = tenant
                .prompts
                .insertion_prompt("windows", &Default::default());
            assert!(prompt.is_some_and(|p| !p.is_empty()), "{id}");
        }
    }

    #[test]
    fn refine_prompts_name_the_tenant_product() {
        let registry = TenantRegistry::with_builtins().unwrap();
        let refine = |id: &str| registry.get_config(id).unwrap().prompts.refine_prompt();
        assert_eq!(refine("boss"), DEFAULT_REFINE_PROMPT);
        assert!(refine("roofs").contains("roof"));
        assert!(refine("pools").contains("pool"));
        assert!(refine("windows").contains("window"));
        assert!(!refine("roofs").contains("screens"));
    }
}
