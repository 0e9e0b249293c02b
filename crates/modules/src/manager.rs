//! Module registry.
//!
//! Modules are registered through factories and instantiated on first use.
//! Initialization follows required dependencies; a module whose
//! dependency failed still gets a chance to initialize and decides for
//! itself whether it can run.

use aceflow_core::ToolName;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ModuleError, Result};
use crate::module::{Module, ModuleConfig, ModuleMetadata, ModuleState};

/// Builds module instances.
pub trait ModuleFactory: Send + Sync {
    /// Metadata of the modules this factory builds.
    fn metadata(&self) -> ModuleMetadata;

    /// Build an uninitialized instance.
    fn create(&self, config: ModuleConfig) -> Box<dyn Module>;
}

struct Registration {
    factory: Box<dyn ModuleFactory>,
    metadata: ModuleMetadata,
    config: ModuleConfig,
    instance: Option<Box<dyn Module>>,
}

/// Owns every registered module.
#[derive(Default)]
pub struct ModuleManager {
    order: Vec<String>,
    registrations: HashMap<String, Registration>,
}

impl ModuleManager {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under `name`.
    pub fn register_module(
        &mut self,
        name: impl Into<String>,
        factory: Box<dyn ModuleFactory>,
        config: ModuleConfig,
    ) -> Result<()> {
        let name = name.into();
        if self.registrations.contains_key(&name) {
            return Err(ModuleError::AlreadyRegistered(name));
        }

        let metadata = factory.metadata();
        debug!("Registered module: {} (deps: {:?})", name, metadata.dependencies);
        self.order.push(name.clone());
        self.registrations.insert(
            name,
            Registration {
                factory,
                metadata,
                config,
                instance: None,
            },
        );
        Ok(())
    }

    /// Names in registration order.
    pub fn list_modules(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Whether `name` is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.registrations.contains_key(name)
    }

    /// Registered metadata.
    pub fn metadata(&self, name: &str) -> Option<&ModuleMetadata> {
        self.registrations.get(name).map(|r| &r.metadata)
    }

    /// Current config of a module.
    pub fn module_config(&self, name: &str) -> Option<&ModuleConfig> {
        self.registrations.get(name).map(|r| &r.config)
    }

    /// Every registered module, dependencies first.
    pub fn get_initialization_order(&self) -> Result<Vec<String>> {
        self.topological_order(&self.order)
    }

    /// Kahn's algorithm over `names` (in registration order); ties go to
    /// the earlier registration.
    fn topological_order(&self, names: &[String]) -> Result<Vec<String>> {
        let index: HashMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
        let mut in_degree = vec![0usize; names.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); names.len()];

        for (i, name) in names.iter().enumerate() {
            let Some(reg) = self.registrations.get(name) else {
                return Err(ModuleError::NotRegistered(name.clone()));
            };
            for dep in &reg.metadata.dependencies {
                if !self.registrations.contains_key(dep) {
                    return Err(ModuleError::MissingDependency {
                        module: name.clone(),
                        dependency: dep.clone(),
                    });
                }
                if let Some(&d) = index.get(dep.as_str()) {
                    in_degree[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..names.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut sorted = Vec::with_capacity(names.len());
        while let Some(i) = ready.pop_first() {
            sorted.push(names[i].clone());
            for &j in &dependents[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.insert(j);
                }
            }
        }

        if sorted.len() < names.len() {
            let stuck = (0..names.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| names[i].clone())
                .collect();
            return Err(ModuleError::CircularDependency(stuck));
        }
        Ok(sorted)
    }

    /// `name` plus its transitive required dependencies, in init order.
    fn dependency_closure(&self, name: &str) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let reg = self
                .registrations
                .get(&current)
                .ok_or_else(|| ModuleError::NotRegistered(current.clone()))?;
            for dep in &reg.metadata.dependencies {
                if !self.registrations.contains_key(dep) {
                    return Err(ModuleError::MissingDependency {
                        module: current.clone(),
                        dependency: dep.clone(),
                    });
                }
                stack.push(dep.clone());
            }
        }

        let members: Vec<String> = self.order.iter().filter(|n| seen.contains(*n)).cloned().collect();
        self.topological_order(&members)
    }

    /// Instance of `name`, built on first access.
    pub fn get_module(&mut self, name: &str) -> Option<&mut dyn Module> {
        let reg = self.registrations.get_mut(name)?;
        if reg.instance.is_none() {
            debug!("Instantiating module: {}", name);
            reg.instance = Some(reg.factory.create(reg.config.clone()));
        }
        reg.instance.as_deref_mut().map(|m| m as &mut dyn Module)
    }

    /// Existing instance of `name`, without building one.
    pub fn module(&self, name: &str) -> Option<&dyn Module> {
        self.registrations.get(name)?.instance.as_deref()
    }

    /// Whether `name` is instantiated and available.
    pub fn is_module_available(&self, name: &str) -> bool {
        self.module(name).map(|m| m.is_available()).unwrap_or(false)
    }

    /// Initialize `name` and its required dependencies.
    pub async fn initialize_module(&mut self, name: &str) -> bool {
        if !self.is_registered(name) {
            warn!("Cannot initialize unknown module: {}", name);
            return false;
        }

        let plan = match self.dependency_closure(name) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Cannot initialize {}: {}", name, e);
                return false;
            }
        };

        let mut result = false;
        for module in &plan {
            result = self.initialize_single(module).await;
        }
        result
    }

    async fn initialize_single(&mut self, name: &str) -> bool {
        let deps = match self.registrations.get(name) {
            Some(reg) => reg.metadata.dependencies.clone(),
            None => return false,
        };
        let ready: Vec<String> = deps.into_iter().filter(|d| self.is_module_available(d)).collect();

        let Some(module) = self.get_module(name) else {
            return false;
        };
        for dep in &ready {
            module.mark_dependency_resolved(dep);
        }
        module.initialize().await
    }

    /// Initialize everything in dependency order.
    ///
    /// One failure never stops independent modules.
    pub async fn initialize_all_modules(&mut self) -> Result<HashMap<String, bool>> {
        let order = self.get_initialization_order()?;
        let mut results = HashMap::new();
        for name in order {
            let ok = self.initialize_single(&name).await;
            results.insert(name, ok);
        }

        let ready = results.values().filter(|ok| **ok).count();
        info!("Initialized {}/{} modules", ready, results.len());
        Ok(results)
    }

    /// Status of one module.
    pub fn get_module_status(&self, name: &str) -> Option<Value> {
        let reg = self.registrations.get(name)?;
        Some(match &reg.instance {
            Some(module) => module.module_info(),
            None => json!({
                "name": name,
                "enabled": reg.config.enabled,
                "initialized": false,
                "available": false,
                "state": ModuleState::Uninitialized.as_str(),
                "metadata": reg.metadata,
            }),
        })
    }

    /// Status of every module, keyed by name.
    pub fn get_all_status(&self) -> Value {
        let statuses: Map<String, Value> = self
            .order
            .iter()
            .filter_map(|name| self.get_module_status(name).map(|s| (name.clone(), s)))
            .collect();
        Value::Object(statuses)
    }

    /// Health of initialized modules.
    pub fn health_check(&self) -> Value {
        let mut healthy = Vec::new();
        let mut unhealthy = Vec::new();
        let mut modules = Map::new();

        for name in &self.order {
            let Some(module) = self.module(name) else {
                continue;
            };
            if module.state() == ModuleState::Uninitialized {
                continue;
            }
            let mut status = module.health_status();
            if let Some(map) = status.as_object_mut() {
                map.insert("state".to_string(), json!(module.state().as_str()));
            }
            let ok = module.state() == ModuleState::Disabled || module.is_healthy();
            if ok {
                healthy.push(name.clone());
            } else {
                unhealthy.push(name.clone());
            }
            modules.insert(name.clone(), status);
        }

        json!({
            "overall_healthy": unhealthy.is_empty(),
            "healthy_modules": healthy,
            "unhealthy_modules": unhealthy,
            "modules": modules,
        })
    }

    /// Tear down and rebuild one module.
    pub async fn reload_module(&mut self, name: &str) -> bool {
        let Some(reg) = self.registrations.get_mut(name) else {
            return false;
        };
        if let Some(mut module) = reg.instance.take() {
            module.cleanup().await;
        }
        info!("Reloading module: {}", name);
        self.initialize_module(name).await
    }

    /// Replace a module's config, reloading it if it was built.
    pub async fn update_module_config(&mut self, name: &str, config: ModuleConfig) -> bool {
        let Some(reg) = self.registrations.get_mut(name) else {
            return false;
        };
        reg.config = config;
        if reg.instance.is_some() {
            return self.reload_module(name).await;
        }
        true
    }

    /// Clean up one module. Unknown or idle modules are fine.
    pub async fn shutdown_module(&mut self, name: &str) -> bool {
        let Some(reg) = self.registrations.get_mut(name) else {
            return false;
        };
        if let Some(module) = reg.instance.as_deref_mut() {
            module.cleanup().await;
        }
        true
    }

    /// Clean up everything, dependents first.
    pub async fn shutdown_all_modules(&mut self) {
        let mut order = self.get_initialization_order().unwrap_or_else(|_| self.order.clone());
        order.reverse();
        for name in order {
            self.shutdown_module(&name).await;
        }
        info!("All modules shut down");
    }

    /// Tools served by available modules, with the serving module.
    pub fn available_tools(&self) -> Vec<(ToolName, String)> {
        self.order
            .iter()
            .filter(|name| self.is_module_available(name))
            .flat_map(|name| {
                let provides = self.registrations.get(name).map(|r| r.metadata.provides.clone()).unwrap_or_default();
                provides.into_iter().map(move |tool| (tool, name.clone()))
            })
            .collect()
    }

    /// Dispatch a tool call to a module and record its stats.
    pub async fn call_tool(&mut self, module: &str, tool: ToolName, params: &Value) -> Result<Value> {
        if !self.is_registered(module) {
            return Err(ModuleError::NotRegistered(module.to_string()));
        }
        let instance = self
            .registrations
            .get_mut(module)
            .and_then(|r| r.instance.as_deref_mut())
            .filter(|m| m.is_available())
            .ok_or_else(|| ModuleError::Unavailable(module.to_string()))?;

        let started = Instant::now();
        let result = instance.handle(tool, params).await;
        let elapsed = started.elapsed().as_secs_f64() * 1000.0;
        instance.record_call(result.is_ok(), elapsed);
        debug!("{} -> {} in {:.1}ms (ok: {})", tool, module, elapsed, result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleBase;
    use async_trait::async_trait;

    struct Simple {
        base: ModuleBase,
    }

    #[async_trait]
    impl Module for Simple {
        fn base(&self) -> &ModuleBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ModuleBase {
            &mut self.base
        }

        async fn do_initialize(&mut self) -> Result<bool> {
            Ok(self.are_dependencies_resolved())
        }

        async fn do_cleanup(&mut self) -> Result<()> {
            Ok(())
        }

        fn health_status(&self) -> Value {
            json!({"healthy": true})
        }

        async fn handle(&mut self, tool: ToolName, params: &Value) -> Result<Value> {
            if params.get("fail").is_some() {
                return Err(ModuleError::InvalidParams("fail requested".into()));
            }
            Ok(json!({"module": self.name(), "tool": tool.as_str()}))
        }
    }

    struct SimpleFactory {
        metadata: ModuleMetadata,
    }

    impl SimpleFactory {
        fn boxed(name: &str, deps: &[&str]) -> Box<dyn ModuleFactory> {
            let mut metadata = ModuleMetadata::new(name, "1.0.0", "test").provides(ToolName::AceflowInit);
            for dep in deps {
                metadata = metadata.depends_on(*dep);
            }
            Box::new(Self { metadata })
        }
    }

    impl ModuleFactory for SimpleFactory {
        fn metadata(&self) -> ModuleMetadata {
            self.metadata.clone()
        }

        fn create(&self, config: ModuleConfig) -> Box<dyn Module> {
            Box::new(Simple {
                base: ModuleBase::new(self.metadata.clone(), config),
            })
        }
    }

    fn manager(specs: &[(&str, &[&str], bool)]) -> ModuleManager {
        let mut manager = ModuleManager::new();
        for (name, deps, enabled) in specs {
            manager
                .register_module(*name, SimpleFactory::boxed(name, deps), ModuleConfig::new(*enabled))
                .unwrap();
        }
        manager
    }

    #[test]
    fn test_duplicate_registration() {
        let mut m = manager(&[("core", &[], true)]);
        let err = m
            .register_module("core", SimpleFactory::boxed("core", &[]), ModuleConfig::default())
            .unwrap_err();
        assert!(matches!(err, ModuleError::AlreadyRegistered(_)));
        assert_eq!(m.list_modules(), vec!["core"]);
    }

    #[test]
    fn test_initialization_order() {
        let m = manager(&[
            ("intelligence", &["core"], true),
            ("collaboration", &["core"], true),
            ("core", &[], true),
        ]);
        assert_eq!(m.get_initialization_order().unwrap(), vec!["core", "intelligence", "collaboration"]);
    }

    #[test]
    fn test_missing_and_circular_dependencies() {
        let missing = manager(&[("collaboration", &["core"], true)]);
        assert!(matches!(
            missing.get_initialization_order(),
            Err(ModuleError::MissingDependency { .. })
        ));

        let cycle = manager(&[("a", &["b"], true), ("b", &["a"], true), ("c", &[], true)]);
        match cycle.get_initialization_order() {
            Err(ModuleError::CircularDependency(names)) => assert_eq!(names, vec!["a", "b"]),
            other => panic!("expected cycle, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_initialize_module_pulls_dependencies() {
        let mut m = manager(&[("core", &[], true), ("collaboration", &["core"], true)]);
        assert!(m.initialize_module("collaboration").await);
        assert!(m.is_module_available("core"));
        assert!(m.is_module_available("collaboration"));
        assert!(!m.initialize_module("nope").await);
    }

    #[tokio::test]
    async fn test_failed_dependency_does_not_stop_others() {
        let mut m = manager(&[
            ("core", &[], false),
            ("collaboration", &["core"], true),
            ("standalone", &[], true),
        ]);
        let results = m.initialize_all_modules().await.unwrap();
        assert_eq!(results["core"], true);
        assert_eq!(results["collaboration"], false);
        assert_eq!(results["standalone"], true);

        let health = m.health_check();
        assert_eq!(health["overall_healthy"], false);
        assert_eq!(health["unhealthy_modules"], json!(["collaboration"]));
    }

    #[tokio::test]
    async fn test_call_tool_records_stats() {
        let mut m = manager(&[("core", &[], true)]);
        assert!(matches!(
            m.call_tool("core", ToolName::AceflowInit, &json!({})).await,
            Err(ModuleError::Unavailable(_))
        ));

        m.initialize_all_modules().await.unwrap();
        let out = m.call_tool("core", ToolName::AceflowInit, &json!({})).await.unwrap();
        assert_eq!(out["tool"], "aceflow_init");
        assert!(m.call_tool("core", ToolName::AceflowInit, &json!({"fail": true})).await.is_err());

        let status = m.get_module_status("core").unwrap();
        assert_eq!(status["stats"]["total_calls"], 2);
        assert_eq!(status["stats"]["failed_calls"], 1);
        assert_eq!(m.available_tools(), vec![(ToolName::AceflowInit, "core".to_string())]);
    }

    #[tokio::test]
    async fn test_reload_update_and_shutdown() {
        let mut m = manager(&[("core", &[], true)]);
        assert!(m.get_module_status("core").unwrap()["initialized"] == false);
        m.initialize_all_modules().await.unwrap();

        assert!(m.update_module_config("core", ModuleConfig::new(false)).await);
        assert_eq!(m.module("core").unwrap().state(), ModuleState::Disabled);

        assert!(m.update_module_config("core", ModuleConfig::new(true)).await);
        assert!(m.is_module_available("core"));

        assert!(!m.shutdown_module("ghost").await);
        m.shutdown_all_modules().await;
        assert_eq!(m.module("core").unwrap().state(), ModuleState::Shutdown);
        assert!(m.get_all_status()["core"]["state"] == "shutdown");
    }
}
