use crate::activity::Activity;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown activity type '{0}'")]
    UnknownType(String),

    #[error("unknown activity module '{0}'")]
    UnknownModule(String),
}

pub type ActivityConstructor = Arc<dyn Fn() -> Box<dyn Activity> + Send + Sync>;

/// Maps activity type tags to constructors.
#[derive(Default, Clone)]
pub struct ActivityRegistry {
    constructors: HashMap<String, ActivityConstructor>,
}

impl std::fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("types", &self.types())
            .finish()
    }
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor, replacing any previous one for `tag`.
    pub fn register<F>(&mut self, tag: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Activity> + Send + Sync + 'static,
    {
        let tag = tag.into();
        if self
            .constructors
            .insert(tag.clone(), Arc::new(constructor))
            .is_some()
        {
            tracing::debug!(activity_type = %tag, "activity type re-registered");
        }
    }

    pub fn register_default<T>(&mut self, tag: impl Into<String>)
    where
        T: Activity + Default + 'static,
    {
        self.register(tag, || Box::new(T::default()));
    }

    /// Builds a fresh instance for `tag`.
    pub fn create(&self, tag: &str) -> Result<Box<dyn Activity>, RegistryError> {
        self.constructors
            .get(tag)
            .map(|constructor| constructor())
            .ok_or_else(|| RegistryError::UnknownType(tag.to_string()))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.constructors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

/// A named bundle of activity types, loaded when a flow lists it under
/// `activityModules`.
pub trait ActivityModule: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, registry: &mut ActivityRegistry);
}

/// Modules known to an engine, by name.
#[derive(Default, Clone)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, Arc<dyn ActivityModule>>,
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.modules.keys()).finish()
    }
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<M>(&mut self, module: M)
    where
        M: ActivityModule + 'static,
    {
        self.modules.insert(module.name().to_string(), Arc::new(module));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    /// Registers the activities of module `name` into `registry`.
    pub fn load(&self, name: &str, registry: &mut ActivityRegistry) -> Result<(), RegistryError> {
        let module = self
            .modules
            .get(name)
            .ok_or_else(|| RegistryError::UnknownModule(name.to_string()))?;
        module.register(registry);
        tracing::debug!(module = %name, "activity module loaded");
        Ok(())
    }
}
