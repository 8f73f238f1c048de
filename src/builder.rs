//! Authoring-time service graph
//!
//! The builder accumulates definitions, parameters and aliases while
//! configuration loads, then hands the finished graph to a backend:
//! [`build`](ContainerBuilder::build) for on-demand interpreted resolution,
//! [`compile`](ContainerBuilder::compile) for the pre-validated flat form,
//! or [`RustDumper`](crate::RustDumper) for generated source. Backends read
//! the builder; they never mutate it.

use crate::compile::CompiledContainer;
use crate::container::Container;
use crate::definition::Definition;
use crate::registry::ClassRegistry;
use crate::value::{ParameterBag, Value};
use crate::{DiError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Mutable registry of service definitions, parameters and aliases.
///
/// Duplicate registrations overwrite: configuration layers loaded later
/// (plugins, environment overrides) win over earlier ones. That policy is
/// deliberate and covered by tests, not incidental.
#[derive(Debug, Clone, Default)]
pub struct ContainerBuilder {
    definitions: BTreeMap<String, Definition>,
    parameters: ParameterBag,
    aliases: BTreeMap<String, String>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a definition for `id`, returning it for fluent
    /// configuration. An empty id is a definition-time error.
    pub fn register(&mut self, id: &str, class: &str) -> Result<&mut Definition> {
        if id.is_empty() {
            return Err(DiError::EmptyServiceId);
        }

        #[cfg(feature = "logging")]
        if self.definitions.contains_key(id) {
            debug!(target: "wireup", service = id, "Overriding existing definition");
        }

        self.definitions.insert(id.to_string(), Definition::new(class));
        Ok(self.definitions.get_mut(id).expect("just inserted"))
    }

    /// Store an already-built definition under `id`
    pub fn set_definition(&mut self, id: &str, definition: Definition) -> Result<()> {
        if id.is_empty() {
            return Err(DiError::EmptyServiceId);
        }
        self.definitions.insert(id.to_string(), definition);
        Ok(())
    }

    pub fn definition(&self, id: &str) -> Option<&Definition> {
        self.definitions.get(id)
    }

    pub fn definition_mut(&mut self, id: &str) -> Option<&mut Definition> {
        self.definitions.get_mut(id)
    }

    pub fn has_definition(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    pub fn remove_definition(&mut self, id: &str) -> Option<Definition> {
        self.definitions.remove(id)
    }

    pub fn definitions(&self) -> impl Iterator<Item = (&str, &Definition)> {
        self.definitions.iter().map(|(id, def)| (id.as_str(), def))
    }

    /// Record an alias. The target does not have to exist yet; binding is
    /// late, so a plugin may alias a service the application registers
    /// afterwards.
    pub fn set_alias(&mut self, alias: &str, target: &str) {
        self.aliases.insert(alias.to_string(), target.to_string());
    }

    pub fn alias_target(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(a, t)| (a.as_str(), t.as_str()))
    }

    /// True when `id` is a definition or an alias
    pub fn has(&self, id: &str) -> bool {
        self.definitions.contains_key(id) || self.aliases.contains_key(id)
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.parameters.set(name, value);
    }

    pub fn add_parameters<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.parameters.add(entries);
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.has(name)
    }

    /// The resolved parameter value; a missing name is an error
    pub fn get_parameter(&self, name: &str) -> Result<Value> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> &ParameterBag {
        &self.parameters
    }

    /// Fold another builder into this one. Later registrations win, so call
    /// order is the layering order: core first, overrides last.
    pub fn merge(&mut self, other: &ContainerBuilder) {
        #[cfg(feature = "logging")]
        debug!(
            target: "wireup",
            definitions = other.definitions.len(),
            parameters = other.parameters.len(),
            aliases = other.aliases.len(),
            "Merging builder"
        );

        for (id, def) in &other.definitions {
            self.definitions.insert(id.clone(), def.clone());
        }
        for (alias, target) in &other.aliases {
            self.aliases.insert(alias.clone(), target.clone());
        }
        self.parameters.merge(&other.parameters);
    }

    /// Interpreted backend: a container that builds services on demand,
    /// resolving parameters at `get` time.
    pub fn build(&self, registry: Arc<ClassRegistry>) -> Container {
        Container::from_builder(self, registry)
    }

    /// Compiled backend: validate the whole graph now (cycles, parameters,
    /// class names) and bake a flat container.
    pub fn compile(&self, registry: Arc<ClassRegistry>) -> Result<CompiledContainer> {
        CompiledContainer::from_builder(self, registry)
    }
}
