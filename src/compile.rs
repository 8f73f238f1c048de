//! Ahead-of-time compilation backend
//!
//! Compiling trades the configuration-time graph problem for a flat runtime:
//! aliases are flattened, the whole reference graph is cycle-checked up
//! front, every parameter is resolved eagerly and baked into per-service
//! recipes. What remains at `get` time is a map lookup plus literal
//! construction calls; only service-to-service edges are still followed.
//!
//! [`lower`] produces the baked form shared by [`CompiledContainer`] and the
//! source dumper, so both emit strategies agree by construction.

use crate::builder::ContainerBuilder;
use crate::container::SERVICE_CONTAINER_ID;
use crate::definition::{Callable, Definition};
use crate::engine::{definition_dependencies, walk_arguments, ValueVisitor};
use crate::registry::{Arg, ClassRegistry, Instance};
use crate::value::{ParamExpr, ParameterBag, Value};
use crate::{DiError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// One service with every parameter substituted.
///
/// Arguments hold only literals and service references; `%name%` tokens no
/// longer exist at this stage.
#[derive(Debug, Clone)]
pub(crate) struct Recipe {
    pub(crate) class: String,
    pub(crate) constructor: Option<String>,
    pub(crate) file: Option<PathBuf>,
    pub(crate) arguments: Vec<Value>,
    pub(crate) calls: Vec<(String, Vec<Value>)>,
    pub(crate) configurator: Option<Callable>,
    pub(crate) shared: bool,
}

/// The baked service graph: validated, flattened, parameter-free
#[derive(Debug, Clone)]
pub(crate) struct Lowered {
    pub(crate) recipes: BTreeMap<String, Recipe>,
    pub(crate) aliases: BTreeMap<String, String>,
    pub(crate) parameters: BTreeMap<String, Value>,
}

/// Validate and bake a builder.
///
/// Definition-time errors surface here: alias cycles, service reference
/// cycles (with the full id chain), unknown or cyclic parameters, and class
/// expressions that do not resolve to a string.
pub(crate) fn lower(builder: &ContainerBuilder) -> Result<Lowered> {
    let mut aliases = BTreeMap::new();
    for (alias, _) in builder.aliases() {
        aliases.insert(alias.to_string(), flatten_alias(builder, alias)?);
    }

    check_cycles(builder)?;

    let bag = builder.parameters();
    let mut parameters = BTreeMap::new();
    for (name, _) in bag.entries() {
        parameters.insert(name.clone(), bag.get(&name)?);
    }

    let mut recipes = BTreeMap::new();
    for (id, def) in builder.definitions() {
        recipes.insert(id.to_string(), bake(bag, def)?);
    }

    #[cfg(feature = "logging")]
    debug!(
        target: "wireup",
        services = recipes.len(),
        parameters = parameters.len(),
        aliases = aliases.len(),
        "Lowered service graph"
    );

    Ok(Lowered {
        recipes,
        aliases,
        parameters,
    })
}

fn flatten_alias(builder: &ContainerBuilder, alias: &str) -> Result<String> {
    let mut seen = vec![alias.to_string()];
    let mut current = alias.to_string();
    while let Some(target) = builder.alias_target(&current) {
        if seen.iter().any(|s| s == target) {
            seen.push(target.to_string());
            return Err(DiError::CircularAlias { chain: seen });
        }
        seen.push(target.to_string());
        current = target.to_string();
    }
    Ok(current)
}

/// Whole-graph cycle detection: depth-first over every definition with a
/// visited set and an explicit recursion stack, so the error names the
/// offending chain. The container's self-id is exempt.
fn check_cycles(builder: &ContainerBuilder) -> Result<()> {
    let mut visited = HashSet::new();
    let mut stack = Vec::new();
    for (id, _) in builder.definitions() {
        dfs(builder, id, &mut visited, &mut stack)?;
    }
    Ok(())
}

fn dfs(
    builder: &ContainerBuilder,
    id: &str,
    visited: &mut HashSet<String>,
    stack: &mut Vec<String>,
) -> Result<()> {
    if let Some(pos) = stack.iter().position(|s| s == id) {
        let mut chain: Vec<String> = stack[pos..].to_vec();
        chain.push(id.to_string());
        return Err(DiError::circular(chain));
    }
    if visited.contains(id) {
        return Ok(());
    }

    stack.push(id.to_string());
    if let Some(def) = builder.definition(id) {
        for dep in definition_dependencies(def) {
            let target = flatten_alias(builder, &dep)?;
            if target == SERVICE_CONTAINER_ID {
                continue;
            }
            if builder.has_definition(&target) {
                dfs(builder, &target, visited, stack)?;
            }
        }
    }
    stack.pop();
    visited.insert(id.to_string());
    Ok(())
}

fn bake(bag: &ParameterBag, def: &Definition) -> Result<Recipe> {
    let class = match bag.resolve_expr(def.class())? {
        Value::Str(s) => s,
        other => {
            return Err(DiError::InvalidParameter {
                name: def.class().to_string(),
                reason: format!("class name must resolve to a string, got {other:?}"),
            })
        }
    };

    let mut baking = Baking { bag };
    let arguments = walk_arguments(def.arguments(), &mut baking)?;
    let calls = def
        .method_calls()
        .iter()
        .map(|call| {
            Ok((
                call.method().to_string(),
                walk_arguments(call.arguments(), &mut baking)?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Recipe {
        class,
        constructor: def.constructor().map(str::to_string),
        file: def.file().map(PathBuf::from),
        arguments,
        calls,
        configurator: def.configurator().cloned(),
        shared: def.is_shared(),
    })
}

/// Compile-time emit strategy: parameters become literal values, service
/// references stay symbolic.
struct Baking<'a> {
    bag: &'a ParameterBag,
}

impl ValueVisitor for Baking<'_> {
    type Out = Value;

    fn scalar(&mut self, value: &Value) -> Result<Value> {
        Ok(value.clone())
    }

    fn parameter(&mut self, name: &str) -> Result<Value> {
        self.bag.get(name)
    }

    fn service(&mut self, id: &str) -> Result<Value> {
        Ok(Value::service(id))
    }

    fn expr(&mut self, expr: &ParamExpr) -> Result<Value> {
        self.bag.resolve_expr(expr)
    }

    fn seq(&mut self, items: Vec<Value>) -> Result<Value> {
        Ok(Value::Seq(items))
    }

    fn map(&mut self, entries: Vec<(String, Value)>) -> Result<Value> {
        Ok(Value::Map(entries.into_iter().collect()))
    }
}

/// Flat container produced by compiling a builder.
///
/// Public surface matches the interpreted [`Container`](crate::Container):
/// `get`/`has`/`set` plus parameter accessors, where compiled parameters
/// take precedence and runtime-added ones fall back to an overlay bag.
#[derive(Clone)]
pub struct CompiledContainer {
    inner: Arc<CompiledInner>,
}

struct CompiledInner {
    recipes: BTreeMap<String, Recipe>,
    aliases: BTreeMap<String, String>,
    parameters: BTreeMap<String, Value>,
    overlay: ParameterBag,
    instances: DashMap<String, Instance, RandomState>,
    registry: Arc<ClassRegistry>,
}

impl CompiledContainer {
    pub(crate) fn from_builder(
        builder: &ContainerBuilder,
        registry: Arc<ClassRegistry>,
    ) -> Result<Self> {
        let lowered = lower(builder)?;
        let container = Self {
            inner: Arc::new(CompiledInner {
                recipes: lowered.recipes,
                aliases: lowered.aliases,
                parameters: lowered.parameters,
                overlay: ParameterBag::new(),
                instances: DashMap::with_hasher(RandomState::new()),
                registry,
            }),
        };
        container.inner.instances.insert(
            SERVICE_CONTAINER_ID.to_string(),
            Instance::from_arc(SERVICE_CONTAINER_ID, Arc::new(container.clone())),
        );
        Ok(container)
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.inner.registry
    }

    fn canonical_id<'a>(&'a self, id: &'a str) -> &'a str {
        self.inner.aliases.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Manually inject an instance under `id`
    pub fn set(&self, id: &str, instance: Instance) {
        let cid = self.canonical_id(id).to_string();
        self.inner.instances.insert(cid, instance);
    }

    pub fn has(&self, id: &str) -> bool {
        let cid = self.canonical_id(id);
        self.inner.instances.contains_key(cid) || self.inner.recipes.contains_key(cid)
    }

    /// Return the service for `id`. No graph validation happens here; the
    /// graph was proven acyclic when the container was compiled.
    pub fn get(&self, id: &str) -> Result<Instance> {
        let cid = self.canonical_id(id).to_string();
        if let Some(existing) = self.inner.instances.get(&cid) {
            return Ok(existing.clone());
        }
        let recipe = self
            .inner
            .recipes
            .get(&cid)
            .ok_or_else(|| DiError::unknown_service(&cid))?;
        let instance = self.execute(recipe)?;
        if recipe.shared {
            self.inner.instances.insert(cid, instance.clone());
        }
        Ok(instance)
    }

    pub fn service_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .instances
            .iter()
            .map(|e| e.key().clone())
            .chain(self.inner.recipes.keys().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Compiled parameters first, then anything added at runtime
    pub fn has_parameter(&self, name: &str) -> bool {
        self.inner.parameters.contains_key(&name.to_lowercase())
            || self.inner.overlay.has(name)
    }

    pub fn get_parameter(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.inner.parameters.get(&name.to_lowercase()) {
            return Ok(value.clone());
        }
        self.inner.overlay.get(name)
    }

    /// Runtime additions land in the overlay; compiled names cannot be
    /// shadowed.
    pub fn set_parameter(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner.overlay.set(name, value);
    }

    fn execute(&self, recipe: &Recipe) -> Result<Instance> {
        if let Some(file) = &recipe.file {
            self.inner.registry.include(file)?;
        }

        let args = self.resolve_baked_all(&recipe.arguments)?;
        let instance = match &recipe.constructor {
            Some(factory) => self
                .inner
                .registry
                .construct_via(&recipe.class, factory, &args)?,
            None => self.inner.registry.construct(&recipe.class, &args)?,
        };

        for (method, arguments) in &recipe.calls {
            let call_args = self.resolve_baked_all(arguments)?;
            self.inner.registry.call(&instance, method, &call_args)?;
        }

        if let Some(configurator) = &recipe.configurator {
            match configurator {
                Callable::Function(name) => self.inner.registry.call_function(name, &instance)?,
                Callable::Static { class, method } => {
                    self.inner.registry.call_static(class, method, &instance)?
                }
                Callable::Service { service, method } => {
                    let target = self.get(service.id())?;
                    self.inner
                        .registry
                        .call(&target, method, &[Arg::Service(instance.clone())])?;
                }
            }
        }

        Ok(instance)
    }

    fn resolve_baked_all(&self, values: &[Value]) -> Result<Vec<Arg>> {
        values.iter().map(|v| self.resolve_baked(v)).collect()
    }

    /// Baked values are final; only service references remain live. No lazy
    /// re-parsing here, or literal text containing `%` would resolve twice.
    fn resolve_baked(&self, value: &Value) -> Result<Arg> {
        match value {
            Value::Service(r) => Ok(Arg::Service(self.get(r.id())?)),
            Value::Seq(items) => Ok(Arg::Seq(
                items
                    .iter()
                    .map(|v| self.resolve_baked(v))
                    .collect::<Result<_>>()?,
            )),
            Value::Map(entries) => Ok(Arg::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.resolve_baked(v)?)))
                    .collect::<Result<_>>()?,
            )),
            other => Ok(Arg::Value(other.clone())),
        }
    }
}

impl std::fmt::Debug for CompiledContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledContainer")
            .field("recipes", &self.inner.recipes.len())
            .field("instances", &self.inner.instances.len())
            .field("parameters", &self.inner.parameters.len())
            .finish()
    }
}
