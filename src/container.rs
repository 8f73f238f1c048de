//! Runtime service container, interpreted backend
//!
//! The container applications hold: a parameter bag, an instance cache and
//! the definition graph it resolves on demand. Shared services are memoized
//! under their canonical (alias-resolved) id; non-shared ones build fresh on
//! every `get`. Cycle detection uses an explicit in-progress id list, so a
//! reference cycle fails with the full offending chain instead of blowing
//! the stack.

use crate::builder::ContainerBuilder;
use crate::definition::{Callable, Definition};
use crate::engine::{walk_arguments, ValueVisitor};
use crate::registry::{Arg, ClassRegistry, Instance};
use crate::value::{ParamExpr, ParameterBag, Value};
use crate::{DiError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// The id every container registers itself under.
///
/// Depending on it is the one permitted self-reference in the graph: the
/// instance already sits in the cache, so resolution short-circuits before
/// the cycle check.
pub const SERVICE_CONTAINER_ID: &str = "service_container";

/// Service container resolving definitions on demand.
///
/// Cloning the handle is cheap and clones share all state, the same way one
/// container is shared across a request. One container serves one in-process
/// invocation; no locking guards concurrent external mutation, only the
/// in-progress marker used for cycle detection.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    parameters: ParameterBag,
    definitions: BTreeMap<String, Definition>,
    aliases: DashMap<String, String, RandomState>,
    instances: DashMap<String, Instance, RandomState>,
    registry: Arc<ClassRegistry>,
    building: Mutex<Vec<String>>,
}

impl Container {
    /// Create an empty container over a class registry
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self::assemble(
            ParameterBag::new(),
            BTreeMap::new(),
            DashMap::with_hasher(RandomState::new()),
            registry,
        )
    }

    pub(crate) fn from_builder(builder: &ContainerBuilder, registry: Arc<ClassRegistry>) -> Self {
        let definitions: BTreeMap<String, Definition> = builder
            .definitions()
            .map(|(id, def)| (id.to_string(), def.clone()))
            .collect();
        let aliases: DashMap<String, String, RandomState> =
            DashMap::with_hasher(RandomState::new());
        for (alias, target) in builder.aliases() {
            aliases.insert(alias.to_string(), target.to_string());
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "wireup",
            definitions = definitions.len(),
            aliases = aliases.len(),
            "Building interpreted container"
        );

        Self::assemble(builder.parameters().clone(), definitions, aliases, registry)
    }

    fn assemble(
        parameters: ParameterBag,
        definitions: BTreeMap<String, Definition>,
        aliases: DashMap<String, String, RandomState>,
        registry: Arc<ClassRegistry>,
    ) -> Self {
        let container = Self {
            inner: Arc::new(ContainerInner {
                parameters,
                definitions,
                aliases,
                instances: DashMap::with_hasher(RandomState::new()),
                registry,
                building: Mutex::new(Vec::new()),
            }),
        };
        container.inner.instances.insert(
            SERVICE_CONTAINER_ID.to_string(),
            Instance::from_arc(SERVICE_CONTAINER_ID, Arc::new(container.clone())),
        );
        container
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.inner.registry
    }

    /// Resolve aliases transitively to the concrete id
    fn canonical_id(&self, id: &str) -> Result<String> {
        let mut seen = vec![id.to_string()];
        let mut current = id.to_string();
        while let Some(target) = self.inner.aliases.get(&current).map(|t| t.clone()) {
            if seen.contains(&target) {
                seen.push(target);
                return Err(DiError::CircularAlias { chain: seen });
            }
            seen.push(target.clone());
            current = target;
        }
        Ok(current)
    }

    /// Manually inject an instance under `id`, overriding any definition
    pub fn set(&self, id: &str, instance: Instance) {
        let cid = self.canonical_id(id).unwrap_or_else(|_| id.to_string());
        self.inner.instances.insert(cid, instance);
    }

    /// Existence check; never builds anything
    pub fn has(&self, id: &str) -> bool {
        match self.canonical_id(id) {
            Ok(cid) => {
                self.inner.instances.contains_key(&cid)
                    || self.inner.definitions.contains_key(&cid)
            }
            Err(_) => false,
        }
    }

    /// Peek at an already-built (or manually set) instance without building
    pub fn instance(&self, id: &str) -> Option<Instance> {
        let cid = self.canonical_id(id).ok()?;
        self.inner.instances.get(&cid).map(|i| i.clone())
    }

    /// Return the service for `id`, building it (and its dependencies,
    /// depth-first) if needed.
    pub fn get(&self, id: &str) -> Result<Instance> {
        let cid = self.canonical_id(id)?;

        if let Some(existing) = self.inner.instances.get(&cid) {
            #[cfg(feature = "logging")]
            trace!(target: "wireup", service = %cid, "Service resolved from cache");
            return Ok(existing.clone());
        }

        let def = self
            .inner
            .definitions
            .get(&cid)
            .ok_or_else(|| DiError::unknown_service(&cid))?;

        {
            let mut building = self.inner.building.lock().expect("building marker poisoned");
            if building.contains(&cid) {
                let mut chain = building.clone();
                chain.push(cid);
                return Err(DiError::circular(chain));
            }
            building.push(cid.clone());
        }
        let result = self.build_service(&cid, def);
        self.inner
            .building
            .lock()
            .expect("building marker poisoned")
            .pop();
        let instance = result?;

        if def.is_shared() {
            self.inner.instances.insert(cid, instance.clone());
        }
        Ok(instance)
    }

    /// Ids this container can serve without falling back anywhere
    pub fn service_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .instances
            .iter()
            .map(|e| e.key().clone())
            .chain(self.inner.definitions.keys().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.inner.parameters.has(name)
    }

    /// The resolved parameter value
    pub fn get_parameter(&self, name: &str) -> Result<Value> {
        self.inner.parameters.get(name)
    }

    pub fn set_parameter(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner.parameters.set(name, value);
    }

    fn build_service(&self, id: &str, def: &Definition) -> Result<Instance> {
        let class = self.resolve_class(def.class())?;

        #[cfg(feature = "logging")]
        debug!(target: "wireup", service = id, class = %class, "Building service");

        if let Some(file) = def.file() {
            self.inner.registry.include(file)?;
        }

        let args = self.resolve_arguments(def.arguments())?;
        let instance = match def.constructor() {
            Some(factory) => self.inner.registry.construct_via(&class, factory, &args)?,
            None => self.inner.registry.construct(&class, &args)?,
        };

        for call in def.method_calls() {
            let call_args = self.resolve_arguments(call.arguments())?;
            self.inner.registry.call(&instance, call.method(), &call_args)?;
        }

        if let Some(configurator) = def.configurator() {
            self.apply_configurator(id, configurator, &instance)?;
        }

        Ok(instance)
    }

    fn resolve_class(&self, class: &ParamExpr) -> Result<String> {
        match self.inner.parameters.resolve_expr(class)? {
            Value::Str(s) => Ok(s),
            other => Err(DiError::InvalidParameter {
                name: class.to_string(),
                reason: format!("class name must resolve to a string, got {other:?}"),
            }),
        }
    }

    fn resolve_arguments(&self, values: &[Value]) -> Result<Vec<Arg>> {
        walk_arguments(values, &mut Resolving { container: self })
    }

    fn apply_configurator(
        &self,
        _id: &str,
        configurator: &Callable,
        instance: &Instance,
    ) -> Result<()> {
        match configurator {
            Callable::Function(name) => self.inner.registry.call_function(name, instance),
            Callable::Static { class, method } => {
                self.inner.registry.call_static(class, method, instance)
            }
            Callable::Service { service, method } => {
                let target = self.get(service.id())?;
                self.inner
                    .registry
                    .call(&target, method, &[Arg::Service(instance.clone())])
            }
        }
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("definitions", &self.inner.definitions.len())
            .field("instances", &self.inner.instances.len())
            .field("parameters", &self.inner.parameters.len())
            .finish()
    }
}

/// Interpreted emit strategy: references become live values and instances
struct Resolving<'a> {
    container: &'a Container,
}

impl ValueVisitor for Resolving<'_> {
    type Out = Arg;

    fn scalar(&mut self, value: &Value) -> Result<Arg> {
        Ok(Arg::Value(value.clone()))
    }

    fn parameter(&mut self, name: &str) -> Result<Arg> {
        Ok(Arg::Value(self.container.inner.parameters.get(name)?))
    }

    fn service(&mut self, id: &str) -> Result<Arg> {
        Ok(Arg::Service(self.container.get(id)?))
    }

    fn expr(&mut self, expr: &ParamExpr) -> Result<Arg> {
        Ok(Arg::Value(self.container.inner.parameters.resolve_expr(expr)?))
    }

    fn seq(&mut self, items: Vec<Arg>) -> Result<Arg> {
        Ok(Arg::Seq(items))
    }

    fn map(&mut self, entries: Vec<(String, Arg)>) -> Result<Arg> {
        Ok(Arg::Map(entries.into_iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ContainerBuilder;

    struct Transport {
        dsn: String,
    }

    struct Mailer {
        transport: Arc<Transport>,
    }

    fn registry() -> Arc<ClassRegistry> {
        let registry = ClassRegistry::new();
        registry
            .define("Transport")
            .constructor(|args: &[Arg]| {
                Ok(Transport {
                    dsn: args[0].as_str().unwrap_or_default().to_string(),
                })
            })
            .finish();
        registry
            .define("Mailer")
            .constructor(|args: &[Arg]| {
                Ok(Mailer {
                    transport: args[0].downcast::<Transport>().expect("transport arg"),
                })
            })
            .finish();
        Arc::new(registry)
    }

    #[test]
    fn builds_dependencies_depth_first() {
        let mut builder = ContainerBuilder::new();
        builder.set_parameter("dsn", "smtp://localhost");
        builder
            .register("transport", "Transport")
            .unwrap()
            .add_argument(Value::param("dsn"));
        builder
            .register("mailer", "Mailer")
            .unwrap()
            .add_argument(Value::service("transport"));

        let container = builder.build(registry());
        let mailer = container.get("mailer").unwrap();
        let mailer = mailer.downcast::<Mailer>().unwrap();
        assert_eq!(mailer.transport.dsn, "smtp://localhost");

        // transport was memoized while building mailer
        let transport = container.get("transport").unwrap();
        assert!(Arc::ptr_eq(
            &transport.downcast::<Transport>().unwrap(),
            &mailer.transport
        ));
    }

    #[test]
    fn manual_set_overrides_definition() {
        let mut builder = ContainerBuilder::new();
        builder
            .register("transport", "Transport")
            .unwrap()
            .add_argument(Value::str("declared"));

        let container = builder.build(registry());
        container.set(
            "transport",
            Instance::new(
                "Transport",
                Transport {
                    dsn: "injected".to_string(),
                },
            ),
        );
        let transport = container.get("transport").unwrap();
        assert_eq!(transport.downcast::<Transport>().unwrap().dsn, "injected");
    }

    #[test]
    fn container_registers_itself() {
        let container = Container::new(registry());
        assert!(container.has(SERVICE_CONTAINER_ID));
        let me = container.get(SERVICE_CONTAINER_ID).unwrap();
        assert!(me.downcast::<Container>().is_some());
    }

    #[test]
    fn unknown_service_is_an_error() {
        let container = Container::new(registry());
        assert!(matches!(
            container.get("ghost"),
            Err(DiError::UnknownService { .. })
        ));
        assert!(!container.has("ghost"));
    }

    #[test]
    fn alias_cycle_is_detected() {
        let mut builder = ContainerBuilder::new();
        builder.set_alias("a", "b");
        builder.set_alias("b", "a");
        let container = builder.build(registry());
        assert!(matches!(
            container.get("a"),
            Err(DiError::CircularAlias { .. })
        ));
        assert!(!container.has("a"));
    }

    #[test]
    fn runtime_parameters_can_be_added() {
        let container = Container::new(registry());
        assert!(!container.has_parameter("added"));
        container.set_parameter("added", Value::Int(1));
        assert_eq!(container.get_parameter("added").unwrap(), Value::Int(1));
    }
}
