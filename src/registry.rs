//! Class registry: named constructors, factories, methods and include hooks
//!
//! The container addresses classes by name, but Rust has no runtime
//! reflection, so every class a definition mentions is bound here up front:
//! a plain constructor, optional named static factories, named instance
//! methods (for setter injection) and static procedures (for configurators).
//! All of them are type-erased closures dispatched by name; resolved service
//! instances travel as [`Instance`] (class name + `Arc<dyn Any>`).

use crate::value::Value;
use crate::{DiError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// A built service: its class name plus the type-erased object.
///
/// Cloning is cheap (two `Arc` bumps); clones share the underlying object,
/// so pointer equality between clones holds.
#[derive(Clone)]
pub struct Instance {
    class: Arc<str>,
    object: Arc<dyn Any + Send + Sync>,
}

impl Instance {
    pub fn new<T: Send + Sync + 'static>(class: &str, object: T) -> Self {
        Self::from_arc(class, Arc::new(object))
    }

    pub fn from_arc<T: Send + Sync + 'static>(class: &str, object: Arc<T>) -> Self {
        Self {
            class: Arc::from(class),
            object,
        }
    }

    /// The class name this instance was constructed under
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Downcast to the concrete type, if it matches
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.object).downcast::<T>().ok()
    }

    /// True when both handles point at the same underlying object
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance").field("class", &self.class).finish()
    }
}

/// A fully resolved argument: every parameter reference substituted, every
/// service reference replaced by the built instance.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Service(Instance),
    Seq(Vec<Arg>),
    Map(BTreeMap<String, Arg>),
}

impl Arg {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }

    pub fn service(&self) -> Option<&Instance> {
        match self {
            Arg::Service(i) => Some(i),
            _ => None,
        }
    }

    /// Downcast a service argument to its concrete type
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.service().and_then(Instance::downcast)
    }

    pub fn seq(&self) -> Option<&[Arg]> {
        match self {
            Arg::Seq(items) => Some(items),
            _ => None,
        }
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Value(v)
    }
}

type CtorFn = Arc<dyn Fn(&[Arg]) -> Result<Instance> + Send + Sync>;
type MethodFn = Arc<dyn Fn(&Instance, &[Arg]) -> Result<()> + Send + Sync>;
type ProcFn = Arc<dyn Fn(&Instance) -> Result<()> + Send + Sync>;
type IncludeFn = Arc<dyn Fn(&ClassRegistry) -> Result<()> + Send + Sync>;

#[derive(Default)]
struct ClassEntry {
    constructor: Option<CtorFn>,
    factories: HashMap<String, CtorFn>,
    methods: HashMap<String, MethodFn>,
    statics: HashMap<String, ProcFn>,
}

struct IncludeEntry {
    hook: IncludeFn,
    done: OnceCell<()>,
}

/// Name-addressed construction and dispatch tables.
///
/// All tables sit behind `DashMap`, so registration works through `&self`
/// and a registry can be shared between containers via `Arc`.
pub struct ClassRegistry {
    classes: DashMap<String, ClassEntry, RandomState>,
    functions: DashMap<String, ProcFn, RandomState>,
    includes: DashMap<PathBuf, Arc<IncludeEntry>, RandomState>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self {
            classes: DashMap::with_hasher(RandomState::new()),
            functions: DashMap::with_hasher(RandomState::new()),
            includes: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Start describing a class. Finish with [`ClassBuilder::finish`].
    pub fn define(&self, class: &str) -> ClassBuilder<'_> {
        ClassBuilder {
            registry: self,
            name: class.to_string(),
            entry: ClassEntry::default(),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// Register a free function usable as a configurator
    pub fn function<F>(&self, name: &str, f: F)
    where
        F: Fn(&Instance) -> Result<()> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(f));
    }

    /// Register the hook that stands in for including `path`
    pub fn on_include<F>(&self, path: impl Into<PathBuf>, hook: F)
    where
        F: Fn(&ClassRegistry) -> Result<()> + Send + Sync + 'static,
    {
        self.includes.insert(
            path.into(),
            Arc::new(IncludeEntry {
                hook: Arc::new(hook),
                done: OnceCell::new(),
            }),
        );
    }

    /// Run the include hook for `path`, at most once per registry.
    ///
    /// Repeat calls are no-ops, which keeps `file`-bearing definitions
    /// idempotent.
    pub fn include(&self, path: &Path) -> Result<()> {
        let entry = self
            .includes
            .get(path)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| DiError::UnknownFile {
                path: path.to_path_buf(),
            })?;
        entry.done.get_or_try_init(|| {
            #[cfg(feature = "logging")]
            debug!(target: "wireup", path = %path.display(), "Running include hook");
            (entry.hook)(self)
        })?;
        Ok(())
    }

    /// Instantiate `class` through its plain constructor
    pub fn construct(&self, class: &str, args: &[Arg]) -> Result<Instance> {
        let ctor = {
            let entry = self
                .classes
                .get(class)
                .ok_or_else(|| DiError::UnknownClass {
                    class: class.to_string(),
                })?;
            entry.constructor.clone().ok_or_else(|| {
                DiError::creation_failed(class, "no constructor registered")
            })?
        };
        ctor(args)
    }

    /// Instantiate `class` through the named static factory method
    pub fn construct_via(&self, class: &str, factory: &str, args: &[Arg]) -> Result<Instance> {
        let ctor = {
            let entry = self
                .classes
                .get(class)
                .ok_or_else(|| DiError::UnknownClass {
                    class: class.to_string(),
                })?;
            entry
                .factories
                .get(factory)
                .cloned()
                .ok_or_else(|| DiError::UnknownFactory {
                    class: class.to_string(),
                    method: factory.to_string(),
                })?
        };
        ctor(args)
    }

    /// Invoke a named method on a built instance
    pub fn call(&self, instance: &Instance, method: &str, args: &[Arg]) -> Result<()> {
        let class = instance.class().to_string();
        let f = {
            let entry = self
                .classes
                .get(&class)
                .ok_or_else(|| DiError::UnknownClass { class: class.clone() })?;
            entry
                .methods
                .get(method)
                .cloned()
                .ok_or_else(|| DiError::UnknownMethod {
                    class: class.clone(),
                    method: method.to_string(),
                })?
        };
        f(instance, args)
    }

    /// Invoke a static configurator method on a class
    pub fn call_static(&self, class: &str, method: &str, instance: &Instance) -> Result<()> {
        let f = {
            let entry = self
                .classes
                .get(class)
                .ok_or_else(|| DiError::UnknownClass {
                    class: class.to_string(),
                })?;
            entry
                .statics
                .get(method)
                .cloned()
                .ok_or_else(|| DiError::UnknownMethod {
                    class: class.to_string(),
                    method: method.to_string(),
                })?
        };
        f(instance)
    }

    /// Invoke a registered free function with the instance
    pub fn call_function(&self, name: &str, instance: &Instance) -> Result<()> {
        let f = self
            .functions
            .get(name)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| DiError::UnknownFunction {
                name: name.to_string(),
            })?;
        f(instance)
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.classes.len())
            .field("functions", &self.functions.len())
            .field("includes", &self.includes.len())
            .finish()
    }
}

/// Fluent builder for one class entry
pub struct ClassBuilder<'a> {
    registry: &'a ClassRegistry,
    name: String,
    entry: ClassEntry,
}

impl<'a> ClassBuilder<'a> {
    /// Bind the plain constructor
    pub fn constructor<T, F>(mut self, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&[Arg]) -> Result<T> + Send + Sync + 'static,
    {
        let class = self.name.clone();
        self.entry.constructor = Some(Arc::new(move |args| {
            Ok(Instance::new(&class, f(args)?))
        }));
        self
    }

    /// Bind a named static factory method
    pub fn factory<T, F>(mut self, method: &str, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&[Arg]) -> Result<T> + Send + Sync + 'static,
    {
        let class = self.name.clone();
        self.entry.factories.insert(
            method.to_string(),
            Arc::new(move |args| Ok(Instance::new(&class, f(args)?))),
        );
        self
    }

    /// Bind a named instance method; the receiver is downcast to `T`
    pub fn method<T, F>(mut self, method: &str, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &[Arg]) -> Result<()> + Send + Sync + 'static,
    {
        let class = self.name.clone();
        let name = method.to_string();
        self.entry.methods.insert(
            method.to_string(),
            Arc::new(move |instance, args| {
                let receiver = instance.downcast::<T>().ok_or_else(|| {
                    DiError::creation_failed(
                        class.clone(),
                        format!("receiver type mismatch for method {name}"),
                    )
                })?;
                f(&receiver, args)
            }),
        );
        self
    }

    /// Bind a static configurator method taking the instance
    pub fn static_method<F>(mut self, method: &str, f: F) -> Self
    where
        F: Fn(&Instance) -> Result<()> + Send + Sync + 'static,
    {
        self.entry.statics.insert(method.to_string(), Arc::new(f));
        self
    }

    /// Store the entry in the registry
    pub fn finish(self) {
        #[cfg(feature = "logging")]
        debug!(
            target: "wireup",
            class = %self.name,
            factories = self.entry.factories.len(),
            methods = self.entry.methods.len(),
            "Registering class"
        );
        self.registry.classes.insert(self.name, self.entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Greeter {
        greeting: Mutex<String>,
    }

    fn registry_with_greeter() -> ClassRegistry {
        let registry = ClassRegistry::new();
        registry
            .define("Greeter")
            .constructor(|args: &[Arg]| {
                Ok(Greeter {
                    greeting: Mutex::new(args[0].as_str().unwrap_or_default().to_string()),
                })
            })
            .factory("silent", |_args: &[Arg]| {
                Ok(Greeter {
                    greeting: Mutex::new(String::new()),
                })
            })
            .method("set_greeting", |g: &Greeter, args: &[Arg]| {
                *g.greeting.lock().unwrap() = args[0].as_str().unwrap_or_default().to_string();
                Ok(())
            })
            .finish();
        registry
    }

    #[test]
    fn construct_dispatches_by_name() {
        let registry = registry_with_greeter();
        let instance = registry
            .construct("Greeter", &[Arg::Value(Value::str("hi"))])
            .unwrap();
        assert_eq!(instance.class(), "Greeter");
        let greeter = instance.downcast::<Greeter>().unwrap();
        assert_eq!(*greeter.greeting.lock().unwrap(), "hi");
    }

    #[test]
    fn factory_and_method_dispatch() {
        let registry = registry_with_greeter();
        let instance = registry.construct_via("Greeter", "silent", &[]).unwrap();
        registry
            .call(&instance, "set_greeting", &[Arg::Value(Value::str("later"))])
            .unwrap();
        let greeter = instance.downcast::<Greeter>().unwrap();
        assert_eq!(*greeter.greeting.lock().unwrap(), "later");
    }

    #[test]
    fn unknown_names_are_reported() {
        let registry = registry_with_greeter();
        assert!(matches!(
            registry.construct("Nope", &[]),
            Err(DiError::UnknownClass { .. })
        ));
        assert!(matches!(
            registry.construct_via("Greeter", "nope", &[]),
            Err(DiError::UnknownFactory { .. })
        ));
        let instance = registry.construct_via("Greeter", "silent", &[]).unwrap();
        assert!(matches!(
            registry.call(&instance, "nope", &[]),
            Err(DiError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn include_hook_runs_once() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let registry = ClassRegistry::new();
        let runs = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&runs);
        registry.on_include("/legacy/greeter.rs", move |r| {
            counted.fetch_add(1, Ordering::SeqCst);
            r.define("Legacy")
                .constructor(|_args: &[Arg]| Ok(42u32))
                .finish();
            Ok(())
        });

        registry.include(Path::new("/legacy/greeter.rs")).unwrap();
        registry.include(Path::new("/legacy/greeter.rs")).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(registry.has_class("Legacy"));

        assert!(matches!(
            registry.include(Path::new("/missing.rs")),
            Err(DiError::UnknownFile { .. })
        ));
    }

    #[test]
    fn instance_clones_share_the_object() {
        let instance = Instance::new("Greeter", 7u8);
        let other = instance.clone();
        assert!(instance.ptr_eq(&other));
        assert_eq!(*other.downcast::<u8>().unwrap(), 7);
    }
}
