//! Declarative service recipes
//!
//! A [`Definition`] is pure data: how to build one service. Builder-side
//! setters mutate a single field each and return `&mut Self`, so a definition
//! can be configured fluently in any order. Definitions are only mutated
//! through a [`ContainerBuilder`](crate::ContainerBuilder); once a container
//! is built or compiled they are frozen.

use crate::value::{ParamExpr, ServiceRef, Value};
use std::path::{Path, PathBuf};

/// A post-construction method invocation
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    method: String,
    arguments: Vec<Value>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }
}

/// A callable reference invoked with the constructed instance.
///
/// Tagged variants instead of a host-language callable convention: a free
/// function name, a static method on a class, or a method on another service
/// (resolved only after that service has itself been built).
#[derive(Debug, Clone, PartialEq)]
pub enum Callable {
    Function(String),
    Static { class: String, method: String },
    Service { service: ServiceRef, method: String },
}

impl Callable {
    pub fn function(name: impl Into<String>) -> Self {
        Callable::Function(name.into())
    }

    pub fn static_method(class: impl Into<String>, method: impl Into<String>) -> Self {
        Callable::Static {
            class: class.into(),
            method: method.into(),
        }
    }

    pub fn service_method(service: impl Into<String>, method: impl Into<String>) -> Self {
        Callable::Service {
            service: ServiceRef::new(service),
            method: method.into(),
        }
    }
}

/// The declarative recipe for building one service
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    class: ParamExpr,
    constructor: Option<String>,
    arguments: Vec<Value>,
    file: Option<PathBuf>,
    calls: Vec<MethodCall>,
    configurator: Option<Callable>,
    shared: bool,
}

impl Definition {
    /// Create a definition for a class name, which may itself contain
    /// `%param%` tokens.
    pub fn new(class: &str) -> Self {
        Self {
            class: ParamExpr::parse(class),
            constructor: None,
            arguments: Vec::new(),
            file: None,
            calls: Vec::new(),
            configurator: None,
            shared: true,
        }
    }

    pub fn class(&self) -> &ParamExpr {
        &self.class
    }

    pub fn constructor(&self) -> Option<&str> {
        self.constructor.as_deref()
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn method_calls(&self) -> &[MethodCall] {
        &self.calls
    }

    pub fn configurator(&self) -> Option<&Callable> {
        self.configurator.as_ref()
    }

    /// Shared definitions yield one memoized instance per container;
    /// non-shared ones build fresh on every `get`.
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn set_class(&mut self, class: &str) -> &mut Self {
        self.class = ParamExpr::parse(class);
        self
    }

    /// Use a named static factory method instead of the plain constructor
    pub fn set_constructor(&mut self, method: impl Into<String>) -> &mut Self {
        self.constructor = Some(method.into());
        self
    }

    pub fn add_argument(&mut self, argument: impl Into<Value>) -> &mut Self {
        self.arguments.push(argument.into());
        self
    }

    pub fn set_arguments(&mut self, arguments: Vec<Value>) -> &mut Self {
        self.arguments = arguments;
        self
    }

    /// Path to include before instantiation (registered include hooks run
    /// at most once per path)
    pub fn set_file(&mut self, file: impl Into<PathBuf>) -> &mut Self {
        self.file = Some(file.into());
        self
    }

    /// Append a post-construction method call; calls run in registration
    /// order.
    pub fn add_call(&mut self, method: impl Into<String>, arguments: Vec<Value>) -> &mut Self {
        self.calls.push(MethodCall::new(method, arguments));
        self
    }

    pub fn set_configurator(&mut self, configurator: Callable) -> &mut Self {
        self.configurator = Some(configurator);
        self
    }

    pub fn set_shared(&mut self, shared: bool) -> &mut Self {
        self.shared = shared;
        self
    }
}
