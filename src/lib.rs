//! # wireup
//!
//! A dependency-injection service container: describe your services once
//! (class, constructor arguments, setter calls, configurator), then let the
//! container wire the object graph on demand, shared instances included.
//!
//! Three backends consume the same [`ContainerBuilder`]:
//!
//! - [`build`](ContainerBuilder::build): interpreted resolution, every
//!   lookup walks the definition at `get` time
//! - [`compile`](ContainerBuilder::compile): validates the whole graph up
//!   front and bakes parameters into a flat [`CompiledContainer`]
//! - [`RustDumper`]: emits the container as generated Rust source
//!
//! Rust has no runtime reflection, so class names resolve through a
//! [`ClassRegistry`] of named constructor and method closures.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use wireup::{Arg, ClassRegistry, ContainerBuilder, Value};
//!
//! struct Logger;
//!
//! struct Mailer {
//!     transport: String,
//!     logger: Arc<Logger>,
//! }
//!
//! fn main() -> wireup::Result<()> {
//!     let registry = ClassRegistry::new();
//!     registry
//!         .define("Logger")
//!         .constructor(|_args: &[Arg]| Ok(Logger))
//!         .finish();
//!     registry
//!         .define("Mailer")
//!         .constructor(|args: &[Arg]| {
//!             Ok(Mailer {
//!                 transport: args[0].as_str().unwrap_or_default().to_string(),
//!                 logger: args[1].downcast::<Logger>().unwrap(),
//!             })
//!         })
//!         .finish();
//!
//!     let mut builder = ContainerBuilder::new();
//!     builder.set_parameter("mailer.transport", "sendmail");
//!     builder.register("logger", "Logger")?;
//!     builder
//!         .register("mailer", "Mailer")?
//!         .add_argument(Value::param("mailer.transport"))
//!         .add_argument(Value::service("logger"));
//!
//!     let container = builder.build(Arc::new(registry));
//!     let mailer = container.get("mailer")?.downcast::<Mailer>().unwrap();
//!     assert_eq!(mailer.transport, "sendmail");
//!
//!     // Shared services resolve once
//!     let _ = Arc::clone(&mailer.logger);
//!     assert!(container.get("mailer")?.ptr_eq(&container.get("mailer")?));
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `logging` (default): `tracing` instrumentation under the `wireup`
//!   target
//! - `yaml` (default): the [`config`] loader for `parameters:` /
//!   `services:` documents
//! - `logging-pretty` / `logging-json`: ship a `tracing-subscriber` setup
//!   via the [`logging`] module

mod builder;
mod compile;
#[cfg(feature = "yaml")]
pub mod config;
mod container;
mod definition;
mod dump;
mod engine;
mod error;
#[cfg(feature = "logging")]
pub mod logging;
mod registry;
mod value;

pub use builder::ContainerBuilder;
pub use compile::CompiledContainer;
pub use container::{Container, SERVICE_CONTAINER_ID};
pub use definition::{Callable, Definition, MethodCall};
pub use dump::RustDumper;
pub use error::{DiError, Result};
pub use registry::{Arg, ClassBuilder, ClassRegistry, Instance};
pub use value::{ParamExpr, ParamRef, ParameterBag, Part, ServiceRef, Value};

/// Everything most callers need in one import
pub mod prelude {
    pub use crate::{
        Arg, Callable, ClassRegistry, Container, ContainerBuilder, Definition, DiError, Instance,
        Result, Value,
    };
}
