//! End-to-end wiring scenarios shared by the interpreted and compiled
//! backends: a small mail stack with parameters, references, setter calls,
//! a configurator, a static factory and an include hook.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use wireup::{
    Arg, Callable, ClassRegistry, Container, ContainerBuilder, DiError, RustDumper, Value,
    SERVICE_CONTAINER_ID,
};

#[derive(Default)]
struct Logger {
    lines: Mutex<Vec<String>>,
}

struct Transport {
    dsn: String,
}

struct Mailer {
    transport: Arc<Transport>,
    logger: Arc<Logger>,
    retries: AtomicI64,
    finished: AtomicBool,
}

struct Newsletter {
    mailer: Arc<Mailer>,
}

fn registry() -> Arc<ClassRegistry> {
    let registry = ClassRegistry::new();

    registry
        .define("Logger")
        .constructor(|_args: &[Arg]| Ok(Logger::default()))
        .finish();

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
            let transport = args[0]
                .downcast::<Transport>()
                .ok_or_else(|| DiError::creation_failed("Mailer", "expected a Transport"))?;
            let logger = args[1]
                .downcast::<Logger>()
                .ok_or_else(|| DiError::creation_failed("Mailer", "expected a Logger"))?;
            logger.lines.lock().unwrap().push("mailer built".to_string());
            Ok(Mailer {
                transport,
                logger,
                retries: AtomicI64::new(0),
                finished: AtomicBool::new(false),
            })
        })
        .method("set_retries", |mailer: &Mailer, args: &[Arg]| {
            mailer
                .retries
                .store(args[0].as_i64().unwrap_or(0), Ordering::SeqCst);
            Ok(())
        })
        .static_method("finish", |instance| {
            let mailer = instance
                .downcast::<Mailer>()
                .ok_or_else(|| DiError::creation_failed("Mailer", "finish on a non-mailer"))?;
            mailer.finished.store(true, Ordering::SeqCst);
            Ok(())
        })
        .finish();

    registry
        .define("Newsletter")
        .factory("create", |args: &[Arg]| {
            let mailer = args[0]
                .downcast::<Mailer>()
                .ok_or_else(|| DiError::creation_failed("Newsletter", "expected a Mailer"))?;
            Ok(Newsletter { mailer })
        })
        .finish();

    Arc::new(registry)
}

fn mail_stack() -> ContainerBuilder {
    let mut builder = ContainerBuilder::new();
    builder.set_parameter("mail.host", "localhost");
    builder.set_parameter("mail.retries", 3i64);
    builder.set_parameter("transport.dsn", "smtp://%mail.host%:25");

    builder.register("logger", "Logger").unwrap();
    builder
        .register("transport", "Transport")
        .unwrap()
        .add_argument(Value::param("transport.dsn"));
    builder
        .register("mailer", "Mailer")
        .unwrap()
        .add_argument(Value::service("transport"))
        .add_argument(Value::service("logger"))
        .add_call("set_retries", vec![Value::param("mail.retries")])
        .set_configurator(Callable::static_method("Mailer", "finish"));
    builder.set_alias("mail", "mailer");
    builder
}

#[test]
fn shared_services_resolve_to_the_same_instance() {
    let container = mail_stack().build(registry());
    let first = container.get("mailer").unwrap();
    let second = container.get("mailer").unwrap();
    assert!(first.ptr_eq(&second));

    // Dependencies are shared too: the mailer's logger is the container's
    let mailer = first.downcast::<Mailer>().unwrap();
    let logger = container.get("logger").unwrap().downcast::<Logger>().unwrap();
    assert!(Arc::ptr_eq(&mailer.logger, &logger));
}

#[test]
fn prototype_services_get_fresh_instances() {
    let mut builder = mail_stack();
    builder.definition_mut("transport").unwrap().set_shared(false);

    let container = builder.build(registry());
    let first = container.get("transport").unwrap();
    let second = container.get("transport").unwrap();
    assert!(!first.ptr_eq(&second));
}

#[test]
fn setter_calls_and_configurator_run_in_order() {
    let container = mail_stack().build(registry());
    let mailer = container.get("mailer").unwrap().downcast::<Mailer>().unwrap();
    assert_eq!(mailer.retries.load(Ordering::SeqCst), 3);
    assert!(mailer.finished.load(Ordering::SeqCst));
    assert_eq!(mailer.transport.dsn, "smtp://localhost:25");
}

#[test]
fn parameters_bind_at_lookup_time() {
    let container = mail_stack().build(registry());
    // Runtime override lands before anything was built
    container.set_parameter("mail.retries", 7i64);
    let mailer = container.get("mailer").unwrap().downcast::<Mailer>().unwrap();
    assert_eq!(mailer.retries.load(Ordering::SeqCst), 7);

    // A shared service is not rebuilt when a parameter changes afterwards
    container.set_parameter("mail.retries", 9i64);
    let again = container.get("mailer").unwrap().downcast::<Mailer>().unwrap();
    assert_eq!(again.retries.load(Ordering::SeqCst), 7);
}

#[test]
fn circular_references_report_the_full_chain() {
    let mut builder = ContainerBuilder::new();
    builder
        .register("a", "Transport")
        .unwrap()
        .add_argument(Value::service("b"));
    builder
        .register("b", "Transport")
        .unwrap()
        .add_argument(Value::service("c"));
    builder
        .register("c", "Transport")
        .unwrap()
        .add_argument(Value::service("a"));

    let container = builder.build(registry());
    match container.get("a") {
        Err(DiError::CircularReference { chain }) => {
            assert_eq!(chain, vec!["a", "b", "c", "a"]);
        }
        other => panic!("expected a circular reference error, got {other:?}"),
    }

    // The compiled backend refuses the same graph up front
    assert!(matches!(
        builder.compile(registry()),
        Err(DiError::CircularReference { .. })
    ));
}

#[test]
fn aliases_are_transparent() {
    let container = mail_stack().build(registry());
    assert!(container.has("mail"));
    let via_alias = container.get("mail").unwrap();
    let direct = container.get("mailer").unwrap();
    assert!(via_alias.ptr_eq(&direct));
}

#[test]
fn compiled_and_interpreted_agree() {
    let builder = mail_stack();
    let interpreted = builder.build(registry());
    let compiled = builder.compile(registry()).unwrap();

    for id in ["logger", "transport", "mailer", "mail"] {
        let a = interpreted.get(id).unwrap();
        let b = compiled.get(id).unwrap();
        assert_eq!(a.class(), b.class(), "class mismatch for {id}");
    }

    let a = interpreted.get("mailer").unwrap().downcast::<Mailer>().unwrap();
    let b = compiled.get("mailer").unwrap().downcast::<Mailer>().unwrap();
    assert_eq!(a.transport.dsn, b.transport.dsn);
    assert_eq!(
        a.retries.load(Ordering::SeqCst),
        b.retries.load(Ordering::SeqCst)
    );
    assert_eq!(
        interpreted.get_parameter("transport.dsn").unwrap(),
        compiled.get_parameter("transport.dsn").unwrap()
    );
}

#[test]
fn static_factories_construct_services() {
    let mut builder = mail_stack();
    builder
        .register("newsletter", "Newsletter")
        .unwrap()
        .set_constructor("create")
        .add_argument(Value::service("mailer"));

    let container = builder.build(registry());
    let newsletter = container
        .get("newsletter")
        .unwrap()
        .downcast::<Newsletter>()
        .unwrap();
    let mailer = container.get("mailer").unwrap().downcast::<Mailer>().unwrap();
    assert!(Arc::ptr_eq(&newsletter.mailer, &mailer));
}

#[test]
fn class_names_may_come_from_parameters() {
    let mut builder = ContainerBuilder::new();
    builder.set_parameter("logger.class", "Logger");
    builder.register("logger", "%logger.class%").unwrap();

    let container = builder.build(registry());
    assert_eq!(container.get("logger").unwrap().class(), "Logger");
}

#[test]
fn the_container_injects_itself() {
    struct Dispatcher {
        services: Container,
    }

    let registry = registry();
    registry
        .define("Dispatcher")
        .constructor(|args: &[Arg]| {
            let services = args[0]
                .downcast::<Container>()
                .ok_or_else(|| DiError::creation_failed("Dispatcher", "expected the container"))?;
            Ok(Dispatcher {
                services: (*services).clone(),
            })
        })
        .finish();

    let mut builder = mail_stack();
    builder
        .register("dispatcher", "Dispatcher")
        .unwrap()
        .add_argument(Value::service(SERVICE_CONTAINER_ID));

    let container = builder.build(registry);
    let dispatcher = container
        .get("dispatcher")
        .unwrap()
        .downcast::<Dispatcher>()
        .unwrap();
    // The injected handle reaches the same shared services
    let inner = dispatcher.services.get("logger").unwrap();
    let outer = container.get("logger").unwrap();
    assert!(inner.ptr_eq(&outer));
}

#[test]
fn file_includes_run_before_construction() {
    let registry = registry();
    registry.on_include("config/legacy.rs", |r| {
        r.define("LegacyMailer")
            .constructor(|_args: &[Arg]| Ok(Logger::default()))
            .finish();
        Ok(())
    });

    let mut builder = ContainerBuilder::new();
    builder
        .register("legacy", "LegacyMailer")
        .unwrap()
        .set_file("config/legacy.rs");

    let container = builder.build(Arc::clone(&registry));
    assert!(!registry.has_class("LegacyMailer"));
    container.get("legacy").unwrap();
    assert!(registry.has_class("LegacyMailer"));
}

#[test]
fn unknown_services_and_parameters_are_errors() {
    let container = mail_stack().build(registry());
    assert!(matches!(
        container.get("ghost"),
        Err(DiError::UnknownService { .. })
    ));
    assert!(matches!(
        container.get_parameter("ghost"),
        Err(DiError::UnknownParameter { .. })
    ));
}

#[test]
fn dumped_source_covers_the_whole_stack() {
    let builder = mail_stack();
    let src = RustDumper::new(&builder)
        .struct_name("MailContainer")
        .dump()
        .unwrap();

    assert!(src.contains("pub struct MailContainer"));
    for method in ["get_logger", "get_transport", "get_mailer"] {
        assert!(src.contains(method), "missing {method} in dump");
    }
    // Parameters are inlined as resolved literals
    assert!(src.contains(r#""smtp://localhost:25""#));
    assert!(src.contains(r#""mail" => self.get_mailer(),"#));
}

#[cfg(feature = "yaml")]
#[test]
fn yaml_configuration_wires_the_same_stack() {
    let yaml = "\
parameters:
  mail.host: localhost
  mail.retries: 3
  transport.dsn: smtp://%mail.host%:25

services:
  logger:
    class: Logger
  transport:
    class: Transport
    arguments: [\"%transport.dsn%\"]
  mailer:
    class: Mailer
    arguments: [\"@transport\", \"@logger\"]
    calls:
      - [set_retries, [\"%mail.retries%\"]]
    configurator: [Mailer, finish]
  mail: \"@mailer\"
";
    let builder = wireup::config::load_str(yaml).unwrap();
    let container = builder.build(registry());
    let mailer = container.get("mail").unwrap().downcast::<Mailer>().unwrap();
    assert_eq!(mailer.transport.dsn, "smtp://localhost:25");
    assert_eq!(mailer.retries.load(Ordering::SeqCst), 3);
    assert!(mailer.finished.load(Ordering::SeqCst));
}
