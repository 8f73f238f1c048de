//! YAML configuration loader
//!
//! Maps a `parameters:` / `services:` document onto a
//! [`ContainerBuilder`]. Strings are kept verbatim so `%name%` interpolation
//! stays lazy; a leading `@` marks a service reference and `@@` escapes a
//! literal `@`. A service entry that is just a string is an alias.
//!
//! ```yaml
//! parameters:
//!   mailer.transport: sendmail
//!
//! services:
//!   mailer:
//!     class: Mailer
//!     arguments: ["%mailer.transport%", "@logger"]
//!     calls:
//!       - [set_retries, [3]]
//!   mail: "@mailer"
//! ```

use crate::builder::ContainerBuilder;
use crate::definition::Callable;
use crate::value::Value;
use crate::{DiError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[cfg(feature = "logging")]
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default)]
    parameters: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    services: BTreeMap<String, RawService>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawService {
    Alias(String),
    Definition(Box<RawDefinition>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefinition {
    class: String,
    #[serde(default)]
    arguments: Vec<serde_yaml::Value>,
    #[serde(default)]
    constructor: Option<String>,
    #[serde(default)]
    file: Option<PathBuf>,
    #[serde(default)]
    shared: Option<bool>,
    #[serde(default)]
    calls: Vec<Vec<serde_yaml::Value>>,
    #[serde(default)]
    configurator: Option<serde_yaml::Value>,
}

/// Parse a YAML document into a fresh builder
pub fn load_str(yaml: &str) -> Result<ContainerBuilder> {
    let mut builder = ContainerBuilder::new();
    merge_str(&mut builder, yaml)?;
    Ok(builder)
}

/// Read and parse a YAML file into a fresh builder
pub fn load_file(path: impl AsRef<Path>) -> Result<ContainerBuilder> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path)
        .map_err(|e| DiError::Config(format!("{}: {e}", path.display())))?;

    #[cfg(feature = "logging")]
    debug!(target: "wireup", file = %path.display(), "Loading configuration");

    load_str(&yaml)
}

/// Parse a YAML document and fold it into an existing builder. Later loads
/// override earlier ones, so call order is the layering order.
pub fn merge_str(builder: &mut ContainerBuilder, yaml: &str) -> Result<()> {
    let raw: RawFile = serde_yaml::from_str(yaml).map_err(|e| DiError::Config(e.to_string()))?;

    for (name, value) in &raw.parameters {
        builder.set_parameter(name.clone(), convert(value)?);
    }

    for (id, service) in &raw.services {
        match service {
            RawService::Alias(target) => {
                let target = target.strip_prefix('@').ok_or_else(|| {
                    DiError::Config(format!(
                        "service '{id}': alias target must start with '@', got '{target}'"
                    ))
                })?;
                builder.set_alias(id, target);
            }
            RawService::Definition(raw_def) => {
                let def = builder.register(id, &raw_def.class)?;
                for argument in &raw_def.arguments {
                    def.add_argument(convert(argument)?);
                }
                if let Some(constructor) = &raw_def.constructor {
                    def.set_constructor(constructor.clone());
                }
                if let Some(file) = &raw_def.file {
                    def.set_file(file.clone());
                }
                if let Some(shared) = raw_def.shared {
                    def.set_shared(shared);
                }
                for call in &raw_def.calls {
                    let (method, arguments) = convert_call(id, call)?;
                    def.add_call(method, arguments);
                }
                if let Some(configurator) = &raw_def.configurator {
                    def.set_configurator(convert_configurator(id, configurator)?);
                }
            }
        }
    }

    Ok(())
}

fn convert(value: &serde_yaml::Value) -> Result<Value> {
    Ok(match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(*b),
        serde_yaml::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_yaml::Value::String(s) => convert_str(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Seq(items.iter().map(convert).collect::<Result<_>>()?)
        }
        serde_yaml::Value::Mapping(entries) => {
            let mut map = BTreeMap::new();
            for (key, item) in entries {
                let key = key
                    .as_str()
                    .ok_or_else(|| DiError::Config(format!("mapping key must be a string, got {key:?}")))?;
                map.insert(key.to_string(), convert(item)?);
            }
            Value::Map(map)
        }
        serde_yaml::Value::Tagged(tagged) => convert(&tagged.value)?,
    })
}

fn convert_str(s: &str) -> Value {
    if let Some(rest) = s.strip_prefix("@@") {
        Value::Str(format!("@{rest}"))
    } else if let Some(id) = s.strip_prefix('@') {
        Value::service(id)
    } else {
        Value::str(s)
    }
}

/// A call is `[method]` or `[method, [arguments]]`
fn convert_call(id: &str, call: &[serde_yaml::Value]) -> Result<(String, Vec<Value>)> {
    let method = call
        .first()
        .and_then(serde_yaml::Value::as_str)
        .ok_or_else(|| {
            DiError::Config(format!("service '{id}': call must start with a method name"))
        })?;
    let arguments = match call.get(1) {
        None => Vec::new(),
        Some(serde_yaml::Value::Sequence(items)) => {
            items.iter().map(convert).collect::<Result<_>>()?
        }
        Some(other) => {
            return Err(DiError::Config(format!(
                "service '{id}': call arguments must be a sequence, got {other:?}"
            )))
        }
    };
    if call.len() > 2 {
        return Err(DiError::Config(format!(
            "service '{id}': call has trailing elements"
        )));
    }
    Ok((method.to_string(), arguments))
}

/// A configurator is a function name, `[@service, method]` or
/// `[Class, method]`.
fn convert_configurator(id: &str, raw: &serde_yaml::Value) -> Result<Callable> {
    match raw {
        serde_yaml::Value::String(name) => Ok(Callable::function(name.clone())),
        serde_yaml::Value::Sequence(items) if items.len() == 2 => {
            let first = items[0].as_str().ok_or_else(|| {
                DiError::invalid_configurator(id, "first element must be a string")
            })?;
            let method = items[1].as_str().ok_or_else(|| {
                DiError::invalid_configurator(id, "second element must be a method name")
            })?;
            match first.strip_prefix('@') {
                Some(service) => Ok(Callable::service_method(service, method)),
                None => Ok(Callable::static_method(first, method)),
            }
        }
        _ => Err(DiError::invalid_configurator(
            id,
            "expected a function name or a [target, method] pair",
        )),
    }
}
