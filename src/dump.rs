//! Rust source dumper
//!
//! Renders a lowered service graph as the source of a standalone container
//! struct. The generated type wraps a base [`Container`](crate::Container)
//! for instance caching, manual overrides and fallback lookups, and exposes
//! one private method per service with every parameter already substituted
//! as a literal. Compile the output into the application for zero
//! configuration work at startup.

use crate::builder::ContainerBuilder;
use crate::compile::{lower, Recipe};
use crate::definition::Callable;
use crate::value::Value;
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

/// Renders a [`ContainerBuilder`] to Rust source.
///
/// The graph is validated exactly like [`compile`](ContainerBuilder::compile)
/// before any source is written, so a dumped container can never contain a
/// reference cycle or an unknown parameter.
#[derive(Debug)]
pub struct RustDumper<'a> {
    builder: &'a ContainerBuilder,
    struct_name: String,
}

impl<'a> RustDumper<'a> {
    pub fn new(builder: &'a ContainerBuilder) -> Self {
        Self {
            builder,
            struct_name: "ProjectContainer".to_string(),
        }
    }

    /// Name of the emitted struct
    pub fn struct_name(mut self, name: impl Into<String>) -> Self {
        self.struct_name = name.into();
        self
    }

    pub fn dump(&self) -> Result<String> {
        let lowered = lower(self.builder)?;
        let methods = method_names(lowered.recipes.keys().map(String::as_str));

        let mut out = String::new();
        let name = &self.struct_name;

        let _ = writeln!(out, "// Generated by wireup. Do not edit by hand.");
        let _ = writeln!(out, "#[allow(dead_code)]");
        let _ = writeln!(out, "pub struct {name} {{");
        let _ = writeln!(out, "    base: wireup::Container,");
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
        let _ = writeln!(out, "#[allow(dead_code)]");
        let _ = writeln!(out, "impl {name} {{");
        let _ = writeln!(
            out,
            "    pub fn new(registry: std::sync::Arc<wireup::ClassRegistry>) -> Self {{"
        );
        let _ = writeln!(out, "        Self {{ base: wireup::Container::new(registry) }}");
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out);
        let _ = writeln!(out, "    pub fn base(&self) -> &wireup::Container {{");
        let _ = writeln!(out, "        &self.base");
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out);

        self.write_get(&mut out, &lowered.recipes, &lowered.aliases, &methods);
        self.write_has(&mut out, &lowered.recipes, &lowered.aliases);
        self.write_parameters(&mut out, &lowered.parameters);

        for (id, recipe) in &lowered.recipes {
            self.write_service_method(&mut out, id, recipe, &methods);
        }

        let _ = writeln!(out, "}}");
        Ok(out)
    }

    fn write_get(
        &self,
        out: &mut String,
        recipes: &BTreeMap<String, Recipe>,
        aliases: &BTreeMap<String, String>,
        methods: &BTreeMap<String, String>,
    ) {
        let _ = writeln!(
            out,
            "    pub fn get(&self, id: &str) -> wireup::Result<wireup::Instance> {{"
        );
        if recipes.is_empty() && aliases.is_empty() {
            let _ = writeln!(out, "        self.base.get(id)");
        } else {
            let _ = writeln!(out, "        match id {{");
            for id in recipes.keys() {
                let method = &methods[id];
                let _ = writeln!(out, "            {id:?} => self.{method}(),");
            }
            for (alias, target) in aliases {
                if let Some(method) = methods.get(target) {
                    let _ = writeln!(out, "            {alias:?} => self.{method}(),");
                } else {
                    let _ = writeln!(out, "            {alias:?} => self.base.get({target:?}),");
                }
            }
            let _ = writeln!(out, "            other => self.base.get(other),");
            let _ = writeln!(out, "        }}");
        }
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out);
    }

    fn write_has(
        &self,
        out: &mut String,
        recipes: &BTreeMap<String, Recipe>,
        aliases: &BTreeMap<String, String>,
    ) {
        let _ = writeln!(out, "    pub fn has(&self, id: &str) -> bool {{");
        let known: Vec<&str> = recipes
            .keys()
            .map(String::as_str)
            .chain(aliases.keys().map(String::as_str))
            .collect();
        if known.is_empty() {
            let _ = writeln!(out, "        self.base.has(id)");
        } else {
            let arms = known
                .iter()
                .map(|id| format!("{id:?}"))
                .collect::<Vec<_>>()
                .join(" | ");
            let _ = writeln!(out, "        match id {{");
            let _ = writeln!(out, "            {arms} => true,");
            let _ = writeln!(out, "            other => self.base.has(other),");
            let _ = writeln!(out, "        }}");
        }
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out);
    }

    fn write_parameters(&self, out: &mut String, parameters: &BTreeMap<String, Value>) {
        let _ = writeln!(
            out,
            "    pub fn get_parameter(&self, name: &str) -> wireup::Result<wireup::Value> {{"
        );
        if parameters.is_empty() {
            let _ = writeln!(out, "        self.base.get_parameter(name)");
        } else {
            let _ = writeln!(out, "        match name.to_lowercase().as_str() {{");
            for (name, value) in parameters {
                let rendered = render_value(value);
                let _ = writeln!(out, "            {name:?} => Ok({rendered}),");
            }
            let _ = writeln!(out, "            _ => self.base.get_parameter(name),");
            let _ = writeln!(out, "        }}");
        }
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out);

        let _ = writeln!(out, "    pub fn has_parameter(&self, name: &str) -> bool {{");
        if parameters.is_empty() {
            let _ = writeln!(out, "        self.base.has_parameter(name)");
        } else {
            let arms = parameters
                .keys()
                .map(|name| format!("{name:?}"))
                .collect::<Vec<_>>()
                .join(" | ");
            let _ = writeln!(out, "        match name.to_lowercase().as_str() {{");
            let _ = writeln!(out, "            {arms} => true,");
            let _ = writeln!(out, "            _ => self.base.has_parameter(name),");
            let _ = writeln!(out, "        }}");
        }
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out);
    }

    fn write_service_method(
        &self,
        out: &mut String,
        id: &str,
        recipe: &Recipe,
        methods: &BTreeMap<String, String>,
    ) {
        let method = &methods[id];
        let _ = writeln!(
            out,
            "    fn {method}(&self) -> wireup::Result<wireup::Instance> {{"
        );
        if recipe.shared {
            let _ = writeln!(
                out,
                "        if let Some(existing) = self.base.instance({id:?}) {{"
            );
            let _ = writeln!(out, "            return Ok(existing);");
            let _ = writeln!(out, "        }}");
        }
        let _ = writeln!(out, "        let registry = self.base.registry().clone();");
        if let Some(file) = &recipe.file {
            let path = file.display().to_string();
            let _ = writeln!(
                out,
                "        registry.include(std::path::Path::new({path:?}))?;"
            );
        }

        let args = render_args(&recipe.arguments);
        let class = &recipe.class;
        match &recipe.constructor {
            Some(factory) => {
                let _ = writeln!(
                    out,
                    "        let instance = registry.construct_via({class:?}, {factory:?}, &[{args}])?;"
                );
            }
            None => {
                let _ = writeln!(
                    out,
                    "        let instance = registry.construct({class:?}, &[{args}])?;"
                );
            }
        }

        for (call_method, arguments) in &recipe.calls {
            let call_args = render_args(arguments);
            let _ = writeln!(
                out,
                "        registry.call(&instance, {call_method:?}, &[{call_args}])?;"
            );
        }

        match &recipe.configurator {
            Some(Callable::Function(name)) => {
                let _ = writeln!(out, "        registry.call_function({name:?}, &instance)?;");
            }
            Some(Callable::Static { class, method }) => {
                let _ = writeln!(
                    out,
                    "        registry.call_static({class:?}, {method:?}, &instance)?;"
                );
            }
            Some(Callable::Service { service, method }) => {
                let target = service.id();
                let _ = writeln!(out, "        let target = self.get({target:?})?;");
                let _ = writeln!(
                    out,
                    "        registry.call(&target, {method:?}, &[wireup::Arg::Service(instance.clone())])?;"
                );
            }
            None => {}
        }

        if recipe.shared {
            let _ = writeln!(out, "        self.base.set({id:?}, instance.clone());");
        }
        let _ = writeln!(out, "        Ok(instance)");
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out);
    }
}

/// One `get_*` method name per service id. Ids are free-form strings, so
/// mangling can collide ("a.b" and "a_b"); a suffix counts up until the
/// candidate is unused, checked against every name handed out so far ("a_b_2"
/// may itself be a registered id).
fn method_names<'a>(ids: impl Iterator<Item = &'a str>) -> BTreeMap<String, String> {
    let mut taken: BTreeSet<String> = BTreeSet::new();
    let mut out = BTreeMap::new();
    for id in ids {
        let base = mangle(id);
        let mut name = base.clone();
        let mut n = 2;
        while !taken.insert(name.clone()) {
            name = format!("{base}_{n}");
            n += 1;
        }
        out.insert(id.to_string(), name);
    }
    out
}

fn mangle(id: &str) -> String {
    let mut name = String::with_capacity(id.len() + 4);
    name.push_str("get_");
    for c in id.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
        } else {
            name.push('_');
        }
    }
    name
}

fn render_args(values: &[Value]) -> String {
    values.iter().map(render_arg).collect::<Vec<_>>().join(", ")
}

/// Argument position: service references become recursive `get` calls, and
/// everything else is a literal `Arg::Value`.
fn render_arg(value: &Value) -> String {
    match value {
        Value::Service(r) => format!("wireup::Arg::Service(self.get({:?})?)", r.id()),
        Value::Seq(items) => format!(
            "wireup::Arg::Seq(vec![{}])",
            items.iter().map(render_arg).collect::<Vec<_>>().join(", ")
        ),
        Value::Map(entries) => format!(
            "wireup::Arg::Map([{}].into_iter().collect())",
            entries
                .iter()
                .map(|(k, v)| format!("({k:?}.to_string(), {})", render_arg(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        other => format!("wireup::Arg::Value({})", render_value(other)),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "wireup::Value::Null".to_string(),
        Value::Bool(b) => format!("wireup::Value::Bool({b})"),
        Value::Int(i) => format!("wireup::Value::Int({i})"),
        Value::Float(f) if f.is_nan() => "wireup::Value::Float(f64::NAN)".to_string(),
        Value::Float(f) if f.is_infinite() && *f > 0.0 => {
            "wireup::Value::Float(f64::INFINITY)".to_string()
        }
        Value::Float(f) if f.is_infinite() => {
            "wireup::Value::Float(f64::NEG_INFINITY)".to_string()
        }
        Value::Float(f) => format!("wireup::Value::Float({f:?})"),
        Value::Str(s) => format!("wireup::Value::Str({s:?}.to_string())"),
        Value::Seq(items) => format!(
            "wireup::Value::Seq(vec![{}])",
            items
                .iter()
                .map(render_value)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Value::Map(entries) => format!(
            "wireup::Value::Map([{}].into_iter().collect())",
            entries
                .iter()
                .map(|(k, v)| format!("({k:?}.to_string(), {})", render_value(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        // Lowering leaves no symbolic values behind
        Value::Param(r) => format!("wireup::Value::str({:?})", r.to_string()),
        Value::Expr(e) => format!("wireup::Value::str({:?})", e.to_string()),
        Value::Service(r) => format!("wireup::Value::service({:?})", r.id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ContainerBuilder;

    #[test]
    fn dumped_source_inlines_resolved_parameters() {
        let mut builder = ContainerBuilder::new();
        builder.set_parameter("transport", "sendmail");
        builder.set_parameter("dsn", "smtp://%transport%:25");
        builder
            .register("mailer", "Mailer")
            .unwrap()
            .add_argument(Value::param("dsn"));

        let src = RustDumper::new(&builder).dump().unwrap();
        assert!(src.contains("pub struct ProjectContainer"));
        assert!(src.contains("fn get_mailer(&self)"));
        assert!(src.contains(r#""mailer" => self.get_mailer(),"#));
        // The %transport% reference was resolved before emission
        assert!(src.contains(r#"wireup::Value::Str("smtp://sendmail:25".to_string())"#));
        assert!(!src.contains("%transport%"));
    }

    #[test]
    fn service_references_become_get_calls() {
        let mut builder = ContainerBuilder::new();
        builder.register("logger", "Logger").unwrap();
        builder
            .register("mailer", "Mailer")
            .unwrap()
            .add_argument(Value::service("logger"));

        let src = RustDumper::new(&builder).dump().unwrap();
        assert!(src.contains(r#"wireup::Arg::Service(self.get("logger")?)"#));
    }

    #[test]
    fn prototype_services_skip_the_cache() {
        let mut builder = ContainerBuilder::new();
        builder
            .register("temp", "Scratch")
            .unwrap()
            .set_shared(false);

        let src = RustDumper::new(&builder).dump().unwrap();
        assert!(!src.contains(r#"self.base.instance("temp")"#));
        assert!(!src.contains(r#"self.base.set("temp""#));
    }

    #[test]
    fn aliases_route_to_the_target_method() {
        let mut builder = ContainerBuilder::new();
        builder.register("mailer", "Mailer").unwrap();
        builder.set_alias("mail", "mailer");

        let src = RustDumper::new(&builder).dump().unwrap();
        assert!(src.contains(r#""mail" => self.get_mailer(),"#));
    }

    #[test]
    fn colliding_ids_get_distinct_method_names() {
        let names = method_names(["foo.bar", "foo_bar"].into_iter());
        assert_eq!(names["foo.bar"], "get_foo_bar");
        assert_eq!(names["foo_bar"], "get_foo_bar_2");
    }

    #[test]
    fn suffixed_names_cannot_collide_with_other_ids() {
        // "a_b_2" mangles to what the suffix scheme would hand "a_b"
        let names = method_names(["a.b", "a_b", "a_b_2"].into_iter());
        let mut assigned: Vec<&str> = names.values().map(String::as_str).collect();
        assigned.sort();
        assigned.dedup();
        assert_eq!(assigned.len(), 3, "method names must be unique: {names:?}");

        let mut builder = ContainerBuilder::new();
        for id in ["a.b", "a_b", "a_b_2"] {
            builder.register(id, "Widget").unwrap();
        }
        let src = RustDumper::new(&builder).dump().unwrap();
        assert_eq!(src.matches("fn get_a_b_2(").count(), 1);
    }

    #[test]
    fn non_finite_floats_render_as_constants() {
        assert_eq!(
            render_value(&Value::Float(f64::NAN)),
            "wireup::Value::Float(f64::NAN)"
        );
        assert_eq!(
            render_value(&Value::Float(f64::INFINITY)),
            "wireup::Value::Float(f64::INFINITY)"
        );
        assert_eq!(
            render_value(&Value::Float(f64::NEG_INFINITY)),
            "wireup::Value::Float(f64::NEG_INFINITY)"
        );
        assert_eq!(
            render_value(&Value::Float(2.5)),
            "wireup::Value::Float(2.5)"
        );
    }

    #[test]
    fn dump_rejects_invalid_graphs() {
        let mut builder = ContainerBuilder::new();
        builder
            .register("a", "A")
            .unwrap()
            .add_argument(Value::service("b"));
        builder
            .register("b", "B")
            .unwrap()
            .add_argument(Value::service("a"));
        assert!(RustDumper::new(&builder).dump().is_err());
    }
}
