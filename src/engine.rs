//! The one value traversal shared by every backend
//!
//! Interpreted resolution, ahead-of-time compilation and source dumping all
//! walk the same value trees: arguments, method-call arguments, class-name
//! expressions. The walk lives here once, parameterized by a [`ValueVisitor`]
//! that decides what a parameter reference, a service reference or a literal
//! turns into (an instance, a baked value, or emitted source).

use crate::definition::{Callable, Definition};
use crate::value::{ParamExpr, Value};
use crate::Result;

/// Emit strategy for one traversal of a value tree
pub(crate) trait ValueVisitor {
    type Out;

    /// A literal scalar or an already-plain string
    fn scalar(&mut self, value: &Value) -> Result<Self::Out>;

    /// A `%name%` reference standing alone (type-preserving position)
    fn parameter(&mut self, name: &str) -> Result<Self::Out>;

    /// A reference to another service by id
    fn service(&mut self, id: &str) -> Result<Self::Out>;

    /// A string expression mixing literal text and references
    fn expr(&mut self, expr: &ParamExpr) -> Result<Self::Out>;

    /// An ordered collection of already-visited children
    fn seq(&mut self, items: Vec<Self::Out>) -> Result<Self::Out>;

    /// A keyed collection of already-visited children
    fn map(&mut self, entries: Vec<(String, Self::Out)>) -> Result<Self::Out>;
}

/// Walk one value depth-first, dispatching into the visitor.
///
/// Plain strings containing `%` are parsed here, which is what makes
/// interpolation lazy: the stored value stays verbatim until a backend
/// actually reads it.
pub(crate) fn walk_value<V: ValueVisitor>(value: &Value, visitor: &mut V) -> Result<V::Out> {
    match value {
        Value::Param(r) => visitor.parameter(r.name()),
        Value::Service(r) => visitor.service(r.id()),
        Value::Expr(e) => walk_expr(e, visitor),
        Value::Str(s) if s.contains('%') => walk_expr(&ParamExpr::parse(s), visitor),
        Value::Seq(items) => {
            let out = items
                .iter()
                .map(|v| walk_value(v, visitor))
                .collect::<Result<Vec<_>>>()?;
            visitor.seq(out)
        }
        Value::Map(entries) => {
            let out = entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), walk_value(v, visitor)?)))
                .collect::<Result<Vec<_>>>()?;
            visitor.map(out)
        }
        other => visitor.scalar(other),
    }
}

fn walk_expr<V: ValueVisitor>(expr: &ParamExpr, visitor: &mut V) -> Result<V::Out> {
    if let Some(name) = expr.single_ref() {
        visitor.parameter(name)
    } else if let Some(flat) = expr.flatten_literal() {
        // Only %% escapes, no actual references
        visitor.scalar(&Value::Str(flat))
    } else {
        visitor.expr(expr)
    }
}

/// Visit every value position of a definition with the same visitor
pub(crate) fn walk_arguments<V: ValueVisitor>(
    arguments: &[Value],
    visitor: &mut V,
) -> Result<Vec<V::Out>> {
    arguments.iter().map(|v| walk_value(v, visitor)).collect()
}

/// Service ids referenced anywhere inside a value tree
pub(crate) fn collect_service_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Service(r) => out.push(r.id().to_string()),
        Value::Seq(items) => {
            for item in items {
                collect_service_refs(item, out);
            }
        }
        Value::Map(entries) => {
            for item in entries.values() {
                collect_service_refs(item, out);
            }
        }
        _ => {}
    }
}

/// Service ids a definition depends on: constructor arguments, method-call
/// arguments and a service-targeting configurator.
pub(crate) fn definition_dependencies(def: &Definition) -> Vec<String> {
    let mut out = Vec::new();
    for argument in def.arguments() {
        collect_service_refs(argument, &mut out);
    }
    for call in def.method_calls() {
        for argument in call.arguments() {
            collect_service_refs(argument, &mut out);
        }
    }
    if let Some(Callable::Service { service, .. }) = def.configurator() {
        out.push(service.id().to_string());
    }
    out
}
