//! Parameter and argument value model
//!
//! Values keep their textual form verbatim at registration time; `%name%`
//! tokens are discovered and substituted on read, never eagerly. This is what
//! makes parameter overrides late-bound: re-registering a parameter before
//! resolution changes every value that references it.

use crate::{DiError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;

/// A raw or reference-bearing value in a service definition.
///
/// Scalars and collections pass through as-is; `Param`, `Service` and `Expr`
/// are placeholders substituted at build (or compile) time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Reference to a parameter by name, `%name%`
    Param(ParamRef),
    /// Reference to another service by id
    Service(ServiceRef),
    /// A string with interpolated parameter parts, `"...%name%..."`
    Expr(ParamExpr),
}

impl Value {
    /// Shorthand for a string value
    #[inline]
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Shorthand for a parameter reference
    #[inline]
    pub fn param(name: impl Into<String>) -> Self {
        Value::Param(ParamRef::new(name))
    }

    /// Shorthand for a service reference
    #[inline]
    pub fn service(id: impl Into<String>) -> Self {
        Value::Service(ServiceRef::new(id))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// An opaque token naming a parameter.
///
/// Renders back to `%name%` form; carries no other behavior.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamRef {
    name: String,
}

impl ParamRef {
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ParamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}%", self.name)
    }
}

/// A lightweight handle naming another service by id.
///
/// Distinct from [`ParamRef`]: services and parameters live in different
/// namespaces. Equality is by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceRef {
    id: String,
}

impl ServiceRef {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.id)
    }
}

/// One segment of a parameter string expression
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Lit(String),
    Param(ParamRef),
}

/// An ordered mix of literal text and parameter references.
///
/// The source text is kept alongside the parsed parts, so the display form
/// is byte-identical to the input, malformed `%` included.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamExpr {
    source: String,
    parts: Vec<Part>,
}

impl ParamExpr {
    /// Parse `%name%` tokens out of a string.
    ///
    /// `%%` becomes a literal `%`. A `%` without a well-formed closing token
    /// (non-empty, no whitespace) is kept as literal text.
    pub fn parse(input: &str) -> Self {
        let mut parts = Vec::new();
        let mut lit = String::new();
        let mut rest = input;

        while let Some(pos) = rest.find('%') {
            lit.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            if let Some(stripped) = after.strip_prefix('%') {
                lit.push('%');
                rest = stripped;
                continue;
            }
            match after.find('%') {
                Some(end) if end > 0 && !after[..end].contains(char::is_whitespace) => {
                    if !lit.is_empty() {
                        parts.push(Part::Lit(std::mem::take(&mut lit)));
                    }
                    parts.push(Part::Param(ParamRef::new(&after[..end])));
                    rest = &after[end + 1..];
                }
                _ => {
                    lit.push('%');
                    rest = after;
                }
            }
        }
        lit.push_str(rest);
        if !lit.is_empty() {
            parts.push(Part::Lit(lit));
        }

        Self {
            source: input.to_string(),
            parts,
        }
    }

    #[inline]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// True if any part is a parameter reference
    pub fn has_refs(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Param(_)))
    }

    /// The unescaped literal text when the expression has no references
    pub fn flatten_literal(&self) -> Option<String> {
        if self.has_refs() {
            return None;
        }
        let mut out = String::new();
        for part in &self.parts {
            if let Part::Lit(s) = part {
                out.push_str(s);
            }
        }
        Some(out)
    }

    /// The referenced name when the whole expression is a single `%name%`
    pub fn single_ref(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [Part::Param(r)] => Some(r.name()),
            _ => None,
        }
    }
}

impl fmt::Display for ParamExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl From<&str> for ParamExpr {
    fn from(s: &str) -> Self {
        ParamExpr::parse(s)
    }
}

/// Named configuration values with case-insensitive keys.
///
/// Values are stored verbatim; interpolation happens on read. A parameter
/// whose value references another parameter resolves recursively, and a
/// reference cycle is reported with the offending name chain.
pub struct ParameterBag {
    values: DashMap<String, Value, RandomState>,
}

impl ParameterBag {
    pub fn new() -> Self {
        Self {
            values: DashMap::with_hasher(RandomState::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Store a parameter. Names are lowered, so `Foo` and `foo` collide.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into().to_lowercase(), value.into());
    }

    /// Store many parameters at once
    pub fn add<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (name, value) in entries {
            self.set(name, value);
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(&name.to_lowercase())
    }

    /// The stored value, verbatim, without interpolation
    pub fn raw(&self, name: &str) -> Option<Value> {
        self.values.get(&name.to_lowercase()).map(|v| v.clone())
    }

    /// The resolved value; missing names are an error, never a silent null
    pub fn get(&self, name: &str) -> Result<Value> {
        let mut stack = Vec::new();
        self.resolve_name(name, &mut stack)
    }

    /// Resolve every embedded reference inside an arbitrary value
    pub fn resolve_value(&self, value: &Value) -> Result<Value> {
        let mut stack = Vec::new();
        self.resolve_inner(value, &mut stack)
    }

    /// Resolve a parsed string expression
    pub fn resolve_expr(&self, expr: &ParamExpr) -> Result<Value> {
        let mut stack = Vec::new();
        self.resolve_expr_inner(expr, &mut stack)
    }

    /// Registered names, lowered form
    pub fn names(&self) -> Vec<String> {
        self.values.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of all raw entries
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.values
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Copy every entry from `other`, overwriting on collision
    pub fn merge(&self, other: &ParameterBag) {
        for entry in other.values.iter() {
            self.values.insert(entry.key().clone(), entry.value().clone());
        }
    }

    fn resolve_name(&self, name: &str, stack: &mut Vec<String>) -> Result<Value> {
        let key = name.to_lowercase();
        if stack.contains(&key) {
            let mut chain = stack.clone();
            chain.push(key);
            return Err(DiError::CircularParameter { chain });
        }
        let raw = self
            .raw(&key)
            .ok_or_else(|| DiError::unknown_parameter(&key))?;
        stack.push(key);
        let resolved = self.resolve_inner(&raw, stack);
        stack.pop();
        resolved
    }

    fn resolve_inner(&self, value: &Value, stack: &mut Vec<String>) -> Result<Value> {
        match value {
            Value::Str(s) if s.contains('%') => {
                self.resolve_expr_inner(&ParamExpr::parse(s), stack)
            }
            Value::Param(r) => self.resolve_name(r.name(), stack),
            Value::Expr(e) => self.resolve_expr_inner(e, stack),
            Value::Seq(items) => Ok(Value::Seq(
                items
                    .iter()
                    .map(|v| self.resolve_inner(v, stack))
                    .collect::<Result<_>>()?,
            )),
            Value::Map(entries) => Ok(Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.resolve_inner(v, stack)?)))
                    .collect::<Result<_>>()?,
            )),
            other => Ok(other.clone()),
        }
    }

    fn resolve_expr_inner(&self, expr: &ParamExpr, stack: &mut Vec<String>) -> Result<Value> {
        // A lone %name% keeps the referenced value's type; anything mixed
        // with literal text concatenates string forms.
        if let Some(name) = expr.single_ref() {
            return self.resolve_name(name, stack);
        }
        let mut out = String::new();
        for part in expr.parts() {
            match part {
                Part::Lit(s) => out.push_str(s),
                Part::Param(r) => {
                    let resolved = self.resolve_name(r.name(), stack)?;
                    out.push_str(&scalar_to_string(r.name(), &resolved)?);
                }
            }
        }
        Ok(Value::Str(out))
    }
}

impl Default for ParameterBag {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ParameterBag {
    fn clone(&self) -> Self {
        let bag = ParameterBag::new();
        bag.merge(self);
        bag
    }
}

impl fmt::Debug for ParameterBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterBag")
            .field("count", &self.len())
            .finish()
    }
}

fn scalar_to_string(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int(n) => Ok(n.to_string()),
        Value::Float(x) => Ok(x.to_string()),
        Value::Str(s) => Ok(s.clone()),
        _ => Err(DiError::InvalidParameter {
            name: name.to_string(),
            reason: "cannot interpolate a non-scalar value into a string".to_string(),
        }),
    }
}
