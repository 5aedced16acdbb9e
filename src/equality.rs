//! Equality & Matching Resolver
//!
//! Selects how two transformed keys are judged to denote the same entry,
//! both per argument and for whole keys.

use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::key::serialized_keys_equal;

/// User-supplied per-argument equality.
pub type ArgEqualFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// User-supplied whole-key matcher.
pub type KeyMatchFn = Arc<dyn Fn(&[Value], &[Value]) -> bool + Send + Sync>;

// == Argument Equality ==
/// Per-argument equality, in resolved form.
#[derive(Clone)]
pub enum ArgEquality {
    /// Explicit user function
    Custom(ArgEqualFn),
    /// Recursive structural equality
    Deep,
    /// One level of structural equality
    Shallow,
    /// Scalars by value; containers never equal
    SameValueZero,
}

impl ArgEquality {
    /// Compares two arguments.
    pub fn equals(&self, a: &Value, b: &Value) -> bool {
        match self {
            ArgEquality::Custom(eq) => eq(a, b),
            ArgEquality::Deep => deep_equal(a, b),
            ArgEquality::Shallow => shallow_equal(a, b),
            ArgEquality::SameValueZero => same_value_zero(a, b),
        }
    }
}

impl fmt::Debug for ArgEquality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgEquality::Custom(_) => f.write_str("Custom(..)"),
            ArgEquality::Deep => f.write_str("Deep"),
            ArgEquality::Shallow => f.write_str("Shallow"),
            ArgEquality::SameValueZero => f.write_str("SameValueZero"),
        }
    }
}

// == Key Matching ==
/// Whole-key matching, in resolved form.
#[derive(Clone)]
pub enum KeyMatching {
    /// Explicit user matcher
    Custom(KeyMatchFn),
    /// Compare the single serialized element
    Serialized,
    /// Deep equality over the full key sequence
    Deep,
    /// No whole-key matcher: equal length and per-argument equality
    PerArgument,
}

impl KeyMatching {
    /// Compares a stored key against an incoming key.
    pub fn matches(&self, cache_key: &[Value], key: &[Value], args: &ArgEquality) -> bool {
        match self {
            KeyMatching::Custom(matcher) => matcher(cache_key, key),
            KeyMatching::Serialized => serialized_keys_equal(cache_key, key),
            KeyMatching::Deep => {
                cache_key.len() == key.len()
                    && cache_key.iter().zip(key).all(|(a, b)| deep_equal(a, b))
            }
            KeyMatching::PerArgument => {
                cache_key.len() == key.len()
                    && cache_key.iter().zip(key).all(|(a, b)| args.equals(a, b))
            }
        }
    }
}

impl fmt::Debug for KeyMatching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMatching::Custom(_) => f.write_str("Custom(..)"),
            KeyMatching::Serialized => f.write_str("Serialized"),
            KeyMatching::Deep => f.write_str("Deep"),
            KeyMatching::PerArgument => f.write_str("PerArgument"),
        }
    }
}

// == Resolution ==
/// The equality-related options a caller requested.
#[derive(Clone, Default)]
pub struct EqualityOptions {
    /// Explicit per-argument equality
    pub arg_equality: Option<ArgEqualFn>,
    /// Deep equality requested
    pub deep: bool,
    /// Shallow equality requested
    pub shallow: bool,
    /// Explicit whole-key matcher
    pub key_matcher: Option<KeyMatchFn>,
    /// Serializer stage active
    pub serialized: bool,
    /// Identity extraction active
    pub identity: bool,
}

/// Picks the per-argument equality by precedence.
///
/// Identity extraction produces nested sequences, so it implies deep equality
/// unless the caller asked for something explicit.
pub fn resolve_arg_equality(options: &EqualityOptions) -> ArgEquality {
    match options {
        EqualityOptions {
            arg_equality: Some(eq),
            ..
        } => ArgEquality::Custom(Arc::clone(eq)),
        EqualityOptions { deep: true, .. } => ArgEquality::Deep,
        EqualityOptions { shallow: true, .. } => ArgEquality::Shallow,
        EqualityOptions { identity: true, .. } => ArgEquality::Deep,
        _ => ArgEquality::SameValueZero,
    }
}

/// Picks the whole-key matcher by precedence.
pub fn resolve_key_matching(options: &EqualityOptions) -> KeyMatching {
    match options {
        EqualityOptions {
            key_matcher: Some(matcher),
            ..
        } => KeyMatching::Custom(Arc::clone(matcher)),
        EqualityOptions {
            serialized: true, ..
        } => KeyMatching::Serialized,
        EqualityOptions { identity: true, .. } => KeyMatching::Deep,
        _ => KeyMatching::PerArgument,
    }
}

// == Comparators ==

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Scalars compare by value, containers never compare equal.
pub fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        _ => false,
    }
}

/// Compares containers one level deep.
pub fn shallow_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| same_value_zero(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, l)| y.get(k).is_some_and(|r| same_value_zero(l, r)))
        }
        _ => same_value_zero(a, b),
    }
}

/// Recursive structural equality.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| deep_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len() && x.iter().all(|(k, l)| y.get(k).is_some_and(|r| deep_equal(l, r)))
        }
        _ => same_value_zero(a, b),
    }
}
