//! Identity Extraction Module
//!
//! Replaces a sequence argument by the sorted identities of its elements, so
//! that two sequences holding the same identities in any order share a key.

use std::cmp::Ordering;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use super::Key;

/// Extracts the identity of one element. `None` is treated as a null identity.
pub type ExtractFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

// == Identity Field ==
/// How the identity of a sequence element is obtained.
#[derive(Clone)]
pub enum IdentityField {
    /// Look up a named field on object elements
    Field(String),
    /// Compute the identity with a user function
    Extractor(ExtractFn),
}

impl IdentityField {
    /// Identity from a named field.
    pub fn field(name: impl Into<String>) -> Self {
        IdentityField::Field(name.into())
    }

    /// Identity from an extractor function.
    ///
    /// Returning `None` yields the null identity. A panicking extractor is
    /// caught and treated the same way.
    pub fn extractor<F>(extract: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        IdentityField::Extractor(Arc::new(extract))
    }

    // == Extract ==
    /// Returns the identity of one element, or `Value::Null` when none exists.
    pub fn extract(&self, element: &Value) -> Value {
        let identity = match self {
            IdentityField::Field(name) => element.as_object().and_then(|obj| obj.get(name)).cloned(),
            IdentityField::Extractor(extract) => {
                match panic::catch_unwind(AssertUnwindSafe(|| extract(element))) {
                    Ok(identity) => identity,
                    Err(_) => {
                        tracing::debug!("identity extractor panicked, using null identity");
                        None
                    }
                }
            }
        };
        identity.unwrap_or(Value::Null)
    }

    // == Apply ==
    /// Rewrites the first argument of `key` when it is a sequence.
    ///
    /// Remaining arguments are left untouched. Keys whose first argument is not
    /// a sequence are returned as-is.
    pub fn apply(&self, mut key: Key) -> Key {
        let Some(Value::Array(elements)) = key.first() else {
            return key;
        };

        let count = elements.len();
        let mut identities: Vec<Value> = elements.iter().map(|e| self.extract(e)).collect();
        sort_identities(&mut identities);

        let normalized = Value::Array(identities);
        tracing::debug!(elements = count, identities = %normalized, "identity transform");

        key[0] = normalized;
        key
    }
}

impl fmt::Debug for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityField::Field(name) => f.debug_tuple("Field").field(name).finish(),
            IdentityField::Extractor(_) => f.write_str("Extractor(..)"),
        }
    }
}

impl From<&str> for IdentityField {
    fn from(name: &str) -> Self {
        IdentityField::field(name)
    }
}

impl From<String> for IdentityField {
    fn from(name: String) -> Self {
        IdentityField::Field(name)
    }
}

// == Identity Ordering ==

/// Rank of a non-null value kind, used to break ties between mixed kinds.
fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// String rendering used for lexical comparison.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_numbers(a: &serde_json::Number, b: &serde_json::Number) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x.cmp(&y);
    }
    let x = a.as_f64().unwrap_or(0.0);
    let y = b.as_f64().unwrap_or(0.0);
    x.total_cmp(&y)
}

fn compare_native(a: &Value, b: &Value) -> Ordering {
    let native = match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    };
    native.then_with(|| render(a).cmp(&render(b)))
}

/// Compares two identities.
///
/// Nulls sort first. When every non-null identity in the sequence has the
/// same kind (`mixed == false`) values compare natively, otherwise they
/// compare lexically by their rendering with the kind as tie-break. Either
/// way the order is total, so any permutation sorts to the same sequence.
///
/// In a mixed sequence even same-kind pairs compare lexically, so
/// `[10, 9, "x"]` keeps `10` before `9`. Comparing those pairs natively
/// while comparing cross-kind pairs lexically is not transitive
/// (`9 < 10`, `10 < "5"`, `"5" < 9`), and a non-transitive comparator
/// lets `sort_by` give different results for different input orders.
pub fn compare_identities(a: &Value, b: &Value, mixed: bool) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }

    if mixed {
        render(a)
            .cmp(&render(b))
            .then_with(|| kind_rank(a).cmp(&kind_rank(b)))
    } else {
        compare_native(a, b)
    }
}

/// Sorts identities in place into their canonical order.
pub fn sort_identities(identities: &mut [Value]) {
    let mut kinds = identities.iter().filter(|v| !v.is_null()).map(kind_rank);
    let mixed = match kinds.next() {
        Some(first) => kinds.any(|k| k != first),
        None => false,
    };
    identities.sort_by(|a, b| compare_identities(a, b, mixed));
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(ids: &[&str]) -> Value {
        Value::Array(
            ids.iter()
                .map(|id| json!({"id": id, "name": format!("Item {id}")}))
                .collect(),
        )
    }

    #[test]
    fn test_field_extraction_sorts_identities() {
        let field = IdentityField::field("id");
        let key = field.apply(vec![items(&["b", "a", "c"]), json!(7)]);
        assert_eq!(key, vec![json!(["a", "b", "c"]), json!(7)]);
    }

    #[test]
    fn test_non_sequence_first_argument_is_untouched() {
        let field = IdentityField::field("id");
        let key = vec![json!({"id": "a"}), json!(1)];
        assert_eq!(field.apply(key.clone()), key);
        assert!(field.apply(Vec::new()).is_empty());
    }

    #[test]
    fn test_missing_field_becomes_null_and_sorts_first() {
        let field = IdentityField::field("id");
        let key = field.apply(vec![json!([{"id": "b"}, {"other": 1}, 5])]);
        assert_eq!(key, vec![json!([null, null, "b"])]);
    }

    #[test]
    fn test_extractor_returning_none_is_null() {
        let field = IdentityField::extractor(|item| item.get("id").and_then(|v| v.as_str()).map(|s| json!(s.to_uppercase())));
        let key = field.apply(vec![json!([{"id": "b"}, {"id": 3}, {"id": "a"}])]);
        assert_eq!(key, vec![json!([null, "A", "B"])]);
    }

    #[test]
    fn test_panicking_extractor_is_null() {
        let field = IdentityField::extractor(|item| match item.get("id") {
            Some(id) => Some(id.clone()),
            None => panic!("element without id"),
        });
        let key = field.apply(vec![json!([{"id": "b"}, {"name": "x"}, {"id": "a"}])]);
        assert_eq!(key, vec![json!([null, "a", "b"])]);
    }

    #[test]
    fn test_numbers_compare_natively() {
        let mut ids = vec![json!(10), json!(9), json!(100)];
        sort_identities(&mut ids);
        assert_eq!(ids, vec![json!(9), json!(10), json!(100)]);
    }

    #[test]
    fn test_mixed_kinds_compare_lexically() {
        let mut ids = vec![json!(10), json!("9"), json!(2), json!(true)];
        sort_identities(&mut ids);
        assert_eq!(ids, vec![json!(10), json!(2), json!("9"), json!(true)]);
    }

    #[test]
    fn test_mixed_kinds_same_rendering_breaks_tie_by_kind() {
        let mut first = vec![json!("1"), json!(1)];
        let mut second = vec![json!(1), json!("1")];
        sort_identities(&mut first);
        sort_identities(&mut second);
        assert_eq!(first, second);
        assert_eq!(first, vec![json!(1), json!("1")]);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let field = IdentityField::field("id");
        let key = field.apply(vec![items(&["a", "a", "b"])]);
        assert_eq!(key, vec![json!(["a", "a", "b"])]);
    }
}
