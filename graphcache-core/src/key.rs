//! Cache keys and field keys.
//!
//! A [`CacheKey`] is the canonical identity of a normalized entity. Keys built
//! from a type name and key-field values use the format
//! `"<type>:<value>+<value>..."`. Inside a value every `\` is written `\\` and
//! every `+` is written `\+`; inside the type name every `\` and `:` is escaped
//! the same way. Two distinct `(type, values)` tuples can never produce the
//! same key string.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Separator between the type name and the key-field values.
const TYPE_SEPARATOR: char = ':';

/// Separator between consecutive key-field values.
const VALUE_SEPARATOR: char = '+';

/// Escape character for separators occurring inside a value.
const ESCAPE: char = '\\';

/// Canonical identity of a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an arbitrary key string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build a key from a type name and its key-field values.
    pub fn from_type_and_values<I, S>(type_name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = String::with_capacity(type_name.len() + 16);
        for c in type_name.chars() {
            if c == ESCAPE || c == TYPE_SEPARATOR {
                key.push(ESCAPE);
            }
            key.push(c);
        }
        key.push(TYPE_SEPARATOR);
        for (index, value) in values.into_iter().enumerate() {
            if index > 0 {
                key.push(VALUE_SEPARATOR);
            }
            for c in value.as_ref().chars() {
                if c == ESCAPE || c == VALUE_SEPARATOR {
                    key.push(ESCAPE);
                }
                key.push(c);
            }
        }
        Self(key)
    }

    /// Key of the query root record.
    pub fn root_query() -> Self {
        Self::new("QUERY_ROOT")
    }

    /// Key of the mutation root record.
    pub fn root_mutation() -> Self {
        Self::new("MUTATION_ROOT")
    }

    /// Key of the subscription root record.
    pub fn root_subscription() -> Self {
        Self::new("SUBSCRIPTION_ROOT")
    }

    /// Whether this is one of the operation root keys.
    pub fn is_root(&self) -> bool {
        matches!(
            self.0.as_str(),
            "QUERY_ROOT" | "MUTATION_ROOT" | "SUBSCRIPTION_ROOT"
        )
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key and return the raw string.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Split a key built by [`CacheKey::from_type_and_values`] back into its
    /// unescaped type name and values. Returns `None` for keys without an
    /// unescaped type separator.
    pub fn type_and_values(&self) -> Option<(String, Vec<String>)> {
        let mut type_name = None;
        let mut values = Vec::new();
        let mut current = String::new();
        let mut chars = self.0.chars();
        while let Some(c) = chars.next() {
            match c {
                ESCAPE => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                TYPE_SEPARATOR if type_name.is_none() => {
                    type_name = Some(std::mem::take(&mut current));
                }
                VALUE_SEPARATOR if type_name.is_some() => {
                    values.push(std::mem::take(&mut current));
                }
                other => current.push(other),
            }
        }
        let type_name = type_name?;
        values.push(current);
        Some((type_name, values))
    }

    /// Field key used to report a change to `field` of this record.
    pub fn field_path(&self, field: &str) -> String {
        format!("{}.{}", self.0, field)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Build the field key for `name` called with `arguments`.
///
/// Arguments are rendered as JSON with object keys sorted at every depth, so
/// equal argument sets always produce the same key. No arguments yields the
/// bare field name.
pub fn field_key<'a, I>(name: &str, arguments: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a JsonValue)>,
{
    let mut sorted: Vec<(&str, &JsonValue)> = arguments.into_iter().collect();
    if sorted.is_empty() {
        return name.to_string();
    }
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut key = String::with_capacity(name.len() + 16);
    key.push_str(name);
    key.push_str("({");
    for (index, (arg_name, arg_value)) in sorted.into_iter().enumerate() {
        if index > 0 {
            key.push(',');
        }
        key.push_str(&JsonValue::String(arg_name.to_string()).to_string());
        key.push(':');
        write_canonical(&mut key, arg_value);
    }
    key.push_str("})");
    key
}

fn write_canonical(out: &mut String, value: &JsonValue) {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<(&String, &JsonValue)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (index, (k, v)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&JsonValue::String(k.clone()).to_string());
                out.push(':');
                write_canonical(out, v);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_from_type_and_values() {
        let key = CacheKey::from_type_and_values("User", ["42"]);
        assert_eq!(key.as_str(), "User:42");

        let key = CacheKey::from_type_and_values("Book", ["isbn", "7"]);
        assert_eq!(key.as_str(), "Book:isbn+7");
    }

    #[test]
    fn test_separator_inside_value_is_escaped() {
        let joined = CacheKey::from_type_and_values("T", ["a+b"]);
        let split = CacheKey::from_type_and_values("T", ["a", "b"]);
        assert_ne!(joined, split);
        assert_eq!(joined.as_str(), "T:a\\+b");

        let backslash = CacheKey::from_type_and_values("T", ["a\\", "b"]);
        let escaped_plus = CacheKey::from_type_and_values("T", ["a\\+b"]);
        assert_ne!(backslash, escaped_plus);
    }

    #[test]
    fn test_separator_inside_type_name_is_escaped() {
        let in_type = CacheKey::from_type_and_values("a:b", ["c"]);
        let in_value = CacheKey::from_type_and_values("a", ["b:c"]);
        assert_ne!(in_type, in_value);
        assert_eq!(in_type.as_str(), "a\\:b:c");
        assert_eq!(in_value.as_str(), "a:b:c");

        let (type_name, values) = in_type.type_and_values().expect("typed key");
        assert_eq!(type_name, "a:b");
        assert_eq!(values, vec!["c".to_string()]);
        let (type_name, values) = in_value.type_and_values().expect("typed key");
        assert_eq!(type_name, "a");
        assert_eq!(values, vec!["b:c".to_string()]);
    }

    #[test]
    fn test_type_and_values_inverts_construction() {
        let key = CacheKey::from_type_and_values("T", ["x+y", "z\\", ""]);
        let (type_name, values) = key.type_and_values().expect("typed key");
        assert_eq!(type_name, "T");
        assert_eq!(values, vec!["x+y".to_string(), "z\\".to_string(), String::new()]);
        assert!(CacheKey::new("plain").type_and_values().is_none());
    }

    #[test]
    fn test_root_keys() {
        assert_eq!(CacheKey::root_query().as_str(), "QUERY_ROOT");
        assert_eq!(CacheKey::root_mutation().as_str(), "MUTATION_ROOT");
        assert!(CacheKey::root_subscription().is_root());
        assert!(!CacheKey::new("User:1").is_root());
    }

    #[test]
    fn test_field_key_without_arguments() {
        assert_eq!(field_key("name", std::iter::empty()), "name");
    }

    #[test]
    fn test_field_key_is_canonical() {
        let first = json!({"b": 2, "a": {"y": 1, "x": [true, null]}});
        let id = json!("1");
        let a = field_key("user", [("id", &id), ("filter", &first)]);
        let b = field_key("user", [("filter", &first), ("id", &id)]);
        assert_eq!(a, b);
        assert_eq!(
            a,
            r#"user({"filter":{"a":{"x":[true,null],"y":1},"b":2},"id":"1"})"#
        );
    }

    #[test]
    fn test_field_path() {
        let key = CacheKey::new("user:1");
        assert_eq!(key.field_path("name"), "user:1.name");
    }
}
