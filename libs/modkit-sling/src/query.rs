//! Query-struct flattening and URL query merging.
//!
//! Any `Serialize` struct or map can be attached to a request as query
//! parameters. Field names become keys (`#[serde(rename = "...")]` picks
//! another one) and empty fields are dropped with
//! `#[serde(skip_serializing_if = "...")]`:
//!
//! ```
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct IssueListParams {
//!     #[serde(skip_serializing_if = "String::is_empty")]
//!     state: String,
//!     #[serde(skip_serializing_if = "modkit_sling::query::is_default")]
//!     per_page: u32,
//!     #[serde(serialize_with = "modkit_sling::query::comma")]
//!     labels: Vec<String>,
//! }
//!
//! let params = IssueListParams {
//!     state: "open".to_owned(),
//!     per_page: 0,
//!     labels: vec!["bug".to_owned(), "ui".to_owned()],
//! };
//! let pairs = modkit_sling::query::flatten(&params).unwrap();
//! assert_eq!(pairs, vec![
//!     ("state".to_owned(), "open".to_owned()),
//!     ("labels".to_owned(), "bug,ui".to_owned()),
//! ]);
//! ```
//!
//! Sequence fields repeat their key once per element unless one of the join
//! helpers ([`comma`], [`space`], [`semicolon`]) is selected for the field.
//! Nested structs flatten to `parent[child]` keys.

use crate::error::EncodeError;
use crate::finite::ensure_finite;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use url::form_urlencoded;

/// How merged query parameters are written into the request URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum QueryEncoding {
    /// `application/x-www-form-urlencoded` keys and values
    #[default]
    UrlEncoded,
    /// `key=value` pairs written as given, for APIs that expect literal
    /// characters such as `,` or `:` in the query
    Verbatim,
}

impl QueryEncoding {
    fn encode(self, pairs: &[(String, String)]) -> String {
        match self {
            QueryEncoding::UrlEncoded => form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish(),
            QueryEncoding::Verbatim => pairs
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join("&"),
        }
    }
}

/// Flatten `value` into key/value pairs in field declaration order.
///
/// `None` and `()` flatten to no pairs at all.
///
/// # Errors
/// Returns [`EncodeError`] when the value is not a struct or map, contains
/// nested sequences or non-finite floats, or its `Serialize` implementation
/// fails.
pub fn flatten<T: Serialize + ?Sized>(value: &T) -> Result<Vec<(String, String)>, EncodeError> {
    ensure_finite(value)?;
    match serde_json::to_value(value)? {
        Value::Null => Ok(Vec::new()),
        Value::Object(fields) => {
            let mut pairs = Vec::with_capacity(fields.len());
            for (key, field) in fields {
                push_pairs(&mut pairs, key, field)?;
            }
            Ok(pairs)
        }
        other => Err(EncodeError::Unsupported(format!(
            "expected a struct or map, got {}",
            describe(&other)
        ))),
    }
}

fn push_pairs(
    pairs: &mut Vec<(String, String)>,
    key: String,
    value: Value,
) -> Result<(), EncodeError> {
    match value {
        Value::Array(items) => {
            for item in items {
                if matches!(item, Value::Array(_)) {
                    return Err(EncodeError::Unsupported(format!(
                        "nested sequence in field '{key}'"
                    )));
                }
                push_pairs(pairs, key.clone(), item)?;
            }
        }
        Value::Object(fields) => {
            for (child, field) in fields {
                push_pairs(pairs, format!("{key}[{child}]"), field)?;
            }
        }
        scalar => pairs.push((key, scalar_to_string(scalar))),
    }
    Ok(())
}

fn scalar_to_string(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a map",
    }
}

/// Sort pairs by key, keeping the relative order of values that share a key.
pub(crate) fn sort_pairs(pairs: &mut [(String, String)]) {
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
}

/// Merge `pairs` into the query string of `url`.
///
/// Existing parameters come first, then `pairs` in order; the result is
/// key-sorted and written with `encoding`. Repeated keys stay repeated. The
/// rest of `url` is kept as written.
pub(crate) fn merge_into(
    url: &str,
    pairs: Vec<(String, String)>,
    encoding: QueryEncoding,
) -> String {
    let (rest, fragment) = match url.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (url, None),
    };
    let (target, query) = rest.split_once('?').unwrap_or((rest, ""));

    let mut merged: Vec<(String, String)> =
        form_urlencoded::parse(query.as_bytes()).into_owned().collect();
    merged.extend(pairs);
    sort_pairs(&mut merged);

    let mut merged_url = target.to_owned();
    if !merged.is_empty() {
        merged_url.push('?');
        merged_url.push_str(&encoding.encode(&merged));
    }
    if let Some(fragment) = fragment {
        merged_url.push('#');
        merged_url.push_str(fragment);
    }
    merged_url
}

/// `skip_serializing_if` helper: omit a field holding its type's default
/// (`0`, `false`, `""`, empty collections).
#[must_use]
pub fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

struct Joined<'a, T> {
    values: &'a [T],
    separator: &'static str,
}

impl<T: fmt::Display> fmt::Display for Joined<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(self.separator)?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

macro_rules! join_mode {
    ($(#[$doc:meta])* $name:ident => $separator:literal) => {
        $(#[$doc])*
        ///
        /// # Errors
        /// Propagates the serializer's error.
        pub fn $name<V, T, S>(values: &V, serializer: S) -> Result<S::Ok, S::Error>
        where
            V: AsRef<[T]> + ?Sized,
            T: fmt::Display,
            S: Serializer,
        {
            serializer.collect_str(&Joined {
                values: values.as_ref(),
                separator: $separator,
            })
        }
    };
}

join_mode! {
    /// `serialize_with` helper: join a sequence field into one comma-separated value.
    comma => ","
}

join_mode! {
    /// `serialize_with` helper: join a sequence field into one space-separated value.
    space => " "
}

join_mode! {
    /// `serialize_with` helper: join a sequence field into one semicolon-separated value.
    semicolon => ";"
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn pair(key: &str, value: &str) -> (String, String) {
        (key.to_owned(), value.to_owned())
    }

    #[derive(Serialize)]
    struct Paging {
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<String>,
        #[serde(skip_serializing_if = "is_default")]
        limit: u32,
    }

    #[derive(Serialize)]
    struct Search {
        q: String,
        tags: Vec<&'static str>,
        #[serde(serialize_with = "space")]
        words: Vec<&'static str>,
        #[serde(serialize_with = "semicolon")]
        ids: Vec<u32>,
        exact: bool,
        since: Option<u64>,
    }

    #[test]
    fn test_omit_empty_fields() {
        let pairs = flatten(&Paging {
            cursor: None,
            limit: 0,
        })
        .unwrap();
        assert!(pairs.is_empty());

        let pairs = flatten(&Paging {
            cursor: Some("abc".to_owned()),
            limit: 30,
        })
        .unwrap();
        assert_eq!(pairs, vec![pair("cursor", "abc"), pair("limit", "30")]);
    }

    #[test]
    fn test_sequences_repeat_or_join() {
        let pairs = flatten(&Search {
            q: "rust lang".to_owned(),
            tags: vec!["a", "b"],
            words: vec!["fast", "safe"],
            ids: vec![1, 2, 3],
            exact: true,
            since: None,
        })
        .unwrap();

        assert_eq!(
            pairs,
            vec![
                pair("q", "rust lang"),
                pair("tags", "a"),
                pair("tags", "b"),
                pair("words", "fast safe"),
                pair("ids", "1;2;3"),
                pair("exact", "true"),
                pair("since", ""),
            ]
        );
    }

    #[test]
    fn test_comma_join() {
        #[derive(Serialize)]
        struct Fields {
            #[serde(serialize_with = "comma")]
            fields: Vec<String>,
        }

        let pairs = flatten(&Fields {
            fields: vec!["id".to_owned(), "name".to_owned()],
        })
        .unwrap();
        assert_eq!(pairs, vec![pair("fields", "id,name")]);
    }

    #[test]
    fn test_nested_struct_uses_brackets() {
        #[derive(Serialize)]
        struct Filter {
            owner: Owner,
        }
        #[derive(Serialize)]
        struct Owner {
            login: &'static str,
        }

        let pairs = flatten(&Filter {
            owner: Owner { login: "octocat" },
        })
        .unwrap();
        assert_eq!(pairs, vec![pair("owner[login]", "octocat")]);
    }

    #[test]
    fn test_maps_and_none() {
        let mut map = BTreeMap::new();
        map.insert("b", 2);
        map.insert("a", 1);
        assert_eq!(flatten(&map).unwrap(), vec![pair("a", "1"), pair("b", "2")]);

        assert!(flatten(&None::<Paging>).unwrap().is_empty());
    }

    #[test]
    fn test_non_struct_values_rejected() {
        assert!(matches!(flatten(&42), Err(EncodeError::Unsupported(_))));
        assert!(matches!(
            flatten(&vec!["a", "b"]),
            Err(EncodeError::Unsupported(_))
        ));

        let mut nested = BTreeMap::new();
        nested.insert("grid", vec![vec![1, 2], vec![3]]);
        assert!(matches!(flatten(&nested), Err(EncodeError::Unsupported(_))));
    }

    #[test]
    fn test_non_finite_floats_rejected() {
        #[derive(Serialize)]
        struct Bounds {
            min: f64,
            max: f32,
        }

        assert!(matches!(
            flatten(&Bounds {
                min: f64::NAN,
                max: 1.0,
            }),
            Err(EncodeError::NonFiniteFloat(_))
        ));
        assert!(matches!(
            flatten(&Bounds {
                min: 0.5,
                max: f32::INFINITY,
            }),
            Err(EncodeError::NonFiniteFloat(_))
        ));
        assert_eq!(
            flatten(&Bounds { min: 0.5, max: 2.0 }).unwrap(),
            vec![pair("min", "0.5"), pair("max", "2.0")]
        );
    }

    #[test]
    fn test_merge_is_additive_and_key_sorted() {
        let merged = merge_into(
            "http://a.io/items?limit=30",
            vec![pair("kind_name", "recent"), pair("count", "25"), pair("limit", "5")],
            QueryEncoding::UrlEncoded,
        );
        assert_eq!(
            merged,
            "http://a.io/items?count=25&kind_name=recent&limit=30&limit=5"
        );
    }

    #[test]
    fn test_merge_keeps_url_as_written() {
        let merged = merge_into(
            "http://a.io",
            vec![pair("limit", "30"), pair("count", "25")],
            QueryEncoding::UrlEncoded,
        );
        assert_eq!(merged, "http://a.io?count=25&limit=30");

        let merged = merge_into(
            "http://a.io/docs#usage",
            vec![pair("v", "2")],
            QueryEncoding::UrlEncoded,
        );
        assert_eq!(merged, "http://a.io/docs?v=2#usage");
    }

    #[test]
    fn test_merge_escapes_values() {
        let merged = merge_into(
            "http://a.io/search",
            vec![pair("q", "rust & go"), pair("path", "a/b")],
            QueryEncoding::UrlEncoded,
        );
        assert_eq!(merged, "http://a.io/search?path=a%2Fb&q=rust+%26+go");
    }

    #[test]
    fn test_merge_verbatim_writes_values_as_given() {
        let merged = merge_into(
            "http://a.io/search?sort=updated%3Adesc",
            vec![pair("fields", "id,name"), pair("at", "12:00")],
            QueryEncoding::Verbatim,
        );
        assert_eq!(
            merged,
            "http://a.io/search?at=12:00&fields=id,name&sort=updated:desc"
        );
    }

    #[test]
    fn test_merge_nothing_clears_empty_query() {
        let merged = merge_into("http://a.io/?", Vec::new(), QueryEncoding::UrlEncoded);
        assert_eq!(merged, "http://a.io/");
    }
}
