//! Property values carried by resources.
//!
//! Provider properties are open-ended, so they are modelled as a small
//! recursive tagged union rather than typed structs. Maps are `BTreeMap`s,
//! which keeps every encoding of a value key-sorted.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// A provider property value.
///
/// `Ref` and `GetAtt` are symbolic references resolved provider-side at apply
/// time. They are opaque here and encode as `{"Ref": name}` and
/// `{"Fn::GetAtt": [resource, attribute]}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Ref(String),
    GetAtt(String, String),
}

impl Value {
    /// Same-template reference to another resource by logical name.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Ref(name.into())
    }

    /// Reference to an attribute of another resource in the same template.
    pub fn get_att(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::GetAtt(resource.into(), attribute.into())
    }

    /// Build a map value from `(key, value)` pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) if !f.is_finite() => serializer.serialize_str(non_finite(*f)),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Self::Ref(name) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Ref", name)?;
                map.end()
            }
            Self::GetAtt(resource, attribute) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::GetAtt", &[resource, attribute])?;
                map.end()
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        i64::try_from(i).map_or_else(|_| Self::String(i.to_string()), Self::Int)
    }
}

/// JSON has no NaN or infinity; these are carried as their TOML spelling.
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        if f.is_finite() {
            Self::Float(f)
        } else {
            Self::String(non_finite(f).to_owned())
        }
    }
}

fn non_finite(f: f64) -> &'static str {
    if f.is_nan() {
        "nan"
    } else if f.is_sign_positive() {
        "inf"
    } else {
        "-inf"
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Self::Map(m)
    }
}

impl From<toml::Value> for Value {
    fn from(v: toml::Value) -> Self {
        match v {
            toml::Value::String(s) => Self::String(s),
            toml::Value::Integer(i) => Self::Int(i),
            toml::Value::Float(f) => Self::from(f),
            toml::Value::Boolean(b) => Self::Bool(b),
            toml::Value::Datetime(d) => Self::String(d.to_string()),
            toml::Value::Array(items) => Self::List(items.into_iter().map(Into::into).collect()),
            toml::Value::Table(table) => {
                Self::Map(table.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_encodes_as_ref_marker() {
        let json = serde_json::to_string(&Value::reference("DataVolume")).unwrap();
        assert_eq!(json, r#"{"Ref":"DataVolume"}"#);
    }

    #[test]
    fn get_att_encodes_as_pair() {
        let json = serde_json::to_string(&Value::get_att("Server", "PrivateIp")).unwrap();
        assert_eq!(json, r#"{"Fn::GetAtt":["Server","PrivateIp"]}"#);
    }

    #[test]
    fn map_keys_are_sorted() {
        let v = Value::map([("zeta", 1_i64), ("alpha", 2_i64)]);
        assert_eq!(
            serde_json::to_string(&v).unwrap(),
            r#"{"alpha":2,"zeta":1}"#
        );
    }

    #[test]
    fn toml_tables_convert_recursively() {
        let table: toml::Value = toml::from_str(
            r#"
name = "x"
sizes = [1, 2]
[nested]
flag = true
"#,
        )
        .unwrap();
        let v = Value::from(table);
        let map = v.as_map().unwrap();
        assert_eq!(map["name"].as_str(), Some("x"));
        assert_eq!(map["sizes"].as_list().unwrap().len(), 2);
        assert_eq!(map["nested"].as_map().unwrap()["flag"], Value::Bool(true));
    }

    #[test]
    fn non_finite_floats_never_encode_as_null() {
        let table: toml::Value = toml::from_str("a = nan\nb = -inf\nc = 1.5\n").unwrap();
        let json = serde_json::to_string(&Value::from(table)).unwrap();
        assert_eq!(json, r#"{"a":"nan","b":"-inf","c":1.5}"#);
        assert_eq!(
            serde_json::to_string(&Value::Float(f64::INFINITY)).unwrap(),
            r#""inf""#
        );
    }

    #[test]
    fn oversized_unsigned_falls_back_to_string() {
        assert_eq!(Value::from(u64::MAX), Value::String(u64::MAX.to_string()));
        assert_eq!(Value::from(7_u64), Value::Int(7));
    }
}
