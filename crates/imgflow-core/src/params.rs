//! Operator configuration entries and typed access to their parameters.
//!
//! Operator parameters are an opaque string map: the transformer only
//! threads them through, each operator parses the keys it understands.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// String key/value configuration, as produced by an external config loader.
pub type KvConf = BTreeMap<String, String>;

/// One named step of an operator chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpConfig {
    /// Operator name, e.g. `decode`, `resize`, `crop`
    #[serde(rename = "op")]
    pub name: String,

    /// Operator-specific parameters.
    ///
    /// In TOML, scalar values of any type are accepted and stored as strings;
    /// arrays are joined with `,` (`scale = [0.08, 1.0]` reads as `"0.08,1"`).
    #[serde(default, deserialize_with = "deserialize_params")]
    pub params: KvConf,
}

impl OpConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: KvConf::new(),
        }
    }

    /// Builder-style parameter insertion.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// Typed view over this entry's parameters.
    pub fn params(&self) -> OpParams<'_> {
        OpParams::new(&self.params)
    }
}

fn deserialize_params<'de, D>(deserializer: D) -> Result<KvConf, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, toml::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| (k, value_to_string(&v)))
        .collect())
}

fn value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
        toml::Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Read-only typed accessors over an operator's string parameters.
///
/// Missing keys and unparsable values both read as `None`; unparsable values
/// are logged so a typo in a config does not go unnoticed.
#[derive(Debug, Clone, Copy)]
pub struct OpParams<'a> {
    conf: &'a KvConf,
}

impl<'a> OpParams<'a> {
    pub fn new(conf: &'a KvConf) -> Self {
        Self { conf }
    }

    /// Raw string value, `None` when absent or empty.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.conf
            .get(key)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        let value = self.get(key)?;
        match value.parse::<i64>() {
            Ok(v) => Some(v),
            // "224.0" and friends are accepted as integers
            Err(_) => match value.parse::<f64>() {
                Ok(f) if f.is_finite() => Some(f as i64),
                _ => {
                    tracing::warn!("Cannot parse '{}' = {:?} as integer", key, value);
                    None
                }
            },
        }
    }

    pub fn get_int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key).unwrap_or(default)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        let value = self.get(key)?;
        match value.parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Cannot parse '{}' = {:?} as float", key, value);
                None
            }
        }
    }

    /// Comma-separated floats. `None` if absent, empty, or any item is invalid.
    pub fn get_floats(&self, key: &str) -> Option<Vec<f64>> {
        let value = self.get(key)?;
        let parsed: Result<Vec<f64>, _> = value
            .split(',')
            .map(|item| item.trim().parse::<f64>())
            .collect();
        match parsed {
            Ok(values) if !values.is_empty() => Some(values),
            Ok(_) => None,
            Err(_) => {
                tracing::warn!("Cannot parse '{}' = {:?} as float list", key, value);
                None
            }
        }
    }

    /// Comma-separated integers (floats are truncated).
    pub fn get_ints(&self, key: &str) -> Option<Vec<i64>> {
        self.get_floats(key)
            .map(|values| values.into_iter().map(|v| v as i64).collect())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let op = OpConfig::new("resize")
            .param("resize_w", 224)
            .param("scale", "0.08, 1.0")
            .param("bad", "abc")
            .param("empty", "");
        let params = op.params();

        assert_eq!(params.get_int("resize_w"), Some(224));
        assert_eq!(params.get_floats("scale"), Some(vec![0.08, 1.0]));
        assert_eq!(params.get_ints("scale"), Some(vec![0, 1]));
        assert_eq!(params.get_int("bad"), None);
        assert_eq!(params.get_int("missing"), None);
        assert_eq!(params.get("empty"), None);
        assert_eq!(params.get_int_or("missing", 5), 5);
        assert!(params.contains("resize_w"));
    }

    #[test]
    fn test_int_accepts_float_text() {
        let op = OpConfig::new("crop").param("crop_w", "100.0");
        assert_eq!(op.params().get_int("crop_w"), Some(100));
    }

    #[test]
    fn test_deserialize_mixed_toml_values() {
        let op: OpConfig = toml::from_str(
            r#"
            op = "random_crop"
            [params]
            scale = [0.08, 1.0]
            final_size = [224, 224]
            interpolation = 4
            random = true
            note = "x"
            "#,
        )
        .unwrap();

        assert_eq!(op.name, "random_crop");
        assert_eq!(op.params["final_size"], "224,224");
        assert_eq!(op.params["interpolation"], "4");
        assert_eq!(op.params["random"], "1");
        assert_eq!(op.params["note"], "x");
        assert_eq!(op.params().get_floats("scale"), Some(vec![0.08, 1.0]));
    }

    #[test]
    fn test_deserialize_without_params() {
        let op: OpConfig = toml::from_str(r#"op = "decode""#).unwrap();
        assert!(op.params.is_empty());
    }
}
