use std::collections::BTreeMap;

use super::QueryError;

/// A single query-string value after bracket expansion.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Single(String),
    Many(Vec<String>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// All scalar values in the order they appeared.
    pub fn values(&self) -> Vec<&str> {
        match self {
            ParamValue::Single(v) => vec![v.as_str()],
            ParamValue::Many(vs) => vs.iter().map(String::as_str).collect(),
            ParamValue::Map(_) => Vec::new(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            ParamValue::Single(first) => {
                *self = ParamValue::Many(vec![std::mem::take(first), value]);
            }
            ParamValue::Many(vs) => vs.push(value),
            ParamValue::Map(_) => unreachable!("push is only called on scalars"),
        }
    }
}

/// Query parameters of one request, keyed by field name.
///
/// `price[gte]=500&price[lt]=900` becomes `price => Map{gte: "500", lt: "900"}`;
/// a repeated plain key becomes `Many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(BTreeMap<String, ParamValue>);

impl QueryParams {
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let mut params = QueryParams::default();
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            params.insert_pair(&key, value.into_owned())?;
        }
        Ok(params)
    }

    fn insert_pair(&mut self, key: &str, value: String) -> Result<(), QueryError> {
        match split_bracket(key) {
            Some((base, sub)) => {
                let entry = self
                    .0
                    .entry(base.to_string())
                    .or_insert_with(|| ParamValue::Map(BTreeMap::new()));
                let ParamValue::Map(map) = entry else {
                    return Err(QueryError::ConflictingParam(base.to_string()));
                };
                match map.get_mut(sub) {
                    Some(existing) => existing.push(value),
                    None => {
                        map.insert(sub.to_string(), ParamValue::Single(value));
                    }
                }
            }
            None => match self.0.get_mut(key) {
                Some(ParamValue::Map(_)) => {
                    return Err(QueryError::ConflictingParam(key.to_string()));
                }
                Some(existing) => existing.push(value),
                None => {
                    self.0.insert(key.to_string(), ParamValue::Single(value));
                }
            },
        }
        Ok(())
    }

    /// Overwrites `key` with a single value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), ParamValue::Single(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Scalar values of `key` joined with commas, for list-like controls.
    pub fn joined(&self, key: &str) -> Option<String> {
        let joined = self.get(key)?.values().join(",");
        if joined.trim().is_empty() {
            None
        } else {
            Some(joined)
        }
    }

    /// Last scalar value of `key`.
    pub fn last(&self, key: &str) -> Option<&str> {
        self.get(key)?.values().last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }
}

/// `price[gte]` -> `("price", "gte")`. Only the first bracket pair counts.
fn split_bracket(key: &str) -> Option<(&str, &str)> {
    let open = key.find('[')?;
    let close = key[open..].find(']')? + open;
    let base = &key[..open];
    let sub = &key[open + 1..close];
    if base.is_empty() || sub.is_empty() {
        return None;
    }
    Some((base, sub))
}
