use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

/// Comparison operators accepted inside a bracketed query key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl CompareOp {
    /// Exact-token lookup for `key[op]` operators. `eq` and `in` are not
    /// accepted from the query string.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "gt" => Some(CompareOp::Gt),
            "gte" => Some(CompareOp::Gte),
            "lt" => Some(CompareOp::Lt),
            "lte" => Some(CompareOp::Lte),
            "ne" => Some(CompareOp::Ne),
            _ => None,
        }
    }

    /// Store-native spelling.
    pub fn native(self) -> &'static str {
        match self {
            CompareOp::Eq => "$eq",
            CompareOp::Ne => "$ne",
            CompareOp::Gt => "$gt",
            CompareOp::Gte => "$gte",
            CompareOp::Lt => "$lt",
            CompareOp::Lte => "$lte",
            CompareOp::In => "$in",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: CompareOp,
    /// For `In` this is always an array.
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn matches(&self, doc: &Value) -> bool {
        let actual = doc.get(&self.field);
        match self.op {
            CompareOp::Eq => actual.is_some_and(|a| json_eq(a, &self.value)),
            CompareOp::Ne => !actual.is_some_and(|a| json_eq(a, &self.value)),
            CompareOp::In => match (&self.value, actual) {
                (Value::Array(options), Some(a)) => options.iter().any(|o| json_eq(a, o)),
                _ => false,
            },
            op => {
                let Some(ordering) = actual.and_then(|a| compare_same_type(a, &self.value)) else {
                    return false;
                };
                match op {
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::Gte => ordering != Ordering::Less,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Lte => ordering != Ordering::Greater,
                    _ => unreachable!("non-ordering operators handled above"),
                }
            }
        }
    }
}

/// Conjunction of field conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn eq(self, field: impl Into<String>, value: Value) -> Self {
        self.and(Condition::new(field, CompareOp::Eq, value))
    }

    pub fn merge(mut self, other: Filter) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }

    /// Renders the filter in the store's native document form, e.g.
    /// `{"price": {"$gte": 500}, "difficulty": "easy"}`.
    pub fn to_document(&self) -> Value {
        let mut root = Map::new();
        for c in &self.conditions {
            match c.op {
                CompareOp::Eq => {
                    root.insert(c.field.clone(), c.value.clone());
                }
                op => {
                    let slot = root
                        .entry(c.field.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if !slot.is_object() {
                        let equal_to = slot.take();
                        *slot = Value::Object(Map::from_iter([(
                            CompareOp::Eq.native().to_string(),
                            equal_to,
                        )]));
                    }
                    if let Value::Object(ops) = slot {
                        ops.insert(op.native().to_string(), c.value.clone());
                    }
                }
            }
        }
        Value::Object(root)
    }
}

/// Interprets a raw query-string value: numbers and booleans are typed,
/// everything else stays a string.
pub fn coerce(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() && trimmed.chars().any(|c| c.is_ascii_digit()) {
            if let Some(n) = Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(raw.to_string())
}

/// JSON equality where numbers compare by value (`5 == 5.0`).
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Orders two values of the same JSON type; `None` across types.
pub fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order used for sorting: missing/null < strings < numbers <
/// booleans < arrays < objects, then by value within a type.
pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::String(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::Bool(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }
    match (a, b) {
        (Some(x), Some(y)) => compare_same_type(x, y).unwrap_or_else(|| rank(a).cmp(&rank(b))),
        _ => rank(a).cmp(&rank(b)),
    }
}
