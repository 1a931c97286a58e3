use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::filter::{sort_order, Filter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// `-price` is descending on `price`, `price` ascending.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        match spec.strip_prefix('-') {
            Some(field) if !field.is_empty() => Some(Self::desc(field)),
            Some(_) => None,
            None if !spec.is_empty() => Some(Self::asc(spec)),
            None => None,
        }
    }
}

/// Field selection. Inclusion always keeps the document id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    pub const ID_FIELD: &'static str = "id";

    pub fn apply(&self, doc: Value) -> Value {
        match (self, doc) {
            (Projection::All, doc) => doc,
            (Projection::Include(fields), Value::Object(mut obj)) => {
                let mut out = Map::new();
                if let Some(id) = obj.remove(Self::ID_FIELD) {
                    out.insert(Self::ID_FIELD.to_string(), id);
                }
                for f in fields {
                    if let Some(v) = obj.remove(f) {
                        out.insert(f.clone(), v);
                    }
                }
                Value::Object(out)
            }
            (Projection::Exclude(fields), Value::Object(mut obj)) => {
                for f in fields {
                    obj.remove(f);
                }
                Value::Object(obj)
            }
            (_, other) => other,
        }
    }
}

/// The store's chainable read interface. Each call refines the query
/// without running it.
pub trait Queryable: Sized {
    /// Adds constraints; repeated calls are AND-ed.
    fn find(self, filter: Filter) -> Self;
    fn sort(self, keys: Vec<SortKey>) -> Self;
    fn select(self, projection: Projection) -> Self;
    fn skip(self, n: u64) -> Self;
    fn limit(self, n: u64) -> Self;
}

/// A fully described read operation, executed by a store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadQuery {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub skip: u64,
    pub limit: Option<u64>,
    /// Opt-in for documents flagged `secret`.
    pub include_secret: bool,
}

impl ReadQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn including_secret(mut self) -> Self {
        self.include_secret = true;
        self
    }

    /// Runs this query over already-loaded documents. Used by the in-memory
    /// stores; the SQL stores translate the same fields into a statement.
    pub fn run<I>(&self, docs: I) -> Vec<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut matched: Vec<Value> = docs
            .into_iter()
            .filter(|d| self.include_secret || !is_secret(d))
            .filter(|d| self.filter.matches(d))
            .collect();

        if !self.sort.is_empty() {
            matched.sort_by(|a, b| compare_by_keys(a, b, &self.sort));
        }

        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let take = self
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        matched
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|d| self.projection.apply(d))
            .collect()
    }
}

impl Queryable for ReadQuery {
    fn find(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).merge(filter);
        self
    }

    fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.sort = keys;
        self
    }

    fn select(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    fn skip(mut self, n: u64) -> Self {
        self.skip = n;
        self
    }

    fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }
}

pub fn is_secret(doc: &Value) -> bool {
    doc.get("secret").and_then(Value::as_bool).unwrap_or(false)
}

fn compare_by_keys(a: &Value, b: &Value, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ord = sort_order(a.get(&key.field), b.get(&key.field));
        let ord = match key.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::{CompareOp, Condition};
    use serde_json::json;

    fn docs() -> Vec<Value> {
        vec![
            json!({ "id": "a", "name": "Forest", "price": 397, "ratingsAverage": 4.8, "__v": 0 }),
            json!({ "id": "b", "name": "Sea", "price": 497, "ratingsAverage": 4.8, "__v": 0 }),
            json!({ "id": "c", "name": "Snow", "price": 997, "ratingsAverage": 4.5, "__v": 0 }),
            json!({ "id": "d", "name": "Hidden", "price": 100, "ratingsAverage": 5.0, "secret": true }),
        ]
    }

    #[test]
    fn parses_sort_specs() {
        assert_eq!(SortKey::parse("-price"), Some(SortKey::desc("price")));
        assert_eq!(SortKey::parse(" name "), Some(SortKey::asc("name")));
        assert_eq!(SortKey::parse("-"), None);
        assert_eq!(SortKey::parse(""), None);
    }

    #[test]
    fn multi_key_sort_breaks_ties_in_order() {
        let q = ReadQuery::new().sort(vec![SortKey::desc("ratingsAverage"), SortKey::asc("price")]);
        let ids: Vec<_> = q.run(docs()).iter().map(|d| d["id"].clone()).collect();
        assert_eq!(ids, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn secret_documents_need_explicit_opt_in() {
        assert_eq!(ReadQuery::new().run(docs()).len(), 3);
        assert_eq!(ReadQuery::new().including_secret().run(docs()).len(), 4);
    }

    #[test]
    fn skip_and_limit_window_the_result() {
        let q = ReadQuery::new().sort(vec![SortKey::asc("price")]).skip(1).limit(1);
        let out = q.run(docs());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], "b");
    }

    #[test]
    fn find_calls_accumulate() {
        let q = ReadQuery::new()
            .find(Filter::new().and(Condition::new("price", CompareOp::Gt, json!(400))))
            .find(Filter::new().and(Condition::new("price", CompareOp::Lt, json!(900))));
        let out = q.run(docs());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["name"], "Sea");
    }

    #[test]
    fn projections_include_or_exclude() {
        let doc = json!({ "id": "a", "name": "Forest", "price": 397, "__v": 0 });
        let inc = Projection::Include(vec!["name".into()]).apply(doc.clone());
        assert_eq!(inc, json!({ "id": "a", "name": "Forest" }));
        let exc = Projection::Exclude(vec!["__v".into()]).apply(doc);
        assert_eq!(exc, json!({ "id": "a", "name": "Forest", "price": 397 }));
    }
}
