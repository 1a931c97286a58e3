use serde_json::Value;

use super::filter::{coerce, CompareOp, Condition, Filter};
use super::params::{ParamValue, QueryParams};
use super::read::{Projection, Queryable, SortKey};
use super::QueryError;

/// Keys that control the read instead of filtering it.
pub const RESERVED_KEYS: [&str; 4] = ["page", "limit", "sort", "fields"];

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 100;

/// Bookkeeping field hidden when no `fields` selection is given.
pub const VERSION_FIELD: &str = "__v";
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Configures a [`Queryable`] from request parameters. Stages are meant to
/// be called in declaration order; [`build`] does that.
pub struct QueryAdapter<'a, Q> {
    query: Q,
    params: &'a QueryParams,
}

impl<'a, Q: Queryable> QueryAdapter<'a, Q> {
    pub fn new(query: Q, params: &'a QueryParams) -> Self {
        Self { query, params }
    }

    pub fn filter(mut self) -> Result<Self, QueryError> {
        let mut filter = Filter::new();
        for (key, value) in self.params.iter() {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            filter = match value {
                ParamValue::Single(v) => filter.eq(key.clone(), coerce(v)),
                ParamValue::Many(vs) => filter.and(Condition::new(
                    key.clone(),
                    CompareOp::In,
                    Value::Array(vs.iter().map(|v| coerce(v)).collect()),
                )),
                ParamValue::Map(ops) => {
                    let mut filter = filter;
                    for (token, operand) in ops {
                        let op = CompareOp::from_token(token).ok_or_else(|| {
                            QueryError::UnknownOperator {
                                field: key.clone(),
                                operator: token.clone(),
                            }
                        })?;
                        let ParamValue::Single(raw) = operand else {
                            return Err(QueryError::RepeatedOperator {
                                field: key.clone(),
                                operator: token.clone(),
                            });
                        };
                        filter = filter.and(Condition::new(key.clone(), op, coerce(raw)));
                    }
                    filter
                }
            };
        }
        self.query = self.query.find(filter);
        Ok(self)
    }

    pub fn sort(mut self) -> Self {
        let keys: Vec<SortKey> = self
            .params
            .joined("sort")
            .map(|s| s.split(',').filter_map(SortKey::parse).collect())
            .unwrap_or_default();
        let keys = if keys.is_empty() {
            vec![SortKey::desc(CREATED_AT_FIELD)]
        } else {
            keys
        };
        self.query = self.query.sort(keys);
        self
    }

    pub fn limit_fields(mut self) -> Result<Self, QueryError> {
        let projection = match self.params.joined("fields") {
            Some(raw) => parse_projection(&raw)?,
            None => Projection::Exclude(vec![VERSION_FIELD.to_string()]),
        };
        self.query = self.query.select(projection);
        Ok(self)
    }

    pub fn paginate(mut self) -> Self {
        let page = positive(self.params.last("page")).unwrap_or(DEFAULT_PAGE);
        let limit = positive(self.params.last("limit"))
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT);
        // Skips `page` records, not `(page - 1) * limit`.
        self.query = self.query.skip(page).limit(limit);
        self
    }

    pub fn into_query(self) -> Q {
        self.query
    }
}

/// Filter, sort, projection and pagination, in that order.
pub fn build<Q: Queryable>(base: Q, params: &QueryParams) -> Result<Q, QueryError> {
    Ok(QueryAdapter::new(base, params)
        .filter()?
        .sort()
        .limit_fields()?
        .paginate()
        .into_query())
}

fn parse_projection(raw: &str) -> Result<Projection, QueryError> {
    let names: Vec<&str> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if names.is_empty() {
        return Ok(Projection::Exclude(vec![VERSION_FIELD.to_string()]));
    }
    let excluded: Vec<String> = names
        .iter()
        .filter_map(|n| n.strip_prefix('-'))
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect();
    if excluded.is_empty() {
        return Ok(Projection::Include(names.iter().map(|n| n.to_string()).collect()));
    }
    if excluded.len() == names.len() {
        return Ok(Projection::Exclude(excluded));
    }
    Err(QueryError::MixedProjection)
}

fn positive(raw: Option<&str>) -> Option<u64> {
    raw?.trim().parse::<u64>().ok().filter(|n| *n > 0)
}
