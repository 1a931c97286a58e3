use async_trait::async_trait;
use serde_json::Value;
use sqlx::{types::Json, FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::StoreError;
use crate::query::{
    read::SortDirection, CompareOp, Condition, Filter, ReadQuery,
};

/// Persistence for tour documents. Apart from [`TourStore::find`] with
/// `include_secret` set, no method sees documents flagged `secret`.
#[async_trait]
pub trait TourStore: Send + Sync {
    /// Fails with `Duplicate("name")` when the name is taken.
    async fn insert(&self, doc: Value) -> Result<Value, StoreError>;

    async fn find(&self, query: &ReadQuery) -> Result<Vec<Value>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Value>, StoreError>;

    /// Overwrites the stored document. `None` when no visible tour has this id.
    async fn replace(&self, id: Uuid, doc: Value) -> Result<Option<Value>, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Every visible document matching `filter`, unordered and unprojected.
    async fn scan(&self, filter: &Filter) -> Result<Vec<Value>, StoreError>;

    /// Removes every tour, secret ones included. Returns the count removed.
    async fn delete_all(&self) -> Result<u64, StoreError>;
}

const NAME_CONSTRAINT: &str = "tours_name_key";
const NOT_SECRET: &str = "COALESCE(doc -> 'secret', 'false'::jsonb) <> 'true'::jsonb";

#[derive(FromRow)]
struct TourRow {
    doc: Json<Value>,
}

pub struct PgTourStore {
    db: PgPool,
}

impl PgTourStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// `ReadQuery` as a parameterized statement; field names and values are
/// always bound.
fn select_statement(query: &ReadQuery) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new("SELECT doc FROM tours WHERE TRUE");
    if !query.include_secret {
        qb.push(" AND ").push(NOT_SECRET);
    }
    for condition in query.filter.conditions() {
        qb.push(" AND ");
        push_condition(&mut qb, condition);
    }

    qb.push(" ORDER BY ");
    for key in &query.sort {
        qb.push("doc -> ").push_bind(key.field.as_str());
        qb.push(match key.direction {
            SortDirection::Asc => " ASC NULLS FIRST, ",
            SortDirection::Desc => " DESC NULLS LAST, ",
        });
    }
    qb.push("created_at, id");

    if query.skip > 0 {
        qb.push(" OFFSET ").push_bind(i64::try_from(query.skip).unwrap_or(i64::MAX));
    }
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    qb
}

fn push_condition<'a>(qb: &mut QueryBuilder<'a, Postgres>, c: &'a Condition) {
    let field = c.field.as_str();
    match c.op {
        CompareOp::Eq => {
            qb.push("doc -> ").push_bind(field);
            qb.push(" = ").push_bind(Json(&c.value));
        }
        CompareOp::Ne => {
            qb.push("(doc -> ").push_bind(field).push(" IS NULL OR doc -> ");
            qb.push_bind(field).push(" <> ").push_bind(Json(&c.value)).push(")");
        }
        CompareOp::In => {
            let options = c.value.as_array().map(Vec::as_slice).unwrap_or_default();
            if options.is_empty() {
                qb.push("FALSE");
                return;
            }
            qb.push("(");
            for (i, option) in options.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("doc -> ").push_bind(field).push(" = ").push_bind(Json(option));
            }
            qb.push(")");
        }
        op => {
            let sql_op = match op {
                CompareOp::Gt => " > ",
                CompareOp::Gte => " >= ",
                CompareOp::Lt => " < ",
                _ => " <= ",
            };
            // jsonb orders across types; the guard keeps comparisons within one.
            qb.push("(jsonb_typeof(doc -> ").push_bind(field);
            qb.push(") = jsonb_typeof(").push_bind(Json(&c.value)).push(") AND doc -> ");
            qb.push_bind(field).push(sql_op).push_bind(Json(&c.value)).push(")");
        }
    }
}

#[async_trait]
impl TourStore for PgTourStore {
    async fn insert(&self, doc: Value) -> Result<Value, StoreError> {
        let id = super::model::tour_id(&doc)
            .ok_or_else(|| StoreError::Corrupt("tour document without id".into()))?;
        let row = sqlx::query_as::<_, TourRow>(
            "INSERT INTO tours (id, doc) VALUES ($1, $2) RETURNING doc",
        )
        .bind(id)
        .bind(Json(&doc))
        .fetch_one(&self.db)
        .await
        .map_err(|e| StoreError::from_unique_violation(e, NAME_CONSTRAINT, "name"))?;
        Ok(row.doc.0)
    }

    async fn find(&self, query: &ReadQuery) -> Result<Vec<Value>, StoreError> {
        let rows = select_statement(query)
            .build_query_as::<TourRow>()
            .fetch_all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| query.projection.apply(r.doc.0))
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Value>, StoreError> {
        let sql = format!("SELECT doc FROM tours WHERE id = $1 AND {NOT_SECRET}");
        let row = sqlx::query_as::<_, TourRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(|r| r.doc.0))
    }

    async fn replace(&self, id: Uuid, doc: Value) -> Result<Option<Value>, StoreError> {
        let sql = format!("UPDATE tours SET doc = $2 WHERE id = $1 AND {NOT_SECRET} RETURNING doc");
        let row = sqlx::query_as::<_, TourRow>(&sql)
            .bind(id)
            .bind(Json(&doc))
            .fetch_optional(&self.db)
            .await
            .map_err(|e| StoreError::from_unique_violation(e, NAME_CONSTRAINT, "name"))?;
        Ok(row.map(|r| r.doc.0))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM tours WHERE id = $1 AND {NOT_SECRET}");
        let done = sqlx::query(&sql).bind(id).execute(&self.db).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn scan(&self, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let query = ReadQuery {
            filter: filter.clone(),
            ..ReadQuery::default()
        };
        self.find(&query).await
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let done = sqlx::query("DELETE FROM tours").execute(&self.db).await?;
        Ok(done.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::read::{Queryable, SortKey};
    use serde_json::json;

    #[test]
    fn default_statement_hides_secret_tours() {
        let query = ReadQuery::new();
        let sql = select_statement(&query).into_sql();
        assert_eq!(
            sql,
            format!("SELECT doc FROM tours WHERE TRUE AND {NOT_SECRET} ORDER BY created_at, id")
        );
        let sql = select_statement(&ReadQuery::new().including_secret()).into_sql();
        assert!(!sql.contains("secret"));
    }

    #[test]
    fn conditions_bind_fields_and_values() {
        let query = ReadQuery::new()
            .find(
                Filter::new()
                    .eq("difficulty", json!("easy"))
                    .and(Condition::new("price", CompareOp::Gte, json!(500))),
            )
            .sort(vec![SortKey::desc("price")])
            .skip(2)
            .limit(5);
        let sql = select_statement(&query).into_sql();
        assert_eq!(
            sql,
            format!(
                "SELECT doc FROM tours WHERE TRUE AND {NOT_SECRET} \
                 AND doc -> $1 = $2 \
                 AND (jsonb_typeof(doc -> $3) = jsonb_typeof($4) AND doc -> $5 >= $6) \
                 ORDER BY doc -> $7 DESC NULLS LAST, created_at, id OFFSET $8 LIMIT $9"
            )
        );
        assert!(!sql.contains("easy"));
    }

    #[test]
    fn membership_expands_to_alternatives() {
        let query = ReadQuery::new().find(Filter::new().and(Condition::new(
            "difficulty",
            CompareOp::In,
            json!(["easy", "medium"]),
        )));
        let sql = select_statement(&query).into_sql();
        assert!(sql.contains("(doc -> $1 = $2 OR doc -> $3 = $4)"));
    }
}
