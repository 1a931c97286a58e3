use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    UtcOffset,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::query::adapter::{CREATED_AT_FIELD, VERSION_FIELD};

pub const DEFAULT_RATINGS_AVERAGE: f64 = 4.5;

/// Writable tour fields as sent by clients. Unknown fields are dropped.
/// Creation requires `name`, `price`, `maxGroupSize` and `duration`;
/// updates take any subset.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourPayload {
    pub name: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub ratings_average: Option<Number>,
    pub ratings_quantity: Option<u64>,
    pub images: Option<Vec<String>>,
    pub price: Option<Number>,
    pub discount: Option<Number>,
    pub max_group_size: Option<u64>,
    pub duration: Option<Number>,
    pub difficulty: Option<String>,
    pub start_dates: Option<Vec<String>>,
    pub secret: Option<bool>,
}

impl TourPayload {
    /// Builds a complete stored document, filling defaults and the
    /// server-managed fields.
    pub fn into_new_document(self, now: OffsetDateTime) -> Result<Value, AppError> {
        if self.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err(AppError::validation("Tour must have a name"));
        }
        if self.price.is_none() {
            return Err(AppError::validation("Tour must have a price"));
        }
        if self.max_group_size.is_none() {
            return Err(AppError::validation("You must specify max group size"));
        }
        if self.duration.is_none() {
            return Err(AppError::validation("Tour must have a duration"));
        }

        let mut doc = Map::new();
        doc.insert("id".into(), json!(Uuid::new_v4()));
        doc.insert("ratingsAverage".into(), json!(DEFAULT_RATINGS_AVERAGE));
        doc.insert("ratingsQuantity".into(), json!(0));
        doc.insert("images".into(), json!([]));
        doc.insert("startDates".into(), json!([]));
        doc.insert("secret".into(), json!(false));
        doc.insert(CREATED_AT_FIELD.into(), json!(format_timestamp(now)?));
        doc.insert(VERSION_FIELD.into(), json!(0));

        self.write_into(&mut doc)?;
        Ok(Value::Object(doc))
    }

    /// Applies a partial update to a stored document and bumps its version.
    pub fn apply_to(self, doc: &mut Value) -> Result<(), AppError> {
        let Value::Object(fields) = doc else {
            return Err(AppError::from(anyhow::anyhow!("stored tour is not an object")));
        };
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AppError::validation("Tour must have a name"));
        }
        self.write_into(fields)?;
        let version = fields.get(VERSION_FIELD).and_then(Value::as_u64).unwrap_or(0);
        fields.insert(VERSION_FIELD.into(), json!(version + 1));
        Ok(())
    }

    fn write_into(self, doc: &mut Map<String, Value>) -> Result<(), AppError> {
        if let Some(name) = self.name {
            let name = name.trim().to_string();
            doc.insert("slug".into(), json!(slugify(&name)));
            doc.insert("name".into(), json!(name));
        }
        for (key, value) in [
            ("summary", self.summary),
            ("description", self.description),
            ("imageCover", self.image_cover),
            ("difficulty", self.difficulty),
        ] {
            if let Some(v) = value {
                doc.insert(key.into(), json!(v.trim()));
            }
        }

        for (key, value) in [
            ("ratingsAverage", self.ratings_average),
            ("price", self.price),
            ("discount", self.discount),
            ("duration", self.duration),
        ] {
            if let Some(n) = value {
                if n.as_f64().map_or(true, |f| f < 0.0) {
                    return Err(AppError::validation(format!("{key} must not be negative")));
                }
                doc.insert(key.into(), Value::Number(n));
            }
        }

        if let Some(q) = self.ratings_quantity {
            doc.insert("ratingsQuantity".into(), json!(q));
        }
        if let Some(size) = self.max_group_size {
            if size == 0 {
                return Err(AppError::validation("maxGroupSize must be at least 1"));
            }
            doc.insert("maxGroupSize".into(), json!(size));
        }
        if let Some(images) = self.images {
            doc.insert("images".into(), json!(images));
        }
        if let Some(dates) = self.start_dates {
            let normalized = dates
                .iter()
                .map(|d| parse_start_date(d).and_then(format_timestamp))
                .collect::<Result<Vec<_>, _>>()?;
            doc.insert("startDates".into(), json!(normalized));
        }
        if let Some(secret) = self.secret {
            doc.insert("secret".into(), json!(secret));
        }
        Ok(())
    }
}

/// UTC, millisecond precision, fixed width so strings sort chronologically.
pub fn format_timestamp(at: OffsetDateTime) -> Result<String, AppError> {
    at.to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .map_err(|e| AppError::from(anyhow::Error::new(e).context("format timestamp")))
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_start_date(raw: &str) -> Result<OffsetDateTime, AppError> {
    let raw = raw.trim();
    if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(at);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(|d| d.midnight().assume_utc())
        .map_err(|_| AppError::validation(format!("Invalid start date: {raw}")))
}

pub fn slugify(name: &str) -> String {
    lazy_static! {
        static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
    }
    NON_ALNUM
        .replace_all(&name.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

pub fn tour_id(doc: &Value) -> Option<Uuid> {
    doc.get("id")?.as_str()?.parse().ok()
}

pub fn tour_name(doc: &Value) -> Option<&str> {
    doc.get("name")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(v: Value) -> TourPayload {
        serde_json::from_value(v).unwrap()
    }

    fn forest_hiker() -> TourPayload {
        payload(json!({
            "name": "  The Forest Hiker ",
            "price": 397,
            "maxGroupSize": 25,
            "duration": 5,
            "difficulty": "easy",
            "startDates": ["2026-04-25T09:00:00Z", "2026-07-20"],
            "guides": ["ignored"]
        }))
    }

    #[test]
    fn new_document_gets_defaults_and_managed_fields() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let doc = forest_hiker().into_new_document(now).unwrap();

        assert_eq!(doc["name"], "The Forest Hiker");
        assert_eq!(doc["slug"], "the-forest-hiker");
        assert_eq!(doc["ratingsAverage"], 4.5);
        assert_eq!(doc["ratingsQuantity"], 0);
        assert_eq!(doc["secret"], false);
        assert_eq!(doc["__v"], 0);
        assert_eq!(doc["createdAt"], "2023-11-14T22:13:20.000Z");
        assert_eq!(doc["price"], 397);
        assert!(doc.get("guides").is_none());
        assert!(tour_id(&doc).is_some());
        assert_eq!(
            doc["startDates"],
            json!(["2026-04-25T09:00:00.000Z", "2026-07-20T00:00:00.000Z"])
        );
    }

    #[test]
    fn creation_requires_core_fields() {
        let now = OffsetDateTime::now_utc();
        let err = payload(json!({"price": 1, "maxGroupSize": 1, "duration": 1}))
            .into_new_document(now)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m == "Tour must have a name"));

        let err = payload(json!({"name": "x", "maxGroupSize": 1, "duration": 1}))
            .into_new_document(now)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m == "Tour must have a price"));
    }

    #[test]
    fn rejects_bad_values() {
        let now = OffsetDateTime::now_utc();
        let negative = payload(json!({"name": "x", "price": -5, "maxGroupSize": 1, "duration": 1}));
        assert!(negative.into_new_document(now).is_err());

        let bad_date = payload(json!({
            "name": "x", "price": 5, "maxGroupSize": 1, "duration": 1,
            "startDates": ["next tuesday"]
        }));
        assert!(bad_date.into_new_document(now).is_err());
    }

    #[test]
    fn patch_updates_fields_reslugs_and_bumps_version() {
        let mut doc = forest_hiker().into_new_document(OffsetDateTime::now_utc()).unwrap();
        let created_at = doc["createdAt"].clone();

        payload(json!({"name": "The Sea Explorer", "price": 497}))
            .apply_to(&mut doc)
            .unwrap();
        assert_eq!(doc["slug"], "the-sea-explorer");
        assert_eq!(doc["price"], 497);
        assert_eq!(doc["__v"], 1);
        assert_eq!(doc["createdAt"], created_at);
        assert_eq!(doc["difficulty"], "easy");

        payload(json!({"duration": 7})).apply_to(&mut doc).unwrap();
        assert_eq!(doc["__v"], 2);
    }

    #[test]
    fn patch_cannot_blank_the_name() {
        let mut doc = forest_hiker().into_new_document(OffsetDateTime::now_utc()).unwrap();
        assert!(payload(json!({"name": "   "})).apply_to(&mut doc).is_err());
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("The Snow Adventurer!"), "the-snow-adventurer");
        assert_eq!(slugify("  --Park  Camper-- "), "park-camper");
    }
}
