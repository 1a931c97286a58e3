//! Aggregations over tour documents.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub const STATS_MIN_RATING: f64 = 4.5;
pub const UNSPECIFIED_DIFFICULTY: &str = "UNSPECIFIED";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyStats {
    #[serde(rename = "_id")]
    pub difficulty: String,
    pub num_tours: u64,
    pub num_ratings: u64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStarts {
    pub month: u8,
    pub num_tour_starts: u64,
    pub tours: Vec<String>,
}

#[derive(Default)]
struct Accumulator {
    tours: u64,
    ratings: u64,
    rating_sum: f64,
    price_sum: f64,
    min_price: f64,
    max_price: f64,
}

fn number(doc: &Value, field: &str) -> Option<f64> {
    doc.get(field).and_then(Value::as_f64)
}

/// Per-difficulty figures for tours rated at least [`STATS_MIN_RATING`],
/// cheapest average first.
pub fn tour_stats(docs: &[Value]) -> Vec<DifficultyStats> {
    let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();
    for doc in docs {
        let Some(rating) = number(doc, "ratingsAverage") else { continue };
        if rating < STATS_MIN_RATING {
            continue;
        }
        let price = number(doc, "price").unwrap_or(0.0);
        let difficulty = doc
            .get("difficulty")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map_or_else(|| UNSPECIFIED_DIFFICULTY.to_string(), str::to_uppercase);

        let acc = groups.entry(difficulty).or_default();
        if acc.tours == 0 {
            acc.min_price = price;
            acc.max_price = price;
        }
        acc.tours += 1;
        acc.ratings += doc.get("ratingsQuantity").and_then(Value::as_u64).unwrap_or(0);
        acc.rating_sum += rating;
        acc.price_sum += price;
        acc.min_price = acc.min_price.min(price);
        acc.max_price = acc.max_price.max(price);
    }

    let mut out: Vec<DifficultyStats> = groups
        .into_iter()
        .map(|(difficulty, acc)| DifficultyStats {
            difficulty,
            num_tours: acc.tours,
            num_ratings: acc.ratings,
            avg_rating: acc.rating_sum / acc.tours as f64,
            avg_price: acc.price_sum / acc.tours as f64,
            min_price: acc.min_price,
            max_price: acc.max_price,
        })
        .collect();
    out.sort_by(|a, b| a.avg_price.total_cmp(&b.avg_price));
    out
}

/// Tour starts per month of `year`, busiest month first.
pub fn monthly_plan(docs: &[Value], year: i32) -> Vec<MonthlyStarts> {
    let mut months: BTreeMap<u8, Vec<String>> = BTreeMap::new();
    for doc in docs {
        let name = doc.get("name").and_then(Value::as_str).unwrap_or_default();
        let dates = doc.get("startDates").and_then(Value::as_array);
        for raw in dates.into_iter().flatten().filter_map(Value::as_str) {
            let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) else { continue };
            if at.year() == year {
                months.entry(u8::from(at.month())).or_default().push(name.to_string());
            }
        }
    }

    let mut out: Vec<MonthlyStarts> = months
        .into_iter()
        .map(|(month, tours)| MonthlyStarts {
            month,
            num_tour_starts: tours.len() as u64,
            tours,
        })
        .collect();
    out.sort_by(|a, b| {
        b.num_tour_starts
            .cmp(&a.num_tour_starts)
            .then(a.month.cmp(&b.month))
    });
    out.truncate(12);
    out
}
