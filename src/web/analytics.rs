//! Aggregates for the dashboard's indicator boxes and accumulation chart.

use axum::{
    extract::{Query, State},
    middleware::from_fn_with_state,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::facts::{Rating, Revenue, Visitor};
use crate::web::auth::{require_user, AuthUser};
use crate::{ApiError, AppState};

const DEFAULT_WINDOW_DAYS: i64 = 30;
const MAX_WINDOW_DAYS: i64 = 365;

#[derive(Debug, Serialize, PartialEq)]
pub struct AnalyticsSummary {
    pub visitor_count: usize,
    pub revenue_total: f64,
    pub revenue_count: usize,
    pub rating_average: Option<f64>,
    pub rating_count: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DayPoint {
    pub date: NaiveDate,
    pub visitors: usize,
    pub revenue: f64,
}

#[derive(Debug, Deserialize)]
pub struct AccumulationParams {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    DEFAULT_WINDOW_DAYS
}

pub fn summarize(visitors: &[Visitor], revenue: &[Revenue], ratings: &[Rating]) -> AnalyticsSummary {
    let revenue_total = revenue.iter().map(|r| r.amount).sum();
    let rating_average = if ratings.is_empty() {
        None
    } else {
        Some(ratings.iter().map(|r| r.rating as f64).sum::<f64>() / ratings.len() as f64)
    };

    AnalyticsSummary {
        visitor_count: visitors.len(),
        revenue_total,
        revenue_count: revenue.len(),
        rating_average,
        rating_count: ratings.len(),
    }
}

/// Per-day visitor counts and revenue sums over the trailing window ending
/// at `today`, zero-filled so the chart has a point for every day.
pub fn accumulate_by_day(
    visitors: &[Visitor],
    revenue: &[Revenue],
    today: NaiveDate,
    days: i64,
) -> Vec<DayPoint> {
    let days = days.clamp(1, MAX_WINDOW_DAYS);
    let start = today - Duration::days(days - 1);

    let mut buckets: BTreeMap<NaiveDate, (usize, f64)> = (0..days)
        .map(|offset| (start + Duration::days(offset), (0, 0.0)))
        .collect();

    let day_of = |ts: &DateTime<Utc>| ts.date_naive();

    for v in visitors {
        if let Some(bucket) = buckets.get_mut(&day_of(&v.created_at)) {
            bucket.0 += 1;
        }
    }
    for r in revenue {
        if let Some(bucket) = buckets.get_mut(&day_of(&r.created_at)) {
            bucket.1 += r.amount;
        }
    }

    buckets
        .into_iter()
        .map(|(date, (visitors, revenue))| DayPoint {
            date,
            visitors,
            revenue,
        })
        .collect()
}

/// GET /api/analytics/summary
async fn summary(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AnalyticsSummary>, ApiError> {
    let visitors = state.db.list_visitors(user.id)?;
    let revenue = state.db.list_revenue(user.id)?;
    let ratings = state.db.list_ratings(user.id)?;

    Ok(Json(summarize(&visitors, &revenue, &ratings)))
}

/// GET /api/analytics/accumulation?days=N
async fn accumulation(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AccumulationParams>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<DayPoint>>, ApiError> {
    let visitors = state.db.list_visitors(user.id)?;
    let revenue = state.db.list_revenue(user.id)?;

    Ok(Json(accumulate_by_day(
        &visitors,
        &revenue,
        Utc::now().date_naive(),
        params.days,
    )))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/analytics/summary", get(summary))
        .route("/api/analytics/accumulation", get(accumulation))
        .layer(from_fn_with_state(state.clone(), require_user))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn visitor_at(ts: DateTime<Utc>) -> Visitor {
        Visitor {
            id: 1,
            user_id: Uuid::new_v4(),
            page_visited: "/home".to_string(),
            created_at: ts,
        }
    }

    fn revenue_at(amount: f64, ts: DateTime<Utc>) -> Revenue {
        Revenue {
            id: 1,
            user_id: Uuid::new_v4(),
            amount,
            source: "tickets".to_string(),
            created_at: ts,
        }
    }

    fn rating_of(value: i32) -> Rating {
        Rating {
            id: 1,
            user_id: Uuid::new_v4(),
            rating: value,
            comment: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn summary_with_no_rows() {
        let s = summarize(&[], &[], &[]);
        assert_eq!(s.visitor_count, 0);
        assert_eq!(s.revenue_total, 0.0);
        assert_eq!(s.rating_average, None);
    }

    #[test]
    fn summary_aggregates_all_three_tables() {
        let now = Utc::now();
        let s = summarize(
            &[visitor_at(now), visitor_at(now)],
            &[revenue_at(100.0, now), revenue_at(250.5, now)],
            &[rating_of(4), rating_of(5)],
        );

        assert_eq!(s.visitor_count, 2);
        assert_eq!(s.revenue_total, 350.5);
        assert_eq!(s.rating_average, Some(4.5));
        assert_eq!(s.rating_count, 2);
    }

    #[test]
    fn accumulation_zero_fills_the_window() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let points = accumulate_by_day(&[], &[], today, 7);

        assert_eq!(points.len(), 7);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2025, 6, 4).unwrap());
        assert_eq!(points[6].date, today);
        assert!(points.iter().all(|p| p.visitors == 0 && p.revenue == 0.0));
    }

    #[test]
    fn accumulation_buckets_rows_by_day() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let in_window = Utc.with_ymd_and_hms(2025, 6, 9, 13, 30, 0).unwrap();
        let out_of_window = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();

        let points = accumulate_by_day(
            &[visitor_at(in_window), visitor_at(out_of_window)],
            &[revenue_at(75.0, in_window)],
            today,
            7,
        );

        let day = points
            .iter()
            .find(|p| p.date == NaiveDate::from_ymd_opt(2025, 6, 9).unwrap())
            .unwrap();
        assert_eq!(day.visitors, 1);
        assert_eq!(day.revenue, 75.0);

        let total_visitors: usize = points.iter().map(|p| p.visitors).sum();
        assert_eq!(total_visitors, 1);
    }

    #[test]
    fn accumulation_clamps_pathological_windows() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        assert_eq!(accumulate_by_day(&[], &[], today, 0).len(), 1);
        assert_eq!(
            accumulate_by_day(&[], &[], today, 10_000).len(),
            MAX_WINDOW_DAYS as usize
        );
    }
}
