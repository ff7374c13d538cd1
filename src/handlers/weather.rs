//! Read-only query endpoints under `/api`.
//!
//! Query strings are taken as raw text so that `?start=` and a missing
//! `start` mean the same thing.

use super::{observe, AppState};
use crate::error::AppError;
use crate::observation::{Observation, ObservedAt};
use crate::query::{HourlyAverage, HourlyQuery, RangeQuery, Statistics};
use crate::store::ObservationQuery;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct LatestParams {
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DistrictParams {
    pub name: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub start: Option<String>,
    pub end: Option<String>,
    /// Comma-separated district names
    pub districts: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HourlyParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub district: Option<String>,
}

/// GET /api/latest-data
pub async fn latest_data(
    State(state): State<AppState>,
    Query(params): Query<LatestParams>,
) -> Result<Json<Vec<Observation>>, AppError> {
    let limit = parse_limit(params.limit)?;
    let rows = observe("latest", state.store.latest(limit)).await?;
    Ok(Json(rows))
}

/// GET /api/by-district
pub async fn by_district(
    State(state): State<AppState>,
    Query(params): Query<DistrictParams>,
) -> Result<Json<Vec<Observation>>, AppError> {
    let name = present(params.name)
        .ok_or_else(|| AppError::BadRequest("name is required".to_string()))?;
    let limit = parse_limit(params.limit)?;

    let rows = observe("by_district", state.store.by_district(&name, limit)).await?;
    Ok(Json(rows))
}

/// GET /api/data-range
pub async fn data_range(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<Observation>>, AppError> {
    let query = RangeQuery {
        start: parse_time("start", params.start)?,
        end: parse_time("end", params.end)?,
        districts: split_districts(params.districts),
        limit: parse_limit(params.limit)?,
    };

    let rows = observe("range", state.store.range(&query)).await?;
    Ok(Json(rows))
}

/// GET /api/hourly-average
pub async fn hourly_average(
    State(state): State<AppState>,
    Query(params): Query<HourlyParams>,
) -> Result<Json<Vec<HourlyAverage>>, AppError> {
    let query = HourlyQuery {
        start: parse_time("start", params.start)?,
        end: parse_time("end", params.end)?,
        district: present(params.district),
    };

    let buckets = observe("hourly_average", state.store.hourly_average(&query)).await?;
    Ok(Json(buckets))
}

/// GET /api/statistics
pub async fn statistics(State(state): State<AppState>) -> Result<Json<Statistics>, AppError> {
    let stats = observe("statistics", state.store.statistics()).await?;
    Ok(Json(stats))
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_limit(value: Option<String>) -> Result<Option<i64>, AppError> {
    present(value)
        .map(|raw| {
            raw.parse::<i64>()
                .map_err(|_| AppError::BadRequest(format!("limit must be an integer, got {raw:?}")))
        })
        .transpose()
}

fn parse_time(name: &str, value: Option<String>) -> Result<Option<ObservedAt>, AppError> {
    present(value)
        .map(|raw| {
            ObservedAt::parse(&raw)
                .ok_or_else(|| AppError::BadRequest(format!("{name} is not a valid timestamp: {raw:?}")))
        })
        .transpose()
}

fn split_districts(value: Option<String>) -> Vec<String> {
    present(value)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_params_are_absent() {
        assert_eq!(present(Some("".into())), None);
        assert_eq!(present(Some("  ".into())), None);
        assert_eq!(parse_limit(Some("".into())).unwrap(), None);
        assert_eq!(parse_time("start", Some("".into())).unwrap(), None);
        assert!(split_districts(Some("".into())).is_empty());
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(Some("25".into())).unwrap(), Some(25));
        assert_eq!(parse_limit(Some("-1".into())).unwrap(), Some(-1));
        assert!(matches!(parse_limit(Some("ten".into())), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_parse_time() {
        let at = parse_time("start", Some("2024-01-01T10:00".into())).unwrap().unwrap();
        assert_eq!(at.to_canonical(), "2024-01-01T10:00:00");
        assert!(matches!(
            parse_time("end", Some("yesterday".into())),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_split_districts() {
        assert_eq!(
            split_districts(Some("Antalya, Kas,,".into())),
            vec!["Antalya".to_string(), "Kas".to_string()]
        );
        assert!(split_districts(None).is_empty());
    }
}
