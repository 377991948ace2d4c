use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::models::{Event, EventCategory, EventFilter, EventId, NewEvent};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", post(create_event).get(search_events))
        .route("/events/{event_id}/availability", get(get_availability))
}

fn parse_date(value: &str, message: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| ApiError::BadRequest(message.to_string()))
}

/* ---------- CREATE ---------- */

// POST /events
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be less than 100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 500, message = "Description must be less than 500 characters"))]
    pub description: String,
    pub date: String,
    pub category: String,
    #[validate(range(min = 0, max = 1000, message = "Available seats must be between 0 and 1000"))]
    pub available_seats: i32,
}

impl CreateEventRequest {
    pub fn into_new_event(self) -> Result<NewEvent, ApiError> {
        self.validate()?;
        let date = parse_date(&self.date, "Date must be in the format YYYY-MM-DD")?;
        let category: EventCategory = self.category.parse().map_err(ApiError::BadRequest)?;

        Ok(NewEvent {
            name: self.name,
            description: self.description,
            date,
            category,
            available_seats: self.available_seats,
        })
    }
}

#[derive(Debug, Serialize)]
struct CreatedResponse { pub id: EventId }

async fn create_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let event = req.into_new_event()?;
    let id = Event::insert(&event, &state.db).await?;

    // новые события должны сразу попадать в выдачу
    if let Some(cache) = &state.cache {
        if let Err(e) = cache.invalidate_searches().await {
            tracing::warn!("Failed to invalidate search cache: {:?}", e);
        }
    }

    tracing::info!(event_id = id, seats = event.available_seats, "Event created");
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/* ---------- SEARCH ---------- */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub category: Option<String>,
    pub name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl EventsQuery {
    pub fn into_filter(self) -> Result<EventFilter, ApiError> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        Ok(EventFilter {
            category: non_empty(self.category)
                .map(|c| c.parse::<EventCategory>().map_err(ApiError::BadRequest))
                .transpose()?,
            name: non_empty(self.name),
            start_date: non_empty(self.start_date)
                .map(|d| parse_date(&d, "startDate must be in the format YYYY-MM-DD"))
                .transpose()?,
            end_date: non_empty(self.end_date)
                .map(|d| parse_date(&d, "endDate must be in the format YYYY-MM-DD"))
                .transpose()?,
        })
    }
}

fn json_response(body: String, cache_status: &'static str) -> Response {
    (
        [(header::CONTENT_TYPE, "application/json"), (header::HeaderName::from_static("x-cache"), cache_status)],
        Body::from(body),
    )
        .into_response()
}

// GET /events
async fn search_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> Result<Response, ApiError> {
    let filter = params.into_filter()?;
    let cache_key = filter.cache_key();

    // 1. Пытаемся получить результат из кеша
    if let Some(cache) = &state.cache {
        match cache.get_cached_search(&cache_key).await {
            Ok(Some(cached_json)) => return Ok(json_response(cached_json, "HIT")),
            Ok(None) => {}
            Err(e) => tracing::warn!("Search cache read failed: {:?}", e),
        }
    }

    // 2. Cache Miss: идем в базу данных
    let events = Event::search(&filter, &state.db).await?;
    let body = serde_json::to_string(&json!({ "events": events }))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    // 3. Сохраняем результат в кеш
    if let Some(cache) = &state.cache {
        if let Err(e) = cache.cache_search_result(&cache_key, &body).await {
            tracing::error!("Failed to cache search result: {:?}", e);
        }
    }

    Ok(json_response(body, "MISS"))
}

/* ---------- AVAILABILITY ---------- */

// GET /events/{event_id}/availability
async fn get_availability(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> Result<impl IntoResponse, ApiError> {
    let availability = state.bookings.availability(event_id).await?;
    Ok(Json(availability))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request() -> CreateEventRequest {
        CreateEventRequest {
            name: "EventName".into(),
            description: "Season finals".into(),
            date: "2024-07-01".into(),
            category: "Game".into(),
            available_seats: 100,
        }
    }

    #[test]
    fn valid_event_request_converts() {
        let event = create_request().into_new_event().unwrap();
        assert_eq!(event.category, EventCategory::Game);
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
    }

    #[test]
    fn seats_outside_range_are_rejected() {
        let mut req = create_request();
        req.available_seats = 1001;
        assert!(matches!(req.into_new_event(), Err(ApiError::Validation(_))));

        let mut req = create_request();
        req.available_seats = -1;
        assert!(matches!(req.into_new_event(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn bad_date_and_category_are_bad_requests() {
        let mut req = create_request();
        req.date = "01/07/2024".into();
        assert!(matches!(req.into_new_event(), Err(ApiError::BadRequest(_))));

        let mut req = create_request();
        req.category = "Opera".into();
        assert!(matches!(req.into_new_event(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn query_with_blank_values_means_no_filter() {
        let query = EventsQuery {
            category: Some("".into()),
            name: Some("  ".into()),
            start_date: None,
            end_date: Some("2024-12-31".into()),
        };
        let filter = query.into_filter().unwrap();

        assert_eq!(filter.category, None);
        assert_eq!(filter.name, None);
        assert_eq!(filter.end_date, NaiveDate::from_ymd_opt(2024, 12, 31));
    }

    #[test]
    fn query_with_unknown_category_fails() {
        let query = EventsQuery {
            category: Some("Opera".into()),
            name: None,
            start_date: None,
            end_date: None,
        };
        assert!(query.into_filter().is_err());
    }
}
