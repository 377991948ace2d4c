use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::models::{EventId, NewTicket, TicketChanges, TicketId};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events/{event_id}/tickets", post(book_ticket).get(list_tickets))
        .route(
            "/events/{event_id}/tickets/{ticket_id}",
            put(update_ticket).delete(delete_ticket),
        )
}

// Тело запроса для создания и изменения билета. Владелец берётся из токена
#[derive(Debug, Deserialize, Validate)]
pub struct TicketRequest {
    #[validate(length(min = 1, max = 50, message = "Seat must be 1-50 characters"))]
    pub seat: String,
    #[validate(range(min = 0.0, message = "Price must be non-negative"))]
    pub price: f64,
}

#[derive(Debug, Serialize)]
struct CreatedResponse { pub id: TicketId }

// POST /events/{event_id}/tickets
async fn book_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(event_id): Path<EventId>,
    Json(req): Json<TicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let id = state
        .bookings
        .book_ticket(NewTicket {
            event_id,
            user_id: user.user_id,
            seat: req.seat,
            price: req.price,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

// GET /events/{event_id}/tickets
async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> Result<impl IntoResponse, ApiError> {
    let tickets = state.bookings.list_tickets(event_id).await?;
    Ok(Json(json!({ "tickets": tickets })))
}

// PUT /events/{event_id}/tickets/{ticket_id}
async fn update_ticket(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path((event_id, ticket_id)): Path<(EventId, TicketId)>,
    Json(req): Json<TicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let changes = state
        .bookings
        .update_ticket(event_id, ticket_id, TicketChanges { seat: req.seat, price: req.price })
        .await?;
    Ok(Json(json!({ "changes": changes })))
}

// DELETE /events/{event_id}/tickets/{ticket_id}
async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path((event_id, ticket_id)): Path<(EventId, TicketId)>,
) -> Result<impl IntoResponse, ApiError> {
    let changes = state.bookings.delete_ticket(event_id, ticket_id).await?;
    Ok(Json(json!({ "changes": changes })))
}
