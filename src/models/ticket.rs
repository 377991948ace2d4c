use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{EventId, UserId};

pub type TicketId = i64;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub seat: String,
    pub price: f64,
    pub event_id: EventId,
    pub user_id: UserId,
}

/// Билет, который координатор бронирования собирается записать.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    pub event_id: EventId,
    pub user_id: UserId,
    pub seat: String,
    pub price: f64,
}

/// Цена билета: конечное неотрицательное число (как `CHECK (price >= 0)`).
pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price >= 0.0
}

// Изменение места/цены; событие билета не меняется
#[derive(Debug, Clone, PartialEq)]
pub struct TicketChanges {
    pub seat: String,
    pub price: f64,
}
