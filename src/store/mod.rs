//! Контракт хранилища билетов, который нужен координатору бронирования.
//!
//! Операции чтения вместимости, подсчёта и вставки выполняются внутри одной
//! [`TicketTransaction`]; транзакция, брошенная без `commit`, откатывается.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{EventId, NewTicket, Ticket, TicketChanges, TicketId, UserId};

pub mod memory;
pub mod postgres;

pub use memory::MemoryTicketStore;
pub use postgres::PgTicketStore;

// Коды SQLSTATE, которые мы различаем
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";
const USER_FOREIGN_KEY: &str = "tickets_user_id_fkey";
const CAPACITY_GUARD: &str = "tickets_capacity_guard";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Временный сбой хранилища, запрос можно повторить.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Сработала защита вместимости на стороне хранилища.
    #[error("capacity constraint violated: {0}")]
    CapacityConstraint(String),

    /// Хранилище отвергло сам билет (например, отрицательная цена).
    #[error("ticket rejected: {0}")]
    Rejected(String),

    #[error("referenced event does not exist")]
    MissingEvent,

    #[error("referenced user does not exist")]
    MissingUser,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(mapped) =
                classify_violation(db_err.code().as_deref(), db_err.constraint(), db_err.message())
            {
                return mapped;
            }
        }
        StoreError::Unavailable(err.to_string())
    }
}

// Только триггер вместимости означает "мест нет"; прочие CHECK отвергают билет
fn classify_violation(code: Option<&str>, constraint: Option<&str>, message: &str) -> Option<StoreError> {
    match (code?, constraint) {
        (CHECK_VIOLATION, Some(CAPACITY_GUARD)) => Some(StoreError::CapacityConstraint(message.to_string())),
        (CHECK_VIOLATION, _) => Some(StoreError::Rejected(message.to_string())),
        (FOREIGN_KEY_VIOLATION, Some(USER_FOREIGN_KEY)) => Some(StoreError::MissingUser),
        (FOREIGN_KEY_VIOLATION, _) => Some(StoreError::MissingEvent),
        _ => None,
    }
}

/// Производная вместимость события: сколько мест продано и сколько осталось.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub event_id: EventId,
    pub capacity: i32,
    pub sold: i64,
    pub remaining: i64,
}

impl Availability {
    pub fn new(event_id: EventId, capacity: i32, sold: i64) -> Self {
        Self {
            event_id,
            capacity,
            sold,
            remaining: (i64::from(capacity) - sold).max(0),
        }
    }
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn TicketTransaction>, StoreError>;

    /// Неблокирующее чтение вместимости вне транзакции бронирования.
    async fn availability(&self, event_id: EventId) -> Result<Option<Availability>, StoreError>;

    async fn list_tickets(&self, event_id: EventId) -> Result<Vec<Ticket>, StoreError>;

    async fn update_ticket(
        &self,
        event_id: EventId,
        ticket_id: TicketId,
        changes: &TicketChanges,
    ) -> Result<u64, StoreError>;

    async fn delete_ticket(&self, event_id: EventId, ticket_id: TicketId) -> Result<u64, StoreError>;

    async fn release_user_tickets(&self, event_id: EventId, user_id: UserId) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait TicketTransaction: Send {
    /// Вместимость события; блокирует строку события до конца транзакции.
    async fn event_capacity(&mut self, event_id: EventId) -> Result<Option<i32>, StoreError>;

    async fn count_tickets(&mut self, event_id: EventId) -> Result<i64, StoreError>;

    async fn insert_ticket(&mut self, ticket: &NewTicket) -> Result<TicketId, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
