//! booking.rs
//!
//! Координатор бронирования билетов.
//!
//! Инвариант: число билетов события никогда не превышает `available_seats`.
//! Проверка вместимости и вставка билета выполняются в одной транзакции
//! хранилища и под блокировкой события ([`EventLocks`]), поэтому два
//! параллельных запроса на последнее место не могут оба увидеть свободное место.
//! Если блокировка всё же обойдена (другой процесс), хранилище отвергает
//! лишний билет само, и это возвращается как [`BookingError::ConstraintViolation`].

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{is_valid_price, EventId, NewTicket, Ticket, TicketChanges, TicketId, UserId};
use crate::services::locks::EventLocks;
use crate::store::{Availability, StoreError, TicketStore, TicketTransaction};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookingError {
    #[error("event {0} not found")]
    EventNotFound(EventId),

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("no available seats for event {event_id} (capacity {capacity})")]
    CapacityExceeded { event_id: EventId, capacity: i32 },

    /// Хранилище отклонило билет сверх вместимости (гонку выиграл другой писатель).
    #[error("capacity constraint rejected ticket for event {0}")]
    ConstraintViolation(EventId),

    /// Билет отвергнут по содержимому (цена), места тут ни при чём.
    #[error("invalid ticket: {0}")]
    InvalidTicket(String),

    #[error("ticket store unavailable: {0}")]
    StoreUnavailable(String),
}

impl BookingError {
    /// Повтор имеет смысл только при временном сбое хранилища.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::StoreUnavailable(_))
    }

    /// Места закончились (для клиента оба варианта выглядят одинаково).
    pub fn is_sold_out(&self) -> bool {
        matches!(
            self,
            BookingError::CapacityExceeded { .. } | BookingError::ConstraintViolation(_)
        )
    }

    fn from_store(err: StoreError, event_id: EventId, user_id: Option<UserId>) -> Self {
        match err {
            StoreError::Unavailable(reason) => BookingError::StoreUnavailable(reason),
            StoreError::CapacityConstraint(_) => BookingError::ConstraintViolation(event_id),
            StoreError::Rejected(reason) => BookingError::InvalidTicket(reason),
            StoreError::MissingEvent => BookingError::EventNotFound(event_id),
            StoreError::MissingUser => match user_id {
                Some(user_id) => BookingError::UserNotFound(user_id),
                None => BookingError::StoreUnavailable("unexpected user reference".to_string()),
            },
        }
    }
}

#[derive(Clone)]
pub struct BookingCoordinator {
    store: Arc<dyn TicketStore>,
    locks: EventLocks,
    timeout: Duration,
}

impl BookingCoordinator {
    pub fn new(store: Arc<dyn TicketStore>, timeout: Duration) -> Self {
        Self {
            store,
            locks: EventLocks::new(),
            timeout,
        }
    }

    pub fn locks(&self) -> &EventLocks {
        &self.locks
    }

    /// Бронирует одно место. При любой ошибке билет не записывается.
    ///
    /// Если бронирование не уложилось в таймаут, незавершённая транзакция
    /// откатывается при drop и возвращается `StoreUnavailable`.
    pub async fn book_ticket(&self, ticket: NewTicket) -> Result<TicketId, BookingError> {
        let event_id = ticket.event_id;
        let user_id = ticket.user_id;
        check_price(ticket.price)?;

        let result = match tokio::time::timeout(self.timeout, self.admit(&ticket)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(event_id, user_id, timeout = ?self.timeout, "Booking timed out, transaction dropped");
                Err(BookingError::StoreUnavailable("booking timed out".to_string()))
            }
        };

        match &result {
            Ok(ticket_id) => info!(event_id, user_id, ticket_id, "Ticket booked"),
            Err(e) if e.is_retryable() => warn!(event_id, user_id, error = %e, "Booking failed"),
            Err(e) => debug!(event_id, user_id, error = %e, "Booking rejected"),
        }
        result
    }

    async fn admit(&self, ticket: &NewTicket) -> Result<TicketId, BookingError> {
        // Блокировка берётся до чтения количества и держится до commit
        let guard = self.locks.acquire(ticket.event_id).await;
        debug!(event_id = guard.event_id(), user_id = ticket.user_id, "Event lock acquired");

        let mut tx = self.store.begin().await.map_err(|e| store_failure(e, ticket))?;
        match Self::admit_in(tx.as_mut(), ticket).await {
            Ok(ticket_id) => {
                tx.commit().await.map_err(|e| store_failure(e, ticket))?;
                Ok(ticket_id)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(event_id = ticket.event_id, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn admit_in(
        tx: &mut dyn TicketTransaction,
        ticket: &NewTicket,
    ) -> Result<TicketId, BookingError> {
        let event_id = ticket.event_id;

        let capacity = tx
            .event_capacity(event_id)
            .await
            .map_err(|e| store_failure(e, ticket))?
            .ok_or(BookingError::EventNotFound(event_id))?;

        let sold = tx.count_tickets(event_id).await.map_err(|e| store_failure(e, ticket))?;
        if sold >= i64::from(capacity) {
            return Err(BookingError::CapacityExceeded { event_id, capacity });
        }

        tx.insert_ticket(ticket).await.map_err(|e| store_failure(e, ticket))
    }

    pub async fn availability(&self, event_id: EventId) -> Result<Availability, BookingError> {
        self.store
            .availability(event_id)
            .await
            .map_err(|e| BookingError::from_store(e, event_id, None))?
            .ok_or(BookingError::EventNotFound(event_id))
    }

    pub async fn list_tickets(&self, event_id: EventId) -> Result<Vec<Ticket>, BookingError> {
        self.store
            .list_tickets(event_id)
            .await
            .map_err(|e| BookingError::from_store(e, event_id, None))
    }

    /// Меняет место и цену. Вместимость не проверяется: она ограничивает только создание.
    pub async fn update_ticket(
        &self,
        event_id: EventId,
        ticket_id: TicketId,
        changes: TicketChanges,
    ) -> Result<u64, BookingError> {
        check_price(changes.price)?;
        self.store
            .update_ticket(event_id, ticket_id, &changes)
            .await
            .map_err(|e| BookingError::from_store(e, event_id, None))
    }

    // Удаление только уменьшает счётчик, блокировка не нужна
    pub async fn delete_ticket(&self, event_id: EventId, ticket_id: TicketId) -> Result<u64, BookingError> {
        let changes = self
            .store
            .delete_ticket(event_id, ticket_id)
            .await
            .map_err(|e| BookingError::from_store(e, event_id, None))?;
        if changes > 0 {
            info!(event_id, ticket_id, "Ticket deleted, seat released");
        }
        Ok(changes)
    }

    pub async fn release_user_tickets(&self, event_id: EventId, user_id: UserId) -> Result<u64, BookingError> {
        let changes = self
            .store
            .release_user_tickets(event_id, user_id)
            .await
            .map_err(|e| BookingError::from_store(e, event_id, Some(user_id)))?;
        info!(event_id, user_id, released = changes, "User tickets released");
        Ok(changes)
    }
}

fn check_price(price: f64) -> Result<(), BookingError> {
    if is_valid_price(price) {
        Ok(())
    } else {
        Err(BookingError::InvalidTicket(format!("price {} must be non-negative", price)))
    }
}

fn store_failure(err: StoreError, ticket: &NewTicket) -> BookingError {
    BookingError::from_store(err, ticket.event_id, Some(ticket.user_id))
}
