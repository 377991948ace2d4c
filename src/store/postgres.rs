use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::{Availability, StoreError, TicketStore, TicketTransaction};
use crate::models::{EventId, NewTicket, Ticket, TicketChanges, TicketId, UserId};

#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PgTicketTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn begin(&self) -> Result<Box<dyn TicketTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTicketTransaction { tx }))
    }

    async fn availability(&self, event_id: EventId) -> Result<Option<Availability>, StoreError> {
        let row = sqlx::query_as::<_, (i32, i64)>(
            r#"
            SELECT e.available_seats,
                   (SELECT COUNT(*) FROM tickets t WHERE t.event_id = e.id) AS sold
            FROM events e
            WHERE e.id = $1
            "#
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(capacity, sold)| Availability::new(event_id, capacity, sold)))
    }

    async fn list_tickets(&self, event_id: EventId) -> Result<Vec<Ticket>, StoreError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT id, seat, price, event_id, user_id FROM tickets WHERE event_id = $1 ORDER BY id"
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn update_ticket(
        &self,
        event_id: EventId,
        ticket_id: TicketId,
        changes: &TicketChanges,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE tickets SET seat = $1, price = $2 WHERE id = $3 AND event_id = $4"
        )
        .bind(&changes.seat)
        .bind(changes.price)
        .bind(ticket_id)
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_ticket(&self, event_id: EventId, ticket_id: TicketId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = $1 AND event_id = $2")
            .bind(ticket_id)
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn release_user_tickets(&self, event_id: EventId, user_id: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tickets WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TicketTransaction for PgTicketTransaction {
    async fn event_capacity(&mut self, event_id: EventId) -> Result<Option<i32>, StoreError> {
        // FOR UPDATE: конкурирующие бронирования того же события ждут здесь,
        // в том числе из других процессов
        let capacity = sqlx::query_scalar::<_, i32>(
            "SELECT available_seats FROM events WHERE id = $1 FOR UPDATE"
        )
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(capacity)
    }

    async fn count_tickets(&mut self, event_id: EventId) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tickets WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn insert_ticket(&mut self, ticket: &NewTicket) -> Result<TicketId, StoreError> {
        let id = sqlx::query_scalar::<_, TicketId>(
            "INSERT INTO tickets (seat, price, event_id, user_id)
             VALUES ($1, $2, $3, $4)
             RETURNING id"
        )
        .bind(&ticket.seat)
        .bind(ticket.price)
        .bind(ticket.event_id)
        .bind(ticket.user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
