//! Хранилище билетов в памяти процесса.
//!
//! Повторяет семантику Postgres-хранилища: незакоммиченные вставки не видны
//! другим транзакциям, при `commit` вместимость проверяется повторно (аналог
//! триггера `tickets_capacity_guard`). Умеет имитировать сбои и зависания
//! вставки для тестов отката.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use super::{Availability, StoreError, TicketStore, TicketTransaction};
use crate::models::{is_valid_price, EventId, NewTicket, Ticket, TicketChanges, TicketId, UserId};

const NEGATIVE_PRICE: &str = "price must be a non-negative number";

#[derive(Default)]
struct MemoryState {
    events: HashMap<EventId, i32>,
    users: HashSet<UserId>,
    tickets: BTreeMap<TicketId, Ticket>,
}

impl MemoryState {
    fn sold(&self, event_id: EventId) -> i64 {
        self.tickets.values().filter(|t| t.event_id == event_id).count() as i64
    }
}

#[derive(Default)]
struct Faults {
    failing_inserts: AtomicUsize,
    stall_inserts: AtomicBool,
    insert_attempts: AtomicUsize,
    held_commit: Mutex<Option<Arc<CommitGate>>>,
}

#[derive(Default)]
struct CommitGate {
    reached: Notify,
    release: Notify,
}

/// Удерживает следующий `commit`, пока не вызван [`CommitHold::release`].
pub struct CommitHold {
    gate: Arc<CommitGate>,
}

impl CommitHold {
    /// Дожидается, пока удерживаемая транзакция дойдёт до `commit`.
    pub async fn reached(&self) {
        self.gate.reached.notified().await;
    }

    pub fn release(&self) {
        self.gate.release.notify_one();
    }
}

#[derive(Clone, Default)]
pub struct MemoryTicketStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
    next_id: Arc<AtomicI64>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn add_event(&self, available_seats: i32) -> EventId {
        let id = self.next_id();
        self.state().events.insert(id, available_seats);
        id
    }

    pub fn add_user(&self) -> UserId {
        let id = self.next_id();
        self.state().users.insert(id);
        id
    }

    /// Количество закоммиченных билетов события.
    pub fn ticket_count(&self, event_id: EventId) -> usize {
        self.state().sold(event_id) as usize
    }

    /// Следующие `n` вставок завершатся ошибкой `Unavailable`.
    pub fn fail_next_inserts(&self, n: usize) {
        self.faults.failing_inserts.store(n, Ordering::SeqCst);
    }

    /// Вставки зависают, пока флаг не снят (имитация потерянного соединения).
    pub fn stall_inserts(&self, stall: bool) {
        self.faults.stall_inserts.store(stall, Ordering::SeqCst);
    }

    /// Следующий `commit` остановится перед проверкой вместимости; остальные
    /// транзакции тем временем коммитятся как обычно.
    pub fn hold_next_commit(&self) -> CommitHold {
        let gate = Arc::new(CommitGate::default());
        *self
            .faults
            .held_commit
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(gate.clone());
        CommitHold { gate }
    }

    /// Сколько раз вызывалась вставка (включая неудачные).
    pub fn insert_attempts(&self) -> usize {
        self.faults.insert_attempts.load(Ordering::SeqCst)
    }
}

pub struct MemoryTransaction {
    store: MemoryTicketStore,
    staged: Vec<Ticket>,
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn begin(&self) -> Result<Box<dyn TicketTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            staged: Vec::new(),
        }))
    }

    async fn availability(&self, event_id: EventId) -> Result<Option<Availability>, StoreError> {
        let state = self.state();
        Ok(state
            .events
            .get(&event_id)
            .map(|&capacity| Availability::new(event_id, capacity, state.sold(event_id))))
    }

    async fn list_tickets(&self, event_id: EventId) -> Result<Vec<Ticket>, StoreError> {
        Ok(self
            .state()
            .tickets
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn update_ticket(
        &self,
        event_id: EventId,
        ticket_id: TicketId,
        changes: &TicketChanges,
    ) -> Result<u64, StoreError> {
        if !is_valid_price(changes.price) {
            return Err(StoreError::Rejected(NEGATIVE_PRICE.to_string()));
        }
        let mut state = self.state();
        match state.tickets.get_mut(&ticket_id) {
            Some(ticket) if ticket.event_id == event_id => {
                ticket.seat = changes.seat.clone();
                ticket.price = changes.price;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn delete_ticket(&self, event_id: EventId, ticket_id: TicketId) -> Result<u64, StoreError> {
        let mut state = self.state();
        let matches = state
            .tickets
            .get(&ticket_id)
            .is_some_and(|t| t.event_id == event_id);
        if matches {
            state.tickets.remove(&ticket_id);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn release_user_tickets(&self, event_id: EventId, user_id: UserId) -> Result<u64, StoreError> {
        let mut state = self.state();
        let before = state.tickets.len();
        state
            .tickets
            .retain(|_, t| !(t.event_id == event_id && t.user_id == user_id));
        Ok((before - state.tickets.len()) as u64)
    }
}

#[async_trait]
impl TicketTransaction for MemoryTransaction {
    async fn event_capacity(&mut self, event_id: EventId) -> Result<Option<i32>, StoreError> {
        Ok(self.store.state().events.get(&event_id).copied())
    }

    async fn count_tickets(&mut self, event_id: EventId) -> Result<i64, StoreError> {
        let committed = self.store.state().sold(event_id);
        let staged = self.staged.iter().filter(|t| t.event_id == event_id).count() as i64;
        Ok(committed + staged)
    }

    async fn insert_ticket(&mut self, ticket: &NewTicket) -> Result<TicketId, StoreError> {
        let faults = &self.store.faults;
        faults.insert_attempts.fetch_add(1, Ordering::SeqCst);

        if faults.stall_inserts.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let failing = faults
            .failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError::Unavailable("injected insert failure".to_string()));
        }

        if !is_valid_price(ticket.price) {
            return Err(StoreError::Rejected(NEGATIVE_PRICE.to_string()));
        }

        {
            let state = self.store.state();
            if !state.events.contains_key(&ticket.event_id) {
                return Err(StoreError::MissingEvent);
            }
            if !state.users.contains(&ticket.user_id) {
                return Err(StoreError::MissingUser);
            }
        }

        let id = self.store.next_id();
        self.staged.push(Ticket {
            id,
            seat: ticket.seat.clone(),
            price: ticket.price,
            event_id: ticket.event_id,
            user_id: ticket.user_id,
        });
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { store, staged } = *self;

        let held = store
            .faults
            .held_commit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(gate) = held {
            gate.reached.notify_one();
            gate.release.notified().await;
        }

        let mut state = store.state();

        // Всё или ничего: сначала проверяем, потом применяем
        let mut pending: HashMap<EventId, i64> = HashMap::new();
        for ticket in &staged {
            let capacity = *state
                .events
                .get(&ticket.event_id)
                .ok_or(StoreError::MissingEvent)?;
            let staged = pending.entry(ticket.event_id).or_insert(0);
            *staged += 1;
            if state.sold(ticket.event_id) + *staged > i64::from(capacity) {
                return Err(StoreError::CapacityConstraint(format!(
                    "event {} is sold out ({} seats)",
                    ticket.event_id, capacity
                )));
            }
        }

        for ticket in staged {
            state.tickets.insert(ticket.id, ticket);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(event_id: EventId, user_id: UserId, seat: &str) -> NewTicket {
        NewTicket { event_id, user_id, seat: seat.to_string(), price: 50.0 }
    }

    #[tokio::test]
    async fn uncommitted_inserts_are_invisible_and_dropped() {
        let store = MemoryTicketStore::new();
        let event = store.add_event(5);
        let user = store.add_user();

        let mut tx = store.begin().await.unwrap();
        tx.insert_ticket(&ticket(event, user, "A1")).await.unwrap();
        assert_eq!(tx.count_tickets(event).await.unwrap(), 1);
        assert_eq!(store.ticket_count(event), 0);

        drop(tx);
        assert_eq!(store.ticket_count(event), 0);
    }

    #[tokio::test]
    async fn commit_rechecks_capacity_for_racing_transactions() {
        let store = MemoryTicketStore::new();
        let event = store.add_event(1);
        let user = store.add_user();

        // обе транзакции видят 0 проданных, как при гонке без блокировки
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert_eq!(first.count_tickets(event).await.unwrap(), 0);
        assert_eq!(second.count_tickets(event).await.unwrap(), 0);

        first.insert_ticket(&ticket(event, user, "A1")).await.unwrap();
        second.insert_ticket(&ticket(event, user, "A2")).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::CapacityConstraint(_)));
        assert_eq!(store.ticket_count(event), 1);
    }

    #[tokio::test]
    async fn insert_rejects_unknown_references() {
        let store = MemoryTicketStore::new();
        let event = store.add_event(3);
        let user = store.add_user();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.insert_ticket(&ticket(event + 100, user, "A1")).await,
            Err(StoreError::MissingEvent)
        );
        assert_eq!(
            tx.insert_ticket(&ticket(event, user + 100, "A1")).await,
            Err(StoreError::MissingUser)
        );
    }

    #[tokio::test]
    async fn negative_price_is_rejected_like_the_check_constraint() {
        let store = MemoryTicketStore::new();
        let event = store.add_event(3);
        let user = store.add_user();

        let mut tx = store.begin().await.unwrap();
        let mut cheap = ticket(event, user, "A1");
        cheap.price = -5.0;
        assert!(matches!(tx.insert_ticket(&cheap).await, Err(StoreError::Rejected(_))));
        let id = tx.insert_ticket(&ticket(event, user, "A1")).await.unwrap();
        tx.commit().await.unwrap();

        let changes = TicketChanges { seat: "A1".into(), price: -1.0 };
        assert!(matches!(
            store.update_ticket(event, id, &changes).await,
            Err(StoreError::Rejected(_))
        ));
        assert_eq!(store.list_tickets(event).await.unwrap()[0].price, 50.0);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_one_by_one() {
        let store = MemoryTicketStore::new();
        let event = store.add_event(3);
        let user = store.add_user();
        store.fail_next_inserts(1);

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.insert_ticket(&ticket(event, user, "A1")).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(tx.insert_ticket(&ticket(event, user, "A1")).await.is_ok());
        assert_eq!(store.insert_attempts(), 2);
    }

    #[tokio::test]
    async fn updates_and_deletes_are_scoped_to_the_event() {
        let store = MemoryTicketStore::new();
        let event = store.add_event(3);
        let other = store.add_event(3);
        let user = store.add_user();

        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_ticket(&ticket(event, user, "A1")).await.unwrap();
        tx.commit().await.unwrap();

        let changes = TicketChanges { seat: "B7".into(), price: 75.0 };
        assert_eq!(store.update_ticket(other, id, &changes).await.unwrap(), 0);
        assert_eq!(store.update_ticket(event, id, &changes).await.unwrap(), 1);
        assert_eq!(store.list_tickets(event).await.unwrap()[0].seat, "B7");

        assert_eq!(store.delete_ticket(other, id).await.unwrap(), 0);
        assert_eq!(store.delete_ticket(event, id).await.unwrap(), 1);
        assert_eq!(store.ticket_count(event), 0);
    }
}
