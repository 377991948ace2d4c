//! Реестр блокировок по событиям.
//!
//! Бронирования одного события выполняются строго по очереди, разные события
//! друг друга не ждут. Мьютекс события создаётся при первом обращении и
//! удаляется из реестра, когда его больше никто не держит и не ждёт.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::EventId;

type Registry = HashMap<EventId, Weak<AsyncMutex<()>>>;

#[derive(Clone, Default)]
pub struct EventLocks {
    registry: Arc<Mutex<Registry>>,
}

/// Удерживает эксклюзивный доступ к событию; освобождается при drop.
pub struct EventGuard {
    event_id: EventId,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Arc<Mutex<Registry>>,
}

impl EventLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, event_id: EventId) -> EventGuard {
        let lock = {
            let mut registry = lock_registry(&self.registry);
            match registry.get(&event_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    registry.insert(event_id, Arc::downgrade(&lock));
                    lock
                }
            }
        };

        EventGuard {
            event_id,
            guard: Some(lock.lock_owned().await),
            registry: self.registry.clone(),
        }
    }

    /// Сколько событий сейчас отслеживается реестром.
    pub fn tracked(&self) -> usize {
        lock_registry(&self.registry).len()
    }
}

impl EventGuard {
    pub fn event_id(&self) -> EventId {
        self.event_id
    }
}

impl Drop for EventGuard {
    fn drop(&mut self) {
        // сначала отпускаем мьютекс, затем чистим запись, если он больше никому не нужен
        drop(self.guard.take());

        let mut registry = lock_registry(&self.registry);
        let idle = registry
            .get(&self.event_id)
            .is_some_and(|weak| weak.strong_count() == 0);
        if idle {
            registry.remove(&self.event_id);
        }
    }
}

fn lock_registry(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}
