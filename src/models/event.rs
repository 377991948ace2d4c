use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::database::Database;
use super::UserId;

pub type EventId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_category")]
pub enum EventCategory {
    Concert,
    Conference,
    Game,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventCategory::Concert => "Concert",
            EventCategory::Conference => "Conference",
            EventCategory::Game => "Game",
        };
        f.write_str(name)
    }
}

impl FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Concert" => Ok(EventCategory::Concert),
            "Conference" => Ok(EventCategory::Conference),
            "Game" => Ok(EventCategory::Game),
            _ => Err("Category must be Concert, Conference or Game.".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub description: String,
    pub date: NaiveDate,
    pub category: EventCategory,
    pub available_seats: i32,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub name: String,
    pub description: String,
    pub date: NaiveDate,
    pub category: EventCategory,
    pub available_seats: i32,
}

/// Событие, на которое у пользователя есть билеты.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BookedEvent {
    pub id: EventId,
    pub name: String,
    pub date: NaiveDate,
    pub category: EventCategory,
}

// Фильтры GET /events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub category: Option<EventCategory>,
    pub name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl EventFilter {
    /// Ключ кеша, однозначно описывающий набор фильтров.
    pub fn cache_key(&self) -> String {
        fn opt<T: fmt::Display>(value: &Option<T>) -> String {
            value.as_ref().map(|v| v.to_string()).unwrap_or_default()
        }
        format!(
            "search:events:c={}&n={}&from={}&to={}",
            opt(&self.category),
            opt(&self.name),
            opt(&self.start_date),
            opt(&self.end_date),
        )
    }

    // WHERE-часть запроса с нумерацией параметров $1..$n
    fn where_clause(&self) -> String {
        let mut clause = String::from(" WHERE 1=1");
        let mut bind_idx = 1;
        if self.category.is_some() {
            clause.push_str(&format!(" AND category = ${}", bind_idx));
            bind_idx += 1;
        }
        if self.name.is_some() {
            clause.push_str(&format!(" AND name ILIKE ${}", bind_idx));
            bind_idx += 1;
        }
        if self.start_date.is_some() {
            clause.push_str(&format!(" AND date >= ${}", bind_idx));
            bind_idx += 1;
        }
        if self.end_date.is_some() {
            clause.push_str(&format!(" AND date <= ${}", bind_idx));
        }
        clause
    }
}

impl Event {
    pub async fn insert(event: &NewEvent, db: &Database) -> Result<EventId, sqlx::Error> {
        sqlx::query_scalar::<_, EventId>(
            "INSERT INTO events (name, description, date, category, available_seats)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id"
        )
        .bind(&event.name)
        .bind(&event.description)
        .bind(event.date)
        .bind(event.category)
        .bind(event.available_seats)
        .fetch_one(&db.pool)
        .await
    }

    pub async fn search(filter: &EventFilter, db: &Database) -> Result<Vec<Event>, sqlx::Error> {
        let q = format!(
            "SELECT id, name, description, date, category, available_seats FROM events{} ORDER BY date, id",
            filter.where_clause()
        );

        let mut dbq = sqlx::query_as::<_, Event>(&q);
        if let Some(category) = filter.category { dbq = dbq.bind(category); }
        if let Some(ref name) = filter.name { dbq = dbq.bind(format!("%{}%", name)); }
        if let Some(from) = filter.start_date { dbq = dbq.bind(from); }
        if let Some(to) = filter.end_date { dbq = dbq.bind(to); }

        dbq.fetch_all(&db.pool).await
    }

    pub async fn booked_by(user_id: UserId, db: &Database) -> Result<Vec<BookedEvent>, sqlx::Error> {
        sqlx::query_as::<_, BookedEvent>(
            r#"
            SELECT DISTINCT e.id, e.name, e.date, e.category
            FROM events e
            JOIN tickets t ON t.event_id = e.id
            WHERE t.user_id = $1
            ORDER BY e.date, e.id
            "#
        )
        .bind(user_id)
        .fetch_all(&db.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_json_names() {
        let parsed: EventCategory = serde_json::from_str("\"Conference\"").unwrap();
        assert_eq!(parsed, EventCategory::Conference);
        assert!(serde_json::from_str::<EventCategory>("\"Opera\"").is_err());
    }

    #[test]
    fn category_parses_exact_names_only() {
        assert_eq!("Game".parse::<EventCategory>(), Ok(EventCategory::Game));
        assert!("game".parse::<EventCategory>().is_err());
        assert_eq!(EventCategory::Concert.to_string(), "Concert");
    }

    #[test]
    fn where_clause_numbers_only_present_filters() {
        let filter = EventFilter {
            name: Some("jazz".into()),
            end_date: NaiveDate::from_ymd_opt(2024, 7, 1),
            ..Default::default()
        };
        assert_eq!(filter.where_clause(), " WHERE 1=1 AND name ILIKE $1 AND date <= $2");
        assert_eq!(EventFilter::default().where_clause(), " WHERE 1=1");
    }

    #[test]
    fn cache_key_distinguishes_filters() {
        let all = EventFilter::default();
        let games = EventFilter { category: Some(EventCategory::Game), ..Default::default() };

        assert_ne!(all.cache_key(), games.cache_key());
        assert!(games.cache_key().starts_with("search:events:"));
        assert!(games.cache_key().contains("c=Game"));
    }

    #[test]
    fn event_serializes_with_camel_case_fields() {
        let event = Event {
            id: 7,
            name: "EventName".into(),
            description: "Finals".into(),
            date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            category: EventCategory::Game,
            available_seats: 100,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["availableSeats"], 100);
        assert_eq!(json["date"], "2024-07-01");
        assert_eq!(json["category"], "Game");
    }
}
