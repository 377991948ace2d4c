//! Ежедневные напоминания о предстоящих событиях.
//!
//! Раз в сутки (в `REMINDER_RUN_AT`, UTC) находим всех держателей билетов на
//! события через `lead_days` дней, "отправляем" напоминание (запись в лог) и
//! фиксируем его в `event_logs`. Повторный запуск в тот же день дублей не создаёт.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use sqlx::FromRow;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::ReminderConfig;
use crate::database::Database;
use crate::models::{EventId, UserId};

#[derive(Debug, FromRow)]
struct UpcomingAttendee {
    user_id: UserId,
    email: String,
    event_id: EventId,
    name: String,
    date: NaiveDate,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReminderStats {
    pub found: usize,
    pub recorded: usize,
}

pub fn reminder_message(event_name: &str, date: NaiveDate) -> String {
    format!(
        "Reminder: You have an upcoming event \"{}\" on {}.",
        event_name,
        date.format("%Y-%m-%d")
    )
}

/// Ближайший момент запуска строго после `now`.
pub fn next_run_after(now: DateTime<Utc>, run_at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(run_at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

pub struct ReminderService {
    db: Database,
    config: ReminderConfig,
}

impl ReminderService {
    pub fn new(db: Database, config: ReminderConfig) -> Self {
        Self { db, config }
    }

    pub fn target_date(&self, today: NaiveDate) -> NaiveDate {
        today + Duration::days(self.config.lead_days)
    }

    /// Один проход: напоминания для событий, которые пройдут через `lead_days` от `today`.
    pub async fn run_once(&self, today: NaiveDate) -> Result<ReminderStats, sqlx::Error> {
        let target = self.target_date(today);

        let attendees = sqlx::query_as::<_, UpcomingAttendee>(
            r#"
            SELECT DISTINCT u.id AS user_id, u.email, e.id AS event_id, e.name, e.date
            FROM events e
            JOIN tickets t ON t.event_id = e.id
            JOIN users u ON u.id = t.user_id
            WHERE e.date = $1
            ORDER BY e.id, u.id
            "#
        )
        .bind(target)
        .fetch_all(&self.db.pool)
        .await?;

        let mut stats = ReminderStats { found: attendees.len(), recorded: 0 };
        if attendees.is_empty() {
            info!("🔔 No upcoming events on {}", target);
            return Ok(stats);
        }

        for attendee in attendees {
            let message = reminder_message(&attendee.name, attendee.date);
            info!(user_id = attendee.user_id, event_id = attendee.event_id, "Sending notification to {}: {}", attendee.email, message);

            let inserted = sqlx::query(
                "INSERT INTO event_logs (user_id, event_id, notification_date, message)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (user_id, event_id, notification_date) DO NOTHING"
            )
            .bind(attendee.user_id)
            .bind(attendee.event_id)
            .bind(today)
            .bind(&message)
            .execute(&self.db.pool)
            .await;

            match inserted {
                Ok(result) => stats.recorded += result.rows_affected() as usize,
                Err(e) => error!("Error logging event notification for user {}: {:?}", attendee.user_id, e),
            }
        }

        info!("🔔 Reminders for {}: {} found, {} recorded", target, stats.found, stats.recorded);
        Ok(stats)
    }

    /// Цикл планировщика; завершается, когда `shutdown` получает `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Reminder job scheduled daily at {} UTC", self.config.run_at);
        loop {
            let now = Utc::now();
            let next = next_run_after(now, self.config.run_at);
            let wait = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.run_once(Utc::now().date_naive()).await {
                        error!("Error fetching upcoming events: {:?}", e);
                    }
                }
                _ = shutdown.changed() => {
                    info!("Reminder job stopped");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn message_matches_notification_format() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(
            reminder_message("EventName", date),
            "Reminder: You have an upcoming event \"EventName\" on 2024-07-01."
        );
    }

    #[test]
    fn next_run_is_later_today_when_time_not_reached() {
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 5, 0, 0).unwrap();
        let run_at = NaiveTime::from_hms_opt(7, 30, 0).unwrap();

        assert_eq!(next_run_after(now, run_at), Utc.with_ymd_and_hms(2024, 6, 30, 7, 30, 0).unwrap());
    }

    #[test]
    fn next_run_rolls_to_tomorrow_at_or_after_run_time() {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        let exactly = Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 0).unwrap();

        assert_eq!(next_run_after(exactly, midnight), Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
        assert_eq!(next_run_after(later, midnight), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn target_date_applies_lead_days() {
        let db = Database::connect_lazy("postgres://localhost/unused", 1).unwrap();
        let service = ReminderService::new(
            db,
            ReminderConfig {
                enabled: true,
                run_at: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                lead_days: 1,
            },
        );

        let today = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        assert_eq!(service.target_date(today), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }
}
