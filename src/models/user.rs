use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

use crate::database::Database;

pub type UserId = i64;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

/// Публичное представление пользователя (без хеша пароля).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl User {
    // Найти пользователя по email
    pub async fn find_by_email(email: &str, db: &Database) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, email, password_hash, created_at FROM users WHERE email = $1"
        )
        .bind(email)
        .fetch_optional(&db.pool)
        .await
    }

    pub async fn insert(
        name: &str,
        email: &str,
        password_hash: &str,
        db: &Database,
    ) -> Result<UserId, sqlx::Error> {
        sqlx::query_scalar::<_, UserId>(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) RETURNING id"
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&db.pool)
        .await
    }

    pub async fn list(db: &Database) -> Result<Vec<UserSummary>, sqlx::Error> {
        sqlx::query_as::<_, UserSummary>("SELECT id, name, email FROM users ORDER BY id")
            .fetch_all(&db.pool)
            .await
    }
}
