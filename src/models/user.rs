use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

/// Why user creation failed; `EmailTaken` is surfaced on the registration
/// form, everything else bubbles up as a generic failure.
#[derive(Debug)]
pub enum CreateUserError {
    EmailTaken,
    Database(sqlx::Error),
    Hash(bcrypt::BcryptError),
}

impl User {
    /// Register a new user with a bcrypt-hashed password. Runs in its own
    /// transaction; a duplicate email trips the unique constraint and maps
    /// to `EmailTaken`.
    pub async fn create(pool: &SqlitePool, email: &str, password: &str) -> Result<User, CreateUserError> {
        let password_hash =
            bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(CreateUserError::Hash)?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.trim().to_string(),
            password_hash,
            created_at: Utc::now().to_rfc3339(),
        };

        let mut tx = pool.begin().await.map_err(CreateUserError::Database)?;

        let result = sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.created_at)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {
                tx.commit().await.map_err(CreateUserError::Database)?;
                Ok(user)
            }
            Err(e) if is_unique_violation(&e) => Err(CreateUserError::EmailTaken),
            Err(e) => Err(CreateUserError::Database(e)),
        }
    }

    pub async fn by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email.trim())
            .fetch_optional(pool)
            .await
    }

    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }
}

pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
