use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::error::Result;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &str) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                owner_email TEXT NOT NULL,
                internal_notes TEXT,
                insurance_policy_number TEXT,
                species TEXT,
                breed TEXT,
                birth_date TEXT,
                microchip_id TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pet_contacts (
                id TEXT PRIMARY KEY,
                pet_id TEXT NOT NULL,
                role TEXT NOT NULL,
                name TEXT NOT NULL,
                phone TEXT,
                email TEXT,
                address TEXT,
                FOREIGN KEY (pet_id) REFERENCES pets(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vaccinations (
                id TEXT PRIMARY KEY,
                pet_id TEXT NOT NULL,
                name TEXT NOT NULL,
                administered_on TEXT,
                next_due TEXT,
                clinic TEXT,
                FOREIGN KEY (pet_id) REFERENCES pets(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS medications (
                id TEXT PRIMARY KEY,
                pet_id TEXT NOT NULL,
                name TEXT NOT NULL,
                dosage TEXT,
                start_date TEXT,
                end_date TEXT,
                time_of_day TEXT,
                frequency TEXT,
                interval_count INTEGER NOT NULL DEFAULT 1,
                notes TEXT,
                FOREIGN KEY (pet_id) REFERENCES pets(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                pet_id TEXT NOT NULL,
                title TEXT NOT NULL,
                kind TEXT NOT NULL,
                storage_key TEXT,
                uploaded_at TEXT NOT NULL,
                FOREIGN KEY (pet_id) REFERENCES pets(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS routine_items (
                id TEXT PRIMARY KEY,
                pet_id TEXT NOT NULL,
                title TEXT NOT NULL,
                starts_on TEXT,
                time_of_day TEXT,
                frequency TEXT,
                interval_count INTEGER NOT NULL DEFAULT 1,
                notes TEXT,
                FOREIGN KEY (pet_id) REFERENCES pets(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS appointments (
                id TEXT PRIMARY KEY,
                pet_id TEXT NOT NULL,
                title TEXT NOT NULL,
                starts_at TEXT,
                ends_at TEXT,
                location TEXT,
                notes TEXT,
                FOREIGN KEY (pet_id) REFERENCES pets(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS share_links (
                id TEXT PRIMARY KEY,
                pet_id TEXT NOT NULL,
                token TEXT UNIQUE NOT NULL,
                scope TEXT NOT NULL DEFAULT '',
                pin TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                revoked_at TEXT,
                FOREIGN KEY (pet_id) REFERENCES pets(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS calendar_feeds (
                id TEXT PRIMARY KEY,
                pet_id TEXT NOT NULL,
                token TEXT UNIQUE NOT NULL,
                calendar_name TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                revoked_at TEXT,
                FOREIGN KEY (pet_id) REFERENCES pets(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // At most one active feed per pet
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_calendar_feeds_active ON calendar_feeds(pet_id) WHERE is_active = 1",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_share_links_pet ON share_links(pet_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
