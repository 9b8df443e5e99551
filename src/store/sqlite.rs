use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{
    care_events, format_scope, parse_scope, Appointment, Contact, DocumentMeta, FeedData,
    Frequency, Medication, PetProfile, PetRecord, RoutineItem, ScopeCategory, ShareConfig,
    Vaccination,
};
use crate::services::{FeedToken, RecordProjector, ShareToken};
use crate::store::{FeedResolver, ShareResolution, ShareResolver};

const MAX_TOKEN_ATTEMPTS: usize = 10;
const MIN_PIN_LEN: usize = 4;
const MAX_PIN_LEN: usize = 12;

#[derive(Debug, FromRow)]
struct PetRow {
    id: String,
    name: String,
    owner_email: String,
    internal_notes: Option<String>,
    insurance_policy_number: Option<String>,
    species: Option<String>,
    breed: Option<String>,
    birth_date: Option<String>,
    microchip_id: Option<String>,
}

#[derive(Debug, FromRow)]
struct ContactRow {
    id: String,
    role: String,
    name: String,
    phone: Option<String>,
    email: Option<String>,
    address: Option<String>,
}

#[derive(Debug, FromRow)]
struct VaccinationRow {
    id: String,
    name: String,
    administered_on: Option<String>,
    next_due: Option<String>,
    clinic: Option<String>,
}

#[derive(Debug, FromRow)]
struct MedicationRow {
    id: String,
    name: String,
    dosage: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    time_of_day: Option<String>,
    frequency: Option<String>,
    interval_count: i64,
    notes: Option<String>,
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: String,
    title: String,
    kind: String,
    uploaded_at: String,
}

#[derive(Debug, FromRow)]
struct RoutineRow {
    id: String,
    title: String,
    starts_on: Option<String>,
    time_of_day: Option<String>,
    frequency: Option<String>,
    interval_count: i64,
    notes: Option<String>,
}

#[derive(Debug, FromRow)]
struct AppointmentRow {
    id: String,
    title: String,
    starts_at: Option<String>,
    ends_at: Option<String>,
    location: Option<String>,
    notes: Option<String>,
}

#[derive(FromRow)]
struct ShareLinkRow {
    pet_id: String,
    scope: String,
    pin: Option<String>,
    is_active: bool,
}

#[derive(Debug, FromRow)]
struct FeedRow {
    pet_id: String,
    calendar_name: String,
}

// Malformed stored values become `None` so one bad column cannot fail a whole lookup.
fn parse_date(value: Option<String>, field: &str) -> Option<NaiveDate> {
    let raw = value?;
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(e) => {
            tracing::warn!("Ignoring invalid {} '{}': {}", field, raw, e);
            None
        }
    }
}

fn parse_time(value: Option<String>, field: &str) -> Option<NaiveTime> {
    let raw = value?;
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|e| tracing::warn!("Ignoring invalid {} '{}': {}", field, raw, e))
        .ok()
}

fn parse_datetime(value: Option<String>, field: &str) -> Option<DateTime<Utc>> {
    let raw = value?;
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!("Ignoring invalid {} '{}': {}", field, raw, e);
            None
        }
    }
}

fn parse_frequency(value: Option<String>) -> Option<Frequency> {
    let raw = value?;
    let frequency = Frequency::from_str(&raw);
    if frequency.is_none() && !raw.trim().is_empty() {
        tracing::warn!("Ignoring unknown frequency '{}'", raw);
    }
    frequency
}

fn interval(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(1).max(1)
}

/// Empty means "no PIN"; otherwise 4 to 12 ASCII letters or digits
fn normalize_pin(pin: Option<&str>) -> Result<Option<String>> {
    let pin = match pin.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(pin) => pin,
    };
    if !(MIN_PIN_LEN..=MAX_PIN_LEN).contains(&pin.len())
        || !pin.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return Err(AppError::BadRequest(format!(
            "PIN must be {} to {} letters or digits",
            MIN_PIN_LEN, MAX_PIN_LEN
        )));
    }
    Ok(Some(pin.to_string()))
}

fn is_token_conflict(e: &sqlx::Error, table: &str) -> bool {
    match e {
        sqlx::Error::Database(db_err) => db_err
            .message()
            .contains(&format!("UNIQUE constraint failed: {}.token", table)),
        _ => false,
    }
}

/// SQLite-backed record store
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn load_pet(conn: &mut SqliteConnection, pet_id: &str) -> Result<Option<PetRecord>> {
        let pet: Option<PetRow> = sqlx::query_as(
            r#"
            SELECT id, name, owner_email, internal_notes, insurance_policy_number,
                   species, breed, birth_date, microchip_id
            FROM pets WHERE id = ?
            "#,
        )
        .bind(pet_id)
        .fetch_optional(&mut *conn)
        .await?;

        let pet = match pet {
            Some(pet) => pet,
            None => return Ok(None),
        };

        let contacts: Vec<ContactRow> = sqlx::query_as(
            "SELECT id, role, name, phone, email, address FROM pet_contacts WHERE pet_id = ? ORDER BY role, name",
        )
        .bind(pet_id)
        .fetch_all(&mut *conn)
        .await?;

        let vaccinations: Vec<VaccinationRow> = sqlx::query_as(
            "SELECT id, name, administered_on, next_due, clinic FROM vaccinations WHERE pet_id = ? ORDER BY name",
        )
        .bind(pet_id)
        .fetch_all(&mut *conn)
        .await?;

        let medications: Vec<MedicationRow> = sqlx::query_as(
            r#"
            SELECT id, name, dosage, start_date, end_date, time_of_day, frequency, interval_count, notes
            FROM medications WHERE pet_id = ? ORDER BY name
            "#,
        )
        .bind(pet_id)
        .fetch_all(&mut *conn)
        .await?;

        let documents: Vec<DocumentRow> = sqlx::query_as(
            "SELECT id, title, kind, uploaded_at FROM documents WHERE pet_id = ? ORDER BY uploaded_at DESC",
        )
        .bind(pet_id)
        .fetch_all(&mut *conn)
        .await?;

        let routine: Vec<RoutineRow> = sqlx::query_as(
            r#"
            SELECT id, title, starts_on, time_of_day, frequency, interval_count, notes
            FROM routine_items WHERE pet_id = ? ORDER BY time_of_day
            "#,
        )
        .bind(pet_id)
        .fetch_all(&mut *conn)
        .await?;

        let appointments: Vec<AppointmentRow> = sqlx::query_as(
            "SELECT id, title, starts_at, ends_at, location, notes FROM appointments WHERE pet_id = ? ORDER BY starts_at",
        )
        .bind(pet_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(PetRecord {
            id: pet.id,
            name: pet.name,
            owner_email: pet.owner_email,
            internal_notes: pet.internal_notes,
            insurance_policy_number: pet.insurance_policy_number,
            profile: PetProfile {
                species: pet.species,
                breed: pet.breed,
                birth_date: parse_date(pet.birth_date, "birth_date"),
                microchip_id: pet.microchip_id,
            },
            contacts: contacts
                .into_iter()
                .map(|c| Contact {
                    id: c.id,
                    role: c.role,
                    name: c.name,
                    phone: c.phone,
                    email: c.email,
                    address: c.address,
                })
                .collect(),
            vaccinations: vaccinations
                .into_iter()
                .map(|v| Vaccination {
                    id: v.id,
                    name: v.name,
                    administered_on: parse_date(v.administered_on, "administered_on"),
                    next_due: parse_date(v.next_due, "next_due"),
                    clinic: v.clinic,
                })
                .collect(),
            medications: medications
                .into_iter()
                .map(|m| Medication {
                    id: m.id,
                    name: m.name,
                    dosage: m.dosage,
                    start_date: parse_date(m.start_date, "start_date"),
                    end_date: parse_date(m.end_date, "end_date"),
                    time_of_day: parse_time(m.time_of_day, "time_of_day"),
                    frequency: parse_frequency(m.frequency),
                    interval: interval(m.interval_count),
                    notes: m.notes,
                })
                .collect(),
            documents: documents
                .into_iter()
                .filter_map(|d| {
                    let uploaded_at = parse_datetime(Some(d.uploaded_at), "uploaded_at")?;
                    Some(DocumentMeta {
                        id: d.id,
                        title: d.title,
                        kind: d.kind,
                        uploaded_at,
                    })
                })
                .collect(),
            routine: routine
                .into_iter()
                .map(|r| RoutineItem {
                    id: r.id,
                    title: r.title,
                    starts_on: parse_date(r.starts_on, "starts_on"),
                    time_of_day: parse_time(r.time_of_day, "time_of_day"),
                    frequency: parse_frequency(r.frequency),
                    interval: interval(r.interval_count),
                    notes: r.notes,
                })
                .collect(),
            appointments: appointments
                .into_iter()
                .map(|a| Appointment {
                    id: a.id,
                    title: a.title,
                    starts_at: parse_datetime(a.starts_at, "starts_at"),
                    ends_at: parse_datetime(a.ends_at, "ends_at"),
                    location: a.location,
                    notes: a.notes,
                })
                .collect(),
        }))
    }

    async fn pet_name(&self, pet_id: &str) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT name FROM pets WHERE id = ?")
            .bind(pet_id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Pet not found".to_string()))
    }

    /// Create a share link for a pet and return its token
    pub async fn create_share(
        &self,
        pet_id: &str,
        scope: &BTreeSet<ScopeCategory>,
        pin: Option<&str>,
    ) -> Result<ShareToken> {
        let pin = normalize_pin(pin)?;
        self.pet_name(pet_id).await?;

        let share_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let scope = format_scope(scope);

        let mut last_error: Option<sqlx::Error> = None;
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let candidate = ShareToken::generate();
            let result = sqlx::query(
                r#"
                INSERT INTO share_links (id, pet_id, token, scope, pin, is_active, created_at)
                VALUES (?, ?, ?, ?, ?, 1, ?)
                "#,
            )
            .bind(&share_id)
            .bind(pet_id)
            .bind(candidate.as_str())
            .bind(&scope)
            .bind(&pin)
            .bind(&now)
            .execute(self.db.pool())
            .await;

            match result {
                Ok(_) => {
                    tracing::info!(
                        "Created share {} for pet {} (scope: {}, pin: {})",
                        share_id,
                        pet_id,
                        scope,
                        pin.is_some()
                    );
                    return Ok(candidate);
                }
                Err(e) if is_token_conflict(&e, "share_links") => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Internal(format!(
            "Failed to generate unique share token: {}",
            last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        )))
    }

    /// Deactivate a share link. Returns false if it was unknown or already inactive.
    pub async fn revoke_share(&self, token: &ShareToken) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE share_links SET is_active = 0, revoked_at = ? WHERE token = ? AND is_active = 1",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(token.as_str())
        .execute(self.db.pool())
        .await?;

        let revoked = result.rows_affected() > 0;
        if revoked {
            tracing::info!("Revoked share link");
        }
        Ok(revoked)
    }

    /// Issue a new calendar feed token for a pet, deactivating any previous one
    pub async fn rotate_feed_token(
        &self,
        pet_id: &str,
        calendar_name: Option<&str>,
    ) -> Result<FeedToken> {
        let pet_name = self.pet_name(pet_id).await?;
        let calendar_name = calendar_name
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} care", pet_name));
        let now = Utc::now().to_rfc3339();

        let mut last_error: Option<sqlx::Error> = None;
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let candidate = FeedToken::generate();
            let mut tx = self.db.pool().begin().await?;

            sqlx::query(
                "UPDATE calendar_feeds SET is_active = 0, revoked_at = ? WHERE pet_id = ? AND is_active = 1",
            )
            .bind(&now)
            .bind(pet_id)
            .execute(&mut *tx)
            .await?;

            let result = sqlx::query(
                r#"
                INSERT INTO calendar_feeds (id, pet_id, token, calendar_name, is_active, created_at)
                VALUES (?, ?, ?, ?, 1, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(pet_id)
            .bind(candidate.as_str())
            .bind(&calendar_name)
            .bind(&now)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => {
                    tx.commit().await?;
                    tracing::info!("Rotated calendar feed token for pet {}", pet_id);
                    return Ok(candidate);
                }
                Err(e) if is_token_conflict(&e, "calendar_feeds") => {
                    tx.rollback().await?;
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Internal(format!(
            "Failed to generate unique feed token: {}",
            last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        )))
    }
}

#[async_trait]
impl ShareResolver for SqliteStore {
    async fn resolve_share(&self, token: &ShareToken) -> Result<ShareResolution> {
        let mut tx = self.db.pool().begin().await?;

        let link: Option<ShareLinkRow> =
            sqlx::query_as("SELECT pet_id, scope, pin, is_active FROM share_links WHERE token = ?")
                .bind(token.as_str())
                .fetch_optional(&mut *tx)
                .await?;

        let link = match link {
            Some(link) => link,
            None => return Ok(ShareResolution::NotFound),
        };
        if !link.is_active {
            return Ok(ShareResolution::Inactive);
        }

        let record = match Self::load_pet(&mut *tx, &link.pet_id).await? {
            Some(record) => record,
            None => return Ok(ShareResolution::NotFound),
        };
        tx.commit().await?;

        Ok(ShareResolution::Found {
            record,
            config: ShareConfig {
                scope: parse_scope(&link.scope),
                pin: link.pin,
                is_active: link.is_active,
            },
        })
    }
}

#[async_trait]
impl FeedResolver for SqliteStore {
    async fn resolve_feed(&self, token: &FeedToken) -> Result<Option<FeedData>> {
        let mut tx = self.db.pool().begin().await?;

        let feed: Option<FeedRow> = sqlx::query_as(
            "SELECT pet_id, calendar_name FROM calendar_feeds WHERE token = ? AND is_active = 1",
        )
        .bind(token.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let feed = match feed {
            Some(feed) => feed,
            None => return Ok(None),
        };

        let record = match Self::load_pet(&mut *tx, &feed.pet_id).await? {
            Some(record) => record,
            None => return Ok(None),
        };
        tx.commit().await?;

        // Feed events come from the public projection, never the raw record.
        let view = RecordProjector::project_calendar(record);
        Ok(Some(FeedData {
            events: care_events(&view),
            pet_name: view.pet_name().to_string(),
            calendar_name: feed.calendar_name,
        }))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{seed_fluffy, temp_store};
    use super::*;

    #[tokio::test]
    async fn test_create_and_resolve_share() {
        let (_dir, store) = temp_store().await;
        let pet_id = seed_fluffy(&store).await;
        let scope = BTreeSet::from([ScopeCategory::Contacts, ScopeCategory::Vaccinations]);

        let token = store.create_share(&pet_id, &scope, Some("0000")).await.unwrap();

        match store.resolve_share(&token).await.unwrap() {
            ShareResolution::Found { record, config } => {
                assert_eq!(record.name, "Fluffy");
                assert_eq!(record.contacts.len(), 1);
                assert_eq!(record.appointments.len(), 2);
                assert!(record.appointments[1].starts_at.is_none());
                assert_eq!(config.scope, scope);
                assert_eq!(config.pin.as_deref(), Some("0000"));
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_revoked_share_is_inactive() {
        let (_dir, store) = temp_store().await;
        let pet_id = seed_fluffy(&store).await;
        let token = store.create_share(&pet_id, &BTreeSet::new(), None).await.unwrap();

        assert!(store.revoke_share(&token).await.unwrap());
        assert!(!store.revoke_share(&token).await.unwrap());
        assert!(matches!(
            store.resolve_share(&token).await.unwrap(),
            ShareResolution::Inactive
        ));

        let unknown = ShareToken::generate();
        assert!(matches!(
            store.resolve_share(&unknown).await.unwrap(),
            ShareResolution::NotFound
        ));
    }

    #[tokio::test]
    async fn test_create_share_validates_input() {
        let (_dir, store) = temp_store().await;
        let pet_id = seed_fluffy(&store).await;

        let err = store
            .create_share(&pet_id, &BTreeSet::new(), Some("12"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = store
            .create_share("missing-pet", &BTreeSet::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let token = store.create_share(&pet_id, &BTreeSet::new(), Some("  ")).await.unwrap();
        match store.resolve_share(&token).await.unwrap() {
            ShareResolution::Found { config, .. } => assert!(config.pin.is_none()),
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_scope_names_are_dropped_on_load() {
        let (_dir, store) = temp_store().await;
        let pet_id = seed_fluffy(&store).await;
        let token = ShareToken::generate();
        sqlx::query(
            "INSERT INTO share_links (id, pet_id, token, scope, is_active, created_at) VALUES ('s1', ?, ?, 'contacts,billing', 1, '2026-01-01T00:00:00Z')",
        )
        .bind(&pet_id)
        .bind(token.as_str())
        .execute(store.db.pool())
        .await
        .unwrap();

        match store.resolve_share(&token).await.unwrap() {
            ShareResolution::Found { config, .. } => {
                assert_eq!(config.scope, BTreeSet::from([ScopeCategory::Contacts]));
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rotate_feed_token_invalidates_previous() {
        let (_dir, store) = temp_store().await;
        let pet_id = seed_fluffy(&store).await;

        let first = store.rotate_feed_token(&pet_id, None).await.unwrap();
        let feed = store.resolve_feed(&first).await.unwrap().unwrap();
        assert_eq!(feed.calendar_name, "Fluffy care");
        assert_eq!(feed.pet_name, "Fluffy");
        // appointment x2, medication, routine, vaccination due
        assert_eq!(feed.events.len(), 5);
        let checkup = feed.events.iter().find(|e| e.source_id == "appt-a1").unwrap();
        assert!(checkup.description.is_none());
        assert!(feed
            .events
            .iter()
            .all(|e| e.description.as_deref() != Some("OWNER_ONLY_APPT_NOTE")));

        let second = store.rotate_feed_token(&pet_id, Some("Vet visits")).await.unwrap();
        assert_ne!(first, second);
        assert!(store.resolve_feed(&first).await.unwrap().is_none());
        let feed = store.resolve_feed(&second).await.unwrap().unwrap();
        assert_eq!(feed.calendar_name, "Vet visits");
    }
}
