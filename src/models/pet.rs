use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::models::Frequency;

/// Full internal pet record as loaded from the store.
///
/// This type never crosses the response boundary. Handlers only ever see the
/// `ProjectedView` built from it.
#[derive(Debug, Clone)]
pub struct PetRecord {
    pub id: String,
    pub name: String,
    // Owner-private fields. No scope category maps to these.
    pub owner_email: String,
    pub internal_notes: Option<String>,
    pub insurance_policy_number: Option<String>,

    pub profile: PetProfile,
    pub contacts: Vec<Contact>,
    pub vaccinations: Vec<Vaccination>,
    pub medications: Vec<Medication>,
    pub documents: Vec<DocumentMeta>,
    pub routine: Vec<RoutineItem>,
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Default)]
pub struct PetProfile {
    pub species: Option<String>,
    pub breed: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub microchip_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Contact {
    pub id: String,
    /// e.g. "vet", "groomer", "emergency"
    pub role: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Vaccination {
    pub id: String,
    pub name: String,
    pub administered_on: Option<NaiveDate>,
    pub next_due: Option<NaiveDate>,
    pub clinic: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Medication {
    pub id: String,
    pub name: String,
    pub dosage: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub time_of_day: Option<NaiveTime>,
    pub frequency: Option<Frequency>,
    pub interval: u32,
    pub notes: Option<String>,
}

/// Document metadata. Blob contents and storage keys are not part of the record.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub id: String,
    pub title: String,
    pub kind: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RoutineItem {
    pub id: String,
    pub title: String,
    pub starts_on: Option<NaiveDate>,
    pub time_of_day: Option<NaiveTime>,
    pub frequency: Option<Frequency>,
    pub interval: u32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Appointment {
    pub id: String,
    pub title: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub notes: Option<String>,
}
