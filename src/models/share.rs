use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::models::Frequency;

/// Field categories a share may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeCategory {
    Profile,
    Contacts,
    Vaccinations,
    Medications,
    Documents,
    Routine,
    Appointments,
}

impl ScopeCategory {
    pub const ALL: [ScopeCategory; 7] = [
        ScopeCategory::Profile,
        ScopeCategory::Contacts,
        ScopeCategory::Vaccinations,
        ScopeCategory::Medications,
        ScopeCategory::Documents,
        ScopeCategory::Routine,
        ScopeCategory::Appointments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeCategory::Profile => "profile",
            ScopeCategory::Contacts => "contacts",
            ScopeCategory::Vaccinations => "vaccinations",
            ScopeCategory::Medications => "medications",
            ScopeCategory::Documents => "documents",
            ScopeCategory::Routine => "routine",
            ScopeCategory::Appointments => "appointments",
        }
    }

    /// Unknown names map to `None` so they can never widen a scope
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "profile" => Some(ScopeCategory::Profile),
            "contacts" => Some(ScopeCategory::Contacts),
            "vaccinations" => Some(ScopeCategory::Vaccinations),
            "medications" => Some(ScopeCategory::Medications),
            "documents" => Some(ScopeCategory::Documents),
            "routine" => Some(ScopeCategory::Routine),
            "appointments" => Some(ScopeCategory::Appointments),
            _ => None,
        }
    }
}

/// Parse a persisted comma-separated scope, dropping names outside the vocabulary
pub fn parse_scope(raw: &str) -> BTreeSet<ScopeCategory> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|name| {
            let category = ScopeCategory::from_str(name);
            if category.is_none() {
                tracing::warn!("Ignoring unknown scope category '{}'", name);
            }
            category
        })
        .collect()
}

pub fn format_scope(scope: &BTreeSet<ScopeCategory>) -> String {
    scope
        .iter()
        .map(ScopeCategory::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Share configuration resolved alongside a share token
#[derive(Clone)]
pub struct ShareConfig {
    pub scope: BTreeSet<ScopeCategory>,
    pub pin: Option<String>,
    pub is_active: bool,
}

impl ShareConfig {
    pub fn has_pin(&self) -> bool {
        self.pin.as_deref().is_some_and(|p| !p.is_empty())
    }
}

// The PIN must never reach a log line.
impl fmt::Debug for ShareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareConfig")
            .field("scope", &self.scope)
            .field("pin", &self.pin.as_ref().map(|_| "<redacted>"))
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Request to unlock a PIN-protected share
#[derive(Debug, Deserialize)]
pub struct VerifyPinRequest {
    pub pin: String,
}

/// What a share token holder is allowed to see
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProjectedView {
    PinRequired {
        pet_name: String,
    },
    FullView {
        pet_name: String,
        sections: Vec<ScopedSection>,
    },
}

impl ProjectedView {
    pub fn pet_name(&self) -> &str {
        match self {
            ProjectedView::PinRequired { pet_name } | ProjectedView::FullView { pet_name, .. } => {
                pet_name
            }
        }
    }

    /// Categories present in the view, empty before the gate opens
    pub fn categories(&self) -> BTreeSet<ScopeCategory> {
        match self {
            ProjectedView::PinRequired { .. } => BTreeSet::new(),
            ProjectedView::FullView { sections, .. } => {
                sections.iter().map(ScopedSection::category).collect()
            }
        }
    }
}

/// One granted category of a full view
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", content = "data", rename_all = "lowercase")]
pub enum ScopedSection {
    Profile(PublicProfile),
    Contacts(Vec<PublicContact>),
    Vaccinations(Vec<PublicVaccination>),
    Medications(Vec<PublicMedication>),
    Documents(Vec<PublicDocument>),
    Routine(Vec<PublicRoutineItem>),
    Appointments(Vec<PublicAppointment>),
}

impl ScopedSection {
    pub fn category(&self) -> ScopeCategory {
        match self {
            ScopedSection::Profile(_) => ScopeCategory::Profile,
            ScopedSection::Contacts(_) => ScopeCategory::Contacts,
            ScopedSection::Vaccinations(_) => ScopeCategory::Vaccinations,
            ScopedSection::Medications(_) => ScopeCategory::Medications,
            ScopedSection::Documents(_) => ScopeCategory::Documents,
            ScopedSection::Routine(_) => ScopeCategory::Routine,
            ScopedSection::Appointments(_) => ScopeCategory::Appointments,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub microchip_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicContact {
    pub role: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicVaccination {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub administered_on: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinic: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicMedication {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    pub interval: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicDocument {
    pub title: String,
    pub kind: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicRoutineItem {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_on: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    pub interval: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicAppointment {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope_drops_unknown_names() {
        let scope = parse_scope("contacts, Vaccinations,insurance,,owner_email");
        assert_eq!(
            scope,
            BTreeSet::from([ScopeCategory::Contacts, ScopeCategory::Vaccinations])
        );
        assert_eq!(format_scope(&scope), "contacts,vaccinations");
    }

    #[test]
    fn test_scope_vocabulary_round_trips() {
        for category in ScopeCategory::ALL {
            assert_eq!(ScopeCategory::from_str(category.as_str()), Some(category));
        }
    }

    #[test]
    fn test_debug_redacts_pin() {
        let config = ShareConfig {
            scope: BTreeSet::new(),
            pin: Some("8675".to_string()),
            is_active: true,
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("8675"));
        assert!(debug.contains("<redacted>"));
    }
}
