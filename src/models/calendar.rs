use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    ProjectedView, PublicAppointment, PublicMedication, PublicRoutineItem, PublicVaccination,
    ScopedSection,
};

/// Repeat frequency for medications and routine items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "monthly" => Some(Frequency::Monthly),
            "yearly" => Some(Frequency::Yearly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurrence {
    pub frequency: Frequency,
    pub interval: u32,
    /// Last day on which an occurrence may start
    pub until: Option<NaiveDate>,
}

/// A calendar time value in one of the three iCalendar forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    Utc(DateTime<Utc>),
    /// Local wall-clock time with no zone
    Floating(NaiveDateTime),
    AllDay(NaiveDate),
}

impl EventTime {
    /// Comparable value used to reject ends that precede starts
    fn sort_key(&self) -> NaiveDateTime {
        match self {
            EventTime::Utc(dt) => dt.naive_utc(),
            EventTime::Floating(dt) => *dt,
            EventTime::AllDay(d) => d.and_time(chrono::NaiveTime::MIN),
        }
    }

    pub fn is_before_or_at(&self, other: &EventTime) -> bool {
        self.sort_key() <= other.sort_key()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventEnd {
    At(EventTime),
    Duration(Duration),
}

/// Feed-facing event. `start` is optional so incomplete upstream rows are representable;
/// the encoder skips them.
#[derive(Debug, Clone)]
pub struct CalendarEvent {
    /// Internal identifier the UID is derived from
    pub source_id: String,
    pub summary: String,
    pub start: Option<EventTime>,
    pub end: Option<EventEnd>,
    pub recurrence: Option<Recurrence>,
    pub description: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeedMeta {
    pub calendar_name: String,
    pub base_url: String,
}

/// Everything a feed token resolves to
#[derive(Debug, Clone)]
pub struct FeedData {
    pub pet_name: String,
    pub calendar_name: String,
    pub events: Vec<CalendarEvent>,
}

const DEFAULT_APPOINTMENT_LENGTH_MINUTES: i64 = 30;

fn recurrence(frequency: Option<Frequency>, interval: u32, until: Option<NaiveDate>) -> Option<Recurrence> {
    frequency.map(|frequency| Recurrence {
        frequency,
        interval: interval.max(1),
        until,
    })
}

impl PublicAppointment {
    pub fn to_calendar_event(&self, pet_name: &str) -> CalendarEvent {
        let end = match self.ends_at {
            Some(ends_at) => Some(EventEnd::At(EventTime::Utc(ends_at))),
            None => Some(EventEnd::Duration(Duration::minutes(
                DEFAULT_APPOINTMENT_LENGTH_MINUTES,
            ))),
        };
        CalendarEvent {
            source_id: format!("appt-{}", self.id),
            summary: format!("{}: {}", pet_name, self.title),
            start: self.starts_at.map(EventTime::Utc),
            end,
            recurrence: None,
            description: None,
            location: self.location.clone(),
        }
    }
}

impl PublicMedication {
    pub fn to_calendar_event(&self, pet_name: &str) -> CalendarEvent {
        let summary = match &self.dosage {
            Some(dosage) if !dosage.trim().is_empty() => {
                format!("{}: {} ({})", pet_name, self.name, dosage)
            }
            _ => format!("{}: {}", pet_name, self.name),
        };
        let start = self.start_date.map(|date| match self.time_of_day {
            Some(time) => EventTime::Floating(date.and_time(time)),
            None => EventTime::AllDay(date),
        });
        CalendarEvent {
            source_id: format!("med-{}", self.id),
            summary,
            start,
            end: None,
            recurrence: recurrence(self.frequency, self.interval, self.end_date),
            description: self.notes.clone(),
            location: None,
        }
    }
}

impl PublicRoutineItem {
    pub fn to_calendar_event(&self, pet_name: &str) -> CalendarEvent {
        let start = self.starts_on.map(|date| match self.time_of_day {
            Some(time) => EventTime::Floating(date.and_time(time)),
            None => EventTime::AllDay(date),
        });
        CalendarEvent {
            source_id: format!("routine-{}", self.id),
            summary: format!("{}: {}", pet_name, self.title),
            start,
            end: None,
            recurrence: recurrence(self.frequency, self.interval, None),
            description: self.notes.clone(),
            location: None,
        }
    }
}

impl PublicVaccination {
    /// Reminder for the next dose, if one is scheduled
    pub fn to_due_event(&self, pet_name: &str) -> Option<CalendarEvent> {
        let due = self.next_due?;
        Some(CalendarEvent {
            source_id: format!("vax-{}-due", self.id),
            summary: format!("{}: {} vaccination due", pet_name, self.name),
            start: Some(EventTime::AllDay(due)),
            end: None,
            recurrence: None,
            description: self.clinic.as_ref().map(|clinic| format!("Clinic: {}", clinic)),
            location: self.clinic.clone(),
        })
    }
}

/// Care events published on a pet's calendar feed.
///
/// Takes a projected view so only fields some public type allows can reach the feed.
/// A view still behind its PIN yields nothing.
pub fn care_events(view: &ProjectedView) -> Vec<CalendarEvent> {
    let (name, sections) = match view {
        ProjectedView::PinRequired { .. } => return Vec::new(),
        ProjectedView::FullView { pet_name, sections } => (pet_name.as_str(), sections),
    };

    let mut events = Vec::new();
    for section in sections {
        match section {
            ScopedSection::Appointments(items) => {
                events.extend(items.iter().map(|a| a.to_calendar_event(name)))
            }
            ScopedSection::Medications(items) => {
                events.extend(items.iter().map(|m| m.to_calendar_event(name)))
            }
            ScopedSection::Routine(items) => {
                events.extend(items.iter().map(|r| r.to_calendar_event(name)))
            }
            ScopedSection::Vaccinations(items) => {
                events.extend(items.iter().filter_map(|v| v.to_due_event(name)))
            }
            ScopedSection::Profile(_) | ScopedSection::Contacts(_) | ScopedSection::Documents(_) => {}
        }
    }
    events
}
