use crate::models::{
    PetRecord, ProjectedView, PublicAppointment, PublicContact, PublicDocument, PublicMedication,
    PublicProfile, PublicRoutineItem, PublicVaccination, ScopeCategory, ScopedSection, ShareConfig,
};
use crate::services::GateResult;

/// Categories a calendar feed publishes
pub const CALENDAR_SCOPE: [ScopeCategory; 4] = [
    ScopeCategory::Vaccinations,
    ScopeCategory::Medications,
    ScopeCategory::Routine,
    ScopeCategory::Appointments,
];

/// Builds the public view of a pet record from a share's scope
pub struct RecordProjector;

impl RecordProjector {
    /// Public view backing a calendar feed. Feed tokens carry no PIN.
    pub fn project_calendar(record: PetRecord) -> ProjectedView {
        let config = ShareConfig {
            scope: CALENDAR_SCOPE.into_iter().collect(),
            pin: None,
            is_active: true,
        };
        Self::project(record, &config, GateResult::Granted)
    }

    pub fn project(record: PetRecord, config: &ShareConfig, gate: GateResult) -> ProjectedView {
        if !gate.is_granted() {
            // Only the name leaves this function; the rest of the record is dropped here.
            return ProjectedView::PinRequired {
                pet_name: record.name,
            };
        }

        // Sections are produced from the allow-list, never from the record's fields.
        let sections = config
            .scope
            .iter()
            .map(|category| Self::section(&record, *category))
            .collect();

        ProjectedView::FullView {
            pet_name: record.name,
            sections,
        }
    }

    fn section(record: &PetRecord, category: ScopeCategory) -> ScopedSection {
        match category {
            ScopeCategory::Profile => ScopedSection::Profile(PublicProfile {
                species: record.profile.species.clone(),
                breed: record.profile.breed.clone(),
                birth_date: record.profile.birth_date,
                microchip_id: record.profile.microchip_id.clone(),
            }),
            ScopeCategory::Contacts => ScopedSection::Contacts(
                record
                    .contacts
                    .iter()
                    .map(|c| PublicContact {
                        role: c.role.clone(),
                        name: c.name.clone(),
                        phone: c.phone.clone(),
                        email: c.email.clone(),
                        address: c.address.clone(),
                    })
                    .collect(),
            ),
            ScopeCategory::Vaccinations => ScopedSection::Vaccinations(
                record
                    .vaccinations
                    .iter()
                    .map(|v| PublicVaccination {
                        id: v.id.clone(),
                        name: v.name.clone(),
                        administered_on: v.administered_on,
                        next_due: v.next_due,
                        clinic: v.clinic.clone(),
                    })
                    .collect(),
            ),
            ScopeCategory::Medications => ScopedSection::Medications(
                record
                    .medications
                    .iter()
                    .map(|m| PublicMedication {
                        id: m.id.clone(),
                        name: m.name.clone(),
                        dosage: m.dosage.clone(),
                        start_date: m.start_date,
                        end_date: m.end_date,
                        time_of_day: m.time_of_day,
                        frequency: m.frequency,
                        interval: m.interval,
                        notes: m.notes.clone(),
                    })
                    .collect(),
            ),
            ScopeCategory::Documents => ScopedSection::Documents(
                record
                    .documents
                    .iter()
                    .map(|d| PublicDocument {
                        title: d.title.clone(),
                        kind: d.kind.clone(),
                        uploaded_at: d.uploaded_at,
                    })
                    .collect(),
            ),
            ScopeCategory::Routine => ScopedSection::Routine(
                record
                    .routine
                    .iter()
                    .map(|r| PublicRoutineItem {
                        id: r.id.clone(),
                        title: r.title.clone(),
                        starts_on: r.starts_on,
                        time_of_day: r.time_of_day,
                        frequency: r.frequency,
                        interval: r.interval,
                        notes: r.notes.clone(),
                    })
                    .collect(),
            ),
            ScopeCategory::Appointments => ScopedSection::Appointments(
                record
                    .appointments
                    .iter()
                    .map(|a| PublicAppointment {
                        id: a.id.clone(),
                        title: a.title.clone(),
                        starts_at: a.starts_at,
                        ends_at: a.ends_at,
                        location: a.location.clone(),
                    })
                    .collect(),
            ),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::sentinel_record;
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn config(scope: BTreeSet<ScopeCategory>, pin: Option<&str>) -> ShareConfig {
        ShareConfig {
            scope,
            pin: pin.map(str::to_string),
            is_active: true,
        }
    }

    proptest! {
        #[test]
        fn prop_full_view_contains_exactly_the_scope(mask in 0u8..128) {
            let scope: BTreeSet<ScopeCategory> = ScopeCategory::ALL
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, c)| *c)
                .collect();
            let view = RecordProjector::project(
                sentinel_record("Fluffy"),
                &config(scope.clone(), None),
                GateResult::Granted,
            );
            prop_assert_eq!(view.categories(), scope.clone());

            let json = serde_json::to_value(&view).unwrap();
            let sections = json["sections"].as_array().unwrap();
            let names: BTreeSet<String> = sections
                .iter()
                .map(|s| s["category"].as_str().unwrap().to_string())
                .collect();
            let expected: BTreeSet<String> = scope.iter().map(|c| c.as_str().to_string()).collect();
            prop_assert_eq!(names, expected);
        }
    }

    #[test]
    fn test_pre_pin_view_leaks_only_the_name() {
        for gate in [GateResult::PinRequired, GateResult::PinIncorrect] {
            let cfg = config(ScopeCategory::ALL.into_iter().collect(), Some("1234"));
            let view = RecordProjector::project(sentinel_record("Fluffy"), &cfg, gate);

            match &view {
                ProjectedView::PinRequired { pet_name } => assert_eq!(pet_name, "Fluffy"),
                other => panic!("expected PinRequired, got {:?}", other),
            }
            let json = serde_json::to_string(&view).unwrap();
            assert!(!json.contains("SENTINEL"), "leaked: {}", json);
            assert!(!json.contains("pet-1"));
        }
    }

    #[test]
    fn test_owner_private_fields_never_appear() {
        let cfg = config(ScopeCategory::ALL.into_iter().collect(), None);
        let view = RecordProjector::project(sentinel_record("Fluffy"), &cfg, GateResult::Granted);
        let json = serde_json::to_string(&view).unwrap();

        for private in ["SENTINEL_OWNER_EMAIL", "SENTINEL_INTERNAL_NOTES", "SENTINEL_INSURANCE"] {
            assert!(!json.contains(private), "leaked {}", private);
        }
        assert!(json.contains("SENTINEL_VACCINE"));
    }

    #[test]
    fn test_calendar_projection_uses_calendar_scope() {
        let view = RecordProjector::project_calendar(sentinel_record("Fluffy"));
        assert_eq!(view.pet_name(), "Fluffy");
        assert_eq!(
            view.categories(),
            CALENDAR_SCOPE.into_iter().collect::<BTreeSet<_>>()
        );

        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("SENTINEL_APPT_NOTES"));
        assert!(!json.contains("SENTINEL_OWNER_EMAIL"));
    }

    #[test]
    fn test_out_of_scope_sentinels_absent() {
        let scope = BTreeSet::from([ScopeCategory::Contacts, ScopeCategory::Vaccinations]);
        let view = RecordProjector::project(
            sentinel_record("Fluffy"),
            &config(scope, None),
            GateResult::Granted,
        );
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("SENTINEL_PHONE"));
        assert!(json.contains("SENTINEL_CLINIC"));
        for absent in [
            "SENTINEL_SPECIES",
            "SENTINEL_MEDICATION",
            "SENTINEL_DOCUMENT",
            "SENTINEL_ROUTINE",
            "SENTINEL_APPOINTMENT",
        ] {
            assert!(!json.contains(absent), "leaked {}", absent);
        }
        // Absent categories are not serialized as nulls either.
        assert!(!json.contains("null"));
    }
}
