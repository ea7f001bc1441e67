//! Referral lifecycle state machine.
//!
//! Governs a patient's status from creation to completion along the forward
//! path `Referred → Ambulance Assigned → Ambulance Dispatched → Patient
//! Picked Up → Transporting to Destination → Arrived at Destination →
//! Completed`. Transitions are validated for monotonic progression; the
//! terminal `Completed` state is only reachable through the handover
//! operation, which records the immutable clinical snapshot.

use crate::constants::PATIENT_ID_PREFIX;
use crate::entities::{
    Communication, HandoverForm, HandoverSnapshot, MessageKind, NewReferral, Patient,
    PatientStatus, Referral, VitalSigns,
};
use crate::error::{DispatchError, DispatchResult};
use crate::identity::RequestContext;
use crate::notify::{NotificationKind, Notifier};
use crate::seed;
use crate::store::EntityStore;
use chrono::Utc;
use hoslink_types::NonEmptyText;
use std::sync::Arc;

/// Service for referral lifecycle operations.
#[derive(Clone)]
pub struct ReferralService {
    store: EntityStore,
    notifier: Arc<dyn Notifier>,
}

impl ReferralService {
    pub fn new(store: EntityStore, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Registers a new referral.
    ///
    /// Validates that all mandatory fields are present and that the
    /// referring and receiving hospitals differ, assigns a unique patient
    /// ID, stamps facility coordinates from the directory, appends the
    /// creation audit row and notifies the receiving hospital.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Validation`] for missing or contradictory
    /// input.
    pub fn create(&self, ctx: &RequestContext, input: NewReferral) -> DispatchResult<Patient> {
        require_field(&input.name, "patient name")?;
        require_field(&input.condition, "medical condition")?;
        require_field(&input.referring_physician, "referring physician")?;
        require_field(&input.referring_hospital, "referring hospital")?;
        require_field(&input.receiving_hospital, "receiving hospital")?;
        if input.age > 120 {
            return Err(DispatchError::Validation(format!(
                "age {} is out of range (0..=120)",
                input.age
            )));
        }
        if input.referring_hospital == input.receiving_hospital {
            return Err(DispatchError::Validation(
                "referring and receiving hospitals cannot be the same".into(),
            ));
        }

        let now = Utc::now();
        let patient = Patient {
            patient_id: generate_patient_id(),
            name: input.name.trim().to_string(),
            age: input.age,
            condition: input.condition.trim().to_string(),
            referring_hospital: input.referring_hospital.clone(),
            receiving_hospital: input.receiving_hospital.clone(),
            referring_physician: input.referring_physician.trim().to_string(),
            receiving_physician: input.receiving_physician,
            notes: input.notes,
            vital_signs: None,
            medical_history: input.medical_history,
            current_medications: input.current_medications,
            allergies: input.allergies,
            referral_time: now,
            status: PatientStatus::Referred,
            assigned_ambulance: None,
            created_by: ctx.audit_label().to_string(),
            updated_at: now,
            referring_location: facility_position(&input.referring_hospital),
            receiving_location: facility_position(&input.receiving_hospital),
        };

        let patient = self.store.insert_patient(patient)?;
        self.store.append_referral(Referral {
            id: 0,
            patient_id: patient.patient_id.clone(),
            ambulance_id: None,
            status: PatientStatus::Referred,
            timestamp: now,
            created_by: ctx.audit_label().to_string(),
        });

        tracing::info!(
            patient_id = %patient.patient_id,
            from = %patient.referring_hospital,
            to = %patient.receiving_hospital,
            "referral created"
        );
        self.notifier.notify(
            &patient.receiving_hospital,
            &format!(
                "New patient referral: {} - {}",
                patient.name, patient.condition
            ),
            NotificationKind::Referral,
        );

        Ok(patient)
    }

    /// Moves a patient forward along the referral path.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotFound`] if the patient is unknown.
    /// - [`DispatchError::InvalidState`] if the move is not strictly
    ///   forward, the patient is already terminal, or the target is
    ///   `Completed` (which only the handover operation may set).
    pub fn transition(
        &self,
        _ctx: &RequestContext,
        patient_id: &str,
        target: PatientStatus,
    ) -> DispatchResult<Patient> {
        if target == PatientStatus::Completed {
            return Err(DispatchError::InvalidState(
                "'Completed' is set by the handover operation, not a status update".into(),
            ));
        }
        let patient = self.store.update_patient(patient_id, |patient| {
            if patient.status.is_terminal() {
                return Err(DispatchError::InvalidState(format!(
                    "patient {} is already '{}'",
                    patient.patient_id, patient.status
                )));
            }
            if target.rank() <= patient.status.rank() {
                return Err(DispatchError::InvalidState(format!(
                    "cannot move patient {} from '{}' back to '{}'",
                    patient.patient_id, patient.status, target
                )));
            }
            patient.status = target;
            Ok(())
        })?;
        tracing::info!(patient_id, status = %patient.status, "patient status updated");
        Ok(patient)
    }

    /// Patient-side half of dispatch: links the ambulance and moves the
    /// patient to `Ambulance Assigned`.
    ///
    /// The ambulance-side state change (and the authoritative availability
    /// check) belongs to the ambulance state machine; the dispatch
    /// coordinator composes the two and rolls this half back if the
    /// ambulance half fails.
    pub(crate) fn assign_ambulance(
        &self,
        _ctx: &RequestContext,
        patient_id: &str,
        ambulance_id: &str,
    ) -> DispatchResult<Patient> {
        if self.store.ambulance(ambulance_id).is_none() {
            return Err(DispatchError::not_found("ambulance", ambulance_id));
        }
        self.store.update_patient(patient_id, |patient| {
            if patient.status != PatientStatus::Referred {
                return Err(DispatchError::InvalidState(format!(
                    "patient {} cannot be assigned an ambulance while '{}'",
                    patient.patient_id, patient.status
                )));
            }
            patient.status = PatientStatus::AmbulanceAssigned;
            patient.assigned_ambulance = Some(ambulance_id.to_string());
            Ok(())
        })
    }

    /// Reverts a patient-side assignment; the coordinator's compensating
    /// action when the ambulance-side dispatch fails.
    pub(crate) fn revert_assignment(
        &self,
        patient_id: &str,
        previous: &Patient,
    ) -> DispatchResult<Patient> {
        self.store.update_patient(patient_id, |patient| {
            patient.status = previous.status;
            patient.assigned_ambulance = previous.assigned_ambulance.clone();
            Ok(())
        })
    }

    /// Records the formal transfer of care.
    ///
    /// Requires the patient to be `Arrived at Destination`; writes the
    /// immutable handover form and moves the patient to `Completed`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidState`] if the patient is in any other
    /// state; the patient record is left unchanged.
    pub fn complete_handover(
        &self,
        ctx: &RequestContext,
        patient_id: &str,
        snapshot: HandoverSnapshot,
    ) -> DispatchResult<HandoverForm> {
        require_field(&snapshot.receiving_physician, "receiving physician")?;

        let receiving_physician = snapshot.receiving_physician.trim().to_string();
        let vitals = snapshot.vital_signs.clone();
        let patient = self.store.update_patient(patient_id, |patient| {
            if patient.status != PatientStatus::Arrived {
                return Err(DispatchError::InvalidState(format!(
                    "handover requires status '{}', patient {} is '{}'",
                    PatientStatus::Arrived, patient.patient_id, patient.status
                )));
            }
            patient.status = PatientStatus::Completed;
            patient.receiving_physician = Some(receiving_physician.clone());
            patient.vital_signs = Some(vitals.clone());
            Ok(())
        })?;

        let form = self.store.append_handover(HandoverForm {
            id: 0,
            patient_id: patient.patient_id.clone(),
            patient_name: patient.name.clone(),
            age: patient.age,
            condition: patient.condition.clone(),
            referring_hospital: patient.referring_hospital.clone(),
            receiving_hospital: patient.receiving_hospital.clone(),
            referring_physician: patient.referring_physician.clone(),
            receiving_physician,
            transfer_time: Utc::now(),
            vital_signs: snapshot.vital_signs,
            medical_history: patient.medical_history.clone(),
            current_medications: patient.current_medications.clone(),
            allergies: patient.allergies.clone(),
            notes: snapshot.notes,
            ambulance_id: patient.assigned_ambulance.clone(),
            created_by: ctx.audit_label().to_string(),
        });

        tracing::info!(patient_id, handover_id = form.id, "handover completed");
        Ok(form)
    }

    /// Overwrites the patient's vitals snapshot and messages both
    /// facilities with the new observations.
    pub fn update_vitals(
        &self,
        ctx: &RequestContext,
        patient_id: &str,
        vitals: VitalSigns,
    ) -> DispatchResult<Patient> {
        let summary = format!(
            "Vitals updated: BP {}, HR {}bpm, SpO2 {}%",
            vitals.blood_pressure, vitals.heart_rate, vitals.oxygen_saturation
        );
        let patient = self.store.update_patient(patient_id, |patient| {
            patient.vital_signs = Some(vitals.clone());
            Ok(())
        })?;

        for hospital in [&patient.referring_hospital, &patient.receiving_hospital] {
            self.store.append_communication(Communication {
                id: 0,
                patient_id: Some(patient.patient_id.clone()),
                ambulance_id: patient.assigned_ambulance.clone(),
                sender: ctx.identity().name.clone(),
                receiver: hospital.clone(),
                message: summary.clone(),
                kind: MessageKind::VitalsUpdate,
                timestamp: Utc::now(),
            });
        }
        Ok(patient)
    }
}

/// Generates a patient identifier: `PAT` plus eight uppercase hex chars.
fn generate_patient_id() -> String {
    let token: [u8; 4] = rand::random();
    format!("{}{}", PATIENT_ID_PREFIX, hex::encode_upper(token))
}

fn facility_position(name: &str) -> Option<hoslink_types::GeoPoint> {
    seed::find_facility(name).and_then(|f| f.position().ok())
}

fn require_field(value: &str, label: &str) -> DispatchResult<()> {
    NonEmptyText::new(value)
        .map(|_| ())
        .map_err(|_| DispatchError::Validation(format!("{label} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use std::sync::Mutex;

    /// Notifier that records every call for assertions.
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String, NotificationKind)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, recipient: &str, message: &str, kind: NotificationKind) -> bool {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), message.to_string(), kind));
            true
        }
    }

    fn service() -> (ReferralService, EntityStore) {
        let store = EntityStore::new();
        let service = ReferralService::new(store.clone(), Arc::new(LogNotifier));
        (service, store)
    }

    fn ctx() -> RequestContext {
        RequestContext::system()
    }

    fn jootrh_to_kisumu() -> NewReferral {
        NewReferral {
            name: "Akinyi Odhiambo".to_string(),
            age: 34,
            condition: "Eclampsia".to_string(),
            referring_hospital:
                "Jaramogi Oginga Odinga Teaching & Referral Hospital (JOOTRH)".to_string(),
            receiving_hospital: "Kisumu County Referral Hospital".to_string(),
            referring_physician: "Dr. Owuor".to_string(),
            ..Default::default()
        }
    }

    fn sample_vitals() -> VitalSigns {
        VitalSigns {
            blood_pressure: "120/80".to_string(),
            heart_rate: 72,
            oxygen_saturation: 98,
            temperature_celsius: Some(36.6),
            respiratory_rate: None,
            notes: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn create_assigns_id_and_initial_status() {
        let (service, store) = service();
        let patient = service.create(&ctx(), jootrh_to_kisumu()).unwrap();

        assert!(patient.patient_id.starts_with("PAT"));
        assert_eq!(patient.patient_id.len(), 11);
        assert_eq!(patient.status, PatientStatus::Referred);
        assert!(patient.referring_location.is_some());
        assert!(patient.receiving_location.is_some());
        assert_eq!(store.referrals().len(), 1);
        assert_ne!(patient.referring_hospital, patient.receiving_hospital);
    }

    #[test]
    fn create_rejects_same_hospital() {
        let (service, store) = service();
        let mut input = jootrh_to_kisumu();
        input.receiving_hospital = input.referring_hospital.clone();
        let result = service.create(&ctx(), input);
        assert!(matches!(result, Err(DispatchError::Validation(_))));
        assert!(store.patients().is_empty());
    }

    #[test]
    fn create_rejects_missing_mandatory_fields() {
        let (service, _) = service();
        let mut input = jootrh_to_kisumu();
        input.name = "   ".to_string();
        assert!(matches!(
            service.create(&ctx(), input),
            Err(DispatchError::Validation(_))
        ));

        let mut input = jootrh_to_kisumu();
        input.condition = String::new();
        assert!(matches!(
            service.create(&ctx(), input),
            Err(DispatchError::Validation(_))
        ));

        let mut input = jootrh_to_kisumu();
        input.age = 130;
        assert!(matches!(
            service.create(&ctx(), input),
            Err(DispatchError::Validation(_))
        ));
    }

    #[test]
    fn create_notifies_receiving_hospital() {
        let store = EntityStore::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let service = ReferralService::new(store, notifier.clone());
        service.create(&ctx(), jootrh_to_kisumu()).unwrap();

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "Kisumu County Referral Hospital");
        assert_eq!(sent[0].2, NotificationKind::Referral);
        assert!(sent[0].1.contains("Akinyi Odhiambo"));
    }

    #[test]
    fn transition_moves_forward_only() {
        let (service, _) = service();
        let patient = service.create(&ctx(), jootrh_to_kisumu()).unwrap();
        let id = patient.patient_id.clone();

        let updated = service
            .transition(&ctx(), &id, PatientStatus::PatientPickedUp)
            .unwrap();
        assert_eq!(updated.status, PatientStatus::PatientPickedUp);

        // Backwards and same-state moves are rejected.
        let result = service.transition(&ctx(), &id, PatientStatus::Referred);
        assert!(matches!(result, Err(DispatchError::InvalidState(_))));
        let result = service.transition(&ctx(), &id, PatientStatus::PatientPickedUp);
        assert!(matches!(result, Err(DispatchError::InvalidState(_))));
    }

    #[test]
    fn transition_unknown_patient_is_not_found() {
        let (service, _) = service();
        let result = service.transition(&ctx(), "PAT00000000", PatientStatus::Arrived);
        assert!(matches!(result, Err(DispatchError::NotFound { .. })));
    }

    #[test]
    fn transition_cannot_reach_completed() {
        let (service, _) = service();
        let patient = service.create(&ctx(), jootrh_to_kisumu()).unwrap();
        let result = service.transition(&ctx(), &patient.patient_id, PatientStatus::Completed);
        assert!(matches!(result, Err(DispatchError::InvalidState(_))));
    }

    #[test]
    fn handover_requires_arrived_and_leaves_record_unchanged_on_failure() {
        let (service, store) = service();
        let patient = service.create(&ctx(), jootrh_to_kisumu()).unwrap();
        let id = patient.patient_id.clone();
        let before = store.patient(&id).unwrap();

        let snapshot = HandoverSnapshot {
            vital_signs: sample_vitals(),
            receiving_physician: "Dr. Atieno".to_string(),
            notes: None,
        };
        let result = service.complete_handover(&ctx(), &id, snapshot);
        assert!(matches!(result, Err(DispatchError::InvalidState(_))));
        assert_eq!(store.patient(&id).unwrap(), before);
        assert!(store.handover_forms().is_empty());
    }

    #[test]
    fn handover_from_arrived_completes_patient() {
        let (service, store) = service();
        let patient = service.create(&ctx(), jootrh_to_kisumu()).unwrap();
        let id = patient.patient_id.clone();
        service
            .transition(&ctx(), &id, PatientStatus::Arrived)
            .unwrap();

        let form = service
            .complete_handover(
                &ctx(),
                &id,
                HandoverSnapshot {
                    vital_signs: sample_vitals(),
                    receiving_physician: "Dr. Atieno".to_string(),
                    notes: Some("Stable on arrival".to_string()),
                },
            )
            .unwrap();

        assert_eq!(form.patient_id, id);
        assert_eq!(form.receiving_physician, "Dr. Atieno");
        let patient = store.patient(&id).unwrap();
        assert_eq!(patient.status, PatientStatus::Completed);
        assert_eq!(store.handover_forms().len(), 1);
        assert_eq!(store.handover_form(form.id).unwrap().patient_name, form.patient_name);

        // A completed patient accepts no further transitions.
        let result = service.transition(&ctx(), &id, PatientStatus::Arrived);
        assert!(matches!(result, Err(DispatchError::InvalidState(_))));
    }

    #[test]
    fn update_vitals_messages_both_hospitals() {
        let (service, store) = service();
        let patient = service.create(&ctx(), jootrh_to_kisumu()).unwrap();
        let id = patient.patient_id.clone();

        let updated = service.update_vitals(&ctx(), &id, sample_vitals()).unwrap();
        assert!(updated.vital_signs.is_some());

        let messages = store.communications_for_patient(&id);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.kind == MessageKind::VitalsUpdate));
        let receivers: Vec<&str> = messages.iter().map(|m| m.receiver.as_str()).collect();
        assert!(receivers.contains(&"Kisumu County Referral Hospital"));
    }

    #[test]
    fn generated_ids_are_distinct() {
        let first = generate_patient_id();
        let second = generate_patient_id();
        assert!(first.starts_with("PAT"));
        // Two draws of 32 random bits colliding in a unit test would point
        // at a broken RNG seed.
        assert_ne!(first, second);
    }
}
