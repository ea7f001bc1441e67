//! Ambulance state machine and fleet management.
//!
//! A vehicle cycles between `Available` and `On Transfer`, with `On Break`
//! and `Maintenance` as administrative side states. The store-level
//! invariant `current_patient is set ⇔ status is On Transfer` holds after
//! every operation here; dispatch and release change both fields in a
//! single locked update.

use crate::config::CoreConfig;
use crate::entities::{Ambulance, AmbulanceStatus, LocationUpdate, OffDutyStatus};
use crate::error::{DispatchError, DispatchResult};
use crate::seed;
use crate::store::EntityStore;
use chrono::{Duration, Utc};
use hoslink_types::GeoPoint;
use std::sync::Arc;

/// Service for fleet vehicle operations.
#[derive(Clone)]
pub struct AmbulanceService {
    store: EntityStore,
    cfg: Arc<CoreConfig>,
}

impl AmbulanceService {
    pub fn new(store: EntityStore, cfg: Arc<CoreConfig>) -> Self {
        Self { store, cfg }
    }

    /// Seeds the fleet when the table is empty. Returns the number of
    /// vehicles inserted (zero when the fleet already exists).
    pub fn seed_fleet(&self) -> DispatchResult<usize> {
        if self.store.ambulance_count() > 0 {
            return Ok(0);
        }
        let fleet = seed::fleet()?;
        let count = fleet.len();
        for vehicle in fleet {
            self.store.insert_ambulance(vehicle)?;
        }
        tracing::info!(count, "fleet seeded");
        Ok(count)
    }

    /// Binds an available vehicle to a patient transfer.
    ///
    /// The availability check and the state change happen under the same
    /// write lock, so two concurrent dispatches of one vehicle cannot both
    /// succeed.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotFound`] for an unknown vehicle.
    /// - [`DispatchError::AmbulanceUnavailable`] when the vehicle is in
    ///   any state other than `Available`.
    pub fn dispatch(
        &self,
        ambulance_id: &str,
        patient_id: &str,
        destination: &str,
    ) -> DispatchResult<Ambulance> {
        let eta = Utc::now() + Duration::minutes(self.cfg.eta_minutes());
        let ambulance = self.store.update_ambulance(ambulance_id, |ambulance| {
            if ambulance.status != AmbulanceStatus::Available {
                return Err(DispatchError::AmbulanceUnavailable {
                    ambulance_id: ambulance.ambulance_id.clone(),
                    status: ambulance.status,
                });
            }
            ambulance.status = AmbulanceStatus::OnTransfer;
            ambulance.current_patient = Some(patient_id.to_string());
            ambulance.destination = Some(destination.to_string());
            ambulance.estimated_arrival = Some(eta);
            Ok(())
        })?;
        tracing::info!(ambulance_id, patient_id, destination, "ambulance dispatched");
        Ok(ambulance)
    }

    /// Records a position sample and moves the vehicle's current position.
    ///
    /// No status restriction: vehicles report positions while `Available`
    /// too (repositioning between stations).
    pub fn update_location(
        &self,
        ambulance_id: &str,
        position: GeoPoint,
        location_name: &str,
        patient_id: Option<&str>,
    ) -> DispatchResult<LocationUpdate> {
        let now = Utc::now();
        self.store.update_ambulance(ambulance_id, |ambulance| {
            ambulance.position = position;
            ambulance.current_location = location_name.to_string();
            ambulance.last_location_update = now;
            Ok(())
        })?;
        Ok(self.store.append_location_update(LocationUpdate {
            id: 0,
            ambulance_id: ambulance_id.to_string(),
            position,
            location_name: location_name.to_string(),
            patient_id: patient_id.map(str::to_string),
            timestamp: now,
        }))
    }

    /// Returns a vehicle to `Available`, clearing its mission fields.
    /// Used on mission completion, cancellation, and the driver's
    /// mark-available action.
    pub fn release(&self, ambulance_id: &str) -> DispatchResult<Ambulance> {
        let ambulance = self.store.update_ambulance(ambulance_id, |ambulance| {
            ambulance.status = AmbulanceStatus::Available;
            ambulance.current_patient = None;
            ambulance.destination = None;
            ambulance.estimated_arrival = None;
            Ok(())
        })?;
        tracing::info!(ambulance_id, "ambulance released");
        Ok(ambulance)
    }

    /// Releases the vehicle only if it still carries the given patient.
    ///
    /// Compare-and-release under the table write lock: the double-release
    /// guard for a simulated mission finishing after the transfer was
    /// already completed (or the vehicle re-dispatched) by other means.
    /// Returns whether the release happened.
    pub fn release_if_carrying(
        &self,
        ambulance_id: &str,
        patient_id: &str,
    ) -> DispatchResult<bool> {
        let mut released = false;
        self.store.update_ambulance(ambulance_id, |ambulance| {
            if ambulance.current_patient.as_deref() == Some(patient_id) {
                ambulance.status = AmbulanceStatus::Available;
                ambulance.current_patient = None;
                ambulance.destination = None;
                ambulance.estimated_arrival = None;
                released = true;
            }
            Ok(())
        })?;
        Ok(released)
    }

    /// Administrative override into a side state. Unconditional: an active
    /// mission's patient link is cleared (callers are expected to re-assign
    /// the transfer).
    pub fn set_off_duty(
        &self,
        ambulance_id: &str,
        status: OffDutyStatus,
    ) -> DispatchResult<Ambulance> {
        let ambulance = self.store.update_ambulance(ambulance_id, |ambulance| {
            ambulance.status = AmbulanceStatus::from(status);
            ambulance.current_patient = None;
            ambulance.destination = None;
            ambulance.estimated_arrival = None;
            Ok(())
        })?;
        tracing::info!(ambulance_id, status = %ambulance.status, "ambulance taken off duty");
        Ok(ambulance)
    }

    /// Vehicles currently available for dispatch.
    pub fn available(&self) -> Vec<Ambulance> {
        self.store
            .ambulances()
            .into_iter()
            .filter(|a| a.status == AmbulanceStatus::Available)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (AmbulanceService, EntityStore) {
        let store = EntityStore::new();
        let cfg = Arc::new(CoreConfig::default());
        let service = AmbulanceService::new(store.clone(), cfg);
        service.seed_fleet().unwrap();
        (service, store)
    }

    fn invariant_holds(store: &EntityStore) -> bool {
        store.ambulances().iter().all(|a| {
            a.current_patient.is_some() == (a.status == AmbulanceStatus::OnTransfer)
        })
    }

    #[test]
    fn seeding_is_idempotent() {
        let (service, store) = service();
        assert_eq!(store.ambulance_count(), 20);
        assert_eq!(service.seed_fleet().unwrap(), 0);
        assert_eq!(store.ambulance_count(), 20);
        assert!(invariant_holds(&store));
    }

    #[test]
    fn dispatch_binds_patient_and_sets_eta() {
        let (service, store) = service();
        let ambulance = service
            .dispatch("KBA 453D", "PAT0001", "Kisumu County Referral Hospital")
            .unwrap();
        assert_eq!(ambulance.status, AmbulanceStatus::OnTransfer);
        assert_eq!(ambulance.current_patient.as_deref(), Some("PAT0001"));
        assert_eq!(
            ambulance.destination.as_deref(),
            Some("Kisumu County Referral Hospital")
        );
        assert!(ambulance.estimated_arrival.is_some());
        assert!(invariant_holds(&store));
        assert_eq!(service.available().len(), 19);
    }

    #[test]
    fn double_dispatch_without_release_is_unavailable() {
        let (service, _) = service();
        service
            .dispatch("KBA 453D", "PAT0001", "Kisumu County Referral Hospital")
            .unwrap();
        let result = service.dispatch("KBA 453D", "PAT0002", "Ahero Sub-County Hospital");
        match result {
            Err(DispatchError::AmbulanceUnavailable {
                ambulance_id,
                status,
            }) => {
                assert_eq!(ambulance_id, "KBA 453D");
                assert_eq!(status, AmbulanceStatus::OnTransfer);
            }
            other => panic!("expected AmbulanceUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn dispatch_unknown_vehicle_is_not_found() {
        let (service, _) = service();
        let result = service.dispatch("KZZ 000A", "PAT0001", "Anywhere");
        assert!(matches!(result, Err(DispatchError::NotFound { .. })));
    }

    #[test]
    fn release_returns_vehicle_to_available() {
        let (service, store) = service();
        service
            .dispatch("KBA 453D", "PAT0001", "Kisumu County Referral Hospital")
            .unwrap();
        let ambulance = service.release("KBA 453D").unwrap();
        assert_eq!(ambulance.status, AmbulanceStatus::Available);
        assert!(ambulance.current_patient.is_none());
        assert!(ambulance.destination.is_none());
        assert!(ambulance.estimated_arrival.is_none());
        assert!(invariant_holds(&store));
    }

    #[test]
    fn release_if_carrying_guards_against_stale_missions() {
        let (service, _) = service();
        service
            .dispatch("KBA 453D", "PAT0001", "Kisumu County Referral Hospital")
            .unwrap();

        // Wrong patient: no release.
        assert!(!service.release_if_carrying("KBA 453D", "PAT0002").unwrap());
        // Right patient: released.
        assert!(service.release_if_carrying("KBA 453D", "PAT0001").unwrap());
        // Second attempt is a no-op.
        assert!(!service.release_if_carrying("KBA 453D", "PAT0001").unwrap());
    }

    #[test]
    fn update_location_moves_vehicle_and_appends_sample() {
        let (service, store) = service();
        let position = GeoPoint::new(-0.1200, 34.8500).unwrap();
        let update = service
            .update_location("KBA 453D", position, "En route - step 3/20", Some("PAT0001"))
            .unwrap();
        assert_eq!(update.position, position);
        assert_eq!(update.patient_id.as_deref(), Some("PAT0001"));

        let ambulance = store.ambulance("KBA 453D").unwrap();
        assert_eq!(ambulance.position, position);
        assert_eq!(ambulance.current_location, "En route - step 3/20");
        assert_eq!(store.latest_location("KBA 453D").unwrap().id, update.id);
    }

    #[test]
    fn location_updates_are_allowed_while_available() {
        let (service, store) = service();
        let ambulance = store.ambulance("KBA 453D").unwrap();
        assert_eq!(ambulance.status, AmbulanceStatus::Available);
        let position = GeoPoint::new(-0.0916, 34.7680).unwrap();
        assert!(service
            .update_location("KBA 453D", position, "Repositioning", None)
            .is_ok());
    }

    #[test]
    fn update_location_unknown_vehicle_is_not_found() {
        let (service, _) = service();
        let position = GeoPoint::new(-0.1, 34.8).unwrap();
        let result = service.update_location("KZZ 000A", position, "Nowhere", None);
        assert!(matches!(result, Err(DispatchError::NotFound { .. })));
    }

    #[test]
    fn off_duty_override_clears_mission_fields() {
        let (service, store) = service();
        service
            .dispatch("KBA 453D", "PAT0001", "Kisumu County Referral Hospital")
            .unwrap();
        let ambulance = service
            .set_off_duty("KBA 453D", OffDutyStatus::Maintenance)
            .unwrap();
        assert_eq!(ambulance.status, AmbulanceStatus::Maintenance);
        assert!(ambulance.current_patient.is_none());
        assert!(invariant_holds(&store));

        // Off-duty vehicles cannot be dispatched.
        let result = service.dispatch("KBA 453D", "PAT0002", "Ahero Sub-County Hospital");
        assert!(matches!(
            result,
            Err(DispatchError::AmbulanceUnavailable { .. })
        ));
    }

    #[test]
    fn break_and_available_cycle() {
        let (service, _) = service();
        service
            .set_off_duty("KBA 453D", OffDutyStatus::OnBreak)
            .unwrap();
        let ambulance = service.release("KBA 453D").unwrap();
        assert_eq!(ambulance.status, AmbulanceStatus::Available);
    }
}
