//! Dispatch coordination across the two state machines.
//!
//! The coordinator is the only component that changes a patient and an
//! ambulance together. Binding is two-phase: the patient-side assignment
//! followed by the ambulance-side dispatch, with a compensating rollback of
//! the first when the second fails, so the cross-reference invariant (a
//! patient references an ambulance iff the ambulance references it back)
//! is never observable broken.
//!
//! The coordinator also owns the simulated missions: one cancellable
//! background task per in-flight (ambulance, patient) pair, cleaned up on
//! shutdown.

use crate::config::CoreConfig;
use crate::constants::CONTROL_CENTER;
use crate::entities::{Communication, MessageKind, Patient, PatientStatus, Referral};
use crate::error::{DispatchError, DispatchResult};
use crate::fleet::AmbulanceService;
use crate::identity::RequestContext;
use crate::notify::{NotificationKind, Notifier};
use crate::referral::ReferralService;
use crate::seed;
use crate::simulator::{MissionSimulator, RoutePlan};
use crate::store::EntityStore;
use chrono::Utc;
use hoslink_types::GeoPoint;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct MissionHandle {
    patient_id: String,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Orchestrates cross-entity transitions and supervises mission tasks.
pub struct DispatchCoordinator {
    store: EntityStore,
    referrals: ReferralService,
    ambulances: AmbulanceService,
    notifier: Arc<dyn Notifier>,
    cfg: Arc<CoreConfig>,
    missions: Mutex<HashMap<String, MissionHandle>>,
}

impl DispatchCoordinator {
    pub fn new(
        store: EntityStore,
        referrals: ReferralService,
        ambulances: AmbulanceService,
        notifier: Arc<dyn Notifier>,
        cfg: Arc<CoreConfig>,
    ) -> Self {
        Self {
            store,
            referrals,
            ambulances,
            notifier,
            cfg,
            missions: Mutex::new(HashMap::new()),
        }
    }

    /// Binds an available ambulance to a patient.
    ///
    /// Either both records are updated consistently or neither is: a
    /// failure of the ambulance-side dispatch rolls the patient-side
    /// assignment back before the error is surfaced.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotFound`] if either ID is unknown.
    /// - [`DispatchError::AmbulanceUnavailable`] when the vehicle is not
    ///   `Available`.
    /// - [`DispatchError::InvalidState`] when the patient has progressed
    ///   past `Referred`.
    pub fn assign(
        &self,
        ctx: &RequestContext,
        patient_id: &str,
        ambulance_id: &str,
    ) -> DispatchResult<Patient> {
        let before = self
            .store
            .patient(patient_id)
            .ok_or_else(|| DispatchError::not_found("patient", patient_id))?;

        let patient = self
            .referrals
            .assign_ambulance(ctx, patient_id, ambulance_id)?;

        match self
            .ambulances
            .dispatch(ambulance_id, patient_id, &patient.receiving_hospital)
        {
            Ok(_) => {
                self.store.append_referral(Referral {
                    id: 0,
                    patient_id: patient.patient_id.clone(),
                    ambulance_id: Some(ambulance_id.to_string()),
                    status: PatientStatus::AmbulanceAssigned,
                    timestamp: Utc::now(),
                    created_by: ctx.audit_label().to_string(),
                });
                self.notifier.notify(
                    &patient.referring_hospital,
                    &format!(
                        "Ambulance {} dispatched for patient {}",
                        ambulance_id, patient.name
                    ),
                    NotificationKind::Dispatch,
                );
                Ok(patient)
            }
            Err(err) => {
                if let Err(rollback_err) = self.referrals.revert_assignment(patient_id, &before) {
                    tracing::error!(
                        patient_id,
                        ambulance_id,
                        %rollback_err,
                        "compensating rollback after failed dispatch also failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// Starts the simulated movement for an ambulance's current mission.
    ///
    /// Spawns one cancellable background task producing position samples
    /// from the vehicle's position to the receiving facility. At most one
    /// active mission per vehicle. Depending on configuration, the patient
    /// is moved to `Ambulance Dispatched` as the mission starts.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_mission(&self, ctx: &RequestContext, ambulance_id: &str) -> DispatchResult<()> {
        let ambulance = self
            .store
            .ambulance(ambulance_id)
            .ok_or_else(|| DispatchError::not_found("ambulance", ambulance_id))?;
        let patient_id = ambulance.current_patient.clone().ok_or_else(|| {
            DispatchError::InvalidState(format!("ambulance {ambulance_id} has no current patient"))
        })?;
        let patient = self
            .store
            .patient(&patient_id)
            .ok_or_else(|| DispatchError::not_found("patient", &patient_id))?;
        if patient.assigned_ambulance.as_deref() != Some(ambulance_id) {
            return Err(DispatchError::InvalidState(format!(
                "patient {patient_id} is not assigned to ambulance {ambulance_id}"
            )));
        }

        let destination = receiving_position(&patient)?;
        let plan = RoutePlan::new(ambulance.position, destination, self.cfg.simulation_steps())?;

        let mut missions = lock_missions(&self.missions);
        missions.retain(|_, handle| !handle.task.is_finished());
        if missions.contains_key(ambulance_id) {
            return Err(DispatchError::InvalidState(format!(
                "a mission is already active for ambulance {ambulance_id}"
            )));
        }

        if self.cfg.dispatch_transition_on_mission_start()
            && patient.status.rank() < PatientStatus::AmbulanceDispatched.rank()
        {
            self.referrals
                .transition(ctx, &patient_id, PatientStatus::AmbulanceDispatched)?;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let simulator = MissionSimulator {
            store: self.store.clone(),
            referrals: self.referrals.clone(),
            ambulances: self.ambulances.clone(),
            notifier: self.notifier.clone(),
            ambulance_id: ambulance_id.to_string(),
            patient_id: patient_id.clone(),
            plan,
            tick: self.cfg.tick_interval(),
            stop: stop_rx,
        };
        let task = tokio::spawn(simulator.run());
        missions.insert(
            ambulance_id.to_string(),
            MissionHandle {
                patient_id: patient_id.clone(),
                stop: stop_tx,
                task,
            },
        );
        tracing::info!(ambulance_id, patient_id, "mission simulation started");
        Ok(())
    }

    /// Completes an ambulance's current mission: patient to `Arrived at
    /// Destination`, vehicle released, arrival announced. Any running
    /// simulation for the vehicle is signalled to stop first.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidState`] if the vehicle has no current
    /// patient.
    pub fn complete_mission(
        &self,
        ctx: &RequestContext,
        ambulance_id: &str,
    ) -> DispatchResult<Patient> {
        self.cancel_mission(ambulance_id);

        let ambulance = self
            .store
            .ambulance(ambulance_id)
            .ok_or_else(|| DispatchError::not_found("ambulance", ambulance_id))?;
        let patient_id = ambulance.current_patient.clone().ok_or_else(|| {
            DispatchError::InvalidState(format!("ambulance {ambulance_id} has no current patient"))
        })?;

        let patient = self
            .store
            .patient(&patient_id)
            .ok_or_else(|| DispatchError::not_found("patient", &patient_id))?;
        let patient = if patient.status.rank() < PatientStatus::Arrived.rank() {
            self.referrals
                .transition(ctx, &patient_id, PatientStatus::Arrived)?
        } else {
            patient
        };
        self.ambulances.release(ambulance_id)?;

        announce_arrival(
            &self.store,
            self.notifier.as_ref(),
            &patient,
            ambulance_id,
            &ctx.identity().name,
        );
        tracing::info!(ambulance_id, patient_id, "mission completed");
        Ok(patient)
    }

    /// Signals the vehicle's running simulation (if any) to stop. The stop
    /// is cooperative: the task observes it at its next tick and writes
    /// nothing further. Already-written samples are kept and the vehicle's
    /// state is left as-is. Returns whether a mission was active.
    pub fn cancel_mission(&self, ambulance_id: &str) -> bool {
        let handle = lock_missions(&self.missions).remove(ambulance_id);
        match handle {
            Some(handle) => {
                if handle.stop.send(true).is_err() {
                    tracing::debug!(ambulance_id, "mission task already finished");
                }
                tracing::info!(
                    ambulance_id,
                    patient_id = %handle.patient_id,
                    "mission simulation cancellation requested"
                );
                true
            }
            None => false,
        }
    }

    /// Broadcasts a driver emergency to both facilities and the control
    /// centre.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidState`] if the vehicle has no active
    /// patient.
    pub fn send_emergency_alert(
        &self,
        ctx: &RequestContext,
        ambulance_id: &str,
    ) -> DispatchResult<()> {
        let ambulance = self
            .store
            .ambulance(ambulance_id)
            .ok_or_else(|| DispatchError::not_found("ambulance", ambulance_id))?;
        let patient_id = ambulance.current_patient.clone().ok_or_else(|| {
            DispatchError::InvalidState(format!(
                "ambulance {ambulance_id} has no active patient to alert for"
            ))
        })?;
        let patient = self
            .store
            .patient(&patient_id)
            .ok_or_else(|| DispatchError::not_found("patient", &patient_id))?;

        let message = format!("EMERGENCY: Ambulance {ambulance_id} requires immediate assistance!");
        for recipient in [
            patient.referring_hospital.as_str(),
            patient.receiving_hospital.as_str(),
            CONTROL_CENTER,
        ] {
            self.store.append_communication(Communication {
                id: 0,
                patient_id: Some(patient_id.clone()),
                ambulance_id: Some(ambulance_id.to_string()),
                sender: ctx.identity().name.clone(),
                receiver: recipient.to_string(),
                message: message.clone(),
                kind: MessageKind::Emergency,
                timestamp: Utc::now(),
            });
        }
        self.notifier
            .notify(CONTROL_CENTER, &message, NotificationKind::Emergency);
        tracing::warn!(ambulance_id, patient_id, "emergency alert sent");
        Ok(())
    }

    /// Active (ambulance, patient) mission pairs.
    pub fn active_missions(&self) -> Vec<(String, String)> {
        let mut missions = lock_missions(&self.missions);
        missions.retain(|_, handle| !handle.task.is_finished());
        missions
            .iter()
            .map(|(ambulance_id, handle)| (ambulance_id.clone(), handle.patient_id.clone()))
            .collect()
    }

    /// Cancels every active mission and waits for the tasks to stop.
    /// Called once at process shutdown so no simulation outlives the
    /// coordinator.
    pub async fn shutdown(&self) {
        let handles: Vec<MissionHandle> = {
            let mut missions = lock_missions(&self.missions);
            missions.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            let _ = handle.stop.send(true);
        }
        for handle in handles {
            if let Err(err) = handle.task.await {
                tracing::warn!(%err, "mission task aborted during shutdown");
            }
        }
    }
}

fn lock_missions(
    missions: &Mutex<HashMap<String, MissionHandle>>,
) -> std::sync::MutexGuard<'_, HashMap<String, MissionHandle>> {
    missions
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn receiving_position(patient: &Patient) -> DispatchResult<GeoPoint> {
    if let Some(position) = patient.receiving_location {
        return Ok(position);
    }
    seed::find_facility(&patient.receiving_hospital)
        .and_then(|f| f.position().ok())
        .ok_or_else(|| {
            DispatchError::Validation(format!(
                "no coordinates on record for receiving facility '{}'",
                patient.receiving_hospital
            ))
        })
}

/// Records the arrival in the communications table (both facilities) and
/// notifies the receiving hospital. Shared by the manual completion path
/// and the simulator's natural completion.
pub(crate) fn announce_arrival(
    store: &EntityStore,
    notifier: &dyn Notifier,
    patient: &Patient,
    ambulance_id: &str,
    sender: &str,
) {
    let message = format!(
        "Patient {} has arrived via ambulance {}",
        patient.name, ambulance_id
    );
    for hospital in [&patient.referring_hospital, &patient.receiving_hospital] {
        store.append_communication(Communication {
            id: 0,
            patient_id: Some(patient.patient_id.clone()),
            ambulance_id: Some(ambulance_id.to_string()),
            sender: sender.to_string(),
            receiver: hospital.clone(),
            message: message.clone(),
            kind: MessageKind::ArrivalNotification,
            timestamp: Utc::now(),
        });
    }
    notifier.notify(
        &patient.receiving_hospital,
        &message,
        NotificationKind::Arrival,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{AmbulanceStatus, NewReferral, OffDutyStatus};
    use crate::notify::LogNotifier;
    use std::time::Duration;

    struct Harness {
        store: EntityStore,
        coordinator: DispatchCoordinator,
        ambulances: AmbulanceService,
        patient_id: String,
    }

    fn harness() -> Harness {
        harness_with_config(Arc::new(CoreConfig::default()))
    }

    fn harness_with_config(cfg: Arc<CoreConfig>) -> Harness {
        let store = EntityStore::new();
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let referrals = ReferralService::new(store.clone(), notifier.clone());
        let ambulances = AmbulanceService::new(store.clone(), cfg.clone());
        ambulances.seed_fleet().unwrap();
        let coordinator = DispatchCoordinator::new(
            store.clone(),
            referrals.clone(),
            ambulances.clone(),
            notifier,
            cfg,
        );

        let patient = referrals
            .create(
                &RequestContext::system(),
                NewReferral {
                    name: "Akinyi Odhiambo".to_string(),
                    age: 34,
                    condition: "Eclampsia".to_string(),
                    referring_hospital:
                        "Jaramogi Oginga Odinga Teaching & Referral Hospital (JOOTRH)".to_string(),
                    receiving_hospital: "Kisumu County Referral Hospital".to_string(),
                    referring_physician: "Dr. Owuor".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        Harness {
            store,
            coordinator,
            ambulances,
            patient_id: patient.patient_id,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::system()
    }

    #[test]
    fn assign_updates_both_records_consistently() {
        let h = harness();
        let patient = h
            .coordinator
            .assign(&ctx(), &h.patient_id, "KBA 453D")
            .unwrap();

        assert_eq!(patient.status, PatientStatus::AmbulanceAssigned);
        assert_eq!(patient.assigned_ambulance.as_deref(), Some("KBA 453D"));

        let ambulance = h.store.ambulance("KBA 453D").unwrap();
        assert_eq!(ambulance.status, AmbulanceStatus::OnTransfer);
        assert_eq!(
            ambulance.current_patient.as_deref(),
            Some(h.patient_id.as_str())
        );

        // Creation plus dispatch-time audit rows.
        assert_eq!(h.store.referrals().len(), 2);
        let dispatch_row = &h.store.referrals()[1];
        assert_eq!(dispatch_row.ambulance_id.as_deref(), Some("KBA 453D"));
    }

    #[test]
    fn release_alone_does_not_touch_the_patient() {
        let h = harness();
        h.coordinator
            .assign(&ctx(), &h.patient_id, "KBA 453D")
            .unwrap();
        h.ambulances.release("KBA 453D").unwrap();

        let ambulance = h.store.ambulance("KBA 453D").unwrap();
        assert_eq!(ambulance.status, AmbulanceStatus::Available);
        assert!(ambulance.current_patient.is_none());

        let patient = h.store.patient(&h.patient_id).unwrap();
        assert_eq!(patient.status, PatientStatus::AmbulanceAssigned);
        assert_eq!(patient.assigned_ambulance.as_deref(), Some("KBA 453D"));
    }

    #[test]
    fn assign_to_unavailable_vehicle_fails_without_partial_state() {
        let h = harness();
        h.ambulances
            .set_off_duty("KBA 453D", OffDutyStatus::OnBreak)
            .unwrap();
        let before = h.store.patient(&h.patient_id).unwrap();
        let audit_rows = h.store.referrals().len();

        let result = h.coordinator.assign(&ctx(), &h.patient_id, "KBA 453D");
        assert!(matches!(
            result,
            Err(DispatchError::AmbulanceUnavailable { .. })
        ));

        // The compensating rollback restored the patient record and no
        // dispatch-time audit row was written.
        let after = h.store.patient(&h.patient_id).unwrap();
        assert_eq!(after.status, before.status);
        assert_eq!(after.assigned_ambulance, before.assigned_ambulance);
        assert_eq!(h.store.referrals().len(), audit_rows);
    }

    #[test]
    fn assign_twice_fails_with_ambulance_unavailable() {
        let h = harness();
        h.coordinator
            .assign(&ctx(), &h.patient_id, "KBA 453D")
            .unwrap();

        let referrals = ReferralService::new(h.store.clone(), Arc::new(LogNotifier));
        let second = referrals
            .create(
                &ctx(),
                NewReferral {
                    name: "Otieno Okoth".to_string(),
                    age: 52,
                    condition: "Fractured femur".to_string(),
                    referring_hospital: "Ahero Sub-County Hospital".to_string(),
                    receiving_hospital: "Kisumu County Referral Hospital".to_string(),
                    referring_physician: "Dr. Anyango".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        let result = h
            .coordinator
            .assign(&ctx(), &second.patient_id, "KBA 453D");
        assert!(matches!(
            result,
            Err(DispatchError::AmbulanceUnavailable { .. })
        ));
        // The second patient was rolled back to Referred.
        let after = h.store.patient(&second.patient_id).unwrap();
        assert_eq!(after.status, PatientStatus::Referred);
        assert!(after.assigned_ambulance.is_none());
    }

    #[test]
    fn assign_unknown_ids_are_not_found() {
        let h = harness();
        assert!(matches!(
            h.coordinator.assign(&ctx(), "PAT00000000", "KBA 453D"),
            Err(DispatchError::NotFound { .. })
        ));
        assert!(matches!(
            h.coordinator.assign(&ctx(), &h.patient_id, "KZZ 000A"),
            Err(DispatchError::NotFound { .. })
        ));
    }

    #[test]
    fn complete_mission_requires_a_current_patient() {
        let h = harness();
        let result = h.coordinator.complete_mission(&ctx(), "KBA 453D");
        assert!(matches!(result, Err(DispatchError::InvalidState(_))));
    }

    #[test]
    fn complete_mission_arrives_patient_and_frees_vehicle() {
        let h = harness();
        h.coordinator
            .assign(&ctx(), &h.patient_id, "KBA 453D")
            .unwrap();
        let patient = h.coordinator.complete_mission(&ctx(), "KBA 453D").unwrap();

        assert_eq!(patient.status, PatientStatus::Arrived);
        let ambulance = h.store.ambulance("KBA 453D").unwrap();
        assert_eq!(ambulance.status, AmbulanceStatus::Available);
        assert!(ambulance.current_patient.is_none());

        let messages = h.store.communications_for_patient(&h.patient_id);
        assert_eq!(messages.len(), 2);
        assert!(messages
            .iter()
            .all(|m| m.kind == MessageKind::ArrivalNotification));
    }

    #[test]
    fn emergency_alert_reaches_both_facilities_and_control() {
        let h = harness();
        h.coordinator
            .assign(&ctx(), &h.patient_id, "KBA 453D")
            .unwrap();
        h.coordinator
            .send_emergency_alert(&ctx(), "KBA 453D")
            .unwrap();

        let messages = h.store.communications_for_ambulance("KBA 453D");
        let emergencies: Vec<_> = messages
            .iter()
            .filter(|m| m.kind == MessageKind::Emergency)
            .collect();
        assert_eq!(emergencies.len(), 3);
        assert!(emergencies.iter().any(|m| m.receiver == CONTROL_CENTER));
    }

    #[test]
    fn emergency_alert_requires_active_patient() {
        let h = harness();
        let result = h.coordinator.send_emergency_alert(&ctx(), "KBA 453D");
        assert!(matches!(result, Err(DispatchError::InvalidState(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn start_mission_spawns_one_supervised_task_per_vehicle() {
        let h = harness();
        h.coordinator
            .assign(&ctx(), &h.patient_id, "KBA 453D")
            .unwrap();
        h.coordinator.start_mission(&ctx(), "KBA 453D").unwrap();

        // Default policy moves the patient to Ambulance Dispatched.
        let patient = h.store.patient(&h.patient_id).unwrap();
        assert_eq!(patient.status, PatientStatus::AmbulanceDispatched);

        let missions = h.coordinator.active_missions();
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].0, "KBA 453D");

        let result = h.coordinator.start_mission(&ctx(), "KBA 453D");
        assert!(matches!(result, Err(DispatchError::InvalidState(_))));

        assert!(h.coordinator.cancel_mission("KBA 453D"));
        assert!(!h.coordinator.cancel_mission("KBA 453D"));
        h.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_mission_honours_disabled_transition_policy() {
        let cfg = Arc::new(
            CoreConfig::new(
                std::path::PathBuf::from("hoslink_data"),
                20,
                Duration::from_secs(5),
                15,
                false,
            )
            .unwrap(),
        );
        let h = harness_with_config(cfg);
        h.coordinator
            .assign(&ctx(), &h.patient_id, "KBA 453D")
            .unwrap();
        h.coordinator.start_mission(&ctx(), "KBA 453D").unwrap();

        // With the policy off, starting the simulation does not touch the
        // patient's status.
        let patient = h.store.patient(&h.patient_id).unwrap();
        assert_eq!(patient.status, PatientStatus::AmbulanceAssigned);
        h.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_mission_requires_reciprocal_link() {
        let h = harness();
        let result = h.coordinator.start_mission(&ctx(), "KBA 453D");
        assert!(matches!(result, Err(DispatchError::InvalidState(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn mission_runs_to_arrival_under_the_coordinator() {
        let cfg = Arc::new(
            CoreConfig::new(
                std::path::PathBuf::from("hoslink_data"),
                4,
                Duration::from_secs(5),
                15,
                true,
            )
            .unwrap(),
        );
        let h = harness_with_config(cfg);
        h.coordinator
            .assign(&ctx(), &h.patient_id, "KBA 453D")
            .unwrap();
        h.coordinator.start_mission(&ctx(), "KBA 453D").unwrap();

        for _ in 0..60 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if h.store.patient(&h.patient_id).unwrap().status == PatientStatus::Arrived {
                break;
            }
        }

        let patient = h.store.patient(&h.patient_id).unwrap();
        assert_eq!(patient.status, PatientStatus::Arrived);
        let ambulance = h.store.ambulance("KBA 453D").unwrap();
        assert_eq!(ambulance.status, AmbulanceStatus::Available);
        assert_eq!(h.store.location_history("KBA 453D").len(), 5);
        assert!(h.coordinator.active_missions().is_empty());
        h.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_completion_stops_the_running_simulation() {
        let h = harness();
        h.coordinator
            .assign(&ctx(), &h.patient_id, "KBA 453D")
            .unwrap();
        h.coordinator.start_mission(&ctx(), "KBA 453D").unwrap();

        while h.store.location_history("KBA 453D").len() < 2 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        let patient = h.coordinator.complete_mission(&ctx(), "KBA 453D").unwrap();
        assert_eq!(patient.status, PatientStatus::Arrived);
        h.coordinator.shutdown().await;

        // The cancelled simulation wrote nothing further and did not
        // double-release: the vehicle stays Available.
        let written = h.store.location_history("KBA 453D").len();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.store.location_history("KBA 453D").len(), written);
        assert_eq!(
            h.store.ambulance("KBA 453D").unwrap().status,
            AmbulanceStatus::Available
        );
    }
}
