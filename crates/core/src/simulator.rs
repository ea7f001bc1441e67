//! Simulated ambulance movement.
//!
//! There is no GPS feed; an in-transit vehicle's position is produced by a
//! background task interpolating linearly between the pickup point and the
//! destination, one sample per tick. The sequence is finite and
//! deterministic, cancellable between ticks, and not restartable once
//! stopped.

use crate::dispatch::announce_arrival;
use crate::entities::PatientStatus;
use crate::error::{DispatchError, DispatchResult};
use crate::fleet::AmbulanceService;
use crate::identity::RequestContext;
use crate::notify::Notifier;
use crate::referral::ReferralService;
use crate::store::EntityStore;
use hoslink_types::GeoPoint;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// A straight-line route sampled at fixed fractions.
///
/// Sample `i` of a plan with `n` steps sits at
/// `start + i * (end - start) / n` on each axis, giving `n + 1` samples
/// with sample `0` at the start and sample `n` exactly at the end.
#[derive(Clone, Copy, Debug)]
pub struct RoutePlan {
    start: GeoPoint,
    end: GeoPoint,
    steps: u32,
}

impl RoutePlan {
    /// Creates a plan with the given number of interpolation steps.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Validation`] if `steps` is zero.
    pub fn new(start: GeoPoint, end: GeoPoint, steps: u32) -> DispatchResult<Self> {
        if steps == 0 {
            return Err(DispatchError::Validation(
                "a route plan needs at least one step".into(),
            ));
        }
        Ok(Self { start, end, steps })
    }

    pub fn start(&self) -> GeoPoint {
        self.start
    }

    pub fn end(&self) -> GeoPoint {
        self.end
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Total number of samples the plan produces (`steps + 1`).
    pub fn sample_count(&self) -> u32 {
        self.steps + 1
    }

    /// Position of sample `step`. Steps beyond the end clamp to the
    /// destination.
    pub fn position_at(&self, step: u32) -> GeoPoint {
        if step == 0 {
            return self.start;
        }
        if step >= self.steps {
            return self.end;
        }
        let fraction = f64::from(step) / f64::from(self.steps);
        let lat = self.start.lat() + fraction * (self.end.lat() - self.start.lat());
        let lng = self.start.lng() + fraction * (self.end.lng() - self.start.lng());
        // Intermediate samples are convex combinations of two valid points
        // and stay inside their bounding box.
        GeoPoint::new(lat, lng).unwrap_or(self.end)
    }
}

/// One simulated mission: writes interpolated position samples for a single
/// (ambulance, patient) pair until arrival or cancellation.
pub(crate) struct MissionSimulator {
    pub(crate) store: EntityStore,
    pub(crate) referrals: ReferralService,
    pub(crate) ambulances: AmbulanceService,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) ambulance_id: String,
    pub(crate) patient_id: String,
    pub(crate) plan: RoutePlan,
    pub(crate) tick: Duration,
    pub(crate) stop: watch::Receiver<bool>,
}

impl MissionSimulator {
    /// Runs the tick loop to completion or cancellation.
    ///
    /// The stop signal is cooperative: it is checked once per tick, before
    /// the tick's write. After a stop is observed no further writes occur
    /// and the vehicle is left in whatever state it was in. A failed
    /// location write is logged and the same step retried on the next tick
    /// rather than abandoning the mission.
    pub(crate) async fn run(self) {
        let steps = self.plan.steps();
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut step = 0u32;
        while step <= steps {
            interval.tick().await;
            if *self.stop.borrow() {
                tracing::info!(
                    ambulance_id = %self.ambulance_id,
                    patient_id = %self.patient_id,
                    step,
                    "mission simulation cancelled"
                );
                return;
            }
            let position = self.plan.position_at(step);
            let label = format!("En route - step {step}/{steps}");
            match self.ambulances.update_location(
                &self.ambulance_id,
                position,
                &label,
                Some(&self.patient_id),
            ) {
                Ok(_) => step += 1,
                Err(err) => {
                    tracing::warn!(
                        ambulance_id = %self.ambulance_id,
                        %err,
                        "location write failed; retrying next tick"
                    );
                }
            }
        }

        // Re-check the stop signal so a cancellation racing the last tick
        // does not trigger the completion path.
        if *self.stop.borrow() {
            return;
        }
        self.finish();
    }

    /// Guarded natural completion: releases the vehicle only if it still
    /// carries this mission's patient, then marks the patient arrived. A
    /// mission already completed by other means makes this a no-op.
    fn finish(self) {
        match self
            .ambulances
            .release_if_carrying(&self.ambulance_id, &self.patient_id)
        {
            Ok(true) => {
                let ctx = RequestContext::system();
                if let Some(patient) = self.store.patient(&self.patient_id) {
                    if patient.status.rank() < PatientStatus::Arrived.rank() {
                        if let Err(err) =
                            self.referrals
                                .transition(&ctx, &self.patient_id, PatientStatus::Arrived)
                        {
                            tracing::warn!(
                                patient_id = %self.patient_id,
                                %err,
                                "could not mark patient arrived after simulated transfer"
                            );
                        }
                    }
                    if let Some(patient) = self.store.patient(&self.patient_id) {
                        announce_arrival(
                            &self.store,
                            self.notifier.as_ref(),
                            &patient,
                            &self.ambulance_id,
                            "System",
                        );
                    }
                }
                tracing::info!(
                    ambulance_id = %self.ambulance_id,
                    patient_id = %self.patient_id,
                    "simulated transfer complete"
                );
            }
            Ok(false) => {
                tracing::debug!(
                    ambulance_id = %self.ambulance_id,
                    patient_id = %self.patient_id,
                    "mission already completed; skipping release"
                );
            }
            Err(err) => {
                tracing::warn!(
                    ambulance_id = %self.ambulance_id,
                    %err,
                    "release after simulated arrival failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::entities::{AmbulanceStatus, NewReferral};
    use crate::notify::LogNotifier;

    fn plan() -> RoutePlan {
        RoutePlan::new(
            GeoPoint::new(-0.0754, 34.7695).unwrap(),
            GeoPoint::new(-0.1743, 34.9169).unwrap(),
            20,
        )
        .unwrap()
    }

    #[test]
    fn twenty_step_plan_yields_twenty_one_bounded_samples() {
        let plan = plan();
        assert_eq!(plan.sample_count(), 21);
        assert_eq!(plan.position_at(0), plan.start());
        assert_eq!(plan.position_at(20), plan.end());
        for step in 1..20 {
            let sample = plan.position_at(step);
            assert!(
                sample.within_bounds(plan.start(), plan.end()),
                "sample {step} at {sample} escapes the route bounding box"
            );
        }
    }

    #[test]
    fn midpoint_is_halfway() {
        let plan = plan();
        let mid = plan.position_at(10);
        assert!((mid.lat() - (-0.12485)).abs() < 1e-9);
        assert!((mid.lng() - 34.8432).abs() < 1e-9);
    }

    #[test]
    fn steps_beyond_the_end_clamp_to_the_destination() {
        let plan = plan();
        assert_eq!(plan.position_at(25), plan.end());
    }

    #[test]
    fn zero_step_plan_is_rejected() {
        let result = RoutePlan::new(
            GeoPoint::new(0.0, 0.0).unwrap(),
            GeoPoint::new(1.0, 1.0).unwrap(),
            0,
        );
        assert!(matches!(result, Err(DispatchError::Validation(_))));
    }

    struct Harness {
        store: EntityStore,
        referrals: ReferralService,
        ambulances: AmbulanceService,
        patient_id: String,
    }

    /// Store with a seeded fleet and one patient assigned to KBA 453D.
    fn harness() -> Harness {
        let store = EntityStore::new();
        let cfg = Arc::new(CoreConfig::default());
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let referrals = ReferralService::new(store.clone(), notifier.clone());
        let ambulances = AmbulanceService::new(store.clone(), cfg);
        ambulances.seed_fleet().unwrap();

        let ctx = RequestContext::system();
        let patient = referrals
            .create(
                &ctx,
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
        referrals
            .assign_ambulance(&ctx, &patient.patient_id, "KBA 453D")
            .unwrap();
        ambulances
            .dispatch(
                "KBA 453D",
                &patient.patient_id,
                "Kisumu County Referral Hospital",
            )
            .unwrap();

        Harness {
            store,
            referrals,
            ambulances,
            patient_id: patient.patient_id,
        }
    }

    fn simulator(h: &Harness, steps: u32, stop: watch::Receiver<bool>) -> MissionSimulator {
        MissionSimulator {
            store: h.store.clone(),
            referrals: h.referrals.clone(),
            ambulances: h.ambulances.clone(),
            notifier: Arc::new(LogNotifier),
            ambulance_id: "KBA 453D".to_string(),
            patient_id: h.patient_id.clone(),
            plan: RoutePlan::new(
                GeoPoint::new(-0.0754, 34.7695).unwrap(),
                GeoPoint::new(-0.1743, 34.9169).unwrap(),
                steps,
            )
            .unwrap(),
            tick: Duration::from_secs(5),
            stop,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn natural_completion_releases_vehicle_and_marks_arrival() {
        let h = harness();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(simulator(&h, 4, stop_rx).run());
        handle.await.unwrap();

        let history = h.store.location_history("KBA 453D");
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].location_name, "En route - step 0/4");
        assert_eq!(history[4].location_name, "En route - step 4/4");
        assert!(history
            .iter()
            .all(|u| u.patient_id.as_deref() == Some(h.patient_id.as_str())));

        let ambulance = h.store.ambulance("KBA 453D").unwrap();
        assert_eq!(ambulance.status, AmbulanceStatus::Available);
        assert!(ambulance.current_patient.is_none());

        let patient = h.store.patient(&h.patient_id).unwrap();
        assert_eq!(patient.status, PatientStatus::Arrived);

        // Arrival was announced to both facilities.
        let messages = h.store.communications_for_patient(&h.patient_id);
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_writes_and_leaves_state_alone() {
        let h = harness();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(simulator(&h, 10, stop_rx).run());

        // Let a few samples land, then signal the stop.
        while h.store.location_history("KBA 453D").len() < 3 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        let written = h.store.location_history("KBA 453D").len();
        assert!(written < 11, "cancelled mission wrote all samples");

        // No more writes after cancellation, and no release.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.store.location_history("KBA 453D").len(), written);
        let ambulance = h.store.ambulance("KBA 453D").unwrap();
        assert_eq!(ambulance.status, AmbulanceStatus::OnTransfer);
        assert_eq!(
            ambulance.current_patient.as_deref(),
            Some(h.patient_id.as_str())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn completion_is_skipped_when_mission_already_completed() {
        let h = harness();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(simulator(&h, 6, stop_rx).run());

        // A manual "mark delivered" releases the vehicle mid-simulation.
        while h.store.location_history("KBA 453D").len() < 2 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        h.ambulances.release("KBA 453D").unwrap();
        handle.await.unwrap();

        // The guard skipped the second release: the patient was never
        // force-marked arrived by the simulator.
        let patient = h.store.patient(&h.patient_id).unwrap();
        assert_eq!(patient.status, PatientStatus::AmbulanceAssigned);
        let ambulance = h.store.ambulance("KBA 453D").unwrap();
        assert_eq!(ambulance.status, AmbulanceStatus::Available);
        assert!(h.store.communications_for_patient(&h.patient_id).is_empty());
    }
}
