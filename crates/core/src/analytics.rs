//! Network-level indicators over store snapshots.

use crate::config::CoreConfig;
use crate::entities::{AmbulanceStatus, PatientStatus};
use crate::store::EntityStore;
use serde::Serialize;
use std::sync::Arc;

/// Key performance indicators for the referral network.
#[derive(Clone, Debug, Serialize)]
pub struct Kpis {
    pub total_referrals: usize,
    /// Referrals not yet arrived or completed.
    pub active_referrals: usize,
    pub available_ambulances: usize,
    /// Mean response time over concluded transfers. Constant-ETA model:
    /// every concluded transfer contributes the configured estimate.
    pub avg_response_time_minutes: f64,
    pub completion_rate_percent: f64,
}

/// Read-only analytics over the entity store.
#[derive(Clone)]
pub struct AnalyticsService {
    store: EntityStore,
    cfg: Arc<CoreConfig>,
}

impl AnalyticsService {
    pub fn new(store: EntityStore, cfg: Arc<CoreConfig>) -> Self {
        Self { store, cfg }
    }

    pub fn kpis(&self) -> Kpis {
        let patients = self.store.patients();
        let ambulances = self.store.ambulances();

        let total_referrals = patients.len();
        let active_referrals = patients
            .iter()
            .filter(|p| p.status.rank() < PatientStatus::Arrived.rank())
            .count();
        let available_ambulances = ambulances
            .iter()
            .filter(|a| a.status == AmbulanceStatus::Available)
            .count();

        let concluded_with_ambulance = patients
            .iter()
            .filter(|p| {
                p.assigned_ambulance.is_some()
                    && p.status.rank() >= PatientStatus::Arrived.rank()
            })
            .count();
        let avg_response_time_minutes = if concluded_with_ambulance > 0 {
            self.cfg.eta_minutes() as f64
        } else {
            0.0
        };

        let completion_rate_percent = if total_referrals > 0 {
            (total_referrals - active_referrals) as f64 / total_referrals as f64 * 100.0
        } else {
            0.0
        };

        Kpis {
            total_referrals,
            active_referrals,
            available_ambulances,
            avg_response_time_minutes,
            completion_rate_percent,
        }
    }
}
