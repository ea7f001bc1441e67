//! Flat read-only snapshots for the export collaborator.
//!
//! The export surface (CSV/PDF rendering) lives outside this crate; it is
//! handed pre-flattened rows whose serde field names are the column
//! headers of the county's report templates.

use crate::entities::{Ambulance, Patient};
use crate::store::EntityStore;
use serde::Serialize;

/// One row of the referrals report.
#[derive(Clone, Debug, Serialize)]
pub struct ReferralRow {
    #[serde(rename = "Patient ID")]
    pub patient_id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Age")]
    pub age: u32,
    #[serde(rename = "Condition")]
    pub condition: String,
    #[serde(rename = "Referring Hospital")]
    pub referring_hospital: String,
    #[serde(rename = "Receiving Hospital")]
    pub receiving_hospital: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Ambulance")]
    pub ambulance: String,
    #[serde(rename = "Referral Time")]
    pub referral_time: String,
}

impl From<&Patient> for ReferralRow {
    fn from(patient: &Patient) -> Self {
        Self {
            patient_id: patient.patient_id.clone(),
            name: patient.name.clone(),
            age: patient.age,
            condition: patient.condition.clone(),
            referring_hospital: patient.referring_hospital.clone(),
            receiving_hospital: patient.receiving_hospital.clone(),
            status: patient.status.to_string(),
            ambulance: patient
                .assigned_ambulance
                .clone()
                .unwrap_or_else(|| "Not assigned".to_string()),
            referral_time: patient.referral_time.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// One row of the fleet report.
#[derive(Clone, Debug, Serialize)]
pub struct AmbulanceRow {
    #[serde(rename = "Ambulance ID")]
    pub ambulance_id: String,
    #[serde(rename = "Driver")]
    pub driver: String,
    #[serde(rename = "Contact")]
    pub contact: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Current Patient")]
    pub current_patient: String,
}

impl From<&Ambulance> for AmbulanceRow {
    fn from(ambulance: &Ambulance) -> Self {
        Self {
            ambulance_id: ambulance.ambulance_id.clone(),
            driver: ambulance.driver_name.clone(),
            contact: ambulance.driver_contact.clone(),
            status: ambulance.status.to_string(),
            location: ambulance.current_location.clone(),
            current_patient: ambulance
                .current_patient
                .clone()
                .unwrap_or_else(|| "None".to_string()),
        }
    }
}

/// Flattens the patients table for report rendering.
pub fn referral_rows(store: &EntityStore) -> Vec<ReferralRow> {
    store.patients().iter().map(ReferralRow::from).collect()
}

/// Flattens the ambulances table for report rendering.
pub fn ambulance_rows(store: &EntityStore) -> Vec<AmbulanceRow> {
    store.ambulances().iter().map(AmbulanceRow::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::fleet::AmbulanceService;
    use std::sync::Arc;

    #[test]
    fn rows_use_report_column_headers() {
        let store = EntityStore::new();
        let ambulances = AmbulanceService::new(store.clone(), Arc::new(CoreConfig::default()));
        ambulances.seed_fleet().unwrap();

        let rows = ambulance_rows(&store);
        assert_eq!(rows.len(), 20);
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert!(json.get("Ambulance ID").is_some());
        assert!(json.get("Driver").is_some());
        assert_eq!(json["Status"], "Available");
        assert_eq!(json["Current Patient"], "None");
    }

    #[test]
    fn unassigned_patients_flatten_with_placeholder() {
        use crate::entities::NewReferral;
        use crate::identity::RequestContext;
        use crate::notify::LogNotifier;
        use crate::referral::ReferralService;

        let store = EntityStore::new();
        let referrals = ReferralService::new(store.clone(), Arc::new(LogNotifier));
        referrals
            .create(
                &RequestContext::system(),
                NewReferral {
                    name: "Akinyi Odhiambo".to_string(),
                    age: 34,
                    condition: "Eclampsia".to_string(),
                    referring_hospital: "Ahero Sub-County Hospital".to_string(),
                    receiving_hospital: "Kisumu County Referral Hospital".to_string(),
                    referring_physician: "Dr. Owuor".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        let rows = referral_rows(&store);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "Referred");
        assert_eq!(rows[0].ambulance, "Not assigned");
    }
}
