//! Persistent record types for the referral network.
//!
//! Every row owned by the [`EntityStore`](crate::store::EntityStore) is
//! defined here, together with the status enumerations the two state
//! machines operate on. Status values serialise with the human-readable
//! labels the county network uses on paper forms ("Ambulance Assigned",
//! "On Transfer", ...), so snapshots remain legible to operators.

use chrono::{DateTime, Utc};
use hoslink_types::GeoPoint;
use serde::{Deserialize, Serialize};

// ============================================================================
// STATUS ENUMERATIONS
// ============================================================================

/// Lifecycle states of a patient referral.
///
/// The forward path runs `Referred` through `Completed`; `Completed` is
/// terminal and only reachable through the handover operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatientStatus {
    #[serde(rename = "Referred")]
    Referred,
    #[serde(rename = "Ambulance Assigned")]
    AmbulanceAssigned,
    #[serde(rename = "Ambulance Dispatched")]
    AmbulanceDispatched,
    #[serde(rename = "Patient Picked Up")]
    PatientPickedUp,
    #[serde(rename = "Transporting to Destination")]
    Transporting,
    #[serde(rename = "Arrived at Destination")]
    Arrived,
    #[serde(rename = "Completed")]
    Completed,
}

impl PatientStatus {
    /// Position along the forward path; transitions must strictly increase.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Referred => 0,
            Self::AmbulanceAssigned => 1,
            Self::AmbulanceDispatched => 2,
            Self::PatientPickedUp => 3,
            Self::Transporting => 4,
            Self::Arrived => 5,
            Self::Completed => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// The display label, identical to the serialised form.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Referred => "Referred",
            Self::AmbulanceAssigned => "Ambulance Assigned",
            Self::AmbulanceDispatched => "Ambulance Dispatched",
            Self::PatientPickedUp => "Patient Picked Up",
            Self::Transporting => "Transporting to Destination",
            Self::Arrived => "Arrived at Destination",
            Self::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for PatientStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Referred" => Ok(Self::Referred),
            "Ambulance Assigned" => Ok(Self::AmbulanceAssigned),
            "Ambulance Dispatched" => Ok(Self::AmbulanceDispatched),
            "Patient Picked Up" => Ok(Self::PatientPickedUp),
            "Transporting to Destination" => Ok(Self::Transporting),
            "Arrived at Destination" => Ok(Self::Arrived),
            "Completed" => Ok(Self::Completed),
            other => Err(format!("unknown patient status: {other}")),
        }
    }
}

/// Operational states of a fleet vehicle. Cyclic; no terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmbulanceStatus {
    #[serde(rename = "Available")]
    Available,
    #[serde(rename = "On Transfer")]
    OnTransfer,
    #[serde(rename = "On Break")]
    OnBreak,
    #[serde(rename = "Maintenance")]
    Maintenance,
}

impl AmbulanceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::OnTransfer => "On Transfer",
            Self::OnBreak => "On Break",
            Self::Maintenance => "Maintenance",
        }
    }
}

impl std::fmt::Display for AmbulanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Administrative side states an operator can force a vehicle into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffDutyStatus {
    OnBreak,
    Maintenance,
}

impl From<OffDutyStatus> for AmbulanceStatus {
    fn from(value: OffDutyStatus) -> Self {
        match value {
            OffDutyStatus::OnBreak => AmbulanceStatus::OnBreak,
            OffDutyStatus::Maintenance => AmbulanceStatus::Maintenance,
        }
    }
}

/// Classification of an inter-party message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    DriverHospital,
    HospitalHospital,
    System,
    VitalsUpdate,
    Emergency,
    ArrivalNotification,
}

// ============================================================================
// CLINICAL SNAPSHOTS
// ============================================================================

/// Point-in-time vital signs snapshot.
///
/// Temperature and respiratory rate are optional: the en-route observation
/// form captures respiratory rate but not temperature, while the handover
/// form captures temperature but not respiratory rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    pub blood_pressure: String,
    pub heart_rate: u32,
    pub oxygen_saturation: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiratory_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

// ============================================================================
// STORED RECORDS
// ============================================================================

/// A patient under referral between two facilities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: String,
    pub name: String,
    pub age: u32,
    pub condition: String,
    pub referring_hospital: String,
    pub receiving_hospital: String,
    pub referring_physician: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiving_physician: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vital_signs: Option<VitalSigns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_medications: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
    pub referral_time: DateTime<Utc>,
    pub status: PatientStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_ambulance: Option<String>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referring_location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiving_location: Option<GeoPoint>,
}

/// A fleet vehicle. Created at system initialisation, never destroyed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ambulance {
    pub ambulance_id: String,
    pub current_location: String,
    pub position: GeoPoint,
    pub status: AmbulanceStatus,
    pub driver_name: String,
    pub driver_contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_patient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub last_location_update: DateTime<Utc>,
}

/// Append-only audit record linking a patient to an ambulance at dispatch
/// time. Immutable after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: u64,
    pub patient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambulance_id: Option<String>,
    pub status: PatientStatus,
    pub timestamp: DateTime<Utc>,
    pub created_by: String,
}

/// Snapshot of a patient's clinical state at the moment of handover.
/// Created once per completed transfer; immutable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandoverForm {
    pub id: u64,
    pub patient_id: String,
    pub patient_name: String,
    pub age: u32,
    pub condition: String,
    pub referring_hospital: String,
    pub receiving_hospital: String,
    pub referring_physician: String,
    pub receiving_physician: String,
    pub transfer_time: DateTime<Utc>,
    pub vital_signs: VitalSigns,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_medications: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambulance_id: Option<String>,
    pub created_by: String,
}

/// Append-only message record between parties of a transfer. Never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Communication {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambulance_id: Option<String>,
    pub sender: String,
    pub receiver: String,
    pub message: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
}

/// Append-only timestamped position sample for an ambulance. The latest
/// record per ambulance (by timestamp) is the authoritative position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub id: u64,
    pub ambulance_id: String,
    pub position: GeoPoint,
    pub location_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// OPERATION INPUTS
// ============================================================================

/// Input for creating a new referral.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewReferral {
    pub name: String,
    pub age: u32,
    pub condition: String,
    pub referring_hospital: String,
    pub receiving_hospital: String,
    pub referring_physician: String,
    #[serde(default)]
    pub receiving_physician: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub medical_history: Option<String>,
    #[serde(default)]
    pub current_medications: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
}

/// Clinical state recorded at the moment of handover.
#[derive(Clone, Debug, Deserialize)]
pub struct HandoverSnapshot {
    pub vital_signs: VitalSigns,
    pub receiving_physician: String,
    #[serde(default)]
    pub notes: Option<String>,
}
