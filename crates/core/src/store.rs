//! Entity store: the single owner of all persisted rows.
//!
//! Every record lives in one of six tables guarded by per-table
//! reader-writer locks. All other components access rows only through the
//! operations here; the two state machines and the dispatch coordinator are
//! the only mutators. Mutating operations validate against a copy and write
//! back only on success, so a failed operation never partially commits.
//!
//! Tables can be snapshotted to and loaded from a directory of JSON
//! documents, one per table. Row identifiers for the append-only tables are
//! assigned by the store and survive a snapshot round trip.

use crate::constants::{
    AMBULANCES_SNAPSHOT, COMMUNICATIONS_SNAPSHOT, HANDOVER_FORMS_SNAPSHOT,
    LOCATION_UPDATES_SNAPSHOT, PATIENTS_SNAPSHOT, REFERRALS_SNAPSHOT,
};
use crate::entities::{
    Ambulance, AmbulanceStatus, Communication, HandoverForm, LocationUpdate, Patient, Referral,
};
use crate::error::{DispatchError, DispatchResult};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-process relational store for the referral network.
///
/// Cheap to clone; clones share the same tables.
#[derive(Clone, Default)]
pub struct EntityStore {
    inner: Arc<Tables>,
}

#[derive(Default)]
struct Tables {
    patients: RwLock<BTreeMap<String, Patient>>,
    ambulances: RwLock<BTreeMap<String, Ambulance>>,
    referrals: RwLock<Vec<Referral>>,
    handover_forms: RwLock<Vec<HandoverForm>>,
    communications: RwLock<Vec<Communication>>,
    location_updates: RwLock<Vec<LocationUpdate>>,
}

/// Recovers the guard from a poisoned lock. A panic while holding a table
/// lock leaves the table in its last written state, which is still a valid
/// snapshot of the rows.
fn read_table<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_table<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Patients
    // ------------------------------------------------------------------

    /// Inserts a new patient row.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Validation`] if a patient with the same ID
    /// already exists, or if the record violates the
    /// referring-differs-from-receiving invariant.
    pub fn insert_patient(&self, patient: Patient) -> DispatchResult<Patient> {
        check_patient_invariants(&patient)?;
        let mut table = write_table(&self.inner.patients);
        if table.contains_key(&patient.patient_id) {
            return Err(DispatchError::Validation(format!(
                "patient ID already exists: {}",
                patient.patient_id
            )));
        }
        table.insert(patient.patient_id.clone(), patient.clone());
        Ok(patient)
    }

    /// Returns a copy of the patient with the given ID.
    pub fn patient(&self, patient_id: &str) -> Option<Patient> {
        read_table(&self.inner.patients).get(patient_id).cloned()
    }

    /// Returns copies of all patients, ordered by patient ID.
    pub fn patients(&self) -> Vec<Patient> {
        read_table(&self.inner.patients).values().cloned().collect()
    }

    /// Applies `mutate` to the patient under the table's write lock.
    ///
    /// The closure operates on a copy; if it returns an error, or the
    /// mutated copy violates a stored invariant, the stored row is left
    /// untouched. On success the row's `updated_at` is refreshed and the
    /// updated copy returned.
    pub fn update_patient<F>(&self, patient_id: &str, mutate: F) -> DispatchResult<Patient>
    where
        F: FnOnce(&mut Patient) -> DispatchResult<()>,
    {
        let mut table = write_table(&self.inner.patients);
        let entry = table
            .get_mut(patient_id)
            .ok_or_else(|| DispatchError::not_found("patient", patient_id))?;
        let mut updated = entry.clone();
        mutate(&mut updated)?;
        check_patient_invariants(&updated)?;
        updated.updated_at = Utc::now();
        *entry = updated.clone();
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Ambulances
    // ------------------------------------------------------------------

    /// Inserts a new fleet vehicle.
    pub fn insert_ambulance(&self, ambulance: Ambulance) -> DispatchResult<Ambulance> {
        check_ambulance_invariants(&ambulance)?;
        let mut table = write_table(&self.inner.ambulances);
        if table.contains_key(&ambulance.ambulance_id) {
            return Err(DispatchError::Validation(format!(
                "ambulance ID already exists: {}",
                ambulance.ambulance_id
            )));
        }
        table.insert(ambulance.ambulance_id.clone(), ambulance.clone());
        Ok(ambulance)
    }

    pub fn ambulance(&self, ambulance_id: &str) -> Option<Ambulance> {
        read_table(&self.inner.ambulances)
            .get(ambulance_id)
            .cloned()
    }

    /// Returns copies of all fleet vehicles, ordered by plate ID.
    pub fn ambulances(&self) -> Vec<Ambulance> {
        read_table(&self.inner.ambulances)
            .values()
            .cloned()
            .collect()
    }

    pub fn ambulance_count(&self) -> usize {
        read_table(&self.inner.ambulances).len()
    }

    /// Applies `mutate` to the ambulance under the table's write lock.
    ///
    /// Same copy-validate-writeback discipline as [`Self::update_patient`];
    /// a manual location edit and a simulator tick for the same vehicle
    /// serialise on this lock, so neither update is lost.
    pub fn update_ambulance<F>(&self, ambulance_id: &str, mutate: F) -> DispatchResult<Ambulance>
    where
        F: FnOnce(&mut Ambulance) -> DispatchResult<()>,
    {
        let mut table = write_table(&self.inner.ambulances);
        let entry = table
            .get_mut(ambulance_id)
            .ok_or_else(|| DispatchError::not_found("ambulance", ambulance_id))?;
        let mut updated = entry.clone();
        mutate(&mut updated)?;
        check_ambulance_invariants(&updated)?;
        *entry = updated.clone();
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Append-only tables
    // ------------------------------------------------------------------

    /// Appends a referral audit row. The store assigns the row ID.
    pub fn append_referral(&self, mut referral: Referral) -> Referral {
        let mut table = write_table(&self.inner.referrals);
        referral.id = next_row_id(table.as_slice(), |r| r.id);
        table.push(referral.clone());
        referral
    }

    /// Returns copies of all referral audit rows in insertion order.
    pub fn referrals(&self) -> Vec<Referral> {
        read_table(&self.inner.referrals).clone()
    }

    /// Returns a referral audit row by its ID.
    pub fn referral(&self, id: u64) -> Option<Referral> {
        read_table(&self.inner.referrals)
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Appends a handover form. The store assigns the row ID.
    pub fn append_handover(&self, mut form: HandoverForm) -> HandoverForm {
        let mut table = write_table(&self.inner.handover_forms);
        form.id = next_row_id(table.as_slice(), |f| f.id);
        table.push(form.clone());
        form
    }

    pub fn handover_forms(&self) -> Vec<HandoverForm> {
        read_table(&self.inner.handover_forms).clone()
    }

    /// Returns a handover form by its ID.
    pub fn handover_form(&self, id: u64) -> Option<HandoverForm> {
        read_table(&self.inner.handover_forms)
            .iter()
            .find(|f| f.id == id)
            .cloned()
    }

    /// Appends a message record. The store assigns the row ID.
    pub fn append_communication(&self, mut communication: Communication) -> Communication {
        let mut table = write_table(&self.inner.communications);
        communication.id = next_row_id(table.as_slice(), |c| c.id);
        table.push(communication.clone());
        communication
    }

    /// Messages concerning a patient, newest first.
    pub fn communications_for_patient(&self, patient_id: &str) -> Vec<Communication> {
        let mut rows: Vec<Communication> = read_table(&self.inner.communications)
            .iter()
            .filter(|c| c.patient_id.as_deref() == Some(patient_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows
    }

    /// Messages concerning an ambulance, newest first.
    pub fn communications_for_ambulance(&self, ambulance_id: &str) -> Vec<Communication> {
        let mut rows: Vec<Communication> = read_table(&self.inner.communications)
            .iter()
            .filter(|c| c.ambulance_id.as_deref() == Some(ambulance_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows
    }

    /// Appends a position sample. The store assigns the row ID.
    pub fn append_location_update(&self, mut update: LocationUpdate) -> LocationUpdate {
        let mut table = write_table(&self.inner.location_updates);
        update.id = next_row_id(table.as_slice(), |u| u.id);
        table.push(update.clone());
        update
    }

    /// The authoritative current position of an ambulance: the sample with
    /// the greatest timestamp, not the last inserted row. Assumes sample
    /// timestamps are comparable across writers (clock skew between writers
    /// would pick the skewed-ahead sample).
    pub fn latest_location(&self, ambulance_id: &str) -> Option<LocationUpdate> {
        read_table(&self.inner.location_updates)
            .iter()
            .filter(|u| u.ambulance_id == ambulance_id)
            .max_by_key(|u| u.timestamp)
            .cloned()
    }

    /// All position samples for an ambulance in timestamp order.
    pub fn location_history(&self, ambulance_id: &str) -> Vec<LocationUpdate> {
        let mut rows: Vec<LocationUpdate> = read_table(&self.inner.location_updates)
            .iter()
            .filter(|u| u.ambulance_id == ambulance_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        rows
    }

    // ------------------------------------------------------------------
    // Snapshot persistence
    // ------------------------------------------------------------------

    /// Writes every table as a JSON document under `dir`.
    pub fn save_to_dir(&self, dir: &Path) -> DispatchResult<()> {
        fs::create_dir_all(dir).map_err(DispatchError::StorageDirCreation)?;
        write_snapshot(dir, PATIENTS_SNAPSHOT, &*read_table(&self.inner.patients))?;
        write_snapshot(dir, AMBULANCES_SNAPSHOT, &*read_table(&self.inner.ambulances))?;
        write_snapshot(dir, REFERRALS_SNAPSHOT, &*read_table(&self.inner.referrals))?;
        write_snapshot(
            dir,
            HANDOVER_FORMS_SNAPSHOT,
            &*read_table(&self.inner.handover_forms),
        )?;
        write_snapshot(
            dir,
            COMMUNICATIONS_SNAPSHOT,
            &*read_table(&self.inner.communications),
        )?;
        write_snapshot(
            dir,
            LOCATION_UPDATES_SNAPSHOT,
            &*read_table(&self.inner.location_updates),
        )?;
        Ok(())
    }

    /// Loads a store from a snapshot directory. Missing table documents
    /// load as empty tables, so a fresh data directory is valid.
    pub fn load_from_dir(dir: &Path) -> DispatchResult<Self> {
        let store = Self::new();
        *write_table(&store.inner.patients) = read_snapshot(dir, PATIENTS_SNAPSHOT)?;
        *write_table(&store.inner.ambulances) = read_snapshot(dir, AMBULANCES_SNAPSHOT)?;
        *write_table(&store.inner.referrals) = read_snapshot(dir, REFERRALS_SNAPSHOT)?;
        *write_table(&store.inner.handover_forms) = read_snapshot(dir, HANDOVER_FORMS_SNAPSHOT)?;
        *write_table(&store.inner.communications) = read_snapshot(dir, COMMUNICATIONS_SNAPSHOT)?;
        *write_table(&store.inner.location_updates) =
            read_snapshot(dir, LOCATION_UPDATES_SNAPSHOT)?;
        Ok(store)
    }
}

fn next_row_id<T>(rows: &[T], id_of: impl Fn(&T) -> u64) -> u64 {
    rows.last().map(|row| id_of(row) + 1).unwrap_or(1)
}

fn check_patient_invariants(patient: &Patient) -> DispatchResult<()> {
    if patient.referring_hospital == patient.receiving_hospital {
        return Err(DispatchError::Validation(
            "referring and receiving hospitals cannot be the same".into(),
        ));
    }
    Ok(())
}

fn check_ambulance_invariants(ambulance: &Ambulance) -> DispatchResult<()> {
    let carrying = ambulance.current_patient.is_some();
    let on_transfer = ambulance.status == AmbulanceStatus::OnTransfer;
    if carrying != on_transfer {
        return Err(DispatchError::Validation(format!(
            "ambulance {} would carry a patient while '{}'",
            ambulance.ambulance_id, ambulance.status
        )));
    }
    Ok(())
}

fn write_snapshot<T: serde::Serialize>(
    dir: &Path,
    filename: &str,
    table: &T,
) -> DispatchResult<()> {
    let contents = serde_json::to_string_pretty(table).map_err(DispatchError::Serialization)?;
    fs::write(dir.join(filename), contents).map_err(DispatchError::SnapshotWrite)
}

fn read_snapshot<T: serde::de::DeserializeOwned + Default>(
    dir: &Path,
    filename: &str,
) -> DispatchResult<T> {
    let path = dir.join(filename);
    if !path.is_file() {
        return Ok(T::default());
    }
    let contents = fs::read_to_string(&path).map_err(DispatchError::SnapshotRead)?;
    serde_json::from_str(&contents).map_err(DispatchError::Deserialization)
}
