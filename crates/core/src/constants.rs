//! Constants used throughout the hoslink core crate.
//!
//! This module contains snapshot filenames, simulation defaults and
//! well-known names to ensure consistency across the codebase.

/// Default directory for store snapshots when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "hoslink_data";

/// Snapshot filename for the patients table.
pub const PATIENTS_SNAPSHOT: &str = "patients.json";

/// Snapshot filename for the ambulances table.
pub const AMBULANCES_SNAPSHOT: &str = "ambulances.json";

/// Snapshot filename for the referrals audit table.
pub const REFERRALS_SNAPSHOT: &str = "referrals.json";

/// Snapshot filename for the handover forms table.
pub const HANDOVER_FORMS_SNAPSHOT: &str = "handover_forms.json";

/// Snapshot filename for the communications table.
pub const COMMUNICATIONS_SNAPSHOT: &str = "communications.json";

/// Snapshot filename for the location updates table.
pub const LOCATION_UPDATES_SNAPSHOT: &str = "location_updates.json";

/// Number of interpolation steps a simulated mission takes between the
/// pickup point and the destination.
pub const DEFAULT_SIMULATION_STEPS: u32 = 20;

/// Seconds between simulated location samples.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 5;

/// Constant estimated transfer time in minutes. There is no routing
/// engine; every mission carries the same estimate.
pub const DEFAULT_ETA_MINUTES: i64 = 15;

/// Prefix for generated patient identifiers.
pub const PATIENT_ID_PREFIX: &str = "PAT";

/// Recipient name for county dispatch control notifications.
pub const CONTROL_CENTER: &str = "Control Center";

/// Fallback map position (central Kisumu) for vehicles without a fix.
pub const DEFAULT_LATITUDE: f64 = -0.0916;

/// Fallback map position (central Kisumu) for vehicles without a fix.
pub const DEFAULT_LONGITUDE: f64 = 34.7680;
