//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process
//! startup and then passed into core services as `Arc<CoreConfig>`. The
//! intent is to avoid reading process-wide environment variables during
//! request handling, which can lead to inconsistent behaviour in
//! multi-threaded runtimes and test harnesses.

use crate::constants::{
    DEFAULT_DATA_DIR, DEFAULT_ETA_MINUTES, DEFAULT_SIMULATION_STEPS, DEFAULT_TICK_INTERVAL_SECS,
};
use crate::error::{DispatchError, DispatchResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    simulation_steps: u32,
    tick_interval: Duration,
    eta_minutes: i64,
    dispatch_transition_on_mission_start: bool,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Validation`] if `simulation_steps` is zero
    /// or `tick_interval` is zero.
    pub fn new(
        data_dir: PathBuf,
        simulation_steps: u32,
        tick_interval: Duration,
        eta_minutes: i64,
        dispatch_transition_on_mission_start: bool,
    ) -> DispatchResult<Self> {
        if simulation_steps == 0 {
            return Err(DispatchError::Validation(
                "simulation_steps must be at least 1".into(),
            ));
        }
        if tick_interval.is_zero() {
            return Err(DispatchError::Validation(
                "tick_interval must be non-zero".into(),
            ));
        }
        if eta_minutes <= 0 {
            return Err(DispatchError::Validation(
                "eta_minutes must be positive".into(),
            ));
        }

        Ok(Self {
            data_dir,
            simulation_steps,
            tick_interval,
            eta_minutes,
            dispatch_transition_on_mission_start,
        })
    }

    /// Configuration with the stock simulation cadence (20 steps, 5 s tick,
    /// 15 min constant ETA, dispatch transition enabled).
    pub fn with_defaults(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            simulation_steps: DEFAULT_SIMULATION_STEPS,
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            eta_minutes: DEFAULT_ETA_MINUTES,
            dispatch_transition_on_mission_start: true,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn simulation_steps(&self) -> u32 {
        self.simulation_steps
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn eta_minutes(&self) -> i64 {
        self.eta_minutes
    }

    /// Whether starting a mission automatically moves the patient to
    /// `Ambulance Dispatched`, matching the driver's accept-mission flow.
    /// Some facilities prefer dispatch to stay a manual status update.
    pub fn dispatch_transition_on_mission_start(&self) -> bool {
        self.dispatch_transition_on_mission_start
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::with_defaults(PathBuf::from(DEFAULT_DATA_DIR))
    }
}
