//! # hoslink core
//!
//! Business logic for the Kisumu County patient-referral and
//! ambulance-dispatch coordination service:
//!
//! - Entity store owning all persisted rows, with JSON snapshot persistence
//! - Referral lifecycle state machine (creation through handover)
//! - Ambulance state machine and fleet management
//! - Dispatch coordinator binding the two atomically, with compensating
//!   rollback and supervised mission tasks
//! - Simulated movement producing interpolated location updates
//!
//! **No API concerns**: HTTP surfaces, CLI parsing and delivery transports
//! belong to the runner and CLI crates.

pub mod analytics;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod entities;
pub mod error;
pub mod export;
pub mod fleet;
pub mod identity;
pub mod notify;
pub mod referral;
pub mod seed;
pub mod simulator;
pub mod store;

pub use hoslink_types::{GeoPoint, NonEmptyText};

pub use analytics::{AnalyticsService, Kpis};
pub use config::CoreConfig;
pub use dispatch::DispatchCoordinator;
pub use entities::{
    Ambulance, AmbulanceStatus, Communication, HandoverForm, HandoverSnapshot, LocationUpdate,
    MessageKind, NewReferral, OffDutyStatus, Patient, PatientStatus, Referral, VitalSigns,
};
pub use error::{DispatchError, DispatchResult};
pub use fleet::AmbulanceService;
pub use identity::{
    Identity, IdentityProvider, RequestContext, Role, StaticIdentityProvider,
};
pub use notify::{LogNotifier, NotificationKind, Notifier};
pub use referral::ReferralService;
pub use simulator::RoutePlan;
pub use store::EntityStore;
