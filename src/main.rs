use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use hoslink_core::{
    seed, AmbulanceService, AnalyticsService, CoreConfig, DispatchCoordinator, EntityStore,
    IdentityProvider, LogNotifier, NewReferral, Notifier, ReferralService, RequestContext,
    StaticIdentityProvider,
};

/// Application state shared across REST API handlers.
///
/// Holds the store, the services over it, and the request context the
/// service operates under (resolved once at startup).
#[derive(Clone)]
struct AppState {
    store: EntityStore,
    referrals: ReferralService,
    analytics: AnalyticsService,
    coordinator: Arc<DispatchCoordinator>,
    ctx: RequestContext,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_patients,
        get_patient,
        create_referral,
        list_ambulances,
        latest_location,
        list_facilities,
        assign,
        start_mission,
        complete_mission,
        cancel_mission,
        kpis
    ),
    components(schemas(
        HealthRes,
        PatientRes,
        AmbulanceRes,
        LocationRes,
        FacilityRes,
        CreateReferralReq,
        AssignReq,
        KpisRes,
        ErrorRes
    ))
)]
struct ApiDoc;

/// Main entry point for the hoslink coordination service.
///
/// Loads the store from the data directory, seeds the ambulance fleet on
/// first start and serves the REST surface. On shutdown every active
/// mission simulation is cancelled and the store is snapshotted back to
/// disk.
///
/// # Environment Variables
/// - `HOSLINK_ADDR`: REST listen address (default: "0.0.0.0:3000")
/// - `HOSLINK_DATA_DIR`: store snapshot directory (default: "hoslink_data")
/// - `HOSLINK_USERNAME` / `HOSLINK_PASSWORD`: service account credentials
///   (default: the stock admin account)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hoslink=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("HOSLINK_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir = PathBuf::from(
        std::env::var("HOSLINK_DATA_DIR")
            .unwrap_or_else(|_| hoslink_core::constants::DEFAULT_DATA_DIR.into()),
    );
    let username = std::env::var("HOSLINK_USERNAME").unwrap_or_else(|_| "admin".into());
    let password = std::env::var("HOSLINK_PASSWORD").unwrap_or_else(|_| "admin123".into());

    let provider = StaticIdentityProvider::with_default_accounts();
    let identity = provider
        .authenticate(&username, &password)
        .ok_or_else(|| anyhow::anyhow!("invalid service account credentials"))?;
    let ctx = RequestContext::new(identity);

    let cfg = Arc::new(CoreConfig::with_defaults(data_dir.clone()));
    let store = EntityStore::load_from_dir(&data_dir)?;
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let referrals = ReferralService::new(store.clone(), notifier.clone());
    let ambulances = AmbulanceService::new(store.clone(), cfg.clone());
    let seeded = ambulances.seed_fleet()?;
    if seeded > 0 {
        tracing::info!(seeded, "ambulance fleet initialised");
    }
    let analytics = AnalyticsService::new(store.clone(), cfg.clone());
    let coordinator = Arc::new(DispatchCoordinator::new(
        store.clone(),
        referrals.clone(),
        ambulances,
        notifier,
        cfg,
    ));

    tracing::info!("++ Starting hoslink REST on {}", addr);

    let app = Router::new()
        .route("/health", get(health))
        .route("/patients", get(list_patients))
        .route("/patients", post(create_referral))
        .route("/patients/:patient_id", get(get_patient))
        .route("/ambulances", get(list_ambulances))
        .route("/ambulances/:ambulance_id/location", get(latest_location))
        .route("/facilities", get(list_facilities))
        .route("/assign", post(assign))
        .route("/missions/:ambulance_id/start", post(start_mission))
        .route("/missions/:ambulance_id/complete", post(complete_mission))
        .route("/missions/:ambulance_id/cancel", post(cancel_mission))
        .route("/kpis", get(kpis))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(AppState {
            store: store.clone(),
            referrals,
            analytics,
            coordinator: coordinator.clone(),
            ctx,
        });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.shutdown().await;
    store.save_to_dir(&data_dir)?;
    tracing::info!("store snapshot written; goodbye");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(serde::Serialize, ToSchema)]
struct HealthRes {
    status: String,
}

#[derive(serde::Serialize, ToSchema)]
struct PatientRes {
    patient_id: String,
    name: String,
    age: u32,
    condition: String,
    referring_hospital: String,
    receiving_hospital: String,
    referring_physician: String,
    receiving_physician: Option<String>,
    status: String,
    assigned_ambulance: Option<String>,
    referral_time: String,
    created_by: String,
}

impl From<hoslink_core::Patient> for PatientRes {
    fn from(patient: hoslink_core::Patient) -> Self {
        Self {
            patient_id: patient.patient_id,
            name: patient.name,
            age: patient.age,
            condition: patient.condition,
            referring_hospital: patient.referring_hospital,
            receiving_hospital: patient.receiving_hospital,
            referring_physician: patient.referring_physician,
            receiving_physician: patient.receiving_physician,
            status: patient.status.to_string(),
            assigned_ambulance: patient.assigned_ambulance,
            referral_time: patient.referral_time.to_rfc3339(),
            created_by: patient.created_by,
        }
    }
}

#[derive(serde::Serialize, ToSchema)]
struct AmbulanceRes {
    ambulance_id: String,
    driver_name: String,
    driver_contact: String,
    status: String,
    current_location: String,
    latitude: f64,
    longitude: f64,
    current_patient: Option<String>,
    destination: Option<String>,
}

impl From<hoslink_core::Ambulance> for AmbulanceRes {
    fn from(ambulance: hoslink_core::Ambulance) -> Self {
        Self {
            ambulance_id: ambulance.ambulance_id,
            driver_name: ambulance.driver_name,
            driver_contact: ambulance.driver_contact,
            status: ambulance.status.to_string(),
            current_location: ambulance.current_location,
            latitude: ambulance.position.lat(),
            longitude: ambulance.position.lng(),
            current_patient: ambulance.current_patient,
            destination: ambulance.destination,
        }
    }
}

#[derive(serde::Serialize, ToSchema)]
struct LocationRes {
    ambulance_id: String,
    latitude: f64,
    longitude: f64,
    location_name: String,
    patient_id: Option<String>,
    timestamp: String,
}

impl From<hoslink_core::LocationUpdate> for LocationRes {
    fn from(update: hoslink_core::LocationUpdate) -> Self {
        Self {
            ambulance_id: update.ambulance_id,
            latitude: update.position.lat(),
            longitude: update.position.lng(),
            location_name: update.location_name,
            patient_id: update.patient_id,
            timestamp: update.timestamp.to_rfc3339(),
        }
    }
}

#[derive(serde::Serialize, ToSchema)]
struct FacilityRes {
    name: String,
    facility_type: String,
    latitude: f64,
    longitude: f64,
    capacity: u32,
}

#[derive(serde::Deserialize, ToSchema)]
struct CreateReferralReq {
    name: String,
    age: u32,
    condition: String,
    referring_hospital: String,
    receiving_hospital: String,
    referring_physician: String,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(serde::Deserialize, ToSchema)]
struct AssignReq {
    patient_id: String,
    ambulance_id: String,
}

#[derive(serde::Serialize, ToSchema)]
struct KpisRes {
    total_referrals: usize,
    active_referrals: usize,
    available_ambulances: usize,
    avg_response_time_minutes: f64,
    completion_rate_percent: f64,
}

#[derive(serde::Serialize, ToSchema)]
struct ErrorRes {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorRes>);

fn api_error(err: hoslink_core::DispatchError) -> ApiError {
    use hoslink_core::DispatchError::*;
    let status = match &err {
        Validation(_) => StatusCode::BAD_REQUEST,
        NotFound { .. } => StatusCode::NOT_FOUND,
        InvalidState(_) | AmbulanceUnavailable { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(%err, "request failed");
    }
    (
        status,
        Json(ErrorRes {
            error: err.to_string(),
        }),
    )
}

// ============================================================================
// HANDLERS
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Health check response", body = HealthRes))
)]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        status: "ok".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/patients",
    responses((status = 200, description = "All patients", body = [PatientRes]))
)]
async fn list_patients(State(state): State<AppState>) -> Json<Vec<PatientRes>> {
    Json(
        state
            .store
            .patients()
            .into_iter()
            .map(PatientRes::from)
            .collect(),
    )
}

#[utoipa::path(
    get,
    path = "/patients/{patient_id}",
    params(("patient_id" = String, Path, description = "Patient ID")),
    responses(
        (status = 200, description = "Patient by ID", body = PatientRes),
        (status = 404, description = "Unknown patient", body = ErrorRes)
    )
)]
async fn get_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<PatientRes>, ApiError> {
    state
        .store
        .patient(&patient_id)
        .map(|patient| Json(PatientRes::from(patient)))
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorRes {
                    error: format!("patient not found: {patient_id}"),
                }),
            )
        })
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = CreateReferralReq,
    responses(
        (status = 201, description = "Referral created", body = PatientRes),
        (status = 400, description = "Invalid referral", body = ErrorRes)
    )
)]
async fn create_referral(
    State(state): State<AppState>,
    Json(req): Json<CreateReferralReq>,
) -> Result<(StatusCode, Json<PatientRes>), ApiError> {
    let patient = state
        .referrals
        .create(
            &state.ctx,
            NewReferral {
                name: req.name,
                age: req.age,
                condition: req.condition,
                referring_hospital: req.referring_hospital,
                receiving_hospital: req.receiving_hospital,
                referring_physician: req.referring_physician,
                notes: req.notes,
                ..Default::default()
            },
        )
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(PatientRes::from(patient))))
}

#[utoipa::path(
    get,
    path = "/ambulances",
    responses((status = 200, description = "The fleet", body = [AmbulanceRes]))
)]
async fn list_ambulances(State(state): State<AppState>) -> Json<Vec<AmbulanceRes>> {
    Json(
        state
            .store
            .ambulances()
            .into_iter()
            .map(AmbulanceRes::from)
            .collect(),
    )
}

#[utoipa::path(
    get,
    path = "/ambulances/{ambulance_id}/location",
    params(("ambulance_id" = String, Path, description = "Ambulance plate ID")),
    responses(
        (status = 200, description = "Latest recorded position", body = LocationRes),
        (status = 404, description = "No position on record", body = ErrorRes)
    )
)]
async fn latest_location(
    State(state): State<AppState>,
    Path(ambulance_id): Path<String>,
) -> Result<Json<LocationRes>, ApiError> {
    state
        .store
        .latest_location(&ambulance_id)
        .map(|update| Json(LocationRes::from(update)))
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorRes {
                    error: format!("no location updates for ambulance {ambulance_id}"),
                }),
            )
        })
}

#[utoipa::path(
    get,
    path = "/facilities",
    responses((status = 200, description = "Facility directory", body = [FacilityRes]))
)]
async fn list_facilities() -> Json<Vec<FacilityRes>> {
    Json(
        seed::facilities()
            .iter()
            .map(|f| FacilityRes {
                name: f.name.to_string(),
                facility_type: f.facility_type.to_string(),
                latitude: f.latitude,
                longitude: f.longitude,
                capacity: f.capacity,
            })
            .collect(),
    )
}

#[utoipa::path(
    post,
    path = "/assign",
    request_body = AssignReq,
    responses(
        (status = 200, description = "Ambulance assigned", body = PatientRes),
        (status = 404, description = "Unknown patient or ambulance", body = ErrorRes),
        (status = 409, description = "Ambulance unavailable", body = ErrorRes)
    )
)]
async fn assign(
    State(state): State<AppState>,
    Json(req): Json<AssignReq>,
) -> Result<Json<PatientRes>, ApiError> {
    state
        .coordinator
        .assign(&state.ctx, &req.patient_id, &req.ambulance_id)
        .map(|patient| Json(PatientRes::from(patient)))
        .map_err(api_error)
}

#[utoipa::path(
    post,
    path = "/missions/{ambulance_id}/start",
    params(("ambulance_id" = String, Path, description = "Ambulance plate ID")),
    responses(
        (status = 202, description = "Mission simulation started"),
        (status = 409, description = "No mission to start", body = ErrorRes)
    )
)]
async fn start_mission(
    State(state): State<AppState>,
    Path(ambulance_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .coordinator
        .start_mission(&state.ctx, &ambulance_id)
        .map(|()| StatusCode::ACCEPTED)
        .map_err(api_error)
}

#[utoipa::path(
    post,
    path = "/missions/{ambulance_id}/complete",
    params(("ambulance_id" = String, Path, description = "Ambulance plate ID")),
    responses(
        (status = 200, description = "Mission completed", body = PatientRes),
        (status = 409, description = "No current patient", body = ErrorRes)
    )
)]
async fn complete_mission(
    State(state): State<AppState>,
    Path(ambulance_id): Path<String>,
) -> Result<Json<PatientRes>, ApiError> {
    state
        .coordinator
        .complete_mission(&state.ctx, &ambulance_id)
        .map(|patient| Json(PatientRes::from(patient)))
        .map_err(api_error)
}

#[utoipa::path(
    post,
    path = "/missions/{ambulance_id}/cancel",
    params(("ambulance_id" = String, Path, description = "Ambulance plate ID")),
    responses((status = 200, description = "Whether a running mission was cancelled"))
)]
async fn cancel_mission(
    State(state): State<AppState>,
    Path(ambulance_id): Path<String>,
) -> Json<bool> {
    Json(state.coordinator.cancel_mission(&ambulance_id))
}

#[utoipa::path(
    get,
    path = "/kpis",
    responses((status = 200, description = "Network KPIs", body = KpisRes))
)]
async fn kpis(State(state): State<AppState>) -> Json<KpisRes> {
    let kpis = state.analytics.kpis();
    Json(KpisRes {
        total_referrals: kpis.total_referrals,
        active_referrals: kpis.active_referrals,
        available_ambulances: kpis.available_ambulances,
        avg_response_time_minutes: kpis.avg_response_time_minutes,
        completion_rate_percent: kpis.completion_rate_percent,
    })
}
