use clap::{Parser, Subcommand};
use hoslink_core::{
    constants::{DEFAULT_DATA_DIR, DEFAULT_LATITUDE, DEFAULT_LONGITUDE},
    export, seed, AmbulanceService, AnalyticsService, CoreConfig, DispatchCoordinator,
    EntityStore, GeoPoint, HandoverSnapshot, IdentityProvider, LogNotifier, NewReferral,
    OffDutyStatus, PatientStatus, ReferralService, RequestContext, StaticIdentityProvider,
    VitalSigns,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "hoslink")]
#[command(about = "Kisumu County referral and ambulance dispatch CLI")]
struct Cli {
    /// Directory holding the store snapshots
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
    /// Account username
    #[arg(long, default_value = "admin")]
    username: String,
    /// Account password
    #[arg(long, default_value = "admin123")]
    password: String,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed the ambulance fleet
    Seed,
    /// List all patients
    ListPatients,
    /// List all ambulances
    ListAmbulances,
    /// List the facility directory
    ListFacilities,
    /// Create a patient referral
    CreateReferral {
        name: String,
        age: u32,
        condition: String,
        referring_hospital: String,
        receiving_hospital: String,
        referring_physician: String,
        /// Clinical notes (optional)
        #[arg(long)]
        notes: Option<String>,
    },
    /// Assign an available ambulance to a patient
    Assign {
        patient_id: String,
        ambulance_id: String,
    },
    /// Move a patient forward along the referral path
    UpdateStatus {
        patient_id: String,
        /// Target status label, e.g. "Patient Picked Up"
        status: String,
    },
    /// Mark an ambulance's current mission delivered
    CompleteMission { ambulance_id: String },
    /// Record an ambulance's position manually
    UpdateLocation {
        ambulance_id: String,
        location_name: String,
        #[arg(long, default_value_t = DEFAULT_LATITUDE)]
        latitude: f64,
        #[arg(long, default_value_t = DEFAULT_LONGITUDE)]
        longitude: f64,
    },
    /// Take an ambulance off duty ("break" or "maintenance")
    SetOffDuty {
        ambulance_id: String,
        status: String,
    },
    /// Return an ambulance to Available
    ReleaseAmbulance { ambulance_id: String },
    /// Broadcast a driver emergency for an ambulance's active mission
    EmergencyAlert { ambulance_id: String },
    /// Record en-route vital signs for a patient
    UpdateVitals {
        patient_id: String,
        blood_pressure: String,
        heart_rate: u32,
        oxygen_saturation: u32,
        #[arg(long)]
        respiratory_rate: Option<u32>,
        /// Observations (optional)
        #[arg(long)]
        notes: Option<String>,
    },
    /// Record the handover for an arrived patient
    CompleteHandover {
        patient_id: String,
        receiving_physician: String,
        blood_pressure: String,
        heart_rate: u32,
        oxygen_saturation: u32,
        /// Handover notes (optional)
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show network KPIs
    Kpis,
    /// Show messages for a patient, newest first
    Communications { patient_id: String },
    /// Print the referrals report rows as JSON
    ExportReferrals,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let provider = StaticIdentityProvider::with_default_accounts();
    let identity = provider
        .authenticate(&cli.username, &cli.password)
        .ok_or("invalid credentials")?;
    let ctx = RequestContext::new(identity);

    let store = EntityStore::load_from_dir(&cli.data_dir)?;
    let cfg = Arc::new(CoreConfig::with_defaults(cli.data_dir.clone()));
    let notifier = Arc::new(LogNotifier);
    let referrals = ReferralService::new(store.clone(), notifier.clone());
    let ambulances = AmbulanceService::new(store.clone(), cfg.clone());
    let coordinator = DispatchCoordinator::new(
        store.clone(),
        referrals.clone(),
        ambulances.clone(),
        notifier,
        cfg.clone(),
    );

    match cli.command {
        Some(Commands::Seed) => {
            let inserted = ambulances.seed_fleet()?;
            if inserted == 0 {
                println!("Fleet already seeded.");
            } else {
                println!("Seeded {inserted} ambulances.");
            }
        }
        Some(Commands::ListPatients) => {
            let patients = store.patients();
            if patients.is_empty() {
                println!("No patients found.");
            }
            for patient in patients {
                println!(
                    "{}: {} ({}) {} -> {} [{}]",
                    patient.patient_id,
                    patient.name,
                    patient.condition,
                    patient.referring_hospital,
                    patient.receiving_hospital,
                    patient.status
                );
            }
        }
        Some(Commands::ListAmbulances) => {
            for ambulance in store.ambulances() {
                println!(
                    "{}: {} [{}] at {} (patient: {})",
                    ambulance.ambulance_id,
                    ambulance.driver_name,
                    ambulance.status,
                    ambulance.current_location,
                    ambulance.current_patient.as_deref().unwrap_or("none")
                );
            }
        }
        Some(Commands::ListFacilities) => {
            for facility in seed::facilities() {
                println!(
                    "{} [{}] ({:.4}, {:.4})",
                    facility.name, facility.facility_type, facility.latitude, facility.longitude
                );
            }
        }
        Some(Commands::CreateReferral {
            name,
            age,
            condition,
            referring_hospital,
            receiving_hospital,
            referring_physician,
            notes,
        }) => {
            let patient = referrals.create(
                &ctx,
                NewReferral {
                    name,
                    age,
                    condition,
                    referring_hospital,
                    receiving_hospital,
                    referring_physician,
                    notes,
                    ..Default::default()
                },
            )?;
            println!("Referral created. Patient ID: {}", patient.patient_id);
        }
        Some(Commands::Assign {
            patient_id,
            ambulance_id,
        }) => {
            let patient = coordinator.assign(&ctx, &patient_id, &ambulance_id)?;
            println!(
                "Assigned {} to {} [{}]",
                ambulance_id, patient.patient_id, patient.status
            );
        }
        Some(Commands::UpdateStatus { patient_id, status }) => {
            let target: PatientStatus = status.parse()?;
            let patient = referrals.transition(&ctx, &patient_id, target)?;
            println!("{} is now '{}'", patient.patient_id, patient.status);
        }
        Some(Commands::CompleteMission { ambulance_id }) => {
            let patient = coordinator.complete_mission(&ctx, &ambulance_id)?;
            println!(
                "Mission complete: {} is '{}', {} released",
                patient.patient_id, patient.status, ambulance_id
            );
        }
        Some(Commands::UpdateLocation {
            ambulance_id,
            location_name,
            latitude,
            longitude,
        }) => {
            let position = GeoPoint::new(latitude, longitude)?;
            let carrying = store
                .ambulance(&ambulance_id)
                .and_then(|a| a.current_patient);
            let update = ambulances.update_location(
                &ambulance_id,
                position,
                &location_name,
                carrying.as_deref(),
            )?;
            println!(
                "{} now at {} {}",
                ambulance_id, update.location_name, update.position
            );
        }
        Some(Commands::SetOffDuty {
            ambulance_id,
            status,
        }) => {
            let target = match status.trim().to_lowercase().as_str() {
                "break" | "on break" => OffDutyStatus::OnBreak,
                "maintenance" => OffDutyStatus::Maintenance,
                other => return Err(format!("unknown off-duty status: {other}").into()),
            };
            let ambulance = ambulances.set_off_duty(&ambulance_id, target)?;
            println!("{} is now '{}'", ambulance.ambulance_id, ambulance.status);
        }
        Some(Commands::ReleaseAmbulance { ambulance_id }) => {
            let ambulance = ambulances.release(&ambulance_id)?;
            println!("{} is now '{}'", ambulance.ambulance_id, ambulance.status);
        }
        Some(Commands::EmergencyAlert { ambulance_id }) => {
            coordinator.send_emergency_alert(&ctx, &ambulance_id)?;
            println!("Emergency alert sent for {ambulance_id}.");
        }
        Some(Commands::UpdateVitals {
            patient_id,
            blood_pressure,
            heart_rate,
            oxygen_saturation,
            respiratory_rate,
            notes,
        }) => {
            referrals.update_vitals(
                &ctx,
                &patient_id,
                VitalSigns {
                    blood_pressure,
                    heart_rate,
                    oxygen_saturation,
                    temperature_celsius: None,
                    respiratory_rate,
                    notes,
                    recorded_at: chrono::Utc::now(),
                },
            )?;
            println!("Vitals recorded for {patient_id}; hospitals notified.");
        }
        Some(Commands::CompleteHandover {
            patient_id,
            receiving_physician,
            blood_pressure,
            heart_rate,
            oxygen_saturation,
            notes,
        }) => {
            let form = referrals.complete_handover(
                &ctx,
                &patient_id,
                HandoverSnapshot {
                    vital_signs: VitalSigns {
                        blood_pressure,
                        heart_rate,
                        oxygen_saturation,
                        temperature_celsius: None,
                        respiratory_rate: None,
                        notes: None,
                        recorded_at: chrono::Utc::now(),
                    },
                    receiving_physician,
                    notes,
                },
            )?;
            println!("Handover {} recorded for {}", form.id, form.patient_id);
        }
        Some(Commands::Kpis) => {
            let analytics = AnalyticsService::new(store.clone(), cfg);
            let kpis = analytics.kpis();
            println!("Total referrals:      {}", kpis.total_referrals);
            println!("Active referrals:     {}", kpis.active_referrals);
            println!("Available ambulances: {}", kpis.available_ambulances);
            println!(
                "Avg response time:    {:.1} min",
                kpis.avg_response_time_minutes
            );
            println!(
                "Completion rate:      {:.1}%",
                kpis.completion_rate_percent
            );
        }
        Some(Commands::Communications { patient_id }) => {
            let messages = store.communications_for_patient(&patient_id);
            if messages.is_empty() {
                println!("No messages for {patient_id}.");
            }
            for message in messages {
                println!(
                    "[{}] {} -> {}: {}",
                    message.timestamp.format("%Y-%m-%d %H:%M"),
                    message.sender,
                    message.receiver,
                    message.message
                );
            }
        }
        Some(Commands::ExportReferrals) => {
            let rows = export::referral_rows(&store);
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        None => {
            println!("No command given. Try `hoslink --help`.");
        }
    }

    store.save_to_dir(&cli.data_dir)?;
    Ok(())
}
