//! Static reference data for the Kisumu County network.
//!
//! The facility directory backs coordinate stamping on new referrals and
//! destination lookup for route planning. The fleet table seeds the
//! ambulance store on first start; vehicles are created at initialisation
//! and never destroyed.

use crate::entities::{Ambulance, AmbulanceStatus};
use crate::error::{DispatchError, DispatchResult};
use chrono::Utc;
use hoslink_types::{GeoPoint, TypeError};

/// One entry of the county facility directory.
#[derive(Clone, Copy, Debug)]
pub struct Facility {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub facility_type: &'static str,
    pub capacity: u32,
}

impl Facility {
    /// The facility's coordinates as a validated point.
    pub fn position(&self) -> Result<GeoPoint, TypeError> {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Registered health facilities of the county network.
pub fn facilities() -> &'static [Facility] {
    &FACILITIES
}

/// Looks up a facility by its exact directory name.
pub fn find_facility(name: &str) -> Option<&'static Facility> {
    FACILITIES.iter().find(|f| f.name == name)
}

const FACILITIES: [Facility; 40] = [
    Facility {
        name: "Jaramogi Oginga Odinga Teaching & Referral Hospital (JOOTRH)",
        latitude: -0.0754,
        longitude: 34.7695,
        facility_type: "Referral Hospital",
        capacity: 500,
    },
    Facility {
        name: "Kisumu County Referral Hospital",
        latitude: -0.0754,
        longitude: 34.7695,
        facility_type: "Referral Hospital",
        capacity: 400,
    },
    Facility {
        name: "Lumumba Sub-County Hospital",
        latitude: -0.1058,
        longitude: 34.7568,
        facility_type: "Sub-County Hospital",
        capacity: 100,
    },
    Facility {
        name: "Ahero Sub-County Hospital",
        latitude: -0.1743,
        longitude: 34.9169,
        facility_type: "Sub-County Hospital",
        capacity: 100,
    },
    Facility {
        name: "Kombewa Sub-County / District Hospital",
        latitude: -0.1813,
        longitude: 34.6326,
        facility_type: "Sub-County Hospital",
        capacity: 100,
    },
    Facility {
        name: "Muhoroni County Hospital",
        latitude: -0.1551,
        longitude: 35.1985,
        facility_type: "County Hospital",
        capacity: 75,
    },
    Facility {
        name: "Nyakach Sub-County Hospital",
        latitude: -0.2670,
        longitude: 35.0569,
        facility_type: "Sub-County Hospital",
        capacity: 75,
    },
    Facility {
        name: "Chulaimbo Sub-County Hospital",
        latitude: -0.1848,
        longitude: 34.6163,
        facility_type: "Sub-County Hospital",
        capacity: 78,
    },
    Facility {
        name: "Masogo Sub-County (Sub-District) Hospital",
        latitude: -0.1855,
        longitude: 35.0386,
        facility_type: "Sub-County Hospital",
        capacity: 77,
    },
    Facility {
        name: "Nyando District Hospital",
        latitude: -0.3573,
        longitude: 35.0006,
        facility_type: "District Hospital",
        capacity: 80,
    },
    Facility {
        name: "Ober Kamoth Sub-County Hospital",
        latitude: -0.3789,
        longitude: 35.0299,
        facility_type: "Sub-County Hospital",
        capacity: 70,
    },
    Facility {
        name: "Rabuor Sub-County Hospital",
        latitude: -0.2138,
        longitude: 34.8817,
        facility_type: "Sub-County Hospital",
        capacity: 60,
    },
    Facility {
        name: "Nyangoma Sub-County Hospital",
        latitude: -0.1625,
        longitude: 34.7794,
        facility_type: "Sub-County Hospital",
        capacity: 65,
    },
    Facility {
        name: "Nyahera Sub-County Hospital",
        latitude: -0.1565,
        longitude: 34.7508,
        facility_type: "Sub-County Hospital",
        capacity: 50,
    },
    Facility {
        name: "Katito Sub-County Hospital",
        latitude: -0.4533,
        longitude: 34.9561,
        facility_type: "Sub-County Hospital",
        capacity: 52,
    },
    Facility {
        name: "Gita Sub-County Hospital",
        latitude: -0.3735,
        longitude: 34.9676,
        facility_type: "Sub-County Hospital",
        capacity: 40,
    },
    Facility {
        name: "Masogo Health Centre",
        latitude: -0.1855,
        longitude: 35.0386,
        facility_type: "Health Centre",
        capacity: 42,
    },
    Facility {
        name: "Victoria Hospital (public) Kisumu",
        latitude: -0.0878,
        longitude: 34.7686,
        facility_type: "Private Hospital",
        capacity: 30,
    },
    Facility {
        name: "Kodiaga Prison Health Centre",
        latitude: -0.0607,
        longitude: 34.7509,
        facility_type: "Prison Health Centre",
        capacity: 35,
    },
    Facility {
        name: "Kisumu District Hospital",
        latitude: -0.0916,
        longitude: 34.7647,
        facility_type: "District Hospital",
        capacity: 20,
    },
    Facility {
        name: "Migosi Health Centre",
        latitude: -0.1073,
        longitude: 34.7794,
        facility_type: "Health Centre",
        capacity: 20,
    },
    Facility {
        name: "Katito Health Centre",
        latitude: -0.4533,
        longitude: 34.9561,
        facility_type: "Health Centre",
        capacity: 25,
    },
    Facility {
        name: "Mbaka Oromo Health Centre",
        latitude: -0.2628,
        longitude: 34.6061,
        facility_type: "Health Centre",
        capacity: 15,
    },
    Facility {
        name: "Migere Health Centre",
        latitude: -0.1225,
        longitude: 34.7553,
        facility_type: "Health Centre",
        capacity: 24,
    },
    Facility {
        name: "Milenye Health Centre",
        latitude: -0.1872,
        longitude: 34.7781,
        facility_type: "Health Centre",
        capacity: 15,
    },
    Facility {
        name: "Minyange Dispensary",
        latitude: -0.2192,
        longitude: 34.8331,
        facility_type: "Dispensary",
        capacity: 10,
    },
    Facility {
        name: "Nduru Kadero Health Centre",
        latitude: -0.1356,
        longitude: 34.7381,
        facility_type: "Health Centre",
        capacity: 19,
    },
    Facility {
        name: "Newa Dispensary",
        latitude: -0.2014,
        longitude: 34.8289,
        facility_type: "Dispensary",
        capacity: 5,
    },
    Facility {
        name: "Nyakoko Dispensary",
        latitude: -0.2678,
        longitude: 34.9981,
        facility_type: "Dispensary",
        capacity: 19,
    },
    Facility {
        name: "Ojola Sub-County Hospital",
        latitude: -0.1578,
        longitude: 34.8419,
        facility_type: "Sub-County Hospital",
        capacity: 10,
    },
    Facility {
        name: "Simba Opepo Health Centre",
        latitude: -0.3381,
        longitude: 34.9456,
        facility_type: "Health Centre",
        capacity: 5,
    },
    Facility {
        name: "Songhor Health Centre",
        latitude: -0.2131,
        longitude: 35.1611,
        facility_type: "Health Centre",
        capacity: 15,
    },
    Facility {
        name: "St Marks Lela Health Centre",
        latitude: -0.0803,
        longitude: 34.6569,
        facility_type: "Health Centre",
        capacity: 17,
    },
    Facility {
        name: "Maseno University Health Centre",
        latitude: -0.0025,
        longitude: 34.6053,
        facility_type: "University Health Centre",
        capacity: 16,
    },
    Facility {
        name: "Geta Health Centre",
        latitude: -0.4739,
        longitude: 34.9519,
        facility_type: "Health Centre",
        capacity: 45,
    },
    Facility {
        name: "Kadinda Health Centre",
        latitude: -0.2167,
        longitude: 34.8419,
        facility_type: "Health Centre",
        capacity: 30,
    },
    Facility {
        name: "Kochieng Health Centre",
        latitude: -0.3658,
        longitude: 34.9606,
        facility_type: "Health Centre",
        capacity: 29,
    },
    Facility {
        name: "Kodingo Health Centre",
        latitude: -0.0956,
        longitude: 34.7658,
        facility_type: "Health Centre",
        capacity: 55,
    },
    Facility {
        name: "Kolenyo Health Centre",
        latitude: -0.4536,
        longitude: 34.9564,
        facility_type: "Health Centre",
        capacity: 30,
    },
    Facility {
        name: "Kandu Health Centre",
        latitude: -0.2314,
        longitude: 34.8489,
        facility_type: "Health Centre",
        capacity: 30,
    },
];

struct FleetEntry {
    plate: &'static str,
    base: &'static str,
    latitude: f64,
    longitude: f64,
    driver_name: &'static str,
    driver_contact: &'static str,
}

const JOOTRH: &str = "Jaramogi Oginga Odinga Teaching & Referral Hospital (JOOTRH)";
const KCRH: &str = "Kisumu County Referral Hospital";

const FLEET: [FleetEntry; 20] = [
    FleetEntry { plate: "KBA 453D", base: JOOTRH, latitude: -0.0754, longitude: 34.7695, driver_name: "John Omondi", driver_contact: "+254712345678" },
    FleetEntry { plate: "KBC 217F", base: JOOTRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Mary Achieng", driver_contact: "+254723456789" },
    FleetEntry { plate: "KBD 389G", base: JOOTRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Paul Otieno", driver_contact: "+254734567890" },
    FleetEntry { plate: "KBE 142H", base: JOOTRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Susan Akinyi", driver_contact: "+254745678901" },
    FleetEntry { plate: "KBF 561J", base: JOOTRH, latitude: -0.0754, longitude: 34.7695, driver_name: "David Owino", driver_contact: "+254756789012" },
    FleetEntry { plate: "KBG 774K", base: JOOTRH, latitude: -0.0754, longitude: 34.7695, driver_name: "James Okoth", driver_contact: "+254767890123" },
    FleetEntry { plate: "KBH 238L", base: JOOTRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Grace Atieno", driver_contact: "+254778901234" },
    FleetEntry { plate: "KBJ 965M", base: JOOTRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Peter Onyango", driver_contact: "+254789012345" },
    FleetEntry { plate: "KBK 482N", base: JOOTRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Alice Adhiambo", driver_contact: "+254790123456" },
    FleetEntry { plate: "KBL 751P", base: JOOTRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Robert Ochieng", driver_contact: "+254701234567" },
    FleetEntry { plate: "KBM 312Q", base: KCRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Sarah Nyongesa", driver_contact: "+254712345679" },
    FleetEntry { plate: "KBN 864R", base: KCRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Michael Odhiambo", driver_contact: "+254723456780" },
    FleetEntry { plate: "KBP 459S", base: KCRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Elizabeth Awuor", driver_contact: "+254734567891" },
    FleetEntry { plate: "KBQ 287T", base: KCRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Daniel Omondi", driver_contact: "+254745678902" },
    FleetEntry { plate: "KBR 913U", base: KCRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Lucy Anyango", driver_contact: "+254756789013" },
    FleetEntry { plate: "KBS 506V", base: KCRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Brian Ouma", driver_contact: "+254767890124" },
    FleetEntry { plate: "KBT 678W", base: KCRH, latitude: -0.0754, longitude: 34.7695, driver_name: "Patricia Adongo", driver_contact: "+254778901235" },
    FleetEntry { plate: "KBU 134X", base: "Lumumba Sub-County Hospital", latitude: -0.1058, longitude: 34.7568, driver_name: "Samuel Owuor", driver_contact: "+254789012346" },
    FleetEntry { plate: "KBV 925Y", base: "Lumumba Sub-County Hospital", latitude: -0.1058, longitude: 34.7568, driver_name: "Rebecca Aoko", driver_contact: "+254790123457" },
    FleetEntry { plate: "KBX 743Z", base: "Ahero Sub-County Hospital", latitude: -0.1743, longitude: 34.9169, driver_name: "Kevin Onyango", driver_contact: "+254701234568" },
];

/// Builds the initial fleet, every vehicle `Available` at its base station.
pub fn fleet() -> DispatchResult<Vec<Ambulance>> {
    let now = Utc::now();
    FLEET
        .iter()
        .map(|entry| {
            let position = GeoPoint::new(entry.latitude, entry.longitude)
                .map_err(|e| DispatchError::Validation(e.to_string()))?;
            Ok(Ambulance {
                ambulance_id: entry.plate.to_string(),
                current_location: entry.base.to_string(),
                position,
                status: AmbulanceStatus::Available,
                driver_name: entry.driver_name.to_string(),
                driver_contact: entry.driver_contact.to_string(),
                current_patient: None,
                destination: None,
                estimated_arrival: None,
                last_location_update: now,
            })
        })
        .collect()
}
