//! End-to-end dispatch tests through the SDK.
//!
//! Run with: cargo test --test dispatch_test -- --ignored
//!
//! Note: Requires a running PulseWay server at http://localhost:3000
//! or set PULSEWAY_TEST_URL environment variable.

use std::time::Duration;

use chrono::Utc;
use pulseway_core::{Coordinate, VehiclePosition};
use pulseway_sdk::PulseClient;

fn base_url() -> String {
    std::env::var("PULSEWAY_TEST_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

fn unique_name(prefix: &str) -> String {
    format!("{} {}", prefix, Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

#[tokio::test]
#[ignore] // Run only when server is running
async fn test_inform_and_remove_round_trip() {
    let base = base_url();
    let name = unique_name("General");
    let hospital = PulseClient::new(&base);
    let facility = hospital
        .register_facility(&name, Coordinate::new(12.9, 77.6))
        .await
        .expect("register facility");

    let mut ambulance = PulseClient::new(&base);
    let registration = ambulance.register().await.expect("register vehicle");
    let position = VehiclePosition::new(&registration.vehicle_id, Coordinate::new(12.95, 77.65));
    assert!(ambulance.send_position(&position).await.expect("send position"));

    let link = ambulance
        .inform(&name.to_uppercase(), None)
        .await
        .expect("inform");
    assert_eq!(link.facility_id, facility.facility_id);

    let roster = hospital.roster(&facility.facility_id).await.expect("roster");
    assert_eq!(roster.entries.len(), 1);
    assert_eq!(roster.entries[0].label, "7.76 KM");

    hospital
        .remove_link(&facility.facility_id, &registration.vehicle_id)
        .await
        .expect("remove");
    assert!(hospital
        .remove_link(&facility.facility_id, &registration.vehicle_id)
        .await
        .is_err());
}

#[tokio::test]
#[ignore]
async fn test_duplicate_facility_is_rejected() {
    let base = base_url();
    let name = unique_name("City Care");
    let client = PulseClient::new(&base);
    client
        .register_facility(&name, Coordinate::new(1.0, 1.0))
        .await
        .expect("first registration");

    let err = client
        .register_facility(&format!("  {}  ", name.to_lowercase()), Coordinate::new(1.0, 1.0))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("409"));
}

#[tokio::test]
#[ignore]
async fn test_position_stream_delivers_updates() {
    let base = base_url();
    let mut ambulance = PulseClient::new(&base);
    let registration = ambulance.register().await.expect("register vehicle");

    let mut stream = ambulance
        .connect_position_stream(Some(&registration.vehicle_id))
        .await
        .expect("connect stream");

    let position = VehiclePosition::new(&registration.vehicle_id, Coordinate::new(0.5, 0.5));
    ambulance.send_position(&position).await.expect("send position");

    let received = tokio::time::timeout(Duration::from_secs(5), stream.next_position())
        .await
        .expect("timed out")
        .expect("stream error")
        .expect("stream closed");
    assert_eq!(received.vehicle_id, registration.vehicle_id);
    assert_eq!(received.coordinate, Coordinate::new(0.5, 0.5));

    assert_eq!(ambulance.end_session().await.expect("end session"), 0);
}
