//! Dispatch lifecycle integration tests
//!
//! Each test drives a real [`DispatchService`] through its handle with
//! scripted collaborators and a paused clock:
//! - civilian and ambulance journeys end to end
//! - routing and geolocation fallbacks
//! - cancellation, stale work and re-entrancy
//! - phase guards and input validation

mod helpers;

use std::time::Duration;

use helpers::{RigBuilder, USER};
use sentinel_core::surface::{facility_marker, ROUTE_TO_FACILITY, ROUTE_TO_USER, USER_MARKER, VEHICLE_MARKER};
use sentinel_core::{RouteSource, SentinelError};
use sentinel_dispatch::testing::{ScriptedDiscovery, ScriptedLocation, ScriptedRouter};
use sentinel_dispatch::{DispatchError, DispatchEvent, LegKind, MapLayer, Mode, Phase};

#[tokio::test(start_paused = true)]
async fn test_civilian_journey_to_arrival() {
    let mut rig = RigBuilder::new().spawn();

    let snapshot = rig.handle.trigger_sos().await.unwrap();
    assert_eq!(snapshot.phase, Phase::PhoneCapture);
    assert_eq!(snapshot.user_location, USER);

    let snapshot = rig.handle.capture_phone("98765 43210").await.unwrap();
    assert_eq!(snapshot.phase, Phase::ModeSelect);
    assert_eq!(snapshot.phone.as_deref(), Some("9876543210"));

    let snapshot = rig.handle.choose_mode(Mode::Civilian).await.unwrap();
    assert_eq!(snapshot.phase, Phase::Scanning);

    let found = rig
        .wait_for(|e| matches!(e, DispatchEvent::FacilitiesFound { .. }))
        .await;
    let DispatchEvent::FacilitiesFound { facilities, .. } = found else {
        unreachable!()
    };
    assert_eq!(facilities.len(), 3);
    assert!(facilities.iter().all(|f| f.is_enriched()));
    let distances: Vec<_> = facilities.iter().filter_map(|f| f.road_distance_km).collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    for facility in &facilities {
        assert!(rig.surface.contains(&facility_marker(&facility.id)));
    }

    let nearest = facilities[0].id.clone();
    rig.handle.select_facility(&nearest).await.unwrap();
    let ready = rig
        .wait_for(|e| matches!(e, DispatchEvent::RouteReady { .. }))
        .await;
    let DispatchEvent::RouteReady {
        facility,
        to_user,
        to_facility,
        ..
    } = ready
    else {
        unreachable!()
    };
    assert_eq!(facility.id, nearest);
    assert!(to_user.is_none());
    assert_eq!(to_facility.map(|leg| leg.points), Some(20));
    assert!(rig.surface.contains(ROUTE_TO_FACILITY));
    assert!(!rig.surface.contains(&facility_marker(&facilities[1].id)));
    assert!(matches!(
        rig.surface.layer(&facility_marker(&nearest)),
        Some(MapLayer::Marker {
            kind: sentinel_core::MarkerKind::SelectedHospital,
            ..
        })
    ));

    let snapshot = rig.handle.start_navigation().await.unwrap();
    assert_eq!(snapshot.phase, Phase::Navigating);
    assert_eq!(snapshot.active_leg, Some(LegKind::ToFacility));

    let arrived = rig
        .wait_for(|e| matches!(e, DispatchEvent::Arrived { .. }))
        .await;
    let DispatchEvent::Arrived { facility, .. } = arrived else {
        unreachable!()
    };
    assert_eq!(facility.map(|f| f.id), Some(nearest));

    let snapshot = rig.handle.session().await.unwrap().unwrap();
    assert_eq!(snapshot.phase, Phase::Arrived);
    assert_eq!(snapshot.cursor, 20);

    rig.handle.acknowledge_arrival().await.unwrap();
    rig.wait_for(|e| matches!(e, DispatchEvent::Closed { .. }))
        .await;
    assert!(rig.handle.session().await.unwrap().is_none());
    assert!(rig.surface.is_empty());

    let stats = rig.handle.stats().await.unwrap();
    assert_eq!(stats.sessions_started, 1);
    assert_eq!(stats.arrivals, 1);
    assert!(stats.ticks_processed >= 7);
}

#[tokio::test(start_paused = true)]
async fn test_civilian_progress_follows_live_position() {
    let mut rig = RigBuilder::new().spawn();

    rig.handle.trigger_sos().await.unwrap();
    rig.handle.capture_phone("9876543210").await.unwrap();
    rig.handle.choose_mode(Mode::Civilian).await.unwrap();
    let DispatchEvent::FacilitiesFound { facilities, .. } = rig
        .wait_for(|e| matches!(e, DispatchEvent::FacilitiesFound { .. }))
        .await
    else {
        unreachable!()
    };
    rig.handle.select_facility(&facilities[0].id).await.unwrap();
    rig.wait_for(|e| matches!(e, DispatchEvent::RouteReady { .. }))
        .await;
    rig.handle.start_navigation().await.unwrap();

    // Jump the user most of the way along the route
    let destination = facilities[0].coordinate;
    let ahead = sentinel_dispatch::testing::interpolate(USER, destination, 20)[15];
    rig.location.set(ahead);

    let DispatchEvent::Progress { progress, .. } = rig
        .wait_for(|e| e.is_progress())
        .await
    else {
        unreachable!()
    };
    assert_eq!(progress.leg, LegKind::ToFacility);
    assert_eq!(progress.cursor, 15);
    assert!(matches!(
        rig.surface.layer(USER_MARKER),
        Some(MapLayer::Marker { at, .. }) if at == ahead
    ));
}

#[tokio::test(start_paused = true)]
async fn test_ambulance_journey_with_handover() {
    let mut rig = RigBuilder::new().stored_phone("9876543210").spawn();

    let snapshot = rig.handle.trigger_sos().await.unwrap();
    assert_eq!(snapshot.phase, Phase::ModeSelect);

    let snapshot = rig.handle.choose_mode(Mode::Ambulance).await.unwrap();
    assert_eq!(snapshot.phase, Phase::AwaitingUserConfirmation);
    let links = rig.alert.links();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].recipient, "919876543210");
    rig.wait_for(|e| matches!(e, DispatchEvent::AlertOpened { .. }))
        .await;

    let snapshot = rig.handle.confirm_alert_sent().await.unwrap();
    assert_eq!(snapshot.phase, Phase::Scanning);
    let origin = snapshot.dispatch_origin.unwrap();
    let km = USER.distance_km(&origin);
    assert!((2.0 - 1e-9..=5.0 + 1e-9).contains(&km), "origin {km} km away");
    assert!(rig.surface.contains(VEHICLE_MARKER));

    let DispatchEvent::FacilitiesFound { facilities, .. } = rig
        .wait_for(|e| matches!(e, DispatchEvent::FacilitiesFound { .. }))
        .await
    else {
        unreachable!()
    };
    rig.handle.select_facility(&facilities[0].id).await.unwrap();

    let DispatchEvent::RouteReady {
        to_user,
        to_facility,
        ..
    } = rig
        .wait_for(|e| matches!(e, DispatchEvent::RouteReady { .. }))
        .await
    else {
        unreachable!()
    };
    assert_eq!(to_user.map(|leg| leg.source), Some(RouteSource::Road));
    assert_eq!(to_facility.map(|leg| leg.source), Some(RouteSource::Road));
    assert!(rig.surface.contains(ROUTE_TO_USER));
    assert!(rig.surface.contains(ROUTE_TO_FACILITY));
    // three enrichment routes plus both legs
    assert_eq!(rig.router.calls(), 5);

    let snapshot = rig.handle.start_navigation().await.unwrap();
    assert_eq!(snapshot.active_leg, Some(LegKind::ToUser));
    assert_eq!(snapshot.position, Some(origin));

    let DispatchEvent::Progress { progress, .. } = rig
        .wait_for(|e| e.is_progress())
        .await
    else {
        unreachable!()
    };
    assert_eq!(progress.leg, LegKind::ToUser);
    assert_eq!(progress.cursor, 3);
    assert!(progress.next_turn.starts_with("Continue "));

    let DispatchEvent::LegHandover { instruction, .. } = rig
        .wait_for(|e| matches!(e, DispatchEvent::LegHandover { .. }))
        .await
    else {
        unreachable!()
    };
    assert_eq!(instruction, format!("Proceeding to {}", facilities[0].name));
    assert!(!rig.surface.contains(ROUTE_TO_USER));

    let DispatchEvent::Progress { progress, .. } = rig
        .wait_for(|e| e.is_progress())
        .await
    else {
        unreachable!()
    };
    assert_eq!(progress.leg, LegKind::ToFacility);
    assert_eq!(progress.cursor, 3);

    rig.wait_for(|e| matches!(e, DispatchEvent::Arrived { .. }))
        .await;
    let snapshot = rig.handle.session().await.unwrap().unwrap();
    assert_eq!(snapshot.phase, Phase::Arrived);

    // Arrived persists until acknowledged and no more ticks land
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(rig.drain().iter().all(|e| !e.is_progress()));
    assert_eq!(rig.handle.stats().await.unwrap().arrivals, 1);
}

#[tokio::test(start_paused = true)]
async fn test_routing_failure_falls_back_to_straight_lines() {
    let mut rig = RigBuilder::new()
        .router(ScriptedRouter::failing())
        .stored_phone("+44 7700 900123")
        .spawn();

    rig.handle.trigger_sos().await.unwrap();
    rig.handle.choose_mode(Mode::Ambulance).await.unwrap();
    rig.handle.confirm_alert_sent().await.unwrap();

    let DispatchEvent::FacilitiesFound { facilities, .. } = rig
        .wait_for(|e| matches!(e, DispatchEvent::FacilitiesFound { .. }))
        .await
    else {
        unreachable!()
    };
    assert!(facilities
        .iter()
        .all(|f| f.enrichment == Some(sentinel_core::EnrichmentSource::Estimate)));

    rig.handle.select_facility(&facilities[0].id).await.unwrap();
    let DispatchEvent::RouteReady {
        to_user,
        to_facility,
        ..
    } = rig
        .wait_for(|e| matches!(e, DispatchEvent::RouteReady { .. }))
        .await
    else {
        unreachable!()
    };

    for leg in [to_user.unwrap(), to_facility.unwrap()] {
        assert_eq!(leg.points, 2);
        assert_eq!(leg.source, RouteSource::StraightLine);
    }
    assert_eq!(rig.handle.stats().await.unwrap().routing_fallbacks, 2);
    assert_eq!(rig.alert.links()[0].recipient, "447700900123");

    // A two-point leg completes on the first tick
    rig.handle.start_navigation().await.unwrap();
    rig.wait_for(|e| matches!(e, DispatchEvent::LegHandover { .. }))
        .await;
    rig.wait_for(|e| matches!(e, DispatchEvent::Arrived { .. }))
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_movement() {
    let mut rig = RigBuilder::new().stored_phone("9876543210").spawn();

    rig.handle.trigger_sos().await.unwrap();
    rig.handle.choose_mode(Mode::Ambulance).await.unwrap();
    rig.handle.confirm_alert_sent().await.unwrap();
    let DispatchEvent::FacilitiesFound { facilities, .. } = rig
        .wait_for(|e| matches!(e, DispatchEvent::FacilitiesFound { .. }))
        .await
    else {
        unreachable!()
    };
    rig.handle.select_facility(&facilities[0].id).await.unwrap();
    rig.wait_for(|e| matches!(e, DispatchEvent::RouteReady { .. }))
        .await;
    rig.handle.start_navigation().await.unwrap();
    rig.wait_for(|e| e.is_progress()).await;

    rig.handle.cancel().await.unwrap();
    rig.wait_for(|e| matches!(e, DispatchEvent::Cancelled { .. }))
        .await;
    let processed = rig.handle.stats().await.unwrap().ticks_processed;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(rig.drain().iter().all(|e| !e.is_progress()));
    assert!(rig.surface.is_empty());
    assert!(rig.handle.session().await.unwrap().is_none());

    let stats = rig.handle.stats().await.unwrap();
    assert_eq!(stats.ticks_processed, processed);
    assert_eq!(stats.sessions_cancelled, 1);

    assert_eq!(rig.handle.cancel().await, Err(DispatchError::NoActiveSession));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_discards_pending_scan() {
    let mut rig = RigBuilder::new()
        .discovery(
            ScriptedDiscovery::new(sentinel_dispatch::testing::facilities_near(USER, 2))
                .with_delay(Duration::from_secs(5)),
        )
        .spawn();

    rig.handle.trigger_sos().await.unwrap();
    rig.handle.capture_phone("9876543210").await.unwrap();
    rig.handle.choose_mode(Mode::Civilian).await.unwrap();
    rig.handle.cancel().await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    let events = rig.drain();
    assert!(!events
        .iter()
        .any(|e| matches!(e, DispatchEvent::FacilitiesFound { .. })));
    assert!(rig.surface.is_empty());
    assert_eq!(rig.handle.stats().await.unwrap().stale_completions_dropped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_facilities_returns_to_idle_and_rescans() {
    let mut rig = RigBuilder::new()
        .discovery(ScriptedDiscovery::empty())
        .stored_phone("9876543210")
        .spawn();

    rig.handle.trigger_sos().await.unwrap();
    rig.handle.choose_mode(Mode::Civilian).await.unwrap();
    rig.wait_for(|e| matches!(e, DispatchEvent::NoFacilities { .. }))
        .await;

    let snapshot = rig.handle.session().await.unwrap().unwrap();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.mode, Mode::Civilian);
    assert!(snapshot.facilities.is_empty());

    let snapshot = rig.handle.rescan().await.unwrap();
    assert_eq!(snapshot.phase, Phase::Scanning);
    rig.wait_for(|e| matches!(e, DispatchEvent::NoFacilities { .. }))
        .await;
    assert_eq!(rig.discovery.calls(), 2);

    // Triggering again reuses the session and the contact
    let again = rig.handle.trigger_sos().await.unwrap();
    assert_eq!(again.id, snapshot.id);
    assert_eq!(again.phase, Phase::ModeSelect);
    assert_eq!(rig.handle.stats().await.unwrap().sessions_started, 1);
}

#[tokio::test(start_paused = true)]
async fn test_discovery_failure_is_an_empty_result() {
    let mut rig = RigBuilder::new()
        .discovery(ScriptedDiscovery::failing())
        .stored_phone("9876543210")
        .spawn();

    rig.handle.trigger_sos().await.unwrap();
    rig.handle.choose_mode(Mode::Civilian).await.unwrap();
    rig.wait_for(|e| matches!(e, DispatchEvent::NoFacilities { .. }))
        .await;
    assert_eq!(rig.router.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_phone_rejected() {
    let rig = RigBuilder::new().spawn();

    rig.handle.trigger_sos().await.unwrap();
    let err = rig.handle.capture_phone("12345").await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Core(SentinelError::InvalidPhoneNumber(_))
    ));
    assert_eq!(err.error_code(), "INVALID_PHONE_NUMBER");
    assert!(err.is_client_error());

    let snapshot = rig.handle.session().await.unwrap().unwrap();
    assert_eq!(snapshot.phase, Phase::PhoneCapture);
    assert!(snapshot.phone.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_captured_phone_is_persisted() {
    let rig = RigBuilder::new().spawn();

    rig.handle.trigger_sos().await.unwrap();
    rig.handle.capture_phone("(987) 654-3210").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    use sentinel_core::PhoneStore;
    let stored = rig.phones.load_phone().await.unwrap();
    assert_eq!(stored.map(|p| p.to_string()), Some("9876543210".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_trigger_is_idempotent() {
    let rig = RigBuilder::new().spawn();

    let first = rig.handle.trigger_sos().await.unwrap();
    let second = rig.handle.trigger_sos().await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.phase, Phase::PhoneCapture);
    assert_eq!(rig.handle.stats().await.unwrap().sessions_started, 1);
}

#[tokio::test(start_paused = true)]
async fn test_geolocation_failure_uses_default_location() {
    let mut rig = RigBuilder::new()
        .location(ScriptedLocation::unavailable())
        .spawn();

    let snapshot = rig.handle.trigger_sos().await.unwrap();
    assert_eq!(snapshot.user_location, rig.config.dispatch.default_location);

    let DispatchEvent::LocationFallback { location, .. } = rig
        .wait_for(|e| matches!(e, DispatchEvent::LocationFallback { .. }))
        .await
    else {
        unreachable!()
    };
    assert_eq!(location, rig.config.dispatch.default_location);
    assert_eq!(rig.handle.stats().await.unwrap().location_fallbacks, 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_geolocation_does_not_block_commands() {
    let mut rig = RigBuilder::new().location(ScriptedLocation::hanging()).spawn();
    let default_location = rig.config.dispatch.default_location;

    let handle = rig.handle.clone();
    let sos = tokio::spawn(async move { handle.trigger_sos().await });
    tokio::time::sleep(Duration::from_millis(1)).await;

    let started = tokio::time::Instant::now();
    let stats = rig.handle.stats().await.unwrap();
    assert!(rig.handle.session().await.unwrap().is_none());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(stats.sessions_started, 0);

    let DispatchEvent::LocationFallback {
        location, reason, ..
    } = rig
        .wait_for(|e| matches!(e, DispatchEvent::LocationFallback { .. }))
        .await
    else {
        unreachable!()
    };
    assert_eq!(location, default_location);
    assert!(reason.starts_with("timed out after"), "{reason}");

    let snapshot = sos.await.unwrap().unwrap();
    assert_eq!(snapshot.phase, Phase::PhoneCapture);
    assert_eq!(snapshot.user_location, default_location);
    assert_eq!(rig.handle.stats().await.unwrap().location_fallbacks, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_locating() {
    let mut rig = RigBuilder::new().location(ScriptedLocation::hanging()).spawn();

    let handle = rig.handle.clone();
    let first = tokio::spawn(async move { handle.trigger_sos().await });
    let handle = rig.handle.clone();
    let second = tokio::spawn(async move { handle.trigger_sos().await });
    tokio::time::sleep(Duration::from_millis(1)).await;

    let started = tokio::time::Instant::now();
    rig.handle.cancel().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    rig.wait_for(|e| matches!(e, DispatchEvent::Cancelled { .. }))
        .await;

    assert_eq!(first.await.unwrap().unwrap_err(), DispatchError::SosCancelled);
    assert_eq!(second.await.unwrap().unwrap_err(), DispatchError::SosCancelled);

    // The late fallback location belongs to nobody
    tokio::time::sleep(rig.config.dispatch.geolocation_timeout * 2).await;
    assert!(rig.handle.session().await.unwrap().is_none());
    let stats = rig.handle.stats().await.unwrap();
    assert_eq!(stats.sessions_started, 0);
    assert_eq!(stats.stale_completions_dropped, 1);
    assert!(rig
        .drain()
        .iter()
        .all(|e| !matches!(e, DispatchEvent::SessionStarted { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_empty_ambulance_scan_clears_vehicle() {
    let mut rig = RigBuilder::new()
        .discovery(ScriptedDiscovery::empty())
        .stored_phone("9876543210")
        .spawn();

    rig.handle.trigger_sos().await.unwrap();
    rig.handle.choose_mode(Mode::Ambulance).await.unwrap();
    rig.handle.confirm_alert_sent().await.unwrap();
    assert!(rig.surface.contains(VEHICLE_MARKER));

    rig.wait_for(|e| matches!(e, DispatchEvent::NoFacilities { .. }))
        .await;
    assert!(!rig.surface.contains(VEHICLE_MARKER));
    assert!(rig.surface.contains(USER_MARKER));
}

#[tokio::test(start_paused = true)]
async fn test_second_selection_while_routing_is_rejected() {
    let mut rig = RigBuilder::new()
        .router(ScriptedRouter::road(10).with_delay(Duration::from_secs(2)))
        .stored_phone("9876543210")
        .spawn();

    rig.handle.trigger_sos().await.unwrap();
    rig.handle.choose_mode(Mode::Civilian).await.unwrap();
    let DispatchEvent::FacilitiesFound { facilities, .. } = rig
        .wait_for(|e| matches!(e, DispatchEvent::FacilitiesFound { .. }))
        .await
    else {
        unreachable!()
    };

    let snapshot = rig.handle.select_facility(&facilities[0].id).await.unwrap();
    assert_eq!(snapshot.pending_facility.as_deref(), Some(facilities[0].id.as_str()));

    let err = rig.handle.select_facility(&facilities[1].id).await.unwrap_err();
    assert_eq!(err, DispatchError::TransitionInFlight);
    assert!(err.is_conflict());
    assert_eq!(rig.handle.rescan().await.unwrap_err(), DispatchError::TransitionInFlight);

    let DispatchEvent::RouteReady { facility, .. } = rig
        .wait_for(|e| matches!(e, DispatchEvent::RouteReady { .. }))
        .await
    else {
        unreachable!()
    };
    assert_eq!(facility.id, facilities[0].id);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_facility_rejected() {
    let mut rig = RigBuilder::new().stored_phone("9876543210").spawn();

    rig.handle.trigger_sos().await.unwrap();
    rig.handle.choose_mode(Mode::Civilian).await.unwrap();
    rig.wait_for(|e| matches!(e, DispatchEvent::FacilitiesFound { .. }))
        .await;

    let err = rig.handle.select_facility("osm-missing").await.unwrap_err();
    assert_eq!(err, DispatchError::UnknownFacility("osm-missing".into()));
    let snapshot = rig.handle.session().await.unwrap().unwrap();
    assert_eq!(snapshot.phase, Phase::FacilitySelectionPending);
    assert!(snapshot.pending_facility.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_phase_guards() {
    let rig = RigBuilder::new().spawn();

    assert_eq!(
        rig.handle.choose_mode(Mode::Civilian).await.unwrap_err(),
        DispatchError::NoActiveSession
    );

    rig.handle.trigger_sos().await.unwrap();
    let err = rig.handle.start_navigation().await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::InvalidTransition {
            from: Phase::PhoneCapture,
            ..
        }
    ));
    assert!(err.is_conflict());

    let err = rig.handle.choose_mode(Mode::None).await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidInput(_)));
    assert!(matches!(
        rig.handle.acknowledge_arrival().await.unwrap_err(),
        DispatchError::InvalidTransition { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_service() {
    let mut rig = RigBuilder::new().spawn();

    rig.handle.shutdown().await.unwrap();
    rig.wait_for(|e| matches!(e, DispatchEvent::Stopped)).await;

    let err = rig.handle.trigger_sos().await.unwrap_err();
    assert!(matches!(err, DispatchError::Channel(_)));
    assert_eq!(err.error_code(), "SERVICE_UNAVAILABLE");
}
