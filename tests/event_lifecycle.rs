//! End-to-end event lifecycle against a simulated zone.

mod common;

use common::{Harness, event, t0, test_config};
use dr_coordinator::dr::{CancelOutcome, EventPhase, RegisterOutcome};
use dr_coordinator::points::WriteValue;

#[tokio::test(start_paused = true)]
async fn accepted_event_activates_and_ends_on_time() {
    let h = Harness::start(&test_config(), 700.0).await;
    let scheduler = h.coordinator.scheduler();

    // Registered a minute ahead of its start.
    let outcome = scheduler.register(event("e1", 60, 300, 1.0)).await;
    assert_eq!(outcome, RegisterOutcome::Accepted);

    h.at(30).await;
    let status = h.coordinator.status().await;
    assert!(!status.dr_active);
    assert_eq!(status.scheduled_events.len(), 1);
    assert_eq!(status.scheduled_events[0].phase, EventPhase::Pending);

    h.at(61).await;
    let status = h.coordinator.status().await;
    assert!(status.dr_active);
    assert_eq!(status.current_payload, 1.0);
    assert_eq!(status.scheduled_events[0].phase, EventPhase::Active);
    assert_eq!(h.held(&h.zone.shade_dr_level.point).await, Some(1.0));
    // Cooling: setpoint raised by the delta.
    assert_eq!(h.held(&h.zone.setpoint.point).await, Some(73.5));
    assert_eq!(h.gateway.present_value(&h.zone.setpoint.point).await, Some(73.5));

    h.at(361).await;
    let status = h.coordinator.status().await;
    assert!(!status.dr_active);
    assert_eq!(status.current_payload, 0.0);
    assert!(status.scheduled_events.is_empty());
    assert_eq!(h.held(&h.zone.setpoint.point).await, None);
    assert_eq!(h.gateway.present_value(&h.zone.setpoint.point).await, Some(72.0));
    assert_eq!(h.held(&h.zone.shade_dr_level.point).await, Some(0.0));
    assert!(!status.override_error);

    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn overlapping_and_past_events_are_rejected() {
    let h = Harness::start(&test_config(), 700.0).await;
    let scheduler = h.coordinator.scheduler();

    scheduler.register(event("e1", 60, 300, 1.0)).await;
    let overlap = scheduler.register(event("e2", 300, 300, 2.0)).await;
    assert_eq!(
        overlap,
        RegisterOutcome::RejectedOverlap {
            conflicting: "e1".to_string()
        }
    );

    // Still rejected once e1 is in force.
    h.at(61).await;
    let overlap = scheduler.register(event("e2", 120, 600, 2.0)).await;
    assert_eq!(
        overlap,
        RegisterOutcome::RejectedOverlap {
            conflicting: "e1".to_string()
        }
    );

    let past = scheduler.register(event("old", -600, 300, 1.0)).await;
    assert_eq!(past, RegisterOutcome::RejectedPast);

    let ids: Vec<String> = h
        .coordinator
        .status()
        .await
        .scheduled_events
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["e1".to_string()]);

    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn event_already_in_progress_activates_immediately() {
    let h = Harness::start(&test_config(), 700.0).await;
    h.at(5).await;

    let outcome = h
        .coordinator
        .scheduler()
        .register(event("late", -60, 300, 2.0))
        .await;
    assert_eq!(outcome, RegisterOutcome::Accepted);

    h.at(6).await;
    let status = h.coordinator.status().await;
    assert!(status.dr_active);
    assert_eq!(status.current_payload, 2.0);

    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn back_to_back_events_hand_over_cleanly() {
    let h = Harness::start(&test_config(), 700.0).await;
    let scheduler = h.coordinator.scheduler();
    assert_eq!(
        scheduler.register(event("e1", 60, 300, 1.0)).await,
        RegisterOutcome::Accepted
    );
    assert_eq!(
        scheduler.register(event("e2", 360, 300, 2.0)).await,
        RegisterOutcome::Accepted
    );

    h.at(361).await;
    let status = h.coordinator.status().await;
    assert!(status.dr_active);
    assert_eq!(status.current_payload, 2.0);
    let ids: Vec<String> = status.scheduled_events.into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["e2".to_string()]);

    // e1's release ran before e2's override, so the adjustment starts from
    // the device's own setpoint rather than compounding.
    assert_eq!(h.held(&h.zone.setpoint.point).await, Some(73.5));
    assert_eq!(h.held(&h.zone.shade_dr_level.point).await, Some(2.0));

    let journal = h.gateway.journal().await;
    let dr_levels: Vec<WriteValue> = journal
        .iter()
        .filter(|w| w.point == h.zone.shade_dr_level.point)
        .map(|w| w.value)
        .collect();
    let handover = dr_levels
        .windows(3)
        .any(|w| w == [WriteValue::Value(1.0), WriteValue::Value(0.0), WriteValue::Value(2.0)]);
    assert!(handover, "expected 1 -> 0 -> 2 on the DR level, got {dr_levels:?}");

    h.at(661).await;
    let status = h.coordinator.status().await;
    assert!(!status.dr_active);
    assert!(status.scheduled_events.is_empty());

    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cancelling_an_active_event_releases_overrides() {
    let h = Harness::start(&test_config(), 700.0).await;
    let scheduler = h.coordinator.scheduler();
    scheduler.register(event("e1", 60, 300, 1.0)).await;

    h.at(90).await;
    assert_eq!(h.held(&h.zone.setpoint.point).await, Some(73.5));

    assert_eq!(scheduler.cancel("e1").await, CancelOutcome::CancelledActive);
    // The release tick has run by the time cancel returns.
    assert_eq!(h.held(&h.zone.setpoint.point).await, None);
    let status = h.coordinator.status().await;
    assert!(!status.dr_active);
    assert!(status.scheduled_events.is_empty());

    assert_eq!(scheduler.cancel("e1").await, CancelOutcome::Unknown);

    // The disarmed deactivation timer does nothing later on.
    let writes = h.gateway.write_count().await;
    h.at(400).await;
    assert_eq!(h.gateway.write_count().await, writes);

    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_pending_event_never_activates_it() {
    let h = Harness::start(&test_config(), 700.0).await;
    let scheduler = h.coordinator.scheduler();
    scheduler.register(event("e1", 60, 300, 1.0)).await;

    assert_eq!(scheduler.cancel("e1").await, CancelOutcome::CancelledPending);
    h.at(120).await;
    assert!(!h.coordinator.status().await.dr_active);
    assert_eq!(h.held(&h.zone.setpoint.point).await, None);

    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_an_event_releases_overrides() {
    let h = Harness::start(&test_config(), 700.0).await;
    h.coordinator
        .scheduler()
        .register(event("e1", 60, 300, 1.0))
        .await;

    h.at(90).await;
    assert_eq!(h.held(&h.zone.setpoint.point).await, Some(73.5));

    let gateway = h.gateway.clone();
    let setpoint = h.zone.setpoint.point.clone();
    let history = h.coordinator.shutdown().await;
    assert!(!history.is_empty());
    assert!(history.iter().any(|s| s.dr_active));
    assert_eq!(gateway.present_value(&setpoint).await, Some(72.0));
}

#[tokio::test(start_paused = true)]
async fn status_history_follows_the_report_cadence() {
    let h = Harness::start(&test_config(), 700.0).await;
    h.coordinator
        .scheduler()
        .register(event("e1", 65, 50, 1.0))
        .await;

    h.at(125).await;
    let history = h.coordinator.history();
    let history = history.lock().await;
    // Reports at 0, 10, ..., 120.
    assert_eq!(history.len(), 13);
    let active: Vec<i64> = history
        .to_vec()
        .iter()
        .filter(|s| s.dr_active)
        .map(|s| (s.at - t0()).num_seconds())
        .collect();
    assert_eq!(active, vec![70, 80, 90, 100, 110]);
}
