mod common;

use std::sync::Arc;
use std::time::Duration;

use live_overlay::pipeline::{ConnectionEvent, ConnectionManager, ConnectionState};
use live_overlay::transport::SyntheticTransport;
use live_overlay::Device;

use common::{quick_transport, StateLog};

use ConnectionState::{Connected, Connecting, Failed, Idle};

const RETRY_DELAY: Duration = Duration::from_secs(2);

fn manager() -> (ConnectionManager<SyntheticTransport>, Arc<SyntheticTransport>, StateLog) {
    let transport = Arc::new(SyntheticTransport::new(quick_transport()));
    let log = StateLog::default();
    let manager =
        ConnectionManager::new(Arc::clone(&transport), RETRY_DELAY).with_observer(log.observer());
    (manager, transport, log)
}

async fn next_event(
    manager: &mut ConnectionManager<SyntheticTransport>,
) -> Option<ConnectionEvent> {
    let outcome = manager.recv().await;
    manager.apply(outcome)
}

#[tokio::test(start_paused = true)]
async fn disconnect_when_idle_is_a_noop() {
    let (mut manager, transport, log) = manager();
    manager.disconnect();
    manager.disconnect();
    assert_eq!(manager.state(), Idle);
    assert!(log.states().is_empty());
    assert_eq!(transport.stats().closed_total, 0);
}

#[tokio::test(start_paused = true)]
async fn connect_reports_each_transition_and_disconnect_releases_session() {
    let (mut manager, transport, log) = manager();
    let device = Device::new("cam-1", "Front door");

    manager.connect(&device, 1);
    assert_eq!(manager.state(), Connecting);

    match next_event(&mut manager).await {
        Some(ConnectionEvent::Connected {
            generation, device, ..
        }) => {
            assert_eq!(generation, 1);
            assert_eq!(device.id.as_str(), "cam-1");
        }
        _ => panic!("expected a connected event"),
    }
    assert_eq!(log.states(), vec![Connecting, Connected]);
    assert_eq!(transport.open_sessions(), 1);
    assert!(manager.connection().and_then(|c| c.handle()).is_some());

    manager.disconnect();
    assert_eq!(log.states(), vec![Connecting, Connected, Idle]);
    assert_eq!(transport.open_sessions(), 0);
    assert!(manager.connection().is_none());
}

#[tokio::test(start_paused = true)]
async fn reconnect_tears_down_the_previous_session_first() {
    let (mut manager, transport, _log) = manager();

    // A second connect while the first is still negotiating abandons it.
    manager.connect(&Device::new("cam-a", "A"), 1);
    manager.connect(&Device::new("cam-b", "B"), 2);
    match next_event(&mut manager).await {
        Some(ConnectionEvent::Connected { generation, device, .. }) => {
            assert_eq!(generation, 2);
            assert_eq!(device.id.as_str(), "cam-b");
        }
        _ => panic!("expected cam-b to connect"),
    }
    assert_eq!(transport.stats().opened_total, 1);

    // Reconnecting while connected closes the live session synchronously.
    manager.connect(&Device::new("cam-c", "C"), 3);
    assert_eq!(transport.open_sessions(), 0);
    assert!(matches!(
        next_event(&mut manager).await,
        Some(ConnectionEvent::Connected { generation: 3, .. })
    ));

    assert_eq!(transport.open_sessions(), 1);
    assert_eq!(transport.peak_open_sessions(), 1);
}

#[tokio::test(start_paused = true)]
async fn connecting_over_a_live_session_reports_the_teardown() {
    let (mut manager, transport, log) = manager();

    manager.connect(&Device::new("cam-a", "A"), 1);
    assert!(matches!(
        next_event(&mut manager).await,
        Some(ConnectionEvent::Connected { generation: 1, .. })
    ));

    manager.connect(&Device::new("cam-b", "B"), 2);
    assert_eq!(log.states(), vec![Connecting, Connected, Idle, Connecting]);
    assert_eq!(transport.stats().closed_total, 1);

    assert!(matches!(
        next_event(&mut manager).await,
        Some(ConnectionEvent::Connected { generation: 2, .. })
    ));
    assert_eq!(
        log.states(),
        vec![Connecting, Connected, Idle, Connecting, Connected]
    );
}

#[tokio::test(start_paused = true)]
async fn late_session_from_a_retired_attempt_is_closed() {
    let (mut manager, transport, _log) = manager();

    manager.connect(&Device::new("cam-a", "A"), 1);
    // Let the open finish so its outcome is already queued.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(transport.open_sessions(), 1);

    manager.connect(&Device::new("cam-b", "B"), 2);
    assert!(next_event(&mut manager).await.is_none());
    assert_eq!(transport.open_sessions(), 0);

    assert!(matches!(
        next_event(&mut manager).await,
        Some(ConnectionEvent::Connected { generation: 2, .. })
    ));
    assert_eq!(transport.stats().closed_total, 1);
    assert_eq!(transport.open_sessions(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_connect_retries_once_then_waits_for_the_caller() {
    let (mut manager, transport, log) = manager();
    let device = Device::new("cam-f", "Flaky");
    transport.fail_next(&device.id, 2);

    manager.connect(&device, 1);
    match next_event(&mut manager).await {
        Some(ConnectionEvent::Failed { retry_in, error, .. }) => {
            assert_eq!(retry_in, Some(RETRY_DELAY));
            assert!(error.is_retryable());
            assert!(error.to_string().contains("cam-f"));
        }
        _ => panic!("expected the first attempt to fail"),
    }
    assert_eq!(manager.state(), Failed);

    let started = tokio::time::Instant::now();
    // Retry timer firing is internal.
    assert!(next_event(&mut manager).await.is_none());
    assert!(started.elapsed() >= RETRY_DELAY);
    assert_eq!(manager.state(), Connecting);

    assert!(matches!(
        next_event(&mut manager).await,
        Some(ConnectionEvent::Failed { retry_in: None, .. })
    ));
    assert_eq!(manager.state(), Failed);

    // Nothing else is scheduled.
    assert!(
        tokio::time::timeout(Duration::from_secs(10), manager.recv())
            .await
            .is_err()
    );

    manager.connect(&device, 2);
    assert!(matches!(
        next_event(&mut manager).await,
        Some(ConnectionEvent::Connected { generation: 2, .. })
    ));
    assert_eq!(
        log.states(),
        vec![Connecting, Failed, Connecting, Failed, Connecting, Connected]
    );
}

#[tokio::test(start_paused = true)]
async fn switching_devices_cancels_a_pending_retry() {
    let (mut manager, transport, _log) = manager();
    let flaky = Device::new("cam-f", "Flaky");
    transport.fail_next(&flaky.id, 1);

    manager.connect(&flaky, 1);
    assert!(matches!(
        next_event(&mut manager).await,
        Some(ConnectionEvent::Failed { retry_in: Some(_), .. })
    ));

    manager.connect(&Device::new("cam-b", "B"), 2);
    assert!(matches!(
        next_event(&mut manager).await,
        Some(ConnectionEvent::Connected { generation: 2, .. })
    ));

    assert!(
        tokio::time::timeout(RETRY_DELAY * 3, manager.recv())
            .await
            .is_err()
    );
    assert_eq!(manager.state(), Connected);
    assert_eq!(
        manager.connection().map(|c| c.device().id.as_str()),
        Some("cam-b")
    );
    assert_eq!(transport.stats().opened_total, 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_manager_closes_its_session() {
    let (mut manager, transport, _log) = manager();
    manager.connect(&Device::new("cam-1", "One"), 1);
    assert!(next_event(&mut manager).await.is_some());
    assert_eq!(transport.open_sessions(), 1);

    drop(manager);
    assert_eq!(transport.open_sessions(), 0);
}
