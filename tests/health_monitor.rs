use flexmon::adapters::PaperBroker;
use flexmon::domain::ConnectionHealth;
use flexmon::supervisor::{HealthCallback, HealthMonitor, MonitorConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn monitored(broker: &Arc<PaperBroker>) -> Arc<HealthMonitor> {
    let monitor = Arc::new(HealthMonitor::new(MonitorConfig {
        check_interval: Duration::from_secs(60),
        ..MonitorConfig::default()
    }));
    monitor.register("ib-paper", broker.clone()).await;
    monitor
}

type TransitionLog = Arc<Mutex<Vec<(String, ConnectionHealth)>>>;

fn recording(log: &TransitionLog) -> HealthCallback {
    let log = Arc::clone(log);
    Arc::new(move |id: &str, health: ConnectionHealth| {
        log.lock().unwrap().push((id.to_string(), health));
    })
}

#[tokio::test]
async fn callback_fires_once_per_transition() {
    let broker = Arc::new(PaperBroker::new("ib-paper", "AAPL"));
    let monitor = monitored(&broker).await;
    let log = Arc::new(Mutex::new(Vec::new()));
    monitor.add_callback(recording(&log)).await;

    for _ in 0..3 {
        monitor.force_check(Some("ib-paper")).await.unwrap();
    }
    assert_eq!(
        *log.lock().unwrap(),
        vec![("ib-paper".to_string(), ConnectionHealth::Healthy)]
    );

    broker.fail_positions(Some("positions service unavailable")).await;
    for _ in 0..3 {
        monitor.force_check(Some("ib-paper")).await.unwrap();
    }

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].1, ConnectionHealth::Degraded);
}

#[tokio::test]
async fn two_of_three_sub_checks_is_degraded() {
    let broker = Arc::new(PaperBroker::new("ib-paper", "AAPL"));
    broker.fail_positions(Some("timeout")).await;
    let monitor = monitored(&broker).await;

    let results = monitor.force_check(Some("ib-paper")).await.unwrap();
    let result = &results["ib-paper"];

    assert_eq!(result.health, ConnectionHealth::Degraded);
    assert!(!result.details["positions_access"].success);
    assert!(result.details["account_access"].success);
}

#[tokio::test]
async fn force_check_is_idempotent_for_stable_target() {
    let broker = Arc::new(PaperBroker::new("ib-paper", "AAPL"));
    let monitor = monitored(&broker).await;

    let first = monitor.force_check(Some("ib-paper")).await.unwrap();
    let second = monitor.force_check(Some("ib-paper")).await.unwrap();

    assert_eq!(first["ib-paper"].health, second["ib-paper"].health);
}

#[tokio::test]
async fn subscribers_receive_transitions() {
    let broker = Arc::new(PaperBroker::new("ib-paper", "AAPL"));
    let monitor = monitored(&broker).await;
    let mut events = monitor.subscribe();

    monitor.force_check(None).await.unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.target_id, "ib-paper");
    assert_eq!(event.previous, None);
    assert_eq!(event.current, ConnectionHealth::Healthy);
}

#[tokio::test(start_paused = true)]
async fn monitoring_loop_notifies_only_on_change() {
    let broker = Arc::new(PaperBroker::new("ib-paper", "AAPL"));
    let monitor = monitored(&broker).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    monitor
        .add_callback(Arc::new(move |_: &str, _: ConnectionHealth| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

    let handle = monitor
        .start_monitoring(Duration::from_secs(60))
        .expect("monitor should start");
    tokio::time::sleep(Duration::from_secs(300)).await;
    monitor.stop_monitoring();
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert!(handle.is_finished());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(monitor.summary().overall, ConnectionHealth::Healthy);
}
