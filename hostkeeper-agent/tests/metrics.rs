//! Resource metric alerts: CPU debounce, disk threshold

use hostkeeper_agent::models::{EntityDescriptor, ProcessEntry};
use hostkeeper_agent::notifier::MessageFormat;
use hostkeeper_devkit::TestHarness;

fn stress() -> ProcessEntry {
    ProcessEntry {
        pid: 4711,
        name: "stress-ng".to_string(),
        cpu_percent: 97.3,
        memory_mb: 12.5,
    }
}

#[tokio::test]
async fn cpu_spike_that_does_not_persist_is_ignored() {
    let harness = TestHarness::new().unwrap();
    harness.stubs.set_cpu([Ok(95.0), Ok(40.0)]);

    let monitor = harness.monitor(vec![EntityDescriptor::cpu(80.0)]);
    monitor.run_cycle().await;

    assert_eq!(harness.stubs.cpu_samples_taken(), 2);
    assert!(harness.take_messages().is_empty());
}

#[tokio::test]
async fn sustained_cpu_load_alerts_with_top_consumers() {
    let harness = TestHarness::new().unwrap();
    harness.stubs.set_cpu([Ok(95.0), Ok(92.0)]);
    harness.stubs.set_top_consumers(vec![stress()]);

    let monitor = harness.monitor(vec![EntityDescriptor::cpu(80.0)]);
    monitor.run_cycle().await;

    let messages = harness.sink.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].format, MessageFormat::Rich);
    assert!(messages[0].text.starts_with("🔥 CPU usage is high"));
    assert!(messages[0].text.contains("95.0%"));
    assert!(messages[0].text.contains("92.0%"));
    assert!(messages[0].text.contains("stress-ng"));
}

#[tokio::test]
async fn low_cpu_takes_a_single_sample() {
    let harness = TestHarness::new().unwrap();
    harness.stubs.set_cpu([Ok(12.0)]);

    let monitor = harness.monitor(vec![EntityDescriptor::cpu(80.0)]);
    monitor.run_cycle().await;

    assert_eq!(harness.stubs.cpu_samples_taken(), 1);
    assert!(harness.take_messages().is_empty());
}

#[tokio::test]
async fn disk_over_threshold_alerts_once_per_cycle() {
    let harness = TestHarness::new().unwrap();
    harness.stubs.set_disk("/", [Ok(93.0)]);

    let monitor = harness.monitor(vec![EntityDescriptor::disk("/", 90.0)]);
    monitor.run_cycle().await;

    assert_eq!(
        harness.take_messages(),
        vec!["💾 Storage usage on / is high: 93% (> 90%)."]
    );
}

#[tokio::test]
async fn sampling_failure_alerts_as_unknown() {
    let harness = TestHarness::new().unwrap();
    harness.stubs.set_disk("/mnt/data", [Err("df: /mnt/data: No such file or directory".to_string())]);

    let monitor = harness.monitor(vec![EntityDescriptor::disk("/mnt/data", 90.0)]);
    let report = monitor.run_cycle().await;

    assert_eq!(report.observations.len(), 1);
    let messages = harness.take_messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("is unknown"));
    assert!(messages[0].contains("df: /mnt/data: No such file or directory"));
    // not stored, so the blind spot is reported every cycle
    assert_eq!(harness.read_state().unwrap(), serde_json::json!({}));
}

#[tokio::test]
async fn failed_cpu_sample_alerts_as_unknown() {
    let harness = TestHarness::new().unwrap();
    harness.stubs.set_cpu([Err("sysinfo unavailable".to_string())]);

    let monitor = harness.monitor(vec![EntityDescriptor::cpu(80.0)]);
    monitor.run_cycle().await;

    let messages = harness.sink.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].format, MessageFormat::Rich);
    assert!(messages[0].text.contains("<b>cpu</b> is unknown"));
    assert!(messages[0].text.contains("sysinfo unavailable"));
}

#[tokio::test]
async fn metrics_are_not_stored_in_the_state_file() {
    let harness = TestHarness::new().unwrap();
    harness.stubs.set_cpu([Ok(95.0), Ok(95.0)]);
    harness.stubs.set_disk("/", [Ok(97.0)]);

    let monitor = harness.monitor(vec![EntityDescriptor::cpu(80.0), EntityDescriptor::disk("/", 90.0)]);
    monitor.run_cycle().await;

    let state = harness.read_state().unwrap();
    assert_eq!(state, serde_json::json!({}));
    // metrics alert every cycle while over threshold
    assert_eq!(harness.take_messages().len(), 2);
    monitor.run_cycle().await;
    assert_eq!(harness.take_messages().len(), 2);
}
