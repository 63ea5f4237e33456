// Rate derivation tests: counter deltas, resets, non-positive intervals

mod common;

use pimonitor::models::*;
use pimonitor::rate::{counter_rate, derive};
use pimonitor::sampler::sample_once;

#[test]
fn counter_rate_divides_delta_by_elapsed_seconds() {
    assert_eq!(counter_rate(1_000, 1_500, 5.0), Some(100.0));
    assert_eq!(counter_rate(7, 7, 1.0), Some(0.0));
}

#[test]
fn counter_rate_is_absent_when_counter_goes_backwards() {
    assert_eq!(counter_rate(1_500, 1_000, 5.0), None);
}

#[test]
fn counter_rate_is_absent_for_non_positive_interval() {
    assert_eq!(counter_rate(1_000, 1_500, 0.0), None);
    assert_eq!(counter_rate(1_000, 1_500, -1.0), None);
    assert_eq!(counter_rate(1_000, 1_500, f64::NAN), None);
}

#[test]
fn derive_computes_interface_and_device_rates() {
    let prev = common::raw(10_000, 1_000, 0);
    let curr = common::raw(15_000, 1_500, 5_120);
    let rates = derive(&prev, &curr);

    assert_eq!(rates.interfaces.len(), 1);
    assert_eq!(rates.interfaces[0].rx_bytes_per_sec, Some(100.0));
    assert_eq!(rates.interfaces[0].tx_bytes_per_sec, Some(50.0));
    assert_eq!(rates.devices[0].read_bytes_per_sec, Some(1_024.0));
    assert_eq!(rates.devices[0].write_bytes_per_sec, Some(0.0));
}

#[test]
fn derive_reports_absent_rate_after_counter_reset() {
    let prev = common::raw(10_000, 9_000, 9_000);
    let curr = common::raw(20_000, 100, 10_000);
    let rates = derive(&prev, &curr);

    assert_eq!(rates.interfaces[0].rx_bytes_per_sec, None);
    assert_eq!(rates.interfaces[0].tx_bytes_per_sec, None);
    // The device counter did not reset, so its rate survives.
    assert_eq!(rates.devices[0].read_bytes_per_sec, Some(100.0));
}

#[test]
fn derive_reports_absent_rates_when_clock_did_not_advance() {
    let prev = common::raw(10_000, 1_000, 1_000);
    let same = common::raw(10_000, 2_000, 2_000);
    let earlier = common::raw(9_000, 2_000, 2_000);

    for curr in [same, earlier] {
        let rates = derive(&prev, &curr);
        assert_eq!(rates.interfaces[0].rx_bytes_per_sec, None);
        assert_eq!(rates.devices[0].read_bytes_per_sec, None);
    }
}

#[test]
fn derive_marks_new_or_vanished_sources_absent() {
    let prev = common::raw(10_000, 1_000, 1_000);
    let mut curr = common::raw(20_000, 2_000, 2_000);
    curr.interfaces.push(InterfaceReading {
        name: "wlan0".into(),
        counters: Some(NetCounters {
            rx_bytes: 10,
            tx_bytes: 10,
        }),
    });
    curr.devices[0].counters = None;

    let rates = derive(&prev, &curr);
    let wlan = rates
        .interfaces
        .iter()
        .find(|i| i.name == "wlan0")
        .unwrap();
    assert_eq!(wlan.rx_bytes_per_sec, None);
    assert_eq!(rates.devices[0].read_bytes_per_sec, None);
}

#[tokio::test]
async fn sample_once_has_no_rates_on_first_capture_then_derives() {
    let reader = common::ScriptedReader::new(vec![
        common::raw(10_000, 1_000, 0),
        common::raw(15_000, 1_500, 512),
    ]);
    let mut previous = None;

    let first = sample_once(&reader, &mut previous).await;
    assert_eq!(first.network[0].rx_bytes_per_sec, None);
    assert_eq!(first.network[0].rx_bytes_total, Some(1_000));

    let second = sample_once(&reader, &mut previous).await;
    assert_eq!(second.network[0].rx_bytes_per_sec, Some(100.0));
    assert_eq!(second.disk_io[0].read_bytes_per_sec, Some(102.4));
    assert_eq!(previous.map(|p| p.timestamp), Some(15_000));
}
