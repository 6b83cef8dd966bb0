mod common;
use common::FakeDevice;

use dimplex_exporter::collector::{
    fixed, low_pressure, Collector, Sample, MODBUS_ERROR_COUNT, SCRAPE_COUNT,
};

fn value_of(samples: &[Sample], name: &str) -> Option<f64> {
    samples.iter().find(|s| s.name == name).map(|s| s.value)
}

#[tokio::test]
async fn full_cycle_decodes_every_register() {
    let collector = Collector::new(FakeDevice::healthy());

    let samples = collector.collect().await;

    assert_eq!(samples.len(), 11);
    assert_eq!(value_of(&samples, SCRAPE_COUNT), Some(1.0));
    assert_eq!(value_of(&samples, "temperature_outdoors"), Some(25.0));
    assert_eq!(value_of(&samples, "temperature_return_heating"), Some(32.1));
    assert_eq!(
        value_of(&samples, "temperature_heating_return_desired"),
        Some(30.0)
    );
    assert_eq!(
        value_of(&samples, "temperature_domestic_hot_water"),
        Some(48.0)
    );
    assert_eq!(
        value_of(&samples, "temperature_domestic_hot_water_desired"),
        Some(50.0)
    );
    assert_eq!(value_of(&samples, "temperature_flow"), Some(35.0));
    assert_eq!(
        value_of(&samples, "pressure_low"),
        Some(fixed(low_pressure(110.0), 1))
    );
    assert_eq!(value_of(&samples, "pressure_low"), Some(21.6));
    assert_eq!(value_of(&samples, "pressure_high"), Some(77.6));
    assert_eq!(value_of(&samples, "operating_status"), Some(2.0));
    assert_eq!(value_of(&samples, MODBUS_ERROR_COUNT), Some(0.0));
}

#[tokio::test]
async fn samples_are_in_register_map_order() {
    let collector = Collector::new(FakeDevice::healthy());

    let samples = collector.collect().await;
    let names: Vec<&str> = samples.iter().map(|s| s.name).collect();

    assert_eq!(
        names,
        vec![
            SCRAPE_COUNT,
            "temperature_outdoors",
            "temperature_return_heating",
            "temperature_heating_return_desired",
            "temperature_domestic_hot_water",
            "temperature_domestic_hot_water_desired",
            "temperature_flow",
            "pressure_low",
            "pressure_high",
            "operating_status",
            MODBUS_ERROR_COUNT,
        ]
    );
}

#[tokio::test]
async fn failing_register_is_omitted_and_counted() {
    let device = FakeDevice::healthy();
    let failures = device.failure_injector();
    let collector = Collector::new(device);

    let first = collector.collect().await;
    assert!(value_of(&first, "temperature_flow").is_some());
    assert_eq!(value_of(&first, MODBUS_ERROR_COUNT), Some(0.0));

    failures.fail(5);
    let second = collector.collect().await;

    assert_eq!(value_of(&second, SCRAPE_COUNT), Some(2.0));
    assert!(value_of(&second, "temperature_flow").is_none());
    assert_eq!(value_of(&second, MODBUS_ERROR_COUNT), Some(1.0));
    // the rest of the cycle is unaffected
    assert_eq!(value_of(&second, "operating_status"), Some(2.0));
    assert_eq!(second.len(), 10);
}

#[tokio::test]
async fn repeated_failures_accumulate_one_error_per_read() {
    let device = FakeDevice::healthy();
    let failures = device.failure_injector();
    let collector = Collector::new(device);

    failures.fail(1);
    for n in 1..=3u64 {
        let samples = collector.collect().await;
        assert_eq!(value_of(&samples, SCRAPE_COUNT), Some(n as f64));
        assert_eq!(value_of(&samples, MODBUS_ERROR_COUNT), Some(n as f64));
    }

    failures.recover(1);
    let samples = collector.collect().await;
    assert_eq!(value_of(&samples, SCRAPE_COUNT), Some(4.0));
    assert_eq!(value_of(&samples, "temperature_outdoors"), Some(25.0));
    // the error counter never decreases
    assert_eq!(value_of(&samples, MODBUS_ERROR_COUNT), Some(3.0));
}

#[tokio::test]
async fn unmapped_register_counts_as_error() {
    // drop register 103 from the device entirely
    let collector = Collector::new(FakeDevice::new(&[(1, 250), (6, 1100)]));

    let samples = collector.collect().await;

    assert!(value_of(&samples, "operating_status").is_none());
    assert_eq!(value_of(&samples, "temperature_outdoors"), Some(25.0));
    assert_eq!(value_of(&samples, MODBUS_ERROR_COUNT), Some(7.0));
}

#[tokio::test]
async fn concurrent_collects_serialize() {
    let collector = Collector::new(FakeDevice::healthy());

    let (a, b) = futures::join!(collector.collect(), collector.collect());

    assert_eq!(a.len(), 11);
    assert_eq!(b.len(), 11);

    // both cycles ran to completion, one after the other
    let mut scrapes = vec![
        value_of(&a, SCRAPE_COUNT).unwrap(),
        value_of(&b, SCRAPE_COUNT).unwrap(),
    ];
    scrapes.sort_by(f64::total_cmp);
    assert_eq!(scrapes, vec![1.0, 2.0]);
}

#[tokio::test]
async fn negative_temperatures_survive_decoding() {
    // -10.4 degrees outdoors: raw two's complement of -104
    let collector = Collector::new(FakeDevice::new(&[(1, 0xff98)]));

    let samples = collector.collect().await;

    assert_eq!(value_of(&samples, "temperature_outdoors"), Some(-10.4));
}
