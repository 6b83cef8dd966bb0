use crate::prelude::*;

use tokio::sync::Mutex;

use crate::error::Error;
use crate::modbus::RegisterRead;

pub const SCRAPE_COUNT: &str = "scrape_count";
pub const MODBUS_ERROR_COUNT: &str = "modbus_error_count";

/// How a raw register value becomes an engineering unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decode {
    /// Raw signed status code, no scaling.
    Int16,
    /// Tenths-of-a-unit integer, rounded to 2 decimal places.
    PseudoFloat16,
    /// Low pressure transfer function, rounded to 1 decimal place.
    LowPressure,
    /// High pressure transfer function, rounded to 1 decimal place.
    HighPressure,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

pub struct MetricDef {
    pub register: u16,
    pub name: &'static str,
    pub help: &'static str,
    pub decode: Decode,
}

// https://dimplex.atlassian.net/wiki/spaces/DW/pages/2873393288/NWPM+Modbus+TCP
pub static REGISTER_MAP: [MetricDef; 9] = [
    MetricDef {
        register: 1,
        name: "temperature_outdoors",
        help: "temperature, outdoor sensor",
        decode: Decode::PseudoFloat16,
    },
    MetricDef {
        register: 2,
        name: "temperature_return_heating",
        help: "temperature, heating return",
        decode: Decode::PseudoFloat16,
    },
    MetricDef {
        register: 53,
        name: "temperature_heating_return_desired",
        help: "desired temperature, heating return",
        decode: Decode::PseudoFloat16,
    },
    MetricDef {
        register: 3,
        name: "temperature_domestic_hot_water",
        help: "temperature, domestic hot water",
        decode: Decode::PseudoFloat16,
    },
    MetricDef {
        register: 58,
        name: "temperature_domestic_hot_water_desired",
        help: "desired temperature, domestic hot water",
        decode: Decode::PseudoFloat16,
    },
    MetricDef {
        register: 5,
        name: "temperature_flow",
        help: "temperature, flow",
        decode: Decode::PseudoFloat16,
    },
    MetricDef {
        register: 6,
        name: "pressure_low",
        help: "pressure, low",
        decode: Decode::LowPressure,
    },
    MetricDef {
        register: 8,
        name: "pressure_high",
        help: "pressure, high",
        decode: Decode::HighPressure,
    },
    MetricDef {
        register: 103,
        name: "operating_status",
        help: "status message code: 2=heating 4=hot_water 10=defrost",
        decode: Decode::Int16,
    },
];

/// Calibration of the raw low pressure sensor scale to bar. The operation
/// order is part of the contract: it affects the last decimal digit.
pub fn low_pressure(nd: f32) -> f32 {
    ((((nd * 10.0) - 100.0) * 173.0) / 800.0) / 10.0
}

/// Calibration of the raw high pressure sensor scale to bar.
pub fn high_pressure(hd: f32) -> f32 {
    ((((hd * 10.0) - 100.0) * 345.0) / 800.0) / 10.0
}

fn round_half_away(num: f64) -> i64 {
    (num + 0.5_f64.copysign(num)) as i64
}

/// Round to `precision` decimal digits, ties away from zero. Scaling happens
/// in f32 so that tenths recovered from the wire hit exact ties.
pub fn fixed(num: f32, precision: i32) -> f64 {
    let scale = 10_f32.powi(precision);
    round_half_away(f64::from(num * scale)) as f64 / f64::from(scale)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub name: &'static str,
    pub value: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct Descriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
}

/// All metric descriptors, in exposition order: scrape counter first, then
/// one gauge per register, then the error counter.
pub fn describe() -> Vec<Descriptor> {
    let mut descriptors = Vec::with_capacity(REGISTER_MAP.len() + 2);
    descriptors.push(Descriptor {
        name: SCRAPE_COUNT,
        help: "number of times the exporter has been scraped",
        kind: MetricKind::Counter,
    });
    for def in &REGISTER_MAP {
        descriptors.push(Descriptor {
            name: def.name,
            help: def.help,
            kind: MetricKind::Gauge,
        });
    }
    descriptors.push(Descriptor {
        name: MODBUS_ERROR_COUNT,
        help: "number of times the modbus client observes an error",
        kind: MetricKind::Counter,
    });
    descriptors
}

struct Inner<C> {
    client: C,
    scrapes: u64,
    modbus_errors: u64,
}

/// Runs one poll cycle over the register map per scrape.
///
/// The whole cycle is a critical section: overlapping scrape requests
/// serialize on the mutex instead of interleaving reads on the shared
/// connection. The counters are only touched inside that section.
pub struct Collector<C> {
    inner: Mutex<Inner<C>>,
}

impl<C: RegisterRead> Collector<C> {
    pub fn new(client: C) -> Self {
        Self {
            inner: Mutex::new(Inner {
                client,
                scrapes: 0,
                modbus_errors: 0,
            }),
        }
    }

    /// One full pass over the register map. Never fails as a whole: a failed
    /// register is logged, counted, and omitted from this cycle's samples.
    pub async fn collect(&self) -> Vec<Sample> {
        let mut inner = self.inner.lock().await;

        inner.scrapes += 1;

        let mut samples = Vec::with_capacity(REGISTER_MAP.len() + 2);
        samples.push(Sample {
            name: SCRAPE_COUNT,
            value: inner.scrapes as f64,
        });

        for def in &REGISTER_MAP {
            match read_metric(&mut inner.client, def).await {
                Ok(value) => samples.push(Sample {
                    name: def.name,
                    value,
                }),
                Err(e) => {
                    warn!("failed to read {}: {}", def.name, e);
                    inner.modbus_errors += 1;
                }
            }
        }

        samples.push(Sample {
            name: MODBUS_ERROR_COUNT,
            value: inner.modbus_errors as f64,
        });

        samples
    }
}

async fn read_metric<C: RegisterRead>(client: &mut C, def: &MetricDef) -> Result<f64, Error> {
    match def.decode {
        Decode::Int16 => Ok(f64::from(client.read_int16(def.register).await?)),
        Decode::PseudoFloat16 => Ok(fixed(client.read_pseudo_float16(def.register).await?, 2)),
        Decode::LowPressure => Ok(fixed(
            low_pressure(client.read_pseudo_float16(def.register).await?),
            1,
        )),
        Decode::HighPressure => Ok(fixed(
            high_pressure(client.read_pseudo_float16(def.register).await?),
            1,
        )),
    }
}
