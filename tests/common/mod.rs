use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use dimplex_exporter::error::Error;
use dimplex_exporter::modbus::packet::ExceptionCode;
use dimplex_exporter::modbus::RegisterRead;

/// Shared handle for flipping registers into a failing state between poll
/// cycles, after the device has been handed to the collector.
#[derive(Clone, Default)]
pub struct FailureInjector(Arc<Mutex<HashSet<u16>>>);

impl FailureInjector {
    pub fn fail(&self, register: u16) {
        self.0.lock().unwrap().insert(register);
    }

    pub fn recover(&self, register: u16) {
        self.0.lock().unwrap().remove(&register);
    }

    fn is_failing(&self, register: u16) -> bool {
        self.0.lock().unwrap().contains(&register)
    }
}

/// In-memory device with fixed register contents.
pub struct FakeDevice {
    registers: HashMap<u16, u16>,
    failures: FailureInjector,
}

impl FakeDevice {
    pub fn new(values: &[(u16, u16)]) -> Self {
        Self {
            registers: values.iter().copied().collect(),
            failures: FailureInjector::default(),
        }
    }

    /// A device answering every mapped register, with the outdoor sensor at
    /// 25.0 degrees, low pressure raw 1100 and status code 2 (heating).
    pub fn healthy() -> Self {
        Self::new(&[
            (1, 250),
            (2, 321),
            (53, 300),
            (3, 480),
            (58, 500),
            (5, 350),
            (6, 1100),
            (8, 1900),
            (103, 2),
        ])
    }

    pub fn failure_injector(&self) -> FailureInjector {
        self.failures.clone()
    }
}

#[async_trait]
impl RegisterRead for FakeDevice {
    async fn read_register(&mut self, register: u16) -> Result<u16, Error> {
        if self.failures.is_failing(register) {
            return Err(Error::ConnectionClosed);
        }
        self.registers
            .get(&register)
            .copied()
            .ok_or(Error::Exception {
                function: 3,
                code: ExceptionCode::IllegalDataAddress,
            })
    }

    async fn read_int16(&mut self, register: u16) -> Result<i16, Error> {
        Ok(self.read_register(register).await? as i16)
    }
}
