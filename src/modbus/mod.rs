pub mod client;
pub mod packet;

pub use client::ModbusClient;

use async_trait::async_trait;

use crate::error::Error;

/// Register-level read operations, the seam between the collector and the
/// wire protocol. The collector only ever talks to this trait, so tests can
/// drive a poll cycle against a fake device.
#[async_trait]
pub trait RegisterRead: Send {
    /// Read one holding register and return the raw 16-bit value.
    async fn read_register(&mut self, register: u16) -> Result<u16, Error>;

    /// Read one holding register as a two's-complement signed integer.
    async fn read_int16(&mut self, register: u16) -> Result<i16, Error>;

    /// Read a register that encodes tenths of a unit as a whole integer.
    async fn read_pseudo_float16(&mut self, register: u16) -> Result<f32, Error> {
        Ok(f32::from(self.read_int16(register).await?) / 10.0)
    }
}
