use crate::prelude::*;

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_util::codec::Decoder;

use crate::config;
use crate::error::Error;
use crate::modbus::packet::{FrameDecoder, ReadRequest, ResponsePdu};
use crate::modbus::RegisterRead;

/// How raw register values are turned into signed integers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeMode {
    /// Pure bit reinterpretation; every raw pattern is a valid i16.
    Reinterpret,
    /// Values above `i16::MAX` are rejected as out of range.
    Strict,
}

/// Client for a single Modbus TCP session.
///
/// One request is in flight at a time; the collector serializes whole poll
/// cycles, so no locking happens here. A failed read leaves the connection
/// usable: leftover bytes stay in the receive buffer and late replies are
/// dropped by transaction id on the next read.
pub struct ModbusClient {
    address: String,
    unit_id: u8,
    timeout: Duration,
    decode_mode: DecodeMode,
    transaction_id: u16,
    stream: Option<TcpStream>,
    buffer: BytesMut,
    decoder: FrameDecoder,
}

impl ModbusClient {
    pub fn new(device: &config::Device) -> Self {
        let decode_mode = if device.strict_decode() {
            DecodeMode::Strict
        } else {
            DecodeMode::Reinterpret
        };

        Self {
            address: device.address(),
            unit_id: device.unit_id(),
            timeout: device.timeout(),
            decode_mode,
            transaction_id: 0,
            stream: None,
            buffer: BytesMut::with_capacity(256),
            decoder: FrameDecoder::new(),
        }
    }

    /// Open the TCP session. Must be called exactly once before any read;
    /// failure is fatal to startup and there is no internal retry.
    pub async fn connect(&mut self) -> Result<(), Error> {
        info!("connecting to modbus device at {}", self.address);

        let stream = match timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(Error::Connect {
                    addr: self.address.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(Error::ConnectTimeout {
                    addr: self.address.clone(),
                    timeout: self.timeout,
                })
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("failed to set TCP_NODELAY: {}", e);
        }

        info!("connected to modbus device at {}", self.address);
        self.stream = Some(stream);

        Ok(())
    }

    /// One read-holding-registers transaction for a single register.
    async fn transact(&mut self, register: u16) -> Result<u16, Error> {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        let request = ReadRequest {
            transaction_id: self.transaction_id,
            unit_id: self.unit_id,
            register,
            count: 1,
        };

        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        match timeout(self.timeout, stream.write_all(&request.bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(Error::Io(e)),
            Err(_) => return Err(Error::Timeout(self.timeout)),
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            while let Some(frame) = self.decoder.decode(&mut self.buffer)? {
                if frame.header.transaction_id != request.transaction_id {
                    // late reply to a request that already timed out
                    debug!(
                        "dropping stale frame with transaction id {} (expected {})",
                        frame.header.transaction_id, request.transaction_id
                    );
                    continue;
                }
                return match frame.pdu {
                    ResponsePdu::Exception { function, code } => {
                        Err(Error::Exception { function, code })
                    }
                    ResponsePdu::ReadHoldingRegisters { values } => {
                        values.first().copied().ok_or_else(|| {
                            Error::MalformedFrame("empty register payload".to_string())
                        })
                    }
                };
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(self.timeout));
            }

            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
            match timeout(remaining, stream.read_buf(&mut self.buffer)).await {
                Ok(Ok(0)) => return Err(Error::ConnectionClosed),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_) => return Err(Error::Timeout(self.timeout)),
            }
        }
    }

    fn to_int16(&self, raw: u16) -> Result<i16, Error> {
        if self.decode_mode == DecodeMode::Strict && raw > i16::MAX as u16 {
            return Err(Error::OutOfRange(raw));
        }
        Ok(raw as i16)
    }
}

#[async_trait]
impl RegisterRead for ModbusClient {
    async fn read_register(&mut self, register: u16) -> Result<u16, Error> {
        self.transact(register).await
    }

    async fn read_int16(&mut self, register: u16) -> Result<i16, Error> {
        let raw = self.transact(register).await?;
        self.to_int16(raw)
    }
}
