use bytes::BytesMut;
use nom_derive::{Nom, Parse};
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
use tokio_util::codec::Decoder;

use crate::error::Error;

/// Modbus TCP protocol identifier; always zero on the wire.
pub const PROTOCOL_ID: u16 = 0;

/// MBAP header (7 bytes) plus at least a function code.
const MIN_FRAME_LEN: usize = 8;

// {{{ FunctionCode
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FunctionCode {
    ReadHoldingRegisters = 3,
}
// }}}

// {{{ ExceptionCode
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 1,
    IllegalDataAddress = 2,
    IllegalDataValue = 3,
    ServerDeviceFailure = 4,
    Acknowledge = 5,
    ServerDeviceBusy = 6,
    GatewayPathUnavailable = 10,
    GatewayTargetFailedToRespond = 11,
    #[num_enum(catch_all)]
    Other(u8),
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExceptionCode::IllegalFunction => write!(f, "illegal function"),
            ExceptionCode::IllegalDataAddress => write!(f, "illegal data address"),
            ExceptionCode::IllegalDataValue => write!(f, "illegal data value"),
            ExceptionCode::ServerDeviceFailure => write!(f, "server device failure"),
            ExceptionCode::Acknowledge => write!(f, "acknowledge"),
            ExceptionCode::ServerDeviceBusy => write!(f, "server device busy"),
            ExceptionCode::GatewayPathUnavailable => write!(f, "gateway path unavailable"),
            ExceptionCode::GatewayTargetFailedToRespond => {
                write!(f, "gateway target failed to respond")
            }
            ExceptionCode::Other(code) => write!(f, "exception code {}", code),
        }
    }
}
// }}}

/// A single read-holding-registers request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadRequest {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub register: u16,
    pub count: u16,
}

impl ReadRequest {
    pub fn bytes(&self) -> Vec<u8> {
        let mut r = vec![0; 12];

        r[0..2].copy_from_slice(&self.transaction_id.to_be_bytes());
        r[2..4].copy_from_slice(&PROTOCOL_ID.to_be_bytes());
        // length counts everything after itself: unit id + PDU
        r[4..6].copy_from_slice(&6u16.to_be_bytes());
        r[6] = self.unit_id;
        r[7] = FunctionCode::ReadHoldingRegisters.into();
        r[8..10].copy_from_slice(&self.register.to_be_bytes());
        r[10..12].copy_from_slice(&self.count.to_be_bytes());

        r
    }
}

// {{{ MbapHeader
#[derive(Clone, Copy, Debug, Eq, PartialEq, Nom)]
#[nom(BigEndian)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    pub length: u16,
    pub unit_id: u8,
}
// }}}

#[derive(Clone, Debug, PartialEq)]
pub enum ResponsePdu {
    ReadHoldingRegisters { values: Vec<u16> },
    Exception { function: u8, code: ExceptionCode },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResponseFrame {
    pub header: MbapHeader,
    pub pdu: ResponsePdu,
}

impl ResponseFrame {
    /// Parse one complete frame. The caller (FrameDecoder) guarantees the
    /// slice holds exactly the 6-byte MBAP prefix plus `length` bytes.
    pub fn parse_frame(input: &[u8]) -> Result<Self, Error> {
        let (rest, header) = MbapHeader::parse(input)
            .map_err(|_| Error::MalformedFrame("truncated MBAP header".to_string()))?;

        if header.protocol_id != PROTOCOL_ID {
            return Err(Error::MalformedFrame(format!(
                "unexpected protocol id {}",
                header.protocol_id
            )));
        }
        // length counts the unit id byte plus the PDU
        if rest.len() + 1 != header.length as usize {
            return Err(Error::MalformedFrame(format!(
                "length field {} does not match frame size",
                header.length
            )));
        }

        let (&function, rest) = rest
            .split_first()
            .ok_or_else(|| Error::MalformedFrame("empty PDU".to_string()))?;

        if function & 0x80 != 0 {
            let &code = rest
                .first()
                .ok_or_else(|| Error::MalformedFrame("truncated exception PDU".to_string()))?;
            return Ok(Self {
                header,
                pdu: ResponsePdu::Exception {
                    function: function & 0x7f,
                    code: ExceptionCode::from(code),
                },
            });
        }

        match FunctionCode::try_from(function) {
            Ok(FunctionCode::ReadHoldingRegisters) => {
                let (&byte_count, rest) = rest.split_first().ok_or_else(|| {
                    Error::MalformedFrame("truncated read response".to_string())
                })?;
                if byte_count as usize != rest.len() || byte_count % 2 != 0 {
                    return Err(Error::MalformedFrame(format!(
                        "byte count {} does not match payload",
                        byte_count
                    )));
                }
                let values = rest
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Ok(Self {
                    header,
                    pdu: ResponsePdu::ReadHoldingRegisters { values },
                })
            }
            Err(_) => Err(Error::MalformedFrame(format!(
                "unsupported function code {}",
                function
            ))),
        }
    }
}

/// Incremental decoder for response frames arriving on a TCP stream.
///
/// Frames are delimited by the MBAP length field, so a partial read simply
/// leaves bytes in the buffer until the rest arrives.
#[derive(Default)]
pub struct FrameDecoder;

impl FrameDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameDecoder {
    type Item = ResponseFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ResponseFrame>, Error> {
        if src.len() < MIN_FRAME_LEN {
            return Ok(None);
        }

        let length = u16::from_be_bytes([src[4], src[5]]) as usize;
        if length < 2 {
            return Err(Error::MalformedFrame(format!(
                "length field {} too small for unit id and function",
                length
            )));
        }

        let total = 6 + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total);
        ResponseFrame::parse_frame(&frame).map(Some)
    }
}
