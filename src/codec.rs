//! Wire format for the RIPv2-style response packets exchanged between routers.
//!
//! Layout (network byte order throughout):
//!
//! ```text
//! command(1) | version(1) | sender_router_id(2)                          # header, 4 bytes
//! addr_family(2) | zero(2) | router_id(4) | zero(4) | zero(4) | metric(4) # entry, 20 bytes, repeated
//! ```
//!
//! Only RIP Responses are ever produced or accepted; Requests are rejected
//! at decode time like any other unsupported command.

use crate::RouterId;
use bytepack::{raw_enum, BytestreamWriter, ReadBytesExt, ToBytestream, BE};
use std::io::{self, Cursor};
use thiserror::Error;

/// `address_family` value used for every entry (AF_INET).
pub const AF_INET: u16 = 2;
/// The metric that denotes an unreachable destination.
pub const INFINITY: u8 = 16;

const HEADER_LEN: usize = 4;
const ENTRY_LEN: usize = 20;
const VERSION: u8 = 2;

raw_enum! {
    /// The RIP command carried in the packet header. This daemon only ever
    /// emits `Response`; `Request` is kept so decoding can name the reason a
    /// datagram was rejected rather than just reporting "bad command".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum RipCommand {
        type Repr = u8 where BigEndian;
        Request = 1,
        Response = 2,
    }
}

impl ToBytestream for RipCommand {
    type Error = io::Error;
    fn to_bytestream(&self, stream: &mut BytestreamWriter) -> Result<(), Self::Error> {
        self.to_raw_repr().to_bytestream(stream)
    }
}

/// One advertised destination inside a packet: `(destination, metric)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireEntry {
    pub destination: RouterId,
    pub metric: u8,
}

/// A decoded or to-be-encoded RIP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipPacket {
    pub sender: RouterId,
    pub entries: Vec<WireEntry>,
}

impl RipPacket {
    /// Serializes the packet into a fresh byte vector.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        self.to_vec()
    }
}

impl ToBytestream for RipPacket {
    type Error = io::Error;
    fn to_bytestream(&self, stream: &mut BytestreamWriter) -> Result<(), Self::Error> {
        RipCommand::Response.to_bytestream(stream)?;
        VERSION.to_bytestream(stream)?;
        (self.sender as u16).to_bytestream(stream)?;

        for entry in &self.entries {
            AF_INET.to_bytestream(stream)?;
            0u16.to_bytestream(stream)?;
            u32::from(entry.destination).to_bytestream(stream)?;
            0u32.to_bytestream(stream)?;
            0u32.to_bytestream(stream)?;
            u32::from(entry.metric).to_bytestream(stream)?;
        }
        Ok(())
    }
}

/// Reasons a received datagram is not a valid RIP response.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected a RIP response (command=2), got command={0}")]
    WrongCommand(u8),
    #[error("unsupported RIP version {0}, expected 2")]
    WrongVersion(u8),
    #[error("datagram length {0} is not `4 + 20*k` for k >= 1")]
    BadLength(usize),
    #[error("reserved field was non-zero in entry {0}")]
    NonZeroReserved(usize),
    #[error("metric {0} in entry {1} is out of range [0, 16]")]
    MetricOutOfRange(u8, usize),
}

/// Decodes a received datagram into the sender's id and its advertised entries.
///
/// Rejects anything that is not a well-formed RIPv2 response: wrong command
/// or version, a length that isn't `4 + 20*k` for `k >= 1`, non-zero reserved
/// fields, or a metric outside `[0, 16]`. A header-only datagram (`len == 4`)
/// decodes successfully with zero entries.
pub fn decode(data: &[u8]) -> Result<RipPacket, DecodeError> {
    if data.len() < HEADER_LEN || (data.len() - HEADER_LEN) % ENTRY_LEN != 0 {
        return Err(DecodeError::BadLength(data.len()));
    }

    let mut cursor = Cursor::new(data);
    let command = cursor.read_u8().expect("length checked above");
    if command != RipCommand::Response.to_raw_repr() {
        return Err(DecodeError::WrongCommand(command));
    }
    let version = cursor.read_u8().expect("length checked above");
    if version != VERSION {
        return Err(DecodeError::WrongVersion(version));
    }
    let sender = cursor.read_u16::<BE>().expect("length checked above") as RouterId;

    let entry_count = (data.len() - HEADER_LEN) / ENTRY_LEN;
    let mut by_destination = fxhash::FxHashMap::default();
    let mut order = Vec::with_capacity(entry_count);

    for i in 0..entry_count {
        let _addr_family = cursor.read_u16::<BE>().unwrap();
        let zero_a = cursor.read_u16::<BE>().unwrap();
        let destination = cursor.read_u32::<BE>().unwrap();
        let zero_b = cursor.read_u32::<BE>().unwrap();
        let zero_c = cursor.read_u32::<BE>().unwrap();
        let metric = cursor.read_u32::<BE>().unwrap();

        if zero_a != 0 || zero_b != 0 || zero_c != 0 {
            return Err(DecodeError::NonZeroReserved(i));
        }
        if metric > u32::from(INFINITY) {
            return Err(DecodeError::MetricOutOfRange(metric as u8, i));
        }

        let destination = destination as RouterId;
        // Duplicate destinations within one packet: the last one wins.
        if !by_destination.contains_key(&destination) {
            order.push(destination);
        }
        by_destination.insert(destination, metric as u8);
    }

    let entries = order
        .into_iter()
        .map(|destination| WireEntry {
            destination,
            metric: by_destination[&destination],
        })
        .collect();

    Ok(RipPacket { sender, entries })
}
