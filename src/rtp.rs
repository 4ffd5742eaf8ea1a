// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handles RTP data as described in
//! [RFC 3550 section 5.1](https://datatracker.ietf.org/doc/html/rfc3550#section-5.1).
//!
//! Header validation is delegated to [`rtp-rs`](https://crates.io/crates/rtp-rs); this module
//! only exposes the fields the depacketizer needs and tracks sequence numbers.

use bytes::Bytes;
use log::debug;

use crate::error::ErrorInt;
use crate::Error;

/// The minimum length of an RTP header (no CSRCs or extensions).
const MIN_HEADER_LEN: usize = 12;

/// A validated, borrowed view of a raw RTP packet.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            contributing source (CSRC) identifiers             |
/// |                             ....                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Directly exposes the sequence number as a `u16` rather than `rtp_rs::Seq`.
#[derive(Copy, Clone)]
pub struct PacketRef<'a> {
    sequence_number: u16,
    timestamp: u32,
    ssrc: u32,
    payload_type: u8,
    mark: bool,
    payload: &'a [u8],
}

impl<'a> PacketRef<'a> {
    /// Validates a raw RTP packet, including CSRCs, extension, and padding.
    ///
    /// Fails with [`crate::ErrorKind::MalformedPacket`] on a corrupt header or an
    /// empty payload.
    pub fn parse(raw: &'a [u8]) -> Result<Self, Error> {
        if u16::try_from(raw.len()).is_err() {
            bail!(ErrorInt::RtpPacketError {
                description: format!("{}-byte packet is too long", raw.len()),
                data: raw.to_vec(),
            });
        }
        let reader = rtp_rs::RtpReader::new(raw).map_err(|e| {
            wrap!(ErrorInt::RtpPacketError {
                description: format!("{e:?}"),
                data: raw.to_vec(),
            })
        })?;
        let payload = reader.payload();
        if payload.is_empty() {
            bail!(ErrorInt::RtpPacketError {
                description: "empty payload".to_owned(),
                data: raw.to_vec(),
            });
        }
        Ok(PacketRef {
            sequence_number: u16::from_be_bytes([raw[2], raw[3]]),
            timestamp: reader.timestamp(),
            ssrc: reader.ssrc(),
            payload_type: reader.payload_type(),
            mark: reader.mark(),
            payload,
        })
    }

    #[inline]
    pub fn sequence_number(&self) -> u16 {
        self.sequence_number
    }

    #[inline]
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    #[inline]
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    #[inline]
    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    #[inline]
    pub fn mark(&self) -> bool {
        self.mark
    }

    /// Returns only the payload bytes, without headers or padding.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

impl std::fmt::Debug for PacketRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketRef")
            .field("sequence_number", &self.sequence_number)
            .field("timestamp", &self.timestamp)
            .field("ssrc", &self.ssrc)
            .field("payload_type", &self.payload_type)
            .field("mark", &self.mark)
            .field("payload", &crate::hex::LimitedHex::new(self.payload, 64))
            .finish()
    }
}

/// Testing API; exposed for fuzz tests and benchmarks.
///
/// Builds a minimal RTP packet: version 2, no padding, extension, or CSRCs.
#[doc(hidden)]
pub struct PacketBuilder {
    pub sequence_number: u16,
    pub timestamp: u32,
    pub payload_type: u8,
    pub ssrc: u32,
    pub mark: bool,
}

impl PacketBuilder {
    pub fn build<P: IntoIterator<Item = u8>>(self, payload: P) -> Result<Bytes, &'static str> {
        if self.payload_type >= 0x80 {
            return Err("payload type too large");
        }
        let data: Bytes = [
            2 << 6, // version=2, no padding, no extensions, no CSRCs.
            if self.mark { 0b1000_0000 } else { 0 } | self.payload_type,
        ]
        .into_iter()
        .chain(self.sequence_number.to_be_bytes())
        .chain(self.timestamp.to_be_bytes())
        .chain(self.ssrc.to_be_bytes())
        .chain(payload)
        .collect();
        if u16::try_from(data.len()).is_err() {
            return Err("payload too long");
        }
        debug_assert!(data.len() >= MIN_HEADER_LEN);
        Ok(data)
    }
}

/// Monitors RTP sequence numbers for gaps.
///
/// This is detection only: the depacketizer expects packets in the order
/// decided by an external jitter buffer, and any sequence number other than
/// the expected one is a loss event. Forward gaps are counted as lost packets;
/// backward jumps (duplicates or reordering the jitter buffer didn't fix)
/// are loss events but aren't counted.
#[derive(Debug, Default)]
pub(crate) struct SequenceTracker {
    next_seq: Option<u16>,
    lost_packets: u64,
}

impl SequenceTracker {
    /// Notes `sequence_number`, returning true iff it's a loss event.
    ///
    /// The first packet is never a loss event.
    pub(crate) fn observe(&mut self, sequence_number: u16) -> bool {
        let expected = self.next_seq.unwrap_or(sequence_number);
        self.next_seq = Some(sequence_number.wrapping_add(1));
        let skipped = sequence_number.wrapping_sub(expected);
        match skipped {
            0 => false,
            1..=0x8000 => {
                debug!(
                    "Lost {} packet(s) before seq={:04x}",
                    skipped, sequence_number
                );
                self.lost_packets += u64::from(skipped);
                true
            }
            _ => {
                debug!(
                    "Out-of-order or duplicate seq={:04x} when expecting seq={:04x}",
                    sequence_number, expected
                );
                true
            }
        }
    }

    /// Returns the total number of sequence numbers skipped by forward gaps.
    pub(crate) fn lost_packets(&self) -> u64 {
        self.lost_packets
    }
}
