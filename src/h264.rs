// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [H.264](https://www.itu.int/rec/T-REC-H.264-201906-I/en)-encoded video,
//! with RTP encoding as in [RFC 6184](https://tools.ietf.org/html/rfc6184).

mod aggregation;
mod fragment;
pub(crate) mod nal;

use log::{log_enabled, trace};

use crate::error::ErrorInt;
use crate::rtp::{PacketRef, SequenceTracker};
use crate::Error;

use self::aggregation::Aggregation;
use self::fragment::{FragmentError, FuKind, Reassembler};
pub use self::nal::PayloadKind;

/// Default value of [`DepacketizerOptions::max_nal_len`]: 16 MiB.
pub const DEFAULT_MAX_NAL_LEN: usize = 16 << 20;

/// Consumer of depacketized NAL units.
///
/// Called synchronously from within [`Depacketizer::push`] once per complete NAL unit.
/// `payload` excludes the header byte and is only valid for the duration of the call;
/// copy it to retain it.
///
/// Implemented for any `FnMut(u8, &[u8])`, so a closure capturing its context works:
///
/// ```
/// let mut nals = Vec::new();
/// let mut d = h264_depacketizer::Depacketizer::new(|hdr: u8, payload: &[u8]| {
///     nals.push((hdr, payload.to_vec()));
/// });
/// d.push_payload(0, b"\x65idr slice").unwrap();
/// drop(d);
/// assert_eq!(nals, vec![(0x65, b"idr slice".to_vec())]);
/// ```
pub trait NalSink {
    fn nal(&mut self, nal_header: u8, payload: &[u8]);
}

impl<F: FnMut(u8, &[u8])> NalSink for F {
    #[inline]
    fn nal(&mut self, nal_header: u8, payload: &[u8]) {
        self(nal_header, payload)
    }
}

/// Sends one NAL unit to `sink`.
fn emit<S: NalSink>(sink: &mut S, nal_header: u8, payload: &[u8]) {
    if log_enabled!(log::Level::Trace) {
        trace!(
            "NAL {:?}, {} payload bytes",
            nal::Header(nal_header),
            payload.len()
        );
    }
    sink.nal(nal_header, payload);
}

/// Which packet types to accept, as negotiated via the SDP `packetization-mode` parameter.
///
/// See [RFC 6184 section 6](https://datatracker.ietf.org/doc/html/rfc6184#section-6),
/// table 3. Packet types outside the mode fail with
/// [`crate::ErrorKind::UnsupportedPacketType`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketizationMode {
    /// Default policy: accept every packet type RFC 6184 defines. Many senders
    /// don't signal `packetization-mode` accurately.
    Any,

    /// Mode 0: single NAL unit packets only.
    SingleNalUnit,

    /// Mode 1: single NAL unit packets, STAP-A, and FU-A.
    NonInterleaved,

    /// Mode 2: STAP-B, MTAP16, MTAP24, FU-A, and FU-B.
    Interleaved,
}

impl Default for PacketizationMode {
    fn default() -> Self {
        PacketizationMode::Any
    }
}

impl PacketizationMode {
    /// Returns true iff packets of the given kind may appear in this mode.
    ///
    /// Reserved types are never permitted.
    pub fn permits(self, kind: PayloadKind) -> bool {
        use PayloadKind::*;
        match self {
            PacketizationMode::Any => kind != Reserved,
            PacketizationMode::SingleNalUnit => kind == Single,
            PacketizationMode::NonInterleaved => matches!(kind, Single | StapA | FuA),
            PacketizationMode::Interleaved => {
                matches!(kind, StapB | Mtap16 | Mtap24 | FuA | FuB)
            }
        }
    }
}

impl std::fmt::Display for PacketizationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketizationMode::Any => f.pad("any"),
            PacketizationMode::SingleNalUnit => f.pad("0"),
            PacketizationMode::NonInterleaved => f.pad("1"),
            PacketizationMode::Interleaved => f.pad("2"),
        }
    }
}

impl std::str::FromStr for PacketizationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "any" => PacketizationMode::Any,
            "0" => PacketizationMode::SingleNalUnit,
            "1" => PacketizationMode::NonInterleaved,
            "2" => PacketizationMode::Interleaved,
            _ => bail!(ErrorInt::InvalidArgument(format!(
                "packetization-mode {:?} not understood",
                s
            ))),
        })
    }
}

/// Options for a [`Depacketizer`].
#[derive(Clone, Debug)]
pub struct DepacketizerOptions {
    packetization_mode: PacketizationMode,
    max_nal_len: usize,
}

impl Default for DepacketizerOptions {
    fn default() -> Self {
        Self {
            packetization_mode: PacketizationMode::default(),
            max_nal_len: DEFAULT_MAX_NAL_LEN,
        }
    }
}

impl DepacketizerOptions {
    /// Derives options from the `format-specific-params` of a SDP `fmtp` media attribute.
    ///
    /// An absent `packetization-mode` means mode 0, as in
    /// [RFC 6184 section 8.1](https://datatracker.ietf.org/doc/html/rfc6184#section-8.1).
    /// Other parameters are ignored.
    pub fn from_format_specific_params(format_specific_params: &str) -> Result<Self, Error> {
        let mut packetization_mode = PacketizationMode::SingleNalUnit;
        for p in format_specific_params.split(';') {
            let Some((key, value)) = p.trim().split_once('=') else {
                continue;
            };
            if key.trim() == "packetization-mode" {
                packetization_mode = value.trim().parse()?;
            }
        }
        Ok(Self::default().packetization_mode(packetization_mode))
    }

    pub fn packetization_mode(self, packetization_mode: PacketizationMode) -> Self {
        Self {
            packetization_mode,
            ..self
        }
    }

    /// Limits the payload length of a reassembled fragmented NAL unit.
    ///
    /// Exceeding the limit abandons the NAL with [`crate::ErrorKind::OutOfMemory`], just as
    /// an allocation failure does. Defaults to [`DEFAULT_MAX_NAL_LEN`].
    pub fn max_nal_len(self, max_nal_len: usize) -> Self {
        Self {
            max_nal_len,
            ..self
        }
    }
}

/// Reconstructs NAL units from the RTP packets of one H.264 stream.
///
/// Packets must be pushed in the order decided by an external jitter buffer. A
/// sequence number other than the expected one is a loss event which discards any
/// partially reassembled fragmented NAL; no packets are buffered or reordered.
///
/// No error is fatal: after any `Err`, the caller may keep pushing packets.
///
/// Dropping the depacketizer releases its reassembly buffer.
#[derive(Debug)]
pub struct Depacketizer<S> {
    sink: S,
    packetization_mode: PacketizationMode,
    seq: SequenceTracker,
    fragment: Reassembler,
}

impl<S: NalSink> Depacketizer<S> {
    pub fn new(sink: S) -> Self {
        Self::with_options(sink, DepacketizerOptions::default())
    }

    pub fn with_options(sink: S, options: DepacketizerOptions) -> Self {
        Depacketizer {
            sink,
            packetization_mode: options.packetization_mode,
            seq: SequenceTracker::default(),
            fragment: Reassembler::new(options.max_nal_len),
        }
    }

    /// Processes a raw RTP packet, including its header.
    ///
    /// On success, the sink has already received every NAL unit this packet completed.
    pub fn push(&mut self, raw: &[u8]) -> Result<(), Error> {
        let pkt = PacketRef::parse(raw)?;
        self.push_packet(&pkt)
    }

    /// Processes an already-parsed RTP packet.
    pub fn push_packet(&mut self, pkt: &PacketRef<'_>) -> Result<(), Error> {
        self.push_payload(pkt.sequence_number(), pkt.payload())
    }

    /// Processes the payload of an RTP packet whose header was parsed elsewhere.
    pub fn push_payload(&mut self, sequence_number: u16, payload: &[u8]) -> Result<(), Error> {
        let Some(&nal_header) = payload.first() else {
            bail!(ErrorInt::MalformedPacket {
                sequence_number,
                description: "empty payload".to_owned(),
            });
        };
        if self.seq.observe(sequence_number) {
            self.fragment.discard("packet loss");
        }

        // https://tools.ietf.org/html/rfc6184#section-5.2
        let kind = PayloadKind::classify(nal_header);
        if kind == PayloadKind::Reserved {
            bail!(ErrorInt::MalformedPacket {
                sequence_number,
                description: format!(
                    "reserved NAL unit type {} (header 0x{:02x})",
                    nal_header & nal::TYPE_MASK,
                    nal_header
                ),
            });
        }
        if !self.packetization_mode.permits(kind) {
            bail!(ErrorInt::UnsupportedPacketType {
                sequence_number,
                nal_header,
                mode: self.packetization_mode,
            });
        }
        let aggregation = match kind {
            PayloadKind::Single => {
                emit(&mut self.sink, nal_header, &payload[1..]);
                return Ok(());
            }
            PayloadKind::FuA | PayloadKind::FuB => {
                let fu = if kind == PayloadKind::FuA {
                    FuKind::A
                } else {
                    FuKind::B
                };
                return self
                    .fragment
                    .push(fu, payload, &mut self.sink)
                    .map_err(|e| match e {
                        FragmentError::Malformed(description) => wrap!(ErrorInt::MalformedPacket {
                            sequence_number,
                            description,
                        }),
                        FragmentError::OutOfMemory(f) => wrap!(ErrorInt::OutOfMemory {
                            sequence_number,
                            len: f.len,
                            requested: f.requested,
                            source: f.source,
                        }),
                    });
            }
            PayloadKind::StapA => Aggregation::StapA,
            PayloadKind::StapB => Aggregation::StapB,
            PayloadKind::Mtap16 => Aggregation::Mtap16,
            PayloadKind::Mtap24 => Aggregation::Mtap24,
            PayloadKind::Reserved => unreachable!("reserved types are rejected above"),
        };
        aggregation::depacketize(aggregation, payload, &mut self.sink).map_err(|description| {
            wrap!(ErrorInt::MalformedPacket {
                sequence_number,
                description,
            })
        })
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[inline]
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consumes the depacketizer, returning its sink. Any partial NAL is discarded.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Returns the total number of packets skipped by forward sequence number gaps.
    #[inline]
    pub fn lost_packets(&self) -> u64 {
        self.seq.lost_packets()
    }

    /// Returns the `(len, capacity)` of the reassembly buffer.
    #[doc(hidden)]
    pub fn reassembly_buffer(&self) -> (usize, usize) {
        let b = self.fragment.buf();
        (b.len(), b.capacity())
    }

    /// Panics if internal state is inconsistent. Exposed for fuzz tests.
    #[doc(hidden)]
    pub fn check_invariants(&self) {
        self.fragment.check_invariants();
    }
}
