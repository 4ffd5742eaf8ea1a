// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregation packets: STAP-A, STAP-B, MTAP16, and MTAP24.
//!
//! See [RFC 6184 section 5.7](https://datatracker.ietf.org/doc/html/rfc6184#section-5.7).
//!
//! ```text
//! STAP-A:  [type]                      ([len: u16] [NAL hdr] [NAL payload])*
//! STAP-B:  [type] [DON: u16]           ([len: u16] [NAL hdr] [NAL payload])*
//! MTAP16:  [type] [DONB: u16]  ([len: u16] [DOND: u8] [TS offset: u16] [NAL hdr] [NAL payload])*
//! MTAP24:  [type] [DONB: u16]  ([len: u16] [DOND: u8] [TS offset: u24] [NAL hdr] [NAL payload])*
//! ```

use bytes::Buf;
use log::{debug, trace};

use super::nal;
use super::NalSink;

/// The length of each record's length field.
const LEN_FIELD_LEN: usize = 2;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum Aggregation {
    StapA,
    StapB,
    Mtap16,
    Mtap24,
}

impl Aggregation {
    fn name(self) -> &'static str {
        match self {
            Aggregation::StapA => "STAP-A",
            Aggregation::StapB => "STAP-B",
            Aggregation::Mtap16 => "MTAP16",
            Aggregation::Mtap24 => "MTAP24",
        }
    }

    /// Length of the DON (STAP-B) or DONB (MTAP) field following the type byte.
    fn don_len(self) -> usize {
        match self {
            Aggregation::StapA => 0,
            _ => 2,
        }
    }

    /// Length of the DOND and TS offset fields preceding each NAL header.
    fn record_prefix_len(self) -> usize {
        match self {
            Aggregation::StapA | Aggregation::StapB => 0,
            Aggregation::Mtap16 => 1 + 2,
            Aggregation::Mtap24 => 1 + 3,
        }
    }
}

/// One NAL unit within an aggregation packet.
#[derive(Debug)]
pub(super) struct AggregatedNal<'a> {
    /// For MTAPs, the `DOND` and `TS offset` fields.
    pub(super) mtap_fields: Option<(u8, u32)>,
    pub(super) hdr: u8,
    pub(super) payload: &'a [u8],
}

/// Iterator through the records of an aggregation packet.
///
/// Stops after the first error.
#[derive(Clone)]
pub(super) struct Records<'a> {
    kind: Aggregation,
    data: &'a [u8],
    failed: bool,
}

impl<'a> Records<'a> {
    /// Parses the packet's fixed header, returning its DON/DONB (if any) and the records.
    ///
    /// `payload` includes the type byte.
    pub(super) fn new(kind: Aggregation, payload: &'a [u8]) -> Result<(Option<u16>, Self), String> {
        let header_len = 1 + kind.don_len();
        if payload.len() < header_len {
            return Err(format!(
                "{}-byte {} is too short for its {}-byte header",
                payload.len(),
                kind.name(),
                header_len
            ));
        }
        let mut data = &payload[1..];
        let don = match kind.don_len() {
            0 => None,
            _ => Some(data.get_u16()),
        };
        Ok((
            don,
            Records {
                kind,
                data,
                failed: false,
            },
        ))
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<AggregatedNal<'a>, String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.data.remaining() < LEN_FIELD_LEN + 1 {
            if !self.data.is_empty() {
                debug!(
                    "Ignoring {} trailing byte(s) in {}",
                    self.data.len(),
                    self.kind.name()
                );
                self.data = &[];
            }
            return None;
        }
        let len = usize::from(self.data.get_u16());
        if len > self.data.remaining() {
            self.failed = true;
            return Some(Err(format!(
                "{} too short: {} bytes remaining, expecting {}-byte record",
                self.kind.name(),
                self.data.remaining(),
                len
            )));
        }
        let (mut record, rest) = self.data.split_at(len);
        self.data = rest;
        let prefix_len = self.kind.record_prefix_len();
        if len < prefix_len + 1 {
            self.failed = true;
            return Some(Err(format!(
                "{}-byte {} record has no room for a NAL header",
                len,
                self.kind.name()
            )));
        }
        let mtap_fields = match self.kind {
            Aggregation::StapA | Aggregation::StapB => None,
            Aggregation::Mtap16 => Some((record.get_u8(), u32::from(record.get_u16()))),
            Aggregation::Mtap24 => {
                let dond = record.get_u8();
                let ts_offset = record.get_uint(3) as u32;
                Some((dond, ts_offset))
            }
        };
        let hdr = record[0];
        if !nal::is_single(hdr) {
            self.failed = true;
            return Some(Err(format!(
                "bad NAL header {:?} in {}",
                nal::Header(hdr),
                self.kind.name()
            )));
        }
        Some(Ok(AggregatedNal {
            mtap_fields,
            hdr,
            payload: &record[1..],
        }))
    }
}

/// Splits an aggregation packet into its NAL units, sending each to `sink` in order.
///
/// The whole packet is validated before the first NAL is sent, so on error `sink` has
/// received nothing from this packet.
pub(super) fn depacketize<S: NalSink>(
    kind: Aggregation,
    payload: &[u8],
    sink: &mut S,
) -> Result<(), String> {
    let (don, records) = Records::new(kind, payload)?;
    for record in records.clone() {
        record?;
    }
    if let Some(don) = don {
        trace!("{} with DON/DONB {}", kind.name(), don);
    }
    for record in records {
        let nal = record?;
        if let Some((dond, ts_offset)) = nal.mtap_fields {
            trace!(
                "{} record: DOND {}, TS offset {}",
                kind.name(),
                dond,
                ts_offset
            );
        }
        super::emit(sink, nal.hdr, nal.payload);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{depacketize, Aggregation, Records};
    use crate::testutil::init_logging;

    fn collect(kind: Aggregation, payload: &[u8]) -> Result<Vec<(u8, Vec<u8>)>, String> {
        let mut out = Vec::new();
        depacketize(kind, payload, &mut |hdr: u8, payload: &[u8]| {
            out.push((hdr, payload.to_vec()))
        })?;
        Ok(out)
    }

    #[test]
    fn stap_a() {
        init_logging();
        let nals = collect(
            Aggregation::StapA,
            b"\x78\x00\x05\x67sps!\x00\x03\x68pp\x00\x04\x65idr",
        )
        .unwrap();
        assert_eq!(
            nals,
            vec![
                (0x67, b"sps!".to_vec()),
                (0x68, b"pp".to_vec()),
                (0x65, b"idr".to_vec()),
            ]
        );
    }

    #[test]
    fn stap_b() {
        init_logging();
        let (don, records) =
            Records::new(Aggregation::StapB, b"\x19\x01\x02\x00\x03\x06ab\x00\x02\x09c").unwrap();
        assert_eq!(don, Some(0x0102));
        let nals: Vec<_> = records.map(|r| r.unwrap()).collect();
        assert_eq!(nals.len(), 2);
        assert_eq!((nals[0].hdr, nals[0].payload), (0x06, &b"ab"[..]));
        assert_eq!((nals[1].hdr, nals[1].payload), (0x09, &b"c"[..]));
    }

    #[test]
    fn mtap16() {
        init_logging();
        let payload = b"\x1a\x00\x10\
                        \x00\x07\x00\x01\x2c\x41abc\
                        \x00\x05\x01\x02\x58\x01z";
        let (don, records) = Records::new(Aggregation::Mtap16, payload).unwrap();
        assert_eq!(don, Some(0x0010));
        let nals: Vec<_> = records.map(|r| r.unwrap()).collect();
        assert_eq!(nals.len(), 2);
        assert_eq!(nals[0].mtap_fields, Some((0, 300)));
        assert_eq!((nals[0].hdr, nals[0].payload), (0x41, &b"abc"[..]));
        assert_eq!(nals[1].mtap_fields, Some((1, 600)));
        assert_eq!((nals[1].hdr, nals[1].payload), (0x01, &b"z"[..]));
    }

    #[test]
    fn mtap24() {
        init_logging();
        let payload = b"\x1b\x00\x10\
                        \x00\x08\x02\x01\x00\x00\x65idr";
        let (_, records) = Records::new(Aggregation::Mtap24, payload).unwrap();
        let nals: Vec<_> = records.map(|r| r.unwrap()).collect();
        assert_eq!(nals.len(), 1);
        assert_eq!(nals[0].mtap_fields, Some((2, 0x01_0000)));
        assert_eq!((nals[0].hdr, nals[0].payload), (0x65, &b"idr"[..]));
    }

    #[test]
    fn header_only_nal() {
        init_logging();
        let nals = collect(Aggregation::StapA, b"\x18\x00\x01\x09\x00\x02\x06x").unwrap();
        assert_eq!(nals, vec![(0x09, vec![]), (0x06, b"x".to_vec())]);
    }

    #[test]
    fn ignores_short_trailer() {
        init_logging();
        let nals = collect(Aggregation::StapA, b"\x18\x00\x02\x06x\x00\x00").unwrap();
        assert_eq!(nals, vec![(0x06, b"x".to_vec())]);
    }

    #[test_case(Aggregation::StapA, b"\x18\x00\x02\x06x\x00\x09\x06short" ; "truncated record")]
    #[test_case(Aggregation::StapA, b"\x18\x00\x00\x00\x02\x06x" ; "zero length")]
    #[test_case(Aggregation::StapA, b"\x18\x00\x02\x06x\x00\x02\x1cx" ; "FU-A inside STAP-A")]
    #[test_case(Aggregation::StapA, b"\x18\x00\x02\x00x" ; "type 0 inside STAP-A")]
    #[test_case(Aggregation::StapB, b"\x19\x00" ; "STAP-B missing DON")]
    #[test_case(Aggregation::Mtap16, b"\x1a\x00\x00\x00\x03\x00\x00\x01" ; "MTAP16 record without NAL header")]
    #[test_case(Aggregation::Mtap24, b"\x1b\x00\x00\x00\x04\x00\x00\x00\x01" ; "MTAP24 record without NAL header")]
    fn malformed(kind: Aggregation, payload: &[u8]) {
        init_logging();
        let mut calls = 0;
        depacketize(kind, payload, &mut |_: u8, _: &[u8]| calls += 1).unwrap_err();
        assert_eq!(calls, 0, "malformed packets must not emit any NAL");
    }
}
