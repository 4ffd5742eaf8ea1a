// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! NAL header helpers and RFC 6184 payload structure classification.

use h264_reader::nal::UnitType;

/// Mask of the `Type` field within a NAL header, FU indicator, or FU header.
pub(crate) const TYPE_MASK: u8 = 0b0001_1111;

/// Mask of the `F` and `NRI` fields within a NAL header or FU indicator.
pub(crate) const F_NRI_MASK: u8 = 0b1110_0000;

/// Payload structure, as selected by the `Type` field of the first payload byte.
///
/// See [RFC 6184 section 5.2](https://datatracker.ietf.org/doc/html/rfc6184#section-5.2), table 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    /// Types 1–23: the payload is exactly one NAL unit.
    Single,
    StapA,
    StapB,
    Mtap16,
    Mtap24,
    FuA,
    FuB,

    /// Types 0, 30, and 31.
    Reserved,
}

impl PayloadKind {
    pub fn classify(nal_header: u8) -> Self {
        match nal_header & TYPE_MASK {
            1..=23 => PayloadKind::Single,
            24 => PayloadKind::StapA,
            25 => PayloadKind::StapB,
            26 => PayloadKind::Mtap16,
            27 => PayloadKind::Mtap24,
            28 => PayloadKind::FuA,
            29 => PayloadKind::FuB,
            _ => PayloadKind::Reserved,
        }
    }
}

/// Returns true iff `nal_header` describes a NAL unit which may appear on its own,
/// in an aggregation packet, or as the reconstruction of a fragmented NAL.
#[inline]
pub(crate) fn is_single(nal_header: u8) -> bool {
    matches!(nal_header & TYPE_MASK, 1..=23)
}

/// `Debug` wrapper naming a NAL header's unit type and reference indicator.
pub(crate) struct Header(pub(crate) u8);

impl std::fmt::Debug for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nal_ref_idc = (self.0 >> 5) & 0b11;
        match UnitType::for_id(self.0 & TYPE_MASK) {
            Ok(t) => write!(f, "0x{:02x} ({:?}, nal_ref_idc={})", self.0, t, nal_ref_idc),
            Err(_) => write!(f, "0x{:02x} (nal_ref_idc={})", self.0, nal_ref_idc),
        }
    }
}
