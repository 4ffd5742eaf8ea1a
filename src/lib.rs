// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Depacketizer for H.264 video carried over RTP as described in
//! [RFC 6184](https://datatracker.ietf.org/doc/html/rfc6184).
//!
//! Feed RTP packets to a [`Depacketizer`] in the order decided by your jitter
//! buffer; it calls your [`NalSink`] once per reconstructed NAL unit.
//!
//! ```
//! use h264_depacketizer::{Depacketizer, DepacketizerOptions};
//!
//! let options = DepacketizerOptions::from_format_specific_params(
//!     "packetization-mode=1;profile-level-id=64001E",
//! )
//! .unwrap();
//! let mut nals = Vec::new();
//! let mut d = Depacketizer::with_options(
//!     |hdr: u8, payload: &[u8]| nals.push((hdr, payload.len())),
//!     options,
//! );
//!
//! // A STAP-A holding a 4-byte SPS and a 3-byte PPS, then a fragmented IDR slice.
//! d.push_payload(1, b"\x78\x00\x04\x67sps\x00\x03\x68pp").unwrap();
//! d.push_payload(2, b"\x7c\x85idr ").unwrap();
//! d.push_payload(3, b"\x7c\x45slice").unwrap();
//! drop(d);
//! assert_eq!(nals, vec![(0x67, 3), (0x68, 2), (0x65, 9)]);
//! ```

#![forbid(clippy::print_stderr, clippy::print_stdout)]

/// Wraps the supplied `ErrorInt` and returns it as an `Err`.
macro_rules! bail {
    ($e:expr) => {
        return Err(crate::error::Error(std::sync::Arc::new($e)))
    };
}

macro_rules! wrap {
    ($e:expr) => {
        crate::error::Error(std::sync::Arc::new($e))
    };
}

mod error;
pub mod h264;
mod hex;
pub mod rtp;

#[cfg(test)]
mod testutil;

pub use error::{Error, ErrorKind};
pub use h264::{
    Depacketizer, DepacketizerOptions, NalSink, PacketizationMode, PayloadKind,
    DEFAULT_MAX_NAL_LEN,
};
