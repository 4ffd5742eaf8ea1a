// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fmt::Display, sync::Arc};

use thiserror::Error;

/// An opaque `std::error::Error + Send + Sync + 'static` implementation.
///
/// The focus is on detailed human-readable error messages: most include the
/// RTP sequence number and enough of the payload to find the offending packet
/// in Wireshark. Use [`Error::kind`] to decide what to do programmatically.
#[derive(Clone)]
pub struct Error(pub(crate) Arc<ErrorInt>);

impl Error {
    /// Returns the broad category of this error.
    pub fn kind(&self) -> ErrorKind {
        match *self.0 {
            ErrorInt::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ErrorInt::RtpPacketError { .. } | ErrorInt::MalformedPacket { .. } => {
                ErrorKind::MalformedPacket
            }
            ErrorInt::UnsupportedPacketType { .. } => ErrorKind::UnsupportedPacketType,
            ErrorInt::OutOfMemory { .. } => ErrorKind::OutOfMemory,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

impl std::error::Error for Error {}

/// The category of an [`Error`].
///
/// No error is fatal to a [`crate::Depacketizer`]; after any of these the
/// caller may continue pushing packets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The caller supplied an invalid argument, such as unparseable
    /// format-specific parameters.
    InvalidArgument,

    /// The RTP packet or its H.264 payload is structurally invalid. Only the
    /// current packet is discarded.
    MalformedPacket,

    /// The payload is a valid RFC 6184 packet type which the configured
    /// packetization mode doesn't permit.
    UnsupportedPacketType,

    /// The reassembly buffer couldn't grow. The partially reassembled NAL unit
    /// was abandoned.
    OutOfMemory,
}

#[derive(Debug, Error)]
pub(crate) enum ErrorInt {
    /// The method's caller provided an invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The RTP header couldn't be parsed.
    #[error(
        "Corrupt RTP packet: {description}\n{:?}",
        crate::hex::LimitedHex::new(data, 64)
    )]
    RtpPacketError { description: String, data: Vec<u8> },

    #[error("[seq={sequence_number:04x}] Malformed packet: {description}")]
    MalformedPacket {
        sequence_number: u16,
        description: String,
    },

    #[error(
        "[seq={sequence_number:04x}] Unsupported packet type {} (header 0x{nal_header:02x}) \
         with packetization mode {mode}",
        nal_header & 0b1_1111
    )]
    UnsupportedPacketType {
        sequence_number: u16,
        nal_header: u8,
        mode: crate::PacketizationMode,
    },

    #[error(
        "[seq={sequence_number:04x}] Unable to grow reassembly buffer from {len} to \
         {requested} bytes; abandoned fragmented NAL"
    )]
    OutOfMemory {
        sequence_number: u16,
        len: usize,
        requested: usize,
        #[source]
        source: Option<std::collections::TryReserveError>,
    },
}
