// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fragmentation units: FU-A and FU-B.
//!
//! See [RFC 6184 section 5.8](https://datatracker.ietf.org/doc/html/rfc6184#section-5.8).
//!
//! ```text
//! FU-A:  [FU indicator: F|NRI|28] [FU header: S|E|R|type]             [FU payload]
//! FU-B:  [FU indicator: F|NRI|29] [FU header: S|E|R|type] [DON: u16]  [FU payload]
//! ```

use std::collections::TryReserveError;

use bytes::Buf;
use log::{debug, trace, warn};

use super::nal;
use super::NalSink;

const START_BIT: u8 = 0b1000_0000;
const END_BIT: u8 = 0b0100_0000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum FuKind {
    A,
    B,
}

/// A parsed fragmentation unit.
#[derive(Debug)]
pub(super) struct Fragment<'a> {
    indicator: u8,
    fu_header: u8,
    don: Option<u16>,
    data: &'a [u8],
}

impl<'a> Fragment<'a> {
    pub(super) fn parse(kind: FuKind, mut payload: &'a [u8]) -> Result<Self, String> {
        let prefix_len = match kind {
            FuKind::A => 2,
            FuKind::B => 4,
        };
        if payload.len() < prefix_len {
            return Err(format!(
                "FU-{:?} len {} is too short",
                kind,
                payload.len()
            ));
        }
        let indicator = payload.get_u8();
        let fu_header = payload.get_u8();
        let don = match kind {
            FuKind::A => None,
            FuKind::B => Some(payload.get_u16()),
        };
        Ok(Fragment {
            indicator,
            fu_header,
            don,
            data: payload,
        })
    }

    #[inline]
    fn start(&self) -> bool {
        (self.fu_header & START_BIT) != 0
    }

    #[inline]
    fn end(&self) -> bool {
        (self.fu_header & END_BIT) != 0
    }

    /// The header of the fragmented NAL: `F` and `NRI` from the indicator, type from the
    /// FU header. The `R` bit is ignored, as receivers are required to do.
    #[inline]
    fn nal_header(&self) -> u8 {
        (self.indicator & nal::F_NRI_MASK) | (self.fu_header & nal::TYPE_MASK)
    }
}

/// Failure to grow a [`ReassemblyBuffer`].
#[derive(Debug)]
pub(super) struct GrowthFailure {
    pub(super) len: usize,
    pub(super) requested: usize,

    /// The allocator's error, or `None` if the configured limit was exceeded.
    pub(super) source: Option<TryReserveError>,
}

#[derive(Debug)]
pub(super) enum FragmentError {
    Malformed(String),
    OutOfMemory(GrowthFailure),
}

/// Owned, growable storage for the fragmented NAL in progress.
///
/// The logical length is the number of bytes written so far; the allocation
/// is kept between NALs so a stream of similarly-sized frames settles into a
/// single buffer.
#[derive(Debug)]
pub(super) struct ReassemblyBuffer {
    buf: Vec<u8>,
    max_len: usize,
}

impl ReassemblyBuffer {
    pub(super) fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
        }
    }

    #[inline]
    pub(super) fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub(super) fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    #[inline]
    pub(super) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub(super) fn as_slice(&self) -> &[u8] {
        &self.buf[..]
    }

    /// Forgets the contents, retaining the allocation.
    #[inline]
    pub(super) fn clear(&mut self) {
        self.buf.clear();
    }

    /// Forgets the contents and frees the allocation.
    fn release(&mut self) {
        self.buf = Vec::new();
    }

    /// Appends `data`, growing with slack of twice the increment when full.
    ///
    /// On failure, the buffer is released.
    pub(super) fn append(&mut self, data: &[u8]) -> Result<(), GrowthFailure> {
        let len = self.buf.len();
        let requested = len.saturating_add(data.len());
        if requested > self.max_len {
            self.release();
            return Err(GrowthFailure {
                len,
                requested,
                source: None,
            });
        }
        if requested > self.buf.capacity() {
            let slack = data.len().saturating_mul(2).min(self.max_len - len);
            if let Err(e) = self.buf.try_reserve_exact(slack) {
                self.release();
                return Err(GrowthFailure {
                    len,
                    requested,
                    source: Some(e),
                });
            }
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }
}

/// Reassembles fragmented NAL units, at most one at a time.
#[derive(Debug)]
pub(super) struct Reassembler {
    /// Header of the fragmented NAL in progress, as reconstructed from its first fragment.
    /// `None` iff no fragmented NAL is in progress, in which case `buf` is empty.
    in_progress: Option<u8>,

    buf: ReassemblyBuffer,

    /// True if we've seen a FU sequence where the NAL headers differ between
    /// fragments.
    seen_inconsistent_nal_hdr: bool,
}

impl Reassembler {
    pub(super) fn new(max_nal_len: usize) -> Self {
        Self {
            in_progress: None,
            buf: ReassemblyBuffer::new(max_nal_len),
            seen_inconsistent_nal_hdr: false,
        }
    }

    pub(super) fn buf(&self) -> &ReassemblyBuffer {
        &self.buf
    }

    pub(super) fn check_invariants(&self) {
        if self.in_progress.is_none() {
            assert!(self.buf.is_empty());
        }
        assert!(self.buf.capacity() >= self.buf.len());
    }

    /// Discards the fragmented NAL in progress, if any, noting `reason` in the log.
    pub(super) fn discard(&mut self, reason: &str) {
        if let Some(hdr) = self.in_progress.take() {
            debug!(
                "Discarding {}-byte partial NAL {:?}: {}",
                self.buf.len(),
                nal::Header(hdr),
                reason
            );
        }
        self.buf.clear();
    }

    /// Handles one FU-A or FU-B payload, sending the NAL to `sink` on its end fragment.
    pub(super) fn push<S: NalSink>(
        &mut self,
        kind: FuKind,
        payload: &[u8],
        sink: &mut S,
    ) -> Result<(), FragmentError> {
        let frag = match Fragment::parse(kind, payload) {
            Ok(f) => f,
            Err(e) => {
                self.discard("malformed fragment");
                return Err(FragmentError::Malformed(e));
            }
        };
        let hdr = frag.nal_header();
        if !nal::is_single(hdr) {
            self.discard("malformed fragment");
            return Err(FragmentError::Malformed(format!(
                "bad reconstructed NAL header {:?} in FU-{:?} with FU header {:08b}",
                nal::Header(hdr),
                kind,
                frag.fu_header
            )));
        }
        if let Some(don) = frag.don {
            trace!("FU-B with DON {}", don);
        }

        if frag.start() {
            if self.in_progress.is_some() {
                self.discard("new start fragment before end");
            }
            self.in_progress = Some(hdr);
        } else {
            match self.in_progress {
                None => {
                    debug!(
                        "Dropping {}-byte FU-{:?} fragment of {:?} with no start fragment",
                        frag.data.len(),
                        kind,
                        nal::Header(hdr)
                    );
                    return Ok(());
                }
                Some(prev) if prev != hdr && !self.seen_inconsistent_nal_hdr => {
                    warn!(
                        "FU has inconsistent NAL header: {:?} then {:?}; will not log about this again for this stream",
                        nal::Header(prev),
                        nal::Header(hdr),
                    );
                    self.seen_inconsistent_nal_hdr = true;
                }
                Some(_) => {}
            }
        }

        if let Err(e) = self.buf.append(frag.data) {
            self.in_progress = None;
            return Err(FragmentError::OutOfMemory(e));
        }

        if frag.end() {
            super::emit(sink, hdr, self.buf.as_slice());
            self.buf.clear();
            self.in_progress = None;
        }
        Ok(())
    }
}
