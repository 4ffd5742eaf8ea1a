// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tests a roundtrip through FU-A fragmentation and the depacketizer with an arbitrary
//! fragment size and NAL. Ensures the following:
//! *   there are no crashes.
//! *   the round trip produces an error or identical data.

#![no_main]
use h264_depacketizer::rtp::PacketBuilder;
use h264_depacketizer::Depacketizer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let max_fragment = usize::from(u16::from_be_bytes([data[0], data[1]]));
    let nal = &data[2..];
    if max_fragment == 0 || !matches!(nal[0] & 0x1f, 1..=23) {
        return;
    }
    let mut out = Vec::new();
    let mut d = Depacketizer::new(|hdr: u8, payload: &[u8]| out.push((hdr, payload.to_vec())));
    let indicator = (nal[0] & 0xe0) | 28;
    let chunks: Vec<&[u8]> = nal[1..].chunks(max_fragment).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        let mut fu_header = nal[0] & 0x1f;
        if i == 0 {
            fu_header |= 0x80;
        }
        if i == chunks.len() - 1 {
            fu_header |= 0x40;
        }
        let pkt = match (PacketBuilder {
            sequence_number: i as u16,
            timestamp: 0,
            payload_type: 96,
            ssrc: 0,
            mark: i == chunks.len() - 1,
        })
        .build([indicator, fu_header].into_iter().chain(chunk.iter().copied()))
        {
            Ok(p) => p,
            Err(_) => return,
        };
        if d.push(&pkt).is_err() {
            return;
        }
        d.check_invariants();
    }
    drop(d);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0, nal[0]);
    assert_eq!(&out[0].1[..], &nal[1..]);
});
