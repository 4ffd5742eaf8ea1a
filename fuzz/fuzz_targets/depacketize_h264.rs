// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]
use h264_depacketizer::{Depacketizer, DepacketizerOptions, PacketizationMode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut data = data;
    let mut nals = 0usize;
    let mut depacketizer = Depacketizer::with_options(
        |_hdr: u8, payload: &[u8]| {
            assert!(payload.len() <= 1 << 16);
            nals += 1;
        },
        DepacketizerOptions::default()
            .packetization_mode(PacketizationMode::Any)
            .max_nal_len(1 << 16),
    );
    let mut sequence_number: u16 = 0;
    loop {
        let (hdr, rest) = match data.split_first() {
            Some(r) => r,
            None => return,
        };
        let loss = (hdr & 0b001) != 0;
        let raw = (hdr & 0b010) != 0;
        let len = usize::from(hdr >> 2);
        if rest.len() < len {
            return;
        }
        let (payload, rest) = rest.split_at(len);
        data = rest;
        if loss {
            sequence_number = sequence_number.wrapping_add(1);
        }
        let _ = if raw {
            // Exercise the RTP header parser with arbitrary bytes.
            depacketizer.push(payload)
        } else {
            depacketizer.push_payload(sequence_number, payload)
        };
        depacketizer.check_invariants();
        sequence_number = sequence_number.wrapping_add(1);
    }
});
