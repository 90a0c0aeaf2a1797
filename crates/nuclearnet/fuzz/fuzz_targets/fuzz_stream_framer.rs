// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fuzz target for TCP stream framing
//!
//! Feeds the input in uneven chunks, as a socket would deliver it.

#![no_main]

use libfuzzer_sys::fuzz_target;
use nuclearnet::protocol::WirePacket;
use nuclearnet::transport::PacketFramer;

fuzz_target!(|data: &[u8]| {
    let mut framer = PacketFramer::new(64 * 1024);
    let split = data.first().map(|b| (*b as usize % 17) + 1).unwrap_or(1);

    'outer: for chunk in data.chunks(split) {
        framer.feed(chunk);
        loop {
            match framer.next_packet() {
                Ok(Some(packet)) => {
                    let _ = WirePacket::decode(&packet);
                }
                Ok(None) => break,
                Err(_) => break 'outer,
            }
        }
    }
});
