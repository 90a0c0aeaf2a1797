// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fuzz target for the datagram decoder
//!
//! Every UDP datagram goes through `WirePacket::decode`; it must reject
//! garbage without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use nuclearnet::protocol::WirePacket;

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = WirePacket::decode(data) {
        // Anything accepted must survive re-encoding
        assert!(WirePacket::decode(&packet.encode()).is_ok());
    }
});
