// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fragmentation and reassembly for unreliable (UDP) data.
//!
//! - **Fragmentation**: split payloads into packets that fit one datagram
//!   without IP fragmentation
//! - **Reassembly**: rebuild payloads per (sender, message id)
//! - **Timeout**: drop sets that stop receiving fragments
//! - **Memory bounds**: cap partial sets per sender
//!
//! # Usage
//!
//! ```
//! use std::time::Instant;
//! use nuclearnet::fragment::{Fragmenter, Reassembler, ReassemblerConfig};
//! use nuclearnet::protocol::TypeHash;
//!
//! let payload = vec![42u8; 4000];
//! let packets = Fragmenter::new(1440)
//!     .fragment(0, TypeHash::of("message.Image"), &payload, false)
//!     .unwrap();
//! assert_eq!(packets.len(), 3);
//!
//! let mut reassembler: Reassembler<u32> = Reassembler::new(ReassemblerConfig::default());
//! let mut done = None;
//! for packet in packets {
//!     done = reassembler.on_fragment(&1, packet, Instant::now());
//! }
//! assert_eq!(done, Some(payload));
//! ```

mod fragmenter;
mod reassembler;

pub use fragmenter::{Fragmenter, MessageIdCounter};
pub use reassembler::{Reassembler, ReassemblerConfig, ReassemblerStats};
