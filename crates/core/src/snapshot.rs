// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::model::CoreProbe;
use crate::signals::MemRequest;
use serde::Serialize;

/// Inspectable summary rebuilt at the end of every tick.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct BackendSnapshot {
    pub cycles: u64,
    pub core: CoreProbe,
    pub iport: PortSnapshot,
    pub dport: PortSnapshot,
    pub uart: Option<UartSnapshot>,
    pub total_faults: u64,
    pub halted: Option<u32>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct PortSnapshot {
    pub requests: u64,
    pub last_request: Option<MemRequest>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UartSnapshot {
    pub name: String,
    pub status: u8,
    pub cycles_per_bit: u32,
    pub tx_pending: Option<u8>,
    pub tx_remaining: u32,
    pub rx_queued: usize,
    pub bytes_transmitted: u64,
    pub bytes_received: u64,
    pub transcript_dropped: u64,
}
