// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Port signal bundles shared between the backend and a hardware model.

use crate::{AccessError, AccessResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortId {
    Instruction,
    Data,
}

impl PortId {
    /// Servicing order within one tick.
    pub const ALL: [PortId; 2] = [PortId::Instruction, PortId::Data];

    pub fn index(self) -> usize {
        match self {
            PortId::Instruction => 0,
            PortId::Data => 1,
        }
    }
}

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortId::Instruction => write!(f, "iport"),
            PortId::Data => write!(f, "dport"),
        }
    }
}

/// One 32-bit memory port.
///
/// `addr`, `wdata`, `sel`, `we` and `valid` are driven by the model;
/// `rdata` and `ack` are driven by the backend for the next clock edge.
/// `addr` is a word address: its low two bits are ignored and `sel` selects
/// the byte lanes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemPort {
    pub addr: u32,
    pub wdata: u32,
    pub sel: u8,
    pub we: bool,
    pub valid: bool,
    pub rdata: u32,
    pub ack: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Read,
    Write,
}

/// A decoded access pending on a port for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemRequest {
    pub addr: u32,
    pub direction: Direction,
    pub width: u32,
    /// Write data, right-aligned (byte 0 is the lowest addressed byte).
    pub data: u32,
}

impl MemRequest {
    /// Decodes the byte-enable lanes of a valid port into a request.
    ///
    /// A zero or non-contiguous `sel` is malformed and reported as a
    /// misaligned span at the word address.
    pub fn from_port(port: &MemPort) -> AccessResult<Self> {
        let word = port.addr & !3;
        let sel = port.sel & 0xF;
        if sel == 0 {
            return Err(AccessError::MisalignedSpan { addr: word, width: 0 });
        }
        let lane = sel.trailing_zeros();
        let width = sel.count_ones();
        if (sel >> lane) != (1u8 << width) - 1 {
            return Err(AccessError::MisalignedSpan {
                addr: word + lane,
                width,
            });
        }

        let (direction, data) = if port.we {
            (Direction::Write, port.wdata >> (lane * 8))
        } else {
            (Direction::Read, 0)
        };

        Ok(Self {
            addr: word + lane,
            direction,
            width,
            data,
        })
    }

    /// Byte lane of the first accessed byte within the port word.
    pub fn lane(&self) -> u32 {
        self.addr & 3
    }

    pub fn data_bytes(&self) -> [u8; 4] {
        self.data.to_le_bytes()
    }
}
