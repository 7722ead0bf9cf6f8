// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Boundary to the clocked hardware model.

pub mod replay;

use crate::signals::{MemPort, PortId};
use serde::Serialize;

pub use replay::{ReadRecord, ReplayModel, ReplayScript, Step};

/// Core state a model may expose for monitoring.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreProbe {
    pub pc: u32,
    pub retired: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub registers: Vec<u32>,
}

/// A synchronous model that advances one state transition per `clock`.
///
/// The backend drives `rdata`/`ack` on both ports before each `clock` call
/// and samples `addr`/`wdata`/`sel`/`we`/`valid` before the next one.
pub trait HardwareModel {
    fn port(&self, id: PortId) -> &MemPort;
    fn port_mut(&mut self, id: PortId) -> &mut MemPort;
    /// One rising clock edge.
    fn clock(&mut self);
    /// Exit code once the simulated program has signaled completion.
    fn halted(&self) -> Option<u32>;
    fn probe(&self) -> CoreProbe {
        CoreProbe::default()
    }
}
