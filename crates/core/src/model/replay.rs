// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Scripted model replaying port transactions.
//!
//! Each port plays its own list of steps. A request step keeps `valid`
//! asserted until the backend acknowledges it on a clock edge; `poll`
//! re-issues its read until the masked value matches.

use super::{CoreProbe, HardwareModel};
use crate::signals::{MemPort, PortId};
use serde::{Deserialize, Serialize};

fn full_word() -> u8 {
    0xF
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Read {
        addr: u32,
        #[serde(default = "full_word")]
        sel: u8,
    },
    /// `data` is right-aligned; it is shifted into the lanes named by `sel`.
    Write {
        addr: u32,
        data: u32,
        #[serde(default = "full_word")]
        sel: u8,
    },
    Poll {
        addr: u32,
        mask: u32,
        value: u32,
        #[serde(default = "full_word")]
        sel: u8,
    },
    Idle(u32),
    Halt(u32),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayScript {
    // Steps are written as `- read: {..}` maps rather than YAML tags.
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub instruction: Vec<Step>,
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub data: Vec<Step>,
}

/// A completed read, value right-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadRecord {
    pub cycle: u64,
    pub port: PortId,
    pub addr: u32,
    pub value: u32,
}

#[derive(Debug, Default)]
struct Stream {
    steps: Vec<Step>,
    pos: usize,
    idle_left: u32,
}

impl Stream {
    fn current(&self) -> Option<&Step> {
        self.steps.get(self.pos)
    }

    /// Moves past the current step, skipping zero-length idles.
    fn advance(&mut self) {
        self.pos += 1;
        self.enter();
    }

    fn enter(&mut self) {
        while let Some(Step::Idle(cycles)) = self.steps.get(self.pos) {
            if *cycles > 0 {
                self.idle_left = *cycles;
                return;
            }
            self.pos += 1;
        }
    }
}

fn lane_shift(sel: u8) -> u32 {
    (sel & 0xF).trailing_zeros().min(3) * 8
}

fn lane_mask(sel: u8) -> u32 {
    match (sel & 0xF).count_ones() {
        0 => 0,
        4 => u32::MAX,
        n => (1u32 << (n * 8)) - 1,
    }
}

#[derive(Debug, Default)]
pub struct ReplayModel {
    ports: [MemPort; 2],
    streams: [Stream; 2],
    halted: Option<u32>,
    reads: Vec<ReadRecord>,
    cycles: u64,
    retired: u64,
}

impl ReplayModel {
    pub fn new(script: ReplayScript) -> Self {
        let mut model = Self {
            streams: [
                Stream {
                    steps: script.instruction,
                    ..Default::default()
                },
                Stream {
                    steps: script.data,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        for id in PortId::ALL {
            model.streams[id.index()].enter();
            model.drive(id);
        }
        model
    }

    pub fn reads(&self) -> &[ReadRecord] {
        &self.reads
    }

    fn drive(&mut self, id: PortId) {
        let step = self.streams[id.index()].current().cloned();
        let port = &mut self.ports[id.index()];
        match step {
            Some(Step::Read { addr, sel }) | Some(Step::Poll { addr, sel, .. }) => {
                *port = MemPort {
                    addr,
                    sel,
                    valid: true,
                    ..*port
                };
                port.we = false;
                port.wdata = 0;
            }
            Some(Step::Write { addr, data, sel }) => {
                port.addr = addr;
                port.sel = sel;
                port.wdata = data << lane_shift(sel);
                port.we = true;
                port.valid = true;
            }
            Some(Step::Halt(code)) => {
                port.valid = false;
                if self.halted.is_none() {
                    tracing::debug!("{} stream reached halt({})", id, code);
                    self.halted = Some(code);
                }
            }
            Some(Step::Idle(_)) | None => {
                port.valid = false;
            }
        }
    }

    fn complete(&mut self, id: PortId) {
        let port = self.ports[id.index()];
        let stream = &mut self.streams[id.index()];
        match stream.current() {
            Some(Step::Read { addr, sel }) if port.valid && port.ack => {
                let value = (port.rdata >> lane_shift(*sel)) & lane_mask(*sel);
                self.reads.push(ReadRecord {
                    cycle: self.cycles,
                    port: id,
                    addr: *addr,
                    value,
                });
                if id == PortId::Instruction {
                    self.retired += 1;
                }
                stream.advance();
            }
            Some(Step::Write { .. }) if port.valid && port.ack => {
                stream.advance();
            }
            Some(Step::Poll {
                addr,
                mask,
                value,
                sel,
            }) if port.valid && port.ack => {
                let got = (port.rdata >> lane_shift(*sel)) & lane_mask(*sel);
                if got & mask == *value {
                    self.reads.push(ReadRecord {
                        cycle: self.cycles,
                        port: id,
                        addr: *addr,
                        value: got,
                    });
                    stream.advance();
                }
            }
            Some(Step::Idle(_)) => {
                stream.idle_left = stream.idle_left.saturating_sub(1);
                if stream.idle_left == 0 {
                    stream.advance();
                }
            }
            _ => {}
        }
    }
}

impl HardwareModel for ReplayModel {
    fn port(&self, id: PortId) -> &MemPort {
        &self.ports[id.index()]
    }

    fn port_mut(&mut self, id: PortId) -> &mut MemPort {
        &mut self.ports[id.index()]
    }

    fn clock(&mut self) {
        if self.halted.is_some() {
            return;
        }
        for id in PortId::ALL {
            self.complete(id);
            self.drive(id);
        }
        self.cycles += 1;
    }

    fn halted(&self) -> Option<u32> {
        self.halted
    }

    fn probe(&self) -> CoreProbe {
        CoreProbe {
            pc: self.ports[PortId::Instruction.index()].addr,
            retired: self.retired,
            registers: Vec::new(),
        }
    }
}
