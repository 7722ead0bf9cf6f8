// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::backend::AccessFault;
use crate::signals::{MemRequest, PortId};
use crate::SimulationObserver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct PerformanceMetrics {
    tick_count: AtomicU64,
    iport_requests: AtomicU64,
    dport_requests: AtomicU64,
    fault_count: AtomicU64,
    start_time: Instant,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            tick_count: AtomicU64::new(0),
            iport_requests: AtomicU64::new(0),
            dport_requests: AtomicU64::new(0),
            fault_count: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn reset(&self) {
        self.tick_count.store(0, Ordering::SeqCst);
        self.iport_requests.store(0, Ordering::SeqCst);
        self.dport_requests.store(0, Ordering::SeqCst);
        self.fault_count.store(0, Ordering::SeqCst);
    }

    pub fn get_ticks(&self) -> u64 {
        self.tick_count.load(Ordering::SeqCst)
    }

    pub fn get_requests(&self, port: PortId) -> u64 {
        match port {
            PortId::Instruction => self.iport_requests.load(Ordering::SeqCst),
            PortId::Data => self.dport_requests.load(Ordering::SeqCst),
        }
    }

    pub fn get_faults(&self) -> u64 {
        self.fault_count.load(Ordering::SeqCst)
    }

    pub fn get_ticks_per_sec(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.get_ticks() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl SimulationObserver for PerformanceMetrics {
    fn on_request(&self, port: PortId, _request: &MemRequest) {
        match port {
            PortId::Instruction => self.iport_requests.fetch_add(1, Ordering::SeqCst),
            PortId::Data => self.dport_requests.fetch_add(1, Ordering::SeqCst),
        };
    }

    fn on_fault(&self, _fault: &AccessFault) {
        self.fault_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_tick_end(&self, _cycle: u64) {
        self.tick_count.fetch_add(1, Ordering::SeqCst);
    }
}
