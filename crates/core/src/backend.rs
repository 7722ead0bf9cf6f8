// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Per-cycle servicing loop between a hardware model and its address space.

use crate::bus::AddressMap;
use crate::memory::{MemoryDevice, ProgramImage};
use crate::model::HardwareModel;
use crate::peripherals::stub::IdleUart;
use crate::peripherals::uart::{self, Uart};
use crate::signals::{Direction, MemRequest, PortId};
use crate::snapshot::{BackendSnapshot, PortSnapshot};
use crate::transcript::{SharedBuffer, TranscriptSink};
use crate::{
    AccessError, AccessResult, BackendConfig, ConfigError, Device, SimulationObserver,
};
use serde::Serialize;
use std::sync::Arc;

pub const IMEM_NAME: &str = "imem";
pub const DMEM_NAME: &str = "dmem";
pub const IDLE_UART_NAME: &str = "uart-idle";

/// A port request that could not be serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessFault {
    pub cycle: u64,
    pub port: PortId,
    /// `None` when the byte enables could not be decoded.
    pub request: Option<MemRequest>,
    pub error: AccessError,
}

/// Outcome of one `Backend::tick`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickStatus {
    Clean,
    /// At least one port request faulted; the tick still completed.
    Faulted(Vec<AccessFault>),
    /// The model signaled completion with this exit code.
    Halted(u32),
}

impl TickStatus {
    pub fn is_halted(&self) -> bool {
        matches!(self, TickStatus::Halted(_))
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, TickStatus::Clean)
    }
}

/// Owns a hardware model, its address map and every device behind it.
///
/// Each `tick` services the instruction port, then the data port, advances
/// device timing, clocks the model once and refreshes the snapshot.
pub struct Backend<M: HardwareModel> {
    config: BackendConfig,
    model: M,
    map: AddressMap,
    uart_idx: usize,
    transcript: Option<SharedBuffer>,
    cycles: u64,
    halted: Option<u32>,
    tick_faults: Vec<AccessFault>,
    total_faults: u64,
    ports: [PortSnapshot; 2],
    state: BackendSnapshot,
    observers: Vec<Arc<dyn SimulationObserver>>,
}

impl<M: HardwareModel> std::fmt::Debug for Backend<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("map", &self.map)
            .field("cycles", &self.cycles)
            .field("halted", &self.halted)
            .field("total_faults", &self.total_faults)
            .finish_non_exhaustive()
    }
}

fn region_size(name: &str, base: u32, size_kb: u32) -> Result<u32, ConfigError> {
    let size = size_kb as u64 * 1024;
    if size == 0 {
        return Err(ConfigError::ZeroSizeRegion {
            name: name.to_string(),
        });
    }
    if size > u32::MAX as u64 || base as u64 + size > 1u64 << 32 {
        return Err(ConfigError::ExceedsAddressSpace {
            name: name.to_string(),
            base,
            size,
        });
    }
    Ok(size as u32)
}

impl<M: HardwareModel> Backend<M> {
    pub fn new(model: M, config: BackendConfig) -> Result<Self, ConfigError> {
        if config.clock_hz == 0 {
            return Err(ConfigError::InvalidClock);
        }

        let mut map = AddressMap::new();
        for (name, base, size_kb) in [
            (IMEM_NAME, config.imem_offset, config.imem_size_kb),
            (DMEM_NAME, config.dmem_offset, config.dmem_size_kb),
        ] {
            // Validate before allocating the backing store.
            let size = region_size(name, base, size_kb)?;
            map.register_region(base, size, Box::new(MemoryDevice::new(name, size_kb)))?;
        }

        let mut transcript = None;
        let uart_dev: Box<dyn Device> = match &config.uart {
            Some(cfg) => {
                if cfg.baud_rate == 0 {
                    return Err(ConfigError::InvalidBaudRate);
                }
                let mut dev = Uart::new(cfg.portname.clone(), config.clock_hz, cfg.baud_rate)
                    .with_loopback(cfg.loopback);
                if cfg.transcript {
                    let buf = SharedBuffer::unbounded();
                    dev.attach_transcript(Box::new(buf.clone()));
                    transcript = Some(buf);
                }
                tracing::info!(
                    "UART '{}' at {:#010x}: {} baud, {} cycles/bit",
                    cfg.portname,
                    config.uart_base,
                    cfg.baud_rate,
                    dev.cycles_per_bit()
                );
                Box::new(dev)
            }
            None => Box::new(IdleUart::new(IDLE_UART_NAME)),
        };
        let uart_idx = map.register_region(config.uart_base, uart::WINDOW_SIZE, uart_dev)?;

        tracing::info!(
            "Backend ready: imem {:#010x} ({} KiB), dmem {:#010x} ({} KiB)",
            config.imem_offset,
            config.imem_size_kb,
            config.dmem_offset,
            config.dmem_size_kb
        );

        let mut backend = Self {
            config,
            model,
            map,
            uart_idx,
            transcript,
            cycles: 0,
            halted: None,
            tick_faults: Vec::new(),
            total_faults: 0,
            ports: Default::default(),
            state: BackendSnapshot::default(),
            observers: Vec::new(),
        };
        backend.refresh_state();
        Ok(backend)
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn address_map(&self) -> &AddressMap {
        &self.map
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn halted(&self) -> Option<u32> {
        self.halted
    }

    /// Faults recorded during the most recent tick.
    pub fn last_faults(&self) -> &[AccessFault] {
        &self.tick_faults
    }

    /// Snapshot as of the end of the most recent tick.
    pub fn state(&self) -> &BackendSnapshot {
        &self.state
    }

    pub fn uart(&self) -> Option<&Uart> {
        self.map
            .region(self.uart_idx)
            .and_then(|r| r.dev.as_any())
            .and_then(|a| a.downcast_ref::<Uart>())
    }

    pub fn uart_mut(&mut self) -> Option<&mut Uart> {
        self.map
            .device_mut(self.uart_idx)
            .and_then(|d| d.as_any_mut())
            .and_then(|a| a.downcast_mut::<Uart>())
    }

    /// Built-in transcript buffer, present when enabled in the configuration
    /// and not replaced through `attach_transcript`.
    pub fn transcript(&self) -> Option<&SharedBuffer> {
        self.transcript.as_ref()
    }

    /// Routes UART output to `sink`. Returns `false` without a UART attached.
    pub fn attach_transcript(&mut self, sink: Box<dyn TranscriptSink>) -> bool {
        match self.uart_mut() {
            Some(uart) => {
                uart.attach_transcript(sink);
                self.transcript = None;
                true
            }
            None => false,
        }
    }

    /// Feeds bytes into the UART receiver. Returns `false` without a UART.
    pub fn uart_host_send(&mut self, bytes: &[u8]) -> bool {
        match self.uart_mut() {
            Some(uart) => {
                uart.host_send(bytes);
                true
            }
            None => false,
        }
    }

    pub fn tick(&mut self) -> TickStatus {
        if let Some(code) = self.halted {
            return TickStatus::Halted(code);
        }
        if self.cycles == 0 {
            for observer in &self.observers {
                observer.on_simulation_start();
            }
        }

        self.tick_faults.clear();
        self.service_mem_req();
        self.map.tick_devices();
        self.model.clock();
        self.cycles += 1;

        if let Some(code) = self.model.halted() {
            tracing::info!("Model halted with exit code {} at cycle {}", code, self.cycles);
            self.halted = Some(code);
            for observer in &self.observers {
                observer.on_halt(code);
            }
        }

        self.refresh_state();
        for observer in &self.observers {
            observer.on_tick_end(self.cycles);
        }

        match self.halted {
            Some(code) => TickStatus::Halted(code),
            None if self.tick_faults.is_empty() => TickStatus::Clean,
            None => TickStatus::Faulted(self.tick_faults.clone()),
        }
    }

    /// Services the valid port requests of this cycle, instruction port first,
    /// and drives their responses for the coming clock edge.
    fn service_mem_req(&mut self) {
        for id in PortId::ALL {
            let port = *self.model.port(id);
            if !port.valid {
                self.model.port_mut(id).ack = false;
                continue;
            }

            let outcome = MemRequest::from_port(&port).map_err(|e| (None, e)).and_then(|req| {
                for observer in &self.observers {
                    observer.on_request(id, &req);
                }
                let stats = &mut self.ports[id.index()];
                stats.requests += 1;
                stats.last_request = Some(req);
                self.service(&req).map_err(|e| (Some(req), e))
            });

            let rdata = match outcome {
                Ok(rdata) => rdata,
                Err((request, error)) => {
                    let fault = AccessFault {
                        cycle: self.cycles,
                        port: id,
                        request,
                        error,
                    };
                    tracing::warn!("{} fault at cycle {}: {}", id, self.cycles, error);
                    for observer in &self.observers {
                        observer.on_fault(&fault);
                    }
                    self.total_faults += 1;
                    self.tick_faults.push(fault);
                    0
                }
            };

            let port = self.model.port_mut(id);
            port.rdata = rdata;
            port.ack = true;
        }
    }

    fn service(&mut self, req: &MemRequest) -> AccessResult<u32> {
        let (idx, offset) = self.map.resolve_span(req.addr, req.width)?;
        let out_of_range = AccessError::OutOfRange { addr: req.addr };
        let dev = self.map.device_mut(idx).ok_or(out_of_range)?;
        let width = req.width as usize;

        match req.direction {
            Direction::Read => {
                let mut buf = [0u8; 4];
                dev.read(offset, &mut buf[..width])
                    .map_err(|_| out_of_range)?;
                let rdata = u32::from_le_bytes(buf) << (req.lane() * 8);
                tracing::debug!(
                    "read  {:#010x} [{}] from '{}' -> {:#010x}",
                    req.addr,
                    width,
                    dev.name(),
                    rdata
                );
                Ok(rdata)
            }
            Direction::Write => {
                dev.write(offset, &req.data_bytes()[..width])
                    .map_err(|_| out_of_range)?;
                tracing::debug!(
                    "write {:#010x} [{}] to '{}' <- {:#x}",
                    req.addr,
                    width,
                    dev.name(),
                    req.data
                );
                Ok(0)
            }
        }
    }

    /// Rebuilds the inspectable snapshot. Reads state only.
    pub fn refresh_state(&mut self) {
        self.state = BackendSnapshot {
            cycles: self.cycles,
            core: self.model.probe(),
            iport: self.ports[PortId::Instruction.index()].clone(),
            dport: self.ports[PortId::Data.index()].clone(),
            uart: self.uart().map(Uart::snapshot),
            total_faults: self.total_faults,
            halted: self.halted,
        };
    }

    /// Next chunk of a bulk access: region index, device offset and length.
    fn next_span(&self, cursor: u32, remaining: usize) -> AccessResult<(usize, u32, usize)> {
        let (idx, offset) = self.map.resolve(cursor)?;
        let avail = self
            .map
            .region(idx)
            .map_or(0, |r| (r.end() - cursor as u64) as usize);
        Ok((idx, offset, remaining.min(avail)))
    }

    fn cursor(addr: u32, done: usize) -> AccessResult<u32> {
        let cursor = addr as u64 + done as u64;
        u32::try_from(cursor).map_err(|_| AccessError::OutOfRange {
            addr: cursor as u32,
        })
    }

    /// Reads `buf.len()` bytes starting at `addr`, splitting at region
    /// boundaries. Bypasses the ports.
    pub fn fetch(&mut self, addr: u32, buf: &mut [u8]) -> AccessResult<()> {
        let mut done = 0;
        while done < buf.len() {
            let cursor = Self::cursor(addr, done)?;
            let (idx, offset, len) = self.next_span(cursor, buf.len() - done)?;
            let out_of_range = AccessError::OutOfRange { addr: cursor };
            self.map
                .device_mut(idx)
                .ok_or(out_of_range)?
                .read(offset, &mut buf[done..done + len])
                .map_err(|_| out_of_range)?;
            done += len;
        }
        tracing::trace!("fetch {:#010x} [{}]", addr, buf.len());
        Ok(())
    }

    /// Writes `data` starting at `addr`, splitting at region boundaries.
    ///
    /// Spans written before a failing span stay committed.
    pub fn store(&mut self, addr: u32, data: &[u8]) -> AccessResult<()> {
        let mut done = 0;
        while done < data.len() {
            let cursor = Self::cursor(addr, done)?;
            let (idx, offset, len) = self.next_span(cursor, data.len() - done)?;
            let out_of_range = AccessError::OutOfRange { addr: cursor };
            self.map
                .device_mut(idx)
                .ok_or(out_of_range)?
                .write(offset, &data[done..done + len])
                .map_err(|_| out_of_range)?;
            done += len;
        }
        tracing::trace!("store {:#010x} [{}]", addr, data.len());
        Ok(())
    }

    pub fn load_image(&mut self, image: &ProgramImage) -> AccessResult<()> {
        for segment in &image.segments {
            tracing::debug!(
                "Loading segment {:#010x} ({} bytes)",
                segment.start_addr,
                segment.data.len()
            );
            self.store(segment.start_addr, &segment.data)?;
        }
        tracing::info!(
            "Loaded {} segment(s), {} bytes, entry {:#010x}",
            image.segments.len(),
            image.total_bytes(),
            image.entry_point
        );
        Ok(())
    }
}
