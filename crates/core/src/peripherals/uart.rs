// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::snapshot::UartSnapshot;
use crate::transcript::TranscriptSink;
use crate::{AccessResult, Device};
use bitflags::bitflags;
use std::any::Any;
use std::collections::VecDeque;

/// Size of the register window in bytes.
pub const WINDOW_SIZE: u32 = 0x10;
pub const REG_DATA: u32 = 0x0;
pub const REG_STATUS: u32 = 0x4;
pub const REG_CLKDIV: u32 = 0x8;

/// Start bit, eight data bits, stop bit.
pub const BITS_PER_BYTE: u32 = 10;
/// Value read from DATA when no received byte is pending.
pub const RX_EMPTY: u8 = 0xFF;

/// The clock divisor register holds `cycles_per_bit - 2`.
const CLKDIV_BIAS: u32 = 2;
const MAX_CYCLES_PER_BIT: u32 = u32::MAX / BITS_PER_BYTE;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UartStatus: u8 {
        /// A received byte is waiting in DATA.
        const RX_VALID = 1 << 0;
        /// A byte is being shifted out.
        const TX_BUSY = 1 << 1;
        /// A received byte was overwritten before it was read.
        const RX_OVERRUN = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartRegister {
    Data,
    Status,
    ClockDivisor,
}

impl UartRegister {
    /// Maps a word-aligned window offset to its register.
    pub fn from_offset(offset: u32) -> Option<Self> {
        match offset {
            REG_DATA => Some(Self::Data),
            REG_STATUS => Some(Self::Status),
            REG_CLKDIV => Some(Self::ClockDivisor),
            _ => None,
        }
    }
}

/// Clock cycles per serial bit, rounded up so a byte never finishes early.
pub fn cycles_per_bit(clock_hz: u32, baud_rate: u32) -> u32 {
    clock_hz
        .div_ceil(baud_rate.max(1))
        .clamp(1, MAX_CYCLES_PER_BIT)
}

/// Baud-paced UART model.
///
/// Register accesses never fail. A byte written to DATA is delivered after
/// exactly `cycles_per_bit * BITS_PER_BYTE` calls to `tick`; writing DATA
/// again before that replaces the pending byte and restarts the timer.
#[derive(Debug)]
pub struct Uart {
    name: String,
    cycles_per_bit: u32,
    status: UartStatus,
    tx_pending: Option<u8>,
    tx_remaining: u32,
    rx_data: u8,
    rx_shift: Option<(u8, u32)>,
    rx_queue: VecDeque<u8>,
    loopback: bool,
    sink: Option<Box<dyn TranscriptSink>>,
    ticks: u64,
    bytes_transmitted: u64,
    bytes_received: u64,
    transcript_dropped: u64,
}

impl Uart {
    pub fn new(name: impl Into<String>, clock_hz: u32, baud_rate: u32) -> Self {
        Self {
            name: name.into(),
            cycles_per_bit: cycles_per_bit(clock_hz, baud_rate),
            status: UartStatus::empty(),
            tx_pending: None,
            tx_remaining: 0,
            rx_data: RX_EMPTY,
            rx_shift: None,
            rx_queue: VecDeque::new(),
            loopback: false,
            sink: None,
            ticks: 0,
            bytes_transmitted: 0,
            bytes_received: 0,
            transcript_dropped: 0,
        }
    }

    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    pub fn attach_transcript(&mut self, sink: Box<dyn TranscriptSink>) {
        self.sink = Some(sink);
    }

    /// Queues bytes from the host side of the serial line.
    pub fn host_send(&mut self, bytes: &[u8]) {
        self.rx_queue.extend(bytes.iter().copied());
    }

    pub fn byte_ticks(&self) -> u32 {
        self.cycles_per_bit * BITS_PER_BYTE
    }

    pub fn cycles_per_bit(&self) -> u32 {
        self.cycles_per_bit
    }

    pub fn status(&self) -> UartStatus {
        self.status
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn bytes_transmitted(&self) -> u64 {
        self.bytes_transmitted
    }

    pub fn transcript_dropped(&self) -> u64 {
        self.transcript_dropped
    }

    pub fn read_register(&mut self, reg: UartRegister) -> u32 {
        let value = match reg {
            UartRegister::Data => {
                if self.status.contains(UartStatus::RX_VALID) {
                    self.status.remove(UartStatus::RX_VALID);
                    let byte = self.rx_data;
                    self.rx_data = RX_EMPTY;
                    byte as u32
                } else {
                    RX_EMPTY as u32
                }
            }
            other => self.peek_register(other),
        };
        tracing::trace!("{}: read {:?} -> {:#x}", self.name, reg, value);
        value
    }

    /// Reads a register without side effects.
    pub fn peek_register(&self, reg: UartRegister) -> u32 {
        match reg {
            UartRegister::Data => self.rx_data as u32,
            UartRegister::Status => self.status.bits() as u32,
            UartRegister::ClockDivisor => self.cycles_per_bit.saturating_sub(CLKDIV_BIAS),
        }
    }

    pub fn write_register(&mut self, reg: UartRegister, value: u32) {
        tracing::trace!("{}: write {:?} <- {:#x}", self.name, reg, value);
        match reg {
            UartRegister::Data => {
                let byte = value as u8;
                if let Some(prev) = self.tx_pending {
                    tracing::debug!(
                        "{}: byte {:#04x} replaced by {:#04x} before completing",
                        self.name,
                        prev,
                        byte
                    );
                }
                self.tx_pending = Some(byte);
                self.tx_remaining = self.byte_ticks();
                self.status.insert(UartStatus::TX_BUSY);
            }
            UartRegister::Status => {
                // Only the overrun flag is writable (write one to clear).
                if value & UartStatus::RX_OVERRUN.bits() as u32 != 0 {
                    self.status.remove(UartStatus::RX_OVERRUN);
                }
            }
            UartRegister::ClockDivisor => {
                self.cycles_per_bit = value
                    .saturating_add(CLKDIV_BIAS)
                    .min(MAX_CYCLES_PER_BIT);
            }
        }
    }

    fn latch_rx(&mut self, byte: u8) {
        if self.status.contains(UartStatus::RX_VALID) {
            self.status.insert(UartStatus::RX_OVERRUN);
        }
        self.rx_data = byte;
        self.status.insert(UartStatus::RX_VALID);
        self.bytes_received += 1;
    }

    fn deliver_tx(&mut self, byte: u8) {
        self.bytes_transmitted += 1;
        tracing::debug!("{}: transmitted {:#04x} at tick {}", self.name, byte, self.ticks);

        if let Some(sink) = self.sink.as_mut() {
            if !sink.offer(byte) {
                self.transcript_dropped += 1;
                if self.transcript_dropped == 1 {
                    tracing::warn!("{}: transcript sink not accepting data; dropping bytes", self.name);
                }
            }
        }

        if self.loopback {
            self.latch_rx(byte);
        }
    }

    pub fn snapshot(&self) -> UartSnapshot {
        UartSnapshot {
            name: self.name.clone(),
            status: self.status.bits(),
            cycles_per_bit: self.cycles_per_bit,
            tx_pending: self.tx_pending,
            tx_remaining: self.tx_remaining,
            rx_queued: self.rx_queue.len() + usize::from(self.rx_shift.is_some()),
            bytes_transmitted: self.bytes_transmitted,
            bytes_received: self.bytes_received,
            transcript_dropped: self.transcript_dropped,
        }
    }
}

impl Device for Uart {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u32 {
        WINDOW_SIZE
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> AccessResult<()> {
        let mut i = 0;
        while i < buf.len() {
            let addr = offset.wrapping_add(i as u32);
            let value = match UartRegister::from_offset(addr & !3) {
                // Only an access covering lane 0 pops the received byte.
                Some(UartRegister::Data) if addr & 3 != 0 => self.peek_register(UartRegister::Data),
                Some(reg) => self.read_register(reg),
                None => 0,
            };
            let mut lane = addr & 3;
            while lane < 4 && i < buf.len() {
                buf[i] = (value >> (lane * 8)) as u8;
                lane += 1;
                i += 1;
            }
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> AccessResult<()> {
        let mut i = 0;
        while i < data.len() {
            let addr = offset.wrapping_add(i as u32);
            let first_lane = addr & 3;
            let mut value = 0u32;
            let mut mask = 0u32;
            let mut lane = first_lane;
            while lane < 4 && i < data.len() {
                value |= (data[i] as u32) << (lane * 8);
                mask |= 0xFF << (lane * 8);
                lane += 1;
                i += 1;
            }

            match UartRegister::from_offset(addr & !3) {
                // DATA only latches its low byte.
                Some(UartRegister::Data) if first_lane != 0 => {
                    tracing::trace!("{}: ignoring upper-lane DATA write", self.name);
                }
                // Write-one-to-clear: lanes not written must not echo set bits.
                Some(UartRegister::Status) => {
                    self.write_register(UartRegister::Status, value);
                }
                Some(reg) => {
                    let merged = (self.peek_register(reg) & !mask) | value;
                    self.write_register(reg, merged);
                }
                None => {
                    tracing::trace!("{}: ignoring write to offset {:#x}", self.name, addr);
                }
            }
        }
        Ok(())
    }

    fn tick(&mut self) {
        self.ticks += 1;

        if let Some(byte) = self.tx_pending {
            self.tx_remaining = self.tx_remaining.saturating_sub(1);
            if self.tx_remaining == 0 {
                self.tx_pending = None;
                self.status.remove(UartStatus::TX_BUSY);
                self.deliver_tx(byte);
            }
        }

        if self.rx_shift.is_none() {
            if let Some(byte) = self.rx_queue.pop_front() {
                self.rx_shift = Some((byte, self.byte_ticks()));
            }
        }
        if let Some((byte, remaining)) = self.rx_shift.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                let byte = *byte;
                self.rx_shift = None;
                self.latch_rx(byte);
            }
        }
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}
