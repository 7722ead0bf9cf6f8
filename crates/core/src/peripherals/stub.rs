// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::peripherals::uart::{UartRegister, RX_EMPTY, WINDOW_SIZE};
use crate::{AccessResult, Device};

/// Stands in for an unattached UART so its window still decodes.
///
/// Always idle: STATUS reads zero (transmitter free, nothing received),
/// DATA reads the empty-line value and writes are discarded.
#[derive(Debug)]
pub struct IdleUart {
    name: String,
}

impl IdleUart {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Device for IdleUart {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u32 {
        WINDOW_SIZE
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> AccessResult<()> {
        for (i, byte) in buf.iter_mut().enumerate() {
            let addr = offset.wrapping_add(i as u32);
            *byte = match UartRegister::from_offset(addr & !3) {
                Some(UartRegister::Data) if addr & 3 == 0 => RX_EMPTY,
                _ => 0,
            };
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> AccessResult<()> {
        tracing::trace!(
            "{}: discarding {}-byte write at offset {:#x}",
            self.name,
            data.len(),
            offset
        );
        Ok(())
    }
}
