// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod backend;
pub mod bus;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod peripherals;
pub mod signals;
pub mod snapshot;
pub mod transcript;

use serde::Serialize;
use std::any::Any;

pub use atomsim_config::{BackendConfig, UartConfig};
pub use backend::{AccessFault, Backend, TickStatus};
pub use bus::AddressMap;
pub use memory::MemoryDevice;
pub use model::HardwareModel;
pub use peripherals::uart::Uart;
pub use signals::{Direction, MemPort, MemRequest, PortId};

mod tests;

/// Fatal address-space setup errors, detected while the backend is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Region '{name}' has zero size")]
    ZeroSizeRegion { name: String },
    #[error("Region '{name}' at {base:#010x} (+{size:#x}) extends past the 32-bit address space")]
    ExceedsAddressSpace { name: String, base: u32, size: u64 },
    #[error("Region '{name}' at {base:#010x} (+{size:#x}) overlaps region '{existing}'")]
    Overlap {
        name: String,
        base: u32,
        size: u32,
        existing: String,
    },
    #[error("Region '{name}' spans {size:#x} bytes but the device only decodes {device_size:#x}")]
    WindowExceedsDevice {
        name: String,
        size: u32,
        device_size: u32,
    },
    #[error("UART baud rate must be non-zero")]
    InvalidBaudRate,
    #[error("Clock frequency must be non-zero")]
    InvalidClock,
}

/// Runtime access errors reported by the address map and devices.
///
/// Addresses are absolute when produced by the backend and device-relative
/// when produced by a device on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessError {
    #[error("Access to unmapped address {addr:#010x}")]
    OutOfRange { addr: u32 },
    #[error("{width}-byte access at {addr:#010x} crosses a region boundary")]
    MisalignedSpan { addr: u32, width: u32 },
}

pub type AccessResult<T> = Result<T, AccessError>;

/// Trait for observing backend events in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_simulation_start(&self) {}
    fn on_request(&self, _port: PortId, _request: &MemRequest) {}
    fn on_fault(&self, _fault: &AccessFault) {}
    fn on_tick_end(&self, _cycle: u64) {}
    fn on_halt(&self, _exit_code: u32) {}
}

/// A device that can be bound into the address map.
///
/// Offsets are relative to the start of the device's region. `read` takes
/// `&mut self` because peripheral registers may have read side effects.
pub trait Device: std::fmt::Debug + Send {
    fn name(&self) -> &str;
    /// Size of the device window in bytes.
    fn size(&self) -> u32;
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> AccessResult<()>;
    fn write(&mut self, offset: u32, data: &[u8]) -> AccessResult<()>;
    /// Advance internal timing by one clock cycle.
    fn tick(&mut self) {}
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}
