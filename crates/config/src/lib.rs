// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_IMEM_OFFSET: u32 = 0x0001_0000;
pub const DEFAULT_DMEM_OFFSET: u32 = 0x2000_0000;
/// 64 MiB, expressed in KiB.
pub const DEFAULT_MEM_SIZE_KB: u32 = 64 * 1024;
pub const DEFAULT_UART_BASE: u32 = 0x4000_0000;
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_CLOCK_HZ: u32 = 12_000_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SizeError {
    #[error("Invalid size format '{0}'")]
    Invalid(String),
    #[error("Size {0} bytes is not a whole number of KiB")]
    NotKibAligned(u64),
    #[error("Size {0} bytes does not fit the 32-bit address space")]
    TooLarge(u64),
}

/// Virtual UART attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UartConfig {
    /// Name of the host-side attachment, used for diagnostics only.
    pub portname: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Capture every transmitted byte into a transcript sink.
    #[serde(default)]
    pub transcript: bool,
    /// Feed transmitted bytes back into the receiver.
    #[serde(default)]
    pub loopback: bool,
}

impl UartConfig {
    pub fn new(portname: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            portname: portname.into(),
            baud_rate,
            transcript: false,
            loopback: false,
        }
    }
}

/// Address space and peripheral layout consumed by the backend.
///
/// Sizes are in KiB. The UART window is always mapped at `uart_base`; when
/// `uart` is `None` it is backed by an always-idle device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub imem_offset: u32,
    pub imem_size_kb: u32,
    pub dmem_offset: u32,
    pub dmem_size_kb: u32,
    pub uart_base: u32,
    pub uart: Option<UartConfig>,
    /// Frequency of the model clock, one tick per cycle.
    pub clock_hz: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            imem_offset: DEFAULT_IMEM_OFFSET,
            imem_size_kb: DEFAULT_MEM_SIZE_KB,
            dmem_offset: DEFAULT_DMEM_OFFSET,
            dmem_size_kb: DEFAULT_MEM_SIZE_KB,
            uart_base: DEFAULT_UART_BASE,
            uart: None,
            clock_hz: DEFAULT_CLOCK_HZ,
        }
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_uart_base() -> u32 {
    DEFAULT_UART_BASE
}

fn default_clock_hz() -> u32 {
    DEFAULT_CLOCK_HZ
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryRange {
    pub base: u32,
    pub size: String, // e.g. "64KiB"
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryLayout {
    pub imem: MemoryRange,
    pub dmem: MemoryRange,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartManifest {
    #[serde(default = "default_uart_base")]
    pub base: u32,
    pub portname: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub transcript: bool,
    #[serde(default)]
    pub loopback: bool,
}

impl UartManifest {
    pub fn attachment(&self) -> UartConfig {
        UartConfig {
            portname: self.portname.clone(),
            baud_rate: self.baud_rate,
            transcript: self.transcript,
            loopback: self.loopback,
        }
    }
}

/// On-disk description of a simulated system.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SystemManifest {
    pub name: String,
    #[serde(default = "default_clock_hz")]
    pub clock_hz: u32,
    pub memory: MemoryLayout,
    #[serde(default)]
    pub uart: Option<UartManifest>,
}

impl SystemManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open system manifest at {:?}", path.as_ref()))?;
        serde_yaml::from_reader(f).context("Failed to parse System Manifest")
    }

    pub fn to_backend_config(&self) -> Result<BackendConfig> {
        let imem_size_kb = parse_size_kb(&self.memory.imem.size)
            .with_context(|| format!("Invalid imem size in system '{}'", self.name))?;
        let dmem_size_kb = parse_size_kb(&self.memory.dmem.size)
            .with_context(|| format!("Invalid dmem size in system '{}'", self.name))?;

        Ok(BackendConfig {
            imem_offset: self.memory.imem.base,
            imem_size_kb,
            dmem_offset: self.memory.dmem.base,
            dmem_size_kb,
            uart_base: self
                .uart
                .as_ref()
                .map_or(DEFAULT_UART_BASE, |u| u.base),
            uart: self.uart.as_ref().map(UartManifest::attachment),
            clock_hz: self.clock_hz,
        })
    }
}

pub fn parse_size(size_str: &str) -> Result<u64, SizeError> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .trim()
        .parse()
        .map_err(|_| SizeError::Invalid(size_str.to_string()))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

/// Parses a human size string into whole KiB, rejecting anything that cannot
/// be mapped into a 32-bit address space.
pub fn parse_size_kb(size_str: &str) -> Result<u32, SizeError> {
    let bytes = parse_size(size_str)?;
    if bytes % 1024 != 0 {
        return Err(SizeError::NotKibAligned(bytes));
    }
    if bytes > 1 << 32 {
        return Err(SizeError::TooLarge(bytes));
    }
    Ok((bytes / 1024) as u32)
}
