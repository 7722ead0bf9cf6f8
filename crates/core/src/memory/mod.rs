// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{AccessError, AccessResult, Device};
use serde::{Deserialize, Serialize};
use std::any::Any;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub start_addr: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramImage {
    pub entry_point: u32,
    pub segments: Vec<Segment>,
}

impl ProgramImage {
    pub fn new(entry_point: u32) -> Self {
        Self {
            entry_point,
            segments: Vec::new(),
        }
    }

    pub fn add_segment(&mut self, start_addr: u32, data: Vec<u8>) {
        self.segments.push(Segment { start_addr, data });
    }

    pub fn total_bytes(&self) -> usize {
        self.segments.iter().map(|s| s.data.len()).sum()
    }
}

/// A flat byte store backing one region of the address space.
pub struct MemoryDevice {
    name: String,
    data: Vec<u8>,
}

impl std::fmt::Debug for MemoryDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDevice")
            .field("name", &self.name)
            .field("size", &self.data.len())
            .finish()
    }
}

impl MemoryDevice {
    pub fn new(name: impl Into<String>, size_kb: u32) -> Self {
        Self {
            name: name.into(),
            data: vec![0; size_kb as usize * 1024],
        }
    }

    fn span(&self, offset: u32, width: usize) -> AccessResult<std::ops::Range<usize>> {
        let start = offset as usize;
        match start.checked_add(width) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(AccessError::OutOfRange { addr: offset }),
        }
    }

    pub fn read(&self, offset: u32, width: usize) -> AccessResult<&[u8]> {
        let range = self.span(offset, width)?;
        Ok(&self.data[range])
    }

    pub fn write(&mut self, offset: u32, bytes: &[u8]) -> AccessResult<()> {
        let range = self.span(offset, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Device for MemoryDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u32 {
        // Construction caps sizes at the 4 GiB address space; a full 4 GiB
        // device would not be addressable from a u32 base anyway.
        self.data.len().min(u32::MAX as usize) as u32
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> AccessResult<()> {
        let bytes = MemoryDevice::read(self, offset, buf.len())?;
        buf.copy_from_slice(bytes);
        Ok(())
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> AccessResult<()> {
        MemoryDevice::write(self, offset, data)
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}
