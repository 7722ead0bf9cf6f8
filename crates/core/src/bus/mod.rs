// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{AccessError, AccessResult, ConfigError, Device};

pub struct RegionEntry {
    pub base: u32,
    pub size: u32,
    pub dev: Box<dyn Device>,
}

impl RegionEntry {
    /// One past the last address, widened so a region ending at 4 GiB fits.
    pub fn end(&self) -> u64 {
        self.base as u64 + self.size as u64
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && (addr as u64) < self.end()
    }
}

impl std::fmt::Debug for RegionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionEntry")
            .field("name", &self.dev.name())
            .field("base", &format_args!("{:#010x}", self.base))
            .field("size", &format_args!("{:#x}", self.size))
            .finish()
    }
}

/// Ordered table of non-overlapping regions.
///
/// Regions are registered once while the backend is built; lookups are a
/// linear scan over a handful of entries and never change between calls.
#[derive(Debug, Default)]
pub struct AddressMap {
    regions: Vec<RegionEntry>,
}

impl AddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `dev` to `[base, base + size)`, returning the region index.
    pub fn register_region(
        &mut self,
        base: u32,
        size: u32,
        dev: Box<dyn Device>,
    ) -> Result<usize, ConfigError> {
        let name = dev.name().to_string();
        if size == 0 {
            return Err(ConfigError::ZeroSizeRegion { name });
        }
        if size > dev.size() {
            return Err(ConfigError::WindowExceedsDevice {
                name,
                size,
                device_size: dev.size(),
            });
        }
        let entry = RegionEntry { base, size, dev };
        if entry.end() > 1u64 << 32 {
            return Err(ConfigError::ExceedsAddressSpace {
                name,
                base,
                size: size as u64,
            });
        }
        if let Some(existing) = self
            .regions
            .iter()
            .find(|r| (entry.base as u64) < r.end() && (r.base as u64) < entry.end())
        {
            return Err(ConfigError::Overlap {
                name,
                base,
                size,
                existing: existing.dev.name().to_string(),
            });
        }

        tracing::debug!(
            "Mapped '{}' at {:#010x}..{:#010x}",
            name,
            entry.base,
            entry.end()
        );
        self.regions.push(entry);
        Ok(self.regions.len() - 1)
    }

    /// Returns the region index and device offset containing `addr`.
    pub fn resolve(&self, addr: u32) -> AccessResult<(usize, u32)> {
        self.regions
            .iter()
            .position(|r| r.contains(addr))
            .map(|idx| (idx, addr - self.regions[idx].base))
            .ok_or(AccessError::OutOfRange { addr })
    }

    /// Resolves a `width`-byte access that must lie within a single region.
    ///
    /// An unmapped first byte is `OutOfRange`; a mapped first byte whose last
    /// byte leaves the region is `MisalignedSpan`.
    pub fn resolve_span(&self, addr: u32, width: u32) -> AccessResult<(usize, u32)> {
        let (idx, offset) = self.resolve(addr)?;
        let last = addr as u64 + width.max(1) as u64 - 1;
        if last >= self.regions[idx].end() {
            return Err(AccessError::MisalignedSpan { addr, width });
        }
        Ok((idx, offset))
    }

    pub fn region(&self, idx: usize) -> Option<&RegionEntry> {
        self.regions.get(idx)
    }

    pub fn device_mut(&mut self, idx: usize) -> Option<&mut (dyn Device + 'static)> {
        self.regions.get_mut(idx).map(|r| r.dev.as_mut())
    }

    pub fn regions(&self) -> impl Iterator<Item = &RegionEntry> {
        self.regions.iter()
    }

    pub fn tick_devices(&mut self) {
        for region in &mut self.regions {
            region.dev.tick();
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
