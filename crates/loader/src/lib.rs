// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{anyhow, bail, Context, Result};
use atomsim_core::memory::ProgramImage;
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

pub fn load_elf(path: &Path) -> Result<ProgramImage> {
    let buffer = fs::read(path).with_context(|| format!("Failed to read ELF file: {:?}", path))?;

    let elf = Elf::parse(&buffer).context("Failed to parse ELF binary")?;

    let entry = u32::try_from(elf.entry)
        .map_err(|_| anyhow!("ELF entry point {:#x} is outside the 32-bit address space", elf.entry))?;
    info!("ELF Entry Point: {:#x}", entry);

    let mut program_image = ProgramImage::new(entry);

    for ph in elf.program_headers {
        if ph.p_type != PT_LOAD {
            continue;
        }
        // Physical address (LMA): where the bytes live before any startup copy.
        let size = ph.p_filesz as usize;
        let offset = ph.p_offset as usize;
        if size == 0 {
            continue;
        }

        let start_addr = u32::try_from(ph.p_paddr).map_err(|_| {
            anyhow!("Segment address {:#x} is outside the 32-bit address space", ph.p_paddr)
        })?;

        debug!(
            "Found Loadable Segment: Addr={:#x}, Size={} bytes, Offset={:#x}",
            start_addr, size, offset
        );

        if offset.checked_add(size).map_or(true, |end| end > buffer.len()) {
            return Err(anyhow!("Segment out of bounds in ELF file"));
        }

        program_image.add_segment(start_addr, buffer[offset..offset + size].to_vec());
    }

    if program_image.segments.is_empty() {
        warn!("No loadable segments found in ELF file");
    }

    Ok(program_image)
}

/// Loads a flat binary at `base`. The entry point is the base address.
pub fn load_binary(path: &Path, base: u32) -> Result<ProgramImage> {
    let data = fs::read(path).with_context(|| format!("Failed to read binary: {:?}", path))?;
    if base as u64 + data.len() as u64 > 1u64 << 32 {
        bail!(
            "Binary of {} bytes at {:#010x} extends past the 32-bit address space",
            data.len(),
            base
        );
    }
    info!("Binary image: {} bytes at {:#010x}", data.len(), base);

    let mut program_image = ProgramImage::new(base);
    if !data.is_empty() {
        program_image.add_segment(base, data);
    }
    Ok(program_image)
}

pub fn load_vhex(path: &Path, base: u32) -> Result<ProgramImage> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read hex file: {:?}", path))?;
    parse_vhex(&text, base).with_context(|| format!("Invalid hex file: {:?}", path))
}

/// Parses Verilog `$readmemh` text with byte-wide words.
///
/// `@hhhh` moves the load address; every other token is one byte. `//`
/// starts a line comment. Each contiguous run becomes one segment.
pub fn parse_vhex(text: &str, base: u32) -> Result<ProgramImage> {
    let mut program_image = ProgramImage::new(base);
    let mut cursor = base as u64;
    let mut run_start = cursor;
    let mut run = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.split("//").next().unwrap_or_default();
        for token in line.split_whitespace() {
            if let Some(addr) = token.strip_prefix('@') {
                let addr = u32::from_str_radix(addr, 16)
                    .with_context(|| format!("line {}: bad address '{}'", lineno + 1, token))?;
                if !run.is_empty() {
                    program_image.add_segment(run_start as u32, std::mem::take(&mut run));
                }
                cursor = addr as u64;
                run_start = cursor;
                continue;
            }

            if token.len() > 2 {
                bail!("line {}: '{}' is not a single byte", lineno + 1, token);
            }
            let byte = u8::from_str_radix(token, 16)
                .with_context(|| format!("line {}: bad byte '{}'", lineno + 1, token))?;
            if cursor >= 1u64 << 32 {
                bail!("line {}: data runs past the 32-bit address space", lineno + 1);
            }
            run.push(byte);
            cursor += 1;
        }
    }
    if !run.is_empty() {
        program_image.add_segment(run_start as u32, run);
    }

    debug!(
        "Hex image: {} segment(s), {} bytes",
        program_image.segments.len(),
        program_image.total_bytes()
    );
    Ok(program_image)
}
