//! Executable-section selection and the linear sweep.
//!
//! The sweep walks a section's bytes in address order, decoding one
//! instruction at a time. On a decode failure it advances a single byte and
//! retries, which guarantees termination and re-aligns with the next
//! decodable boundary at the cost of emitting garbage for truly
//! undecodable regions.

use log::debug;

use crate::decoder::X86Decoder;
use crate::{Address, AnalysisError, Architecture, Instruction, InstructionDecoder, Section};

/// PE executable-section characteristic bit.
pub const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;
/// ELF executable-section flag bit.
pub const SHF_EXECINSTR: u32 = 0x4;

/// Returns true if the section should be treated as code.
pub fn is_code_section(section: &Section) -> bool {
    if section.executable {
        return true;
    }
    if section.flags & IMAGE_SCN_MEM_EXECUTE != 0 || section.flags & SHF_EXECINSTR != 0 {
        return true;
    }
    let name = section.name.to_lowercase();
    name.contains("text") || name.contains("code")
}

/// Rejects every architecture the decoder cannot handle.
pub fn ensure_supported(arch: Architecture) -> Result<(), AnalysisError> {
    match arch {
        Architecture::X86 | Architecture::X86_64 => Ok(()),
        other => Err(AnalysisError::UnsupportedArchitecture(other)),
    }
}

/// Linear-sweep an executable section into an instruction stream.
pub fn sweep_section(
    section: &Section,
    arch: Architecture,
) -> Result<Vec<Instruction>, AnalysisError> {
    ensure_supported(arch)?;
    let decoder = X86Decoder::with_base(arch, section.address);
    let instructions = sweep(&section.data, &decoder);
    debug!(
        "swept section {} ({} bytes): {} instructions",
        section.name,
        section.data.len(),
        instructions.len()
    );
    Ok(instructions)
}

/// Linear-sweep an image with one-byte recovery on decode failure.
pub fn sweep(image: &[u8], decoder: &dyn InstructionDecoder) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    let mut offset: usize = 0;
    let mut skipped: usize = 0;

    while offset < image.len() {
        match decoder.decode(image, offset as Address) {
            Some(inst) if inst.size > 0 => {
                offset += inst.size;
                instructions.push(inst);
            }
            _ => {
                offset += 1;
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        debug!("sweep skipped {} undecodable bytes", skipped);
    }

    instructions
}
