//! Goblin-based multi-format container adapter.

use std::fs;
use std::path::Path;

use goblin::mach::constants::cputype;
use goblin::mach::{Mach, MachO};
use goblin::{elf, pe, Object};
use log::debug;

use crate::{
    Address, AnalysisError, Architecture, Binary, BinaryFormat, BinaryParser, Section, Symbol,
};

/// A parser that handles ELF, PE, and Mach-O via Goblin.
#[derive(Debug, Default)]
pub struct GoblinParser;

impl GoblinParser {
    pub fn new() -> Self {
        GoblinParser
    }

    /// Parse an ELF image.
    fn parse_elf(&self, elf: elf::Elf, data: &[u8]) -> Result<Binary, AnalysisError> {
        let arch = match elf.header.e_machine {
            elf::header::EM_386 => Architecture::X86,
            elf::header::EM_X86_64 => Architecture::X86_64,
            elf::header::EM_ARM => Architecture::Arm,
            elf::header::EM_AARCH64 => Architecture::Arm64,
            _ => Architecture::Unknown,
        };

        let mut sections = Vec::new();
        for sh in &elf.section_headers {
            let Some(name) = elf.shdr_strtab.get_at(sh.sh_name) else {
                continue;
            };

            let bytes = if sh.sh_type == elf::section_header::SHT_NOBITS {
                Vec::new()
            } else {
                slice_file(data, sh.sh_offset as usize, sh.sh_size as usize)
            };

            let executable =
                sh.sh_flags & u64::from(elf::section_header::SHF_EXECINSTR) != 0;
            sections.push(Section::new(
                name.to_string(),
                sh.sh_addr,
                sh.sh_size,
                bytes,
                sh.sh_flags as u32,
                executable,
            ));
        }

        let mut symbols = Vec::new();
        for sym in elf.syms.iter() {
            if let Some(name) = elf.strtab.get_at(sym.st_name) {
                symbols.push(Symbol {
                    name: name.to_string(),
                    address: sym.st_value,
                    size: sym.st_size,
                    kind: format!("ELF_SYM_{}", sym.st_info),
                });
            }
        }
        for sym in elf.dynsyms.iter() {
            if let Some(name) = elf.dynstrtab.get_at(sym.st_name) {
                symbols.push(Symbol {
                    name: name.to_string(),
                    address: sym.st_value,
                    size: sym.st_size,
                    kind: format!("DYN_SYM_{}", sym.st_info),
                });
            }
        }

        let imports = elf.libraries.iter().map(|l| l.to_string()).collect();

        Ok(Binary {
            format: BinaryFormat::Elf,
            arch,
            entry_point: Some(elf.entry),
            sections,
            symbols,
            imports,
            file_size: data.len(),
            path: String::new(),
        })
    }

    /// Parse a PE image.
    fn parse_pe(&self, pe: pe::PE<'_>, data: &[u8]) -> Result<Binary, AnalysisError> {
        let arch = match pe.header.coff_header.machine {
            pe::header::COFF_MACHINE_X86 => Architecture::X86,
            pe::header::COFF_MACHINE_X86_64 => Architecture::X86_64,
            pe::header::COFF_MACHINE_ARM => Architecture::Arm,
            pe::header::COFF_MACHINE_ARM64 => Architecture::Arm64,
            _ => Architecture::Unknown,
        };

        let mut sections = Vec::new();
        for sect in &pe.sections {
            let name = sect.name().unwrap_or("").to_string();
            let executable =
                sect.characteristics & pe::section_table::IMAGE_SCN_MEM_EXECUTE != 0;
            let bytes = slice_file(
                data,
                sect.pointer_to_raw_data as usize,
                sect.size_of_raw_data as usize,
            );
            sections.push(Section::new(
                name,
                Address::from(sect.virtual_address),
                u64::from(sect.virtual_size),
                bytes,
                sect.characteristics,
                executable,
            ));
        }

        // PE rarely carries a symbol table; exported names stand in
        let symbols = pe
            .exports
            .iter()
            .filter_map(|export| {
                export.name.map(|name| Symbol {
                    name: name.to_string(),
                    address: export.rva as Address,
                    size: export.size as u64,
                    kind: "PE_EXPORT".to_string(),
                })
            })
            .collect();

        let imports = pe
            .imports
            .iter()
            .map(|imp| imp.name.to_string())
            .collect();

        Ok(Binary {
            format: BinaryFormat::Pe,
            arch,
            entry_point: Some(pe.entry as u64),
            sections,
            symbols,
            imports,
            file_size: data.len(),
            path: String::new(),
        })
    }

    /// Parse a single-architecture Mach-O image.
    fn parse_macho(&self, macho: &MachO, data: &[u8]) -> Result<Binary, AnalysisError> {
        let arch = match macho.header.cputype {
            cputype::CPU_TYPE_I386 => Architecture::X86,
            cputype::CPU_TYPE_X86_64 => Architecture::X86_64,
            cputype::CPU_TYPE_ARM => Architecture::Arm,
            cputype::CPU_TYPE_ARM64 => Architecture::Arm64,
            _ => Architecture::Unknown,
        };

        let mut sections = Vec::new();
        for segment in &macho.segments {
            // VM_PROT_EXECUTE
            let executable = segment.maxprot & 0x4 != 0;

            let Ok(inner) = segment.sections() else {
                continue;
            };
            for (sect, bytes) in inner {
                let name = sect.name().unwrap_or("").to_string();
                sections.push(Section::new(
                    name,
                    sect.addr,
                    sect.size,
                    bytes.to_vec(),
                    sect.flags,
                    executable,
                ));
            }
        }

        let mut symbols = Vec::new();
        for sym in macho.symbols() {
            if let Ok((name, nlist)) = sym {
                if !name.is_empty() {
                    symbols.push(Symbol {
                        name: name.to_string(),
                        address: nlist.n_value,
                        size: 0,
                        kind: format!("MACHO_SYM_{}", nlist.n_type),
                    });
                }
            }
        }

        let imports = macho
            .imports()
            .map(|imps| imps.iter().map(|i| i.name.to_string()).collect())
            .unwrap_or_default();

        Ok(Binary {
            format: BinaryFormat::MachO,
            arch,
            entry_point: Some(macho.entry),
            sections,
            symbols,
            imports,
            file_size: data.len(),
            path: String::new(),
        })
    }

    fn parse_mach(&self, mach: Mach<'_>, data: &[u8]) -> Result<Binary, AnalysisError> {
        match mach {
            Mach::Binary(macho) => self.parse_macho(&macho, data),
            Mach::Fat(_) => Err(AnalysisError::Parse(
                "fat Mach-O binaries are not supported".to_string(),
            )),
        }
    }
}

impl BinaryParser for GoblinParser {
    fn parse(&self, data: &[u8]) -> Result<Binary, AnalysisError> {
        match Object::parse(data) {
            Ok(Object::Elf(elf)) => self.parse_elf(elf, data),
            Ok(Object::PE(pe)) => self.parse_pe(pe, data),
            Ok(Object::Mach(mach)) => self.parse_mach(mach, data),
            Ok(_) => Err(AnalysisError::Parse("unsupported file format".to_string())),
            Err(e) => Err(AnalysisError::Parse(e.to_string())),
        }
    }
}

/// Read and parse an executable from disk.
pub fn parse_executable<P: AsRef<Path>>(path: P) -> Result<Binary, AnalysisError> {
    let path = path.as_ref();
    let data = fs::read(path)?;
    debug!("read {} bytes from {}", data.len(), path.display());

    let mut binary = GoblinParser::new().parse(&data)?;
    binary.path = path.display().to_string();
    Ok(binary)
}

/// Bounds-checked slice of the file image.
fn slice_file(data: &[u8], offset: usize, size: usize) -> Vec<u8> {
    if offset >= data.len() {
        return Vec::new();
    }
    let end = offset.saturating_add(size).min(data.len());
    data[offset..end].to_vec()
}
