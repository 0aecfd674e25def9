//! Core IR, traits, and error types for the relift binary analysis pipeline.
//!
//! The pipeline is a straight composition of stages: a container adapter
//! parses the executable into sections and symbols, the decoder turns raw
//! section bytes into typed instructions, function discovery segments the
//! instruction stream, the CFG builder recovers control flow, and the lifter
//! translates each function into a small set of high-level operations.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use relift::{analyzer, parser};
//!
//! let binary = parser::parse_executable("path/to/binary").unwrap();
//! let analysis = analyzer::analyze(binary).unwrap();
//!
//! for func in &analysis.functions {
//!     println!("{}: {} operations", func.lifted.function.name, func.lifted.operations.len());
//! }
//! ```

pub mod analyzer;
pub mod cfg;
pub mod decoder;
pub mod format;
pub mod functions;
pub mod lifter;
pub mod parser;
pub mod sweep;
#[cfg(test)]
mod pipeline_tests;

use std::fmt;

/// Represents an address in memory
pub type Address = u64;

/// Broad classification of a decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InstructionCategory {
    DataTransfer,
    Arithmetic,
    Logical,
    Compare,
    Call,
    Return,
    Jump,
    Stack,
    Interrupt,
    Nop,
    Other,
    #[default]
    Unknown,
}

impl fmt::Display for InstructionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstructionCategory::DataTransfer => "DataTransfer",
            InstructionCategory::Arithmetic => "Arithmetic",
            InstructionCategory::Logical => "Logical",
            InstructionCategory::Compare => "Compare",
            InstructionCategory::Call => "Call",
            InstructionCategory::Return => "Return",
            InstructionCategory::Jump => "Jump",
            InstructionCategory::Stack => "Stack",
            InstructionCategory::Interrupt => "Interrupt",
            InstructionCategory::Nop => "Nop",
            InstructionCategory::Other => "Other",
            InstructionCategory::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instruction {
    /// Absolute virtual address of the instruction
    pub address: Address,
    /// Raw encoded bytes
    pub bytes: Vec<u8>,
    /// Encoded length in bytes; always equals `bytes.len()`
    pub size: usize,
    /// Instruction mnemonic (e.g., "mov", "add")
    pub mnemonic: String,
    /// Textual operand form (e.g., "rax, [rbp+0x8]")
    pub operands: String,
    /// Broad classification
    pub category: InstructionCategory,
    /// True for jumps, calls, and other branching instructions
    pub is_branch: bool,
    /// True exactly for the Jcc, SETcc, CMOVcc, and JRCXZ families
    pub is_conditional: bool,
    /// Absolute branch target when computable, 0 otherwise
    pub branch_target: Address,
    /// True iff control may also continue to the following instruction
    pub falls_through: bool,
    /// Registers read, where the decoder knows them
    pub regs_read: Vec<String>,
    /// Registers written, where the decoder knows them
    pub regs_written: Vec<String>,
}

impl Instruction {
    /// Returns true if this instruction affects control flow.
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self.category,
            InstructionCategory::Call | InstructionCategory::Return | InstructionCategory::Jump
        )
    }

    /// Returns true if this instruction terminates a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.category,
            InstructionCategory::Return | InstructionCategory::Jump | InstructionCategory::Call
        )
    }

    /// Returns true if the instruction is known to read the given register.
    pub fn reads_register(&self, reg: &str) -> bool {
        self.regs_read.iter().any(|r| r == reg)
    }

    /// Returns true if the instruction is known to write the given register.
    pub fn writes_register(&self, reg: &str) -> bool {
        self.regs_written.iter().any(|r| r == reg)
    }

    /// Approximate operand count (commas + 1, 0 for no operands).
    pub fn operand_count(&self) -> usize {
        if self.operands.is_empty() {
            return 0;
        }
        self.operands.chars().filter(|&c| c == ',').count() + 1
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.mnemonic, self.operands)
    }
}

/// A detected function: a contiguous run of instructions with a name.
#[derive(Debug, Clone, Default)]
pub struct Function {
    pub name: String,
    pub start_addr: Address,
    /// Inclusive end address
    pub end_addr: Address,
    pub instructions: Vec<Instruction>,
    /// Addresses of call instructions inside the function
    pub calls: Vec<Address>,
}

/// A section in the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub address: Address,
    pub size: u64,
    pub data: Vec<u8>,
    /// Raw format-specific flag bits
    pub flags: u32,
    /// Whether the container marks this section executable
    pub executable: bool,
}

impl Section {
    pub fn new(
        name: String,
        address: Address,
        size: u64,
        data: Vec<u8>,
        flags: u32,
        executable: bool,
    ) -> Self {
        Self {
            name,
            address,
            size,
            data,
            flags,
            executable,
        }
    }

    pub fn end_address(&self) -> Address {
        self.address + self.size
    }
}

/// A symbol from the container's symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: Address,
    pub size: u64,
    pub kind: String,
}

/// Container format of the executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryFormat {
    Pe,
    Elf,
    MachO,
}

impl fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryFormat::Pe => write!(f, "PE"),
            BinaryFormat::Elf => write!(f, "ELF"),
            BinaryFormat::MachO => write!(f, "Mach-O"),
        }
    }
}

/// Supported architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Architecture {
    X86,
    X86_64,
    Arm,
    Arm64,
    Unknown,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86 => write!(f, "x86"),
            Architecture::X86_64 => write!(f, "x86_64"),
            Architecture::Arm => write!(f, "arm"),
            Architecture::Arm64 => write!(f, "arm64"),
            Architecture::Unknown => write!(f, "unknown"),
        }
    }
}

/// A parsed executable: container metadata plus section and symbol lists.
#[derive(Debug, Clone)]
pub struct Binary {
    pub format: BinaryFormat,
    pub arch: Architecture,
    pub entry_point: Option<Address>,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
    /// Imported library/function names (used by the language heuristic)
    pub imports: Vec<String>,
    /// Size of the file on disk
    pub file_size: usize,
    pub path: String,
}

impl Binary {
    /// Find a section by name.
    pub fn find_section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// All sections the container marks executable.
    pub fn executable_sections(&self) -> Vec<&Section> {
        self.sections.iter().filter(|s| s.executable).collect()
    }
}

/// Parser trait: turn raw bytes into a `Binary`.
pub trait BinaryParser: Send + Sync {
    fn parse(&self, data: &[u8]) -> Result<Binary, AnalysisError>;
}

/// Decoder trait: architecture-specific disassembler.
///
/// `at` is an offset into `image`; implementations translate it to a
/// virtual address themselves. Returns `None` when the bytes at `at` do
/// not form a decodable instruction (callers advance one byte and retry).
pub trait InstructionDecoder: Send + Sync {
    fn decode(&self, image: &[u8], at: Address) -> Option<Instruction>;
}

/// Error type for the analysis pipeline
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Failed to parse the container format
    #[error("failed to parse binary format: {0}")]
    Parse(String),

    /// The binary's architecture is not x86/x86_64
    #[error("unsupported architecture: {0} (currently only x86/x86_64 supported)")]
    UnsupportedArchitecture(Architecture),

    /// Output serialization error
    #[error("output formatting error: {0}")]
    Format(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_helpers() {
        let insn = Instruction {
            address: 0x1000,
            bytes: vec![0x01, 0xd8],
            size: 2,
            mnemonic: "add".to_string(),
            operands: "eax, ebx".to_string(),
            category: InstructionCategory::Arithmetic,
            ..Default::default()
        };

        assert_eq!(insn.operand_count(), 2);
        assert!(!insn.is_control_flow());
        assert!(!insn.is_terminator());
        assert_eq!(insn.to_string(), "add\teax, ebx");
    }

    #[test]
    fn test_terminator_categories() {
        for cat in [
            InstructionCategory::Call,
            InstructionCategory::Return,
            InstructionCategory::Jump,
        ] {
            let insn = Instruction {
                category: cat,
                ..Default::default()
            };
            assert!(insn.is_terminator());
            assert!(insn.is_control_flow());
        }

        let nop = Instruction {
            category: InstructionCategory::Nop,
            ..Default::default()
        };
        assert!(!nop.is_terminator());
    }

    #[test]
    fn test_register_tracking() {
        let push = Instruction {
            mnemonic: "push".to_string(),
            operands: "rbx".to_string(),
            category: InstructionCategory::Stack,
            regs_read: vec!["rbx".to_string()],
            ..Default::default()
        };
        assert!(push.reads_register("rbx"));
        assert!(!push.writes_register("rbx"));
    }

    #[test]
    fn test_section_end_address() {
        let section = Section::new(".text".to_string(), 0x1000, 0x200, vec![], 0x4, true);
        assert_eq!(section.end_address(), 0x1200);
    }

    #[test]
    fn test_display_tags() {
        assert_eq!(Architecture::X86_64.to_string(), "x86_64");
        assert_eq!(BinaryFormat::MachO.to_string(), "Mach-O");
        assert_eq!(InstructionCategory::DataTransfer.to_string(), "DataTransfer");
    }
}
