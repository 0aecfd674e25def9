//! In-tree x86/x86-64 instruction decoder.
//!
//! A linear-sweep decoder covering the common one-byte opcode space, the
//! 0x0F two-byte space, and basic VEX/x87 recognition. Each successful
//! decode reports its exact encoded length so the sweep stays aligned;
//! well-framed but unrecognized opcodes decode to `unk_XX` / `0f_XX` with
//! category Unknown, while truncated encodings fail (`None`) and the sweep
//! recovers by advancing one byte.
//!
//! SIB bytes are not decoded: an `rm` field of 4 renders as the stack
//! register and later stages tolerate the imprecise operand text.

use crate::{Address, Architecture, Instruction, InstructionCategory, InstructionDecoder};

use crate::InstructionCategory as Cat;

/// Decoder for x86/x86-64 images at a fixed base address.
pub struct X86Decoder {
    arch: Architecture,
    base: Address,
}

impl X86Decoder {
    /// Decoder with addresses equal to image offsets.
    pub fn new(arch: Architecture) -> Self {
        Self { arch, base: 0 }
    }

    /// Decoder assigning `base + offset` as each instruction's address.
    pub fn with_base(arch: Architecture, base: Address) -> Self {
        Self { arch, base }
    }

    pub fn architecture(&self) -> Architecture {
        self.arch
    }
}

impl InstructionDecoder for X86Decoder {
    fn decode(&self, image: &[u8], at: Address) -> Option<Instruction> {
        let offset = at as usize;
        if offset >= image.len() {
            return None;
        }
        decode_instruction(&image[offset..], self.base.wrapping_add(at), self.arch)
    }
}

/// Decode one instruction from the start of `data`.
///
/// `addr` is the virtual address of `data[0]` and is used for branch-target
/// arithmetic. Returns `None` when the byte stream is empty or too short for
/// the determined encoding.
pub fn decode_instruction(data: &[u8], addr: Address, arch: Architecture) -> Option<Instruction> {
    if data.is_empty() {
        return None;
    }

    let is64 = arch == Architecture::X86_64;
    let mut offset = 0usize;
    let mut rex_w = false;

    // Up to four legacy prefixes in any order; REX (64-bit mode) comes last.
    while offset < data.len() && offset < 4 {
        let b = data[offset];
        match b {
            0xF0 | 0xF2 | 0xF3 | 0x2E | 0x36 | 0x3E | 0x26 | 0x64 | 0x65 | 0x66 | 0x67 => {
                offset += 1;
            }
            0x40..=0x4F if is64 => {
                rex_w = b & 0x08 != 0;
                offset += 1;
                break;
            }
            _ => break,
        }
    }

    if offset >= data.len() {
        return None;
    }

    let opcode = data[offset];
    offset += 1;

    let mut inst = Instruction {
        address: addr,
        ..Default::default()
    };

    match opcode {
        // One-byte ALU families in their four r/m forms:
        // ADD / OR / ADC / SBB / AND / SUB / XOR / CMP
        0x00..=0x03 | 0x08..=0x0B | 0x10..=0x13 | 0x18..=0x1B | 0x20..=0x23 | 0x28..=0x2B
        | 0x30..=0x33 | 0x38..=0x3B => {
            let (mnemonic, category) = alu_op(opcode >> 3);
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            inst.mnemonic = mnemonic.to_string();
            inst.category = category;
            inst.operands = if opcode & 0x02 != 0 {
                format!("{}, {}", reg, rm)
            } else {
                format!("{}, {}", rm, reg)
            };
        }

        // Accumulator-immediate forms, imm8
        0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
            let (mnemonic, category) = alu_op(opcode >> 3);
            let imm = *data.get(offset)?;
            offset += 1;
            inst.mnemonic = mnemonic.to_string();
            inst.category = category;
            inst.operands = format!("al, 0x{:x}", imm);
        }

        // Accumulator-immediate forms, imm32
        0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
            let (mnemonic, category) = alu_op(opcode >> 3);
            let imm = read_u32(data, offset)?;
            offset += 4;
            inst.mnemonic = mnemonic.to_string();
            inst.category = category;
            inst.operands = format!("eax, 0x{:x}", imm);
        }

        // Segment register push/pop (legacy)
        0x06 => seg_stack(&mut inst, "push", "es"),
        0x07 => seg_stack(&mut inst, "pop", "es"),
        0x0E => seg_stack(&mut inst, "push", "cs"),
        0x16 => seg_stack(&mut inst, "push", "ss"),
        0x17 => seg_stack(&mut inst, "pop", "ss"),
        0x1E => seg_stack(&mut inst, "push", "ds"),
        0x1F => seg_stack(&mut inst, "pop", "ds"),

        // BCD adjust (legacy)
        0x27 => simple(&mut inst, "daa", Cat::Arithmetic),
        0x2F => simple(&mut inst, "das", Cat::Arithmetic),
        0x37 => simple(&mut inst, "aaa", Cat::Arithmetic),
        0x3F => simple(&mut inst, "aas", Cat::Arithmetic),

        // One-byte INC/DEC (32-bit mode; REX territory on x86-64)
        0x40..=0x47 => {
            if is64 {
                simple(&mut inst, "rex", Cat::Other);
            } else {
                inst.mnemonic = "inc".to_string();
                inst.operands = reg_name((opcode - 0x40) as usize, false);
                inst.category = Cat::Arithmetic;
            }
        }
        0x48..=0x4F => {
            if is64 {
                simple(&mut inst, "rex", Cat::Other);
            } else {
                inst.mnemonic = "dec".to_string();
                inst.operands = reg_name((opcode - 0x48) as usize, false);
                inst.category = Cat::Arithmetic;
            }
        }

        // PUSH/POP r64 (full-width for the architecture)
        0x50..=0x57 => {
            inst.mnemonic = "push".to_string();
            inst.operands = reg_name((opcode - 0x50) as usize, is64);
            inst.category = Cat::Stack;
            inst.regs_read = vec![inst.operands.clone()];
        }
        0x58..=0x5F => {
            inst.mnemonic = "pop".to_string();
            inst.operands = reg_name((opcode - 0x58) as usize, is64);
            inst.category = Cat::Stack;
            inst.regs_written = vec![inst.operands.clone()];
        }

        0x60 => simple(&mut inst, "pusha", Cat::Stack),
        0x61 => simple(&mut inst, "popa", Cat::Stack),

        // BOUND r, m (legacy)
        0x62 => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            inst.mnemonic = "bound".to_string();
            inst.category = Cat::Other;
            inst.operands = format!("{}, {}", reg, rm);
        }

        // ARPL (16-bit) or MOVSXD (64-bit)
        0x63 => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            inst.mnemonic = if rex_w { "movsxd" } else { "arpl" }.to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = format!("{}, {}", reg, rm);
        }

        // PUSH immediate
        0x68 => {
            let imm = read_u32(data, offset)?;
            offset += 4;
            inst.mnemonic = "push".to_string();
            inst.operands = format!("0x{:x}", imm);
            inst.category = Cat::Stack;
        }
        0x6A => {
            let imm = *data.get(offset)? as i8;
            offset += 1;
            inst.mnemonic = "push".to_string();
            inst.operands = signed_hex(imm as i64);
            inst.category = Cat::Stack;
        }

        // IMUL r, r/m, imm
        0x69 | 0x6B => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            let imm = if opcode == 0x69 {
                let v = read_u32(data, offset)? as i32 as i64;
                offset += 4;
                v
            } else {
                let v = *data.get(offset)? as i8 as i64;
                offset += 1;
                v
            };
            inst.mnemonic = "imul".to_string();
            inst.category = Cat::Arithmetic;
            inst.operands = format!("{}, {}, {}", reg, rm, signed_hex(imm));
        }

        // String I/O
        0x6C => simple(&mut inst, "insb", Cat::Other),
        0x6D => simple(&mut inst, "insd", Cat::Other),
        0x6E => simple(&mut inst, "outsb", Cat::Other),
        0x6F => simple(&mut inst, "outsd", Cat::Other),

        // Jcc rel8
        0x70..=0x7F => {
            let rel = *data.get(offset)? as i8;
            offset += 1;
            let target = rel_target(addr, offset, rel as i64);
            inst.mnemonic = format!("j{}", cc_suffix(opcode & 0x0F));
            inst.operands = format!("0x{:x}", target);
            inst.category = Cat::Jump;
            inst.is_conditional = true;
            inst.is_branch = true;
            inst.branch_target = target;
            inst.falls_through = true;
        }

        // Group 1: immediate ALU, operation selected by the reg field
        0x80..=0x83 => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (mnemonic, category) = alu_op((modrm >> 3) & 0x7);
            let (rm, _, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            let imm = match opcode {
                0x81 => {
                    let v = read_u32(data, offset)?;
                    offset += 4;
                    v
                }
                0x83 => {
                    // imm8, sign-extended
                    let v = *data.get(offset)? as i8 as i32 as u32;
                    offset += 1;
                    v
                }
                _ => {
                    let v = *data.get(offset)? as u32;
                    offset += 1;
                    v
                }
            };
            inst.mnemonic = mnemonic.to_string();
            inst.category = category;
            inst.operands = format!("{}, 0x{:x}", rm, imm);
        }

        // TEST r/m, r
        0x84 | 0x85 => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            inst.mnemonic = "test".to_string();
            inst.category = Cat::Compare;
            inst.operands = format!("{}, {}", rm, reg);
        }

        // XCHG r/m, r
        0x86 | 0x87 => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            inst.mnemonic = "xchg".to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = format!("{}, {}", rm, reg);
        }

        // MOV r/m, r and MOV r, r/m
        0x88..=0x8B => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            inst.mnemonic = "mov".to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = if opcode & 0x02 != 0 {
                format!("{}, {}", reg, rm)
            } else {
                format!("{}, {}", rm, reg)
            };
        }

        // MOV r/m, Sreg
        0x8C => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, _, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            inst.mnemonic = "mov".to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = format!("{}, {}", rm, seg_name((modrm >> 3) & 0x7));
        }

        // LEA r, m
        0x8D => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            inst.mnemonic = "lea".to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = format!("{}, {}", reg, rm);
        }

        // MOV Sreg, r/m
        0x8E => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, _, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            inst.mnemonic = "mov".to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = format!("{}, {}", seg_name((modrm >> 3) & 0x7), rm);
        }

        // POP r/m
        0x8F => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, _, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            inst.mnemonic = "pop".to_string();
            inst.category = Cat::Stack;
            inst.operands = rm;
        }

        0x90 => simple(&mut inst, "nop", Cat::Nop),

        // XCHG rAX, r
        0x91..=0x97 => {
            inst.mnemonic = "xchg".to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = format!(
                "{}, {}",
                reg_name(0, rex_w),
                reg_name((opcode - 0x90) as usize, rex_w)
            );
        }

        0x98 => simple(&mut inst, if rex_w { "cdqe" } else { "cwde" }, Cat::DataTransfer),
        0x99 => simple(&mut inst, if rex_w { "cqo" } else { "cdq" }, Cat::DataTransfer),

        // CALLF ptr16:32
        0x9A => {
            let offs = read_u32(data, offset)?;
            let seg = read_u16(data, offset + 4)?;
            offset += 6;
            inst.mnemonic = "callf".to_string();
            inst.operands = format!("0x{:x}:0x{:x}", seg, offs);
            inst.category = Cat::Call;
            inst.falls_through = true;
        }

        0x9B => simple(&mut inst, "wait", Cat::Other),
        0x9C => simple(&mut inst, "pushf", Cat::Stack),
        0x9D => simple(&mut inst, "popf", Cat::Stack),
        0x9E => simple(&mut inst, "sahf", Cat::DataTransfer),
        0x9F => simple(&mut inst, "lahf", Cat::DataTransfer),

        // MOV accumulator <-> moffs
        0xA0..=0xA3 => {
            let moffs = read_u32(data, offset)?;
            offset += 4;
            inst.mnemonic = "mov".to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = match opcode {
                0xA0 => format!("al, [0x{:x}]", moffs),
                0xA1 => format!("eax, [0x{:x}]", moffs),
                0xA2 => format!("[0x{:x}], al", moffs),
                _ => format!("[0x{:x}], eax", moffs),
            };
        }

        // String operations
        0xA4 => simple(&mut inst, "movsb", Cat::DataTransfer),
        0xA5 => simple(&mut inst, "movs", Cat::DataTransfer),
        0xA6 => simple(&mut inst, "cmpsb", Cat::Compare),
        0xA7 => simple(&mut inst, "cmps", Cat::Compare),
        0xAA => simple(&mut inst, "stosb", Cat::DataTransfer),
        0xAB => simple(&mut inst, "stos", Cat::DataTransfer),
        0xAC => simple(&mut inst, "lodsb", Cat::DataTransfer),
        0xAD => simple(&mut inst, "lods", Cat::DataTransfer),
        0xAE => simple(&mut inst, "scasb", Cat::Compare),
        0xAF => simple(&mut inst, "scas", Cat::Compare),

        // TEST accumulator, imm
        0xA8 => {
            let imm = *data.get(offset)?;
            offset += 1;
            inst.mnemonic = "test".to_string();
            inst.category = Cat::Compare;
            inst.operands = format!("al, 0x{:x}", imm);
        }
        0xA9 => {
            let imm = read_u32(data, offset)?;
            offset += 4;
            inst.mnemonic = "test".to_string();
            inst.category = Cat::Compare;
            inst.operands = format!("eax, 0x{:x}", imm);
        }

        // MOV r8, imm8
        0xB0..=0xB7 => {
            let imm = *data.get(offset)?;
            offset += 1;
            inst.mnemonic = "mov".to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = format!("{}, 0x{:x}", reg_name8((opcode - 0xB0) as usize), imm);
        }

        // MOV r, imm32 (imm64 when REX.W promotes the operand)
        0xB8..=0xBF => {
            let reg = reg_name((opcode - 0xB8) as usize, rex_w);
            let imm = if rex_w {
                let v = read_u64(data, offset)?;
                offset += 8;
                v
            } else {
                let v = read_u32(data, offset)? as u64;
                offset += 4;
                v
            };
            inst.mnemonic = "mov".to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = format!("{}, 0x{:x}", reg, imm);
        }

        // Shift/rotate group
        0xC0 | 0xC1 | 0xD0..=0xD3 => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, _, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            inst.mnemonic = match (modrm >> 3) & 0x7 {
                0 => "rol",
                1 => "ror",
                2 => "rcl",
                3 => "rcr",
                4 => "shl",
                5 => "shr",
                7 => "sar",
                _ => "shift_op",
            }
            .to_string();
            inst.category = Cat::Logical;
            let count = match opcode {
                0xC0 | 0xC1 => {
                    let imm = *data.get(offset)?;
                    offset += 1;
                    format!("0x{:x}", imm)
                }
                0xD0 | 0xD1 => "1".to_string(),
                _ => "cl".to_string(),
            };
            inst.operands = format!("{}, {}", rm, count);
        }

        // Returns
        0xC2 => {
            let imm = read_u16(data, offset)?;
            offset += 2;
            inst.mnemonic = "ret".to_string();
            inst.operands = format!("0x{:x}", imm);
            inst.category = Cat::Return;
        }
        0xC3 => simple(&mut inst, "ret", Cat::Return),

        // VEX 3-byte prefix or LES
        0xC4 => match data.get(offset) {
            None => simple(&mut inst, "vex_c4", Cat::Other),
            Some(&b) if b >= 0xC0 => {
                offset += 2;
                simple(&mut inst, "vex3", Cat::Other);
            }
            Some(&modrm) => {
                offset += 1;
                let (rm, reg, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
                offset += disp;
                inst.mnemonic = "les".to_string();
                inst.category = Cat::DataTransfer;
                inst.operands = format!("{}, {}", reg, rm);
            }
        },

        // VEX 2-byte prefix or LDS
        0xC5 => match data.get(offset) {
            None => simple(&mut inst, "vex_c5", Cat::Other),
            Some(&b) if b >= 0xC0 => {
                offset += 1;
                simple(&mut inst, "vex2", Cat::Other);
            }
            Some(&modrm) => {
                offset += 1;
                let (rm, reg, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
                offset += disp;
                inst.mnemonic = "lds".to_string();
                inst.category = Cat::DataTransfer;
                inst.operands = format!("{}, {}", reg, rm);
            }
        },

        // MOV r/m, imm
        0xC6 => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, _, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            let imm = *data.get(offset)?;
            offset += 1;
            inst.mnemonic = "mov".to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = format!("{}, 0x{:x}", rm, imm);
        }
        0xC7 => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, _, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            let imm = read_u32(data, offset)?;
            offset += 4;
            inst.mnemonic = "mov".to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = format!("{}, 0x{:x}", rm, imm);
        }

        // ENTER imm16, imm8 / LEAVE
        0xC8 => {
            if offset + 3 > data.len() {
                return None;
            }
            offset += 3;
            simple(&mut inst, "enter", Cat::Stack);
        }
        0xC9 => simple(&mut inst, "leave", Cat::Stack),

        // Far returns
        0xCA => {
            let imm = read_u16(data, offset)?;
            offset += 2;
            inst.mnemonic = "retf".to_string();
            inst.operands = format!("0x{:x}", imm);
            inst.category = Cat::Return;
        }
        0xCB => simple(&mut inst, "retf", Cat::Return),

        // INT 3 / INT imm8 / INTO / IRET
        0xCC => {
            inst.mnemonic = "int".to_string();
            inst.operands = "3".to_string();
            inst.category = Cat::Interrupt;
        }
        0xCD => {
            let imm = *data.get(offset)?;
            offset += 1;
            inst.mnemonic = "int".to_string();
            inst.operands = format!("0x{:x}", imm);
            inst.category = Cat::Interrupt;
        }
        0xCE => simple(&mut inst, "into", Cat::Interrupt),
        0xCF => simple(&mut inst, "iret", Cat::Return),

        // Legacy ASCII adjust
        0xD4 => {
            let imm = *data.get(offset)?;
            offset += 1;
            inst.mnemonic = "aam".to_string();
            inst.operands = format!("0x{:x}", imm);
            inst.category = Cat::Arithmetic;
        }
        0xD5 => {
            let imm = *data.get(offset)?;
            offset += 1;
            inst.mnemonic = "aad".to_string();
            inst.operands = format!("0x{:x}", imm);
            inst.category = Cat::Arithmetic;
        }
        0xD6 => simple(&mut inst, "salc", Cat::Other),
        0xD7 => simple(&mut inst, "xlat", Cat::DataTransfer),

        // x87 FPU opcode bytes (mnemonic identification only)
        0xD8..=0xDF => {
            let modrm = *data.get(offset)?;
            offset += 1;
            decode_fpu(&mut inst, opcode, modrm, &data[offset..], rex_w, &mut offset)?;
        }

        // Loop family
        0xE0..=0xE3 => {
            let rel = *data.get(offset)? as i8;
            offset += 1;
            let target = rel_target(addr, offset, rel as i64);
            inst.mnemonic = match opcode {
                0xE0 => "loopne",
                0xE1 => "loope",
                0xE2 => "loop",
                _ => "jrcxz",
            }
            .to_string();
            inst.operands = format!("0x{:x}", target);
            inst.category = Cat::Jump;
            inst.is_branch = true;
            inst.branch_target = target;
            if opcode == 0xE3 {
                inst.is_conditional = true;
                inst.falls_through = true;
            }
        }

        // Port I/O
        0xE4 | 0xE5 => {
            let imm = *data.get(offset)?;
            offset += 1;
            inst.mnemonic = "in".to_string();
            inst.category = Cat::Other;
            let dst = if opcode == 0xE4 { "al" } else { "eax" };
            inst.operands = format!("{}, 0x{:x}", dst, imm);
        }
        0xE6 | 0xE7 => {
            let imm = *data.get(offset)?;
            offset += 1;
            inst.mnemonic = "out".to_string();
            inst.category = Cat::Other;
            let src = if opcode == 0xE6 { "al" } else { "eax" };
            inst.operands = format!("0x{:x}, {}", imm, src);
        }
        0xEC => two_operand_simple(&mut inst, "in", "al, dx", Cat::Other),
        0xED => two_operand_simple(&mut inst, "in", "eax, dx", Cat::Other),
        0xEE => two_operand_simple(&mut inst, "out", "dx, al", Cat::Other),
        0xEF => two_operand_simple(&mut inst, "out", "dx, eax", Cat::Other),

        // CALL rel32
        0xE8 => {
            let rel = read_u32(data, offset)? as i32;
            offset += 4;
            let target = rel_target(addr, offset, rel as i64);
            inst.mnemonic = "call".to_string();
            inst.operands = format!("0x{:x}", target);
            inst.category = Cat::Call;
            inst.is_branch = true;
            inst.branch_target = target;
            inst.falls_through = true;
        }

        // JMP rel32 / rel8
        0xE9 => {
            let rel = read_u32(data, offset)? as i32;
            offset += 4;
            let target = rel_target(addr, offset, rel as i64);
            inst.mnemonic = "jmp".to_string();
            inst.operands = format!("0x{:x}", target);
            inst.category = Cat::Jump;
            inst.is_branch = true;
            inst.branch_target = target;
        }
        0xEB => {
            let rel = *data.get(offset)? as i8;
            offset += 1;
            let target = rel_target(addr, offset, rel as i64);
            inst.mnemonic = "jmp".to_string();
            inst.operands = format!("0x{:x}", target);
            inst.category = Cat::Jump;
            inst.is_branch = true;
            inst.branch_target = target;
        }

        // JMPF ptr16:32
        0xEA => {
            let offs = read_u32(data, offset)?;
            let seg = read_u16(data, offset + 4)?;
            offset += 6;
            inst.mnemonic = "jmpf".to_string();
            inst.operands = format!("0x{:x}:0x{:x}", seg, offs);
            inst.category = Cat::Jump;
        }

        0xF1 => simple(&mut inst, "int1", Cat::Interrupt),
        0xF4 => simple(&mut inst, "hlt", Cat::Interrupt),
        0xF5 => simple(&mut inst, "cmc", Cat::Other),

        // Group 3: TEST/NOT/NEG/MUL/IMUL/DIV/IDIV
        0xF6 | 0xF7 => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, _, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            match (modrm >> 3) & 0x7 {
                0 | 1 => {
                    let imm = if opcode == 0xF6 {
                        let v = *data.get(offset)? as u32;
                        offset += 1;
                        v
                    } else {
                        let v = read_u32(data, offset)?;
                        offset += 4;
                        v
                    };
                    inst.mnemonic = "test".to_string();
                    inst.category = Cat::Compare;
                    inst.operands = format!("{}, 0x{:x}", rm, imm);
                }
                2 => unary_rm(&mut inst, "not", Cat::Logical, rm),
                3 => unary_rm(&mut inst, "neg", Cat::Arithmetic, rm),
                4 => unary_rm(&mut inst, "mul", Cat::Arithmetic, rm),
                5 => unary_rm(&mut inst, "imul", Cat::Arithmetic, rm),
                6 => unary_rm(&mut inst, "div", Cat::Arithmetic, rm),
                _ => unary_rm(&mut inst, "idiv", Cat::Arithmetic, rm),
            }
        }

        // Flag operations
        0xF8 => simple(&mut inst, "clc", Cat::Other),
        0xF9 => simple(&mut inst, "stc", Cat::Other),
        0xFA => simple(&mut inst, "cli", Cat::Other),
        0xFB => simple(&mut inst, "sti", Cat::Other),
        0xFC => simple(&mut inst, "cld", Cat::Other),
        0xFD => simple(&mut inst, "std", Cat::Other),

        // INC/DEC r/m8
        0xFE => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, _, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            inst.mnemonic = match (modrm >> 3) & 0x7 {
                0 => "inc",
                1 => "dec",
                _ => "fe_op",
            }
            .to_string();
            inst.category = Cat::Arithmetic;
            inst.operands = rm;
        }

        // Indirect group: INC/DEC/CALL/JMP r/m
        0xFF => {
            let modrm = *data.get(offset)?;
            offset += 1;
            let (rm, _, disp) = modrm_operands(modrm, &data[offset..], rex_w)?;
            offset += disp;
            match (modrm >> 3) & 0x7 {
                0 => unary_rm(&mut inst, "inc", Cat::Arithmetic, rm),
                1 => unary_rm(&mut inst, "dec", Cat::Arithmetic, rm),
                2 => {
                    inst.mnemonic = "call".to_string();
                    inst.category = Cat::Call;
                    inst.falls_through = true;
                    inst.operands = rm;
                }
                4 => {
                    inst.mnemonic = "jmp".to_string();
                    inst.category = Cat::Jump;
                    inst.is_branch = true;
                    inst.operands = rm;
                }
                _ => {
                    inst.mnemonic = "ff_op".to_string();
                    inst.operands = rm;
                }
            }
        }

        // Two-byte opcode space
        0x0F => {
            let opcode2 = *data.get(offset)?;
            offset += 1;
            decode_two_byte(&mut inst, opcode2, data, &mut offset, addr, rex_w)?;
        }

        _ => {
            inst.mnemonic = format!("unk_{:02x}", opcode);
            inst.category = Cat::Unknown;
        }
    }

    inst.size = offset;
    if offset == 0 || offset > data.len() {
        return None;
    }
    inst.bytes = data[..offset].to_vec();
    Some(inst)
}

/// Decode under the 0x0F escape byte.
fn decode_two_byte(
    inst: &mut Instruction,
    opcode2: u8,
    data: &[u8],
    offset: &mut usize,
    addr: Address,
    rex_w: bool,
) -> Option<()> {
    match opcode2 {
        // Jcc rel32
        0x80..=0x8F => {
            let rel = read_u32(data, *offset)? as i32;
            *offset += 4;
            let target = rel_target(addr, *offset, rel as i64);
            inst.mnemonic = format!("j{}", cc_suffix(opcode2 & 0x0F));
            inst.operands = format!("0x{:x}", target);
            inst.category = Cat::Jump;
            inst.is_conditional = true;
            inst.is_branch = true;
            inst.branch_target = target;
            inst.falls_through = true;
        }

        // SETcc r/m8
        0x90..=0x9F => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (rm, _, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = format!("set{}", cc_suffix(opcode2 & 0x0F));
            inst.category = Cat::DataTransfer;
            inst.is_conditional = true;
            inst.operands = rm;
        }

        // CMOVcc r, r/m
        0x40..=0x4F => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = format!("cmov{}", cc_suffix(opcode2 & 0x0F));
            inst.category = Cat::DataTransfer;
            inst.is_conditional = true;
            inst.operands = format!("{}, {}", reg, rm);
        }

        // MOVZX / MOVSX
        0xB6 | 0xB7 | 0xBE | 0xBF => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = if opcode2 < 0xBE { "movzx" } else { "movsx" }.to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = format!("{}, {}", reg, rm);
        }

        // BSF/BSR
        0xBC | 0xBD => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = if opcode2 == 0xBC { "bsf" } else { "bsr" }.to_string();
            inst.category = Cat::Logical;
            inst.operands = format!("{}, {}", reg, rm);
        }

        // BT/BTS/BTR/BTC
        0xA3 | 0xAB | 0xB3 | 0xBB => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = match opcode2 {
                0xA3 => "bt",
                0xAB => "bts",
                0xB3 => "btr",
                _ => "btc",
            }
            .to_string();
            inst.category = Cat::Logical;
            inst.operands = format!("{}, {}", rm, reg);
        }

        // IMUL r, r/m
        0xAF => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = "imul".to_string();
            inst.category = Cat::Arithmetic;
            inst.operands = format!("{}, {}", reg, rm);
        }

        // XADD
        0xC0 | 0xC1 => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = "xadd".to_string();
            inst.category = Cat::Arithmetic;
            inst.operands = format!("{}, {}", rm, reg);
        }

        // CMPXCHG
        0xB0 | 0xB1 => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (rm, reg, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = "cmpxchg".to_string();
            inst.category = Cat::Arithmetic;
            inst.operands = format!("{}, {}", rm, reg);
        }

        // BSWAP r
        0xC8..=0xCF => {
            inst.mnemonic = "bswap".to_string();
            inst.category = Cat::DataTransfer;
            inst.operands = reg_name((opcode2 - 0xC8) as usize, rex_w);
        }

        // MOVD/MOVQ to and from vector registers
        0x6E | 0x7E => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (_, _, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = "movd".to_string();
            inst.category = Cat::DataTransfer;
        }

        // MOVUPS/MOVAPS
        0x10 | 0x11 | 0x28 | 0x29 => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (_, _, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = if opcode2 <= 0x11 { "movups" } else { "movaps" }.to_string();
            inst.category = Cat::DataTransfer;
        }

        // XORPS
        0x57 => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (_, _, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = "xorps".to_string();
            inst.category = Cat::Logical;
        }

        // Packed single arithmetic
        0x58 | 0x59 | 0x5C | 0x5D | 0x5E | 0x5F => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (_, _, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = match opcode2 {
                0x58 => "addps",
                0x59 => "mulps",
                0x5C => "subps",
                0x5D => "minps",
                0x5E => "divps",
                _ => "maxps",
            }
            .to_string();
            inst.category = Cat::Arithmetic;
        }

        // Packed compare equal
        0x74..=0x76 => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (_, _, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = "pcmpeq".to_string();
            inst.category = Cat::Compare;
        }

        // MOVNTI
        0xC3 => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (_, _, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = "movnti".to_string();
            inst.category = Cat::DataTransfer;
        }

        // PREFETCH hints
        0x18 => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            let (_, _, disp) = modrm_operands(modrm, &data[*offset..], rex_w)?;
            *offset += disp;
            inst.mnemonic = "prefetch".to_string();
            inst.category = Cat::Other;
        }

        // UD2
        0x0B => {
            inst.mnemonic = "ud2".to_string();
            inst.category = Cat::Interrupt;
        }

        // LFENCE/MFENCE/SFENCE via the reg sub-op
        0xAE => {
            let modrm = *data.get(*offset)?;
            *offset += 1;
            inst.mnemonic = match (modrm >> 3) & 0x7 {
                5 => "lfence",
                6 => "mfence",
                7 => "sfence",
                _ => "0f_ae",
            }
            .to_string();
            inst.category = Cat::Other;
        }

        // Multi-byte NOP
        0x1F | 0x0D => {
            inst.mnemonic = "nop".to_string();
            inst.category = Cat::Nop;
            if let Some(&modrm) = data.get(*offset) {
                *offset += 1;
                if let Some((_, _, disp)) = modrm_operands(modrm, &data[*offset..], rex_w) {
                    *offset += disp;
                }
            }
        }

        _ => {
            inst.mnemonic = format!("0f_{:02x}", opcode2);
            inst.category = Cat::Unknown;
        }
    }

    Some(())
}

/// Basic x87 mnemonic identification from the opcode byte and ModR/M.
fn decode_fpu(
    inst: &mut Instruction,
    opcode: u8,
    modrm: u8,
    rest: &[u8],
    rex_w: bool,
    offset: &mut usize,
) -> Option<()> {
    inst.category = Cat::Other;

    match opcode {
        0xD9 if modrm >= 0xC0 => {
            inst.mnemonic = match modrm {
                0xE0 => "fchs",
                0xE1 => "fabs",
                0xE4 => "ftst",
                0xE8 => "fld1",
                0xE9 => "fldl2t",
                0xEA => "fldl2e",
                0xEB => "fldpi",
                0xEC => "fldlg2",
                0xED => "fldln2",
                0xEE => "fldz",
                _ => {
                    inst.operands = format!("0x{:02x}", modrm);
                    "fpu_d9"
                }
            }
            .to_string();
        }
        0xD9 => {
            let (rm, _, disp) = modrm_operands(modrm, rest, rex_w)?;
            *offset += disp;
            inst.mnemonic = "fld".to_string();
            inst.operands = rm;
        }
        0xDB if modrm == 0xE3 => inst.mnemonic = "fninit".to_string(),
        0xDF if modrm == 0xE0 => {
            inst.mnemonic = "fnstsw".to_string();
            inst.operands = "ax".to_string();
        }
        _ => {
            inst.mnemonic = format!("fpu_d{:x}", opcode & 0x0F);
            inst.operands = format!("0x{:02x}", modrm);
        }
    }

    Some(())
}

/// ModR/M decoding: `(rm_operand, reg_operand, displacement_bytes)`.
///
/// `rest` starts immediately after the ModR/M byte; the caller advances
/// past the returned displacement length. Fails on a truncated
/// displacement.
fn modrm_operands(modrm: u8, rest: &[u8], wide: bool) -> Option<(String, String, usize)> {
    let mode = modrm >> 6;
    let reg = ((modrm >> 3) & 0x7) as usize;
    let rm = (modrm & 0x7) as usize;

    let reg_str = reg_name(reg, wide);
    let rm_reg = reg_name(rm, wide);

    match mode {
        0 => Some((format!("[{}]", rm_reg), reg_str, 0)),
        1 => {
            let disp = *rest.first()?;
            Some((format!("[{}+0x{:x}]", rm_reg, disp), reg_str, 1))
        }
        2 => {
            if rest.len() < 4 {
                return None;
            }
            let disp = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
            Some((format!("[{}+0x{:x}]", rm_reg, disp), reg_str, 4))
        }
        _ => Some((rm_reg, reg_str, 0)),
    }
}

/// Mnemonic and category for the eight one-byte ALU families.
fn alu_op(index: u8) -> (&'static str, InstructionCategory) {
    match index & 0x7 {
        0 => ("add", Cat::Arithmetic),
        1 => ("or", Cat::Logical),
        2 => ("adc", Cat::Arithmetic),
        3 => ("sbb", Cat::Arithmetic),
        4 => ("and", Cat::Logical),
        5 => ("sub", Cat::Arithmetic),
        6 => ("xor", Cat::Logical),
        _ => ("cmp", Cat::Compare),
    }
}

/// Condition-code suffix shared by Jcc/SETcc/CMOVcc.
fn cc_suffix(cc: u8) -> &'static str {
    const SUFFIXES: [&str; 16] = [
        "o", "no", "b", "ae", "e", "ne", "be", "a", "s", "ns", "p", "np", "l", "ge", "le", "g",
    ];
    SUFFIXES[(cc & 0x0F) as usize]
}

fn reg_name(n: usize, wide: bool) -> String {
    const REGS64: [&str; 8] = ["rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi"];
    const REGS32: [&str; 8] = ["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi"];
    if wide {
        REGS64.get(n).map_or_else(|| format!("r{}", n), |r| r.to_string())
    } else {
        REGS32.get(n).map_or_else(|| format!("r{}d", n), |r| r.to_string())
    }
}

fn reg_name8(n: usize) -> String {
    const REGS8: [&str; 8] = ["al", "cl", "dl", "bl", "ah", "ch", "dh", "bh"];
    REGS8.get(n).map_or_else(|| format!("r{}b", n), |r| r.to_string())
}

fn seg_name(n: u8) -> &'static str {
    const SEGS: [&str; 8] = ["es", "cs", "ss", "ds", "fs", "gs", "seg6", "seg7"];
    SEGS[(n & 0x7) as usize]
}

/// `target = address + size + sign_extend(rel)`.
fn rel_target(addr: Address, size: usize, rel: i64) -> Address {
    addr.wrapping_add(size as u64).wrapping_add(rel as u64)
}

fn signed_hex(v: i64) -> String {
    if v < 0 {
        format!("-0x{:x}", -v)
    } else {
        format!("0x{:x}", v)
    }
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?;
    Some(u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}

fn simple(inst: &mut Instruction, mnemonic: &str, category: InstructionCategory) {
    inst.mnemonic = mnemonic.to_string();
    inst.category = category;
}

fn two_operand_simple(inst: &mut Instruction, mnemonic: &str, operands: &str, category: InstructionCategory) {
    inst.mnemonic = mnemonic.to_string();
    inst.operands = operands.to_string();
    inst.category = category;
}

fn seg_stack(inst: &mut Instruction, mnemonic: &str, seg: &str) {
    inst.mnemonic = mnemonic.to_string();
    inst.operands = seg.to_string();
    inst.category = Cat::Stack;
}

fn unary_rm(inst: &mut Instruction, mnemonic: &str, category: InstructionCategory, rm: String) {
    inst.mnemonic = mnemonic.to_string();
    inst.category = category;
    inst.operands = rm;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Architecture::{X86, X86_64};

    fn decode64(bytes: &[u8], addr: Address) -> Instruction {
        decode_instruction(bytes, addr, X86_64).expect("decode failed")
    }

    #[test]
    fn test_short_conditional_jump() {
        // je +5 at 0x1000 -> target 0x1007
        let inst = decode64(&[0x74, 0x05], 0x1000);
        assert_eq!(inst.mnemonic, "je");
        assert_eq!(inst.size, 2);
        assert_eq!(inst.bytes, vec![0x74, 0x05]);
        assert!(inst.is_conditional);
        assert!(inst.is_branch);
        assert!(inst.falls_through);
        assert_eq!(inst.branch_target, 0x1007);
        assert_eq!(inst.operands, "0x1007");
    }

    #[test]
    fn test_backward_short_jump() {
        // jne -2 at 0x1000 -> target 0x1000
        let inst = decode64(&[0x75, 0xFE], 0x1000);
        assert_eq!(inst.mnemonic, "jne");
        assert_eq!(inst.branch_target, 0x1000);
    }

    #[test]
    fn test_relative_call() {
        let inst = decode64(&[0xE8, 0x10, 0x00, 0x00, 0x00], 0x2000);
        assert_eq!(inst.mnemonic, "call");
        assert_eq!(inst.size, 5);
        assert_eq!(inst.category, Cat::Call);
        assert_eq!(inst.branch_target, 0x2015);
        assert!(inst.falls_through);
        assert!(!inst.is_conditional);
    }

    #[test]
    fn test_jmp_rel32() {
        // jmp -0x10 at 0x3000: target = 0x3000 + 5 - 0x10 = 0x2ff5
        let inst = decode64(&[0xE9, 0xF0, 0xFF, 0xFF, 0xFF], 0x3000);
        assert_eq!(inst.mnemonic, "jmp");
        assert_eq!(inst.size, 5);
        assert_eq!(inst.branch_target, 0x2FF5);
        assert!(inst.is_branch);
        assert!(!inst.falls_through);
        assert!(!inst.is_conditional);
    }

    #[test]
    fn test_push_pop_names_follow_arch() {
        let push = decode64(&[0x55], 0);
        assert_eq!(push.mnemonic, "push");
        assert_eq!(push.operands, "rbp");
        assert_eq!(push.category, Cat::Stack);
        assert!(push.reads_register("rbp"));

        let pop = decode_instruction(&[0x5D], 0, X86).unwrap();
        assert_eq!(pop.operands, "ebp");
        assert!(pop.writes_register("ebp"));
    }

    #[test]
    fn test_mov_reg_reg_with_rex() {
        // mov rbp, rsp
        let inst = decode64(&[0x48, 0x89, 0xE5], 0);
        assert_eq!(inst.mnemonic, "mov");
        assert_eq!(inst.size, 3);
        assert_eq!(inst.operands, "rbp, rsp");
        assert_eq!(inst.category, Cat::DataTransfer);
    }

    #[test]
    fn test_mov_load_with_disp8() {
        // mov rax, [rbp+0x8]
        let inst = decode64(&[0x48, 0x8B, 0x45, 0x08], 0);
        assert_eq!(inst.mnemonic, "mov");
        assert_eq!(inst.size, 4);
        assert_eq!(inst.operands, "rax, [rbp+0x8]");
    }

    #[test]
    fn test_mov_store_with_disp32() {
        // mov [rbp+0x12345678], ecx (no REX)
        let inst = decode64(&[0x89, 0x8D, 0x78, 0x56, 0x34, 0x12], 0);
        assert_eq!(inst.size, 6);
        assert_eq!(inst.operands, "[ebp+0x12345678], ecx");
    }

    #[test]
    fn test_group1_sub_rsp() {
        // sub rsp, 0x10
        let inst = decode64(&[0x48, 0x83, 0xEC, 0x10], 0);
        assert_eq!(inst.mnemonic, "sub");
        assert_eq!(inst.size, 4);
        assert_eq!(inst.operands, "rsp, 0x10");
        assert_eq!(inst.category, Cat::Arithmetic);
    }

    #[test]
    fn test_group1_sign_extended_imm8() {
        // add eax, -0x10 (0x83 /0): prints as sign-extended 32-bit
        let inst = decode64(&[0x83, 0xC0, 0xF0], 0);
        assert_eq!(inst.mnemonic, "add");
        assert_eq!(inst.operands, "eax, 0xfffffff0");
    }

    #[test]
    fn test_group1_cmp() {
        // cmp rax, 0x0
        let inst = decode64(&[0x48, 0x83, 0xF8, 0x00], 0);
        assert_eq!(inst.mnemonic, "cmp");
        assert_eq!(inst.category, Cat::Compare);
        assert_eq!(inst.operands, "rax, 0x0");
    }

    #[test]
    fn test_mov_imm32_and_imm64() {
        let inst = decode64(&[0xB8, 0x34, 0x12, 0x00, 0x00], 0);
        assert_eq!(inst.mnemonic, "mov");
        assert_eq!(inst.size, 5);
        assert_eq!(inst.operands, "eax, 0x1234");

        // movabs under REX.W consumes an 8-byte immediate
        let inst = decode64(
            &[0x48, 0xB8, 0x89, 0x67, 0x45, 0x23, 0x01, 0x00, 0x00, 0x00],
            0,
        );
        assert_eq!(inst.size, 10);
        assert_eq!(inst.operands, "rax, 0x123456789");
    }

    #[test]
    fn test_ret_family() {
        assert_eq!(decode64(&[0xC3], 0).category, Cat::Return);
        let retn = decode64(&[0xC2, 0x08, 0x00], 0);
        assert_eq!(retn.mnemonic, "ret");
        assert_eq!(retn.size, 3);
        assert_eq!(retn.operands, "0x8");
        assert_eq!(decode64(&[0xCB], 0).mnemonic, "retf");
        assert_eq!(decode64(&[0xCF], 0).category, Cat::Return);
    }

    #[test]
    fn test_nop_and_int3() {
        assert_eq!(decode64(&[0x90], 0).category, Cat::Nop);
        let int3 = decode64(&[0xCC], 0);
        assert_eq!(int3.mnemonic, "int");
        assert_eq!(int3.operands, "3");
        assert_eq!(int3.category, Cat::Interrupt);
    }

    #[test]
    fn test_jcc_rel32() {
        // jne +0x100 at 0x1000: size 6, target 0x1106
        let inst = decode64(&[0x0F, 0x85, 0x00, 0x01, 0x00, 0x00], 0x1000);
        assert_eq!(inst.mnemonic, "jne");
        assert_eq!(inst.size, 6);
        assert_eq!(inst.branch_target, 0x1106);
        assert!(inst.is_conditional);
        assert!(inst.falls_through);
    }

    #[test]
    fn test_setcc_and_cmovcc_are_conditional() {
        // sete al
        let sete = decode64(&[0x0F, 0x94, 0xC0], 0);
        assert_eq!(sete.mnemonic, "sete");
        assert!(sete.is_conditional);
        assert!(!sete.is_branch);

        // cmove eax, ecx
        let cmove = decode64(&[0x0F, 0x44, 0xC1], 0);
        assert_eq!(cmove.mnemonic, "cmove");
        assert!(cmove.is_conditional);
        assert!(!cmove.is_branch);
    }

    #[test]
    fn test_movzx() {
        // movzx eax, cl
        let inst = decode64(&[0x0F, 0xB6, 0xC1], 0);
        assert_eq!(inst.mnemonic, "movzx");
        assert_eq!(inst.size, 3);
        assert_eq!(inst.operands, "eax, ecx");
    }

    #[test]
    fn test_loop_family_targets() {
        // loop -2 at 0x1000: size 2, target 0x1000
        let inst = decode64(&[0xE2, 0xFE], 0x1000);
        assert_eq!(inst.mnemonic, "loop");
        assert_eq!(inst.branch_target, 0x1000);
        assert!(inst.is_branch);
        assert!(!inst.is_conditional);

        let jrcxz = decode64(&[0xE3, 0x04], 0x1000);
        assert_eq!(jrcxz.mnemonic, "jrcxz");
        assert_eq!(jrcxz.branch_target, 0x1006);
        assert!(jrcxz.is_conditional);
        assert!(jrcxz.falls_through);
    }

    #[test]
    fn test_indirect_group() {
        // call rax
        let call = decode64(&[0xFF, 0xD0], 0);
        assert_eq!(call.mnemonic, "call");
        assert_eq!(call.operands, "eax");
        assert_eq!(call.branch_target, 0);
        assert!(call.falls_through);

        // jmp [ecx]
        let jmp = decode64(&[0xFF, 0x21], 0);
        assert_eq!(jmp.mnemonic, "jmp");
        assert!(jmp.is_branch);
        assert_eq!(jmp.branch_target, 0);
    }

    #[test]
    fn test_group3() {
        // neg eax
        let neg = decode64(&[0xF7, 0xD8], 0);
        assert_eq!(neg.mnemonic, "neg");
        assert_eq!(neg.operands, "eax");

        // test eax, 0x1 consumes the imm32
        let test = decode64(&[0xF7, 0xC0, 0x01, 0x00, 0x00, 0x00], 0);
        assert_eq!(test.mnemonic, "test");
        assert_eq!(test.size, 6);
        assert_eq!(test.operands, "eax, 0x1");
    }

    #[test]
    fn test_shift_group() {
        // shl eax, 0x4
        let shl = decode64(&[0xC1, 0xE0, 0x04], 0);
        assert_eq!(shl.mnemonic, "shl");
        assert_eq!(shl.size, 3);
        assert_eq!(shl.operands, "eax, 0x4");

        // sar edx, cl
        let sar = decode64(&[0xD3, 0xFA], 0);
        assert_eq!(sar.mnemonic, "sar");
        assert_eq!(sar.operands, "edx, cl");
    }

    #[test]
    fn test_prefixed_instruction_size() {
        // lock add [ecx], eax: prefix + opcode + modrm
        let inst = decode64(&[0xF0, 0x01, 0x01], 0);
        assert_eq!(inst.mnemonic, "add");
        assert_eq!(inst.size, 3);
    }

    #[test]
    fn test_unknown_is_success() {
        let inst = decode_instruction(&[0xF1], 0, X86).unwrap();
        assert_eq!(inst.mnemonic, "int1");

        // 0x0F followed by an unhandled second byte stays a decode success
        let inst = decode64(&[0x0F, 0xFF], 0);
        assert_eq!(inst.mnemonic, "0f_ff");
        assert_eq!(inst.category, Cat::Unknown);
        assert_eq!(inst.size, 2);
    }

    #[test]
    fn test_underflow_fails() {
        // A lone 0xFF needs a ModR/M byte
        assert!(decode_instruction(&[0xFF], 0x4000, X86_64).is_none());
        // call rel32 truncated
        assert!(decode_instruction(&[0xE8, 0x10, 0x00], 0, X86_64).is_none());
        // empty input
        assert!(decode_instruction(&[], 0, X86_64).is_none());
        // lone prefix
        assert!(decode_instruction(&[0x66], 0, X86_64).is_none());
    }

    #[test]
    fn test_size_matches_bytes_over_opcode_space() {
        // Every successful single-byte-opcode decode of a padded buffer
        // reports size == bytes.len() > 0.
        for opcode in 0..=0xFFu8 {
            let buf = [opcode, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
            for arch in [X86, X86_64] {
                if let Some(inst) = decode_instruction(&buf, 0x1000, arch) {
                    assert!(inst.size > 0, "opcode {:02x}", opcode);
                    assert_eq!(inst.size, inst.bytes.len(), "opcode {:02x}", opcode);
                    assert!(inst.size <= buf.len(), "opcode {:02x}", opcode);
                }
            }
        }
    }

    #[test]
    fn test_vex_recognition() {
        let vex2 = decode64(&[0xC5, 0xF8, 0x28], 0);
        assert_eq!(vex2.mnemonic, "vex2");
        assert_eq!(vex2.size, 2);

        let vex3 = decode64(&[0xC4, 0xE2, 0x79, 0x18], 0);
        assert_eq!(vex3.mnemonic, "vex3");
        assert_eq!(vex3.size, 3);

        // In 32-bit style encodings C5 with a modrm below 0xC0 is LDS
        let lds = decode_instruction(&[0xC5, 0x08], 0, X86).unwrap();
        assert_eq!(lds.mnemonic, "lds");
    }

    #[test]
    fn test_fpu_recognition() {
        let fldz = decode64(&[0xD9, 0xEE], 0);
        assert_eq!(fldz.mnemonic, "fldz");
        assert_eq!(fldz.size, 2);

        let fninit = decode64(&[0xDB, 0xE3], 0);
        assert_eq!(fninit.mnemonic, "fninit");

        let fnstsw = decode64(&[0xDF, 0xE0], 0);
        assert_eq!(fnstsw.mnemonic, "fnstsw");
        assert_eq!(fnstsw.operands, "ax");
    }

    #[test]
    fn test_fences() {
        let mfence = decode64(&[0x0F, 0xAE, 0xF0], 0);
        assert_eq!(mfence.mnemonic, "mfence");
        let lfence = decode64(&[0x0F, 0xAE, 0xE8], 0);
        assert_eq!(lfence.mnemonic, "lfence");
    }

    #[test]
    fn test_unknown_opcode_byte() {
        // 0xD6 is salc, but check the default path with an unused byte
        let inst = decode_instruction(&[0x0F, 0x3A], 0, X86).unwrap();
        assert_eq!(inst.mnemonic, "0f_3a");
        assert_eq!(inst.category, Cat::Unknown);
    }

    #[test]
    fn test_decoder_trait_with_base() {
        let image = [0x90, 0xE8, 0x10, 0x00, 0x00, 0x00];
        let decoder = X86Decoder::with_base(X86_64, 0x400000);

        let nop = decoder.decode(&image, 0).unwrap();
        assert_eq!(nop.address, 0x400000);

        let call = decoder.decode(&image, 1).unwrap();
        assert_eq!(call.address, 0x400001);
        assert_eq!(call.branch_target, 0x400016);

        assert!(decoder.decode(&image, 6).is_none());
    }

    #[test]
    fn test_inc_dec_in_32_bit_mode() {
        let inc = decode_instruction(&[0x40], 0, X86).unwrap();
        assert_eq!(inc.mnemonic, "inc");
        assert_eq!(inc.operands, "eax");

        let dec = decode_instruction(&[0x4B], 0, X86).unwrap();
        assert_eq!(dec.mnemonic, "dec");
        assert_eq!(dec.operands, "ebx");
    }

    #[test]
    fn test_xchg_accumulator() {
        let inst = decode64(&[0x48, 0x91], 0);
        assert_eq!(inst.mnemonic, "xchg");
        assert_eq!(inst.operands, "rax, rcx");
    }

    #[test]
    fn test_lea() {
        // lea rax, [rbp+0x10]
        let inst = decode64(&[0x48, 0x8D, 0x45, 0x10], 0);
        assert_eq!(inst.mnemonic, "lea");
        assert_eq!(inst.operands, "rax, [rbp+0x10]");
    }

    #[test]
    fn test_string_ops() {
        assert_eq!(decode64(&[0xA4], 0).mnemonic, "movsb");
        assert_eq!(decode64(&[0xAB], 0).mnemonic, "stos");
        assert_eq!(decode64(&[0xAE], 0).category, Cat::Compare);
    }
}
