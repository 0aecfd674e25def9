//! Heuristic function discovery over the flat instruction stream.
//!
//! Two passes: the first marks probable function starts (symbol addresses,
//! post-return boundaries, prologue shapes), the second walks the stream and
//! emits `Function` records, closing each one after a return.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::{Address, Function, Instruction, InstructionCategory, Symbol};

/// Segment the instruction stream into functions.
///
/// Symbols are the most authoritative start markers; prologue heuristics
/// fill in the rest. Boundaries are best-effort: a missed or extra start
/// never halts the pipeline.
pub fn find_functions(instructions: &[Instruction], symbols: &[Symbol]) -> Vec<Function> {
    let mut symbol_names: HashMap<Address, String> = HashMap::new();
    let mut symbol_addrs: HashSet<Address> = HashSet::new();
    for sym in symbols {
        if !sym.name.is_empty() {
            symbol_names.insert(sym.address, sym.name.clone());
            symbol_addrs.insert(sym.address);
        }
    }

    // First pass: mark probable function starts.
    let mut starts: HashSet<Address> = HashSet::new();
    for (i, inst) in instructions.iter().enumerate() {
        if is_padding_or_data(instructions, i) {
            continue;
        }

        let mut is_start = false;

        // 1. Symbol addresses are definite starts
        if symbol_addrs.contains(&inst.address) {
            is_start = true;
        }

        // 2. The instruction after a return starts a new function, unless
        // it is filler
        if i > 0
            && instructions[i - 1].mnemonic == "ret"
            && inst.mnemonic != "nop"
            && inst.mnemonic != "int"
            && !inst.mnemonic.starts_with("unk_")
        {
            is_start = true;
        }

        // 3. Traditional prologue: push rbp/ebp
        if inst.mnemonic == "push"
            && (inst.operands == "rbp" || inst.operands == "ebp")
            && i + 1 < instructions.len()
            && !is_padding_sequence(instructions, i, 5)
        {
            is_start = true;
        }

        // 4. Stack-frame allocation: sub rsp, imm
        if inst.mnemonic == "sub"
            && inst.operands.contains("rsp")
            && (i == 0 || instructions[i - 1].category == InstructionCategory::Return)
        {
            is_start = true;
        }

        // 5. Frame pointer capture: mov reg, rsp
        if inst.mnemonic == "mov"
            && inst.operands.contains("rsp")
            && (i == 0 || instructions[i - 1].category == InstructionCategory::Return)
        {
            is_start = true;
        }

        if is_start {
            starts.insert(inst.address);
        }
    }

    // Second pass: walk and emit.
    let mut functions = Vec::new();
    let mut current: Option<Function> = None;

    for (i, inst) in instructions.iter().enumerate() {
        if starts.contains(&inst.address) {
            if let Some(mut func) = current.take() {
                func.end_addr = inst.address.wrapping_sub(1);
                if !func.instructions.is_empty() {
                    functions.push(func);
                }
            }

            let name = symbol_names
                .get(&inst.address)
                .cloned()
                .unwrap_or_else(|| format!("sub_{:x}", inst.address));

            current = Some(Function {
                name,
                start_addr: inst.address,
                ..Default::default()
            });
        }

        if let Some(func) = current.as_mut() {
            func.instructions.push(inst.clone());

            if inst.mnemonic == "call" {
                func.calls.push(inst.address);
            }

            if inst.mnemonic == "ret" {
                func.end_addr = inst.address;
            }
        }

        // Function epilogue: close on return
        if inst.mnemonic == "ret" {
            if let Some(func) = current.take() {
                if !func.instructions.is_empty() {
                    functions.push(func);
                }
            }
        }

        if i == instructions.len() - 1 {
            if let Some(mut func) = current.take() {
                func.end_addr = inst.address;
                if !func.instructions.is_empty() {
                    functions.push(func);
                }
            }
        }
    }

    debug!("discovered {} functions", functions.len());
    functions
}

/// Detects int3 padding and long nop runs.
fn is_padding_or_data(instructions: &[Instruction], index: usize) -> bool {
    let Some(inst) = instructions.get(index) else {
        return false;
    };

    if inst.mnemonic == "int" && inst.operands == "3" {
        return true;
    }

    if inst.mnemonic == "nop" {
        let mut nop_count = 1;
        for other in instructions.iter().skip(index + 1).take(9) {
            if other.mnemonic == "nop" {
                nop_count += 1;
            } else {
                break;
            }
        }
        if nop_count > 5 {
            return true;
        }
    }

    false
}

/// True when more than half of the next `count` instructions are filler.
fn is_padding_sequence(instructions: &[Instruction], start: usize, count: usize) -> bool {
    let mut padding = 0;
    for inst in instructions.iter().skip(start).take(count) {
        if inst.mnemonic == "int" || inst.mnemonic == "nop" {
            padding += 1;
        }
    }
    padding > count / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::X86Decoder;
    use crate::sweep::sweep;
    use crate::Architecture::X86_64;

    fn decode_stream(bytes: &[u8], base: Address) -> Vec<Instruction> {
        let decoder = X86Decoder::with_base(X86_64, base);
        sweep(bytes, &decoder)
    }

    fn symbol(name: &str, address: Address) -> Symbol {
        Symbol {
            name: name.to_string(),
            address,
            size: 0,
            kind: "FUNC".to_string(),
        }
    }

    #[test]
    fn test_two_functions_split_on_ret() {
        // f1: push rbp; mov rbp, rsp; ret
        // f2: push rbp; mov rbp, rsp; ret
        let bytes = [
            0x55, 0x48, 0x89, 0xE5, 0xC3, //
            0x55, 0x48, 0x89, 0xE5, 0xC3,
        ];
        let insns = decode_stream(&bytes, 0x1000);
        let funcs = find_functions(&insns, &[]);

        assert_eq!(funcs.len(), 2);
        assert_eq!(funcs[0].start_addr, 0x1000);
        assert_eq!(funcs[0].end_addr, 0x1004);
        assert_eq!(funcs[0].name, "sub_1000");
        assert_eq!(funcs[1].start_addr, 0x1005);
        assert_eq!(funcs[1].end_addr, 0x1009);
        assert_eq!(funcs[0].instructions.len(), 3);
    }

    #[test]
    fn test_symbol_names_take_priority() {
        let bytes = [0x55, 0x48, 0x89, 0xE5, 0xC3];
        let insns = decode_stream(&bytes, 0x1000);
        let funcs = find_functions(&insns, &[symbol("main", 0x1000)]);

        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].name, "main");
    }

    #[test]
    fn test_calls_recorded() {
        // push rbp; call +0; ret
        let bytes = [0x55, 0xE8, 0x00, 0x00, 0x00, 0x00, 0xC3];
        let insns = decode_stream(&bytes, 0x1000);
        let funcs = find_functions(&insns, &[]);

        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].calls, vec![0x1001]);
    }

    #[test]
    fn test_padding_not_a_start() {
        // f1 ends with ret, then int3 padding, then a symbol-less
        // prologue that must still open a new function.
        let bytes = [
            0x55, 0x48, 0x89, 0xE5, 0x90, 0xC3, // f1
            0xCC, 0xCC, 0xCC, // int3 padding
            0x55, 0x48, 0x89, 0xE5, 0xC3, // f2
        ];
        let insns = decode_stream(&bytes, 0x2000);
        let funcs = find_functions(&insns, &[]);

        assert_eq!(funcs.len(), 2);
        assert_eq!(funcs[0].end_addr, 0x2005);
        assert_eq!(funcs[1].start_addr, 0x2009);
        // the int3 run belongs to no function
        assert!(funcs.iter().all(|f| f
            .instructions
            .iter()
            .all(|i| !(i.mnemonic == "int" && i.operands == "3"))));
    }

    #[test]
    fn test_long_nop_run_is_padding() {
        let mut bytes = vec![0x55, 0x48, 0x89, 0xE5, 0xC3];
        bytes.extend(std::iter::repeat(0x90).take(8));
        bytes.extend([0x55, 0x48, 0x89, 0xE5, 0xC3]);

        let insns = decode_stream(&bytes, 0x3000);
        let funcs = find_functions(&insns, &[]);

        assert_eq!(funcs.len(), 2);
        assert_eq!(funcs[1].start_addr, 0x300d);
    }

    #[test]
    fn test_sub_rsp_start_after_ret() {
        // ret-closed function, then a frameless function that opens
        // with sub rsp, imm
        let bytes = [
            0x55, 0xC3, // f1
            0x48, 0x83, 0xEC, 0x10, // sub rsp, 0x10
            0x48, 0x83, 0xC4, 0x10, // add rsp, 0x10
            0xC3,
        ];
        let insns = decode_stream(&bytes, 0x4000);
        let funcs = find_functions(&insns, &[]);

        assert_eq!(funcs.len(), 2);
        assert_eq!(funcs[1].start_addr, 0x4002);
        assert_eq!(funcs[1].instructions.len(), 3);
    }

    #[test]
    fn test_stream_without_markers_yields_nothing() {
        // No symbol, no prologue, no preceding ret: instructions are
        // not attributed to any function.
        let bytes = [0x90, 0x90, 0x90];
        let insns = decode_stream(&bytes, 0x5000);
        assert!(find_functions(&insns, &[]).is_empty());
    }

    #[test]
    fn test_last_function_closed_at_stream_end() {
        let bytes = [0x55, 0x48, 0x89, 0xE5, 0x90];
        let insns = decode_stream(&bytes, 0x6000);
        let funcs = find_functions(&insns, &[]);

        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].end_addr, 0x6004);
    }
}
