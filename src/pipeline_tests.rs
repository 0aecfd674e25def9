//! End-to-end pipeline tests over synthetic sections.

use crate::analyzer::{analyze, analyze_function};
use crate::cfg::ConditionalKind;
use crate::lifter::OperationKind;
use crate::sweep::SHF_EXECINSTR;
use crate::{
    functions, sweep, Address, Architecture, Binary, BinaryFormat, Function, Section, Symbol,
};

fn binary_from(section_bytes: Vec<u8>, base: Address, symbols: Vec<Symbol>) -> Binary {
    let size = section_bytes.len() as u64;
    Binary {
        format: BinaryFormat::Elf,
        arch: Architecture::X86_64,
        entry_point: Some(base),
        sections: vec![Section::new(
            ".text".to_string(),
            base,
            size,
            section_bytes,
            SHF_EXECINSTR,
            true,
        )],
        symbols,
        imports: Vec::new(),
        file_size: 0x100,
        path: "synthetic".to_string(),
    }
}

fn function_from(bytes: &[u8], base: Address) -> Function {
    let section = Section::new(
        ".text".to_string(),
        base,
        bytes.len() as u64,
        bytes.to_vec(),
        SHF_EXECINSTR,
        true,
    );
    let instructions = sweep::sweep_section(&section, Architecture::X86_64).unwrap();
    let funcs = functions::find_functions(&instructions, &[]);
    assert_eq!(funcs.len(), 1, "expected a single function");
    funcs.into_iter().next().unwrap()
}

#[test]
fn prologue_lifts_to_single_block_function() {
    // 55 48 89 E5 48 83 EC 10 C3 at 0x3000:
    // push rbp; mov rbp, rsp; sub rsp, 0x10; ret
    let func = function_from(&[0x55, 0x48, 0x89, 0xE5, 0x48, 0x83, 0xEC, 0x10, 0xC3], 0x3000);
    let result = analyze_function(func);

    assert_eq!(result.cfg.blocks.len(), 1);
    assert!(result.lifted.has_return);

    // push rbp and pop rbp emit nothing; mov, sub, ret each emit one
    let kinds: Vec<OperationKind> = result.lifted.operations.iter().map(|o| o.kind).collect();
    assert_eq!(
        kinds,
        vec![
            OperationKind::Assign,
            OperationKind::Arithmetic,
            OperationKind::Return
        ]
    );
    let sub = &result.lifted.operations[1];
    assert_eq!(sub.operator, "sub");
}

#[test]
fn back_edge_produces_one_loop() {
    // B0: cmp/je; B1: sub, jmp B0; B2: ret - one natural loop with
    // header B0 and members {B0, B1}
    let func = function_from(
        &[
            0x55, // push rbp (start marker)
            0x83, 0xF8, 0x00, // cmp eax, 0
            0x74, 0x05, // je ret
            0x83, 0xE8, 0x01, // sub eax, 1
            0xEB, 0xF6, // jmp cmp
            0xC3, // ret
        ],
        0x1000,
    );
    let result = analyze_function(func);

    assert_eq!(result.loops.len(), 1);
    let lp = &result.loops[0];
    let header = lp.header;

    let mut members = lp.blocks.clone();
    members.sort_unstable();
    assert_eq!(members.len(), 2);
    for &m in &members {
        assert_eq!(result.cfg.blocks[m].loop_header, Some(header));
    }
    // head of the back edge dominates its tail
    for &m in &members {
        if result.cfg.blocks[m].successors.contains(&header) {
            assert!(result.cfg.dominates(header, m));
        }
    }
}

#[test]
fn diamond_yields_if_then_else() {
    // B0 (cond) -> {B1, B2} -> B3: one if-then-else with merge B3
    let func = function_from(
        &[
            0x55, // push rbp
            0x83, 0xF8, 0x00, // 0x1001 cmp eax, 0
            0x74, 0x07, // 0x1004 je 0x100d
            0xB8, 0x01, 0x00, 0x00, 0x00, // 0x1006 mov eax, 1
            0xEB, 0x05, // 0x100b jmp 0x1012
            0xB8, 0x02, 0x00, 0x00, 0x00, // 0x100d mov eax, 2
            0xC3, // 0x1012 ret
        ],
        0x1000,
    );
    let result = analyze_function(func);

    assert_eq!(result.conditionals.len(), 1);
    let cond = &result.conditionals[0];
    assert_eq!(cond.kind, ConditionalKind::IfThenElse);

    let merge = cond.merge.expect("merge block");
    assert_eq!(result.cfg.blocks[merge].start_addr, 0x1012);
    // both arms flow into the merge block
    assert!(result.cfg.blocks[cond.then_block].successors.contains(&merge));
    assert!(result.cfg.blocks[cond.else_block].successors.contains(&merge));
}

#[test]
fn whole_pipeline_over_synthetic_binary() {
    // two functions, the first calling the second
    let bytes = vec![
        // main at 0x1000
        0x55, // push rbp
        0x48, 0x89, 0xE5, // mov rbp, rsp
        0xE8, 0x02, 0x00, 0x00, 0x00, // call 0x100b
        0x5D, // pop rbp
        0xC3, // ret at 0x100a
        // helper at 0x100b
        0x55, // push rbp
        0xB8, 0x2A, 0x00, 0x00, 0x00, // mov eax, 0x2a
        0x5D, // pop rbp
        0xC3, // ret
    ];
    let symbols = vec![
        Symbol {
            name: "main".to_string(),
            address: 0x1000,
            size: 11,
            kind: "FUNC".to_string(),
        },
        Symbol {
            name: "helper".to_string(),
            address: 0x100b,
            size: 8,
            kind: "FUNC".to_string(),
        },
    ];
    let analysis = analyze(binary_from(bytes, 0x1000, symbols)).unwrap();

    assert_eq!(analysis.functions.len(), 2);

    let main = &analysis.functions[0].lifted;
    assert_eq!(main.function.name, "main");
    assert_eq!(main.function.calls, vec![0x1004]);
    assert!(main.has_return);
    let call = main
        .operations
        .iter()
        .find(|o| o.kind == OperationKind::Call)
        .expect("call operation");
    assert_eq!(call.src1, "0x100b");

    let helper = &analysis.functions[1].lifted;
    assert_eq!(helper.function.name, "helper");
    assert_eq!(helper.function.start_addr, 0x100b);
    assert!(helper.has_return);
}

#[test]
fn undecodable_bytes_recover_and_keep_functions() {
    // a function followed by a truncated group opcode: the sweep skips
    // the unframeable byte and the function still comes out whole
    let bytes = vec![
        0x55, 0x48, 0x89, 0xE5, 0xC3, // entry
        0xFF, // truncated group at the section tail
    ];
    let symbols = vec![Symbol {
        name: "entry".to_string(),
        address: 0x1000,
        size: 5,
        kind: "FUNC".to_string(),
    }];
    let analysis = analyze(binary_from(bytes, 0x1000, symbols)).unwrap();

    assert_eq!(analysis.functions.len(), 1);
    let entry = &analysis.functions[0];
    assert_eq!(entry.lifted.function.name, "entry");
    assert_eq!(entry.lifted.function.start_addr, 0x1000);
    assert!(entry.lifted.has_return);
    // nothing decoded past the ret
    assert_eq!(entry.lifted.function.end_addr, 0x1004);
}

#[test]
fn every_instruction_lands_in_exactly_one_block() {
    let func = function_from(
        &[
            0x55, 0x83, 0xF8, 0x00, 0x74, 0x05, 0x83, 0xE8, 0x01, 0xEB, 0xF6, 0xC3,
        ],
        0x1000,
    );
    let total = func.instructions.len();
    let result = analyze_function(func);

    let in_blocks: usize = result.cfg.blocks.iter().map(|b| b.instructions.len()).sum();
    assert_eq!(in_blocks, total);

    // block ranges are disjoint
    let mut ranges: Vec<(Address, Address)> = result
        .cfg
        .blocks
        .iter()
        .map(|b| (b.start_addr, b.end_addr))
        .collect();
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 < pair[1].0);
    }
}

#[test]
fn empty_function_is_a_valid_empty_result() {
    let result = analyze_function(Function::default());
    assert!(result.cfg.blocks.is_empty());
    assert!(result.loops.is_empty());
    assert!(result.conditionals.is_empty());
    assert!(result.lifted.operations.is_empty());
}
