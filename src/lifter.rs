//! Assembly-to-operation lifting.
//!
//! Each instruction becomes at most one `Operation`. A per-function map
//! from physical registers to synthetic variables (`var0`, `var1`, ...)
//! keeps assignments stable across the instruction stream; stack-relative
//! moves allocate locals, register moves alias.

use std::collections::HashMap;

use crate::{Address, Function, InstructionCategory};

/// Kind of a lifted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationKind {
    #[default]
    Assign,
    Call,
    Return,
    If,
    Loop,
    Compare,
    Arithmetic,
    MemoryAccess,
}

/// One high-level operation. Unused fields stay empty.
#[derive(Debug, Clone, Default)]
pub struct Operation {
    pub kind: OperationKind,
    pub dest: String,
    pub src1: String,
    pub src2: String,
    pub operator: String,
    pub address: Address,
    pub comment: String,
}

/// A synthetic variable tracked by the lifter.
#[derive(Debug, Clone, Default)]
pub struct Variable {
    pub name: String,
    /// Inferred type; "int" until upgraded by `infer_types`
    pub ty: String,
    /// Register the variable was first bound to
    pub register: String,
    pub is_local: bool,
    pub is_param: bool,
}

/// A function plus its lifted representation.
#[derive(Debug, Clone, Default)]
pub struct LiftedFunction {
    pub function: Function,
    pub variables: Vec<Variable>,
    pub operations: Vec<Operation>,
    pub local_vars: usize,
    pub has_return: bool,
}

/// Lift a function's instructions into operations.
pub fn lift(function: Function) -> LiftedFunction {
    let mut lifted = LiftedFunction {
        function,
        ..Default::default()
    };

    // register -> variable name, local to this function
    let mut reg_map: HashMap<String, String> = HashMap::new();
    let mut var_count = 0usize;

    for i in 0..lifted.function.instructions.len() {
        let inst = &lifted.function.instructions[i];
        let mut op = Operation {
            address: inst.address,
            ..Default::default()
        };

        let emitted = match inst.mnemonic.as_str() {
            "push" => {
                if (inst.operands == "rbp" || inst.operands == "ebp") && i == 0 {
                    // prologue noise
                    false
                } else {
                    op.kind = OperationKind::Assign;
                    op.comment = format!("save {}", inst.operands);
                    true
                }
            }

            "pop" => {
                if inst.operands == "rbp" || inst.operands == "ebp" {
                    // epilogue noise
                    false
                } else {
                    op.kind = OperationKind::Assign;
                    op.comment = format!("restore {}", inst.operands);
                    true
                }
            }

            "mov" => {
                op.kind = OperationKind::Assign;
                match split_operands(&inst.operands) {
                    Some((dest, src)) => {
                        if src.contains("rbp") || src.contains("rsp") {
                            // load from a local: bind a fresh variable
                            let var = format!("var{}", var_count);
                            var_count += 1;
                            reg_map.insert(dest.clone(), var.clone());
                            lifted.variables.push(Variable {
                                name: var.clone(),
                                register: dest,
                                is_local: true,
                                ..Default::default()
                            });
                            op.dest = var;
                            op.src1 = src;
                            true
                        } else if dest.contains("rbp") || dest.contains("rsp") {
                            // store to a local
                            if let Some(var) = reg_map.get(&src) {
                                op.dest = "local".to_string();
                                op.src1 = var.clone();
                                true
                            } else {
                                false
                            }
                        } else if let Some(src_var) = reg_map.get(&src).cloned() {
                            // register copy aliases the variable
                            reg_map.insert(dest.clone(), src_var.clone());
                            op.dest = dest;
                            op.src1 = src_var;
                            true
                        } else {
                            let var = format!("var{}", var_count);
                            var_count += 1;
                            reg_map.insert(dest.clone(), var.clone());
                            lifted.variables.push(Variable {
                                name: var.clone(),
                                register: dest,
                                ..Default::default()
                            });
                            op.dest = var;
                            op.src1 = src;
                            true
                        }
                    }
                    None => false,
                }
            }

            "call" => {
                op.kind = OperationKind::Call;
                op.dest = "result".to_string();
                op.src1 = inst.operands.clone();
                if inst.operands.starts_with("0x") {
                    op.comment = format!("call to {}", inst.operands);
                }
                true
            }

            "ret" => {
                op.kind = OperationKind::Return;
                lifted.has_return = true;
                if let Some(var) = reg_map.get("rax") {
                    op.src1 = var.clone();
                }
                true
            }

            "add" | "sub" | "mul" | "imul" | "div" | "idiv" => {
                op.kind = OperationKind::Arithmetic;
                op.operator = inst.mnemonic.clone();
                if let Some((dest, src)) = split_operands(&inst.operands) {
                    if let Some(var) = reg_map.get(&dest) {
                        op.dest = var.clone();
                        op.src1 = var.clone();
                    } else {
                        op.dest = dest.clone();
                        op.src1 = dest;
                    }
                    op.src2 = src;
                }
                true
            }

            "cmp" | "test" => {
                op.kind = OperationKind::Compare;
                if let Some((lhs, rhs)) = split_operands(&inst.operands) {
                    op.src1 = lhs;
                    op.src2 = rhs;
                }
                true
            }

            _ if inst.category == InstructionCategory::Jump => {
                op.kind = OperationKind::If;
                op.operator = inst.mnemonic.clone();
                op.src1 = inst.operands.clone();
                op.comment = format!("conditional jump: {}", inst.mnemonic);
                true
            }

            _ => {
                // no structured operation; record the raw form
                op.comment = format!("{} {}", inst.mnemonic, inst.operands)
                    .trim_end()
                    .to_string();
                !op.comment.is_empty()
            }
        };

        if emitted {
            lifted.operations.push(op);
        }
    }

    lifted.local_vars = var_count;
    lifted
}

/// Mark loop heads: any `If` whose hex target lies before the operation
/// itself is a back edge, and the operation at the target gets a
/// `LOOP_START: ` comment prefix.
pub fn annotate_control_flow(lifted: &mut LiftedFunction) {
    let mut backward_targets: Vec<Address> = Vec::new();

    for op in &lifted.operations {
        if op.kind != OperationKind::If {
            continue;
        }
        if let Some(target) = parse_hex(&op.src1) {
            if target < op.address {
                backward_targets.push(target);
            }
        }
    }

    for op in lifted.operations.iter_mut() {
        if backward_targets.contains(&op.address) {
            op.comment = format!("LOOP_START: {}", op.comment);
        }
    }
}

/// Trivial type inference: every variable is "int" unless some operation
/// touching it dereferences memory, mentions a pointer, or carries a hex
/// constant above 0x10000.
pub fn infer_types(lifted: &mut LiftedFunction) {
    for var in lifted.variables.iter_mut() {
        var.ty = "int".to_string();

        for op in &lifted.operations {
            if op.dest != var.name && op.src1 != var.name {
                continue;
            }
            if op.src1.contains('[') || op.comment.contains("pointer") {
                var.ty = "void*".to_string();
            }
            if let Some(value) = parse_hex(&op.src2) {
                if value > 0x10000 {
                    var.ty = "void*".to_string();
                }
            }
        }
    }
}

fn split_operands(operands: &str) -> Option<(String, String)> {
    let mut parts = operands.splitn(2, ',');
    let dest = parts.next()?.trim();
    let src = parts.next()?.trim();
    if dest.is_empty() || src.is_empty() {
        return None;
    }
    Some((dest.to_string(), src.to_string()))
}

fn parse_hex(s: &str) -> Option<u64> {
    let hex = s.strip_prefix("0x")?;
    u64::from_str_radix(hex, 16).ok()
}
