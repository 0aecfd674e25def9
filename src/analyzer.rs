//! Whole-binary analysis: sweep, discover, recover control flow, lift.
//!
//! Per-function analysis is independent once the instruction stream is
//! segmented, so functions are processed in parallel.

use log::debug;
use rayon::prelude::*;

use crate::cfg::{detect_conditionals, detect_loops, Conditional, ControlFlowGraph, Loop};
use crate::lifter::{self, LiftedFunction};
use crate::{functions, sweep, AnalysisError, Binary, Function};

/// Everything recovered for one function.
#[derive(Debug, Clone)]
pub struct FunctionAnalysis {
    pub cfg: ControlFlowGraph,
    pub loops: Vec<Loop>,
    pub conditionals: Vec<Conditional>,
    pub lifted: LiftedFunction,
}

/// Analysis result for a whole binary.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub binary: Binary,
    pub functions: Vec<FunctionAnalysis>,
    pub strings: Vec<String>,
    /// "c" or "go"
    pub detected_language: String,
    /// Winning share of the heuristic score, in [0, 1]
    pub confidence: f64,
    pub go_indicators: Vec<String>,
    pub c_indicators: Vec<String>,
}

/// Run the full pipeline over a parsed binary.
pub fn analyze(binary: Binary) -> Result<Analysis, AnalysisError> {
    sweep::ensure_supported(binary.arch)?;

    let strings = extract_strings(&binary);

    let mut analyzed = Vec::new();
    for section in binary.sections.iter().filter(|s| sweep::is_code_section(s)) {
        debug!(
            "disassembling section {} (0x{:x} bytes)",
            section.name, section.size
        );

        let instructions = sweep::sweep_section(section, binary.arch)?;
        let found = functions::find_functions(&instructions, &binary.symbols);
        debug!("found {} functions in {}", found.len(), section.name);

        let per_function: Vec<FunctionAnalysis> =
            found.into_par_iter().map(analyze_function).collect();
        analyzed.extend(per_function);
    }

    let (detected_language, confidence, go_indicators, c_indicators) =
        detect_language(&binary, &strings);

    Ok(Analysis {
        binary,
        functions: analyzed,
        strings,
        detected_language,
        confidence,
        go_indicators,
        c_indicators,
    })
}

/// CFG, loops, conditionals, and lifted form for one function.
pub fn analyze_function(function: Function) -> FunctionAnalysis {
    let mut cfg = ControlFlowGraph::build(&function);
    let loops = detect_loops(&mut cfg);
    let conditionals = detect_conditionals(&cfg);

    let mut lifted = lifter::lift(function);
    lifter::annotate_control_flow(&mut lifted);
    lifter::infer_types(&mut lifted);

    FunctionAnalysis {
        cfg,
        loops,
        conditionals,
        lifted,
    }
}

/// Printable-ASCII runs of at least four bytes from data sections.
fn extract_strings(binary: &Binary) -> Vec<String> {
    let mut strings = Vec::new();

    for section in &binary.sections {
        let name = section.name.to_lowercase();
        if !(name.contains("data") || name.contains("rodata") || name.contains("rdata")) {
            continue;
        }

        let mut current = Vec::new();
        for &b in &section.data {
            if (32..=126).contains(&b) {
                current.push(b);
            } else {
                if current.len() >= 4 {
                    strings.push(String::from_utf8_lossy(&current).into_owned());
                }
                current.clear();
            }
        }
        if current.len() >= 4 {
            strings.push(String::from_utf8_lossy(&current).into_owned());
        }
    }

    strings
}

/// Weighted-score guess at the source language (C vs. Go).
fn detect_language(
    binary: &Binary,
    strings: &[String],
) -> (String, f64, Vec<String>, Vec<String>) {
    let mut go_score = 0.0f64;
    let mut c_score = 0.0f64;
    let mut go_indicators = Vec::new();
    let mut c_indicators = Vec::new();

    for sym in &binary.symbols {
        let name = sym.name.to_lowercase();

        if name.starts_with("runtime.")
            || name.starts_with("go.")
            || name.contains("golang")
            || name.starts_with("type..")
        {
            go_score += 10.0;
            go_indicators.push(format!("Symbol: {}", sym.name));
        }

        if name.contains("gc") && name.contains("runtime") {
            go_score += 5.0;
            go_indicators.push(format!("GC symbol: {}", sym.name));
        }

        if name.contains("sched") || name.contains("goroutine") {
            go_score += 5.0;
            go_indicators.push(format!("Scheduler: {}", sym.name));
        }
    }

    for import in &binary.imports {
        let imp = import.to_lowercase();

        if imp.contains("libc")
            || imp.contains("msvcrt")
            || imp.contains("ucrtbase")
            || imp == "printf"
            || imp == "malloc"
            || imp == "free"
        {
            c_score += 5.0;
            c_indicators.push(format!("Import: {}", import));
        }

        if imp.contains("kernel32") || imp.contains("user32") {
            c_score += 1.0;
        }
    }

    for s in strings {
        let lower = s.to_lowercase();

        if lower.contains("runtime.") || lower.contains("goroutine") || lower.contains("go build")
        {
            go_score += 3.0;
            go_indicators.push(format!("String: {}", s));
        }

        if lower.contains("panic:") || lower.contains("fatal error:") {
            go_score += 2.0;
        }
    }

    for section in &binary.sections {
        let name = section.name.to_lowercase();

        if name.contains("go.") || name.contains(".gopclntab") || name.contains(".go.buildinfo") {
            go_score += 15.0;
            go_indicators.push(format!("Section: {}", section.name));
        }

        if name == ".bss" || name == ".data" {
            c_score += 1.0;
        }
    }

    // Go binaries tend to be large because of the bundled runtime
    if binary.file_size > 2 * 1024 * 1024 {
        go_score += 2.0;
        go_indicators.push(format!(
            "Large binary size: {} MB",
            binary.file_size / (1024 * 1024)
        ));
    }

    let total = go_score + c_score;
    let (language, confidence) = if total == 0.0 {
        ("c".to_string(), 0.3)
    } else if go_score > c_score {
        ("go".to_string(), go_score / total)
    } else {
        ("c".to_string(), c_score / total)
    };

    (language, confidence.min(1.0), go_indicators, c_indicators)
}
