//! Output format selection and the plain-text formatter.

mod json;

pub use self::json::*;

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::analyzer::Analysis;
use crate::lifter::{Operation, OperationKind};
use crate::AnalysisError;

/// Supported output formats for analysis results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output (default)
    Text,
    /// JSON format (hierarchical)
    Json,
    /// JSON Lines format (one object per function)
    JsonLines,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "jsonlines" => Ok(OutputFormat::JsonLines),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Get a formatter for this output format
    pub fn formatter(&self) -> Box<dyn AnalysisFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::JsonLines => Box::new(JsonLinesFormatter),
        }
    }
}

/// Formatter trait for analysis output
pub trait AnalysisFormatter {
    fn format(&self, analysis: &Analysis) -> Result<String, AnalysisError>;
}

/// Render the analysis as readable text
pub struct TextFormatter;

/// Render the analysis as one JSON document
pub struct JsonFormatter;

/// Render one JSON object per function
pub struct JsonLinesFormatter;

impl AnalysisFormatter for TextFormatter {
    fn format(&self, analysis: &Analysis) -> Result<String, AnalysisError> {
        let mut out = String::new();

        out.push_str(&format!(
            "binary: {} ({} {})\n",
            analysis.binary.path, analysis.binary.format, analysis.binary.arch
        ));
        if let Some(entry) = analysis.binary.entry_point {
            out.push_str(&format!("entry point: 0x{:x}\n", entry));
        }
        out.push_str(&format!(
            "detected language: {} (confidence: {:.2}%)\n",
            analysis.detected_language,
            analysis.confidence * 100.0
        ));
        out.push_str(&format!("functions: {}\n\n", analysis.functions.len()));

        for func in &analysis.functions {
            let lifted = &func.lifted;
            out.push_str(&format!(
                "function {} (0x{:x} - 0x{:x})\n",
                lifted.function.name, lifted.function.start_addr, lifted.function.end_addr
            ));

            if !lifted.function.calls.is_empty() {
                let calls: Vec<String> = lifted
                    .function
                    .calls
                    .iter()
                    .map(|c| format!("0x{:x}", c))
                    .collect();
                out.push_str(&format!("  calls: {}\n", calls.join(", ")));
            }

            for block in &func.cfg.blocks {
                let mut line = format!(
                    "  block {} (0x{:x} - 0x{:x})",
                    block.id, block.start_addr, block.end_addr
                );
                if !block.successors.is_empty() {
                    line.push_str(&format!(" -> {:?}", block.successors));
                }
                if let Some(header) = block.loop_header {
                    line.push_str(&format!(" [loop {}]", header));
                }
                out.push_str(&line);
                out.push('\n');
            }

            for cond in &func.conditionals {
                out.push_str(&format!(
                    "  conditional: {} at block {}\n",
                    cond.kind.as_str(),
                    cond.condition
                ));
            }

            for var in &lifted.variables {
                out.push_str(&format!(
                    "  {} {} ; from {}\n",
                    var.ty, var.name, var.register
                ));
            }

            for op in &lifted.operations {
                out.push_str(&format!("  {}\n", render_operation(op)));
            }

            out.push('\n');
        }

        Ok(out)
    }
}

/// One text line per operation.
fn render_operation(op: &Operation) -> String {
    let mut line = format!("0x{:08x}: ", op.address);

    match op.kind {
        OperationKind::Assign => {
            if !op.dest.is_empty() || !op.src1.is_empty() {
                line.push_str(&format!("{} = {}", op.dest, op.src1));
            }
        }
        OperationKind::Call => line.push_str(&format!("{} = call {}", op.dest, op.src1)),
        OperationKind::Return => {
            if op.src1.is_empty() {
                line.push_str("return");
            } else {
                line.push_str(&format!("return {}", op.src1));
            }
        }
        OperationKind::If => line.push_str(&format!("if {} goto {}", op.operator, op.src1)),
        OperationKind::Loop => line.push_str(&format!("loop {}", op.src1)),
        OperationKind::Compare => line.push_str(&format!("compare {}, {}", op.src1, op.src2)),
        OperationKind::Arithmetic => line.push_str(&format!(
            "{} = {} {} {}",
            op.dest, op.src1, op.operator, op.src2
        )),
        OperationKind::MemoryAccess => {
            line.push_str(&format!("{} = mem[{}]", op.dest, op.src1))
        }
    }

    if !op.comment.is_empty() {
        line.push_str(&format!(" ; {}", op.comment));
    }

    line
}
