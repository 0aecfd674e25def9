//! JSON and JSON Lines output formatters.

use serde::Serialize;
use serde_json::json;

use crate::analyzer::{Analysis, FunctionAnalysis};
use crate::AnalysisError;

use super::AnalysisFormatter;

/// Serializable variable for JSON output
#[derive(Serialize)]
struct VariableJson {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    register: String,
    is_local: bool,
    is_param: bool,
}

/// Serializable operation for JSON output
#[derive(Serialize)]
struct OperationJson {
    address: String,
    kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    dest: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    src1: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    src2: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    operator: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    comment: String,
}

/// Serializable basic block summary for JSON output
#[derive(Serialize)]
struct BlockJson {
    id: usize,
    start: String,
    end: String,
    successors: Vec<usize>,
    predecessors: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    immediate_dominator: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    loop_header: Option<usize>,
}

/// Serializable function for JSON output
#[derive(Serialize)]
struct FunctionJson {
    name: String,
    start: String,
    end: String,
    has_return: bool,
    local_vars: usize,
    calls: Vec<String>,
    variables: Vec<VariableJson>,
    operations: Vec<OperationJson>,
    blocks: Vec<BlockJson>,
}

/// Serializable analysis result for JSON output
#[derive(Serialize)]
struct AnalysisJson {
    path: String,
    format: String,
    architecture: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry_point: Option<String>,
    language: String,
    confidence: f64,
    functions: Vec<FunctionJson>,
}

impl AnalysisFormatter for super::JsonFormatter {
    fn format(&self, analysis: &Analysis) -> Result<String, AnalysisError> {
        let result = AnalysisJson {
            path: analysis.binary.path.clone(),
            format: analysis.binary.format.to_string(),
            architecture: analysis.binary.arch.to_string(),
            entry_point: analysis.binary.entry_point.map(|e| format!("0x{:x}", e)),
            language: analysis.detected_language.clone(),
            confidence: analysis.confidence,
            functions: analysis.functions.iter().map(function_to_json).collect(),
        };

        serde_json::to_string_pretty(&result)
            .map_err(|e| AnalysisError::Format(format!("JSON serialization error: {}", e)))
    }
}

impl AnalysisFormatter for super::JsonLinesFormatter {
    fn format(&self, analysis: &Analysis) -> Result<String, AnalysisError> {
        let mut output = String::new();

        let header = json!({
            "type": "binary",
            "path": analysis.binary.path,
            "format": analysis.binary.format.to_string(),
            "architecture": analysis.binary.arch.to_string(),
            "language": analysis.detected_language,
            "confidence": analysis.confidence,
        });
        output.push_str(&serde_json::to_string(&header).map_err(json_err)?);
        output.push('\n');

        for func in &analysis.functions {
            let mut value = serde_json::to_value(function_to_json(func)).map_err(json_err)?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert("type".to_string(), json!("function"));
            }
            output.push_str(&serde_json::to_string(&value).map_err(json_err)?);
            output.push('\n');
        }

        Ok(output)
    }
}

fn json_err(e: serde_json::Error) -> AnalysisError {
    AnalysisError::Format(format!("JSON serialization error: {}", e))
}

fn function_to_json(func: &FunctionAnalysis) -> FunctionJson {
    let lifted = &func.lifted;

    FunctionJson {
        name: lifted.function.name.clone(),
        start: format!("0x{:x}", lifted.function.start_addr),
        end: format!("0x{:x}", lifted.function.end_addr),
        has_return: lifted.has_return,
        local_vars: lifted.local_vars,
        calls: lifted
            .function
            .calls
            .iter()
            .map(|c| format!("0x{:x}", c))
            .collect(),
        variables: lifted
            .variables
            .iter()
            .map(|v| VariableJson {
                name: v.name.clone(),
                ty: v.ty.clone(),
                register: v.register.clone(),
                is_local: v.is_local,
                is_param: v.is_param,
            })
            .collect(),
        operations: lifted
            .operations
            .iter()
            .map(|op| OperationJson {
                address: format!("0x{:x}", op.address),
                kind: format!("{:?}", op.kind),
                dest: op.dest.clone(),
                src1: op.src1.clone(),
                src2: op.src2.clone(),
                operator: op.operator.clone(),
                comment: op.comment.clone(),
            })
            .collect(),
        blocks: func
            .cfg
            .blocks
            .iter()
            .map(|b| BlockJson {
                id: b.id,
                start: format!("0x{:x}", b.start_addr),
                end: format!("0x{:x}", b.end_addr),
                successors: b.successors.clone(),
                predecessors: b.predecessors.clone(),
                immediate_dominator: b.idom,
                loop_header: b.loop_header,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::{JsonFormatter, JsonLinesFormatter};
    use super::*;
    use crate::analyzer::analyze;
    use crate::{Architecture, Binary, BinaryFormat, Section, Symbol};

    fn sample_analysis() -> Analysis {
        let section = Section::new(
            ".text".to_string(),
            0x1000,
            9,
            vec![0x55, 0x48, 0x89, 0xE5, 0x48, 0x83, 0xEC, 0x10, 0xC3],
            0x4,
            true,
        );
        let binary = Binary {
            format: BinaryFormat::Elf,
            arch: Architecture::X86_64,
            entry_point: Some(0x1000),
            sections: vec![section],
            symbols: vec![Symbol {
                name: "main".to_string(),
                address: 0x1000,
                size: 9,
                kind: "FUNC".to_string(),
            }],
            imports: Vec::new(),
            file_size: 9,
            path: "sample".to_string(),
        };
        analyze(binary).unwrap()
    }

    #[test]
    fn test_json_formatter_round_trips() {
        let analysis = sample_analysis();
        let out = JsonFormatter.format(&analysis).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["architecture"], "x86_64");
        assert_eq!(value["functions"][0]["name"], "main");
        assert_eq!(value["functions"][0]["has_return"], true);
        assert_eq!(value["functions"][0]["start"], "0x1000");
        assert!(value["functions"][0]["operations"].as_array().unwrap().len() >= 3);
    }

    #[test]
    fn test_jsonl_one_object_per_line() {
        let analysis = sample_analysis();
        let out = JsonLinesFormatter.format(&analysis).unwrap();
        let lines: Vec<&str> = out.lines().collect();

        // one binary header plus one line per function
        assert_eq!(lines.len(), 1 + analysis.functions.len());
        for line in &lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value["type"] == "binary" || value["type"] == "function");
        }
    }
}
