// =============================================================================
// QMK - Assembler / Disassembler (C6)
// =============================================================================
// Table of Contents:
//   1. Guard text grammar
//   2. Line tokenizer and node parser
//   3. assemble() / disassemble()
// =============================================================================
// Purpose: Parses expanded assembler text line by line:
//          `LABEL: OPCODE args… [-> outputs] [if GUARD] [{caps}]`. `args` may
//          be keyword form `key=value` or positional tokens classified by
//          prefix (`ch*` -> channel, `ev*` -> event, otherwise qubit), per
//          `original_source/qvm/tools/qvm_asm.py`/`qvm_disasm.py` (§4.6,
//          SPEC_FULL §4.6). The disassembler is the exact inverse on all
//          fields it recognizes: `assemble(disassemble(g)) == g` (§8).
// =============================================================================

use crate::error::QmkError;
use crate::graph_ir::{Graph, GraphNode, Guard, GuardCompoundType, Opcode, Program, Resources};
use serde_json::Value;
use std::collections::HashSet;

// =============================================================================
// 1. Guard text grammar
// =============================================================================

fn parse_guard(text: &str) -> Result<Guard, QmkError> {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix("and(").and_then(|s| s.strip_suffix(')')) {
        let conditions = split_top_level(inner)
            .into_iter()
            .map(|s| parse_guard(&s))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Guard::Compound {
            r#type: GuardCompoundType::And,
            conditions,
        });
    }
    if let Some(inner) = text.strip_prefix("or(").and_then(|s| s.strip_suffix(')')) {
        let conditions = split_top_level(inner)
            .into_iter()
            .map(|s| parse_guard(&s))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Guard::Compound {
            r#type: GuardCompoundType::Or,
            conditions,
        });
    }
    let (event, value) = text.split_once("==").ok_or_else(|| QmkError::GuardMalformed(text.to_string()))?;
    let equals: u8 = value.trim().parse().map_err(|_| QmkError::GuardMalformed(text.to_string()))?;
    Ok(Guard::Equality {
        event: event.trim().to_string(),
        equals,
    })
}

fn format_guard(guard: &Guard) -> String {
    match guard {
        Guard::Equality { event, equals } => format!("{event}=={equals}"),
        Guard::Compound { r#type, conditions } => {
            let tag = match r#type {
                GuardCompoundType::And => "and",
                GuardCompoundType::Or => "or",
            };
            let inner = conditions.iter().map(format_guard).collect::<Vec<_>>().join(", ");
            format!("{tag}({inner})")
        }
    }
}

fn split_top_level(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    let last = current.trim().to_string();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

// =============================================================================
// 2. Line tokenizer and node parser
// =============================================================================

fn classify_arg(graph_node: &mut GraphNode, token: &str) -> Result<(), QmkError> {
    if let Some((key, value)) = token.split_once('=') {
        let parsed = parse_scalar(value);
        graph_node.args.insert(key.to_string(), parsed);
    } else if token.starts_with("ch") {
        graph_node.chs.push(token.to_string());
    } else if token.starts_with("ev") {
        graph_node.inputs.push(token.to_string());
    } else {
        graph_node.vqs.push(token.to_string());
    }
    Ok(())
}

fn parse_scalar(text: &str) -> Value {
    if let Some(stripped) = text.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Value::String(stripped.to_string());
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = text.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}

fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn parse_line(line: &str, fallback_id: usize) -> Result<Option<GraphNode>, QmkError> {
    let without_comment = match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let trimmed = without_comment.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let mut tokens = trimmed.split_whitespace().peekable();
    let first = tokens.next().ok_or_else(|| QmkError::ParseError {
        location: line.to_string(),
        message: "empty line".into(),
    })?;

    let (id, opcode_tok) = if let Some(label) = first.strip_suffix(':') {
        let opcode_tok = tokens.next().ok_or_else(|| QmkError::ParseError {
            location: line.to_string(),
            message: "expected opcode after label".into(),
        })?;
        (label.to_string(), opcode_tok)
    } else {
        (format!("node_{fallback_id}"), first)
    };

    let opcode = Opcode::parse(opcode_tok).ok_or_else(|| QmkError::UnknownOpcode(opcode_tok.to_string()))?;
    let mut node = GraphNode::new(id, opcode);

    while let Some(&tok) = tokens.peek() {
        if tok == "->" {
            tokens.next();
            while let Some(&out_tok) = tokens.peek() {
                if out_tok == "if" || out_tok.starts_with('{') {
                    break;
                }
                tokens.next();
                for piece in out_tok.trim_end_matches(',').split(',') {
                    if !piece.is_empty() {
                        node.produces.push(piece.to_string());
                    }
                }
            }
        } else if tok == "if" {
            tokens.next();
            let mut guard_text = String::new();
            while let Some(&guard_tok) = tokens.peek() {
                if guard_tok.starts_with('{') {
                    break;
                }
                tokens.next();
                if !guard_text.is_empty() {
                    guard_text.push(' ');
                }
                guard_text.push_str(guard_tok);
            }
            node.guard = Some(parse_guard(&guard_text)?);
        } else if tok.starts_with('{') {
            let mut caps_text = String::new();
            for cap_tok in tokens.by_ref() {
                if !caps_text.is_empty() {
                    caps_text.push(' ');
                }
                caps_text.push_str(cap_tok);
                if cap_tok.ends_with('}') {
                    break;
                }
            }
            let inner = caps_text.trim_start_matches('{').trim_end_matches('}');
            node.caps = inner
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        } else {
            tokens.next();
            classify_arg(&mut node, tok)?;
        }
    }

    Ok(Some(node))
}

// =============================================================================
// 3. assemble() / disassemble()
// =============================================================================

pub fn assemble(text: &str) -> Result<Graph, QmkError> {
    let mut nodes = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut fallback = 0usize;
    for line in text.lines() {
        if let Some(node) = parse_line(line, fallback)? {
            if !seen_ids.insert(node.id.clone()) {
                return Err(QmkError::DuplicateNodeId(node.id.clone()));
            }
            fallback += 1;
            nodes.push(node);
        }
    }
    Ok(Graph {
        version: "0.1".to_string(),
        caps: Vec::new(),
        metadata: None,
        program: Program { nodes, edges: None },
        resources: Resources::default(),
    })
}

pub fn disassemble(graph: &Graph) -> String {
    let mut out = String::new();
    for node in &graph.program.nodes {
        out.push_str(&node.id);
        out.push_str(": ");
        out.push_str(node.op.as_str());
        for vq in &node.vqs {
            out.push(' ');
            out.push_str(vq);
        }
        for ch in &node.chs {
            out.push(' ');
            out.push_str(ch);
        }
        for ev in &node.inputs {
            out.push(' ');
            out.push_str(ev);
        }
        let mut keys: Vec<&String> = node.args.keys().collect();
        keys.sort();
        for key in keys {
            out.push(' ');
            out.push_str(key);
            out.push('=');
            out.push_str(&format_scalar(&node.args[key]));
        }
        if !node.produces.is_empty() {
            out.push_str(" -> ");
            out.push_str(&node.produces.join(","));
        }
        if let Some(guard) = &node.guard {
            out.push_str(" if ");
            out.push_str(&format_guard(guard));
        }
        if !node.caps.is_empty() {
            out.push_str(" {");
            out.push_str(&node.caps.join(","));
            out.push('}');
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_bell_state_program() {
        let text = "\
alloc0: ALLOC_LQ q0 q1 profile=\"logical:surface(d=3)\"
h0: APPLY_H q0
cx0: APPLY_CNOT q0 q1
m0: MEASURE_Z q0 -> m0
m1: MEASURE_Z q1 -> m1
free0: FREE_LQ q0 q1
";
        let graph = assemble(text).unwrap();
        assert_eq!(graph.program.nodes.len(), 6);
        assert_eq!(graph.program.nodes[0].op, Opcode::AllocLq);
        assert_eq!(graph.program.nodes[0].vqs, vec!["q0", "q1"]);
        assert_eq!(graph.program.nodes[3].produces, vec!["m0"]);
    }

    #[test]
    fn round_trip_through_disassemble() {
        let text = "h0: APPLY_H q0\ncx0: APPLY_CNOT q0 q1\nm0: MEASURE_Z q0 -> m0\n";
        let graph = assemble(text).unwrap();
        let roundtrip = disassemble(&graph);
        let reparsed = assemble(&roundtrip).unwrap();
        assert_eq!(graph.program.nodes.len(), reparsed.program.nodes.len());
        for (a, b) in graph.program.nodes.iter().zip(reparsed.program.nodes.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.op, b.op);
            assert_eq!(a.vqs, b.vqs);
            assert_eq!(a.produces, b.produces);
        }
    }

    #[test]
    fn guard_parses_equality_and_compound() {
        let text = "px: COND_PAULI q0 ev0 if ev0==1\n";
        let graph = assemble(text).unwrap();
        assert!(matches!(graph.program.nodes[0].guard, Some(Guard::Equality { .. })));

        let text2 = "px: COND_PAULI q0 if and(ev0==1, ev1==0)\n";
        let graph2 = assemble(text2).unwrap();
        assert!(matches!(
            graph2.program.nodes[0].guard,
            Some(Guard::Compound { r#type: GuardCompoundType::And, .. })
        ));
    }

    #[test]
    fn duplicate_node_id_fails() {
        let text = "a: APPLY_H q0\na: APPLY_X q0\n";
        let err = assemble(text).unwrap_err();
        assert!(matches!(err, QmkError::DuplicateNodeId(_)));
    }

    #[test]
    fn unknown_opcode_fails() {
        let text = "a: FROBNICATE q0\n";
        let err = assemble(text).unwrap_err();
        assert!(matches!(err, QmkError::UnknownOpcode(_)));
    }

    #[test]
    fn caps_section_parsed() {
        let text = "a: ALLOC_LQ q0 {CAP_ALLOC,CAP_LINK}\n";
        let graph = assemble(text).unwrap();
        assert_eq!(graph.program.nodes[0].caps, vec!["CAP_ALLOC", "CAP_LINK"]);
    }
}
