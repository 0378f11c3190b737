// =============================================================================
// QMK - Macro Preprocessor (C6)
// =============================================================================
// Table of Contents:
//   1. IncludeResolver
//   2. Node - Parsed directive tree
//   3. Parser - Line-based recursive-descent block parser
//   4. Evaluator - Produces expanded assembler text
// =============================================================================
// Purpose: Accepts text and produces text, executed before the assembler
//          parses it (§4.6). Supports `.include`, `.param`, `.set`, `.for`,
//          `.if`/`.elif`/`.else`/`.endif`, `.macro`/`.endmacro`, and `{expr}`
//          interpolation, evaluated over the closed grammar in `expr` plus
//          1-D string indexing. Deliberately has no general code evaluation.
// =============================================================================

use crate::error::QmkError;
use crate::expr::{self, Value};
use std::collections::HashMap;

// =============================================================================
// 1. IncludeResolver
// =============================================================================

pub trait IncludeResolver {
    fn resolve(&self, name: &str) -> Option<String>;
}

/// In-memory resolver, primarily for tests and embedded programs.
#[derive(Debug, Clone, Default)]
pub struct MapIncludeResolver(pub HashMap<String, String>);

impl IncludeResolver for MapIncludeResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

/// Resolves `.include` targets against a filesystem search path.
#[derive(Debug, Clone, Default)]
pub struct FsIncludeResolver {
    pub search_path: Vec<std::path::PathBuf>,
}

impl IncludeResolver for FsIncludeResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        for dir in &self.search_path {
            let candidate = dir.join(name);
            if let Ok(content) = std::fs::read_to_string(&candidate) {
                return Some(content);
            }
        }
        None
    }
}

// =============================================================================
// 2. Node
// =============================================================================

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Include(String),
    Param(String, String),
    Set(String, String),
    For {
        var: String,
        iterable: String,
        body: Vec<Node>,
    },
    If {
        branches: Vec<(Option<String>, Vec<Node>)>,
    },
    MacroDef {
        name: String,
        params: Vec<String>,
        body_lines: Vec<String>,
    },
    MacroCall {
        name: String,
        args: Vec<String>,
    },
}

// =============================================================================
// 3. Parser
// =============================================================================

struct LineParser<'a> {
    lines: &'a [&'a str],
    pos: usize,
}

const STOP_FOR: &[&str] = &[".endfor"];
const STOP_IF: &[&str] = &[".elif", ".else", ".endif"];

impl<'a> LineParser<'a> {
    fn peek_trimmed(&self) -> Option<&str> {
        self.lines.get(self.pos).map(|l| l.trim())
    }

    fn parse_block(&mut self, stop: &[&str]) -> Result<Vec<Node>, QmkError> {
        let mut nodes = Vec::new();
        while let Some(trimmed) = self.peek_trimmed() {
            if stop.iter().any(|s| trimmed == *s || trimmed.starts_with(&format!("{s} "))) {
                break;
            }
            if let Some(directive) = trimmed.strip_prefix('.') {
                let directive = directive.to_string();
                self.parse_directive(&directive, &mut nodes)?;
            } else if let Some(comment_free) = strip_comment(trimmed) {
                if let Some((name, args)) = parse_macro_call_syntax(&comment_free) {
                    nodes.push(Node::MacroCall { name, args });
                } else {
                    nodes.push(Node::Text(comment_free));
                }
                self.pos += 1;
            } else {
                self.pos += 1;
            }
        }
        Ok(nodes)
    }

    fn parse_directive(&mut self, directive: &str, nodes: &mut Vec<Node>) -> Result<(), QmkError> {
        let line = self.lines[self.pos].trim().to_string();
        let rest = directive.trim();
        if let Some(arg) = rest.strip_prefix("include") {
            let file = parse_quoted(arg.trim()).ok_or_else(|| QmkError::ParseError {
                location: line.clone(),
                message: "expected a quoted filename after .include".into(),
            })?;
            nodes.push(Node::Include(file));
            self.pos += 1;
        } else if let Some(arg) = rest.strip_prefix("param") {
            let (name, expr_text) = split_assignment(arg.trim()).ok_or_else(|| QmkError::ParseError {
                location: line.clone(),
                message: "expected 'name = expr' after .param".into(),
            })?;
            nodes.push(Node::Param(name, expr_text));
            self.pos += 1;
        } else if let Some(arg) = rest.strip_prefix("set") {
            let (name, expr_text) = split_assignment(arg.trim()).ok_or_else(|| QmkError::ParseError {
                location: line.clone(),
                message: "expected 'name = expr' after .set".into(),
            })?;
            nodes.push(Node::Set(name, expr_text));
            self.pos += 1;
        } else if let Some(arg) = rest.strip_prefix("for") {
            let (var, iterable) = parse_for_header(arg.trim()).ok_or_else(|| QmkError::ParseError {
                location: line.clone(),
                message: "expected 'name in iterable' after .for".into(),
            })?;
            self.pos += 1;
            let body = self.parse_block(STOP_FOR)?;
            self.expect_directive(".endfor")?;
            nodes.push(Node::For { var, iterable, body });
        } else if let Some(arg) = rest.strip_prefix("if") {
            let mut branches = Vec::new();
            let mut cond = Some(arg.trim().to_string());
            self.pos += 1;
            loop {
                let body = self.parse_block(STOP_IF)?;
                branches.push((cond.take(), body));
                let next = self.peek_trimmed().unwrap_or("").to_string();
                if let Some(arg) = next.strip_prefix(".elif") {
                    cond = Some(arg.trim().to_string());
                    self.pos += 1;
                } else if next == ".else" {
                    self.pos += 1;
                    let body = self.parse_block(&[".endif"])?;
                    branches.push((None, body));
                    self.expect_directive(".endif")?;
                    break;
                } else if next == ".endif" {
                    self.pos += 1;
                    break;
                } else {
                    return Err(QmkError::ParseError {
                        location: line.clone(),
                        message: "unterminated .if block".into(),
                    });
                }
            }
            nodes.push(Node::If { branches });
        } else if let Some(arg) = rest.strip_prefix("macro") {
            let (name, params) = parse_macro_header(arg.trim()).ok_or_else(|| QmkError::ParseError {
                location: line.clone(),
                message: "expected 'NAME(args)' after .macro".into(),
            })?;
            self.pos += 1;
            let mut body_lines = Vec::new();
            loop {
                let Some(trimmed) = self.peek_trimmed() else {
                    return Err(QmkError::ParseError {
                        location: line.clone(),
                        message: "unterminated .macro block".into(),
                    });
                };
                if trimmed == ".endmacro" {
                    self.pos += 1;
                    break;
                }
                body_lines.push(self.lines[self.pos].to_string());
                self.pos += 1;
            }
            nodes.push(Node::MacroDef { name, params, body_lines });
        } else {
            return Err(QmkError::ParseError {
                location: line,
                message: format!("unknown directive '.{rest}'"),
            });
        }
        Ok(())
    }

    fn expect_directive(&mut self, directive: &str) -> Result<(), QmkError> {
        match self.peek_trimmed() {
            Some(trimmed) if trimmed == directive => {
                self.pos += 1;
                Ok(())
            }
            other => Err(QmkError::ParseError {
                location: other.unwrap_or("<eof>").to_string(),
                message: format!("expected '{directive}'"),
            }),
        }
    }
}

fn strip_comment(line: &str) -> Option<String> {
    let without = match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let trimmed = without.trim_end();
    if trimmed.is_empty() && line.trim().starts_with(';') {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_quoted(s: &str) -> Option<String> {
    let s = s.trim();
    let s = s.strip_prefix('"').or_else(|| s.strip_prefix('\''))?;
    let s = s.strip_suffix('"').or_else(|| s.strip_suffix('\''))?;
    Some(s.to_string())
}

fn split_assignment(s: &str) -> Option<(String, String)> {
    let (name, expr) = s.split_once('=')?;
    Some((name.trim().to_string(), expr.trim().to_string()))
}

fn parse_for_header(s: &str) -> Option<(String, String)> {
    let (var, rest) = s.split_once(" in ")?;
    Some((var.trim().to_string(), rest.trim().to_string()))
}

fn parse_macro_header(s: &str) -> Option<(String, Vec<String>)> {
    let open = s.find('(')?;
    let close = s.rfind(')')?;
    let name = s[..open].trim().to_string();
    let params = s[open + 1..close]
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    Some((name, params))
}

fn parse_macro_call_syntax(line: &str) -> Option<(String, Vec<String>)> {
    let line = line.trim();
    if !line.ends_with(')') {
        return None;
    }
    let open = line.find('(')?;
    let name = &line[..open];
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    if !name.chars().next()?.is_alphabetic() {
        return None;
    }
    let args_text = &line[open + 1..line.len() - 1];
    let args = split_top_level_commas(args_text)
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    Some((name.to_string(), args))
}

fn split_top_level_commas(s: &str) -> Vec<String> {
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
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

// =============================================================================
// 4. Evaluator
// =============================================================================

struct MacroDef {
    params: Vec<String>,
    body_lines: Vec<String>,
}

pub struct Preprocessor<'a> {
    resolver: &'a dyn IncludeResolver,
}

impl<'a> Preprocessor<'a> {
    pub fn new(resolver: &'a dyn IncludeResolver) -> Self {
        Self { resolver }
    }

    pub fn process(
        &self,
        source: &str,
        initial_params: HashMap<String, Value>,
    ) -> Result<String, QmkError> {
        let mut scopes = vec![initial_params];
        let mut macros = HashMap::new();
        let mut include_stack = Vec::new();
        let mut out = String::new();
        self.process_source(source, &mut scopes, &mut macros, &mut include_stack, &mut out)?;
        Ok(out)
    }

    fn process_source(
        &self,
        source: &str,
        scopes: &mut Vec<HashMap<String, Value>>,
        macros: &mut HashMap<String, MacroDef>,
        include_stack: &mut Vec<String>,
        out: &mut String,
    ) -> Result<(), QmkError> {
        let lines: Vec<&str> = source.lines().collect();
        let mut parser = LineParser { lines: &lines, pos: 0 };
        let nodes = parser.parse_block(&[])?;
        collect_macros(&nodes, macros);
        self.eval_nodes(&nodes, scopes, macros, include_stack, out)
    }

    fn eval_nodes(
        &self,
        nodes: &[Node],
        scopes: &mut Vec<HashMap<String, Value>>,
        macros: &mut HashMap<String, MacroDef>,
        include_stack: &mut Vec<String>,
        out: &mut String,
    ) -> Result<(), QmkError> {
        for node in nodes {
            self.eval_node(node, scopes, macros, include_stack, out)?;
        }
        Ok(())
    }

    fn eval_node(
        &self,
        node: &Node,
        scopes: &mut Vec<HashMap<String, Value>>,
        macros: &mut HashMap<String, MacroDef>,
        include_stack: &mut Vec<String>,
        out: &mut String,
    ) -> Result<(), QmkError> {
        match node {
            Node::Text(line) => {
                let interpolated = interpolate(line, &flatten(scopes))?;
                out.push_str(&interpolated);
                out.push('\n');
            }
            Node::Include(name) => {
                if include_stack.contains(name) {
                    return Err(QmkError::IncludeCycle(name.clone()));
                }
                let content = self
                    .resolver
                    .resolve(name)
                    .ok_or_else(|| QmkError::IncludeMissing(name.clone()))?;
                include_stack.push(name.clone());
                self.process_source(&content, scopes, macros, include_stack, out)?;
                include_stack.pop();
            }
            Node::Param(name, expr_text) => {
                if !scopes[0].contains_key(name) {
                    let ctx = flatten(scopes);
                    let value = expr::eval(&expr::parse(expr_text).map_err(to_parse_err(expr_text))?, &ctx)
                        .map_err(to_parse_err(expr_text))?;
                    scopes[0].insert(name.clone(), value);
                }
            }
            Node::Set(name, expr_text) => {
                let ctx = flatten(scopes);
                let value = expr::eval(&expr::parse(expr_text).map_err(to_parse_err(expr_text))?, &ctx)
                    .map_err(to_parse_err(expr_text))?;
                scopes.last_mut().unwrap().insert(name.clone(), value);
            }
            Node::For { var, iterable, body } => {
                for item in self.eval_iterable(iterable, &flatten(scopes))? {
                    scopes.push(HashMap::from([(var.clone(), item)]));
                    self.eval_nodes(body, scopes, macros, include_stack, out)?;
                    scopes.pop();
                }
            }
            Node::If { branches } => {
                for (cond, body) in branches {
                    let matches = match cond {
                        None => true,
                        Some(expr_text) => {
                            let ctx = flatten(scopes);
                            expr::eval_bool(expr_text, &ctx).map_err(to_parse_err(expr_text))?
                        }
                    };
                    if matches {
                        self.eval_nodes(body, scopes, macros, include_stack, out)?;
                        break;
                    }
                }
            }
            Node::MacroDef { .. } => {}
            Node::MacroCall { name, args } => {
                let ctx = flatten(scopes);
                let (params, body_lines) = {
                    let def = macros.get(name).ok_or_else(|| QmkError::ParseError {
                        location: name.clone(),
                        message: format!("call to undefined macro '{name}'"),
                    })?;
                    (def.params.clone(), def.body_lines.clone())
                };
                if params.len() != args.len() {
                    return Err(QmkError::ParseError {
                        location: name.clone(),
                        message: format!(
                            "macro '{name}' expects {} args, got {}",
                            params.len(),
                            args.len()
                        ),
                    });
                }
                let mut bound = HashMap::new();
                for (param, arg_text) in params.iter().zip(args.iter()) {
                    let value = expr::eval(&expr::parse(arg_text).map_err(to_parse_err(arg_text))?, &ctx)
                        .map_err(to_parse_err(arg_text))?;
                    bound.insert(param.clone(), value);
                }
                scopes.push(bound);
                let joined = body_lines.join("\n");
                self.process_source(&joined, scopes, macros, include_stack, out)?;
                scopes.pop();
            }
        }
        Ok(())
    }

    fn eval_iterable(
        &self,
        iterable: &str,
        ctx: &HashMap<String, Value>,
    ) -> Result<Vec<Value>, QmkError> {
        if let Some((start, end)) = iterable.split_once("..") {
            let start = expr::eval_arithmetic(start.trim(), ctx).map_err(to_parse_err(start))?;
            let end = expr::eval_arithmetic(end.trim(), ctx).map_err(to_parse_err(end))?;
            let (start, end) = (start.round() as i64, end.round() as i64);
            Ok((start..=end).map(|i| Value::Number(i as f64)).collect())
        } else {
            iterable
                .split(',')
                .map(|item| {
                    let item = item.trim();
                    expr::eval(&expr::parse(item).map_err(to_parse_err(item))?, ctx)
                        .map_err(to_parse_err(item))
                })
                .collect()
        }
    }
}

fn collect_macros(nodes: &[Node], macros: &mut HashMap<String, MacroDef>) {
    for node in nodes {
        match node {
            Node::MacroDef { name, params, body_lines } => {
                macros.insert(
                    name.clone(),
                    MacroDef {
                        params: params.clone(),
                        body_lines: body_lines.clone(),
                    },
                );
            }
            Node::For { body, .. } => collect_macros(body, macros),
            Node::If { branches } => {
                for (_, body) in branches {
                    collect_macros(body, macros);
                }
            }
            _ => {}
        }
    }
}

fn flatten(scopes: &[HashMap<String, Value>]) -> HashMap<String, Value> {
    let mut merged = HashMap::new();
    for scope in scopes {
        for (k, v) in scope {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

fn to_parse_err(location: &str) -> impl Fn(expr::ExprError) -> QmkError + '_ {
    move |e| QmkError::FormulaError {
        location: location.to_string(),
        message: e.to_string(),
    }
}

fn interpolate(line: &str, ctx: &HashMap<String, Value>) -> Result<String, QmkError> {
    let mut out = String::new();
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            let start = i + 1;
            let mut depth = 1;
            let mut j = start;
            while j < chars.len() && depth > 0 {
                match chars[j] {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
                if depth > 0 {
                    j += 1;
                }
            }
            if depth != 0 {
                return Err(QmkError::ParseError {
                    location: line.to_string(),
                    message: "unterminated '{' interpolation".into(),
                });
            }
            let expr_text: String = chars[start..j].iter().collect();
            let value = expr::eval(&expr::parse(&expr_text).map_err(to_parse_err(&expr_text))?, ctx)
                .map_err(to_parse_err(&expr_text))?;
            out.push_str(&format_value(&value));
            i = j + 1;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
        Value::Number(n) => format!("{n}"),
        Value::Bool(b) => b.to_string(),
        Value::Str(s) => s.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(source: &str) -> String {
        let resolver = MapIncludeResolver::default();
        let pre = Preprocessor::new(&resolver);
        pre.process(source, HashMap::new()).unwrap()
    }

    #[test]
    fn for_loop_expands_ids_and_qubits() {
        let source = ".set n=3\n.for i in 0..n-1\nh{i}: APPLY_H q{i}\n.endfor\n";
        let result = expand(source);
        assert!(result.contains("h0: APPLY_H q0"));
        assert!(result.contains("h1: APPLY_H q1"));
        assert!(result.contains("h2: APPLY_H q2"));
    }

    #[test]
    fn if_elif_else_picks_correct_branch() {
        let source = ".set n=2\n.if n == 1\none\n.elif n == 2\ntwo\n.else\nother\n.endif\n";
        let result = expand(source);
        assert!(result.contains("two"));
        assert!(!result.contains("other"));
    }

    #[test]
    fn param_is_overridable_by_caller() {
        let resolver = MapIncludeResolver::default();
        let pre = Preprocessor::new(&resolver);
        let mut params = HashMap::new();
        params.insert("n".to_string(), Value::Number(5.0));
        let result = pre.process(".param n = 1\nval={n}\n", params).unwrap();
        assert!(result.contains("val=5"));
    }

    #[test]
    fn macro_expands_with_positional_args() {
        let source = ".macro bell(a, b)\nh_{a}: APPLY_H q{a}\ncx_{a}_{b}: APPLY_CNOT q{a} q{b}\n.endmacro\nbell(0, 1)\n";
        let result = expand(source);
        assert!(result.contains("h_0: APPLY_H q0"));
        assert!(result.contains("cx_0_1: APPLY_CNOT q0 q1"));
    }

    #[test]
    fn include_cycle_is_detected() {
        let mut map = HashMap::new();
        map.insert("a.qasm".to_string(), ".include \"b.qasm\"\n".to_string());
        map.insert("b.qasm".to_string(), ".include \"a.qasm\"\n".to_string());
        let resolver = MapIncludeResolver(map);
        let pre = Preprocessor::new(&resolver);
        let err = pre
            .process(".include \"a.qasm\"\n", HashMap::new())
            .unwrap_err();
        assert!(matches!(err, QmkError::IncludeCycle(_)));
    }

    #[test]
    fn missing_include_fails() {
        let resolver = MapIncludeResolver::default();
        let pre = Preprocessor::new(&resolver);
        let err = pre
            .process(".include \"missing.qasm\"\n", HashMap::new())
            .unwrap_err();
        assert!(matches!(err, QmkError::IncludeMissing(_)));
    }

    #[test]
    fn nested_for_loops() {
        let source = ".for i in 0..1\n.for j in 0..1\npair_{i}_{j}\n.endfor\n.endfor\n";
        let result = expand(source);
        for pair in ["pair_0_0", "pair_0_1", "pair_1_0", "pair_1_1"] {
            assert!(result.contains(pair), "missing {pair} in {result}");
        }
    }
}
