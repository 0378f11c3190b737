// =============================================================================
// QMK - QEC Profile and Formula Evaluator (C1)
// =============================================================================
// Table of Contents:
//   1. CodeFamily - Standard code family tags and shorthand factories
//   2. QecProfile - Immutable resource/error parameters for a code at distance d
//   3. Time unit parsing
//   4. Formula evaluation (profile strings and formula-string construction)
// =============================================================================
// Purpose: Pure data plus the arithmetic needed to derive it: physical/logical
//          resource formulas, error rates, and cycle times for a quantum
//          error-correcting code at a given distance.
// =============================================================================

use crate::error::QmkError;
use crate::expr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// 1. CodeFamily
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeFamily {
    SurfaceCode,
    Shyps,
    BaconShor,
    Qldpc,
}

impl CodeFamily {
    pub fn parse(tag: &str) -> Result<Self, QmkError> {
        match tag.to_ascii_lowercase().as_str() {
            "surface_code" | "surface" => Ok(CodeFamily::SurfaceCode),
            "shyps" => Ok(CodeFamily::Shyps),
            "bacon_shor" => Ok(CodeFamily::BaconShor),
            "qldpc" => Ok(CodeFamily::Qldpc),
            other => Err(QmkError::ProfileUnknownFamily(other.to_string())),
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            CodeFamily::SurfaceCode => "surface_code",
            CodeFamily::Shyps => "SHYPS",
            CodeFamily::BaconShor => "bacon_shor",
            CodeFamily::Qldpc => "QLDPC",
        }
    }

    /// Per-family logical-error threshold `p_th` (§3 derived field, supplemented
    /// from `original_source/kernel/simulator/qec_profiles.py`, which hardcodes
    /// 0.01 for the surface code specifically).
    pub fn threshold(self) -> f64 {
        match self {
            CodeFamily::SurfaceCode => 0.01,
            CodeFamily::Shyps => 0.015,
            CodeFamily::BaconShor => 0.005,
            CodeFamily::Qldpc => 0.02,
        }
    }

    /// `(physical_qubit_count, logical_cycle_time_us)` for distance `d`, with an
    /// optional QLDPC rate (defaults to 0.5 when unspecified, see §4.1).
    pub fn shorthand(self, d: u32, rate: Option<f64>) -> (u32, f64) {
        let d = d as f64;
        match self {
            CodeFamily::SurfaceCode => ((2.0 * d * d) as u32, 0.1 * d),
            CodeFamily::Shyps => ((1.5 * d * d).floor() as u32, 0.12 * d),
            CodeFamily::BaconShor => ((d * d) as u32, 0.08 * d),
            CodeFamily::Qldpc => {
                let rate = rate.unwrap_or(0.5);
                ((d * d / rate).floor() as u32, 0.15 * d)
            }
        }
    }
}

// =============================================================================
// 2. QecProfile
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QecProfile {
    pub family: CodeFamily,
    pub distance: u32,
    pub physical_qubit_count: u32,
    pub logical_cycle_time_us: f64,
    pub physical_gate_error_rate: f64,
    pub readout_error_rate: f64,
    pub idle_error_rate: f64,
    pub t1_us: f64,
    pub t2_us: f64,
    pub decoder_family: String,
}

impl QecProfile {
    pub fn new(
        family: CodeFamily,
        distance: u32,
        physical_qubit_count: u32,
        logical_cycle_time_us: f64,
        physical_gate_error_rate: f64,
        readout_error_rate: f64,
        idle_error_rate: f64,
        t1_us: f64,
        t2_us: f64,
        decoder_family: impl Into<String>,
    ) -> Result<Self, QmkError> {
        if t2_us > 2.0 * t1_us {
            return Err(QmkError::FormulaError {
                location: "QecProfile::new".into(),
                message: format!("invariant violated: T2 ({t2_us}) > 2*T1 ({t1_us})"),
            });
        }
        Ok(Self {
            family,
            distance,
            physical_qubit_count,
            logical_cycle_time_us,
            physical_gate_error_rate,
            readout_error_rate,
            idle_error_rate,
            t1_us,
            t2_us,
            decoder_family: decoder_family.into(),
        })
    }

    /// Shorthand construction from a standard family at distance `d`, using the
    /// §4.1 physical/cycle-time formulas and representative default error rates.
    pub fn standard(family: CodeFamily, distance: u32, rate: Option<f64>) -> Result<Self, QmkError> {
        let (physical, cycle_us) = family.shorthand(distance, rate);
        Self::new(
            family,
            distance,
            physical,
            cycle_us,
            1e-3,
            1e-2,
            1e-4,
            100_000.0,
            80_000.0,
            "minimum_weight_perfect_matching",
        )
    }

    /// `logical:<family>(d=<int>[, rate=<float>])`, case-insensitive family tag.
    pub fn parse_profile_string(s: &str) -> Result<Self, QmkError> {
        let s = s.trim();
        let body = s.strip_prefix("logical:").ok_or_else(|| QmkError::ParseError {
            location: "qec_profile_string".into(),
            message: format!("expected 'logical:' prefix, found '{s}'"),
        })?;
        let open = body.find('(').ok_or_else(|| QmkError::ParseError {
            location: "qec_profile_string".into(),
            message: format!("expected '(' in profile string '{s}'"),
        })?;
        let close = body.rfind(')').ok_or_else(|| QmkError::ParseError {
            location: "qec_profile_string".into(),
            message: format!("expected ')' in profile string '{s}'"),
        })?;
        let family_tag = &body[..open];
        let args = &body[open + 1..close];

        let family = CodeFamily::parse(family_tag)?;
        let mut distance: Option<u32> = None;
        let mut rate: Option<f64> = None;
        for part in args.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').ok_or_else(|| QmkError::ParseError {
                location: "qec_profile_string".into(),
                message: format!("expected key=value, found '{part}'"),
            })?;
            match key.trim() {
                "d" => {
                    distance = Some(value.trim().parse().map_err(|_| QmkError::ParseError {
                        location: "qec_profile_string".into(),
                        message: format!("invalid distance '{value}'"),
                    })?)
                }
                "rate" => {
                    rate = Some(value.trim().parse().map_err(|_| QmkError::ParseError {
                        location: "qec_profile_string".into(),
                        message: format!("invalid rate '{value}'"),
                    })?)
                }
                other => {
                    return Err(QmkError::ParseError {
                        location: "qec_profile_string".into(),
                        message: format!("unknown profile parameter '{other}'"),
                    })
                }
            }
        }
        let distance = distance.ok_or_else(|| QmkError::ParseError {
            location: "qec_profile_string".into(),
            message: "missing required parameter 'd'".into(),
        })?;
        Self::standard(family, distance, rate)
    }

    /// §3 derived logical error rate, `(p/p_th)^((d+1)/2)` clamped to `[0, 1]`.
    pub fn logical_error_rate(&self) -> f64 {
        let p_th = self.family.threshold();
        let exponent = (self.distance as f64 + 1.0) / 2.0;
        let rate = (self.physical_gate_error_rate / p_th).powf(exponent);
        rate.clamp(0.0, 1.0)
    }

    /// Dephasing time derived from T1/T2 (§4.2); infinite when `T2 == 2*T1`.
    pub fn t_phi_us(&self) -> f64 {
        let denom = 1.0 / self.t2_us - 1.0 / (2.0 * self.t1_us);
        if denom <= 0.0 {
            f64::INFINITY
        } else {
            1.0 / denom
        }
    }
}

// =============================================================================
// 3. Time unit parsing
// =============================================================================

/// Converts a `N unit` literal to microseconds, per §4.1(a).
pub fn parse_time_literal(text: &str) -> Result<f64, QmkError> {
    let text = text.trim();
    let split_at = text
        .find(|c: char| c.is_alphabetic())
        .ok_or_else(|| QmkError::FormulaError {
            location: "parse_time_literal".into(),
            message: format!("missing unit suffix in '{text}'"),
        })?;
    let (num_part, unit_part) = text.split_at(split_at);
    let value: f64 = num_part.trim().parse().map_err(|_| QmkError::FormulaError {
        location: "parse_time_literal".into(),
        message: format!("invalid numeric literal '{num_part}'"),
    })?;
    let factor = match unit_part.trim() {
        "ns" => 1e-3,
        "us" | "\u{b5}s" => 1.0,
        "ms" => 1e3,
        "s" => 1e6,
        other => {
            return Err(QmkError::FormulaError {
                location: "parse_time_literal".into(),
                message: format!("unknown time unit '{other}'"),
            })
        }
    };
    Ok(value * factor)
}

// =============================================================================
// 4. Formula evaluation
// =============================================================================

/// Substitutes any `N unit` time literals in `formula` with their microsecond
/// equivalents, then evaluates the resulting closed arithmetic expression
/// against `context` (§4.1 b, c).
pub fn eval_formula(formula: &str, context: &HashMap<String, f64>) -> Result<f64, QmkError> {
    let rewritten = rewrite_time_literals(formula)?;
    let ctx: HashMap<String, expr::Value> = context
        .iter()
        .map(|(k, v)| (k.clone(), expr::Value::Number(*v)))
        .collect();
    expr::eval_arithmetic(&rewritten, &ctx).map_err(|e| QmkError::FormulaError {
        location: formula.to_string(),
        message: e.to_string(),
    })
}

fn rewrite_time_literals(formula: &str) -> Result<String, QmkError> {
    let mut out = String::new();
    let chars: Vec<char> = formula.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let num_end = i;
            let unit_start = i;
            while i < chars.len() && chars[i].is_alphabetic() {
                i += 1;
            }
            if i > unit_start {
                let literal: String = chars[start..i].iter().collect();
                let micros = parse_time_literal(&literal)?;
                out.push_str(&micros.to_string());
            } else {
                out.push_str(&chars[start..num_end].iter().collect::<String>());
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_code_shorthand() {
        let (physical, cycle) = CodeFamily::SurfaceCode.shorthand(3, None);
        assert_eq!(physical, 18);
        assert!((cycle - 0.3).abs() < 1e-9);
    }

    #[test]
    fn qldpc_shorthand_uses_rate() {
        let (physical, _) = CodeFamily::Qldpc.shorthand(10, Some(0.25));
        assert_eq!(physical, 400);
    }

    #[test]
    fn t2_greater_than_2t1_is_rejected() {
        let result = QecProfile::new(
            CodeFamily::SurfaceCode,
            3,
            18,
            0.3,
            1e-3,
            1e-2,
            1e-4,
            100.0,
            300.0,
            "mwpm",
        );
        assert!(result.is_err());
    }

    #[test]
    fn parse_profile_string_surface() {
        let profile = QecProfile::parse_profile_string("logical:surface(d=5)").unwrap();
        assert_eq!(profile.distance, 5);
        assert_eq!(profile.physical_qubit_count, 50);
    }

    #[test]
    fn parse_profile_string_qldpc_with_rate() {
        let profile = QecProfile::parse_profile_string("logical:QLDPC(d=4, rate=0.5)").unwrap();
        assert_eq!(profile.physical_qubit_count, 32);
    }

    #[test]
    fn parse_profile_string_unknown_family() {
        assert!(QecProfile::parse_profile_string("logical:toric(d=3)").is_err());
    }

    #[test]
    fn time_literal_conversion() {
        assert!((parse_time_literal("500 ns").unwrap() - 0.5).abs() < 1e-9);
        assert!((parse_time_literal("2 ms").unwrap() - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn formula_with_variable_and_time_literal() {
        let mut ctx = HashMap::new();
        ctx.insert("codeDistance".to_string(), 3.0);
        let result = eval_formula("codeDistance * 100ns", &ctx).unwrap();
        assert!((result - 0.3).abs() < 1e-9);
    }

    #[test]
    fn formula_with_undefined_variable_fails() {
        let ctx = HashMap::new();
        assert!(eval_formula("codeDistance * 2", &ctx).is_err());
    }

    #[test]
    fn logical_error_rate_clamped() {
        let profile = QecProfile::standard(CodeFamily::SurfaceCode, 3, None).unwrap();
        let rate = profile.logical_error_rate();
        assert!((0.0..=1.0).contains(&rate));
    }
}
