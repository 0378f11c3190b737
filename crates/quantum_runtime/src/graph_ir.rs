// =============================================================================
// QMK - Graph IR Data Model (C6)
// =============================================================================
// Table of Contents:
//   1. Opcode
//   2. Guard
//   3. GraphNode
//   4. Resources / Graph
// =============================================================================
// Purpose: The wire and in-memory representation of a dataflow quantum
//          program: a directed acyclic node list plus resource and capability
//          declarations (§3, §6). Node argument bags are a dynamic map keyed
//          by opcode-specific field name (§9): unknown fields are preserved
//          verbatim for round-tripping the JSON form and rejected only at
//          execution time.
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// =============================================================================
// 1. Opcode
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    AllocLq,
    FreeLq,
    ApplyH,
    ApplyX,
    ApplyY,
    ApplyZ,
    ApplyS,
    ApplyT,
    ApplyCnot,
    ApplyCz,
    ApplySwap,
    ApplyRx,
    ApplyRy,
    ApplyRz,
    MeasureZ,
    MeasureX,
    MeasureY,
    MeasureBell,
    Reset,
    CondPauli,
    OpenChan,
    CloseChan,
    TeleportCnot,
    InjectTState,
    FenceEpoch,
    BarRegion,
    SetPolicy,
}

impl Opcode {
    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::AllocLq => "ALLOC_LQ",
            Opcode::FreeLq => "FREE_LQ",
            Opcode::ApplyH => "APPLY_H",
            Opcode::ApplyX => "APPLY_X",
            Opcode::ApplyY => "APPLY_Y",
            Opcode::ApplyZ => "APPLY_Z",
            Opcode::ApplyS => "APPLY_S",
            Opcode::ApplyT => "APPLY_T",
            Opcode::ApplyCnot => "APPLY_CNOT",
            Opcode::ApplyCz => "APPLY_CZ",
            Opcode::ApplySwap => "APPLY_SWAP",
            Opcode::ApplyRx => "APPLY_RX",
            Opcode::ApplyRy => "APPLY_RY",
            Opcode::ApplyRz => "APPLY_RZ",
            Opcode::MeasureZ => "MEASURE_Z",
            Opcode::MeasureX => "MEASURE_X",
            Opcode::MeasureY => "MEASURE_Y",
            Opcode::MeasureBell => "MEASURE_BELL",
            Opcode::Reset => "RESET",
            Opcode::CondPauli => "COND_PAULI",
            Opcode::OpenChan => "OPEN_CHAN",
            Opcode::CloseChan => "CLOSE_CHAN",
            Opcode::TeleportCnot => "TELEPORT_CNOT",
            Opcode::InjectTState => "INJECT_T_STATE",
            Opcode::FenceEpoch => "FENCE_EPOCH",
            Opcode::BarRegion => "BAR_REGION",
            Opcode::SetPolicy => "SET_POLICY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "ALLOC_LQ" => Opcode::AllocLq,
            "FREE_LQ" => Opcode::FreeLq,
            "APPLY_H" => Opcode::ApplyH,
            "APPLY_X" => Opcode::ApplyX,
            "APPLY_Y" => Opcode::ApplyY,
            "APPLY_Z" => Opcode::ApplyZ,
            "APPLY_S" => Opcode::ApplyS,
            "APPLY_T" => Opcode::ApplyT,
            "APPLY_CNOT" => Opcode::ApplyCnot,
            "APPLY_CZ" => Opcode::ApplyCz,
            "APPLY_SWAP" => Opcode::ApplySwap,
            "APPLY_RX" => Opcode::ApplyRx,
            "APPLY_RY" => Opcode::ApplyRy,
            "APPLY_RZ" => Opcode::ApplyRz,
            "MEASURE_Z" => Opcode::MeasureZ,
            "MEASURE_X" => Opcode::MeasureX,
            "MEASURE_Y" => Opcode::MeasureY,
            "MEASURE_BELL" => Opcode::MeasureBell,
            "RESET" => Opcode::Reset,
            "COND_PAULI" => Opcode::CondPauli,
            "OPEN_CHAN" => Opcode::OpenChan,
            "CLOSE_CHAN" => Opcode::CloseChan,
            "TELEPORT_CNOT" => Opcode::TeleportCnot,
            "INJECT_T_STATE" => Opcode::InjectTState,
            "FENCE_EPOCH" => Opcode::FenceEpoch,
            "BAR_REGION" => Opcode::BarRegion,
            "SET_POLICY" => Opcode::SetPolicy,
            _ => return None,
        })
    }

    /// Opcode to required-capability mapping (§4.7 step 1). Opcodes not
    /// listed require no capability.
    pub fn required_capabilities(self) -> &'static [&'static str] {
        use kernel_services::capability::Capability;
        match self {
            Opcode::AllocLq => &[Capability::ALLOC],
            Opcode::OpenChan => &[Capability::LINK],
            Opcode::TeleportCnot => &[Capability::TELEPORT],
            Opcode::InjectTState => &[Capability::MAGIC],
            _ => &[],
        }
    }

    pub fn is_unitary(self) -> bool {
        matches!(
            self,
            Opcode::ApplyH
                | Opcode::ApplyX
                | Opcode::ApplyY
                | Opcode::ApplyZ
                | Opcode::ApplyS
                | Opcode::ApplyRx
                | Opcode::ApplyRy
                | Opcode::ApplyRz
                | Opcode::ApplyCnot
                | Opcode::TeleportCnot
        )
    }

    pub fn is_irreversible(self) -> bool {
        matches!(
            self,
            Opcode::MeasureZ
                | Opcode::MeasureX
                | Opcode::Reset
                | Opcode::CloseChan
                | Opcode::AllocLq
                | Opcode::FreeLq
        )
    }
}

// =============================================================================
// 2. Guard
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Guard {
    Equality { event: String, equals: u8 },
    Compound { r#type: GuardCompoundType, conditions: Vec<Guard> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardCompoundType {
    And,
    Or,
}

// =============================================================================
// 3. GraphNode
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub op: Opcode,
    #[serde(default)]
    pub vqs: Vec<String>,
    #[serde(default)]
    pub chs: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub produces: Vec<String>,
    #[serde(default)]
    pub args: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caps: Vec<String>,
    #[serde(default)]
    pub deps: Vec<String>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, op: Opcode) -> Self {
        Self {
            id: id.into(),
            op,
            vqs: Vec::new(),
            chs: Vec::new(),
            inputs: Vec::new(),
            produces: Vec::new(),
            args: HashMap::new(),
            guard: None,
            caps: Vec::new(),
            deps: Vec::new(),
        }
    }

    pub fn arg_f64(&self, key: &str) -> Option<f64> {
        self.args.get(key).and_then(|v| v.as_f64())
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }

    pub fn arg_u64(&self, key: &str) -> Option<u64> {
        self.args.get(key).and_then(|v| v.as_u64())
    }
}

// =============================================================================
// 4. Resources / Graph
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub vqs: Vec<String>,
    #[serde(default)]
    pub chs: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub nodes: Vec<GraphNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<Edge>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
    pub program: Program,
    pub resources: Resources,
}

impl Graph {
    pub fn new(nodes: Vec<GraphNode>) -> Self {
        Self {
            version: "0.1".to_string(),
            caps: Vec::new(),
            metadata: None,
            program: Program { nodes, edges: None },
            resources: Resources::default(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trips_through_string() {
        for op in [
            Opcode::AllocLq,
            Opcode::ApplyCnot,
            Opcode::MeasureBell,
            Opcode::FenceEpoch,
        ] {
            assert_eq!(Opcode::parse(op.as_str()), Some(op));
        }
    }

    #[test]
    fn alloc_requires_cap_alloc() {
        assert_eq!(Opcode::AllocLq.required_capabilities(), &["CAP_ALLOC"]);
        assert!(Opcode::ApplyH.required_capabilities().is_empty());
    }

    #[test]
    fn graph_json_round_trip() {
        let mut node = GraphNode::new("n0", Opcode::AllocLq);
        node.vqs.push("q0".to_string());
        let graph = Graph::new(vec![node]);
        let json = graph.to_json().unwrap();
        let parsed = Graph::from_json(&json).unwrap();
        assert_eq!(parsed.program.nodes.len(), 1);
        assert_eq!(parsed.program.nodes[0].op, Opcode::AllocLq);
    }
}
