// =============================================================================
// QMK - End-to-end scenario tests (spec §8)
// =============================================================================
// Purpose: Exercises whole-graph scenarios that need the assembler, executor,
//          resource manager, pass manager, and REV analyzer wired together;
//          these don't fit cleanly inside any single module's #[cfg(test)]
//          block.
// =============================================================================

use kernel_services::capability::{Capability, CapabilitySet};
use kernel_services::task::CancelFlag;
use quantum_runtime::prelude::*;

fn caps_all() -> CapabilitySet {
    CapabilitySet::from_tokens([
        Capability::ALLOC,
        Capability::LINK,
        Capability::TELEPORT,
        Capability::MAGIC,
    ])
}

/// Scenario 1: Bell state, surface d=3, seed 42.
#[test]
fn bell_state_surface_d3() {
    let text = "\
a0: ALLOC_LQ q0 q1 profile=\"logical:surface(d=3)\"
h0: APPLY_H q0
cx0: APPLY_CNOT q0 q1
m0: MEASURE_Z q0 -> m0
m1: MEASURE_Z q1 -> m1
f0: FREE_LQ q0 q1
";
    let graph = assemble(text).unwrap();
    let profile = QecProfile::standard(CodeFamily::SurfaceCode, 3, None).unwrap();
    assert_eq!(profile.physical_qubit_count, 18);

    let mut rm = ResourceManager::new(1000, 42);
    let result = execute(&graph, &caps_all(), &mut rm, &CancelFlag::new());

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.events["m0"], result.events["m1"]);
    assert_eq!(result.telemetry.unwrap().resource_usage.physical_qubits_used, 0);
}

/// Scenario 2: adaptive correction — the post-correction measurement of `r`
/// must be deterministic for a fixed seed and independent of `s`'s value.
#[test]
fn adaptive_correction_is_deterministic_given_seed() {
    let text = "\
a0: ALLOC_LQ q0 q1 profile=\"logical:surface(d=3)\"
h0: APPLY_H q0
h1: APPLY_H q1
cx0: APPLY_CNOT q0 q1
m0: MEASURE_Z q1 -> s
px0: APPLY_X q0 if s==1
h2: APPLY_H q0
m1: MEASURE_Z q0 -> r
f0: FREE_LQ q0 q1
";
    let graph = assemble(text).unwrap();

    let mut rm_a = ResourceManager::new(1000, 42);
    let result_a = execute(&graph, &caps_all(), &mut rm_a, &CancelFlag::new());
    let mut rm_b = ResourceManager::new(1000, 42);
    let result_b = execute(&graph, &caps_all(), &mut rm_b, &CancelFlag::new());

    assert_eq!(result_a.status, ExecutionStatus::Completed);
    assert_eq!(result_a.events["r"], result_b.events["r"]);
}

/// Scenario 3: cancellation preserves the measurement distribution.
/// `H H H CNOT H H` on (q0,q1) optimizes down to `H CNOT` (the cancellation
/// pass removes both adjacent self-inverse pairs), and the optimized circuit
/// must reproduce the same per-seed outcomes as executing `H CNOT` directly.
#[test]
fn cancellation_preserves_measurement_distribution() {
    let triple_h_text = "\
a0: ALLOC_LQ q0 q1 profile=\"logical:surface(d=3)\"
h0: APPLY_H q0
h1: APPLY_H q0
h2: APPLY_H q0
cx0: APPLY_CNOT q0 q1
h3: APPLY_H q0
h4: APPLY_H q0
m0: MEASURE_Z q0 -> m0
m1: MEASURE_Z q1 -> m1
f0: FREE_LQ q0 q1
";
    let single_h_text = "\
a0: ALLOC_LQ q0 q1 profile=\"logical:surface(d=3)\"
h0: APPLY_H q0
cx0: APPLY_CNOT q0 q1
m0: MEASURE_Z q0 -> m0
m1: MEASURE_Z q1 -> m1
f0: FREE_LQ q0 q1
";
    let triple = assemble(triple_h_text).unwrap();
    let single = assemble(single_h_text).unwrap();

    let circuit = graph_to_circuit(&triple).unwrap();
    let outcome = PassManager::new(OptimizationLevel::Basic).run(circuit);
    assert!(outcome.failed_pass.is_none());
    // Both self-inverse H pairs collapse: 5 H's -> 1, matching the hand-written circuit.
    let gate_count = outcome
        .circuit
        .instructions
        .iter()
        .filter(|i| i.op == Opcode::ApplyH)
        .count();
    assert_eq!(gate_count, 1);
    let optimized_graph = circuit_to_graph(&outcome.circuit, "logical:surface(d=3)");

    for seed in 0..50u64 {
        let mut rm_a = ResourceManager::new(1000, seed);
        let a = execute(&optimized_graph, &caps_all(), &mut rm_a, &CancelFlag::new());
        let mut rm_b = ResourceManager::new(1000, seed);
        let b = execute(&single, &caps_all(), &mut rm_b, &CancelFlag::new());
        assert_eq!(a.status, ExecutionStatus::Completed, "seed {seed}");
        assert_eq!(a.events, b.events, "seed {seed}");
    }
}

/// Scenario 4: REV uncomputation — undoing `{H, X}` before measurement
/// reproduces the distribution of measuring straight off `Zero`.
#[test]
fn rev_uncomputation_restores_pre_segment_distribution() {
    let with_gates = "\
a0: ALLOC_LQ q0 profile=\"logical:surface(d=3)\"
h0: APPLY_H q0
x0: APPLY_X q0
m0: MEASURE_Z q0 -> m
f0: FREE_LQ q0
";
    let graph = assemble(with_gates).unwrap();
    let segments = find_segments(&graph.program.nodes).unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].node_ids, vec!["h0".to_string(), "x0".to_string()]);

    let mut rm = ResourceManager::new(1000, 7);
    rm.alloc(&["q0".to_string()], QecProfile::standard(CodeFamily::SurfaceCode, 3, None).unwrap())
        .unwrap();
    rm.with_qubit_mut("q0", |q| {
        q.apply_single_gate(SingleQubitGate::H, 0.0);
    })
    .unwrap();
    rm.with_qubit_mut("q0", |q| {
        let now = q.current_time_us;
        q.apply_single_gate(SingleQubitGate::X, now);
    })
    .unwrap();
    reverse_segment(&graph.program.nodes, &segments[0], &mut rm).unwrap();
    assert_eq!(rm.snapshot_live_qubits()["q0"].state, StateVariant::Zero);
}

/// Scenario 5: quota exhaustion. Budget 100; surface(d=5) costs 50 physical
/// qubits per logical qubit. First allocation succeeds, a second that would
/// overrun the remaining budget fails, and telemetry reflects only the first.
#[test]
fn quota_exhaustion_rejects_the_overrunning_allocation() {
    let mut rm = ResourceManager::new(100, 1);
    let profile = QecProfile::standard(CodeFamily::SurfaceCode, 5, None).unwrap();
    assert_eq!(profile.physical_qubit_count, 50);

    rm.alloc(&["q0".to_string()], profile.clone()).unwrap();
    let err = rm.alloc(&["q1".to_string(), "q2".to_string()], profile).unwrap_err();
    assert!(matches!(err, QmkError::QuotaExceeded { .. }));
    assert_eq!(rm.telemetry().resource_usage.physical_qubits_used, 50);
}

/// Scenario 6: macro expansion. `.set n=3` + `.for i in 0..n-1` produces
/// three nodes `h0,h1,h2` on `q0,q1,q2`.
#[test]
fn macro_expansion_unrolls_for_loop() {
    let text = "\
.set n = 3
.for i in 0..n-1
h{i}: APPLY_H q{i}
.endfor
";
    let resolver = MapIncludeResolver::default();
    let expanded = Preprocessor::new(&resolver).process(text, Default::default()).unwrap();
    let graph = assemble(&expanded).unwrap();
    let ids: Vec<&str> = graph.program.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["h0", "h1", "h2"]);
    for (i, node) in graph.program.nodes.iter().enumerate() {
        assert_eq!(node.vqs, vec![format!("q{i}")]);
    }
}

// =============================================================================
// Property tests (spec §8 quantified invariants)
// =============================================================================
// Purpose: generate random well-formed graphs over a small gate alphabet and
//          check the two properties spec §8 states "for every" such graph:
//          executor determinism given a fixed seed, and the assembler
//          round-trip through the disassembler.

use proptest::prelude::*;

const SINGLE_QUBIT_GATES: &[&str] = &["H", "X", "Y", "Z", "S", "T"];

fn random_gate_program(qubit_count: usize, gates: &[(usize, &str)]) -> String {
    let mut text = String::new();
    let qubits: Vec<String> = (0..qubit_count).map(|i| format!("q{i}")).collect();
    text.push_str(&format!(
        "a0: ALLOC_LQ {} profile=\"logical:surface(d=2)\"\n",
        qubits.join(" ")
    ));
    for (i, (q, op)) in gates.iter().enumerate() {
        text.push_str(&format!("g{i}: APPLY_{op} q{q}\n"));
    }
    for i in 0..qubit_count {
        text.push_str(&format!("m{i}: MEASURE_Z q{i} -> m{i}\n"));
    }
    text.push_str(&format!("f0: FREE_LQ {}\n", qubits.join(" ")));
    text
}

fn gate_strategy(qubit_count: usize) -> impl Strategy<Value = (usize, &'static str)> {
    (0..qubit_count, prop::sample::select(SINGLE_QUBIT_GATES))
}

proptest! {
    /// Given the same seed, re-executing an identical well-formed graph
    /// produces bit-exact events and telemetry, for any gate sequence drawn
    /// from the single-qubit Clifford+T alphabet over 1..=3 qubits.
    #[test]
    fn execution_is_deterministic_for_any_seed_and_gate_sequence(
        qubit_count in 1usize..=3,
        seed in any::<u64>(),
        gates in prop::collection::vec(gate_strategy(3), 0..8),
    ) {
        let gates: Vec<(usize, &str)> = gates
            .into_iter()
            .filter(|(q, _)| *q < qubit_count)
            .collect();
        let text = random_gate_program(qubit_count, &gates);
        let graph = assemble(&text).unwrap();

        let mut rm_a = ResourceManager::new(10_000, seed);
        let result_a = execute(&graph, &caps_all(), &mut rm_a, &CancelFlag::new());
        let mut rm_b = ResourceManager::new(10_000, seed);
        let result_b = execute(&graph, &caps_all(), &mut rm_b, &CancelFlag::new());

        prop_assert_eq!(result_a.status, result_b.status);
        prop_assert_eq!(&result_a.events, &result_b.events);
        let telemetry_a = serde_json::to_string(&result_a.telemetry).unwrap();
        let telemetry_b = serde_json::to_string(&result_b.telemetry).unwrap();
        prop_assert_eq!(telemetry_a, telemetry_b);
    }

    /// `assemble(disassemble(assemble(text)))` preserves every field the
    /// assembler recognizes, for any gate sequence over 1..=3 qubits.
    #[test]
    fn assemble_disassemble_round_trips_node_fields(
        qubit_count in 1usize..=3,
        gates in prop::collection::vec(gate_strategy(3), 0..8),
    ) {
        let gates: Vec<(usize, &str)> = gates
            .into_iter()
            .filter(|(q, _)| *q < qubit_count)
            .collect();
        let text = random_gate_program(qubit_count, &gates);
        let graph = assemble(&text).unwrap();
        let reparsed = assemble(&disassemble(&graph)).unwrap();

        prop_assert_eq!(graph.program.nodes.len(), reparsed.program.nodes.len());
        for (a, b) in graph.program.nodes.iter().zip(reparsed.program.nodes.iter()) {
            prop_assert_eq!(&a.id, &b.id);
            prop_assert_eq!(a.op, b.op);
            prop_assert_eq!(&a.vqs, &b.vqs);
            prop_assert_eq!(&a.chs, &b.chs);
            prop_assert_eq!(&a.produces, &b.produces);
        }
        prop_assert_eq!(graph.resources.vqs, reparsed.resources.vqs);
    }
}
