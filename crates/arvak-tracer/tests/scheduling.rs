//! End-to-end scheduling scenarios.

use arvak_tracer::{LayerId, OpId, QubitId, TraceError, Tracer, TracerConfig};

const H: OpId = OpId(1);
const CX: OpId = OpId(2);
const MZ: OpId = OpId(3);
const RESET: OpId = OpId(4);
const BARRIER: OpId = OpId(9);

fn table(tracer: &Tracer, separator: &str, zeros: bool) -> String {
    let mut out = Vec::new();
    tracer
        .print_layer_metrics(&mut out, separator, zeros)
        .unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_deterministic_report() {
    let mut tracer = Tracer::new(TracerConfig::new(10));
    let q0 = tracer.allocate_qubit();

    let layers: Vec<_> = (0..3)
        .map(|_| tracer.trace_single_qubit_op(H, 4, q0).unwrap())
        .collect();
    assert_eq!(layers, vec![Some(LayerId(0)), Some(LayerId(0)), Some(LayerId(1))]);

    assert_eq!(table(&tracer, ",", true), "layer_id,name,1\n0,,2\n10,,1\n");
    assert_eq!(table(&tracer, ",", true), table(&tracer, ",", true));
}

#[test]
fn test_layers_are_contiguous() {
    let mut tracer = Tracer::with_preferred_duration(3);
    let q0 = tracer.allocate_qubit();
    let q1 = tracer.allocate_qubit();

    tracer.trace_single_qubit_op(H, 2, q0).unwrap();
    tracer.trace_single_qubit_op(H, 7, q0).unwrap();
    tracer.inject_global_barrier(BARRIER, 1).unwrap();
    tracer.trace_multi_qubit_op(CX, 5, &[q0], &[q1]).unwrap();

    let layers = tracer.layers().layers();
    assert_eq!(layers[0].start_time, 0);
    for pair in layers.windows(2) {
        assert_eq!(pair[1].start_time, pair[0].start_time + pair[0].duration);
    }
    assert!(layers.iter().all(|l| l.duration >= 3));
}

#[test]
fn test_barrier_forces_later_layers() {
    let mut tracer = Tracer::with_preferred_duration(10);
    let q0 = tracer.allocate_qubit();
    let q1 = tracer.allocate_qubit();
    tracer.trace_single_qubit_op(H, 1, q0).unwrap();

    let barrier = tracer.inject_global_barrier(BARRIER, 2).unwrap();
    assert_eq!(
        tracer.layers().layer(barrier).unwrap().barrier,
        Some(BARRIER)
    );

    // Layer 0 still has room for q1, but the barrier closes it.
    let placed = tracer.trace_single_qubit_op(H, 1, q1).unwrap().unwrap();
    assert!(placed > barrier);
    let placed = tracer
        .trace_multi_qubit_op(CX, 1, &[q0], &[q1])
        .unwrap()
        .unwrap();
    assert!(placed > barrier);
}

#[test]
fn test_barrier_name_in_report() {
    let config = TracerConfig::new(10)
        .with_op_name(1u32, "h")
        .with_op_name(9u32, "fence");
    let mut tracer = Tracer::new(config);
    let q0 = tracer.allocate_qubit();
    tracer.trace_single_qubit_op(H, 5, q0).unwrap();
    tracer.inject_global_barrier(BARRIER, 1).unwrap();
    tracer.trace_single_qubit_op(H, 5, q0).unwrap();

    assert_eq!(
        table(&tracer, "\t", false),
        "layer_id\tname\th\n0\t\t1\n10\tfence\t\n20\t\t1\n"
    );
}

#[test]
fn test_nested_fence_scopes() {
    let mut tracer = Tracer::with_preferred_duration(1);
    let q0 = tracer.allocate_qubit();
    let results: Vec<_> = (0..6)
        .map(|_| tracer.trace_single_qubit_measurement(MZ, 1, q0).unwrap())
        .collect();

    {
        let mut outer = tracer.fence_scope(&[results[2]], &[]).unwrap();
        {
            let inner = outer.fence_scope(&[], &[results[5]]).unwrap();
            assert_eq!(inner.effective_fence(), Some(LayerId(5)));
        }
        assert_eq!(outer.effective_fence(), Some(LayerId(2)));
    }
    assert_eq!(tracer.effective_fence(), None);
}

#[test]
fn test_global_barrier_and_fence_take_the_later() {
    let mut tracer = Tracer::with_preferred_duration(1);
    let q0 = tracer.allocate_qubit();
    let m = tracer.trace_single_qubit_measurement(MZ, 1, q0).unwrap();
    let barrier = tracer.inject_global_barrier(BARRIER, 1).unwrap();

    let scope = tracer.fence_scope(&[m], &[]).unwrap();
    assert_eq!(scope.latest_conditional_fence(), m.layer());
    assert_eq!(scope.effective_fence(), Some(barrier));
}

#[test]
fn test_deferred_zero_duration_flush() {
    let mut tracer = Tracer::with_preferred_duration(10);
    let q0 = tracer.allocate_qubit();

    assert_eq!(tracer.trace_single_qubit_op(RESET, 0, q0).unwrap(), None);
    let layer = tracer.trace_single_qubit_op(H, 5, q0).unwrap().unwrap();

    let placed = tracer.layers().layer(layer).unwrap();
    assert_eq!(placed.count(RESET), 1);
    assert_eq!(placed.count(H), 1);
}

#[test]
fn test_unflushed_ops_are_reported_as_pending() {
    let mut tracer = Tracer::with_preferred_duration(10);
    let q0 = tracer.allocate_qubit();
    tracer.trace_single_qubit_op(RESET, 0, q0).unwrap();

    assert_eq!(tracer.pending_zero_duration_ops(), 1);
    // The op was seen, so it has a column, but no layer holds it.
    assert_eq!(table(&tracer, ",", true), "layer_id,name,4\n");
}

#[test]
fn test_multi_qubit_max_rule() {
    let mut tracer = Tracer::with_preferred_duration(10);
    let q0 = tracer.allocate_qubit();
    let q1 = tracer.allocate_qubit();

    for _ in 0..4 {
        tracer.trace_single_qubit_op(H, 10, q0).unwrap();
    }
    for _ in 0..5 {
        tracer.trace_single_qubit_op(H, 10, q1).unwrap();
    }
    tracer.trace_single_qubit_op(H, 5, q1).unwrap();
    assert_eq!(tracer.qubit_state(q0).unwrap().layer, Some(LayerId(3)));
    assert_eq!(tracer.qubit_state(q1).unwrap().layer, Some(LayerId(5)));

    let layer = tracer
        .trace_multi_qubit_op(CX, 5, &[q0], &[q1])
        .unwrap()
        .unwrap();
    assert_eq!(layer, LayerId(5));
    assert_eq!(tracer.qubit_state(q0).unwrap().layer, Some(LayerId(5)));
    assert_eq!(tracer.qubit_state(q0).unwrap().last_used_time, 55);
    assert_eq!(tracer.qubit_state(q1).unwrap().last_used_time, 60);
}

#[test]
fn test_released_qubits_keep_history() {
    let mut tracer = Tracer::with_preferred_duration(10);
    let q0 = tracer.allocate_qubit();
    tracer.trace_single_qubit_op(H, 4, q0).unwrap();
    tracer.release_qubit(q0);

    let q1 = tracer.allocate_qubit();
    assert_ne!(q0, q1);
    assert_eq!(tracer.qubit_state(q0).unwrap().layer, Some(LayerId(0)));
    assert_eq!(tracer.num_qubits(), 2);
}

#[test]
fn test_session_poisoned_after_violation() {
    let mut tracer = Tracer::with_preferred_duration(10);
    let q0 = tracer.allocate_qubit();

    let err = tracer
        .trace_single_qubit_op(H, 1, QubitId(7))
        .unwrap_err();
    assert_eq!(err, TraceError::QubitNotFound { qubit: QubitId(7) });

    assert_eq!(
        tracer.inject_global_barrier(BARRIER, 1).unwrap_err(),
        TraceError::SessionAborted
    );
    assert_eq!(
        tracer.trace_single_qubit_op(H, 1, q0).unwrap_err(),
        TraceError::SessionAborted
    );
    // Reporting still works after the failure.
    assert_eq!(table(&tracer, ",", true), "layer_id,name\n");
}

#[test]
fn test_json_report() {
    let mut tracer = Tracer::with_preferred_duration(10);
    let q0 = tracer.allocate_qubit();
    tracer.trace_single_qubit_op(H, 4, q0).unwrap();
    tracer.inject_global_barrier(BARRIER, 1).unwrap();

    let report = tracer.report();
    let json: serde_json::Value = serde_json::from_str(&report.to_json(true).unwrap()).unwrap();
    assert_eq!(json["preferred_layer_duration"], 10);
    assert_eq!(json["layers"][0]["operations"]["1"], 1);
    assert_eq!(json["layers"][1]["barrier"], 9);
    assert!(json["layers"][0].get("barrier").is_none());
}
