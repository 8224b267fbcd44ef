//! Trace programs: serialized instruction streams replayed into a [`Tracer`].
//!
//! A program refers to qubits by allocation order and to measurement results
//! by measurement order, so it is independent of the handles a session hands
//! out. Programs are stored as JSON or YAML:
//!
//! ```yaml
//! config:
//!   preferred_layer_duration: 10
//!   op_names: { 1: h, 2: cx, 3: mz }
//! instructions:
//!   - { kind: allocate, count: 2 }
//!   - { kind: single, op: 1, duration: 4, qubit: 0 }
//!   - { kind: measure, op: 3, duration: 10, targets: [0] }
//!   - kind: conditional
//!     results_a: [0]
//!     body:
//!       - { kind: multi, op: 2, duration: 6, controls: [0], targets: [1] }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::allocations::AllocationsTracker;
use crate::config::{TracerConfig, is_json};
use crate::error::{ProgramError, ProgramResult};
use crate::ids::{Duration, OpId, QubitId, ResultHandle};
use crate::tracer::Tracer;

/// A single step of a trace program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    /// Allocate `count` qubits.
    Allocate {
        #[serde(default = "default_count")]
        count: u32,
    },
    /// Release a qubit.
    Release { qubit: u32 },
    /// Single-qubit operation.
    Single {
        op: OpId,
        #[serde(default)]
        duration: Duration,
        qubit: u32,
    },
    /// Multi-qubit operation with optional controls.
    Multi {
        op: OpId,
        #[serde(default)]
        duration: Duration,
        #[serde(default)]
        controls: Vec<u32>,
        targets: Vec<u32>,
    },
    /// Measurement of one or more qubits, producing one result.
    Measure {
        op: OpId,
        #[serde(default)]
        duration: Duration,
        targets: Vec<u32>,
    },
    /// Global barrier.
    Barrier {
        op: OpId,
        #[serde(default)]
        duration: Duration,
    },
    /// Body executed under a condition on measurement results.
    Conditional {
        #[serde(default)]
        results_a: Vec<u32>,
        #[serde(default)]
        results_b: Vec<u32>,
        #[serde(default)]
        body: Vec<Instruction>,
    },
}

fn default_count() -> u32 {
    1
}

/// A trace program with an optional embedded configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceProgram {
    /// Session configuration shipped with the program.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<TracerConfig>,
    /// Top-level instructions.
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

impl TraceProgram {
    /// Parse a program from JSON text.
    pub fn from_json_str(source: &str) -> ProgramResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Parse a program from YAML text.
    pub fn from_yaml_str(source: &str) -> ProgramResult<Self> {
        Ok(serde_yaml_ng::from_str(source)?)
    }

    /// Load a program file. `.json` files are parsed as JSON, anything else as
    /// YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ProgramResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProgramError::Io(format!("Failed to read {}: {}", path.display(), e)))?;

        if is_json(path) {
            Self::from_json_str(&contents)
        } else {
            Self::from_yaml_str(&contents)
        }
    }

    /// Total number of instructions, conditional bodies included.
    pub fn len(&self) -> usize {
        fn count(instructions: &[Instruction]) -> usize {
            instructions
                .iter()
                .map(|inst| match inst {
                    Instruction::Conditional { body, .. } => 1 + count(body),
                    _ => 1,
                })
                .sum()
        }
        count(&self.instructions)
    }

    /// Whether the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Replay the program into `tracer`.
    pub fn run(&self, tracer: &mut Tracer, check_leaks: bool) -> ProgramResult<ReplayStats> {
        let mut replayer = Replayer::new();
        if check_leaks {
            replayer = replayer.with_leak_check();
        }
        replayer.replay(tracer, &self.instructions)?;
        replayer.finish()
    }
}

/// Counters collected while replaying a program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    /// Instructions executed, conditional bodies included.
    pub instructions: usize,
    /// Qubits allocated.
    pub qubits: usize,
    /// Gate operations traced (measurements excluded).
    pub operations: usize,
    /// Measurements traced.
    pub measurements: usize,
    /// Global barriers injected.
    pub barriers: usize,
    /// Conditional regions entered.
    pub conditionals: usize,
    /// Operations the tracer deferred instead of placing.
    pub deferred: usize,
}

/// Feeds instructions into a tracer, resolving program-local indices.
#[derive(Debug, Default)]
pub struct Replayer {
    qubits: Vec<QubitId>,
    results: Vec<ResultHandle>,
    allocations: Option<AllocationsTracker<QubitId>>,
    stats: ReplayStats,
}

impl Replayer {
    /// Create a replayer without leak checking.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track qubit allocations and releases, and check for leaks in
    /// [`finish`](Self::finish).
    #[must_use]
    pub fn with_leak_check(mut self) -> Self {
        self.allocations = Some(AllocationsTracker::new());
        self
    }

    /// Counters collected so far.
    pub fn stats(&self) -> ReplayStats {
        self.stats
    }

    /// Results produced so far, in measurement order.
    pub fn results(&self) -> &[ResultHandle] {
        &self.results
    }

    /// Replay a sequence of instructions.
    #[instrument(skip_all, fields(instructions = instructions.len()))]
    pub fn replay(&mut self, tracer: &mut Tracer, instructions: &[Instruction]) -> ProgramResult<()> {
        self.execute_all(tracer, instructions)?;
        info!(
            "Replayed {} instruction(s) into {} layer(s)",
            self.stats.instructions,
            tracer.layers().len()
        );
        Ok(())
    }

    /// Finish the replay, checking for leaked qubits if enabled.
    pub fn finish(self) -> ProgramResult<ReplayStats> {
        if let Some(allocations) = &self.allocations {
            allocations.check_for_leaks()?;
        }
        Ok(self.stats)
    }

    fn execute_all(&mut self, tracer: &mut Tracer, instructions: &[Instruction]) -> ProgramResult<()> {
        for instruction in instructions {
            self.execute(tracer, instruction)?;
        }
        Ok(())
    }

    fn execute(&mut self, tracer: &mut Tracer, instruction: &Instruction) -> ProgramResult<()> {
        self.stats.instructions += 1;
        match instruction {
            Instruction::Allocate { count } => {
                for _ in 0..*count {
                    let qubit = tracer.allocate_qubit();
                    if let Some(allocations) = &mut self.allocations {
                        allocations.on_allocate(qubit)?;
                    }
                    self.qubits.push(qubit);
                }
                self.stats.qubits += *count as usize;
            }
            Instruction::Release { qubit } => {
                let qubit = self.qubit(*qubit)?;
                if let Some(allocations) = &mut self.allocations {
                    allocations.on_release(&qubit)?;
                }
                tracer.release_qubit(qubit);
            }
            Instruction::Single { op, duration, qubit } => {
                let qubit = self.qubit(*qubit)?;
                let placed = tracer.trace_single_qubit_op(*op, *duration, qubit)?;
                self.record_operation(placed.is_some());
            }
            Instruction::Multi {
                op,
                duration,
                controls,
                targets,
            } => {
                let controls = self.qubits_of(controls)?;
                let targets = self.qubits_of(targets)?;
                let placed = tracer.trace_multi_qubit_op(*op, *duration, &controls, &targets)?;
                self.record_operation(placed.is_some());
            }
            Instruction::Measure {
                op,
                duration,
                targets,
            } => {
                let targets = self.qubits_of(targets)?;
                let result = match targets.as_slice() {
                    [target] => tracer.trace_single_qubit_measurement(*op, *duration, *target)?,
                    _ => tracer.trace_multi_qubit_measurement(*op, *duration, &targets)?,
                };
                if result.layer().is_none() {
                    self.stats.deferred += 1;
                }
                self.stats.measurements += 1;
                self.results.push(result);
            }
            Instruction::Barrier { op, duration } => {
                tracer.inject_global_barrier(*op, *duration)?;
                self.stats.barriers += 1;
            }
            Instruction::Conditional {
                results_a,
                results_b,
                body,
            } => {
                let results_a = self.results_of(results_a)?;
                let results_b = self.results_of(results_b)?;
                let mut scope = tracer.fence_scope(&results_a, &results_b)?;
                debug!(
                    "Conditional body of {} instruction(s), fence {:?}",
                    body.len(),
                    scope.fence()
                );
                self.stats.conditionals += 1;
                self.execute_all(&mut scope, body)?;
            }
        }
        Ok(())
    }

    fn record_operation(&mut self, placed: bool) {
        self.stats.operations += 1;
        if !placed {
            self.stats.deferred += 1;
        }
    }

    fn qubit(&self, index: u32) -> ProgramResult<QubitId> {
        self.qubits
            .get(index as usize)
            .copied()
            .ok_or(ProgramError::UnknownQubit {
                index,
                allocated: self.qubits.len(),
            })
    }

    fn qubits_of(&self, indices: &[u32]) -> ProgramResult<Vec<QubitId>> {
        indices.iter().map(|&i| self.qubit(i)).collect()
    }

    fn results_of(&self, indices: &[u32]) -> ProgramResult<Vec<ResultHandle>> {
        indices
            .iter()
            .map(|&index| {
                self.results
                    .get(index as usize)
                    .copied()
                    .ok_or(ProgramError::UnknownResult {
                        index,
                        measured: self.results.len(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AllocationError, TraceError};
    use crate::ids::LayerId;

    fn single(op: u32, duration: Duration, qubit: u32) -> Instruction {
        Instruction::Single {
            op: OpId(op),
            duration,
            qubit,
        }
    }

    #[test]
    fn test_parse_yaml_defaults() {
        let program = TraceProgram::from_yaml_str(
            r"
instructions:
  - kind: allocate
  - { kind: single, op: 1, qubit: 0 }
  - { kind: conditional }
",
        )
        .unwrap();
        assert_eq!(program.config, None);
        assert_eq!(
            program.instructions,
            vec![
                Instruction::Allocate { count: 1 },
                single(1, 0, 0),
                Instruction::Conditional {
                    results_a: vec![],
                    results_b: vec![],
                    body: vec![],
                },
            ]
        );
    }

    #[test]
    fn test_parse_json_with_config() {
        let program = TraceProgram::from_json_str(
            r#"{
                "config": { "preferred_layer_duration": 10, "op_names": { "1": "h" } },
                "instructions": [
                    { "kind": "allocate", "count": 2 },
                    { "kind": "multi", "op": 2, "duration": 3, "controls": [0], "targets": [1] }
                ]
            }"#,
        )
        .unwrap();
        let config = program.config.unwrap();
        assert_eq!(config.preferred_layer_duration, 10);
        assert_eq!(config.op_name(OpId(1)), "h");
        assert_eq!(program.instructions.len(), 2);
    }

    #[test]
    fn test_parse_unknown_kind() {
        let err = TraceProgram::from_json_str(r#"{ "instructions": [ { "kind": "teleport" } ] }"#)
            .unwrap_err();
        assert!(matches!(err, ProgramError::Parse(_)));
    }

    #[test]
    fn test_len_counts_nested_bodies() {
        let program = TraceProgram {
            config: None,
            instructions: vec![
                Instruction::Allocate { count: 1 },
                Instruction::Conditional {
                    results_a: vec![],
                    results_b: vec![],
                    body: vec![single(1, 1, 0), single(1, 1, 0)],
                },
            ],
        };
        assert_eq!(program.len(), 4);
    }

    #[test]
    fn test_replay_conditional_body_follows_measurement() {
        let mut tracer = Tracer::with_preferred_duration(10);
        let instructions = vec![
            Instruction::Allocate { count: 2 },
            Instruction::Measure {
                op: OpId(3),
                duration: 10,
                targets: vec![0],
            },
            Instruction::Conditional {
                results_a: vec![0],
                results_b: vec![],
                body: vec![single(1, 1, 1)],
            },
        ];

        let mut replayer = Replayer::new();
        replayer.replay(&mut tracer, &instructions).unwrap();
        assert_eq!(replayer.results()[0].layer(), Some(LayerId(0)));
        assert_eq!(tracer.fence_depth(), 0);
        assert_eq!(tracer.layers().layer(LayerId(1)).unwrap().count(OpId(1)), 1);

        let stats = replayer.finish().unwrap();
        assert_eq!(stats.instructions, 4);
        assert_eq!(stats.qubits, 2);
        assert_eq!(stats.measurements, 1);
        assert_eq!(stats.conditionals, 1);
    }

    #[test]
    fn test_replay_counts_deferred() {
        let mut tracer = Tracer::with_preferred_duration(10);
        let program = TraceProgram {
            config: None,
            instructions: vec![Instruction::Allocate { count: 1 }, single(7, 0, 0)],
        };
        let stats = program.run(&mut tracer, false).unwrap();
        assert_eq!(stats.operations, 1);
        assert_eq!(stats.deferred, 1);
        assert_eq!(tracer.pending_zero_duration_ops(), 1);
    }

    #[test]
    fn test_unknown_indices() {
        let mut tracer = Tracer::with_preferred_duration(1);
        let mut replayer = Replayer::new();
        let err = replayer.replay(&mut tracer, &[single(1, 1, 0)]).unwrap_err();
        assert!(matches!(
            err,
            ProgramError::UnknownQubit {
                index: 0,
                allocated: 0
            }
        ));

        let err = replayer
            .replay(
                &mut tracer,
                &[Instruction::Conditional {
                    results_a: vec![2],
                    results_b: vec![],
                    body: vec![],
                }],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ProgramError::UnknownResult {
                index: 2,
                measured: 0
            }
        ));
    }

    #[test]
    fn test_tracer_errors_propagate() {
        let mut tracer = Tracer::with_preferred_duration(1);
        let instructions = vec![
            Instruction::Allocate { count: 1 },
            Instruction::Measure {
                op: OpId(3),
                duration: 1,
                targets: vec![],
            },
        ];
        let err = Replayer::new().replay(&mut tracer, &instructions).unwrap_err();
        assert!(matches!(
            err,
            ProgramError::Trace(TraceError::EmptyTargetGroup { .. })
        ));
    }

    #[test]
    fn test_leak_check() {
        let mut tracer = Tracer::with_preferred_duration(1);
        let mut replayer = Replayer::new().with_leak_check();
        replayer
            .replay(
                &mut tracer,
                &[
                    Instruction::Allocate { count: 2 },
                    Instruction::Release { qubit: 0 },
                ],
            )
            .unwrap();
        let err = replayer.finish().unwrap_err();
        assert!(matches!(
            err,
            ProgramError::Allocation(AllocationError::Leak { count: 1 })
        ));
    }

    #[test]
    fn test_double_release_detected() {
        let mut tracer = Tracer::with_preferred_duration(1);
        let mut replayer = Replayer::new().with_leak_check();
        let err = replayer
            .replay(
                &mut tracer,
                &[
                    Instruction::Allocate { count: 1 },
                    Instruction::Release { qubit: 0 },
                    Instruction::Release { qubit: 0 },
                ],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ProgramError::Allocation(AllocationError::DoubleRelease { .. })
        ));
    }
}
