//! Layer metrics reporting.
//!
//! The table has one column per operation id ever traced, in ascending id
//! order, and one row per layer in creation order:
//!
//! ```text
//! layer_id,name,1,2
//! 0,,2,0
//! 10,barrier,0,0
//! ```
//!
//! The first column holds the layer's start time and the second the display
//! name of the barrier that created it. Rendering only walks ordered
//! containers, so identical traces produce byte-identical output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use tracing::{info, instrument};

use crate::config::TracerConfig;
use crate::error::TraceResult;
use crate::ids::{Duration, OpId};
use crate::layer::{Layer, LayerStore};

/// Read-only view rendering a session's layers.
#[derive(Debug, Clone, Copy)]
pub struct MetricsReporter<'a> {
    layers: &'a LayerStore,
    seen_ops: &'a BTreeSet<OpId>,
    config: &'a TracerConfig,
}

impl<'a> MetricsReporter<'a> {
    /// Create a reporter.
    pub fn new(
        layers: &'a LayerStore,
        seen_ops: &'a BTreeSet<OpId>,
        config: &'a TracerConfig,
    ) -> Self {
        Self {
            layers,
            seen_ops,
            config,
        }
    }

    fn barrier_name(&self, layer: &Layer) -> String {
        layer
            .barrier
            .map(|op| self.config.op_name(op))
            .unwrap_or_default()
    }

    /// Header and data rows of the table, without line terminators.
    pub fn rows(&self, separator: &str, print_zero_metrics: bool) -> Vec<String> {
        let mut rows = Vec::with_capacity(self.layers.len() + 1);

        let mut header = format!("layer_id{separator}name");
        for &op in self.seen_ops {
            header.push_str(separator);
            header.push_str(&self.config.op_name(op));
        }
        rows.push(header);

        let zero = if print_zero_metrics { "0" } else { "" };
        for layer in self.layers.layers() {
            let mut row = layer.start_time.to_string();
            row.push_str(separator);
            row.push_str(&self.barrier_name(layer));
            for op in self.seen_ops {
                row.push_str(separator);
                match layer.operations.get(op) {
                    Some(count) => row.push_str(&count.to_string()),
                    None => row.push_str(zero),
                }
            }
            rows.push(row);
        }

        rows
    }

    /// Render the table into a string, one `\n`-terminated line per row.
    pub fn render_table(&self, separator: &str, print_zero_metrics: bool) -> String {
        let mut table = String::new();
        for row in self.rows(separator, print_zero_metrics) {
            table.push_str(&row);
            table.push('\n');
        }
        table
    }

    /// Write the table to `out`.
    #[instrument(skip_all, fields(layers = self.layers.len(), ops = self.seen_ops.len()))]
    pub fn write_table<W: Write + ?Sized>(
        &self,
        out: &mut W,
        separator: &str,
        print_zero_metrics: bool,
    ) -> TraceResult<()> {
        for row in self.rows(separator, print_zero_metrics) {
            writeln!(out, "{row}")?;
        }
        info!(
            "Wrote layer metrics: {} layers, {} operation types",
            self.layers.len(),
            self.seen_ops.len()
        );
        Ok(())
    }

    /// Serializable snapshot of the metrics.
    pub fn report(&self) -> LayerReport {
        LayerReport {
            preferred_layer_duration: self.layers.preferred_duration(),
            operations: self
                .seen_ops
                .iter()
                .map(|&id| OperationColumn {
                    id,
                    name: self.config.op_name(id),
                })
                .collect(),
            layers: self.layers.layers().to_vec(),
        }
    }
}

/// An operation column of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationColumn {
    /// Operation id.
    pub id: OpId,
    /// Display name.
    pub name: String,
}

/// Structured form of the layer metrics, for JSON export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerReport {
    /// Preferred layer duration of the session.
    pub preferred_layer_duration: Duration,
    /// Traced operations in ascending id order.
    pub operations: Vec<OperationColumn>,
    /// Layers in creation order.
    pub layers: Vec<Layer>,
}

impl LayerReport {
    /// Total duration covered by all layers.
    pub fn total_duration(&self) -> Duration {
        self.layers.last().map_or(0, Layer::end_time)
    }

    /// Total number of placed operations.
    pub fn total_ops(&self) -> u64 {
        self.layers.iter().map(Layer::total_ops).sum()
    }

    /// Number of barrier layers.
    pub fn num_barriers(&self) -> usize {
        self.layers.iter().filter(|l| l.is_barrier()).count()
    }

    /// Serialize to JSON.
    pub fn to_json(&self, pretty: bool) -> TraceResult<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}
