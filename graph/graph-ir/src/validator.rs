//! Structural validation of serialized graphs.
//!
//! The validator re-checks an artifact after export: topological
//! well-formedness, name uniqueness, declared signature names, and opset
//! admissibility. It never mutates the graph.

use std::collections::BTreeSet;

use crate::model::GraphModel;

/// A single structural violation found during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The graph contains no nodes.
    EmptyGraph,
    /// Two values (inputs, initializers, or node outputs) share a name.
    DuplicateValue(String),
    /// Two nodes share a name.
    DuplicateNode(String),
    /// A node consumes a value that no earlier node, input, or
    /// initializer produces.
    DanglingInput {
        /// Consuming node name.
        node: String,
        /// Unresolved value name.
        input: String,
    },
    /// A declared graph output is not produced by any node.
    UnproducedOutput(String),
    /// Declared input count differs from the expected count.
    InputCountMismatch {
        /// Expected number of inputs.
        expected: usize,
        /// Declared number of inputs.
        actual: usize,
    },
    /// Declared output count differs from the expected count.
    OutputCountMismatch {
        /// Expected number of outputs.
        expected: usize,
        /// Declared number of outputs.
        actual: usize,
    },
    /// Declared input name differs from the expected name at a position.
    InputNameMismatch {
        /// Position in the input list.
        index: usize,
        /// Expected name.
        expected: String,
        /// Declared name.
        actual: String,
    },
    /// Declared output name differs from the expected name at a position.
    OutputNameMismatch {
        /// Position in the output list.
        index: usize,
        /// Expected name.
        expected: String,
        /// Declared name.
        actual: String,
    },
    /// A signature declares a static dimension of zero.
    ZeroDim {
        /// Signature name.
        value: String,
        /// Offending axis.
        axis: usize,
    },
    /// A node uses an operation not admitted by the declared opset.
    OpsetExceeded {
        /// Node name.
        node: String,
        /// Operation name.
        op: String,
        /// Minimum opset required by the operation.
        required: u32,
        /// Opset declared by the graph.
        declared: u32,
    },
    /// The artifact could not be read back at all.
    Unreadable(String),
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyGraph => write!(f, "graph contains no nodes"),
            Self::DuplicateValue(name) => write!(f, "duplicate value name: {name}"),
            Self::DuplicateNode(name) => write!(f, "duplicate node name: {name}"),
            Self::DanglingInput { node, input } => {
                write!(f, "node {node} consumes undefined value: {input}")
            }
            Self::UnproducedOutput(name) => {
                write!(f, "declared output {name} is not produced by any node")
            }
            Self::InputCountMismatch { expected, actual } => {
                write!(f, "expected {expected} graph inputs, found {actual}")
            }
            Self::OutputCountMismatch { expected, actual } => {
                write!(f, "expected {expected} graph outputs, found {actual}")
            }
            Self::InputNameMismatch {
                index,
                expected,
                actual,
            } => write!(f, "input {index} is named {actual}, expected {expected}"),
            Self::OutputNameMismatch {
                index,
                expected,
                actual,
            } => write!(f, "output {index} is named {actual}, expected {expected}"),
            Self::ZeroDim { value, axis } => {
                write!(f, "signature {value} declares zero extent on axis {axis}")
            }
            Self::OpsetExceeded {
                node,
                op,
                required,
                declared,
            } => write!(
                f,
                "node {node} uses {op} which requires opset >= {required}, graph declares {declared}"
            ),
            Self::Unreadable(reason) => write!(f, "artifact could not be reloaded: {reason}"),
        }
    }
}

/// Outcome of validating one graph.
///
/// # Example
///
/// ```
/// use graph_ir::ValidationReport;
///
/// let report = ValidationReport::default();
/// assert!(report.passed());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    /// Creates an empty (passing) report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a report from a single violation.
    #[must_use]
    pub fn from_violation(violation: Violation) -> Self {
        Self {
            violations: vec![violation],
        }
    }

    /// `true` if no violations were found.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// The violations found, in discovery order.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.passed() {
            return write!(f, "graph is structurally valid");
        }
        writeln!(f, "{} violation(s):", self.violations.len())?;
        for v in &self.violations {
            writeln!(f, "  - {v}")?;
        }
        Ok(())
    }
}

/// Validates a graph against the expected input and output names.
///
/// Checks, in order:
/// - the graph has at least one node;
/// - input/initializer/node-output names are unique;
/// - every node input is produced by an earlier node, a graph input, or an
///   initializer;
/// - every declared graph output is produced by some node;
/// - declared input/output names match `expected_inputs`/`expected_outputs`
///   exactly and in order;
/// - no signature declares a zero static extent;
/// - every node's operation is admitted by the declared opset.
#[must_use]
pub fn validate_graph(
    graph: &GraphModel,
    expected_inputs: &[String],
    expected_outputs: &[String],
) -> ValidationReport {
    let mut report = ValidationReport::new();

    if graph.nodes.is_empty() {
        report.push(Violation::EmptyGraph);
    }

    // Value namespace: graph inputs, then initializers, then node outputs.
    let mut known: BTreeSet<&str> = BTreeSet::new();
    for sig in &graph.inputs {
        if !known.insert(&sig.name) {
            report.push(Violation::DuplicateValue(sig.name.clone()));
        }
    }
    for init in &graph.initializers {
        if !known.insert(&init.name) {
            report.push(Violation::DuplicateValue(init.name.clone()));
        }
    }

    let mut node_names: BTreeSet<&str> = BTreeSet::new();
    let mut produced: BTreeSet<&str> = BTreeSet::new();
    for node in &graph.nodes {
        if !node_names.insert(&node.name) {
            report.push(Violation::DuplicateNode(node.name.clone()));
        }
        for input in &node.inputs {
            if !known.contains(input.as_str()) {
                report.push(Violation::DanglingInput {
                    node: node.name.clone(),
                    input: input.clone(),
                });
            }
        }
        for output in &node.outputs {
            if !known.insert(output) {
                report.push(Violation::DuplicateValue(output.clone()));
            }
            produced.insert(output);
        }
        let required = node.op.min_opset();
        if graph.opset < required {
            report.push(Violation::OpsetExceeded {
                node: node.name.clone(),
                op: node.op.name().to_string(),
                required,
                declared: graph.opset,
            });
        }
    }

    for sig in &graph.outputs {
        if !produced.contains(sig.name.as_str()) {
            report.push(Violation::UnproducedOutput(sig.name.clone()));
        }
    }

    if graph.inputs.len() != expected_inputs.len() {
        report.push(Violation::InputCountMismatch {
            expected: expected_inputs.len(),
            actual: graph.inputs.len(),
        });
    }
    for (index, (sig, expected)) in graph.inputs.iter().zip(expected_inputs).enumerate() {
        if &sig.name != expected {
            report.push(Violation::InputNameMismatch {
                index,
                expected: expected.clone(),
                actual: sig.name.clone(),
            });
        }
    }

    if graph.outputs.len() != expected_outputs.len() {
        report.push(Violation::OutputCountMismatch {
            expected: expected_outputs.len(),
            actual: graph.outputs.len(),
        });
    }
    for (index, (sig, expected)) in graph.outputs.iter().zip(expected_outputs).enumerate() {
        if &sig.name != expected {
            report.push(Violation::OutputNameMismatch {
                index,
                expected: expected.clone(),
                actual: sig.name.clone(),
            });
        }
    }

    for sig in graph.inputs.iter().chain(&graph.outputs) {
        for (axis, dim) in sig.dims.iter().enumerate() {
            if dim.as_static() == Some(0) {
                report.push(Violation::ZeroDim {
                    value: sig.name.clone(),
                    axis,
                });
            }
        }
    }

    report
}
