//! Portable inference-graph format for detector models.
//!
//! This crate defines the on-disk artifact produced by the conversion
//! pipeline: a static computation graph with named tensor signatures,
//! embedded weight initializers, a declared opset version, and symbolic
//! (dynamic) dimensions. It also provides the structural validator that
//! gates conversion success.
//!
//! # File Format
//!
//! An `.irg` file consists of:
//! 1. **Magic bytes**: `IRG1` (4 bytes)
//! 2. **Version**: `u32` little-endian (4 bytes)
//! 3. **Flags**: `u32` little-endian (4 bytes) - reserved
//! 4. **Payload**: bincode-encoded [`GraphModel`]
//!
//! # Layering
//!
//! This is a leaf crate: it knows nothing about checkpoints, modules, or
//! the export pipeline. Consumers are the export engine (producer side)
//! and inference runtimes (consumer side).
//!
//! # Example
//!
//! ```
//! use graph_ir::{GraphModel, TensorSignature, Dim, DType};
//!
//! let mut graph = GraphModel::new(12, "demo");
//! graph.inputs.push(TensorSignature::new(
//!     "images",
//!     DType::F32,
//!     vec![Dim::Symbolic("batch".into()), Dim::Static(3), Dim::Static(640), Dim::Static(640)],
//! ));
//! assert_eq!(graph.opset, 12);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod error;
mod io;
mod model;
mod signature;
mod validator;

pub use error::{GraphError, Result};
pub use io::{
    is_graph_file, load_graph_bytes, load_graph_file, load_graph_reader, save_graph_bytes,
    save_graph_file, save_graph_writer, GraphHeader, GRAPH_HEADER_SIZE, GRAPH_MAGIC, GRAPH_VERSION,
};
pub use model::{AttrValue, GraphModel, GraphNode, Initializer, OpKind};
pub use signature::{DType, Dim, TensorSignature};
pub use validator::{validate_graph, ValidationReport, Violation};
