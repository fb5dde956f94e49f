//! Binary container for graph artifacts.
//!
//! The container is a fixed 12-byte header (magic, version, flags) followed
//! by a bincode-encoded [`GraphModel`]. The header lets consumers reject
//! foreign files before attempting a full decode.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{GraphError, Result};
use crate::model::GraphModel;

/// Magic bytes identifying a graph artifact.
pub const GRAPH_MAGIC: [u8; 4] = *b"IRG1";

/// Current graph container version.
pub const GRAPH_VERSION: u32 = 1;

/// Header size in bytes (magic + version + flags).
pub const GRAPH_HEADER_SIZE: usize = 12;

/// Fixed-size artifact header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphHeader {
    /// Magic bytes (must be `IRG1`).
    pub magic: [u8; 4],
    /// Container version.
    pub version: u32,
    /// Reserved flags.
    pub flags: u32,
}

impl GraphHeader {
    /// Creates a header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: GRAPH_MAGIC,
            version: GRAPH_VERSION,
            flags: 0,
        }
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        Ok(())
    }

    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;

        let mut word = [0u8; 4];
        reader.read_exact(&mut word)?;
        let version = u32::from_le_bytes(word);

        reader.read_exact(&mut word)?;
        let flags = u32::from_le_bytes(word);

        Ok(Self {
            magic,
            version,
            flags,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.magic != GRAPH_MAGIC {
            return Err(GraphError::InvalidMagic(self.magic));
        }
        if self.version != GRAPH_VERSION {
            return Err(GraphError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

impl Default for GraphHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Saves a graph to a file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or encoding fails.
pub fn save_graph_file(graph: &GraphModel, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    save_graph_writer(graph, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Saves a graph to any [`Write`] destination.
///
/// # Errors
///
/// Returns an error if writing or encoding fails.
pub fn save_graph_writer<W: Write>(graph: &GraphModel, writer: &mut W) -> Result<()> {
    GraphHeader::new()
        .write_to(writer)
        .map_err(|e| GraphError::Serialize(e.to_string()))?;
    bincode::serialize_into(writer, graph).map_err(|e| GraphError::Serialize(e.to_string()))?;
    Ok(())
}

/// Saves a graph to an in-memory byte vector.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn save_graph_bytes(graph: &GraphModel) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    save_graph_writer(graph, &mut buffer)?;
    Ok(buffer)
}

/// Loads a graph from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, has invalid magic bytes,
/// declares an unsupported version, or fails to decode.
pub fn load_graph_file(path: impl AsRef<Path>) -> Result<GraphModel> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    load_graph_reader(&mut reader)
}

/// Loads a graph from any [`Read`] source.
///
/// # Errors
///
/// Returns an error if the header is invalid or decoding fails.
pub fn load_graph_reader<R: Read>(reader: &mut R) -> Result<GraphModel> {
    let header = GraphHeader::read_from(reader)
        .map_err(|e| GraphError::Deserialize(format!("failed to read header: {e}")))?;
    header.validate()?;

    let graph: GraphModel =
        bincode::deserialize_from(reader).map_err(|e| GraphError::Deserialize(e.to_string()))?;
    Ok(graph)
}

/// Loads a graph from a byte slice.
///
/// # Errors
///
/// Returns an error if the header is invalid or decoding fails.
pub fn load_graph_bytes(bytes: &[u8]) -> Result<GraphModel> {
    let mut reader = std::io::Cursor::new(bytes);
    load_graph_reader(&mut reader)
}

/// Checks whether a file starts with the graph magic bytes.
///
/// Cheap probe; does not decode the payload.
#[must_use]
pub fn is_graph_file(path: impl AsRef<Path>) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut reader = BufReader::new(file);
    let mut magic = [0u8; 4];
    if reader.read_exact(&mut magic).is_err() {
        return false;
    }
    magic == GRAPH_MAGIC
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::{GraphNode, Initializer, OpKind};
    use crate::signature::{DType, Dim, TensorSignature};

    fn sample_graph() -> GraphModel {
        let mut graph = GraphModel::new(12, "graph-ir-test");
        graph.inputs.push(TensorSignature::new(
            "images",
            DType::F32,
            vec![
                Dim::Symbolic("batch".into()),
                Dim::Static(3),
                Dim::Static(64),
                Dim::Static(64),
            ],
        ));
        graph.outputs.push(TensorSignature::new(
            "output",
            DType::F32,
            vec![Dim::Symbolic("batch".into()), Dim::Static(10)],
        ));
        graph.initializers.push(Initializer::new("w", vec![10], vec![0.5; 10]));
        graph.nodes.push(GraphNode::new(
            "n0",
            OpKind::Mul,
            vec!["images".into(), "w".into()],
            vec!["output".into()],
        ));
        graph
    }

    #[test]
    fn header_roundtrip() {
        let header = GraphHeader::new();
        let mut buffer = Vec::new();
        header.write_to(&mut buffer).unwrap();
        assert_eq!(buffer.len(), GRAPH_HEADER_SIZE);

        let mut cursor = std::io::Cursor::new(&buffer);
        let loaded = GraphHeader::read_from(&mut cursor).unwrap();
        assert_eq!(loaded, header);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn bytes_roundtrip() {
        let graph = sample_graph();
        let bytes = save_graph_bytes(&graph).unwrap();
        assert!(bytes.len() > GRAPH_HEADER_SIZE);

        let loaded = load_graph_bytes(&bytes).unwrap();
        assert_eq!(loaded, graph);
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.irg");

        let graph = sample_graph();
        save_graph_file(&graph, &path).unwrap();
        assert!(is_graph_file(&path));

        let loaded = load_graph_file(&path).unwrap();
        assert_eq!(loaded.opset, 12);
        assert_eq!(loaded.nodes.len(), 1);
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut bytes = save_graph_bytes(&sample_graph()).unwrap();
        bytes[..4].copy_from_slice(b"NOPE");
        let err = load_graph_bytes(&bytes).unwrap_err();
        assert!(matches!(err, GraphError::InvalidMagic(_)));
    }

    #[test]
    fn rejects_future_version() {
        let mut bytes = save_graph_bytes(&sample_graph()).unwrap();
        bytes[4..8].copy_from_slice(&7u32.to_le_bytes());
        let err = load_graph_bytes(&bytes).unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedVersion(7)));
    }

    #[test]
    fn probe_rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_a_graph.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert!(!is_graph_file(&path));
        assert!(!is_graph_file(dir.path().join("missing.irg")));
    }

    #[test]
    fn truncated_payload_fails_to_decode() {
        let bytes = save_graph_bytes(&sample_graph()).unwrap();
        let err = load_graph_bytes(&bytes[..GRAPH_HEADER_SIZE + 2]).unwrap_err();
        assert!(matches!(err, GraphError::Deserialize(_)));
    }
}
