//! Per-node feature construction (spec §3.3, §4.2): a 5-bit sparse
//! indicator concatenated with a fixed-dimension text embedding of the
//! node's text.

use crate::encoder::SentenceEncoder;
use crate::schema::canonical::CanonicalSchema;
use crate::schema::graph::{GraphView, Node, NodeKind};

/// Dimension of the node text embedding (spec §4.2: "384-dim text
/// embedding"). Independent of the question embedding dimension `Q`, which
/// is determined by the trained weights (spec §9 Open Question).
pub const NODE_TEXT_DIM: usize = 384;
/// `[is_global, is_table, is_column, is_pk, is_fk]`.
pub const SPARSE_DIM: usize = 5;

/// Builds the sparse 5-bit indicator for a node.
pub fn sparse_indicator(
    node: &Node,
    schema: &CanonicalSchema,
    fk_column_indices: &std::collections::HashSet<usize>,
) -> [f32; SPARSE_DIM] {
    let is_global = node.is_global() as u8 as f32;
    let is_table = node.is_table() as u8 as f32;
    let is_column = node.is_column() as u8 as f32;

    let (is_pk, is_fk) = match node.kind {
        NodeKind::Column { column_index } => (
            schema.primary_keys.contains(&column_index) as u8 as f32,
            fk_column_indices.contains(&column_index) as u8 as f32,
        ),
        _ => (0.0, 0.0),
    };

    [is_global, is_table, is_column, is_pk, is_fk]
}

/// Builds `x = [sparse_indicator, text_embedding]` for every node, in node
/// order. Returns `None` if the encoder fails on any node, mirroring the
/// ranker's "question embedding fails -> fall back" rule (spec §4.2) for
/// node-text embedding as well.
pub fn build_node_features(
    graph: &GraphView,
    schema: &CanonicalSchema,
    encoder: &dyn SentenceEncoder,
) -> Option<Vec<Vec<f32>>> {
    let fk_columns: std::collections::HashSet<usize> = schema
        .foreign_keys
        .iter()
        .flat_map(|&(c, p)| [c, p])
        .collect();

    graph
        .nodes
        .iter()
        .map(|node| {
            let sparse = sparse_indicator(node, schema, &fk_columns);
            let text = node.text(schema);
            let embedding = encoder.encode(&text)?;
            let mut features = Vec::with_capacity(SPARSE_DIM + embedding.len());
            features.extend_from_slice(&sparse);
            features.extend(embedding);
            Some(features)
        })
        .collect()
}
