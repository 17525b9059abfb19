//! The in-memory graph view derived from the canonical schema (spec §3.3).
//!
//! Built fresh per ranking call — it is cheap relative to the GAT forward
//! pass it feeds and keeping it derived (rather than cached) avoids a whole
//! class of staleness bugs when the canonical schema changes.

use super::canonical::{CanonicalSchema, ColumnType};
use std::collections::BTreeSet;

/// The kind of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeKind {
    Global,
    Table { table_index: usize },
    Column { column_index: usize },
    /// The implicit `T.*` star column carried per table (spec §3.3),
    /// distinct from the single global `*` sentinel at canonical column
    /// index 0.
    TableStar { table_index: usize },
}

/// A single graph node, addressed by its stable `node_id` string (spec
/// §3.3: `"global"`, `"table:T"`, `"column:T.C"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub node_id: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_global(&self) -> bool {
        matches!(self.kind, NodeKind::Global)
    }

    pub fn is_table(&self) -> bool {
        matches!(self.kind, NodeKind::Table { .. })
    }

    pub fn is_column(&self) -> bool {
        matches!(self.kind, NodeKind::Column { .. } | NodeKind::TableStar { .. })
    }

    /// Text used to embed this node (spec §4.2): `"global"` for the
    /// sentinel, `T` for tables, `T.C (type)` for columns.
    pub fn text(&self, schema: &CanonicalSchema) -> String {
        match self.kind {
            NodeKind::Global => "global".to_string(),
            NodeKind::Table { table_index } => schema.table_names_original[table_index].clone(),
            NodeKind::Column { column_index } => {
                let col = &schema.column_names_original[column_index];
                let table = if col.table_index >= 0 {
                    schema.table_names_original[col.table_index as usize].as_str()
                } else {
                    "*"
                };
                let ty = schema.column_types[column_index];
                format!("{table}.{} ({})", col.column_name, type_name(ty))
            }
            NodeKind::TableStar { table_index } => {
                format!("{}.*", schema.table_names_original[table_index])
            }
        }
    }
}

fn type_name(t: ColumnType) -> &'static str {
    match t {
        ColumnType::Number => "number",
        ColumnType::Text => "text",
        ColumnType::Time => "time",
        ColumnType::Boolean => "boolean",
        ColumnType::Others => "others",
    }
}

/// An undirected, symmetric edge between two node indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub a: usize,
    pub b: usize,
}

/// The graph view: nodes plus symmetric edges (spec §3.3).
#[derive(Debug, Clone)]
pub struct GraphView {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl GraphView {
    /// Builds the graph view for a canonical schema: `global — table` for
    /// every table, `table — column` for every column it contains
    /// (including the implicit star column), and `column — column` for
    /// every foreign key relation.
    pub fn build(schema: &CanonicalSchema) -> Self {
        let mut nodes = Vec::new();
        nodes.push(Node {
            node_id: "global".to_string(),
            kind: NodeKind::Global,
        });
        let global_idx = 0usize;

        let mut table_node_idx = Vec::with_capacity(schema.table_names_original.len());
        for (table_idx, table_name) in schema.table_names_original.iter().enumerate() {
            table_node_idx.push(nodes.len());
            nodes.push(Node {
                node_id: format!("table:{table_name}"),
                kind: NodeKind::Table { table_index: table_idx },
            });
        }

        let mut column_node_idx = vec![None; schema.column_names_original.len()];
        let mut edges = Vec::new();

        for (table_idx, table_name) in schema.table_names_original.iter().enumerate() {
            let table_idx_node = table_node_idx[table_idx];
            edges.push(Edge { a: global_idx, b: table_idx_node });

            // Implicit star column for this table.
            let star_node = nodes.len();
            nodes.push(Node {
                node_id: format!("column:{table_name}.*"),
                kind: NodeKind::TableStar { table_index: table_idx },
            });
            edges.push(Edge { a: table_idx_node, b: star_node });

            for (col_idx, col_ref) in schema.columns_of(table_idx) {
                let node_id = format!("column:{table_name}.{}", col_ref.column_name);
                let node_idx = nodes.len();
                nodes.push(Node {
                    node_id,
                    kind: NodeKind::Column { column_index: col_idx },
                });
                column_node_idx[col_idx] = Some(node_idx);
                edges.push(Edge { a: table_idx_node, b: node_idx });
            }
        }

        for &(child, parent) in &schema.foreign_keys {
            if let (Some(c), Some(p)) = (column_node_idx[child], column_node_idx[parent]) {
                edges.push(Edge { a: c, b: p });
            }
        }

        GraphView { nodes, edges }
    }

    /// Adjacency list, built once per graph; used by the ranker's GAT
    /// layers and by the Intelligent Fallback's FK-closure rule.
    pub fn adjacency(&self) -> Vec<BTreeSet<usize>> {
        let mut adj = vec![BTreeSet::new(); self.nodes.len()];
        for edge in &self.edges {
            adj[edge.a].insert(edge.b);
            adj[edge.b].insert(edge.a);
        }
        adj
    }
}
