//! Intelligent Fallback: augments the ranker's top-K with structurally
//! necessary nodes the ranker may have missed for purely semantic reasons
//! (spec §4.3). Fully automatic — no keyword lists beyond the fixed,
//! documented marker sets below, no domain configuration.

use super::gat::ScoredNode;
use crate::schema::canonical::{CanonicalSchema, ColumnType};
use crate::schema::graph::{GraphView, NodeKind};
use std::collections::BTreeMap;

const DURATION_MARKERS: &[&str] = &[
    "duration", "length", "stay", "period", "interval", "days", "hours", "time",
];
const AGGREGATION_MARKERS: &[&str] = &[
    "average", "avg", "sum", "total", "count", "mean", "median", "min", "max",
];
const GROUPING_MARKERS: &[&str] = &["per", "by", "each", "group", "categor"];
const DIMENSION_COLUMN_HINTS: &[&str] = &["name", "title", "type", "category", "label", "department"];

/// Why an augmented node was added, carried for observability (spec §4.3:
/// "tagged with their reason").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentReason {
    RankerTopK,
    ForeignKeyClosure,
    DurationColumn,
    AggregationColumn,
    DimensionColumn,
    JoinKey,
}

/// Score assigned to nodes synthesized by the fallback (spec §4.3: "in
/// [0.80, 0.88]"). A single fixed value in that range keeps the rule
/// deterministic; the reason tag preserves why it was added.
const SYNTHETIC_SCORE: f32 = 0.84;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedNode {
    pub node_id: String,
    pub score: f32,
    pub reason: Option<AugmentReason>,
}

fn contains_marker(question_lower: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| question_lower.contains(m))
}

/// Applies the three augmentation rules in order to the ranker's top-K set
/// and returns the full ranked, reason-tagged node list (spec §4.3).
///
/// `ranked` is empty when the ranker itself produced no output (weights
/// missing, encoder failure); callers are expected to skip pruning entirely
/// in that case (spec §4.2) rather than call this function.
pub fn augment(question: &str, schema: &CanonicalSchema, ranked: &[ScoredNode]) -> Vec<RankedNode> {
    let graph = GraphView::build(schema);
    let adjacency = graph.adjacency();
    let node_index_by_id: BTreeMap<&str, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.node_id.as_str(), i))
        .collect();

    let mut included: BTreeMap<usize, RankedNode> = BTreeMap::new();
    for node in ranked {
        if let Some(&idx) = node_index_by_id.get(node.node_id.as_str()) {
            included.insert(
                idx,
                RankedNode {
                    node_id: node.node_id.clone(),
                    score: node.score,
                    reason: Some(AugmentReason::RankerTopK),
                },
            );
        }
    }

    let mut add = |idx: usize, reason: AugmentReason, included: &mut BTreeMap<usize, RankedNode>| {
        included.entry(idx).or_insert_with(|| RankedNode {
            node_id: graph.nodes[idx].node_id.clone(),
            score: SYNTHETIC_SCORE,
            reason: Some(reason),
        });
    };

    // Rule 1: FK closure. For every table already present, pull in the peer
    // table and both sides of every incident FK column pair.
    let tables_in_set: Vec<usize> = included
        .keys()
        .copied()
        .filter(|&i| graph.nodes[i].is_table())
        .collect();

    for &table_idx_node in &tables_in_set {
        let NodeKind::Table { table_index } = graph.nodes[table_idx_node].kind else {
            continue;
        };
        for &(child, parent) in &schema.foreign_keys {
            let child_table = schema.column_names_original[child].table_index;
            let parent_table = schema.column_names_original[parent].table_index;
            let touches_this_table =
                child_table == table_index as i32 || parent_table == table_index as i32;
            if !touches_this_table {
                continue;
            }
            for &col_idx in &[child, parent] {
                if let Some(node_idx) = node_index_by_id.get(format!("column:{}", column_qualified_name(schema, col_idx)).as_str()) {
                    add(*node_idx, AugmentReason::ForeignKeyClosure, &mut included);
                }
                let col_table = schema.column_names_original[col_idx].table_index;
                if col_table >= 0 {
                    if let Some(&peer_table_node) = node_index_by_id
                        .get(format!("table:{}", schema.table_names_original[col_table as usize]).as_str())
                    {
                        add(peer_table_node, AugmentReason::ForeignKeyClosure, &mut included);
                    }
                }
            }
        }
    }

    // Rule 2: calculation columns, scoped to tables already in the set.
    let question_lower = question.to_ascii_lowercase();
    let tables_in_set: Vec<usize> = included
        .keys()
        .copied()
        .filter(|&i| graph.nodes[i].is_table())
        .collect();

    if contains_marker(&question_lower, DURATION_MARKERS) {
        add_columns_of_type(&graph, schema, &tables_in_set, ColumnType::Time, AugmentReason::DurationColumn, &mut included, &node_index_by_id);
    }
    if contains_marker(&question_lower, AGGREGATION_MARKERS) {
        add_columns_of_type(&graph, schema, &tables_in_set, ColumnType::Number, AugmentReason::AggregationColumn, &mut included, &node_index_by_id);
    }

    // Rule 3: grouping/join keys.
    if contains_marker(&question_lower, GROUPING_MARKERS) {
        for &table_node in &tables_in_set {
            let NodeKind::Table { table_index } = graph.nodes[table_node].kind else {
                continue;
            };
            if let Some(dim_col) = pick_dimension_column(schema, table_index) {
                if let Some(&idx) = node_index_by_id
                    .get(format!("column:{}", column_qualified_name(schema, dim_col)).as_str())
                {
                    add(idx, AugmentReason::DimensionColumn, &mut included);
                }
            }
        }

        // Ensure both sides of every FK connecting two tables already in
        // the set are present.
        let tables_in_set: Vec<usize> = included
            .keys()
            .copied()
            .filter(|&i| graph.nodes[i].is_table())
            .collect();
        let table_indices: Vec<usize> = tables_in_set
            .iter()
            .filter_map(|&n| match graph.nodes[n].kind {
                NodeKind::Table { table_index } => Some(table_index),
                _ => None,
            })
            .collect();

        for &(child, parent) in &schema.foreign_keys {
            let ct = schema.column_names_original[child].table_index;
            let pt = schema.column_names_original[parent].table_index;
            if ct >= 0
                && pt >= 0
                && table_indices.contains(&(ct as usize))
                && table_indices.contains(&(pt as usize))
            {
                for &col_idx in &[child, parent] {
                    if let Some(&idx) = node_index_by_id
                        .get(format!("column:{}", column_qualified_name(schema, col_idx)).as_str())
                    {
                        add(idx, AugmentReason::JoinKey, &mut included);
                    }
                }
            }
        }
    }

    let _ = adjacency; // adjacency kept for future rule extensions / symmetry with GraphView API

    let mut out: Vec<RankedNode> = included.into_values().collect();
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out
}

fn column_qualified_name(schema: &CanonicalSchema, col_idx: usize) -> String {
    let col = &schema.column_names_original[col_idx];
    if col.table_index >= 0 {
        format!(
            "{}.{}",
            schema.table_names_original[col.table_index as usize], col.column_name
        )
    } else {
        col.column_name.clone()
    }
}

fn add_columns_of_type(
    graph: &GraphView,
    schema: &CanonicalSchema,
    tables_in_set: &[usize],
    ty: ColumnType,
    reason: AugmentReason,
    included: &mut BTreeMap<usize, RankedNode>,
    node_index_by_id: &BTreeMap<&str, usize>,
) {
    for &table_node in tables_in_set {
        let NodeKind::Table { table_index } = graph.nodes[table_node].kind else {
            continue;
        };
        for (col_idx, _) in schema.columns_of(table_index) {
            if schema.column_types[col_idx] == ty {
                if let Some(&idx) = node_index_by_id
                    .get(format!("column:{}", column_qualified_name(schema, col_idx)).as_str())
                {
                    included.entry(idx).or_insert_with(|| RankedNode {
                        node_id: graph.nodes[idx].node_id.clone(),
                        score: SYNTHETIC_SCORE,
                        reason: Some(reason),
                    });
                }
            }
        }
    }
}

/// Picks one textual "dimension" column for a table: a name matching the
/// documented hint list, else the first `text` column (spec §4.3 rule 3).
fn pick_dimension_column(schema: &CanonicalSchema, table_index: usize) -> Option<usize> {
    let columns: Vec<(usize, &str)> = schema
        .columns_of(table_index)
        .map(|(idx, col)| (idx, col.column_name.as_str()))
        .collect();

    for (idx, name) in &columns {
        let lower = name.to_ascii_lowercase();
        if DIMENSION_COLUMN_HINTS.iter().any(|hint| lower.contains(hint)) {
            return Some(*idx);
        }
    }

    columns
        .iter()
        .find(|(idx, _)| schema.column_types[*idx] == ColumnType::Text)
        .map(|(idx, _)| *idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::canonical::convert;
    use crate::schema::model::{Column, ForeignKey, Schema, Table};
    use indexmap::IndexMap;

    fn hospital_schema() -> CanonicalSchema {
        let mut tables = IndexMap::new();
        tables.insert(
            "admissions".to_string(),
            Table {
                columns: vec![
                    Column { name: "admission_date".into(), sql_type: "date".into(), nullable: false, primary_key: false },
                    Column { name: "discharge_date".into(), sql_type: "date".into(), nullable: false, primary_key: false },
                    Column { name: "department_id".into(), sql_type: "int".into(), nullable: false, primary_key: false },
                ],
                foreign_keys: vec![ForeignKey {
                    constrained_columns: vec!["department_id".into()],
                    referred_table: "departments".into(),
                    referred_columns: vec!["id".into()],
                }],
                indexes: vec![],
            },
        );
        tables.insert(
            "departments".to_string(),
            Table {
                columns: vec![
                    Column { name: "id".into(), sql_type: "int".into(), nullable: false, primary_key: true },
                    Column { name: "name".into(), sql_type: "varchar".into(), nullable: false, primary_key: false },
                ],
                foreign_keys: vec![],
                indexes: vec![],
            },
        );
        convert(&Schema { db_id: "hospital".into(), tables, relationships: vec![] })
    }

    #[test]
    fn fk_closure_pulls_in_peer_table_and_both_columns() {
        let schema = hospital_schema();
        let seed = vec![ScoredNode { node_id: "table:admissions".to_string(), score: 0.9 }];
        let result = augment("average length of admission stay per department", &schema, &seed);
        let ids: Vec<&str> = result.iter().map(|n| n.node_id.as_str()).collect();
        assert!(ids.contains(&"table:departments"));
        assert!(ids.contains(&"column:admissions.department_id"));
        assert!(ids.contains(&"column:departments.id"));
    }

    #[test]
    fn duration_marker_pulls_in_time_columns() {
        let schema = hospital_schema();
        let seed = vec![ScoredNode { node_id: "table:admissions".to_string(), score: 0.9 }];
        let result = augment("average length of admission stay per department", &schema, &seed);
        let ids: Vec<&str> = result.iter().map(|n| n.node_id.as_str()).collect();
        assert!(ids.contains(&"column:admissions.admission_date"));
        assert!(ids.contains(&"column:admissions.discharge_date"));
    }

    #[test]
    fn grouping_marker_pulls_in_dimension_column() {
        let schema = hospital_schema();
        let seed = vec![
            ScoredNode { node_id: "table:admissions".to_string(), score: 0.9 },
            ScoredNode { node_id: "table:departments".to_string(), score: 0.8 },
        ];
        let result = augment("admissions per department", &schema, &seed);
        let ids: Vec<&str> = result.iter().map(|n| n.node_id.as_str()).collect();
        assert!(ids.contains(&"column:departments.name"));
    }

    #[test]
    fn augmented_set_is_superset_of_ranker_topk() {
        let schema = hospital_schema();
        let seed = vec![ScoredNode { node_id: "table:admissions".to_string(), score: 0.9 }];
        let result = augment("anything", &schema, &seed);
        assert!(result.iter().any(|n| n.node_id == "table:admissions"));
    }

    #[test]
    fn scenario_b_full_node_set() {
        let schema = hospital_schema();
        let seed = vec![ScoredNode { node_id: "table:admissions".to_string(), score: 0.9 }];
        let result = augment("average length of admission stay per department", &schema, &seed);
        let ids: std::collections::BTreeSet<&str> = result.iter().map(|n| n.node_id.as_str()).collect();
        for expected in [
            "table:admissions",
            "table:departments",
            "column:admissions.admission_date",
            "column:admissions.discharge_date",
            "column:admissions.department_id",
            "column:departments.id",
            "column:departments.name",
        ] {
            assert!(ids.contains(expected), "missing {expected}");
        }
    }
}
