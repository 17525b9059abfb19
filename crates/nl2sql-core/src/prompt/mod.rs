//! The Prompt Assembler (spec §4.4): a pure function from pruned schema,
//! optional RAG examples, optional conversation context, and the resolved
//! question to a single LLM prompt string.

use crate::ranker::RankedNode;
use crate::schema::canonical::CanonicalSchema;
use crate::schema::graph::{GraphView, NodeKind};
use crate::schema::model::Schema;
use std::collections::{BTreeSet, HashMap};

/// A prior `(question, sql)` pair retrieved by semantic similarity (spec
/// §4.4 "RAG block"). The assembler does not rank or filter these; it
/// renders whatever the caller selected.
#[derive(Debug, Clone, PartialEq)]
pub struct RagExample {
    pub question: String,
    pub sql: String,
}

/// One turn of prior conversation (spec §4.4 "Context block").
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub question: String,
    pub sql: String,
}

/// Everything the assembler needs. `ranked_nodes` is `None` exactly when
/// the ranker produced no output (spec §4.2 "no pruning"); the assembler
/// then falls back to the compact full-schema rendering.
pub struct PromptInputs<'a> {
    pub schema: &'a Schema,
    pub canonical: &'a CanonicalSchema,
    pub ranked_nodes: Option<&'a [RankedNode]>,
    pub rag_examples: &'a [RagExample],
    pub history: &'a [ConversationTurn],
    pub resolved_question: &'a str,
    pub compact_schema_max_columns: usize,
    pub history_window: usize,
}

const PROMPT_TEMPLATE: &str = "\
{% if schema_block %}## Schema\n{{ schema_block }}\n\n{% endif %}\
{% if rag_block %}## Examples\n{{ rag_block }}\n\n{% endif %}\
{% if context_block %}## Conversation so far\n{{ context_block }}\n\n{% endif %}\
## Question\n{{ question }}\n\n\
## Output format\n{{ ir_description }}\n";

/// The IR structural description rendered into every prompt (spec §4.4):
/// stable, explicit, and field names are literal.
const IR_DESCRIPTION: &str = "\
Respond with a single JSON object describing a SELECT query, with exactly these fields:\n\
- ctes: list of {name, query} (query has the same shape as the top-level object), may be empty.\n\
- select: list of expressions, each optionally carrying an \"alias\" field.\n\
- from_table: the root table or CTE name.\n\
- joins: list of {type, table, alias, on}, type one of INNER/LEFT/RIGHT/FULL/CROSS, on a list of equality predicates.\n\
- where: list of predicates, implicitly AND-ed together.\n\
- group_by: list of expressions.\n\
- having: list of predicates over aggregates.\n\
- order_by: list of {column, direction}, direction one of ASC/DESC.\n\
- limit, offset: non-negative integers, omit if not applicable.\n\
- confidence: your confidence in this query, between 0 and 1.\n\
- ambiguities, questions: lists of strings, may be empty.\n\
\n\
Every expression is one of:\n\
  {\"type\": \"column\", \"value\": \"table.column\"} (use \"*\" or \"table.*\" for stars)\n\
  {\"type\": \"literal\", \"value\": <json value>}\n\
  {\"type\": \"function\", \"name\": \"...\", \"args\": [...]}\n\
  {\"type\": \"aggregate\", \"name\": \"COUNT|SUM|AVG|MIN|MAX\", \"distinct\": bool, \"args\": [...]}\n\
  {\"type\": \"window\", \"function\": <expression>, \"partition_by\": [...], \"order_by\": [...]}\n\
Field names are literal; do not use synonyms. Aggregates are always objects, never bare strings:\n\
COUNT(*) must be encoded as {\"type\": \"aggregate\", \"name\": \"COUNT\", \"distinct\": false, \"args\": [{\"type\": \"column\", \"value\": \"*\"}]}.\n\
Any aggregate expression used in order_by must also appear in select.\n";

/// Produces the single prompt text sent to the LLM (spec §4.4). Pure
/// function of its inputs: identical inputs render byte-identical output.
pub fn assemble(inputs: &PromptInputs) -> String {
    let schema_block = render_schema_block(inputs);
    let rag_block = render_rag_block(inputs.rag_examples);
    let context_block = render_context_block(inputs.history, inputs.history_window);

    let mut ctx: HashMap<String, serde_json::Value> = HashMap::new();
    ctx.insert("schema_block".to_string(), serde_json::json!(schema_block));
    ctx.insert("rag_block".to_string(), serde_json::json!(rag_block));
    ctx.insert("context_block".to_string(), serde_json::json!(context_block));
    ctx.insert("question".to_string(), serde_json::json!(inputs.resolved_question));
    ctx.insert("ir_description".to_string(), serde_json::json!(IR_DESCRIPTION));

    crate::templater::render(PROMPT_TEMPLATE, &ctx).expect("prompt template is a fixed, well-formed constant")
}

fn render_schema_block(inputs: &PromptInputs) -> Option<String> {
    match inputs.ranked_nodes {
        Some(ranked) => Some(render_pruned_schema(inputs.schema, inputs.canonical, ranked)),
        None => Some(render_compact_schema(inputs.schema, inputs.canonical, inputs.compact_schema_max_columns)),
    }
}

/// `CREATE TABLE T (c1 TYPE1, c2 TYPE2, ...);` per table in the augmented
/// node set, columns in canonical order (spec §4.4).
fn render_pruned_schema(schema: &Schema, canonical: &CanonicalSchema, ranked: &[RankedNode]) -> String {
    let graph = GraphView::build(canonical);
    let node_by_id: HashMap<&str, &crate::schema::graph::Node> =
        graph.nodes.iter().map(|n| (n.node_id.as_str(), n)).collect();

    let mut tables: BTreeSet<usize> = BTreeSet::new();
    let mut columns: BTreeSet<usize> = BTreeSet::new();
    for entry in ranked {
        let Some(node) = node_by_id.get(entry.node_id.as_str()) else { continue };
        match node.kind {
            NodeKind::Table { table_index } => {
                tables.insert(table_index);
            }
            NodeKind::Column { column_index } => {
                columns.insert(column_index);
                let table_index = canonical.column_names_original[column_index].table_index;
                if table_index >= 0 {
                    tables.insert(table_index as usize);
                }
            }
            NodeKind::TableStar { table_index } => {
                tables.insert(table_index);
            }
            NodeKind::Global => {}
        }
    }

    let mut lines = Vec::new();
    for &table_idx in &tables {
        let table_name = &canonical.table_names_original[table_idx];
        let cols: Vec<String> = canonical
            .columns_of(table_idx)
            .filter(|(col_idx, _)| columns.contains(col_idx))
            .map(|(_, col_ref)| {
                format!("{} {}", col_ref.column_name, original_type_upper(schema, table_name, &col_ref.column_name))
            })
            .collect();
        lines.push(format!("CREATE TABLE {table_name} ({});", cols.join(", ")));
    }
    lines.join("\n")
}

/// Falls back to at most `max_columns` per table, preferring primary and
/// foreign-key columns, when the ranker produced no output (spec §4.4).
fn render_compact_schema(schema: &Schema, canonical: &CanonicalSchema, max_columns: usize) -> String {
    let fk_columns: BTreeSet<usize> = canonical.foreign_keys.iter().flat_map(|&(c, p)| [c, p]).collect();
    let pk_columns: BTreeSet<usize> = canonical.primary_keys.iter().copied().collect();

    let mut lines = Vec::new();
    for (table_idx, table_name) in canonical.table_names_original.iter().enumerate() {
        let mut cols: Vec<(usize, &crate::schema::canonical::ColumnRef)> = canonical.columns_of(table_idx).collect();
        cols.sort_by_key(|(idx, _)| {
            let priority = if pk_columns.contains(idx) || fk_columns.contains(idx) { 0 } else { 1 };
            (priority, *idx)
        });
        cols.truncate(max_columns);
        cols.sort_by_key(|(idx, _)| *idx);

        let rendered: Vec<String> = cols
            .iter()
            .map(|(_, col_ref)| format!("{} {}", col_ref.column_name, original_type_upper(schema, table_name, &col_ref.column_name)))
            .collect();
        lines.push(format!("CREATE TABLE {table_name} ({});", rendered.join(", ")));
    }
    lines.join("\n")
}

/// The original SQL type string for a column, upper-cased (spec §4.4):
/// `name VARCHAR(255)`, not the coarse canonical class. `columns_of` never
/// yields the `*` sentinel (its table_index is -1), so the lookup always
/// finds a backing `Column`; "TEXT" only guards against a malformed caller.
fn original_type_upper(schema: &Schema, table_name: &str, column_name: &str) -> String {
    schema
        .tables
        .get(table_name)
        .and_then(|table| table.columns.iter().find(|c| c.name == column_name))
        .map(|c| c.sql_type.to_ascii_uppercase())
        .unwrap_or_else(|| "TEXT".to_string())
}

fn render_rag_block(examples: &[RagExample]) -> Option<String> {
    if examples.is_empty() {
        return None;
    }
    let rendered: Vec<String> = examples
        .iter()
        .map(|e| format!("Q: {}\nSQL: {}", e.question, e.sql))
        .collect();
    Some(rendered.join("\n\n"))
}

fn render_context_block(history: &[ConversationTurn], window: usize) -> Option<String> {
    if history.is_empty() || window == 0 {
        return None;
    }
    let start = history.len().saturating_sub(window);
    let rendered: Vec<String> = history[start..]
        .iter()
        .map(|t| format!("Q: {}\nSQL: {}", t.question, t.sql))
        .collect();
    Some(rendered.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::canonical::convert;
    use crate::schema::model::{Column, ForeignKey, Table};
    use indexmap::IndexMap;

    fn ecommerce() -> (Schema, CanonicalSchema) {
        let mut tables = IndexMap::new();
        tables.insert(
            "customers".to_string(),
            Table {
                columns: vec![
                    Column { name: "customer_id".into(), sql_type: "int".into(), nullable: false, primary_key: true },
                    Column { name: "name".into(), sql_type: "varchar(255)".into(), nullable: false, primary_key: false },
                    Column { name: "total_spent".into(), sql_type: "decimal(10,2)".into(), nullable: false, primary_key: false },
                ],
                foreign_keys: vec![],
                indexes: vec![],
            },
        );
        tables.insert(
            "orders".to_string(),
            Table {
                columns: vec![
                    Column { name: "order_id".into(), sql_type: "int".into(), nullable: false, primary_key: true },
                    Column { name: "customer_id".into(), sql_type: "int".into(), nullable: false, primary_key: false },
                    Column { name: "status".into(), sql_type: "varchar(20)".into(), nullable: false, primary_key: false },
                ],
                foreign_keys: vec![ForeignKey {
                    constrained_columns: vec!["customer_id".into()],
                    referred_table: "customers".into(),
                    referred_columns: vec!["customer_id".into()],
                }],
                indexes: vec![],
            },
        );
        let schema = Schema { db_id: "ecommerce".into(), tables, relationships: vec![] };
        let canonical = convert(&schema);
        (schema, canonical)
    }

    #[test]
    fn pruned_rendering_emits_create_table_per_ranked_table() {
        let (schema, canonical) = ecommerce();
        let ranked = vec![
            RankedNode { node_id: "table:customers".into(), score: 0.9, reason: None },
            RankedNode { node_id: "column:customers.name".into(), score: 0.9, reason: None },
            RankedNode { node_id: "column:customers.total_spent".into(), score: 0.8, reason: None },
        ];
        let inputs = PromptInputs {
            schema: &schema,
            canonical: &canonical,
            ranked_nodes: Some(&ranked),
            rag_examples: &[],
            history: &[],
            resolved_question: "top 5 customers by total spent",
            compact_schema_max_columns: 8,
            history_window: 3,
        };
        let prompt = assemble(&inputs);
        assert!(prompt.contains("CREATE TABLE customers (name VARCHAR(255), total_spent DECIMAL(10,2));"));
        assert!(!prompt.contains("CREATE TABLE orders"));
    }

    #[test]
    fn no_ranker_output_falls_back_to_compact_rendering() {
        let (schema, canonical) = ecommerce();
        let inputs = PromptInputs {
            schema: &schema,
            canonical: &canonical,
            ranked_nodes: None,
            rag_examples: &[],
            history: &[],
            resolved_question: "anything",
            compact_schema_max_columns: 2,
            history_window: 3,
        };
        let prompt = assemble(&inputs);
        assert!(prompt.contains("CREATE TABLE customers ("));
        assert!(prompt.contains("CREATE TABLE orders ("));
        let orders_line = prompt.lines().find(|l| l.starts_with("CREATE TABLE orders")).unwrap();
        assert_eq!(orders_line.matches(' ').count() <= 4, true);
    }

    #[test]
    fn rag_and_context_blocks_omitted_when_empty() {
        let (schema, canonical) = ecommerce();
        let inputs = PromptInputs {
            schema: &schema,
            canonical: &canonical,
            ranked_nodes: None,
            rag_examples: &[],
            history: &[],
            resolved_question: "q",
            compact_schema_max_columns: 8,
            history_window: 3,
        };
        let prompt = assemble(&inputs);
        assert!(!prompt.contains("## Examples"));
        assert!(!prompt.contains("## Conversation so far"));
    }

    #[test]
    fn rag_and_context_blocks_present_when_given() {
        let (schema, canonical) = ecommerce();
        let rag = vec![RagExample { question: "top customer".into(), sql: "SELECT 1".into() }];
        let history = vec![ConversationTurn { question: "show all customers".into(), sql: "SELECT * FROM customers".into() }];
        let inputs = PromptInputs {
            schema: &schema,
            canonical: &canonical,
            ranked_nodes: None,
            rag_examples: &rag,
            history: &history,
            resolved_question: "show their orders",
            compact_schema_max_columns: 8,
            history_window: 3,
        };
        let prompt = assemble(&inputs);
        assert!(prompt.contains("## Examples"));
        assert!(prompt.contains("## Conversation so far"));
        assert!(prompt.contains("show all customers"));
    }

    #[test]
    fn identical_inputs_render_byte_identical_prompts() {
        let (schema, canonical) = ecommerce();
        let inputs = PromptInputs {
            schema: &schema,
            canonical: &canonical,
            ranked_nodes: None,
            rag_examples: &[],
            history: &[],
            resolved_question: "q",
            compact_schema_max_columns: 8,
            history_window: 3,
        };
        assert_eq!(assemble(&inputs), assemble(&inputs));
    }
}
