//! The intermediate representation: a closed algebraic description of a
//! SELECT query (spec §3.4).
//!
//! This is the typed shape the Sanitizer normalizes raw LLM JSON into and
//! the Validator checks before the Compiler ever sees it. No stage mutates
//! an `Ir` once it has passed validation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A scalar expression. Column references carry their raw `table.column` (or
/// `*` / `table.*`) text rather than a pre-split pair — the Sanitizer's job
/// is exactly to land arbitrary LLM output in this shape; splitting happens
/// at validation/compilation time, where the schema is available to resolve
/// it unambiguously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Expression {
    Column {
        value: String,
    },
    Literal {
        value: Value,
    },
    Function {
        name: String,
        #[serde(default)]
        args: Vec<Expression>,
    },
    Aggregate {
        name: String,
        #[serde(default)]
        distinct: bool,
        #[serde(default)]
        args: Vec<Expression>,
    },
    Window {
        function: Box<Expression>,
        #[serde(default)]
        partition_by: Vec<Expression>,
        #[serde(default)]
        order_by: Vec<OrderBy>,
    },
    Subquery {
        query: Box<QueryBody>,
    },
}

impl Expression {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expression::Aggregate { .. })
    }

    pub fn is_window(&self) -> bool {
        matches!(self, Expression::Window { .. })
    }

    /// `COUNT(*)` encoded per spec §3.4: `aggregate(name="COUNT",
    /// args=[column("*")], distinct=false)`.
    pub fn count_star() -> Self {
        Expression::Aggregate {
            name: "COUNT".to_string(),
            distinct: false,
            args: vec![Expression::Column { value: "*".to_string() }],
        }
    }

    /// Structural equality ignoring an optional alias; used by the
    /// Validator's GROUP BY / ORDER BY presence checks (spec §4.7 rules 3-4).
    pub fn matches(&self, other: &Expression) -> bool {
        self == other
    }
}

/// Comparison and membership operators (spec §3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
    #[serde(rename = "BETWEEN")]
    Between,
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
}

/// The right-hand side of a [`Predicate`]. Shape depends on `operator`
/// (spec §3.4, §4.7 rule 5): a bare expression for comparisons and `LIKE`, a
/// list for `IN`/`NOT IN`/`BETWEEN` (exactly two entries for `BETWEEN`), or
/// absent for the nullity operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PredicateRhs {
    Single(Expression),
    List(Vec<Expression>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Predicate {
    pub left: Expression,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<PredicateRhs>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Join {
    #[serde(rename = "type")]
    pub join_type: JoinType,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub on: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OrderBy {
    pub column: Expression,
    pub direction: Direction,
}

/// One projected item. `alias` is flattened alongside the expression's own
/// tagged fields so `{"type":"column","value":"t.c","alias":"c"}` round-trips
/// without a nested wrapper object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SelectItem {
    #[serde(flatten)]
    pub expr: Expression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// A named subquery visible to the enclosing query (spec §3.4). CTE bodies
/// may reference earlier CTEs in the same list but never themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Cte {
    pub name: String,
    pub query: Box<QueryBody>,
}

/// The SELECT-shaped core shared by the top-level [`Ir`], CTE bodies, and
/// subquery expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryBody {
    pub select: Vec<SelectItem>,
    pub from_table: String,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default, rename = "where")]
    pub where_: Vec<Predicate>,
    #[serde(default)]
    pub group_by: Vec<Expression>,
    #[serde(default)]
    pub having: Vec<Predicate>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

/// The full intermediate representation of a SELECT query (spec §3.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Ir {
    #[serde(default)]
    pub ctes: Vec<Cte>,
    #[serde(flatten)]
    pub body: QueryBody,
    pub confidence: f64,
    #[serde(default)]
    pub ambiguities: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
}

impl Ir {
    pub fn select(&self) -> &[SelectItem] {
        &self.body.select
    }

    pub fn has_select_aggregate(&self) -> bool {
        self.body.select.iter().any(|item| item.expr.is_aggregate())
    }

    /// The JSON Schema for this type, generated from the same derive the
    /// Sanitizer/Validator's `serde` impls come from rather than
    /// hand-duplicated in the Prompt Assembler's structural description
    /// text (spec §4.4, §4.5).
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Ir)
    }
}
