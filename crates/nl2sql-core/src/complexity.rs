//! The Complexity Analyzer (spec §4.9): a weighted structural score over a
//! compiled [`Ir`], used to flag queries worth extra scrutiny or a slower
//! model tier. Advisory only — never blocks compilation.

use crate::ir::Ir;

const JOIN_WEIGHT: u32 = 2;
const AGGREGATE_WEIGHT: u32 = 5;
const CTE_WEIGHT: u32 = 5;
const SUBQUERY_WEIGHT: u32 = 10;
const GROUP_BY_WEIGHT: u32 = 1;
const HAVING_WEIGHT: u32 = 3;

const SIMPLE_THRESHOLD: u32 = 10;
const MODERATE_THRESHOLD: u32 = 25;
const COMPLEX_THRESHOLD: u32 = 50;

const MANY_TABLES_THRESHOLD: usize = 4;
const MANY_CTES_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityBand {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexityReport {
    pub score: u32,
    pub band: ComplexityBand,
    pub warnings: Vec<String>,
}

/// Scores `ir`'s structural complexity (spec §4.9).
pub fn analyze(ir: &Ir) -> ComplexityReport {
    let mut score = 0u32;
    let mut table_count = 1; // from_table
    let mut has_subquery = false;

    score += ir.body.joins.len() as u32 * JOIN_WEIGHT;
    table_count += ir.body.joins.len();

    if ir.has_select_aggregate() {
        score += AGGREGATE_WEIGHT;
    }

    score += ir.ctes.len() as u32 * CTE_WEIGHT;

    for cte in &ir.ctes {
        has_subquery |= body_contains_subquery(&cte.query);
    }
    has_subquery |= body_contains_subquery(&ir.body);
    if has_subquery {
        score += SUBQUERY_WEIGHT;
    }

    score += ir.body.group_by.len() as u32 * GROUP_BY_WEIGHT;

    if !ir.body.having.is_empty() {
        score += HAVING_WEIGHT;
    }

    let band = if score < SIMPLE_THRESHOLD {
        ComplexityBand::Simple
    } else if score < MODERATE_THRESHOLD {
        ComplexityBand::Moderate
    } else if score < COMPLEX_THRESHOLD {
        ComplexityBand::Complex
    } else {
        ComplexityBand::VeryComplex
    };

    let mut warnings = Vec::new();
    if table_count >= MANY_TABLES_THRESHOLD {
        warnings.push(format!("query touches {table_count} tables"));
    }
    if ir.ctes.len() >= MANY_CTES_THRESHOLD {
        warnings.push(format!("query defines {} CTEs", ir.ctes.len()));
    }

    ComplexityReport { score, band, warnings }
}

fn body_contains_subquery(body: &crate::ir::QueryBody) -> bool {
    let in_select = body.select.iter().any(|item| expr_contains_subquery(&item.expr));
    let in_where = body.where_.iter().any(predicate_contains_subquery);
    let in_having = body.having.iter().any(predicate_contains_subquery);
    in_select || in_where || in_having
}

fn expr_contains_subquery(expr: &crate::ir::Expression) -> bool {
    use crate::ir::Expression;
    match expr {
        Expression::Subquery { .. } => true,
        Expression::Function { args, .. } | Expression::Aggregate { args, .. } => {
            args.iter().any(expr_contains_subquery)
        }
        Expression::Window { function, .. } => expr_contains_subquery(function),
        Expression::Column { .. } | Expression::Literal { .. } => false,
    }
}

fn predicate_contains_subquery(predicate: &crate::ir::Predicate) -> bool {
    use crate::ir::PredicateRhs;
    let left = expr_contains_subquery(&predicate.left);
    let right = match &predicate.right {
        Some(PredicateRhs::Single(e)) => expr_contains_subquery(e),
        Some(PredicateRhs::List(es)) => es.iter().any(expr_contains_subquery),
        None => false,
    };
    left || right
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Expression, Ir, Join, JoinType, Predicate, PredicateRhs, QueryBody, SelectItem};

    fn base_ir() -> Ir {
        Ir {
            ctes: vec![],
            body: QueryBody {
                select: vec![SelectItem { expr: Expression::Column { value: "c.name".into() }, alias: None }],
                from_table: "customers".into(),
                joins: vec![],
                where_: vec![],
                group_by: vec![],
                having: vec![],
                order_by: vec![],
                limit: None,
                offset: None,
            },
            confidence: 0.9,
            ambiguities: vec![],
            questions: vec![],
        }
    }

    #[test]
    fn bare_select_is_simple() {
        let report = analyze(&base_ir());
        assert_eq!(report.score, 0);
        assert_eq!(report.band, ComplexityBand::Simple);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn joins_and_aggregate_raise_score() {
        let mut ir = base_ir();
        ir.body.joins = vec![
            Join { join_type: JoinType::Inner, table: "orders".into(), alias: None, on: vec![] },
            Join { join_type: JoinType::Inner, table: "products".into(), alias: None, on: vec![] },
        ];
        ir.body.select[0].expr = Expression::count_star();
        let report = analyze(&ir);
        assert_eq!(report.score, JOIN_WEIGHT * 2 + AGGREGATE_WEIGHT);
    }

    #[test]
    fn many_tables_emits_warning() {
        let mut ir = base_ir();
        ir.body.joins = vec![
            Join { join_type: JoinType::Inner, table: "a".into(), alias: None, on: vec![] },
            Join { join_type: JoinType::Inner, table: "b".into(), alias: None, on: vec![] },
            Join { join_type: JoinType::Inner, table: "c".into(), alias: None, on: vec![] },
        ];
        let report = analyze(&ir);
        assert!(report.warnings.iter().any(|w| w.contains("4 tables")));
    }

    #[test]
    fn subquery_in_where_is_detected() {
        let mut ir = base_ir();
        ir.body.where_ = vec![Predicate {
            left: Expression::Column { value: "c.id".into() },
            operator: crate::ir::Operator::In,
            right: Some(PredicateRhs::Single(Expression::Subquery {
                query: Box::new(QueryBody {
                    select: vec![SelectItem { expr: Expression::Column { value: "o.customer_id".into() }, alias: None }],
                    from_table: "orders".into(),
                    joins: vec![],
                    where_: vec![],
                    group_by: vec![],
                    having: vec![],
                    order_by: vec![],
                    limit: None,
                    offset: None,
                }),
            })),
        }];
        let report = analyze(&ir);
        assert_eq!(report.score, SUBQUERY_WEIGHT);
    }

    #[test]
    fn very_complex_band_at_high_score() {
        let mut ir = base_ir();
        ir.ctes = vec![
            crate::ir::Cte { name: "a".into(), query: Box::new(base_ir().body) },
            crate::ir::Cte { name: "b".into(), query: Box::new(base_ir().body) },
            crate::ir::Cte { name: "c".into(), query: Box::new(base_ir().body) },
        ];
        ir.body.joins = (0..15)
            .map(|i| Join { join_type: JoinType::Inner, table: format!("t{i}"), alias: None, on: vec![] })
            .collect();
        ir.body.select[0].expr = Expression::count_star();
        ir.body.having = vec![Predicate {
            left: Expression::count_star(),
            operator: crate::ir::Operator::Gt,
            right: Some(PredicateRhs::Single(Expression::Literal { value: serde_json::json!(1) })),
        }];
        let report = analyze(&ir);
        assert_eq!(report.band, ComplexityBand::VeryComplex);
    }
}
