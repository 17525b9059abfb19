//! The typed intermediate representation and the three stages that produce,
//! sanitize, and validate it before it reaches the compiler (spec §3.4,
//! §4.6, §4.7, §4.11).

pub mod compiler;
pub mod sanitizer;
pub mod types;
pub mod validator;

pub use compiler::{compile, CompiledSql, Dialect};
pub use sanitizer::sanitize;
pub use types::{
    Cte, Direction, Expression, Ir, Join, JoinType, Operator, OrderBy, Predicate, PredicateRhs,
    QueryBody, SelectItem,
};
pub use validator::{validate, ValidatedIr, ValidationError, ValidationErrorKind};
