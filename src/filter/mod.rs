//! Filter expression engine.
//!
//! # Responsibilities
//! - Parse boolean conditions written in a small expression language
//! - Type-check them against the block or document environment
//! - Evaluate compiled programs against typed environments
//! - Apply filters to tasks as a short-circuit conjunction
//!
//! # Data Flow
//! ```text
//! condition text
//!     → lexer.rs (tokens with spans)
//!     → parser.rs (Expr tree, precedence climbing)
//!     → compiler.rs (static checks, identifiers bound to env slots)
//!     → program.rs (memoized Node, evaluation entry point)
//!     → eval.rs (tree walk over BlockEnv / DocumentEnv + extra)
//! ```
//!
//! # Design Decisions
//! - Compilation happens at most once per filter; errors are memoized too
//! - Unknown identifiers are compile errors, not runtime nil
//! - `extra` is untyped at compile time and checked when evaluated

pub mod ast;
pub mod compiler;
pub mod env;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod program;
pub mod tokens;
pub mod types;
pub mod value;

pub use env::{BlockEnv, DocumentEnv, FieldType, FilterEnv};
pub use parser::parse_expression;
pub use pipeline::{
    block_env, category_filter, category_filter_config, document_env, filter_tasks,
    pattern_filter, task_filter, TaskFilter, CATEGORY_CONDITION,
};
pub use program::{Filter, FilterError};
pub use value::Value;
