//! Filters with compile-once semantics.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use thiserror::Error;

use crate::config::{FilterConfig, FilterType};
use crate::error::ErrorKind;
use crate::filter::compiler::{compile_condition, Node};
use crate::filter::env::{schema, FilterEnv};
use crate::filter::eval::Evaluator;
use crate::filter::parser::parse_expression;
use crate::filter::value::Value;

/// Errors raised while compiling or evaluating a filter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("failed to compile filter {condition:?}: {message}")]
    Compile { condition: String, message: String },

    #[error("failed to evaluate filter {condition:?}: {message}")]
    Runtime { condition: String, message: String },

    #[error("{expected:?} filter {condition:?} evaluated against a {found:?} environment")]
    EnvMismatch {
        condition: String,
        expected: FilterType,
        found: FilterType,
    },
}

impl FilterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FilterError::Compile { .. } => ErrorKind::FilterCompile,
            FilterError::Runtime { .. } | FilterError::EnvMismatch { .. } => ErrorKind::FilterRuntime,
        }
    }
}

/// A boolean predicate over a block or document environment.
///
/// The condition is compiled on first use; the program, or the compile
/// error, is kept for the lifetime of the filter.
#[derive(Debug)]
pub struct Filter {
    kind: FilterType,
    condition: String,
    extra: Value,
    program: OnceLock<Result<Node, FilterError>>,
}

impl Filter {
    pub fn new(
        kind: FilterType,
        condition: impl Into<String>,
        extra: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let extra = Value::Map(extra.into_iter().map(|(k, v)| (k, Value::from(v))).collect());
        Self {
            kind,
            condition: condition.into(),
            extra,
            program: OnceLock::new(),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.kind, config.condition.clone(), config.extra.clone())
    }

    pub fn kind(&self) -> FilterType {
        self.kind
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    /// Compile now instead of on first evaluation.
    pub fn compile(&self) -> Result<(), FilterError> {
        self.program().map(|_| ())
    }

    fn program(&self) -> Result<&Node, FilterError> {
        self.program
            .get_or_init(|| {
                let compile_error = |message: String| FilterError::Compile {
                    condition: self.condition.clone(),
                    message,
                };
                let expr = parse_expression(&self.condition).map_err(|errs| {
                    compile_error(
                        errs.iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join("; "),
                    )
                })?;
                compile_condition(&expr, &schema(self.kind)).map_err(compile_error)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Evaluate against `env`, which must match the filter's type.
    pub fn evaluate<E: FilterEnv>(&self, env: &E) -> Result<bool, FilterError> {
        if E::KIND != self.kind {
            return Err(FilterError::EnvMismatch {
                condition: self.condition.clone(),
                expected: self.kind,
                found: E::KIND,
            });
        }

        let program = self.program()?;
        let runtime_error = |message: String| FilterError::Runtime {
            condition: self.condition.clone(),
            message,
        };

        match Evaluator::new(env, &self.extra).eval(program).map_err(runtime_error)? {
            Value::Bool(b) => Ok(b),
            other => Err(runtime_error(format!("expected bool, but got {}", other.type_name()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::env::{BlockEnv, DocumentEnv};

    fn block(condition: &str) -> Filter {
        Filter::new(FilterType::Block, condition, BTreeMap::new())
    }

    #[test]
    fn test_evaluate_block() {
        let filter = block("language != '' && !hasPrefix(name, 'test')");
        let env = BlockEnv {
            name: "a".into(),
            language: "sh".into(),
            ..Default::default()
        };
        assert_eq!(filter.evaluate(&env), Ok(true));
        assert_eq!(filter.evaluate(&env), Ok(true));
    }

    #[test]
    fn test_compile_error_is_memoized() {
        let filter = block("name ==");
        let env = BlockEnv::default();
        let first = filter.evaluate(&env).unwrap_err();
        let second = filter.evaluate(&env).unwrap_err();
        assert_eq!(first, second);
        assert_eq!(first.kind(), ErrorKind::FilterCompile);
        assert!(filter.compile().is_err());
    }

    #[test]
    fn test_document_filter_rejects_block_fields() {
        let filter = Filter::new(FilterType::Document, "name == 'x'", BTreeMap::new());
        assert!(matches!(filter.compile(), Err(FilterError::Compile { .. })));

        let filter = Filter::new(FilterType::Document, "shell == 'bash'", BTreeMap::new());
        let env = DocumentEnv {
            shell: "bash".into(),
            cwd: "/".into(),
        };
        assert_eq!(filter.evaluate(&env), Ok(true));
    }

    #[test]
    fn test_env_mismatch() {
        let filter = block("true");
        let err = filter.evaluate(&DocumentEnv::default()).unwrap_err();
        assert!(matches!(err, FilterError::EnvMismatch { .. }));
    }

    #[test]
    fn test_runtime_error_kind() {
        let mut extra = BTreeMap::new();
        extra.insert("flag".to_string(), serde_json::json!("not-a-bool"));
        let filter = Filter::new(FilterType::Block, "extra.flag", extra);
        let err = filter.evaluate(&BlockEnv::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FilterRuntime);
    }
}
