//! Typed evaluation environments.
//!
//! Each environment is a closed record. Conditions refer to fields by their
//! lower_snake_case tag, which is decoupled from the Rust field name; the
//! compiler resolves tags to slots in [`FilterEnv::FIELDS`] once per filter.

use crate::config::FilterType;
use crate::filter::types::Type;
use crate::filter::value::Value;

/// Declared type of an environment field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    String,
    StringList,
}

impl FieldType {
    pub fn to_type(self) -> Type {
        match self {
            FieldType::Bool => Type::Bool,
            FieldType::String => Type::String,
            FieldType::StringList => Type::List(Box::new(Type::String)),
        }
    }
}

/// One named variable exposed to conditions.
pub struct Field<E> {
    pub tag: &'static str,
    pub ty: FieldType,
    pub get: fn(&E) -> Value,
}

/// An environment a filter condition can be evaluated against.
pub trait FilterEnv: Sized + 'static {
    const KIND: FilterType;
    const FIELDS: &'static [Field<Self>];

    fn value(&self, slot: usize) -> Value {
        (Self::FIELDS[slot].get)(self)
    }
}

/// Tags and types of the environment selected by `kind`.
pub fn schema(kind: FilterType) -> Vec<(&'static str, FieldType)> {
    fn collect<E: FilterEnv>() -> Vec<(&'static str, FieldType)> {
        E::FIELDS.iter().map(|f| (f.tag, f.ty)).collect()
    }
    match kind {
        FilterType::Block => collect::<BlockEnv>(),
        FilterType::Document => collect::<DocumentEnv>(),
    }
}

/// Per-code-block variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockEnv {
    pub language: String,
    pub name: String,
    pub cwd: String,
    pub interactive: bool,
    pub background: bool,
    pub prompt_env: bool,
    pub close_terminal_on_success: bool,
    pub exclude_from_run_all: bool,
    pub categories: Vec<String>,
    pub is_named: bool,
}

impl FilterEnv for BlockEnv {
    const KIND: FilterType = FilterType::Block;
    const FIELDS: &'static [Field<Self>] = &[
        Field { tag: "language", ty: FieldType::String, get: |e| Value::Str(e.language.clone()) },
        Field { tag: "name", ty: FieldType::String, get: |e| Value::Str(e.name.clone()) },
        Field { tag: "cwd", ty: FieldType::String, get: |e| Value::Str(e.cwd.clone()) },
        Field { tag: "interactive", ty: FieldType::Bool, get: |e| Value::Bool(e.interactive) },
        Field { tag: "background", ty: FieldType::Bool, get: |e| Value::Bool(e.background) },
        Field { tag: "prompt_env", ty: FieldType::Bool, get: |e| Value::Bool(e.prompt_env) },
        Field {
            tag: "close_terminal_on_success",
            ty: FieldType::Bool,
            get: |e| Value::Bool(e.close_terminal_on_success),
        },
        Field {
            tag: "exclude_from_run_all",
            ty: FieldType::Bool,
            get: |e| Value::Bool(e.exclude_from_run_all),
        },
        Field {
            tag: "categories",
            ty: FieldType::StringList,
            get: |e| Value::from(e.categories.as_slice()),
        },
        Field { tag: "is_named", ty: FieldType::Bool, get: |e| Value::Bool(e.is_named) },
    ];
}

/// Per-document variables, taken from the front matter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentEnv {
    pub shell: String,
    pub cwd: String,
}

impl FilterEnv for DocumentEnv {
    const KIND: FilterType = FilterType::Document;
    const FIELDS: &'static [Field<Self>] = &[
        Field { tag: "shell", ty: FieldType::String, get: |e| Value::Str(e.shell.clone()) },
        Field { tag: "cwd", ty: FieldType::String, get: |e| Value::Str(e.cwd.clone()) },
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_tags() {
        let tags: Vec<_> = schema(FilterType::Document).into_iter().map(|(t, _)| t).collect();
        assert_eq!(tags, vec!["shell", "cwd"]);

        let block = schema(FilterType::Block);
        assert_eq!(block.len(), BlockEnv::FIELDS.len());
        assert!(block.contains(&("categories", FieldType::StringList)));
        assert!(block.contains(&("close_terminal_on_success", FieldType::Bool)));
    }

    #[test]
    fn test_slot_lookup() {
        let env = BlockEnv {
            name: "build".into(),
            categories: vec!["ci".into()],
            ..Default::default()
        };
        let slot = BlockEnv::FIELDS.iter().position(|f| f.tag == "name").unwrap();
        assert_eq!(env.value(slot), Value::Str("build".into()));
        let slot = BlockEnv::FIELDS.iter().position(|f| f.tag == "categories").unwrap();
        assert_eq!(env.value(slot), Value::List(vec![Value::Str("ci".into())]));
    }
}
