//! Tree-walking evaluator for compiled conditions.

use crate::filter::ast::BinaryOp;
use crate::filter::compiler::{Builtin, Node};
use crate::filter::env::FilterEnv;
use crate::filter::value::Value;

pub(crate) struct Evaluator<'a, E> {
    env: &'a E,
    extra: &'a Value,
    pointers: Vec<Value>,
}

fn type_error(op: &str, lhs: &Value, rhs: &Value) -> String {
    format!(
        "invalid operation: {} (mismatched types {} and {})",
        op,
        lhs.type_name(),
        rhs.type_name()
    )
}

fn expect_bool(value: Value, context: &str) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(format!("{}: expected bool, but got {}", context, other.type_name())),
    }
}

fn expect_str<'v>(value: &'v Value, context: &str) -> Result<&'v str, String> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(format!("{}: expected string, but got {}", context, other.type_name())),
    }
}

fn expect_list(value: Value, context: &str) -> Result<Vec<Value>, String> {
    match value {
        Value::List(items) => Ok(items),
        Value::Nil => Ok(Vec::new()),
        other => Err(format!("{}: expected array, but got {}", context, other.type_name())),
    }
}

impl<'a, E: FilterEnv> Evaluator<'a, E> {
    pub(crate) fn new(env: &'a E, extra: &'a Value) -> Self {
        Self {
            env,
            extra,
            pointers: Vec::new(),
        }
    }

    pub(crate) fn eval(&mut self, node: &Node) -> Result<Value, String> {
        match node {
            Node::Const(value) => Ok(value.clone()),
            Node::Var(slot) => Ok(self.env.value(*slot)),
            Node::Extra => Ok(self.extra.clone()),
            Node::Pointer => self
                .pointers
                .last()
                .cloned()
                .ok_or_else(|| "# used outside of a predicate".to_string()),
            Node::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Node::Member(target, name) => match self.eval(target)? {
                Value::Map(mut map) => Ok(map.remove(name).unwrap_or(Value::Nil)),
                other => Err(format!("cannot fetch {} from {}", name, other.type_name())),
            },
            Node::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                self.index(target, index)
            }
            Node::Not(operand) => Ok(Value::Bool(!expect_bool(self.eval(operand)?, "!")?)),
            Node::Neg(operand) => match self.eval(operand)? {
                Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
                Value::Float(n) => Ok(Value::Float(-n)),
                other => Err(format!("invalid operation: - ({})", other.type_name())),
            },
            Node::And(lhs, rhs) => {
                if !expect_bool(self.eval(lhs)?, "&&")? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(expect_bool(self.eval(rhs)?, "&&")?))
            }
            Node::Or(lhs, rhs) => {
                if expect_bool(self.eval(lhs)?, "||")? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(expect_bool(self.eval(rhs)?, "||")?))
            }
            Node::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, lhs, rhs)
            }
            Node::Conditional(cond, then, otherwise) => {
                if expect_bool(self.eval(cond)?, "?:")? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Node::Call(builtin, args) => self.call(*builtin, args),
        }
    }

    fn index(&self, target: Value, index: Value) -> Result<Value, String> {
        match (target, index) {
            (Value::List(mut items), Value::Int(i)) => {
                let len = items.len() as i64;
                let pos = if i < 0 { len + i } else { i };
                if pos < 0 || pos >= len {
                    return Err(format!("index out of range: {} (array length is {})", i, len));
                }
                Ok(items.swap_remove(pos as usize))
            }
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let len = chars.len() as i64;
                let pos = if i < 0 { len + i } else { i };
                if pos < 0 || pos >= len {
                    return Err(format!("index out of range: {} (string length is {})", i, len));
                }
                Ok(Value::Str(chars[pos as usize].to_string()))
            }
            (Value::Map(mut map), Value::Str(key)) => Ok(map.remove(&key).unwrap_or(Value::Nil)),
            (target, index) => Err(format!(
                "cannot index {} with {}",
                target.type_name(),
                index.type_name()
            )),
        }
    }

    fn call(&mut self, builtin: Builtin, args: &[Node]) -> Result<Value, String> {
        match builtin {
            Builtin::Filter | Builtin::Any | Builtin::All | Builtin::None | Builtin::Count => {
                let items = expect_list(self.eval(&args[0])?, builtin.name())?;
                self.predicate(builtin, items, &args[1])
            }
            Builtin::Len => match self.eval(&args[0])? {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                Value::Map(map) => Ok(Value::Int(map.len() as i64)),
                Value::Nil => Ok(Value::Int(0)),
                other => Err(format!("invalid argument for len (type {})", other.type_name())),
            },
            Builtin::Lower | Builtin::Upper | Builtin::Trim => {
                let value = self.eval(&args[0])?;
                let s = expect_str(&value, builtin.name())?;
                Ok(Value::Str(match builtin {
                    Builtin::Lower => s.to_lowercase(),
                    Builtin::Upper => s.to_uppercase(),
                    _ => s.trim().to_string(),
                }))
            }
            Builtin::HasPrefix | Builtin::HasSuffix => {
                let value = self.eval(&args[0])?;
                let affix = self.eval(&args[1])?;
                let s = expect_str(&value, builtin.name())?;
                let affix = expect_str(&affix, builtin.name())?;
                Ok(Value::Bool(if builtin == Builtin::HasPrefix {
                    s.starts_with(affix)
                } else {
                    s.ends_with(affix)
                }))
            }
            Builtin::Intersection => {
                let left = expect_list(self.eval(&args[0])?, "intersection")?;
                let right = expect_list(self.eval(&args[1])?, "intersection")?;
                let mut out: Vec<Value> = Vec::new();
                for item in left {
                    if right.iter().any(|r| r.loose_eq(&item)) && !out.iter().any(|o| o.loose_eq(&item)) {
                        out.push(item);
                    }
                }
                Ok(Value::List(out))
            }
        }
    }

    fn predicate(&mut self, builtin: Builtin, items: Vec<Value>, body: &Node) -> Result<Value, String> {
        let mut kept = Vec::new();
        let mut matched = 0i64;

        for item in items {
            self.pointers.push(item.clone());
            let result = self.eval(body);
            self.pointers.pop();
            let hit = expect_bool(result?, builtin.name())?;

            match builtin {
                Builtin::Any if hit => return Ok(Value::Bool(true)),
                Builtin::All if !hit => return Ok(Value::Bool(false)),
                Builtin::None if hit => return Ok(Value::Bool(false)),
                Builtin::Filter if hit => kept.push(item),
                Builtin::Count if hit => matched += 1,
                _ => {}
            }
        }

        Ok(match builtin {
            Builtin::Any => Value::Bool(false),
            Builtin::All | Builtin::None => Value::Bool(true),
            Builtin::Count => Value::Int(matched),
            _ => Value::List(kept),
        })
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, String> {
    let symbol = op.symbol();
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs.loose_eq(&rhs))),
        BinaryOp::Neq => Ok(Value::Bool(!lhs.loose_eq(&rhs))),
        BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
            let ordering = match (&lhs, &rhs) {
                (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
                (a, b) => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => return Err(type_error(symbol, &lhs, &rhs)),
                },
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Lte => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::In => match rhs {
            Value::List(items) => Ok(Value::Bool(items.iter().any(|item| item.loose_eq(&lhs)))),
            Value::Map(map) => match lhs {
                Value::Str(key) => Ok(Value::Bool(map.contains_key(&key))),
                other => Err(type_error(symbol, &other, &Value::Map(map))),
            },
            Value::Nil => Ok(Value::Bool(false)),
            other => Err(type_error(symbol, &lhs, &other)),
        },
        BinaryOp::Contains | BinaryOp::StartsWith | BinaryOp::EndsWith => match (&lhs, &rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(match op {
                BinaryOp::Contains => a.contains(b.as_str()),
                BinaryOp::StartsWith => a.starts_with(b.as_str()),
                _ => a.ends_with(b.as_str()),
            })),
            _ => Err(type_error(symbol, &lhs, &rhs)),
        },
        BinaryOp::Add => match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (a, b) => arithmetic(symbol, &a, &b, |x, y| x + y),
        },
        BinaryOp::Sub => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
            _ => arithmetic(symbol, &lhs, &rhs, |x, y| x - y),
        },
        BinaryOp::Mul => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(*b))),
            _ => arithmetic(symbol, &lhs, &rhs, |x, y| x * y),
        },
        BinaryOp::Div => arithmetic(symbol, &lhs, &rhs, |x, y| x / y),
        BinaryOp::Mod => match (&lhs, &rhs) {
            (Value::Int(_), Value::Int(0)) => Err("integer divide by zero".to_string()),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_rem(*b))),
            _ => Err(type_error(symbol, &lhs, &rhs)),
        },
        BinaryOp::And | BinaryOp::Or => Err(format!("{} must be short-circuited", symbol)),
    }
}

fn arithmetic(symbol: &str, lhs: &Value, rhs: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value, String> {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(x), Some(y)) => Ok(Value::Float(f(x, y))),
        _ => Err(type_error(symbol, lhs, rhs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::compiler::compile_condition;
    use crate::filter::env::{schema, BlockEnv};
    use crate::filter::parser::parse_expression;
    use crate::config::FilterType;
    use serde_json::json;

    fn eval_with(source: &str, env: &BlockEnv, extra: serde_json::Value) -> Result<Value, String> {
        let expr = parse_expression(source).unwrap();
        let node = compile_condition(&expr, &schema(FilterType::Block))?;
        let extra = Value::from(extra);
        Evaluator::new(env, &extra).eval(&node)
    }

    fn env() -> BlockEnv {
        BlockEnv {
            language: "sh".into(),
            name: "setup-db".into(),
            categories: vec!["setup".into(), "db".into()],
            interactive: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_intersection_with_extra() {
        let cond = "len(intersection(categories, extra.categories)) > 0";
        assert_eq!(
            eval_with(cond, &env(), json!({"categories": ["teardown", "setup"]})),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            eval_with(cond, &env(), json!({"categories": ["build"]})),
            Ok(Value::Bool(false))
        );
    }

    #[test]
    fn test_predicates() {
        let e = env();
        assert_eq!(eval_with("any(categories, # == 'db')", &e, json!({})), Ok(Value::Bool(true)));
        assert_eq!(eval_with("all(categories, {len(#) > 2})", &e, json!({})), Ok(Value::Bool(false)));
        assert_eq!(eval_with("none(categories, # == 'x')", &e, json!({})), Ok(Value::Bool(true)));
        assert_eq!(eval_with("count(categories, true) == 2", &e, json!({})), Ok(Value::Bool(true)));
        assert_eq!(
            eval_with("filter(categories, # startsWith 's')[0] == 'setup'", &e, json!({})),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn test_short_circuit_skips_runtime_error() {
        let e = env();
        assert_eq!(
            eval_with("false && extra.missing.field == 1", &e, json!({})),
            Ok(Value::Bool(false))
        );
        assert!(eval_with("true && extra.missing.field == 1", &e, json!({})).is_err());
    }

    #[test]
    fn test_dynamic_type_errors() {
        let e = env();
        let err = eval_with("extra.flag", &e, json!({"flag": "yes"})).unwrap_err();
        assert!(err.contains("expected bool"));
        assert!(eval_with("name startsWith extra.n", &e, json!({"n": 1})).is_err());
        assert!(eval_with("categories[5] == ''", &e, json!({})).unwrap_err().contains("index out of range"));
    }

    #[test]
    fn test_arithmetic_and_strings() {
        let e = env();
        assert_eq!(eval_with("1 + 2 * 3 == 7", &e, json!({})), Ok(Value::Bool(true)));
        assert_eq!(eval_with("7 / 2 == 3.5", &e, json!({})), Ok(Value::Bool(true)));
        assert_eq!(eval_with("7 % 2 == 1", &e, json!({})), Ok(Value::Bool(true)));
        assert_eq!(eval_with("name + '!' == 'setup-db!'", &e, json!({})), Ok(Value::Bool(true)));
        assert_eq!(eval_with("categories[-1] == 'db'", &e, json!({})), Ok(Value::Bool(true)));
        assert_eq!(eval_with("upper(language) == 'SH'", &e, json!({})), Ok(Value::Bool(true)));
        assert!(eval_with("extra.n % 0 == 0", &e, json!({"n": 4})).is_err());
    }

    #[test]
    fn test_in_operator() {
        let e = env();
        assert_eq!(eval_with("language in ['sh', 'bash']", &e, json!({})), Ok(Value::Bool(true)));
        assert_eq!(eval_with("'k' in extra", &e, json!({"k": 1})), Ok(Value::Bool(true)));
        assert_eq!(eval_with("'db' in extra.tags", &e, json!({})), Ok(Value::Bool(false)));
    }
}
