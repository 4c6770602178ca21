//! Type-checks an expression against an environment schema and lowers it
//! into a [`Node`] tree with identifiers bound to environment slots.

use crate::filter::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::filter::env::FieldType;
use crate::filter::types::Type;
use crate::filter::value::Value;

/// Reserved identifier carrying a filter's `extra` map.
pub const EXTRA: &str = "extra";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Len,
    Filter,
    Any,
    All,
    None,
    Count,
    Intersection,
    HasPrefix,
    HasSuffix,
    Lower,
    Upper,
    Trim,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Builtin> {
        Some(match name {
            "len" => Builtin::Len,
            "filter" => Builtin::Filter,
            "any" => Builtin::Any,
            "all" => Builtin::All,
            "none" => Builtin::None,
            "count" => Builtin::Count,
            "intersection" => Builtin::Intersection,
            "hasPrefix" => Builtin::HasPrefix,
            "hasSuffix" => Builtin::HasSuffix,
            "lower" => Builtin::Lower,
            "upper" => Builtin::Upper,
            "trim" => Builtin::Trim,
            _ => return None,
        })
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::Filter => "filter",
            Builtin::Any => "any",
            Builtin::All => "all",
            Builtin::None => "none",
            Builtin::Count => "count",
            Builtin::Intersection => "intersection",
            Builtin::HasPrefix => "hasPrefix",
            Builtin::HasSuffix => "hasSuffix",
            Builtin::Lower => "lower",
            Builtin::Upper => "upper",
            Builtin::Trim => "trim",
        }
    }

    fn takes_predicate(self) -> bool {
        matches!(
            self,
            Builtin::Filter | Builtin::Any | Builtin::All | Builtin::None | Builtin::Count
        )
    }
}

/// Lowered expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Const(Value),
    Var(usize),
    Extra,
    Pointer,
    List(Vec<Node>),
    Member(Box<Node>, String),
    Index(Box<Node>, Box<Node>),
    Not(Box<Node>),
    Neg(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Conditional(Box<Node>, Box<Node>, Box<Node>),
    Call(Builtin, Vec<Node>),
}

/// Compile `expr` to a boolean-valued node.
pub(crate) fn compile_condition(
    expr: &Expr,
    schema: &[(&'static str, FieldType)],
) -> Result<Node, String> {
    let mut compiler = Compiler {
        schema,
        pointers: Vec::new(),
    };
    let (node, ty) = compiler.compile(expr)?;
    if !ty.fits(&Type::Bool) {
        return Err(format!("expected bool, but got {}", ty));
    }
    Ok(node)
}

struct Compiler<'a> {
    schema: &'a [(&'static str, FieldType)],
    /// Element types of the enclosing predicates, innermost last.
    pointers: Vec<Type>,
}

fn mismatch(op: &str, lhs: &Type, rhs: &Type) -> String {
    format!("invalid operation: {} (mismatched types {} and {})", op, lhs, rhs)
}

impl Compiler<'_> {
    fn compile(&mut self, expr: &Expr) -> Result<(Node, Type), String> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Nil => (Node::Const(Value::Nil), Type::Nil),
                Literal::Bool(b) => (Node::Const(Value::Bool(*b)), Type::Bool),
                Literal::Int(n) => (Node::Const(Value::Int(*n)), Type::Int),
                Literal::Float(n) => (Node::Const(Value::Float(*n)), Type::Float),
                Literal::Str(s) => (Node::Const(Value::Str(s.clone())), Type::String),
            }),
            Expr::Ident(name) => self.ident(name),
            Expr::Pointer => match self.pointers.last() {
                Some(ty) => Ok((Node::Pointer, ty.clone())),
                None => Err("# can only be used inside a predicate".to_string()),
            },
            Expr::List(items) => {
                let mut nodes = Vec::with_capacity(items.len());
                let mut elem: Option<Type> = None;
                for item in items {
                    let (node, ty) = self.compile(item)?;
                    elem = Some(match elem {
                        Some(prev) => prev.unify(&ty),
                        None => ty,
                    });
                    nodes.push(node);
                }
                Ok((Node::List(nodes), Type::List(Box::new(elem.unwrap_or(Type::Any)))))
            }
            Expr::Member(target, name) => {
                let (node, ty) = self.compile(target)?;
                if !ty.is_any() {
                    return Err(format!("type {} has no field {}", ty, name));
                }
                Ok((Node::Member(Box::new(node), name.clone()), Type::Any))
            }
            Expr::Index(target, index) => {
                let (target_node, target_ty) = self.compile(target)?;
                let (index_node, index_ty) = self.compile(index)?;
                let ty = match &target_ty {
                    Type::List(elem) if index_ty.fits(&Type::Int) => (**elem).clone(),
                    Type::String if index_ty.fits(&Type::Int) => Type::String,
                    Type::Any => Type::Any,
                    _ => return Err(format!("cannot index {} with {}", target_ty, index_ty)),
                };
                Ok((Node::Index(Box::new(target_node), Box::new(index_node)), ty))
            }
            Expr::Unary(op, operand) => {
                let (node, ty) = self.compile(operand)?;
                match op {
                    UnaryOp::Not if ty.fits(&Type::Bool) => Ok((Node::Not(Box::new(node)), Type::Bool)),
                    UnaryOp::Neg if ty.is_numeric() || ty.is_any() => Ok((Node::Neg(Box::new(node)), ty)),
                    UnaryOp::Not => Err(format!("invalid operation: ! ({})", ty)),
                    UnaryOp::Neg => Err(format!("invalid operation: - ({})", ty)),
                }
            }
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs),
            Expr::Conditional(cond, then, otherwise) => {
                let (cond_node, cond_ty) = self.compile(cond)?;
                if !cond_ty.fits(&Type::Bool) {
                    return Err(format!("non-bool {} used as condition", cond_ty));
                }
                let (then_node, then_ty) = self.compile(then)?;
                let (else_node, else_ty) = self.compile(otherwise)?;
                Ok((
                    Node::Conditional(Box::new(cond_node), Box::new(then_node), Box::new(else_node)),
                    then_ty.unify(&else_ty),
                ))
            }
            Expr::Call(name, args) => self.call(name, args),
            Expr::Closure(_) => Err("closure is only allowed as a predicate argument".to_string()),
        }
    }

    fn ident(&self, name: &str) -> Result<(Node, Type), String> {
        if name == EXTRA {
            return Ok((Node::Extra, Type::Any));
        }
        self.schema
            .iter()
            .position(|(tag, _)| *tag == name)
            .map(|slot| (Node::Var(slot), self.schema[slot].1.to_type()))
            .ok_or_else(|| format!("unknown name {}", name))
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<(Node, Type), String> {
        let (l, lt) = self.compile(lhs)?;
        let (r, rt) = self.compile(rhs)?;
        let (lb, rb) = (Box::new(l), Box::new(r));

        let ty = match op {
            BinaryOp::And | BinaryOp::Or => {
                if !lt.fits(&Type::Bool) || !rt.fits(&Type::Bool) {
                    return Err(mismatch(op.symbol(), &lt, &rt));
                }
                let node = if op == BinaryOp::And { Node::And(lb, rb) } else { Node::Or(lb, rb) };
                return Ok((node, Type::Bool));
            }
            BinaryOp::Eq | BinaryOp::Neq => {
                if !lt.comparable(&rt) {
                    return Err(mismatch(op.symbol(), &lt, &rt));
                }
                Type::Bool
            }
            BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
                let ok = lt.is_any()
                    || rt.is_any()
                    || (lt.is_numeric() && rt.is_numeric())
                    || (lt == Type::String && rt == Type::String);
                if !ok {
                    return Err(mismatch(op.symbol(), &lt, &rt));
                }
                Type::Bool
            }
            BinaryOp::In => {
                match rt.element() {
                    Some(elem) if lt.comparable(&elem) => {}
                    _ => return Err(mismatch(op.symbol(), &lt, &rt)),
                }
                Type::Bool
            }
            BinaryOp::Contains | BinaryOp::StartsWith | BinaryOp::EndsWith => {
                if !lt.fits(&Type::String) || !rt.fits(&Type::String) {
                    return Err(mismatch(op.symbol(), &lt, &rt));
                }
                Type::Bool
            }
            BinaryOp::Add => match (&lt, &rt) {
                (Type::Any, _) | (_, Type::Any) => Type::Any,
                (Type::Int, Type::Int) => Type::Int,
                (a, b) if a.is_numeric() && b.is_numeric() => Type::Float,
                (Type::String, Type::String) => Type::String,
                (Type::List(a), Type::List(b)) => Type::List(Box::new(a.unify(b))),
                _ => return Err(mismatch(op.symbol(), &lt, &rt)),
            },
            BinaryOp::Sub | BinaryOp::Mul => match (&lt, &rt) {
                (Type::Any, _) | (_, Type::Any) => Type::Any,
                (Type::Int, Type::Int) => Type::Int,
                (a, b) if a.is_numeric() && b.is_numeric() => Type::Float,
                _ => return Err(mismatch(op.symbol(), &lt, &rt)),
            },
            BinaryOp::Div => {
                if !(lt.is_numeric() || lt.is_any()) || !(rt.is_numeric() || rt.is_any()) {
                    return Err(mismatch(op.symbol(), &lt, &rt));
                }
                Type::Float
            }
            BinaryOp::Mod => {
                if !lt.fits(&Type::Int) || !rt.fits(&Type::Int) {
                    return Err(mismatch(op.symbol(), &lt, &rt));
                }
                Type::Int
            }
        };

        Ok((Node::Binary(op, lb, rb), ty))
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> Result<(Node, Type), String> {
        let builtin = Builtin::lookup(name).ok_or_else(|| format!("unknown func {}", name))?;

        let arity = match builtin {
            Builtin::Len | Builtin::Lower | Builtin::Upper | Builtin::Trim => 1,
            _ => 2,
        };
        if args.len() != arity {
            return Err(format!(
                "invalid number of arguments for {} (expected {}, got {})",
                builtin.name(),
                arity,
                args.len()
            ));
        }

        if builtin.takes_predicate() {
            return self.predicate_call(builtin, &args[0], &args[1]);
        }

        let mut nodes = Vec::with_capacity(args.len());
        let mut types = Vec::with_capacity(args.len());
        for arg in args {
            let (node, ty) = self.compile(arg)?;
            nodes.push(node);
            types.push(ty);
        }

        let invalid = |types: &[Type]| {
            let list = types.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            format!("invalid argument for {} ({})", builtin.name(), list)
        };

        let ty = match builtin {
            Builtin::Len => match &types[0] {
                Type::String | Type::List(_) | Type::Any => Type::Int,
                _ => return Err(invalid(&types)),
            },
            Builtin::Lower | Builtin::Upper | Builtin::Trim => {
                if !types[0].fits(&Type::String) {
                    return Err(invalid(&types));
                }
                Type::String
            }
            Builtin::HasPrefix | Builtin::HasSuffix => {
                if !types[0].fits(&Type::String) || !types[1].fits(&Type::String) {
                    return Err(invalid(&types));
                }
                Type::Bool
            }
            Builtin::Intersection => match (types[0].element(), types[1].element()) {
                (Some(a), Some(b)) if a.comparable(&b) => Type::List(Box::new(a)),
                _ => return Err(invalid(&types)),
            },
            Builtin::Filter | Builtin::Any | Builtin::All | Builtin::None | Builtin::Count => {
                return self.predicate_call(builtin, &args[0], &args[1]);
            }
        };

        Ok((Node::Call(builtin, nodes), ty))
    }

    fn predicate_call(
        &mut self,
        builtin: Builtin,
        collection: &Expr,
        predicate: &Expr,
    ) -> Result<(Node, Type), String> {
        let (list_node, list_ty) = self.compile(collection)?;
        let elem = list_ty.element().ok_or_else(|| {
            format!("invalid argument for {} ({})", builtin.name(), list_ty)
        })?;

        let body = match predicate {
            Expr::Closure(body) => body.as_ref(),
            other => other,
        };
        self.pointers.push(elem.clone());
        let compiled = self.compile(body);
        self.pointers.pop();
        let (pred_node, pred_ty) = compiled?;

        if !pred_ty.fits(&Type::Bool) {
            return Err(format!(
                "predicate of {} must return bool, got {}",
                builtin.name(),
                pred_ty
            ));
        }

        let ty = match builtin {
            Builtin::Filter => Type::List(Box::new(elem)),
            Builtin::Count => Type::Int,
            _ => Type::Bool,
        };
        Ok((Node::Call(builtin, vec![list_node, pred_node]), ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterType;
    use crate::filter::env::schema;
    use crate::filter::parser::parse_expression;

    fn compile(source: &str) -> Result<Node, String> {
        let expr = parse_expression(source).unwrap();
        compile_condition(&expr, &schema(FilterType::Block))
    }

    #[test]
    fn test_binds_fields_to_slots() {
        let node = compile("name == 'x'").unwrap();
        let slot = schema(FilterType::Block).iter().position(|(t, _)| *t == "name").unwrap();
        assert_eq!(
            node,
            Node::Binary(
                BinaryOp::Eq,
                Box::new(Node::Var(slot)),
                Box::new(Node::Const(Value::Str("x".into())))
            )
        );
    }

    #[test]
    fn test_accepts_valid_conditions() {
        for source in [
            "language != ''",
            "!hasPrefix(name, 'test')",
            "len(intersection(categories, extra.categories)) > 0",
            "any(categories, {# startsWith 'ci'})",
            "all(categories, # != 'slow') and not background",
            "count(categories, true) >= 2",
            "len(filter(categories, # in ['a', 'b'])) == 1",
            "extra.enabled",
            "lower(name) contains 'x' ? interactive : prompt_env",
            "categories[0] == 'setup'",
            "is_named || exclude_from_run_all",
        ] {
            assert!(compile(source).is_ok(), "{} should compile", source);
        }
    }

    #[test]
    fn test_rejects_unknown_names() {
        assert_eq!(compile("shell == 'bash'").unwrap_err(), "unknown name shell");
        assert!(compile("nope(name)").unwrap_err().starts_with("unknown func"));
    }

    #[test]
    fn test_rejects_non_bool_result() {
        assert_eq!(compile("name").unwrap_err(), "expected bool, but got string");
        assert_eq!(compile("len(name)").unwrap_err(), "expected bool, but got int");
    }

    #[test]
    fn test_rejects_type_mismatch() {
        assert!(compile("name == 1").unwrap_err().contains("mismatched types string and int"));
        assert!(compile("interactive && name").is_err());
        assert!(compile("name.field == ''").is_err());
        assert!(compile("hasPrefix(categories, 'x')").is_err());
    }

    #[test]
    fn test_rejects_bad_arity_and_stray_pointer() {
        assert!(compile("len(name, cwd) > 0").unwrap_err().contains("invalid number of arguments"));
        assert!(compile("# == ''").is_err());
        assert!(compile("any(name, # == 'x')").is_err());
    }
}
