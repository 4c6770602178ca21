use std::fmt;

use chumsky::prelude::*;
use chumsky::Stream;

use crate::filter::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::filter::lexer::{lexer, Span};
use crate::filter::tokens::{Float, Token};

/// A lexing or parsing failure with its character span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {}..{})", self.message, self.span.start, self.span.end)
    }
}

fn to_syntax_error<T: fmt::Display + std::hash::Hash + Eq>(err: Simple<T>) -> SyntaxError {
    SyntaxError {
        message: err.to_string(),
        span: err.span(),
    }
}

/// Parse a condition into an expression tree.
pub fn parse_expression(source: &str) -> Result<Expr, Vec<SyntaxError>> {
    let (tokens, lex_errs) = lexer().parse_recovery(source);
    if !lex_errs.is_empty() {
        return Err(lex_errs.into_iter().map(to_syntax_error).collect());
    }

    let tokens = tokens.unwrap_or_default();
    let len = source.chars().count();
    let stream = Stream::from_iter(len..len + 1, tokens.into_iter());

    expression()
        .then_ignore(end())
        .parse(stream)
        .map_err(|errs| errs.into_iter().map(to_syntax_error).collect())
}

fn boxed(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(op, Box::new(lhs), Box::new(rhs))
}

fn expression() -> impl Parser<Token, Expr, Error = Simple<Token>> + Clone {
    recursive(|expr| {
        let literal = select! {
            Token::Int(n) => Expr::Literal(Literal::Int(n)),
            Token::Float(Float(n)) => Expr::Literal(Literal::Float(n)),
            Token::Str(s) => Expr::Literal(Literal::Str(s)),
            Token::True => Expr::Literal(Literal::Bool(true)),
            Token::False => Expr::Literal(Literal::Bool(false)),
            Token::Nil => Expr::Literal(Literal::Nil),
            Token::Pointer => Expr::Pointer,
        };
        let ident = select! { Token::Ident(s) => s };

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let call_or_ident = ident.clone().then(args.or_not()).map(|(name, args)| match args {
            Some(args) => Expr::Call(name, args),
            None => Expr::Ident(name),
        });

        let list = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(Expr::List);

        let closure = expr
            .clone()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map(|body| Expr::Closure(Box::new(body)));

        let atom = choice::<_, Simple<Token>>((
            literal,
            call_or_ident,
            expr.clone().delimited_by(just(Token::LParen), just(Token::RParen)),
            list,
            closure,
        ))
        .boxed();

        enum Postfix {
            Member(String),
            Index(Expr),
        }

        let postfix = atom
            .then(
                choice::<_, Simple<Token>>((
                    just(Token::Dot).ignore_then(ident).map(Postfix::Member),
                    expr.clone()
                        .delimited_by(just(Token::LBracket), just(Token::RBracket))
                        .map(Postfix::Index),
                ))
                .repeated(),
            )
            .foldl(|target, op| match op {
                Postfix::Member(name) => Expr::Member(Box::new(target), name),
                Postfix::Index(index) => Expr::Index(Box::new(target), Box::new(index)),
            })
            .boxed();

        let unary = choice::<_, Simple<Token>>((
            just(Token::Bang).to(UnaryOp::Not),
            just(Token::KwNot).to(UnaryOp::Not),
            just(Token::Minus).to(UnaryOp::Neg),
        ))
        .repeated()
        .then(postfix)
        .foldr(|op, operand| Expr::Unary(op, Box::new(operand)))
        .boxed();

        let product_op = choice::<_, Simple<Token>>((
            just(Token::Star).to(BinaryOp::Mul),
            just(Token::Slash).to(BinaryOp::Div),
            just(Token::Percent).to(BinaryOp::Mod),
        ));
        let product = unary
            .clone()
            .then(product_op.then(unary).repeated())
            .foldl(|lhs, (op, rhs)| boxed(op, lhs, rhs))
            .boxed();

        let sum_op = choice::<_, Simple<Token>>((
            just(Token::Plus).to(BinaryOp::Add),
            just(Token::Minus).to(BinaryOp::Sub),
        ));
        let sum = product
            .clone()
            .then(sum_op.then(product).repeated())
            .foldl(|lhs, (op, rhs)| boxed(op, lhs, rhs))
            .boxed();

        let cmp_op = choice::<_, Simple<Token>>((
            just(Token::CmpEq).to(BinaryOp::Eq),
            just(Token::CmpNeq).to(BinaryOp::Neq),
            just(Token::CmpLte).to(BinaryOp::Lte),
            just(Token::CmpLt).to(BinaryOp::Lt),
            just(Token::CmpGte).to(BinaryOp::Gte),
            just(Token::CmpGt).to(BinaryOp::Gt),
            just(Token::KwIn).to(BinaryOp::In),
            just(Token::KwContains).to(BinaryOp::Contains),
            just(Token::KwStartsWith).to(BinaryOp::StartsWith),
            just(Token::KwEndsWith).to(BinaryOp::EndsWith),
        ));
        let comparison = sum
            .clone()
            .then(cmp_op.then(sum).repeated())
            .foldl(|lhs, (op, rhs)| boxed(op, lhs, rhs))
            .boxed();

        let and_op = just(Token::AndAnd).or(just(Token::KwAnd)).to(BinaryOp::And);
        let and = comparison
            .clone()
            .then(and_op.then(comparison).repeated())
            .foldl(|lhs, (op, rhs)| boxed(op, lhs, rhs))
            .boxed();

        let or_op = just(Token::OrOr).or(just(Token::KwOr)).to(BinaryOp::Or);
        let or = and
            .clone()
            .then(or_op.then(and).repeated())
            .foldl(|lhs, (op, rhs)| boxed(op, lhs, rhs))
            .boxed();

        or.clone()
            .then(
                just(Token::Question)
                    .ignore_then(expr.clone())
                    .then_ignore(just(Token::Colon))
                    .then(expr)
                    .or_not(),
            )
            .map(|(cond, branches)| match branches {
                Some((then, otherwise)) => {
                    Expr::Conditional(Box::new(cond), Box::new(then), Box::new(otherwise))
                }
                None => cond,
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.into()))
    }

    fn string(s: &str) -> Box<Expr> {
        Box::new(Expr::Literal(Literal::Str(s.into())))
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expression("a || b && !c").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Or,
                ident("a"),
                Box::new(Expr::Binary(
                    BinaryOp::And,
                    ident("b"),
                    Box::new(Expr::Unary(UnaryOp::Not, ident("c"))),
                )),
            )
        );
    }

    #[test]
    fn test_call_and_member() {
        let expr = parse_expression("len(intersection(categories, extra.categories)) > 0").unwrap();
        let Expr::Binary(BinaryOp::Gt, lhs, rhs) = expr else {
            panic!("expected comparison");
        };
        assert_eq!(*rhs, Expr::Literal(Literal::Int(0)));
        assert_eq!(
            *lhs,
            Expr::Call(
                "len".into(),
                vec![Expr::Call(
                    "intersection".into(),
                    vec![
                        Expr::Ident("categories".into()),
                        Expr::Member(ident("extra"), "categories".into()),
                    ],
                )],
            )
        );
    }

    #[test]
    fn test_closure_and_pointer() {
        let expr = parse_expression("any(categories, {# == 'setup'})").unwrap();
        assert_eq!(
            expr,
            Expr::Call(
                "any".into(),
                vec![
                    Expr::Ident("categories".into()),
                    Expr::Closure(Box::new(Expr::Binary(
                        BinaryOp::Eq,
                        Box::new(Expr::Pointer),
                        string("setup"),
                    ))),
                ],
            )
        );
    }

    #[test]
    fn test_index_and_conditional() {
        let expr = parse_expression("categories[0] == 'a' ? true : false").unwrap();
        assert!(matches!(expr, Expr::Conditional(..)));
    }

    #[test]
    fn test_keyword_operators() {
        let expr = parse_expression("name startsWith 'test' or not interactive").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::Or, ..)));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_expression("name ==").is_err());
        assert!(parse_expression("(a").is_err());
        assert!(parse_expression("a b").is_err());
        assert!(parse_expression("'unterminated").is_err());
    }
}
