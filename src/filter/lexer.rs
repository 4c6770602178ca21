use chumsky::prelude::*;

use crate::filter::tokens::{Float, Token};

pub(crate) type Span = std::ops::Range<usize>;

pub(crate) fn lexer() -> impl Parser<char, Vec<(Token, Span)>, Error = Simple<char>> {
    let number = text::int(10)
        .then(just('.').ignore_then(text::digits(10)).or_not())
        .try_map(|(int_part, frac), span: Span| match frac {
            Some(frac) => format!("{}.{}", int_part, frac)
                .parse::<f64>()
                .map(|n| Token::Float(Float(n)))
                .map_err(|_| Simple::custom(span, "invalid number literal")),
            None => int_part
                .parse::<i64>()
                .map(Token::Int)
                .map_err(|_| Simple::custom(span, "integer literal out of range")),
        });

    let escape = just('\\').ignore_then(choice((
        just('\\'),
        just('"'),
        just('\''),
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
    )));

    let quoted = |quote: char| {
        just(quote)
            .ignore_then(
                filter(move |c: &char| *c != '\\' && *c != quote)
                    .or(escape.clone())
                    .repeated()
                    .collect::<String>(),
            )
            .then_ignore(just(quote))
            .map(Token::Str)
    };
    let string = quoted('"').or(quoted('\''));

    let word = text::ident().map(Token::from_word);

    let op = choice::<_, Simple<char>>(vec![
        just("==").to(Token::CmpEq).boxed(),
        just("!=").to(Token::CmpNeq).boxed(),
        just("<=").to(Token::CmpLte).boxed(),
        just(">=").to(Token::CmpGte).boxed(),
        just("&&").to(Token::AndAnd).boxed(),
        just("||").to(Token::OrOr).boxed(),
        just("<").to(Token::CmpLt).boxed(),
        just(">").to(Token::CmpGt).boxed(),
        just("!").to(Token::Bang).boxed(),
        just("+").to(Token::Plus).boxed(),
        just("-").to(Token::Minus).boxed(),
        just("*").to(Token::Star).boxed(),
        just("/").to(Token::Slash).boxed(),
        just("%").to(Token::Percent).boxed(),
        just("(").to(Token::LParen).boxed(),
        just(")").to(Token::RParen).boxed(),
        just("[").to(Token::LBracket).boxed(),
        just("]").to(Token::RBracket).boxed(),
        just("{").to(Token::LBrace).boxed(),
        just("}").to(Token::RBrace).boxed(),
        just(",").to(Token::Comma).boxed(),
        just(".").to(Token::Dot).boxed(),
        just("?").to(Token::Question).boxed(),
        just(":").to(Token::Colon).boxed(),
        just("#").to(Token::Pointer).boxed(),
    ]);

    choice::<_, Simple<char>>((number, string, word, op))
        .map_with_span(|tok, span| (tok, span))
        .padded()
        .repeated()
        .then_ignore(end())
}
