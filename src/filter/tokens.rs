use std::fmt;
use std::hash::{Hash, Hasher};

/// Float literal with bitwise equality so tokens can be hashed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Float(pub f64);

impl PartialEq for Float {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Float {}

impl Hash for Float {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.to_bits());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Token {
    Ident(String),
    Int(i64),
    Float(Float),
    Str(String),
    True,
    False,
    Nil,
    KwAnd,
    KwOr,
    KwNot,
    KwIn,
    KwContains,
    KwStartsWith,
    KwEndsWith,
    CmpEq,
    CmpNeq,
    CmpLt,
    CmpLte,
    CmpGt,
    CmpGte,
    AndAnd,
    OrOr,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Question,
    Colon,
    Pointer,
}

impl Token {
    /// Map an identifier-shaped word to its keyword token, if any.
    pub(crate) fn from_word(word: String) -> Token {
        match word.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "nil" => Token::Nil,
            "and" => Token::KwAnd,
            "or" => Token::KwOr,
            "not" => Token::KwNot,
            "in" => Token::KwIn,
            "contains" => Token::KwContains,
            "startsWith" => Token::KwStartsWith,
            "endsWith" => Token::KwEndsWith,
            _ => Token::Ident(word),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{}", s),
            Token::Int(n) => write!(f, "{}", n),
            Token::Float(n) => write!(f, "{}", n.0),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Nil => write!(f, "nil"),
            Token::KwAnd => write!(f, "and"),
            Token::KwOr => write!(f, "or"),
            Token::KwNot => write!(f, "not"),
            Token::KwIn => write!(f, "in"),
            Token::KwContains => write!(f, "contains"),
            Token::KwStartsWith => write!(f, "startsWith"),
            Token::KwEndsWith => write!(f, "endsWith"),
            Token::CmpEq => write!(f, "=="),
            Token::CmpNeq => write!(f, "!="),
            Token::CmpLt => write!(f, "<"),
            Token::CmpLte => write!(f, "<="),
            Token::CmpGt => write!(f, ">"),
            Token::CmpGte => write!(f, ">="),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Bang => write!(f, "!"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Question => write!(f, "?"),
            Token::Colon => write!(f, ":"),
            Token::Pointer => write!(f, "#"),
        }
    }
}
