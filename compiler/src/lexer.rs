// Lexer for Arc .arc source files.
//
// Tokenizes flow statements, function and sequence declarations, and the
// statement language of function bodies. Uses the `logos` crate for
// DFA-based lexing.
//
// Preconditions: input is valid UTF-8.
// Postconditions: tokens carry the same `SimpleSpan`s the parser and
//                 diagnostics use.
// Failure modes: each unmatched character becomes one `LexError`.
// Side effects: none.

use logos::Logos;
use std::fmt;

use crate::ast::{PrimType, Span};

/// A character no token matches. Lexing skips it and carries on.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// A number immediately followed by a unit name (`300ms`, `5.0km`).
#[derive(Debug, Clone, PartialEq)]
pub struct UnitLiteral {
    pub value: f64,
    /// True when the number was written without a fractional part.
    pub integral: bool,
    pub unit: String,
}

/// Arc token types.
///
/// Identifiers carry no value; use the span to retrieve the text from the
/// source.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // ── Keywords ──
    #[token("func")]
    Func,
    #[token("sequence")]
    Sequence,
    #[token("stage")]
    Stage,
    #[token("next")]
    Next,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("return")]
    Return,
    #[token("chan")]
    Chan,
    #[token("series")]
    Series,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,

    /// Primitive type name.
    #[token("i8", |_| PrimType::I8)]
    #[token("i16", |_| PrimType::I16)]
    #[token("i32", |_| PrimType::I32)]
    #[token("i64", |_| PrimType::I64)]
    #[token("u8", |_| PrimType::U8)]
    #[token("u16", |_| PrimType::U16)]
    #[token("u32", |_| PrimType::U32)]
    #[token("u64", |_| PrimType::U64)]
    #[token("f32", |_| PrimType::F32)]
    #[token("f64", |_| PrimType::F64)]
    #[token("str", |_| PrimType::Str)]
    #[token("timestamp", |_| PrimType::TimeStamp)]
    #[token("timespan", |_| PrimType::TimeSpan)]
    Prim(PrimType),

    // ── Flow and declaration symbols ──
    #[token("->")]
    Arrow,
    #[token("=>")]
    FatArrow,
    #[token("<-")]
    LArrow,
    #[token(":=")]
    Declare,
    #[token("$=")]
    StatefulDeclare,

    // ── Assignment ──
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,

    // ── Operators ──
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,

    // ── Delimiters ──
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,

    // ── Literals ──
    //
    // A unit literal is the longest match for `300ms`, so it wins over the
    // bare integer `300` followed by the identifier `ms`.
    /// Number with a unit suffix.
    #[regex(r"[0-9]+(\.[0-9]+)?[a-zA-Z_]+", parse_unit_literal)]
    UnitLit(UnitLiteral),

    /// Floating-point literal with a fractional part.
    #[regex(r"[0-9]+\.[0-9]+", parse_float)]
    Float(f64),

    /// Unsigned integer literal. Negative values are unary minus.
    #[regex(r"[0-9]+", parse_int)]
    Int(u64),

    /// String literal with `\"`, `\\`, `\n`, and `\t` escapes.
    #[regex(r#""([^"\\]|\\.)*""#, parse_string)]
    StringLit(String),

    // ── Identifier ──
    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Func => write!(f, "func"),
            Token::Sequence => write!(f, "sequence"),
            Token::Stage => write!(f, "stage"),
            Token::Next => write!(f, "next"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::Return => write!(f, "return"),
            Token::Chan => write!(f, "chan"),
            Token::Series => write!(f, "series"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::Prim(p) => write!(f, "{p}"),
            Token::Arrow => write!(f, "->"),
            Token::FatArrow => write!(f, "=>"),
            Token::LArrow => write!(f, "<-"),
            Token::Declare => write!(f, ":="),
            Token::StatefulDeclare => write!(f, "$="),
            Token::Assign => write!(f, "="),
            Token::PlusAssign => write!(f, "+="),
            Token::MinusAssign => write!(f, "-="),
            Token::StarAssign => write!(f, "*="),
            Token::SlashAssign => write!(f, "/="),
            Token::PercentAssign => write!(f, "%="),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::LtEq => write!(f, "<="),
            Token::GtEq => write!(f, ">="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Caret => write!(f, "^"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Semicolon => write!(f, ";"),
            Token::UnitLit(u) => write!(f, "{}{}", u.value, u.unit),
            Token::Float(v) => write!(f, "{v}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::StringLit(s) => write!(f, "\"{s}\""),
            Token::Ident => write!(f, "<ident>"),
        }
    }
}

// ── Callbacks ──

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<u64> {
    lex.slice().parse().ok()
}

fn parse_float(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_unit_literal(lex: &mut logos::Lexer<'_, Token>) -> Option<UnitLiteral> {
    let slice = lex.slice();
    let unit_start = slice.find(|c: char| c.is_alphabetic() || c == '_')?;
    let (num_str, unit) = slice.split_at(unit_start);
    Some(UnitLiteral {
        value: num_str.parse().ok()?,
        integral: !num_str.contains('.'),
        unit: unit.to_string(),
    })
}

/// Unescape a quoted literal. Unknown escapes reject the token.
fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let body = lex.slice().strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(body.len());
    let mut escaped = false;
    for c in body.chars() {
        if !escaped {
            if c == '\\' {
                escaped = true;
            } else {
                out.push(c);
            }
            continue;
        }
        escaped = false;
        out.push(match c {
            'n' => '\n',
            't' => '\t',
            '"' | '\\' => c,
            _ => return None,
        });
    }
    Some(out)
}

// ── Entry point ──

pub fn lex(source: &str) -> LexResult {
    let mut result = LexResult::default();
    for (token, range) in Token::lexer(source).spanned() {
        let span = Span::from(range.clone());
        match token {
            Ok(token) => result.tokens.push((token, span)),
            Err(()) => result.errors.push(LexError {
                span,
                message: format!("unexpected character {:?}", &source[range]),
            }),
        }
    }
    result
}
