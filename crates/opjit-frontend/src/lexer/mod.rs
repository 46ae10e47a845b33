//! Lexer for the C dialect accepted by the bundled frontend
//!
//! Produces a flat token stream terminated by [`TokenKind::Eof`]. Object-like
//! macros given with `-D` are expanded here: every identifier naming a macro
//! is replaced by the tokens of its value. Expansion is single-pass, so a
//! macro whose value mentions itself does not recurse.

mod span;
mod token;

pub use span::{LineIndex, Location, Span};
pub use token::TokenKind;

use logos::Logos;
use std::collections::HashMap;
use thiserror::Error;

/// A token with its kind, span, and source text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub lexeme: String,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, span: Span, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            lexeme: lexeme.into(),
        }
    }
}

/// Lexer error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(String),
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("invalid value for macro '{name}': unexpected '{text}'")]
    InvalidMacro { name: String, text: String },
}

/// A lexer error with location information
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedError {
    pub error: LexError,
    pub span: Span,
}

impl std::fmt::Display for SpannedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.error, self.span)
    }
}

impl std::error::Error for SpannedError {}

/// Lexes `source` with no macros defined.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Vec<SpannedError>> {
    tokenize_with_defines(source, &[])
}

/// Lexes `source`, expanding the object-like macros in `defines`.
///
/// All lexical errors are collected before returning.
pub fn tokenize_with_defines(
    source: &str,
    defines: &[(String, String)],
) -> Result<Vec<Token>, Vec<SpannedError>> {
    let mut errors = Vec::new();
    let macros = lex_macros(defines, &mut errors);

    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);
    while let Some(result) = lexer.next() {
        let span = Span::from_range(lexer.span());
        let slice = lexer.slice();
        match result {
            Ok(TokenKind::Ident) => match macros.get(slice) {
                Some(expansion) => tokens.extend(
                    expansion
                        .iter()
                        .map(|(kind, text)| Token::new(*kind, span, text.clone())),
                ),
                None => tokens.push(Token::new(TokenKind::Ident, span, slice)),
            },
            Ok(kind) => tokens.push(Token::new(kind, span, slice)),
            Err(()) if slice.starts_with("/*") => errors.push(SpannedError {
                error: LexError::UnterminatedComment,
                span: Span::new(span.start, span.start + 2),
            }),
            Err(()) => errors.push(SpannedError {
                error: LexError::UnexpectedChar(slice.to_string()),
                span,
            }),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let end = source.len();
    tokens.push(Token::new(TokenKind::Eof, Span::from_range(end..end), ""));
    Ok(tokens)
}

type Expansion = Vec<(TokenKind, String)>;

fn lex_macros(
    defines: &[(String, String)],
    errors: &mut Vec<SpannedError>,
) -> HashMap<String, Expansion> {
    let mut macros = HashMap::new();
    for (name, value) in defines {
        let mut expansion = Vec::new();
        let mut lexer = TokenKind::lexer(value);
        while let Some(result) = lexer.next() {
            match result {
                Ok(kind) => expansion.push((kind, lexer.slice().to_string())),
                Err(()) => errors.push(SpannedError {
                    error: LexError::InvalidMacro {
                        name: name.clone(),
                        text: lexer.slice().to_string(),
                    },
                    span: Span::default(),
                }),
            }
        }
        // Later definitions of the same name win, as with repeated -D.
        macros.insert(name.clone(), expansion);
    }
    macros
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_and_punctuation() {
        assert_eq!(
            kinds("int entry(Context* c) { return 42; }"),
            vec![
                TokenKind::Int,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::Star,
                TokenKind::Ident,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Return,
                TokenKind::IntLit,
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(
            kinds("1 1.0 .5 2e3 0x1F 7L"),
            vec![
                TokenKind::IntLit,
                TokenKind::FloatLit,
                TokenKind::FloatLit,
                TokenKind::FloatLit,
                TokenKind::IntLit,
                TokenKind::IntLit,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_compound_operators_and_comments() {
        assert_eq!(
            kinds("a += 1; // trailing\n/* block\n comment */ b++ <= c && !d"),
            vec![
                TokenKind::Ident,
                TokenKind::PlusAssign,
                TokenKind::IntLit,
                TokenKind::Semicolon,
                TokenKind::Ident,
                TokenKind::PlusPlus,
                TokenKind::Le,
                TokenKind::Ident,
                TokenKind::AndAnd,
                TokenKind::Bang,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unexpected_characters_are_collected() {
        let errors = tokenize("int a = 1 @ 2 $;").unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].error, LexError::UnexpectedChar("@".into()));
        assert_eq!(errors[0].span, Span::new(10, 11));
    }

    #[test]
    fn test_block_comments_are_skipped() {
        assert_eq!(
            kinds("/**/ a /* x * y / z ** */ /* // not a line comment */ b"),
            vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Eof]
        );
        assert_eq!(kinds("a/* no space */b"), kinds("a b"));
    }

    #[test]
    fn test_unterminated_block_comment() {
        let errors = tokenize("int a; /* never closed\n int b;").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error, LexError::UnterminatedComment);
        assert_eq!(errors[0].span, Span::new(7, 9));
    }

    #[test]
    fn test_macro_expansion() {
        let defines = vec![
            ("GAIN".to_string(), "0.5".to_string()),
            ("FLAG".to_string(), "1".to_string()),
        ];
        let tokens = tokenize_with_defines("return GAIN * FLAG;", &defines).unwrap();
        assert_eq!(tokens[1].kind, TokenKind::FloatLit);
        assert_eq!(tokens[1].lexeme, "0.5");
        assert_eq!(tokens[1].span, Span::new(7, 11));
        assert_eq!(tokens[3].lexeme, "1");
    }

    #[test]
    fn test_self_referencing_macro_does_not_recurse() {
        let defines = vec![("X".to_string(), "X + 1".to_string())];
        let tokens = tokenize_with_defines("X", &defines).unwrap();
        let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["X", "+", "1", ""]);
    }
}
