//! Lexer for the type grammar.

use logos::Logos;

use crate::error::TypeParseError;
use crate::span::Span;
use crate::token::TokenKind;

/// A token with its source span.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Tokenize type text. Unrecognized input is an error rather than being
/// skipped, so `int64$` never parses as `int64`.
pub fn lex(source: &str) -> Result<Vec<Token>, TypeParseError> {
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = Span::new(range.start, range.end);
        match result {
            Ok(kind) => tokens.push(Token { kind, span }),
            Err(()) => {
                return Err(TypeParseError::new(
                    format!("unexpected character sequence '{}'", lexer.slice()),
                    source,
                    span,
                ))
            }
        }
    }

    Ok(tokens)
}
