//! Parser for the textual type grammar.
//!
//! ```text
//! type      := "!"? base
//! base      := name | name "(" params ")" | "array" "<" type ">"
//!            | "map" "<" type "," type ">" | "struct" "<" fields ">"
//! fields    := (field ("," field)*)?
//! field     := (ident | quoted) ":" type
//! ```

use crate::error::TypeParseError;
use crate::lexer::{lex, Token};
use crate::span::Span;
use crate::token::TokenKind;
use crate::types::{DataType, IntervalUnit, TypeKind};

/// Parse type text into a [`DataType`].
pub fn parse_type(source: &str) -> Result<DataType, TypeParseError> {
    let tokens = lex(source)?;
    let mut parser = Parser::new(tokens, source);
    let ty = parser.parse_type()?;
    if let Some(token) = parser.peek() {
        return Err(TypeParseError::unexpected_token(
            source,
            token.span,
            "end of input",
            &token.kind,
        ));
    }
    Ok(ty)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, source: &'a str) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
        }
    }

    fn parse_type(&mut self) -> Result<DataType, TypeParseError> {
        let nullable = !self.check_and_advance(TokenKind::Bang);
        let (name, span) = self.expect_ident("a type name")?;

        let kind = match name.as_str() {
            "array" => {
                self.expect(TokenKind::Lt)?;
                let inner = self.parse_type()?;
                self.expect(TokenKind::Gt)?;
                TypeKind::Array(Box::new(inner))
            }
            "map" => {
                self.expect(TokenKind::Lt)?;
                let key = self.parse_type()?;
                self.expect(TokenKind::Comma)?;
                let value = self.parse_type()?;
                self.expect(TokenKind::Gt)?;
                TypeKind::Map(Box::new(key), Box::new(value))
            }
            "struct" => self.parse_struct()?,
            "decimal" => {
                let mut precision = None;
                let mut scale = None;
                if self.check_and_advance(TokenKind::LParen) {
                    if matches!(self.peek_kind(), Some(TokenKind::Ident(ref k)) if k == "scale") {
                        self.advance();
                        self.expect(TokenKind::Colon)?;
                        scale = Some(self.expect_u8()?);
                    } else {
                        precision = Some(self.expect_u8()?);
                        if self.check_and_advance(TokenKind::Comma) {
                            scale = Some(self.expect_u8()?);
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                }
                TypeKind::Decimal { precision, scale }
            }
            "timestamp" => {
                let mut timezone = None;
                if self.check_and_advance(TokenKind::LParen) {
                    timezone = Some(self.expect_string("a time zone")?.0);
                    self.expect(TokenKind::RParen)?;
                }
                TypeKind::Timestamp { timezone }
            }
            "interval" => {
                let mut unit = IntervalUnit::Second;
                if self.check_and_advance(TokenKind::LParen) {
                    let (code, span) = self.expect_string("an interval unit")?;
                    unit = IntervalUnit::from_code(&code).ok_or_else(|| {
                        TypeParseError::new(
                            format!("unknown interval unit '{}'", code),
                            self.source,
                            span,
                        )
                    })?;
                    self.expect(TokenKind::RParen)?;
                }
                TypeKind::Interval { unit }
            }
            "category" => {
                let mut cardinality = None;
                if self.check_and_advance(TokenKind::LParen) {
                    cardinality = Some(self.expect_int()?);
                    self.expect(TokenKind::RParen)?;
                }
                TypeKind::Category { cardinality }
            }
            other => primitive(other).ok_or_else(|| {
                TypeParseError::new(format!("unknown type '{}'", other), self.source, span)
            })?,
        };

        Ok(DataType::new(kind).with_nullable(nullable))
    }

    fn parse_struct(&mut self) -> Result<TypeKind, TypeParseError> {
        self.expect(TokenKind::Lt)?;
        let mut fields: Vec<(String, DataType)> = Vec::new();
        if self.check_and_advance(TokenKind::Gt) {
            return Ok(TypeKind::Struct(fields));
        }
        loop {
            let (name, span) = match self.peek_kind() {
                Some(TokenKind::String(_)) => self.expect_string("a field name")?,
                _ => self.expect_ident("a field name")?,
            };
            if fields.iter().any(|(existing, _)| *existing == name) {
                return Err(TypeParseError::new(
                    format!("duplicate struct field '{}'", name),
                    self.source,
                    span,
                ));
            }
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            fields.push((name, ty));

            if !self.check_and_advance(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Gt)?;
        Ok(TypeKind::Struct(fields))
    }

    // Helpers

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind.clone())
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek()
            .map(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
            .unwrap_or(false)
    }

    fn check_and_advance(&mut self, kind: TokenKind) -> bool {
        if self.check(&kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, TypeParseError> {
        if self.check(&kind) {
            if let Some(token) = self.advance() {
                return Ok(token);
            }
        }
        Err(self.unexpected(&kind))
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Span), TypeParseError> {
        match self.peek().cloned() {
            Some(Token {
                kind: TokenKind::Ident(name),
                span,
            }) => {
                self.pos += 1;
                Ok((name, span))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_string(&mut self, what: &str) -> Result<(String, Span), TypeParseError> {
        match self.peek().cloned() {
            Some(Token {
                kind: TokenKind::String(text),
                span,
            }) => {
                self.pos += 1;
                Ok((text, span))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_int(&mut self) -> Result<u64, TypeParseError> {
        match self.peek_kind() {
            Some(TokenKind::Int(n)) => {
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.unexpected("an integer")),
        }
    }

    fn expect_u8(&mut self) -> Result<u8, TypeParseError> {
        let span = self.peek().map(|t| t.span).unwrap_or_default();
        let n = self.expect_int()?;
        u8::try_from(n).map_err(|_| {
            TypeParseError::new(format!("{} is out of range", n), self.source, span)
        })
    }

    fn unexpected(&self, expected: impl std::fmt::Display) -> TypeParseError {
        match self.peek() {
            Some(token) => {
                TypeParseError::unexpected_token(self.source, token.span, expected, &token.kind)
            }
            None => TypeParseError::unexpected_eof(self.source, expected),
        }
    }
}

fn primitive(name: &str) -> Option<TypeKind> {
    Some(match name {
        "null" => TypeKind::Null,
        "boolean" | "bool" => TypeKind::Boolean,
        "int8" => TypeKind::Int8,
        "int16" => TypeKind::Int16,
        "int32" => TypeKind::Int32,
        "int64" | "int" => TypeKind::Int64,
        "uint8" => TypeKind::UInt8,
        "uint16" => TypeKind::UInt16,
        "uint32" => TypeKind::UInt32,
        "uint64" => TypeKind::UInt64,
        "float32" => TypeKind::Float32,
        "float64" | "float" | "double" => TypeKind::Float64,
        "string" | "str" => TypeKind::String,
        "binary" | "bytes" => TypeKind::Binary,
        "date" => TypeKind::Date,
        "time" => TypeKind::Time,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_primitives() {
        assert_eq!(parse_type("int64").unwrap(), DataType::int64());
        assert_eq!(parse_type("double").unwrap(), DataType::float64());
        assert_eq!(parse_type("bool").unwrap(), DataType::boolean());
        assert_eq!(
            parse_type("!string").unwrap(),
            DataType::string().with_nullable(false)
        );
    }

    #[test]
    fn test_parse_parameterized() {
        assert_eq!(parse_type("decimal(15, 3)").unwrap(), DataType::decimal(15, 3));
        assert_eq!(
            parse_type("timestamp('UTC')").unwrap(),
            DataType::timestamp_tz("UTC")
        );
        assert_eq!(
            parse_type("interval").unwrap(),
            DataType::interval(IntervalUnit::Second)
        );
        assert_eq!(
            parse_type("interval('ms')").unwrap(),
            DataType::interval(IntervalUnit::Millisecond)
        );
        assert_eq!(
            parse_type("category(4)").unwrap(),
            DataType::category(Some(4))
        );
    }

    #[test]
    fn test_parse_complex_nested() {
        let text = "array<struct<a: array<string>, b: map<string, array<int64>>>>";
        let expected = DataType::array(
            DataType::struct_of([
                ("a", DataType::array(DataType::string())),
                (
                    "b",
                    DataType::map(DataType::string(), DataType::array(DataType::int64())),
                ),
            ])
            .unwrap(),
        );
        assert_eq!(parse_type(text).unwrap(), expected);
    }

    #[test]
    fn test_parse_is_whitespace_insensitive() {
        assert_eq!(
            parse_type("map < string ,array<int8> >").unwrap(),
            parse_type("map<string, array<int8>>").unwrap()
        );
    }

    #[test]
    fn test_parse_quoted_field() {
        let ty = parse_type("struct<'a b': int8, c: !date>").unwrap();
        let expected = DataType::struct_of([
            ("a b", DataType::int8()),
            ("c", DataType::date().with_nullable(false)),
        ])
        .unwrap();
        assert_eq!(ty, expected);
    }

    #[test]
    fn test_empty_struct_roundtrip() {
        let empty = DataType::struct_of(Vec::<(String, DataType)>::new()).unwrap();
        assert_eq!(empty.to_string(), "struct<>");
        assert_eq!(parse_type("struct<>").unwrap(), empty);
        assert_eq!(
            parse_type("array<struct< >>").unwrap(),
            DataType::array(empty)
        );
    }

    #[test]
    fn test_decimal_scale_without_precision_roundtrip() {
        let ty = DataType::new(TypeKind::Decimal {
            precision: None,
            scale: Some(3),
        });
        assert_eq!(ty.to_string(), "decimal(scale: 3)");
        assert_eq!(parse_type(&ty.to_string()).unwrap(), ty);
        let bare = DataType::new(TypeKind::Decimal {
            precision: Some(12),
            scale: None,
        });
        assert_eq!(parse_type(&bare.to_string()).unwrap(), bare);
        assert!(parse_type("decimal(scale 3)").is_err());
    }

    #[test]
    fn test_parse_errors() {
        for text in [
            "",
            "array<int64",
            "array<int64>>",
            "map<string>",
            "struct<a int64>",
            "struct<a: int8, a: int8>",
            "halffloat",
            "decimal(300, 2)",
            "interval('fortnight')",
            "int64 int64",
        ] {
            assert!(parse_type(text).is_err(), "{} should not parse", text);
        }
    }

    #[test]
    fn test_error_points_at_unknown_name() {
        let err = parse_type("array<wat>").unwrap_err();
        assert_eq!(err.span(), Span::new(6, 9));
        assert!(err.message().contains("wat"));
    }

    fn arb_type() -> impl Strategy<Value = DataType> {
        let leaf = prop_oneof![
            Just(DataType::null()),
            Just(DataType::boolean()),
            Just(DataType::int8()),
            Just(DataType::int16()),
            Just(DataType::int32()),
            Just(DataType::int64()),
            Just(DataType::new(TypeKind::UInt16)),
            Just(DataType::float32()),
            Just(DataType::float64()),
            Just(DataType::string()),
            Just(DataType::binary()),
            Just(DataType::date()),
            Just(DataType::time()),
            Just(DataType::timestamp()),
            (0u8..38, 0u8..10).prop_map(|(p, s)| DataType::decimal(p, s)),
            (proptest::option::of(0u8..38), proptest::option::of(0u8..10)).prop_map(
                |(precision, scale)| DataType::new(TypeKind::Decimal { precision, scale })
            ),
            "[A-Za-z/_']{1,12}".prop_map(DataType::timestamp_tz),
            Just(DataType::interval(IntervalUnit::Day)),
            Just(DataType::interval(IntervalUnit::Nanosecond)),
            proptest::option::of(0u64..100).prop_map(DataType::category),
        ];
        let leaf = (leaf, any::<bool>()).prop_map(|(ty, nullable)| ty.with_nullable(nullable));
        leaf.prop_recursive(4, 32, 4, |inner| {
            let nested = prop_oneof![
                inner.clone().prop_map(DataType::array),
                (inner.clone(), inner.clone()).prop_map(|(k, v)| DataType::map(k, v)),
                proptest::collection::vec(("[a-z ]{1,6}", inner), 0..4).prop_filter_map(
                    "unique field names",
                    |fields| DataType::struct_of(fields).ok()
                ),
            ];
            (nested, any::<bool>()).prop_map(|(ty, nullable)| ty.with_nullable(nullable))
        })
    }

    proptest! {
        #[test]
        fn prop_display_parse_roundtrip(ty in arb_type()) {
            let text = ty.to_string();
            let parsed = parse_type(&text).unwrap();
            prop_assert_eq!(parsed, ty);
        }
    }
}
