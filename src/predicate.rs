//! Translator for the caller-facing predicate language.
//!
//! The grammar is deliberately restricted:
//!
//! ```text
//! input      := [ comparison (AND comparison)* ] [ ORDER BY term (',' term)* ]
//! comparison := identifier op literal
//! op         := '=' | '<>' | '<' | '<=' | '>' | '>='
//! term       := identifier [ASC|DESC]
//! ```
//!
//! Keywords are case-insensitive. Every identifier must resolve to a
//! mapped field and every literal must parse as that field's storage
//! type. Caller text never reaches the store: rendering emits vetted
//! column names and `?N` placeholders, with literals bound separately.

use crate::error::{OrmError, Result};
use crate::mapping::{EntityMapping, StorageType};
use crate::value::{parse_datetime, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: String,
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub field: String,
    pub column: String,
    pub direction: Direction,
}

/// A parsed, validated predicate: zero or more AND-joined comparisons
/// plus an optional ordering clause. Both halves may independently be
/// empty ("all rows, store-native order").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    comparisons: Vec<Comparison>,
    order_by: Vec<OrderTerm>,
}

impl Predicate {
    /// The empty predicate: matches every row, imposes no order.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse and validate predicate text against a mapping. `None` and
    /// blank input both mean [`Predicate::all`].
    pub fn parse(text: Option<&str>, mapping: &EntityMapping) -> Result<Self> {
        let text = match text {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Ok(Self::all()),
        };
        Parser::new(tokenize(text)?, mapping).parse()
    }

    pub fn comparisons(&self) -> &[Comparison] {
        &self.comparisons
    }

    pub fn order_by(&self) -> &[OrderTerm] {
        &self.order_by
    }

    /// ` WHERE …` fragment with `?N` placeholders, or empty when there
    /// are no comparisons. Placeholder numbering starts at `first_index`.
    pub fn where_clause(&self, first_index: usize) -> String {
        if self.comparisons.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = self
            .comparisons
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} {} ?{}", c.column, c.op.sql(), first_index + i))
            .collect();
        format!(" WHERE {}", parts.join(" AND "))
    }

    /// ` ORDER BY …` fragment, or empty when no ordering was given.
    pub fn order_clause(&self) -> String {
        if self.order_by.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = self
            .order_by
            .iter()
            .map(|t| match t.direction {
                Direction::Asc => t.column.clone(),
                Direction::Desc => format!("{} DESC", t.column),
            })
            .collect();
        format!(" ORDER BY {}", parts.join(", "))
    }

    /// Literal values in comparison order, for parameter binding.
    pub fn params(&self) -> Vec<Value> {
        self.comparisons.iter().map(|c| c.value.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    Op(CompareOp),
    Comma,
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op(CompareOp::Eq));
            }
            '<' => {
                chars.next();
                let op = match chars.peek() {
                    Some('=') => {
                        chars.next();
                        CompareOp::Le
                    }
                    Some('>') => {
                        chars.next();
                        CompareOp::Ne
                    }
                    _ => CompareOp::Lt,
                };
                tokens.push(Token::Op(op));
            }
            '>' => {
                chars.next();
                let op = if chars.peek() == Some(&'=') {
                    chars.next();
                    CompareOp::Ge
                } else {
                    CompareOp::Gt
                };
                tokens.push(Token::Op(op));
            }
            '\'' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => {
                            // '' escapes a quote inside the literal
                            if chars.peek() == Some(&'\'') {
                                chars.next();
                                s.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some(c) => s.push(c),
                        None => {
                            return Err(OrmError::PredicateSyntax(
                                "unterminated string literal".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            '-' | '0'..='9' => {
                let mut s = String::new();
                if c == '-' {
                    s.push(c);
                    chars.next();
                    if !chars.peek().is_some_and(char::is_ascii_digit) {
                        return Err(OrmError::PredicateSyntax(
                            "expected digits after '-'".to_string(),
                        ));
                    }
                }
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(s));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(s));
            }
            other => {
                return Err(OrmError::PredicateSyntax(format!(
                    "unexpected character '{other}'"
                )))
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    mapping: &'a EntityMapping,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, mapping: &'a EntityMapping) -> Self {
        Self {
            tokens,
            pos: 0,
            mapping,
        }
    }

    fn parse(mut self) -> Result<Predicate> {
        let mut predicate = Predicate::all();
        if !self.at_order_by() && self.peek().is_some() {
            predicate.comparisons.push(self.comparison()?);
            while self.keyword("AND") {
                self.advance();
                predicate.comparisons.push(self.comparison()?);
            }
        }
        if self.at_order_by() {
            self.advance();
            self.advance();
            predicate.order_by.push(self.order_term()?);
            while self.peek() == Some(&Token::Comma) {
                self.advance();
                predicate.order_by.push(self.order_term()?);
            }
        }
        match self.peek() {
            None => Ok(predicate),
            Some(t) => Err(OrmError::PredicateSyntax(format!(
                "unexpected trailing input near {t:?}"
            ))),
        }
    }

    fn comparison(&mut self) -> Result<Comparison> {
        let (field, column, storage_type) = self.field_reference()?;
        let op = match self.peek() {
            Some(Token::Op(op)) => *op,
            other => {
                return Err(OrmError::PredicateSyntax(format!(
                    "expected comparison operator after '{field}', found {other:?}"
                )))
            }
        };
        self.advance();
        let value = self.literal(&field, storage_type)?;
        Ok(Comparison {
            field,
            column,
            op,
            value,
        })
    }

    fn order_term(&mut self) -> Result<OrderTerm> {
        let (field, column, _) = self.field_reference()?;
        let direction = if self.keyword("DESC") {
            self.advance();
            Direction::Desc
        } else if self.keyword("ASC") {
            self.advance();
            Direction::Asc
        } else {
            Direction::Asc
        };
        Ok(OrderTerm {
            field,
            column,
            direction,
        })
    }

    /// Consume an identifier and resolve it through the mapping.
    fn field_reference(&mut self) -> Result<(String, String, StorageType)> {
        let name = match self.peek() {
            Some(Token::Ident(name)) => name.clone(),
            other => {
                return Err(OrmError::PredicateSyntax(format!(
                    "expected a field name, found {other:?}"
                )))
            }
        };
        self.advance();
        let field = self
            .mapping
            .field(&name)
            .ok_or_else(|| OrmError::UnknownField {
                entity: self.mapping.entity_name().to_string(),
                field: name.clone(),
            })?;
        Ok((name, field.column.clone(), field.storage_type))
    }

    /// Parse the next token as a literal of the field's storage type.
    fn literal(&mut self, field: &str, storage_type: StorageType) -> Result<Value> {
        let mismatch = |literal: &str| OrmError::LiteralTypeMismatch {
            field: field.to_string(),
            expected: storage_type,
            literal: literal.to_string(),
        };
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| OrmError::PredicateSyntax("expected a literal".to_string()))?;
        self.advance();
        match (token, storage_type) {
            (Token::Number(s), StorageType::Integer) => {
                s.parse::<i64>().map(Value::Integer).map_err(|_| mismatch(&s))
            }
            (Token::Number(s), StorageType::Real) => {
                s.parse::<f64>().map(Value::Real).map_err(|_| mismatch(&s))
            }
            (Token::Number(s), StorageType::Boolean) => match s.as_str() {
                "0" => Ok(Value::Boolean(false)),
                "1" => Ok(Value::Boolean(true)),
                _ => Err(mismatch(&s)),
            },
            (Token::Str(s), StorageType::Text) => Ok(Value::Text(s)),
            (Token::Str(s), StorageType::DateTime) => {
                parse_datetime(&s).map(Value::DateTime).ok_or_else(|| mismatch(&s))
            }
            (Token::Ident(s), StorageType::Boolean) if s.eq_ignore_ascii_case("true") => {
                Ok(Value::Boolean(true))
            }
            (Token::Ident(s), StorageType::Boolean) if s.eq_ignore_ascii_case("false") => {
                Ok(Value::Boolean(false))
            }
            (Token::Number(s) | Token::Ident(s) | Token::Str(s), _) => Err(mismatch(&s)),
            (other, _) => Err(OrmError::PredicateSyntax(format!(
                "expected a literal, found {other:?}"
            ))),
        }
    }

    fn at_order_by(&self) -> bool {
        self.keyword("ORDER")
            && matches!(
                self.tokens.get(self.pos + 1),
                Some(Token::Ident(s)) if s.eq_ignore_ascii_case("BY")
            )
    }

    fn keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(kw))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{FieldMapping, MappingRegistry};
    use chrono::NaiveDate;

    fn class_a() -> std::sync::Arc<EntityMapping> {
        let mut registry = MappingRegistry::new();
        registry
            .register(
                "ClassA",
                None,
                vec![
                    FieldMapping::new("aId", StorageType::Integer),
                    FieldMapping::new("aString", StorageType::Text),
                    FieldMapping::new("aDate", StorageType::DateTime),
                    FieldMapping::new("aBoolean", StorageType::Boolean),
                    FieldMapping::new("aFloat", StorageType::Real),
                ],
                "aId",
            )
            .unwrap()
    }

    #[test]
    fn empty_input_matches_all() {
        let mapping = class_a();
        assert_eq!(Predicate::parse(None, &mapping).unwrap(), Predicate::all());
        assert_eq!(
            Predicate::parse(Some("   "), &mapping).unwrap(),
            Predicate::all()
        );
    }

    #[test]
    fn parses_single_comparison() {
        let mapping = class_a();
        let p = Predicate::parse(Some("aFloat > 1.5"), &mapping).unwrap();
        assert_eq!(p.comparisons().len(), 1);
        assert_eq!(p.comparisons()[0].op, CompareOp::Gt);
        assert_eq!(p.comparisons()[0].value, Value::Real(1.5));
        assert_eq!(p.where_clause(1), " WHERE aFloat > ?1");
        assert!(p.order_clause().is_empty());
    }

    #[test]
    fn parses_conjunction_case_insensitively() {
        let mapping = class_a();
        let p = Predicate::parse(Some("aId >= 2 and aBoolean = TRUE"), &mapping).unwrap();
        assert_eq!(p.comparisons().len(), 2);
        assert_eq!(p.comparisons()[1].value, Value::Boolean(true));
        assert_eq!(p.where_clause(1), " WHERE aId >= ?1 AND aBoolean = ?2");
        assert_eq!(
            p.params(),
            vec![Value::Integer(2), Value::Boolean(true)]
        );
    }

    #[test]
    fn parses_order_by_only() {
        let mapping = class_a();
        let p = Predicate::parse(Some("ORDER BY aId DESC"), &mapping).unwrap();
        assert!(p.comparisons().is_empty());
        assert_eq!(p.order_clause(), " ORDER BY aId DESC");
    }

    #[test]
    fn parses_comparison_with_multi_term_order() {
        let mapping = class_a();
        let p = Predicate::parse(
            Some("aFloat > 1.5 order by aDate desc, aId asc"),
            &mapping,
        )
        .unwrap();
        assert_eq!(p.order_by().len(), 2);
        assert_eq!(p.order_clause(), " ORDER BY aDate DESC, aId");
    }

    #[test]
    fn parses_date_literal() {
        let mapping = class_a();
        let p = Predicate::parse(Some("aDate >= '1982-02-02'"), &mapping).unwrap();
        let expected = NaiveDate::from_ymd_opt(1982, 2, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(p.comparisons()[0].value, Value::DateTime(expected));
    }

    #[test]
    fn quoted_literal_keeps_escaped_quote() {
        let mapping = class_a();
        let p = Predicate::parse(Some("aString = 'it''s'"), &mapping).unwrap();
        assert_eq!(p.comparisons()[0].value, Value::Text("it's".to_string()));
    }

    #[test]
    fn rejects_unknown_field() {
        let mapping = class_a();
        let err = Predicate::parse(Some("nonexistentField > 1"), &mapping).unwrap_err();
        assert!(matches!(err, OrmError::UnknownField { field, .. } if field == "nonexistentField"));
    }

    #[test]
    fn rejects_unknown_order_field() {
        let mapping = class_a();
        let err = Predicate::parse(Some("ORDER BY nope"), &mapping).unwrap_err();
        assert!(matches!(err, OrmError::UnknownField { .. }));
    }

    #[test]
    fn rejects_literal_of_wrong_type() {
        let mapping = class_a();
        let err = Predicate::parse(Some("aId = 'two'"), &mapping).unwrap_err();
        assert!(matches!(err, OrmError::LiteralTypeMismatch { .. }));
        let err = Predicate::parse(Some("aId = 1.5"), &mapping).unwrap_err();
        assert!(matches!(err, OrmError::LiteralTypeMismatch { .. }));
        let err = Predicate::parse(Some("aDate > 'not a date'"), &mapping).unwrap_err();
        assert!(matches!(err, OrmError::LiteralTypeMismatch { .. }));
    }

    #[test]
    fn rejects_unquoted_text_literal() {
        let mapping = class_a();
        let err = Predicate::parse(Some("aString = A2"), &mapping).unwrap_err();
        // A bare identifier in literal position is an unknown-field style
        // injection vector; it must not parse.
        assert!(matches!(
            err,
            OrmError::LiteralTypeMismatch { .. } | OrmError::PredicateSyntax(_)
        ));
    }

    #[test]
    fn rejects_disjunction_and_trailing_garbage() {
        let mapping = class_a();
        let err = Predicate::parse(Some("aId = 1 OR aId = 2"), &mapping).unwrap_err();
        assert!(matches!(err, OrmError::PredicateSyntax(_)));
        let err = Predicate::parse(Some("aId = 1; DROP TABLE ClassA"), &mapping).unwrap_err();
        assert!(matches!(err, OrmError::PredicateSyntax(_)));
    }

    #[test]
    fn rejects_unterminated_string() {
        let mapping = class_a();
        let err = Predicate::parse(Some("aString = 'oops"), &mapping).unwrap_err();
        assert!(matches!(err, OrmError::PredicateSyntax(_)));
    }

    #[test]
    fn negative_numbers_parse() {
        let mapping = class_a();
        let p = Predicate::parse(Some("aFloat <= -2.5 AND aId <> -1"), &mapping).unwrap();
        assert_eq!(p.comparisons()[0].value, Value::Real(-2.5));
        assert_eq!(p.comparisons()[1].value, Value::Integer(-1));
    }
}
