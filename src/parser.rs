//! Parse schema source into a [`Schema`] using PEST.
//!
//! The `table` header goes through [`SchemaTable::declare_columns`] and every row tuple
//! through [`SchemaTable::declare_row`], so the textual form obeys exactly the same rules as
//! a table built in code.

use crate::schema::{Cell, Schema, SchemaError};
use crate::table::SchemaTable;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct SchemaParser;

/// A parsed source file: the messages plus the `options { }` entries in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSchema {
    pub schema: Schema,
    pub options: Vec<(String, Cell)>,
}

/// Parse schema source.
pub fn parse(source: &str) -> Result<ParsedSchema, SchemaError> {
    let pairs = SchemaParser::parse(Rule::schema, source)
        .map_err(|e| SchemaError::Parse(e.to_string()))?;
    let pair = pairs
        .into_iter()
        .next()
        .ok_or_else(|| SchemaError::Parse("empty parse".to_string()))?;

    let mut table = SchemaTable::new();
    let mut options = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::options_section => {
                for option in inner.into_inner() {
                    options.push(build_option(option)?);
                }
            }
            Rule::table_section => build_table(&mut table, inner)?,
            _ => {}
        }
    }
    Ok(ParsedSchema {
        schema: table.finish(),
        options,
    })
}

fn build_option(pair: Pair<Rule>) -> Result<(String, Cell), SchemaError> {
    let mut it = pair.into_inner();
    let key = it
        .next()
        .ok_or_else(|| SchemaError::Parse("option: missing key".to_string()))?;
    let value = it
        .next()
        .ok_or_else(|| SchemaError::Parse(format!("option `{}`: missing value", key.as_str())))?;
    Ok((key.as_str().to_string(), build_value(value)?))
}

fn build_table(table: &mut SchemaTable, pair: Pair<Rule>) -> Result<(), SchemaError> {
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::columns => {
                table.declare_columns(inner.into_inner().map(|p| p.as_str().to_string()))?;
            }
            Rule::tuple => {
                let row = inner
                    .into_inner()
                    .map(build_value)
                    .collect::<Result<Vec<_>, _>>()?;
                table.declare_row(row)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn build_value(pair: Pair<Rule>) -> Result<Cell, SchemaError> {
    let cell = match pair.as_rule() {
        Rule::none => Cell::None,
        Rule::boolean => Cell::Bool(pair.as_str() == "true"),
        Rule::integer => Cell::Int(parse_integer(pair.as_str())?),
        Rule::string => {
            let inner = pair
                .into_inner()
                .next()
                .map(|p| p.as_str())
                .unwrap_or_default();
            Cell::Str(unescape(inner))
        }
        Rule::list => Cell::List(
            pair.into_inner()
                .map(build_value)
                .collect::<Result<_, _>>()?,
        ),
        Rule::tuple => Cell::Tuple(
            pair.into_inner()
                .map(build_value)
                .collect::<Result<_, _>>()?,
        ),
        other => return Err(SchemaError::Parse(format!("unexpected value: {:?}", other))),
    };
    Ok(cell)
}

fn parse_integer(s: &str) -> Result<i64, SchemaError> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i128::from_str_radix(hex, 16),
        None => digits.parse::<i128>(),
    }
    .map_err(|e| SchemaError::Parse(format!("integer `{}`: {}", s, e)))?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).map_err(|_| SchemaError::Parse(format!("integer `{}` out of range", s)))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers() {
        assert_eq!(parse_integer("42").unwrap(), 42);
        assert_eq!(parse_integer("-0x10").unwrap(), -16);
        assert_eq!(parse_integer("-9223372036854775808").unwrap(), i64::MIN);
        assert!(parse_integer("9223372036854775808").is_err());
    }

    #[test]
    fn escapes() {
        assert_eq!(unescape(r#"a\"b\\c\n"#), "a\"b\\c\n");
    }
}
