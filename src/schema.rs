//! Message schema: the definitions a table row turns into, and the resolved schema the
//! generator consumes.
//!
//! A [`Schema`] is an ordered list of [`MessageDef`]s. Order only matters for discriminant
//! assignment. [`ResolvedSchema::resolve`] checks identifiers and uniqueness and computes the
//! discriminants once, so generation never has to.

use crate::config::DiscriminantPolicy;
use crate::discriminant;
use crate::table::Column;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Envelope fields every record starts with.
pub const ENVELOPE_FIELDS: [&str; 2] = ["type", "size"];

/// Parameter and local names used by the generated constructors.
pub const RESERVED_NAMES: [&str; 4] = ["msg", "out_msg", "allocator", "alloc_result"];

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("row declared before columns")]
    ColumnsNotDeclared,
    #[error("columns already declared")]
    ColumnsAlreadyDeclared,
    #[error("duplicate column `{0}`")]
    DuplicateColumn(String),
    #[error("missing required column `{0}`")]
    MissingColumn(&'static str),
    #[error("row {row}: expected {expected} values, found {found}")]
    ArityMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("{location}: column `{column}` expects {expected}, found {found}")]
    InvalidCell {
        location: String,
        column: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("message `{message}`: `{column}` not yet computed")]
    NotYetComputed { message: String, column: String },
    #[error("message `{message}`: no column `{column}`")]
    UnknownColumn { message: String, column: String },
    #[error("message `{message}`: invalid field declaration `{decl}`: {reason}")]
    InvalidField {
        message: String,
        decl: String,
        reason: &'static str,
    },
    #[error("message `{message}`: `{ident}` is not a valid C identifier")]
    InvalidIdentifier { message: String, ident: String },
    #[error("duplicate message name `{0}`")]
    DuplicateName(String),
    #[error("duplicate short name `{0}`")]
    DuplicateShortName(String),
    #[error("message `{message}`: field `{field}` {reason}")]
    FieldCollision {
        message: String,
        field: String,
        reason: &'static str,
    },
    #[error("messages `{first}` and `{second}` share discriminant {value}")]
    DuplicateDiscriminant {
        value: i64,
        first: String,
        second: String,
    },
    #[error("message `{message}`: discriminant overflows")]
    DiscriminantOverflow { message: String },
    #[error("message `{message}`: discriminant {value} does not fit a C int")]
    DiscriminantOutOfRange { message: String, value: i64 },
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("option `{key}` expects {expected}")]
    InvalidOption { key: String, expected: &'static str },
    #[error("generated symbol `{symbol}` is both {first} and {second}")]
    SymbolCollision {
        symbol: String,
        first: String,
        second: String,
    },
}

/// A table cell as supplied in a row or an option value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Cell>),
    Tuple(Vec<Cell>),
}

impl Cell {
    pub fn is_none(&self) -> bool {
        matches!(self, Cell::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Elements of a list or tuple.
    pub fn items(&self) -> Option<&[Cell]> {
        match self {
            Cell::List(v) | Cell::Tuple(v) => Some(v),
            _ => None,
        }
    }

    /// Short name of the cell kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Cell::None => "none",
            Cell::Bool(_) => "bool",
            Cell::Int(_) => "integer",
            Cell::Str(_) => "string",
            Cell::List(_) => "list",
            Cell::Tuple(_) => "tuple",
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Str(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Str(s)
    }
}

impl From<i64> for Cell {
    fn from(i: i64) -> Self {
        Cell::Int(i)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Bool(b)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map_or(Cell::None, Into::into)
    }
}

/// One fixed field: `decl` is emitted verbatim, `name` is used for assignments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedField {
    pub ty: String,
    pub name: String,
    pub decl: String,
}

impl FixedField {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        let ty = ty.into();
        let name = name.into();
        let decl = format!("{} {}", ty, name);
        FixedField { ty, name, decl }
    }

    /// Split a C declaration such as `int a` or `char *p` into type and name.
    pub fn parse(decl: &str) -> Result<Self, &'static str> {
        let trimmed = decl.trim();
        let name_start = trimmed
            .char_indices()
            .rev()
            .take_while(|&(_, c)| c.is_ascii_alphanumeric() || c == '_')
            .last()
            .map(|(i, _)| i)
            .ok_or("declaration must end with a field name")?;
        let name = &trimmed[name_start..];
        let ty = trimmed[..name_start].trim_end();
        if ty.is_empty() {
            return Err("missing type");
        }
        if !is_c_identifier(name) {
            return Err("field name is not an identifier");
        }
        Ok(FixedField {
            ty: ty.to_string(),
            name: name.to_string(),
            decl: trimmed.to_string(),
        })
    }
}

/// Trailing variable-length array: `element_type name[]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableTail {
    pub element_type: String,
    pub name: String,
}

impl VariableTail {
    pub fn new(element_type: impl Into<String>, name: impl Into<String>) -> Self {
        VariableTail {
            element_type: element_type.into(),
            name: name.into(),
        }
    }

    /// Name of the element-count parameter in generated signatures.
    pub fn count_param(&self) -> String {
        format!("{}_count", self.name)
    }
}

/// One message kind of the protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDef {
    pub name: String,
    pub explicit_value: Option<i64>,
    pub description: Option<String>,
    pub short_name: String,
    pub fixed_fields: Vec<FixedField>,
    pub variable_tail: Option<VariableTail>,
    /// Columns the generator does not interpret.
    pub extra: BTreeMap<String, Cell>,
}

impl MessageDef {
    pub fn new(name: impl Into<String>, short_name: impl Into<String>) -> Self {
        MessageDef {
            name: name.into(),
            explicit_value: None,
            description: None,
            short_name: short_name.into(),
            fixed_fields: Vec::new(),
            variable_tail: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, value: i64) -> Self {
        self.explicit_value = Some(value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_field(mut self, ty: &str, name: &str) -> Self {
        self.fixed_fields.push(FixedField::new(ty, name));
        self
    }

    pub fn with_tail(mut self, element_type: &str, name: &str) -> Self {
        self.variable_tail = Some(VariableTail::new(element_type, name));
        self
    }

    pub fn is_variable(&self) -> bool {
        self.variable_tail.is_some()
    }

    /// Description, which may be filled in after the table is built.
    pub fn description(&self) -> Result<&str, SchemaError> {
        self.description
            .as_deref()
            .ok_or_else(|| SchemaError::NotYetComputed {
                message: self.name.clone(),
                column: Column::Desc.as_str().to_string(),
            })
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    /// Look up a column by name, as the table declared it.
    pub fn field(&self, column: &str) -> Result<Cell, SchemaError> {
        let cell = match Column::from_name(column) {
            Column::Name => Cell::Str(self.name.clone()),
            Column::Value => self.explicit_value.into(),
            Column::Desc => Cell::Str(self.description()?.to_string()),
            Column::ShortName => Cell::Str(self.short_name.clone()),
            Column::DataFields => Cell::List(
                self.fixed_fields
                    .iter()
                    .map(|f| Cell::Str(f.decl.clone()))
                    .collect(),
            ),
            Column::VaData => match &self.variable_tail {
                Some(t) => Cell::Tuple(vec![
                    Cell::Str(t.element_type.clone()),
                    Cell::Str(t.name.clone()),
                ]),
                None => Cell::None,
            },
            Column::Extra(name) => {
                self.extra
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| SchemaError::UnknownColumn {
                        message: self.name.clone(),
                        column: name,
                    })?
            }
        };
        Ok(cell)
    }
}

/// Ordered message definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub messages: Vec<MessageDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: MessageDef) {
        self.messages.push(message);
    }

    /// Definitions in declaration order. The iterator can be cloned to restart.
    pub fn entries(&self) -> std::slice::Iter<'_, MessageDef> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

pub(crate) fn is_c_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validated schema with its discriminants.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub schema: Schema,
    pub discriminants: Vec<i64>,
    messages_by_name: HashMap<String, usize>,
}

impl ResolvedSchema {
    pub fn resolve(schema: Schema, policy: DiscriminantPolicy) -> Result<Self, SchemaError> {
        let mut messages_by_name = HashMap::new();
        let mut short_names = HashSet::new();
        for (i, m) in schema.entries().enumerate() {
            for ident in [&m.name, &m.short_name] {
                if !is_c_identifier(ident) {
                    return Err(SchemaError::InvalidIdentifier {
                        message: m.name.clone(),
                        ident: ident.clone(),
                    });
                }
            }
            if messages_by_name.insert(m.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateName(m.name.clone()));
            }
            if !short_names.insert(m.short_name.as_str()) {
                return Err(SchemaError::DuplicateShortName(m.short_name.clone()));
            }
            check_fields(m)?;
        }

        let discriminants = discriminant::assign(schema.entries().map(|m| m.explicit_value))
            .map_err(|overflow| SchemaError::DiscriminantOverflow {
                message: schema.messages[overflow.index].name.clone(),
            })?;
        for (m, &value) in schema.entries().zip(&discriminants) {
            if i32::try_from(value).is_err() {
                return Err(SchemaError::DiscriminantOutOfRange {
                    message: m.name.clone(),
                    value,
                });
            }
        }
        if policy == DiscriminantPolicy::Unique {
            if let Some((first, second)) = discriminant::first_collision(&discriminants) {
                return Err(SchemaError::DuplicateDiscriminant {
                    value: discriminants[second],
                    first: schema.messages[first].name.clone(),
                    second: schema.messages[second].name.clone(),
                });
            }
        }

        Ok(ResolvedSchema {
            schema,
            discriminants,
            messages_by_name,
        })
    }

    pub fn get(&self, name: &str) -> Option<&MessageDef> {
        self.messages_by_name
            .get(name)
            .map(|&i| &self.schema.messages[i])
    }

    pub fn discriminant(&self, name: &str) -> Option<i64> {
        self.messages_by_name
            .get(name)
            .map(|&i| self.discriminants[i])
    }

    /// Messages paired with their discriminants, in declaration order.
    pub fn messages(&self) -> impl Iterator<Item = (&MessageDef, i64)> + Clone + '_ {
        self.schema
            .entries()
            .zip(self.discriminants.iter().copied())
    }
}

fn check_fields(m: &MessageDef) -> Result<(), SchemaError> {
    let collision = |field: &str, reason| SchemaError::FieldCollision {
        message: m.name.clone(),
        field: field.to_string(),
        reason,
    };
    let mut seen = HashSet::new();
    let tail_name = m.variable_tail.as_ref().map(|t| t.name.as_str());
    for name in m.fixed_fields.iter().map(|f| f.name.as_str()).chain(tail_name) {
        if !is_c_identifier(name) {
            return Err(SchemaError::InvalidIdentifier {
                message: m.name.clone(),
                ident: name.to_string(),
            });
        }
        if ENVELOPE_FIELDS.contains(&name) {
            return Err(collision(name, "shadows an envelope field"));
        }
        if RESERVED_NAMES.contains(&name) {
            return Err(collision(name, "is a reserved constructor name"));
        }
        if !seen.insert(name) {
            return Err(collision(name, "is declared twice"));
        }
    }
    if let Some(tail) = &m.variable_tail {
        let count = tail.count_param();
        if seen.contains(count.as_str()) {
            return Err(collision(&count, "clashes with the tail count parameter"));
        }
    }
    Ok(())
}
