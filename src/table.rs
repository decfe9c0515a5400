//! Schema table builder.
//!
//! Columns are declared once; every row after that must supply exactly one value per
//! column, in the same order. Each row becomes a [`MessageDef`] appended to the schema.
//!
//! ```
//! use ipcmsgc::schema::Cell;
//! use ipcmsgc::table::SchemaTable;
//!
//! let mut table = SchemaTable::new();
//! table.declare_columns(["name", "value", "shortname", "data_fields", "va_data"]).unwrap();
//! table
//!     .declare_row(vec![
//!         "PING".into(),
//!         Cell::None,
//!         "ping".into(),
//!         Cell::List(vec!["int a".into()]),
//!         Cell::None,
//!     ])
//!     .unwrap();
//! assert_eq!(table.finish().len(), 1);
//! ```

use crate::schema::{Cell, FixedField, MessageDef, Schema, SchemaError, VariableTail};
use std::collections::HashSet;

/// A column the table builder knows how to map, or an extra one kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Column {
    Name,
    Value,
    Desc,
    ShortName,
    DataFields,
    VaData,
    Extra(String),
}

impl Column {
    pub fn from_name(name: &str) -> Column {
        match name {
            "name" => Column::Name,
            "value" | "explicit_value" => Column::Value,
            "desc" | "description" => Column::Desc,
            "shortname" | "short_name" => Column::ShortName,
            "data_fields" | "fixed_fields" => Column::DataFields,
            "va_data" | "variable_tail" => Column::VaData,
            other => Column::Extra(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Column::Name => "name",
            Column::Value => "value",
            Column::Desc => "desc",
            Column::ShortName => "shortname",
            Column::DataFields => "data_fields",
            Column::VaData => "va_data",
            Column::Extra(name) => name,
        }
    }
}

#[derive(Debug, Default)]
pub struct SchemaTable {
    columns: Option<Vec<Column>>,
    schema: Schema,
}

impl SchemaTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> Option<&[Column]> {
        self.columns.as_deref()
    }

    /// Fix the column order. `name` and `shortname` are required.
    pub fn declare_columns<I, S>(&mut self, names: I) -> Result<(), SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.columns.is_some() {
            return Err(SchemaError::ColumnsAlreadyDeclared);
        }
        let mut columns = Vec::new();
        let mut seen = HashSet::new();
        for name in names {
            let column = Column::from_name(name.as_ref());
            if !seen.insert(column.clone()) {
                return Err(SchemaError::DuplicateColumn(column.as_str().to_string()));
            }
            columns.push(column);
        }
        for (required, label) in [(Column::Name, "name"), (Column::ShortName, "shortname")] {
            if !columns.contains(&required) {
                return Err(SchemaError::MissingColumn(label));
            }
        }
        self.columns = Some(columns);
        Ok(())
    }

    /// Append one message built from `values`, mapped positionally onto the columns.
    pub fn declare_row<I>(&mut self, values: I) -> Result<&MessageDef, SchemaError>
    where
        I: IntoIterator<Item = Cell>,
    {
        let columns = self.columns.as_ref().ok_or(SchemaError::ColumnsNotDeclared)?;
        let values: Vec<Cell> = values.into_iter().collect();
        let row = self.schema.len() + 1;
        if values.len() != columns.len() {
            return Err(SchemaError::ArityMismatch {
                row,
                expected: columns.len(),
                found: values.len(),
            });
        }

        let name_pos = columns.iter().position(|c| *c == Column::Name).unwrap_or(0);
        let location = match values[name_pos].as_str() {
            Some(name) => format!("row {} (`{}`)", row, name),
            None => format!("row {}", row),
        };
        let mut builder = RowBuilder {
            location,
            message: MessageDef::new(String::new(), String::new()),
        };
        for (column, value) in columns.iter().zip(values) {
            builder.set(column, value)?;
        }

        self.schema.push(builder.message);
        Ok(&self.schema.messages[self.schema.len() - 1])
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn finish(self) -> Schema {
        self.schema
    }
}

struct RowBuilder {
    location: String,
    message: MessageDef,
}

impl RowBuilder {
    fn invalid(&self, column: &Column, expected: &'static str, found: &Cell) -> SchemaError {
        SchemaError::InvalidCell {
            location: self.location.clone(),
            column: column.as_str().to_string(),
            expected,
            found: found.kind(),
        }
    }

    fn set(&mut self, column: &Column, value: Cell) -> Result<(), SchemaError> {
        match column {
            Column::Name => match value {
                Cell::Str(s) if !s.is_empty() => self.message.name = s,
                other => return Err(self.invalid(column, "a non-empty string", &other)),
            },
            Column::ShortName => match value {
                Cell::Str(s) if !s.is_empty() => self.message.short_name = s,
                other => return Err(self.invalid(column, "a non-empty string", &other)),
            },
            Column::Value => match value {
                Cell::None => {}
                Cell::Int(i) => self.message.explicit_value = Some(i),
                other => return Err(self.invalid(column, "an integer or none", &other)),
            },
            Column::Desc => match value {
                Cell::None => {}
                Cell::Str(s) => self.message.description = Some(s),
                other => return Err(self.invalid(column, "a string or none", &other)),
            },
            Column::DataFields => match value {
                Cell::None => {}
                Cell::List(items) => {
                    for item in items {
                        let field = self.fixed_field(column, item)?;
                        self.message.fixed_fields.push(field);
                    }
                }
                other => return Err(self.invalid(column, "a list of fields or none", &other)),
            },
            Column::VaData => {
                if !value.is_none() {
                    let tail = match value.items() {
                        Some([Cell::Str(ty), Cell::Str(name)]) => VariableTail::new(ty.as_str(), name.as_str()),
                        _ => return Err(self.invalid(column, "an (element type, name) pair or none", &value)),
                    };
                    self.message.variable_tail = Some(tail);
                }
            }
            Column::Extra(name) => {
                self.message.extra.insert(name.clone(), value);
            }
        }
        Ok(())
    }

    fn fixed_field(&self, column: &Column, item: Cell) -> Result<FixedField, SchemaError> {
        match item {
            Cell::Str(decl) => FixedField::parse(&decl).map_err(|reason| SchemaError::InvalidField {
                message: self.location.clone(),
                decl,
                reason,
            }),
            Cell::Tuple(ref parts) => match parts.as_slice() {
                [Cell::Str(ty), Cell::Str(name)] => Ok(FixedField::new(ty.as_str(), name.as_str())),
                _ => Err(self.invalid(column, "a \"type name\" string or (type, name) pair", &item)),
            },
            other => Err(self.invalid(column, "a \"type name\" string or (type, name) pair", &other)),
        }
    }
}
