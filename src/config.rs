//! Generator configuration: symbol spellings, includes and the policy switches.
//!
//! Defaults reproduce the ghost IPC header. Values can be overridden by an `options { }`
//! block in the schema source and then by command-line flags, both through
//! [`GeneratorConfig::apply_option`].

use crate::schema::{Cell, SchemaError};

/// What the in-place constructor stores in a variable-tail record's `size` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeFieldMode {
    /// Total record size in bytes, `sizeof(record) + count * sizeof(element)`.
    #[default]
    Bytes,
    /// `sizeof(record) + count`, as older ghost headers wrote it.
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscriminantPolicy {
    /// Two messages with the same tag are a schema error.
    #[default]
    Unique,
    /// Tags may alias.
    Permissive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitMode {
    /// One header; every function is an inline definition.
    #[default]
    Inline,
    /// Header with declarations plus a source unit with the definitions.
    Split,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub prefix: String,
    pub enum_prefix: Option<String>,
    pub type_name: Option<String>,
    pub envelope_name: Option<String>,
    pub header_name: Option<String>,
    pub source_name: Option<String>,
    pub result_type: String,
    pub ok_code: String,
    pub construct_failed: String,
    pub allocator_type: String,
    pub alloc_fn: String,
    pub includes: Vec<String>,
    pub indent: String,
    pub inline_attr: String,
    pub emit_mode: EmitMode,
    pub size_field: SizeFieldMode,
    pub discriminants: DiscriminantPolicy,
    pub layout_asserts: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            prefix: "gh_ipcmsg".to_string(),
            enum_prefix: None,
            type_name: None,
            envelope_name: None,
            header_name: None,
            source_name: None,
            result_type: "gh_result".to_string(),
            ok_code: "GHR_OK".to_string(),
            construct_failed: "ghr_errno(GHR_IPC_MSGNEWFAIL)".to_string(),
            allocator_type: "gh_alloc".to_string(),
            alloc_fn: "gh_alloc_new".to_string(),
            includes: ["<stddef.h>", "<string.h>", "<ghost/result.h>", "<ghost/alloc.h>"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            indent: "    ".to_string(),
            inline_attr: "__attribute__((always_inline)) static inline".to_string(),
            emit_mode: EmitMode::default(),
            size_field: SizeFieldMode::default(),
            discriminants: DiscriminantPolicy::default(),
            layout_asserts: true,
        }
    }
}

impl GeneratorConfig {
    /// Prefix of the discriminant constants, `GH_IPCMSG_` unless overridden.
    pub fn enum_prefix(&self) -> String {
        self.enum_prefix
            .clone()
            .unwrap_or_else(|| format!("{}_", self.prefix.to_ascii_uppercase()))
    }

    pub fn type_name(&self) -> String {
        self.type_name
            .clone()
            .unwrap_or_else(|| format!("{}_type", self.prefix))
    }

    pub fn envelope_name(&self) -> String {
        self.envelope_name.clone().unwrap_or_else(|| self.prefix.clone())
    }

    pub fn header_name(&self) -> String {
        self.header_name
            .clone()
            .unwrap_or_else(|| format!("{}_type.h", self.prefix))
    }

    pub fn source_name(&self) -> String {
        self.source_name
            .clone()
            .unwrap_or_else(|| format!("{}_type.c", self.prefix))
    }

    /// Root of every symbol generated for one message.
    pub fn record_name(&self, short_name: &str) -> String {
        format!("{}_{}", self.prefix, short_name)
    }

    pub fn tag_constant(&self, name: &str) -> String {
        format!("{}{}", self.enum_prefix(), name)
    }

    /// Apply `options` in order; later keys win.
    pub fn apply_options<'a, I>(&mut self, options: I) -> Result<(), SchemaError>
    where
        I: IntoIterator<Item = &'a (String, Cell)>,
    {
        for (key, value) in options {
            self.apply_option(key, value)?;
        }
        Ok(())
    }

    pub fn apply_option(&mut self, key: &str, value: &Cell) -> Result<(), SchemaError> {
        let invalid = |expected| SchemaError::InvalidOption {
            key: key.to_string(),
            expected,
        };
        let string = || value.as_str().map(str::to_string).ok_or_else(|| invalid("a string"));
        let flag = || value.as_bool().ok_or_else(|| invalid("true or false"));
        match key {
            "prefix" => self.prefix = string()?,
            "enum_prefix" => self.enum_prefix = Some(string()?),
            "type_name" => self.type_name = Some(string()?),
            "envelope_name" => self.envelope_name = Some(string()?),
            "header_name" => self.header_name = Some(string()?),
            "source_name" => self.source_name = Some(string()?),
            "result_type" => self.result_type = string()?,
            "ok_code" => self.ok_code = string()?,
            "construct_failed" => self.construct_failed = string()?,
            "allocator_type" => self.allocator_type = string()?,
            "alloc_fn" => self.alloc_fn = string()?,
            "indent" => self.indent = string()?,
            "inline_attr" => self.inline_attr = string()?,
            "layout_asserts" => self.layout_asserts = flag()?,
            "include" => {
                let items = value.items().ok_or_else(|| invalid("a list of strings"))?;
                self.includes = items
                    .iter()
                    .map(|c| c.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| invalid("a list of strings"))?;
            }
            "emit_mode" => {
                self.emit_mode = match value.as_str() {
                    Some("inline") => EmitMode::Inline,
                    Some("split") => EmitMode::Split,
                    _ => return Err(invalid("\"inline\" or \"split\"")),
                }
            }
            "size_field" => {
                self.size_field = match value.as_str() {
                    Some("bytes") => SizeFieldMode::Bytes,
                    Some("legacy") => SizeFieldMode::Legacy,
                    _ => return Err(invalid("\"bytes\" or \"legacy\"")),
                }
            }
            "discriminants" => {
                self.discriminants = match value.as_str() {
                    Some("unique") => DiscriminantPolicy::Unique,
                    Some("permissive") => DiscriminantPolicy::Permissive,
                    _ => return Err(invalid("\"unique\" or \"permissive\"")),
                }
            }
            other => return Err(SchemaError::UnknownOption(other.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_names_follow_prefix() {
        let mut c = GeneratorConfig::default();
        assert_eq!(c.enum_prefix(), "GH_IPCMSG_");
        assert_eq!(c.envelope_name(), "gh_ipcmsg");
        assert_eq!(c.header_name(), "gh_ipcmsg_type.h");
        c.apply_option("prefix", &Cell::from("rpc_msg")).unwrap();
        assert_eq!(c.tag_constant("PING"), "RPC_MSG_PING");
        assert_eq!(c.type_name(), "rpc_msg_type");
        assert_eq!(c.record_name("ping"), "rpc_msg_ping");
    }

    #[test]
    fn option_errors() {
        let mut c = GeneratorConfig::default();
        assert_eq!(
            c.apply_option("nope", &Cell::None).unwrap_err(),
            SchemaError::UnknownOption("nope".into())
        );
        assert!(matches!(
            c.apply_option("size_field", &Cell::from("words")),
            Err(SchemaError::InvalidOption { .. })
        ));
        assert!(c.apply_option("include", &Cell::List(vec![Cell::Int(1)])).is_err());
    }

    #[test]
    fn later_options_win() {
        let mut c = GeneratorConfig::default();
        let opts = vec![
            ("size_field".to_string(), Cell::from("legacy")),
            ("size_field".to_string(), Cell::from("bytes")),
            ("emit_mode".to_string(), Cell::from("split")),
        ];
        c.apply_options(&opts).unwrap();
        assert_eq!(c.size_field, SizeFieldMode::Bytes);
        assert_eq!(c.emit_mode, EmitMode::Split);
    }
}
