//! C backend.
//!
//! One pass over the resolved schema emits, in order:
//!
//! - the discriminant `typedef enum`,
//! - the envelope record (`type`, `size`, opaque `_data[]`),
//! - for each message: its record, a prefix `_Static_assert`, and the `_get`, `_size`,
//!   `_ctor` and `_new` functions.
//!
//! In [`EmitMode::Inline`] everything lands in one header as inline definitions. In
//! [`EmitMode::Split`] the header carries declarations and a second unit the definitions.
//! Output depends only on the schema, the config and the source name.

use crate::config::{EmitMode, GeneratorConfig, SizeFieldMode};
use crate::emit::{EmitError, Emitter, Unit};
use crate::schema::{MessageDef, ResolvedSchema, SchemaError};
use crate::{emit, emit_part};
use std::collections::hash_map::{Entry, HashMap};
use tracing::{debug, info};


#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Emit(#[from] EmitError),
    #[error("schema has no messages")]
    EmptySchema,
}

/// How a function is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    /// `inline_attr` signature with body.
    Inline,
    /// Signature followed by `;`.
    Declaration,
    /// Plain signature with body.
    Definition,
}

struct Message<'a> {
    def: &'a MessageDef,
    discriminant: i64,
    tag: String,
    record: String,
}

impl Message<'_> {
    fn func(&self, suffix: &str) -> String {
        format!("{}_{}", self.record, suffix)
    }
}

pub fn generate(
    resolved: &ResolvedSchema,
    config: &GeneratorConfig,
    source_name: &str,
) -> Result<Vec<Unit>, GenerateError> {
    if resolved.schema.is_empty() {
        return Err(GenerateError::EmptySchema);
    }
    let messages: Vec<Message> = resolved
        .messages()
        .map(|(def, discriminant)| Message {
            def,
            discriminant,
            tag: config.tag_constant(&def.name),
            record: config.record_name(&def.short_name),
        })
        .collect();
    check_symbols(config, &messages)?;

    let mut out = Emitter::new(config.indent.as_str());
    let header = config.header_name();
    let function_form = match config.emit_mode {
        EmitMode::Inline => Form::Inline,
        EmitMode::Split => Form::Declaration,
    };

    debug!(unit = %header, "opening header");
    out.open_unit(header.as_str());
    emit_banner(&mut out, source_name);
    out.write("#pragma once");
    out.blank_line();
    for include in required_headers(resolved) {
        if !config.includes.iter().any(|i| i == include) {
            emit!(out, "#include ", include);
        }
    }
    for include in &config.includes {
        emit!(out, "#include ", include);
    }
    out.blank_line();
    emit_type_enum(&mut out, config, &messages);
    out.blank_line();
    emit_envelope(&mut out, config);
    for m in &messages {
        debug!(
            message = %m.def.name,
            discriminant = m.discriminant,
            record = %m.record,
            variable = m.def.is_variable(),
            "emitting message"
        );
        out.blank_line();
        emit!(out, "// ", m.tag);
        out.blank_line();
        emit_record(&mut out, config, m);
        if config.layout_asserts {
            emit_prefix_assert(&mut out, config, m);
        }
        emit_functions(&mut out, config, m, function_form);
    }
    out.close_unit();

    if config.emit_mode == EmitMode::Split {
        let source = config.source_name();
        debug!(unit = %source, "opening source");
        out.open_unit(source);
        emit_banner(&mut out, source_name);
        emit!(out, "#include \"", header, "\"");
        for m in &messages {
            emit_functions(&mut out, config, m, Form::Definition);
        }
        out.close_unit();
    }

    let units = out.finish()?;
    info!(
        messages = messages.len(),
        units = units.len(),
        "generated message layouts from {}",
        source_name
    );
    Ok(units)
}

/// Standard headers the emitted code itself relies on, whatever `includes` says.
fn required_headers(resolved: &ResolvedSchema) -> Vec<&'static str> {
    let types: Vec<&str> = resolved
        .schema
        .entries()
        .flat_map(|m| {
            let tail = m.variable_tail.as_ref().map(|t| t.element_type.as_str());
            m.fixed_fields.iter().map(|f| f.ty.as_str()).chain(tail)
        })
        .collect();
    let uses = |pred: fn(&str) -> bool| {
        types
            .iter()
            .flat_map(|ty| ty.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')))
            .any(pred)
    };
    // size_t and offsetof
    let mut headers = vec!["<stddef.h>"];
    if uses(|w| {
        matches!(w, "intptr_t" | "uintptr_t")
            || (w.ends_with("_t") && (w.starts_with("int") || w.starts_with("uint")))
    }) {
        headers.push("<stdint.h>");
    }
    if uses(|w| w == "bool") {
        headers.push("<stdbool.h>");
    }
    // memmove
    if resolved.schema.entries().any(|m| m.is_variable()) {
        headers.push("<string.h>");
    }
    headers
}

/// Every C identifier the header declares must have exactly one owner.
fn check_symbols(config: &GeneratorConfig, messages: &[Message]) -> Result<(), SchemaError> {
    let mut owners: HashMap<String, String> = HashMap::new();
    let mut claim = |symbol: String, owner: String| match owners.entry(symbol) {
        Entry::Occupied(e) => Err(SchemaError::SymbolCollision {
            symbol: e.key().clone(),
            first: e.get().clone(),
            second: owner,
        }),
        Entry::Vacant(e) => {
            e.insert(owner);
            Ok(())
        }
    };
    claim(config.type_name(), "the discriminant type".to_string())?;
    claim(config.envelope_name(), "the envelope record".to_string())?;
    for m in messages {
        claim(m.tag.clone(), format!("the tag of `{}`", m.def.name))?;
        claim(m.record.clone(), format!("the record of `{}`", m.def.name))?;
        for suffix in ["get", "size", "ctor", "new"] {
            claim(m.func(suffix), format!("`{}`'s _{} function", m.def.name, suffix))?;
        }
    }
    Ok(())
}

fn emit_banner(out: &mut Emitter, source_name: &str) {
    emit!(out, "// Generated by ipcmsgc from ", source_name, ". Do not edit.");
    out.blank_line();
}

fn emit_type_enum(out: &mut Emitter, config: &GeneratorConfig, messages: &[Message]) {
    out.write("typedef enum {");
    {
        let mut out = out.indented();
        for m in messages {
            emit!(out, m.tag, " = ", m.discriminant, ",");
        }
    }
    emit!(out, "} ", config.type_name(), ";");
}

fn emit_prefix_fields(out: &mut Emitter, config: &GeneratorConfig) {
    emit!(out, config.type_name(), " type;");
    out.write("size_t size;");
}

fn emit_envelope(out: &mut Emitter, config: &GeneratorConfig) {
    out.write("// Every record below starts with `type` and `size` at these offsets.");
    out.write("typedef struct {");
    {
        let mut out = out.indented();
        emit_prefix_fields(&mut out, config);
        out.write("char _data[];");
    }
    emit!(out, "} ", config.envelope_name(), ";");
}

fn emit_record(out: &mut Emitter, config: &GeneratorConfig, m: &Message) {
    out.write("typedef struct {");
    {
        let mut out = out.indented();
        emit_prefix_fields(&mut out, config);
        for field in &m.def.fixed_fields {
            emit!(out, field.decl, ";");
        }
        if let Some(tail) = &m.def.variable_tail {
            emit!(out, tail.element_type, " ", tail.name, "[];");
        }
    }
    emit!(out, "} ", m.record, ";");
}

fn emit_prefix_assert(out: &mut Emitter, config: &GeneratorConfig, m: &Message) {
    let envelope = config.envelope_name();
    emit!(
        out,
        "_Static_assert(offsetof(", m.record, ", type) == offsetof(", envelope, ", type)",
        " && offsetof(", m.record, ", size) == offsetof(", envelope, ", size), \"",
        m.record, " must start with the ", envelope, " prefix\");"
    );
}

fn emit_functions(out: &mut Emitter, config: &GeneratorConfig, m: &Message, form: Form) {
    out.blank_line();
    emit_get(out, config, m, form);
    emit_size(out, config, m, form);
    if form != Form::Declaration {
        out.blank_line();
    }
    emit_ctor(out, config, m, form);
    if form != Form::Declaration {
        out.blank_line();
    }
    emit_new(out, config, m, form);
}

fn begin_signature(out: &mut Emitter, config: &GeneratorConfig, form: Form) {
    if form == Form::Inline {
        emit_part!(out, config.inline_attr, " ");
    }
}

/// End the signature line. Returns whether a body follows.
fn end_signature(out: &mut Emitter, form: Form) -> bool {
    if form == Form::Declaration {
        out.write(");");
        false
    } else {
        out.write(") {");
        true
    }
}

/// `, int a, char * tail, size_t tail_count`
fn emit_field_params(out: &mut Emitter, def: &MessageDef) {
    for field in &def.fixed_fields {
        emit_part!(out, ", ", field.decl);
    }
    if let Some(tail) = &def.variable_tail {
        emit_part!(out, ", ", tail.element_type, " * ", tail.name);
        emit_part!(out, ", size_t ", tail.count_param());
    }
}

/// `, a, tail, tail_count`
fn emit_field_args(out: &mut Emitter, def: &MessageDef) {
    for field in &def.fixed_fields {
        emit_part!(out, ", ", field.name);
    }
    if let Some(tail) = &def.variable_tail {
        emit_part!(out, ", ", tail.name, ", ", tail.count_param());
    }
}

fn emit_get(out: &mut Emitter, config: &GeneratorConfig, m: &Message, form: Form) {
    begin_signature(out, config, form);
    emit_part!(out, m.record, " * ", m.func("get"), "(", config.envelope_name(), " * msg");
    if end_signature(out, form) {
        {
            let mut out = out.indented();
            emit!(out, "if (msg->type != ", m.tag, ") return NULL;");
            emit!(out, "return (", m.record, " *)msg;");
        }
        out.write("}");
    }
}

fn emit_size(out: &mut Emitter, config: &GeneratorConfig, m: &Message, form: Form) {
    begin_signature(out, config, form);
    emit_part!(out, "size_t ", m.func("size"), "(");
    let body = match &m.def.variable_tail {
        Some(tail) => {
            out.append("size_t count");
            format!(
                "return sizeof({}) + (count * sizeof({}));",
                m.record, tail.element_type
            )
        }
        None => {
            out.append("void");
            format!("return sizeof({});", m.record)
        }
    };
    match form {
        Form::Declaration => out.write(");"),
        Form::Inline | Form::Definition => emit!(out, ") { ", body, " }"),
    }
}

fn emit_ctor(out: &mut Emitter, config: &GeneratorConfig, m: &Message, form: Form) {
    begin_signature(out, config, form);
    emit_part!(out, "void ", m.func("ctor"), "(", m.record, " * msg");
    emit_field_params(out, m.def);
    if !end_signature(out, form) {
        return;
    }
    {
        let mut out = out.indented();
        emit!(out, "msg->type = ", m.tag, ";");
        match (&m.def.variable_tail, config.size_field) {
            (None, _) => emit!(out, "msg->size = sizeof(", m.record, ");"),
            (Some(tail), SizeFieldMode::Bytes) => {
                emit!(out, "msg->size = ", m.func("size"), "(", tail.count_param(), ");")
            }
            (Some(tail), SizeFieldMode::Legacy) => {
                emit!(out, "msg->size = sizeof(", m.record, ") + ", tail.count_param(), ";")
            }
        }
        for field in &m.def.fixed_fields {
            emit!(out, "msg->", field.name, " = ", field.name, ";");
        }
        if let Some(tail) = &m.def.variable_tail {
            emit!(
                out,
                "memmove(msg->", tail.name, ", ", tail.name, ", ",
                tail.count_param(), " * sizeof(", tail.element_type, "));"
            );
        }
    }
    out.write("}");
}

fn emit_new(out: &mut Emitter, config: &GeneratorConfig, m: &Message, form: Form) {
    begin_signature(out, config, form);
    emit_part!(
        out,
        config.result_type, " ", m.func("new"), "(", m.record, " ** out_msg, ",
        config.allocator_type, " * allocator"
    );
    emit_field_params(out, m.def);
    if !end_signature(out, form) {
        return;
    }
    {
        let mut out = out.indented();
        out.write("*out_msg = NULL;");
        emit_part!(
            out,
            config.result_type, " alloc_result = ", config.alloc_fn,
            "(allocator, (void**)out_msg, ", m.func("size"), "("
        );
        if let Some(tail) = &m.def.variable_tail {
            out.append(tail.count_param());
        }
        out.write("));");
        emit!(out, "if (alloc_result != ", config.ok_code, ") return alloc_result;");
        emit!(out, "if (*out_msg == NULL) return ", config.construct_failed, ";");
        emit_part!(out, m.func("ctor"), "(*out_msg");
        emit_field_args(&mut out, m.def);
        out.write(");");
        emit!(out, "return ", config.ok_code, ";");
    }
    out.write("}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscriminantPolicy;
    use crate::schema::Schema;

    fn resolved(messages: Vec<MessageDef>) -> ResolvedSchema {
        let mut schema = Schema::new();
        for m in messages {
            schema.push(m);
        }
        ResolvedSchema::resolve(schema, DiscriminantPolicy::Unique).unwrap()
    }

    fn header(config: &GeneratorConfig, messages: Vec<MessageDef>) -> String {
        let units = generate(&resolved(messages), config, "test.schema").unwrap();
        units[0].text.clone()
    }

    #[test]
    fn fixed_message_functions() {
        let text = header(
            &GeneratorConfig::default(),
            vec![MessageDef::new("PING", "ping").with_field("int", "a")],
        );
        let expected = "\
__attribute__((always_inline)) static inline gh_ipcmsg_ping * gh_ipcmsg_ping_get(gh_ipcmsg * msg) {
    if (msg->type != GH_IPCMSG_PING) return NULL;
    return (gh_ipcmsg_ping *)msg;
}
__attribute__((always_inline)) static inline size_t gh_ipcmsg_ping_size(void) { return sizeof(gh_ipcmsg_ping); }

__attribute__((always_inline)) static inline void gh_ipcmsg_ping_ctor(gh_ipcmsg_ping * msg, int a) {
    msg->type = GH_IPCMSG_PING;
    msg->size = sizeof(gh_ipcmsg_ping);
    msg->a = a;
}

__attribute__((always_inline)) static inline gh_result gh_ipcmsg_ping_new(gh_ipcmsg_ping ** out_msg, gh_alloc * allocator, int a) {
    *out_msg = NULL;
    gh_result alloc_result = gh_alloc_new(allocator, (void**)out_msg, gh_ipcmsg_ping_size());
    if (alloc_result != GHR_OK) return alloc_result;
    if (*out_msg == NULL) return ghr_errno(GHR_IPC_MSGNEWFAIL);
    gh_ipcmsg_ping_ctor(*out_msg, a);
    return GHR_OK;
}
";
        assert!(text.ends_with(expected), "{text}");
    }

    #[test]
    fn legacy_size_field_expression() {
        let config = GeneratorConfig {
            size_field: SizeFieldMode::Legacy,
            ..GeneratorConfig::default()
        };
        let msgs = || vec![MessageDef::new("PONG", "pong").with_field("int", "b").with_tail("char", "a")];
        let legacy = header(&config, msgs());
        assert!(legacy.contains("    msg->size = sizeof(gh_ipcmsg_pong) + a_count;\n"));
        let bytes = header(&GeneratorConfig::default(), msgs());
        assert!(bytes.contains("    msg->size = gh_ipcmsg_pong_size(a_count);\n"));
        for text in [legacy, bytes] {
            assert!(text.contains("    memmove(msg->a, a, a_count * sizeof(char));\n"));
        }
    }

    #[test]
    fn empty_schema_is_an_error() {
        let r = ResolvedSchema::resolve(Schema::new(), DiscriminantPolicy::Unique).unwrap();
        assert!(matches!(
            generate(&r, &GeneratorConfig::default(), "x"),
            Err(GenerateError::EmptySchema)
        ));
    }

    fn collision(messages: Vec<MessageDef>) -> SchemaError {
        match generate(&resolved(messages), &GeneratorConfig::default(), "x") {
            Err(GenerateError::Schema(e)) => e,
            other => panic!("expected a schema error, got {:?}", other.map(|u| u.len())),
        }
    }

    #[test]
    fn record_named_like_discriminant_type_is_rejected() {
        let err = collision(vec![
            MessageDef::new("A", "type").with_field("int", "x"),
            MessageDef::new("B", "b").with_field("int", "y"),
        ]);
        assert_eq!(
            err,
            SchemaError::SymbolCollision {
                symbol: "gh_ipcmsg_type".into(),
                first: "the discriminant type".into(),
                second: "the record of `A`".into(),
            }
        );
    }

    #[test]
    fn record_named_like_another_accessor_is_rejected() {
        let err = collision(vec![
            MessageDef::new("A", "a"),
            MessageDef::new("A_GET", "a_get"),
        ]);
        match err {
            SchemaError::SymbolCollision { symbol, first, second } => {
                assert_eq!(symbol, "gh_ipcmsg_a_get");
                assert_eq!(first, "`A`'s _get function");
                assert_eq!(second, "the record of `A_GET`");
            }
            other => panic!("expected SymbolCollision, got {other}"),
        }
    }

    #[test]
    fn stddef_is_included_even_when_includes_are_replaced() {
        let config = GeneratorConfig {
            includes: vec!["<string.h>".into(), "<stdlib.h>".into()],
            ..GeneratorConfig::default()
        };
        let text = header(&config, vec![MessageDef::new("PING", "ping").with_field("int", "a")]);
        assert!(text.contains(
            "#pragma once\n\n#include <stddef.h>\n#include <string.h>\n#include <stdlib.h>\n"
        ));
        let default = header(&GeneratorConfig::default(), vec![MessageDef::new("PING", "ping")]);
        assert_eq!(default.matches("#include <stddef.h>").count(), 1);
    }

    #[test]
    fn field_types_pull_in_their_headers() {
        let config = GeneratorConfig {
            includes: Vec::new(),
            ..GeneratorConfig::default()
        };
        let text = header(
            &config,
            vec![MessageDef::new("A", "a")
                .with_field("const uint8_t *", "p")
                .with_field("bool", "on")
                .with_tail("int64_t", "xs")],
        );
        assert!(text.contains(
            "#include <stddef.h>\n#include <stdint.h>\n#include <stdbool.h>\n#include <string.h>\n\n"
        ));
        let plain = header(&config, vec![MessageDef::new("B", "b").with_field("int", "x")]);
        assert!(plain.contains("#pragma once\n\n#include <stddef.h>\n\ntypedef enum {"));
    }

    #[test]
    fn asserts_can_be_disabled() {
        let config = GeneratorConfig {
            layout_asserts: false,
            ..GeneratorConfig::default()
        };
        let text = header(&config, vec![MessageDef::new("PING", "ping")]);
        assert!(!text.contains("_Static_assert"));
        assert!(text.contains("gh_ipcmsg_ping_ctor(gh_ipcmsg_ping * msg) {"));
    }
}
