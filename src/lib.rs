//! # ipcmsgc: message-layout compiler for tagged-union IPC protocols
//!
//! A schema table describes a closed set of message kinds. From it the compiler assigns
//! discriminants, lays out one C record per message (shared `type`/`size` prefix, fixed
//! fields, optional trailing array) and emits the accessors and constructors that go
//! with them.
//!
//! ## Schema source
//!
//! ```text
//! options {
//!     prefix = "gh_ipcmsg";
//! }
//!
//! table (name, value, desc, shortname, data_fields, va_data) {
//!     ("PING", _, "Test ping message", "ping", ["int a"], _),
//!     ("PONG", _, "Test pong message", "pong", ["int b"], ("char", "a")),
//! }
//! ```
//!
//! Rows without a `value` get the previous discriminant plus one, starting at 0.
//!
//! ## Generated C, per message `<root>` = `<prefix>_<shortname>`
//!
//! - `typedef struct { type; size; fields...; tail[]; } <root>;`
//! - `<root> * <root>_get(<envelope> * msg)`: tag-checked downcast, `NULL` on mismatch
//! - `size_t <root>_size(void)` or `size_t <root>_size(size_t count)`
//! - `void <root>_ctor(<root> * msg, fields..., tail, tail_count)`: in-place constructor
//! - `<result> <root>_new(<root> ** out_msg, <allocator> * allocator, ...)`: allocate and construct
//!
//! ## Usage
//!
//! ```
//! let units = ipcmsgc::compile(
//!     r#"table (name, shortname, data_fields) { ("PING", "ping", ["int a"]) }"#,
//!     "ping.schema",
//!     &[],
//! )
//! .unwrap();
//! assert!(units[0].text.contains("GH_IPCMSG_PING = 0,"));
//! ```
//!
//! The [`layout`] and [`record`] modules model the same records in Rust for inspection
//! and testing.

pub mod codegen;
pub mod config;
pub mod discriminant;
pub mod emit;
pub mod layout;
pub mod parser;
pub mod record;
pub mod schema;
pub mod table;
pub mod value;

pub use codegen::{generate, GenerateError};
pub use config::{DiscriminantPolicy, EmitMode, GeneratorConfig, SizeFieldMode};
pub use emit::{Emitter, Unit};
pub use layout::{DataModel, MessageLayout, ProtocolLayout};
pub use parser::{parse, ParsedSchema};
pub use record::{new_record, Allocator, Envelope, HeapAllocator, RecordError};
pub use schema::{Cell, MessageDef, ResolvedSchema, Schema, SchemaError};
pub use table::SchemaTable;
pub use value::Value;

/// Parse `source`, apply its options and then `overrides`, and resolve the schema.
pub fn load(
    source: &str,
    overrides: &[(String, Cell)],
) -> Result<(ResolvedSchema, GeneratorConfig), SchemaError> {
    let parsed = parse(source)?;
    let mut config = GeneratorConfig::default();
    config.apply_options(&parsed.options)?;
    config.apply_options(overrides)?;
    let resolved = ResolvedSchema::resolve(parsed.schema, config.discriminants)?;
    Ok((resolved, config))
}

/// [`load`] followed by [`generate`].
pub fn compile(
    source: &str,
    source_name: &str,
    overrides: &[(String, Cell)],
) -> Result<Vec<Unit>, GenerateError> {
    let (resolved, config) = load(source, overrides)?;
    generate(&resolved, &config, source_name)
}
