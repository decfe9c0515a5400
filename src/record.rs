//! Reference runtime for the generated records.
//!
//! Interprets a [`ProtocolLayout`] over byte buffers the same way the generated C does:
//! records are built in place after an injected [`Allocator`] hands out memory, and an
//! [`Envelope`] is downcast to a concrete message by comparing its tag.
//!
//! | Generated C | Here |
//! |-------------|------|
//! | `<root>_get` | [`Envelope::downcast`] |
//! | `<root>_size` | [`MessageLayout::record_size`] |
//! | `<root>_ctor` | [`construct_in_place`] |
//! | `<root>_new` | [`new_record`] |
//!
//! Field values are checked against their C types before any memory is requested, so a
//! failed construction never leaves a partial record behind.

use crate::config::SizeFieldMode;
use crate::layout::{CScalar, Endianness, EnvelopeLayout, MessageLayout, ProtocolLayout};
use crate::value::Value;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Failure reported by an [`Allocator`]; forwarded unchanged by [`new_record`].
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("allocation of {size} bytes failed (code {code})")]
pub struct AllocError {
    pub code: u32,
    pub size: usize,
}

/// Memory source for [`new_record`].
///
/// `Ok(None)` is a success that produced no memory; callers treat it as distinct from
/// `Err`. Implementations shared between threads must be `Sync`; record construction
/// itself holds no shared state.
pub trait Allocator {
    fn allocate(&self, size: usize) -> Result<Option<Vec<u8>>, AllocError>;
}

/// Zeroed heap buffers.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl Allocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Result<Option<Vec<u8>>, AllocError> {
        Ok(Some(vec![0; size]))
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error("allocator reported success but returned no memory")]
    ConstructionFailed,
    #[error("buffer of {len} bytes is too small for a {needed}-byte record")]
    BufferTooSmall { needed: usize, len: usize },
    #[error("{message}: expected {expected} field values, got {found}")]
    FieldCount {
        message: String,
        expected: usize,
        found: usize,
    },
    #[error("{message}: value for `{field}` does not fit `{ty}`")]
    ValueOutOfRange {
        message: String,
        field: String,
        ty: String,
    },
    #[error("{0} has no variable tail")]
    UnexpectedTail(String),
    #[error("record size overflows")]
    SizeOverflow,
}

fn read_uint(bytes: &[u8], size: usize, endianness: Endianness) -> u64 {
    match endianness {
        Endianness::Big => BigEndian::read_uint(bytes, size),
        Endianness::Little => LittleEndian::read_uint(bytes, size),
    }
}

fn write_uint(bytes: &mut [u8], value: u64, size: usize, endianness: Endianness) {
    match endianness {
        Endianness::Big => BigEndian::write_uint(bytes, value, size),
        Endianness::Little => LittleEndian::write_uint(bytes, value, size),
    }
}

/// An owned record viewed through the shared prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    bytes: Vec<u8>,
    layout: EnvelopeLayout,
    endianness: Endianness,
}

impl Envelope {
    /// Wrap bytes holding a record; `None` if they cannot hold the prefix.
    pub fn from_bytes(bytes: Vec<u8>, protocol: &ProtocolLayout) -> Option<Self> {
        (bytes.len() >= protocol.envelope.header_size).then(|| Envelope {
            bytes,
            layout: protocol.envelope,
            endianness: protocol.endianness,
        })
    }

    pub fn tag(&self) -> i64 {
        let t = self.layout.tag;
        let raw = read_uint(&self.bytes[self.layout.tag_offset..], t.size, self.endianness);
        Value::from_bits(raw, t).as_i64().unwrap_or_default()
    }

    pub fn size_field(&self) -> u64 {
        let s = self.layout.size;
        read_uint(&self.bytes[self.layout.size_offset..], s.size, self.endianness)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// View as `message` if the tag matches. Never copies or allocates.
    pub fn downcast<'a>(&'a self, message: &'a MessageLayout) -> Option<MessageView<'a>> {
        (self.tag() == message.discriminant).then_some(MessageView {
            envelope: self,
            layout: message,
        })
    }
}

/// A record known to be of one message kind.
#[derive(Debug, Clone, Copy)]
pub struct MessageView<'a> {
    envelope: &'a Envelope,
    layout: &'a MessageLayout,
}

impl<'a> MessageView<'a> {
    pub fn layout(&self) -> &'a MessageLayout {
        self.layout
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        let f = self.layout.field(name)?;
        self.read(f.offset, f.scalar)
    }

    fn read(&self, offset: usize, scalar: CScalar) -> Option<Value> {
        let bytes = self.envelope.bytes.get(offset..offset + scalar.size)?;
        let raw = read_uint(bytes, scalar.size, self.envelope.endianness);
        Some(Value::from_bits(raw, scalar))
    }

    /// Tail element count recovered from the `size` field.
    pub fn tail_count(&self, mode: SizeFieldMode) -> usize {
        let Some(tail) = &self.layout.tail else {
            return 0;
        };
        let extra = (self.envelope.size_field() as usize).saturating_sub(self.layout.structural_size);
        match mode {
            SizeFieldMode::Bytes => extra / tail.element.size,
            SizeFieldMode::Legacy => extra,
        }
    }

    /// Tail elements present in the buffer, at most `tail_count(mode)` of them.
    pub fn tail(&self, mode: SizeFieldMode) -> Vec<Value> {
        let Some(tail) = &self.layout.tail else {
            return Vec::new();
        };
        (0..self.tail_count(mode))
            .map_while(|i| self.read(tail.offset + i * tail.element.size, tail.element))
            .collect()
    }
}

/// Values checked against a message layout, ready to be written.
struct Encoded {
    fields: Vec<u64>,
    tail: Vec<u64>,
    size: usize,
    size_field: u64,
}

fn encode(
    message: &MessageLayout,
    fields: &[Value],
    tail: &[Value],
    mode: SizeFieldMode,
) -> Result<Encoded, RecordError> {
    if fields.len() != message.fields.len() {
        return Err(RecordError::FieldCount {
            message: message.name.clone(),
            expected: message.fields.len(),
            found: fields.len(),
        });
    }
    let out_of_range = |field: &str, ty: &str| RecordError::ValueOutOfRange {
        message: message.name.clone(),
        field: field.to_string(),
        ty: ty.to_string(),
    };
    let fields = message
        .fields
        .iter()
        .zip(fields)
        .map(|(f, v)| v.to_bits(f.scalar).ok_or_else(|| out_of_range(&f.name, &f.ty)))
        .collect::<Result<Vec<_>, _>>()?;
    let tail = match &message.tail {
        Some(t) => tail
            .iter()
            .map(|v| v.to_bits(t.element).ok_or_else(|| out_of_range(&t.name, &t.element_type)))
            .collect::<Result<Vec<_>, _>>()?,
        None if tail.is_empty() => Vec::new(),
        None => return Err(RecordError::UnexpectedTail(message.name.clone())),
    };
    let size = message
        .record_size(tail.len())
        .ok_or(RecordError::SizeOverflow)?;
    let size_field = match (mode, &message.tail) {
        (SizeFieldMode::Legacy, Some(_)) => message.structural_size + tail.len(),
        _ => size,
    };
    Ok(Encoded {
        fields,
        tail,
        size,
        size_field: size_field as u64,
    })
}

fn write_encoded(
    buf: &mut [u8],
    protocol: &ProtocolLayout,
    message: &MessageLayout,
    encoded: &Encoded,
) -> Result<(), RecordError> {
    if buf.len() < encoded.size {
        return Err(RecordError::BufferTooSmall {
            needed: encoded.size,
            len: buf.len(),
        });
    }
    let env = &protocol.envelope;
    let e = protocol.endianness;
    let tag_bits = Value::I64(message.discriminant)
        .to_bits(env.tag)
        .ok_or(RecordError::SizeOverflow)?;
    let size_bits = Value::U64(encoded.size_field)
        .to_bits(env.size)
        .ok_or(RecordError::SizeOverflow)?;
    write_uint(&mut buf[env.tag_offset..], tag_bits, env.tag.size, e);
    write_uint(&mut buf[env.size_offset..], size_bits, env.size.size, e);
    for (f, bits) in message.fields.iter().zip(&encoded.fields) {
        write_uint(&mut buf[f.offset..], *bits, f.scalar.size, e);
    }
    if let Some(t) = &message.tail {
        for (i, bits) in encoded.tail.iter().enumerate() {
            write_uint(&mut buf[t.offset + i * t.element.size..], *bits, t.element.size, e);
        }
    }
    Ok(())
}

/// Build a `message` record in memory the caller already owns.
pub fn construct_in_place(
    buf: &mut [u8],
    protocol: &ProtocolLayout,
    message: &MessageLayout,
    fields: &[Value],
    tail: &[Value],
    mode: SizeFieldMode,
) -> Result<(), RecordError> {
    let encoded = encode(message, fields, tail, mode)?;
    write_encoded(buf, protocol, message, &encoded)
}

/// Size, allocate and construct a `message` record.
///
/// An allocator error is returned as-is; a successful allocation without memory is
/// [`RecordError::ConstructionFailed`].
pub fn new_record<A: Allocator + ?Sized>(
    allocator: &A,
    protocol: &ProtocolLayout,
    message: &MessageLayout,
    fields: &[Value],
    tail: &[Value],
    mode: SizeFieldMode,
) -> Result<Envelope, RecordError> {
    let encoded = encode(message, fields, tail, mode)?;
    let mut bytes = allocator
        .allocate(encoded.size)?
        .ok_or(RecordError::ConstructionFailed)?;
    write_encoded(&mut bytes, protocol, message, &encoded)?;
    Ok(Envelope {
        bytes,
        layout: protocol.envelope,
        endianness: protocol.endianness,
    })
}
