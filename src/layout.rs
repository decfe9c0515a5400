//! C record layout for a resolved schema.
//!
//! Computes what a C compiler would for the generated records on a given data model:
//! field offsets, the flexible-array offset, `sizeof` and alignment. Every record starts
//! with the envelope prefix (an `int`-sized enum tag, then a `size_t`), so the prefix
//! offsets are the same for every message; [`EnvelopeLayout`] holds them once.
//!
//! Only scalar C types are understood (see [`DataModel::scalar`]). Generation does not
//! depend on this module; it exists for `describe` and for the [record](crate::record)
//! runtime.

use crate::schema::ResolvedSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataModel {
    /// 64-bit Unix: 8-byte `long`, `size_t` and pointers.
    #[default]
    Lp64,
    /// 32-bit x86: 4-byte `long`, `size_t` and pointers; 8-byte scalars aligned to 4.
    Ilp32,
}

/// Byte order of multi-byte fields in a record buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    Big,
    #[default]
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Signed,
    Unsigned,
    Float,
    Bool,
    Pointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CScalar {
    pub kind: ScalarKind,
    pub size: usize,
    pub align: usize,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("message `{message}`: field `{field}` has unsupported type `{ty}`")]
    UnsupportedType {
        message: String,
        field: String,
        ty: String,
    },
}

impl DataModel {
    pub fn word_size(self) -> usize {
        match self {
            DataModel::Lp64 => 8,
            DataModel::Ilp32 => 4,
        }
    }

    fn wide_align(self) -> usize {
        match self {
            DataModel::Lp64 => 8,
            DataModel::Ilp32 => 4,
        }
    }

    /// Layout of a scalar C type, ignoring `const`/`volatile`.
    pub fn scalar(self, ty: &str) -> Option<CScalar> {
        let words: Vec<&str> = ty
            .split_whitespace()
            .filter(|w| *w != "const" && *w != "volatile")
            .collect();
        let normalized = words.join(" ");
        let word = self.word_size();
        if normalized.ends_with('*') {
            return Some(CScalar {
                kind: ScalarKind::Pointer,
                size: word,
                align: word,
            });
        }
        let (kind, size) = match normalized.as_str() {
            "char" | "signed char" | "int8_t" => (ScalarKind::Signed, 1),
            "unsigned char" | "uint8_t" => (ScalarKind::Unsigned, 1),
            "bool" | "_Bool" => (ScalarKind::Bool, 1),
            "short" | "short int" | "signed short" | "int16_t" => (ScalarKind::Signed, 2),
            "unsigned short" | "unsigned short int" | "uint16_t" => (ScalarKind::Unsigned, 2),
            "int" | "signed" | "signed int" | "int32_t" => (ScalarKind::Signed, 4),
            "unsigned" | "unsigned int" | "uint32_t" => (ScalarKind::Unsigned, 4),
            "long" | "long int" | "signed long" | "ssize_t" | "ptrdiff_t" | "intptr_t" => {
                (ScalarKind::Signed, word)
            }
            "unsigned long" | "unsigned long int" | "size_t" | "uintptr_t" => {
                (ScalarKind::Unsigned, word)
            }
            "long long" | "long long int" | "signed long long" | "int64_t" => (ScalarKind::Signed, 8),
            "unsigned long long" | "unsigned long long int" | "uint64_t" => (ScalarKind::Unsigned, 8),
            "float" => (ScalarKind::Float, 4),
            "double" => (ScalarKind::Float, 8),
            _ => return None,
        };
        Some(CScalar {
            kind,
            size,
            align: size.min(self.wide_align()),
        })
    }

    /// The discriminant enum: a C `int`.
    pub fn tag(self) -> CScalar {
        CScalar {
            kind: ScalarKind::Signed,
            size: 4,
            align: 4,
        }
    }

    pub fn size_t(self) -> CScalar {
        let word = self.word_size();
        CScalar {
            kind: ScalarKind::Unsigned,
            size: word,
            align: word,
        }
    }
}

pub fn align_up(offset: usize, align: usize) -> usize {
    offset.div_ceil(align) * align
}

/// Offsets of the shared `type` and `size` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeLayout {
    pub tag: CScalar,
    pub tag_offset: usize,
    pub size: CScalar,
    pub size_offset: usize,
    /// First byte after the prefix; the envelope's opaque `_data[]` starts here.
    pub header_size: usize,
    /// `sizeof` the envelope record.
    pub structural_size: usize,
}

impl EnvelopeLayout {
    pub fn new(model: DataModel) -> Self {
        let tag = model.tag();
        let size = model.size_t();
        let size_offset = align_up(tag.size, size.align);
        let header_size = size_offset + size.size;
        EnvelopeLayout {
            tag,
            tag_offset: 0,
            size,
            size_offset,
            header_size,
            structural_size: align_up(header_size, tag.align.max(size.align)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub ty: String,
    pub scalar: CScalar,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailLayout {
    pub name: String,
    pub element_type: String,
    pub element: CScalar,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLayout {
    pub name: String,
    pub short_name: String,
    pub discriminant: i64,
    pub fields: Vec<FieldLayout>,
    pub tail: Option<TailLayout>,
    /// `sizeof` the record, not counting tail elements.
    pub structural_size: usize,
    pub align: usize,
}

impl MessageLayout {
    /// Bytes needed for a record with `count` tail elements.
    ///
    /// Fixed-size messages have no count; any non-zero `count` yields `None`.
    pub fn record_size(&self, count: usize) -> Option<usize> {
        match &self.tail {
            Some(tail) => count
                .checked_mul(tail.element.size)?
                .checked_add(self.structural_size),
            None if count == 0 => Some(self.structural_size),
            None => None,
        }
    }

    pub fn element_size(&self) -> Option<usize> {
        self.tail.as_ref().map(|t| t.element.size)
    }

    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolLayout {
    pub model: DataModel,
    pub endianness: Endianness,
    pub envelope: EnvelopeLayout,
    pub messages: Vec<MessageLayout>,
}

impl ProtocolLayout {
    pub fn compute(resolved: &ResolvedSchema, model: DataModel) -> Result<Self, LayoutError> {
        let envelope = EnvelopeLayout::new(model);
        let mut messages = Vec::with_capacity(resolved.schema.len());
        for (def, discriminant) in resolved.messages() {
            let unsupported = |field: &str, ty: &str| LayoutError::UnsupportedType {
                message: def.name.clone(),
                field: field.to_string(),
                ty: ty.to_string(),
            };
            let mut offset = envelope.header_size;
            let mut align = envelope.tag.align.max(envelope.size.align);
            let mut fields = Vec::with_capacity(def.fixed_fields.len());
            for f in &def.fixed_fields {
                let scalar = model.scalar(&f.ty).ok_or_else(|| unsupported(&f.name, &f.ty))?;
                offset = align_up(offset, scalar.align);
                fields.push(FieldLayout {
                    name: f.name.clone(),
                    ty: f.ty.clone(),
                    scalar,
                    offset,
                });
                offset += scalar.size;
                align = align.max(scalar.align);
            }
            let tail = match &def.variable_tail {
                Some(t) => {
                    let element = model
                        .scalar(&t.element_type)
                        .ok_or_else(|| unsupported(&t.name, &t.element_type))?;
                    align = align.max(element.align);
                    offset = align_up(offset, element.align);
                    Some(TailLayout {
                        name: t.name.clone(),
                        element_type: t.element_type.clone(),
                        element,
                        offset,
                    })
                }
                None => None,
            };
            messages.push(MessageLayout {
                name: def.name.clone(),
                short_name: def.short_name.clone(),
                discriminant,
                fields,
                tail,
                structural_size: align_up(offset, align),
                align,
            });
        }
        Ok(ProtocolLayout {
            model,
            endianness: Endianness::default(),
            envelope,
            messages,
        })
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn get(&self, name: &str) -> Option<&MessageLayout> {
        self.messages.iter().find(|m| m.name == name)
    }

    /// First message declared with `tag`.
    pub fn by_tag(&self, tag: i64) -> Option<&MessageLayout> {
        self.messages.iter().find(|m| m.discriminant == tag)
    }
}
