//! OHeap, a binary encoding of values.
//!
//! The output is a sequence of blocks of `alignment` bytes. Blocks are
//! addressed by index, so a reference of `ref_width` bytes can address
//! `alignment` times more memory than a byte offset of the same width.
//!
//! ```text
//! block 0        "OHP" 0x01, padded
//! block 1        alignment byte, root reference, padded
//! blocks 2..     values, depth first in post-order
//! ```
//!
//! Every value is written after the values it refers to, so a reference
//! always points backwards. Integers, booleans, values of external types and
//! simple sums are stored inline in `int_width` little-endian bytes. Strings,
//! arrays and records are stored in their own blocks.

use std::fmt;
use std::io::{self, Seek, SeekFrom, Write};

use crate::core::value::Value;
use crate::core::{Decl, DeclId, DeclKind, Desc, TypeLookup};

pub mod read;

pub const MAGIC: &[u8; 3] = b"OHP";
pub const VERSION: u8 = 1;

/// Block index of the root reference.
const ROOT_BLOCK: u64 = 1;
/// The first block available to values.
const FIRST_VALUE_BLOCK: u64 = 2;

/// Encoding parameters. Every width is in bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Params {
    alignment: usize,
    tag_width: usize,
    ref_width: usize,
    int_width: usize,
    index_width: usize,
}

impl Default for Params {
    fn default() -> Params {
        Params {
            alignment: 4,
            tag_width: 1,
            ref_width: 3,
            int_width: 3,
            index_width: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    WidthOutOfRange { name: &'static str, width: usize },
    AlignmentNotPowerOfTwo(usize),
    AlignmentTooSmall { alignment: usize, min: usize },
    AlignmentTooLarge(usize),
}

impl fmt::Display for ParamsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamsError::WidthOutOfRange { name, width } => {
                write!(f, "{name} must be between 1 and 8 bytes, found {width}")
            }
            ParamsError::AlignmentNotPowerOfTwo(alignment) => {
                write!(f, "alignment must be a power of two, found {alignment}")
            }
            ParamsError::AlignmentTooSmall { alignment, min } => {
                write!(f, "alignment must be at least {min}, found {alignment}")
            }
            ParamsError::AlignmentTooLarge(alignment) => {
                write!(f, "alignment must fit in a byte, found {alignment}")
            }
        }
    }
}

impl std::error::Error for ParamsError {}

impl Params {
    pub fn new(
        alignment: usize,
        tag_width: usize,
        ref_width: usize,
        int_width: usize,
        index_width: usize,
    ) -> Result<Params, ParamsError> {
        let widths = [
            ("tag width", tag_width),
            ("ref width", ref_width),
            ("int width", int_width),
            ("index width", index_width),
        ];
        for (name, width) in widths {
            if !(1..=8).contains(&width) {
                return Err(ParamsError::WidthOutOfRange { name, width });
            }
        }

        if !alignment.is_power_of_two() {
            return Err(ParamsError::AlignmentNotPowerOfTwo(alignment));
        }
        // The header block holds the magic and version, and block 1 holds
        // the alignment byte followed by the root reference.
        let min = std::cmp::max(MAGIC.len() + 1, 1 + ref_width);
        if alignment < min {
            return Err(ParamsError::AlignmentTooSmall { alignment, min });
        }
        if alignment > u8::MAX as usize {
            return Err(ParamsError::AlignmentTooLarge(alignment));
        }

        Ok(Params {
            alignment,
            tag_width,
            ref_width,
            int_width,
            index_width,
        })
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn tag_width(&self) -> usize {
        self.tag_width
    }

    pub fn ref_width(&self) -> usize {
        self.ref_width
    }

    pub fn int_width(&self) -> usize {
        self.int_width
    }

    pub fn index_width(&self) -> usize {
        self.index_width
    }

    /// Byte offset of the root reference.
    pub fn root_ref_offset(&self) -> u64 {
        ROOT_BLOCK * self.alignment as u64 + 1
    }
}

/// Whether `n` can be stored in `width` bytes.
pub(crate) fn fits(n: u64, width: usize) -> bool {
    width >= 8 || n >> (width * 8) == 0
}

#[derive(Debug)]
pub enum EncodeError {
    Io(io::Error),
    RootNotRecord,
    /// An error while encoding a field of a record. Only the innermost
    /// record is recorded.
    InRecord {
        record: String,
        field: String,
        error: Box<EncodeError>,
    },
    NegativeInt(i64),
    IntOverflow { value: u64, width: usize },
    TagOverflow { tag: u32, width: usize },
    RefOverflow { block: u64, width: usize },
    LengthOverflow { len: usize, width: usize },
    NulInString,
    UnsupportedOptional { desc: String },
    Mismatch { expected: String, found: String },
    FieldCount { expected: usize, found: usize },
}

impl EncodeError {
    /// The error without record context.
    pub fn innermost(&self) -> &EncodeError {
        match self {
            EncodeError::InRecord { error, .. } => error.innermost(),
            error => error,
        }
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::Io(error) => write!(f, "failed to write output: {error}"),
            EncodeError::RootNotRecord => write!(f, "the root value must be a record"),
            EncodeError::InRecord {
                record,
                field,
                error,
            } => write!(f, "{error} (in field `{field}` of `{record}`)"),
            EncodeError::NegativeInt(value) => {
                write!(f, "negative integer {value} cannot be encoded")
            }
            EncodeError::IntOverflow { value, width } => {
                write!(f, "{value} is too big to fit in {width} bytes")
            }
            EncodeError::TagOverflow { tag, width } => {
                write!(f, "tag {tag} is too big to fit in {width} bytes")
            }
            EncodeError::RefOverflow { block, width } => {
                write!(f, "block {block} cannot be referenced with {width} bytes")
            }
            EncodeError::LengthOverflow { len, width } => {
                write!(f, "length {len} is too big to fit in {width} bytes")
            }
            EncodeError::NulInString => write!(f, "strings cannot contain NUL bytes"),
            EncodeError::UnsupportedOptional { desc } => {
                write!(f, "optional values of type `{desc}` cannot be encoded")
            }
            EncodeError::Mismatch { expected, found } => {
                write!(f, "expected a value of type `{expected}`, found {found}")
            }
            EncodeError::FieldCount { expected, found } => {
                write!(f, "expected {expected} field values, found {found}")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

impl From<io::Error> for EncodeError {
    fn from(error: io::Error) -> EncodeError {
        EncodeError::Io(error)
    }
}

pub trait SeekWrite: Seek + Write {}

impl<T: Seek + Write> SeekWrite for T {}

/// Aligned block output, keeping track of block indices for references.
struct Output<'w> {
    writer: &'w mut dyn SeekWrite,
    alignment: usize,
    next_block: u64,
}

impl<'w> Output<'w> {
    /// Pad and write a block, returning its index.
    fn write_block(&mut self, mut chunk: Vec<u8>) -> io::Result<u64> {
        let padding = match chunk.len() % self.alignment {
            0 if !chunk.is_empty() => 0,
            rem => self.alignment - rem,
        };
        chunk.resize(chunk.len() + padding, 0);
        self.writer.write_all(&chunk)?;

        let block = self.next_block;
        self.next_block += (chunk.len() / self.alignment) as u64;
        Ok(block)
    }
}

pub struct Context<'a> {
    lookup: &'a TypeLookup,
    params: Params,
}

impl<'a> Context<'a> {
    pub fn new(lookup: &'a TypeLookup, params: Params) -> Context<'a> {
        Context { lookup, params }
    }

    /// Encode a record and everything it refers to.
    pub fn encode(&self, writer: &mut dyn SeekWrite, root: &Value) -> Result<(), EncodeError> {
        let root_decl = match root {
            Value::Record { decl, .. } => *decl,
            _ => return Err(EncodeError::RootNotRecord),
        };

        let mut out = Output {
            writer,
            alignment: self.params.alignment,
            next_block: 0,
        };

        let mut header = MAGIC.to_vec();
        header.push(VERSION);
        out.write_block(header)?;
        // The root reference is patched in once it is known
        out.write_block(vec![self.params.alignment as u8])?;
        debug_assert_eq!(out.next_block, FIRST_VALUE_BLOCK);

        let root_ref = self.encode_record(&mut out, root_decl, root)?;

        let mut chunk = Vec::with_capacity(self.params.ref_width);
        self.write_ref(&mut chunk, root_ref)?;
        out.writer
            .seek(SeekFrom::Start(self.params.root_ref_offset()))?;
        out.writer.write_all(&chunk)?;
        out.writer.seek(SeekFrom::End(0))?;

        tracing::debug!(root = root_ref, blocks = out.next_block, "encoded value");

        Ok(())
    }

    fn encode_record(
        &self,
        out: &mut Output<'_>,
        expected: DeclId,
        value: &Value,
    ) -> Result<u64, EncodeError> {
        let decl = self.lookup.decl(expected);
        let (variant, field_values) = match value {
            Value::Record {
                decl,
                variant,
                fields,
            } if *decl == expected => (*variant, fields),
            value => return Err(self.mismatch(&decl_desc(expected, decl), value)),
        };

        let mut chunk = Vec::new();
        let (name, field_descs) = match (&decl.kind, variant) {
            (DeclKind::Product(product), None) => (decl.name.as_str(), product.fields.as_slice()),
            (DeclKind::Sum(sum), Some(tag)) if !sum.is_simple => match sum.variant(tag) {
                Some(variant) => {
                    self.write_tag(&mut chunk, tag)?;
                    (variant.name.as_str(), variant.fields.as_slice())
                }
                None => return Err(self.mismatch(&decl_desc(expected, decl), value)),
            },
            _ => return Err(self.mismatch(&decl_desc(expected, decl), value)),
        };

        if field_descs.len() != field_values.len() {
            return Err(EncodeError::FieldCount {
                expected: field_descs.len(),
                found: field_values.len(),
            });
        }

        for (field, value) in field_descs.iter().zip(field_values) {
            if let Err(error) = self.encode_field(out, &mut chunk, &field.desc, value) {
                return Err(match error {
                    EncodeError::InRecord { .. } => error,
                    error => {
                        tracing::error!(record = name, field = %field.name, "{error}");
                        EncodeError::InRecord {
                            record: name.to_owned(),
                            field: field.name.clone(),
                            error: Box::new(error),
                        }
                    }
                });
            }
        }

        Ok(out.write_block(chunk)?)
    }

    fn encode_field(
        &self,
        out: &mut Output<'_>,
        chunk: &mut Vec<u8>,
        desc: &Desc,
        value: &Value,
    ) -> Result<(), EncodeError> {
        match desc {
            Desc::Str | Desc::Sum(_) | Desc::Product(_) if !self.is_inline(desc) => {
                let block = self.encode_out_of_line(out, desc, value)?;
                self.write_ref(chunk, block)
            }
            Desc::Array(elem) => match value {
                Value::Array(elems) => {
                    let block = self.encode_array(out, elem, elems)?;
                    self.write_ref(chunk, block)
                }
                value => Err(self.mismatch(desc, value)),
            },
            Desc::Maybe(elem) => {
                if !self.is_record(elem) {
                    return Err(EncodeError::UnsupportedOptional {
                        desc: self.lookup.display_desc(elem).to_string(),
                    });
                }
                match value {
                    Value::Maybe(None) => self.write_ref(chunk, 0),
                    Value::Maybe(Some(value)) => {
                        let block = self.encode_out_of_line(out, elem, value)?;
                        self.write_ref(chunk, block)
                    }
                    value => Err(self.mismatch(desc, value)),
                }
            }
            _ => self.encode_inline(chunk, desc, value),
        }
    }

    /// Write a string or record to its own block.
    fn encode_out_of_line(
        &self,
        out: &mut Output<'_>,
        desc: &Desc,
        value: &Value,
    ) -> Result<u64, EncodeError> {
        match (desc, value) {
            (Desc::Str, Value::Str(s)) => self.encode_str(out, s),
            (Desc::Sum(id) | Desc::Product(id), value) => self.encode_record(out, *id, value),
            (desc, value) => Err(self.mismatch(desc, value)),
        }
    }

    fn encode_str(&self, out: &mut Output<'_>, s: &str) -> Result<u64, EncodeError> {
        if s.as_bytes().contains(&0) {
            return Err(EncodeError::NulInString);
        }
        if !fits(s.len() as u64, self.params.index_width) {
            return Err(EncodeError::LengthOverflow {
                len: s.len(),
                width: self.params.index_width,
            });
        }

        let mut chunk = Vec::with_capacity(s.len() + 1);
        chunk.extend_from_slice(s.as_bytes());
        chunk.push(0);
        Ok(out.write_block(chunk)?)
    }

    fn encode_array(
        &self,
        out: &mut Output<'_>,
        elem: &Desc,
        elems: &[Value],
    ) -> Result<u64, EncodeError> {
        let mut chunk = Vec::new();
        self.write_uint(&mut chunk, elems.len() as u64, self.params.index_width)
            .map_err(|_| EncodeError::LengthOverflow {
                len: elems.len(),
                width: self.params.index_width,
            })?;

        for value in elems {
            if self.is_inline(elem) {
                self.encode_inline(&mut chunk, elem, value)?;
            } else {
                let block = self.encode_out_of_line(out, elem, value)?;
                self.write_ref(&mut chunk, block)?;
            }
        }

        Ok(out.write_block(chunk)?)
    }

    fn encode_inline(
        &self,
        chunk: &mut Vec<u8>,
        desc: &Desc,
        value: &Value,
    ) -> Result<(), EncodeError> {
        let n = match (desc, value) {
            (Desc::Int | Desc::User(_), Value::Int(n)) => *n,
            (Desc::Bool, Value::Bool(b)) => i64::from(*b),
            (Desc::Sum(id), Value::Enum { decl, tag }) if decl == id => i64::from(*tag),
            (desc, value) => return Err(self.mismatch(desc, value)),
        };

        match u64::try_from(n) {
            Ok(n) => self.write_uint(chunk, n, self.params.int_width),
            Err(_) => Err(EncodeError::NegativeInt(n)),
        }
    }

    /// Whether values of this type are stored inline in `int_width` bytes.
    fn is_inline(&self, desc: &Desc) -> bool {
        match desc {
            Desc::Int | Desc::Bool | Desc::User(_) => true,
            Desc::Sum(id) => self.lookup.decl(*id).is_simple_sum(),
            Desc::Str | Desc::Array(_) | Desc::Maybe(_) | Desc::Product(_) => false,
        }
    }

    fn is_record(&self, desc: &Desc) -> bool {
        match desc {
            Desc::Product(_) => true,
            Desc::Sum(id) => !self.lookup.decl(*id).is_simple_sum(),
            _ => false,
        }
    }

    fn write_uint(&self, chunk: &mut Vec<u8>, n: u64, width: usize) -> Result<(), EncodeError> {
        if !fits(n, width) {
            return Err(EncodeError::IntOverflow { value: n, width });
        }
        chunk.extend_from_slice(&n.to_le_bytes()[..width]);
        Ok(())
    }

    fn write_tag(&self, chunk: &mut Vec<u8>, tag: u32) -> Result<(), EncodeError> {
        let width = self.params.tag_width;
        self.write_uint(chunk, u64::from(tag), width)
            .map_err(|_| EncodeError::TagOverflow { tag, width })
    }

    fn write_ref(&self, chunk: &mut Vec<u8>, block: u64) -> Result<(), EncodeError> {
        let width = self.params.ref_width;
        self.write_uint(chunk, block, width)
            .map_err(|_| EncodeError::RefOverflow { block, width })
    }

    fn mismatch(&self, expected: &Desc, found: &Value) -> EncodeError {
        EncodeError::Mismatch {
            expected: self.lookup.display_desc(expected).to_string(),
            found: describe_value(self.lookup, found),
        }
    }
}

fn decl_desc(id: DeclId, decl: &Decl) -> Desc {
    match decl.kind {
        DeclKind::Sum(_) => Desc::Sum(id),
        DeclKind::Product(_) => Desc::Product(id),
    }
}

fn describe_value(lookup: &TypeLookup, value: &Value) -> String {
    match value {
        Value::Int(_) => "an integer".to_owned(),
        Value::Bool(_) => "a boolean".to_owned(),
        Value::Str(_) => "a string".to_owned(),
        Value::Array(_) => "an array".to_owned(),
        Value::Maybe(_) => "an optional value".to_owned(),
        Value::Enum { decl, .. } | Value::Record { decl, .. } => {
            format!("a value of type `{}`", lookup.decl(*decl).name)
        }
    }
}
