//! Decoding of OHeap blobs back into values.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use crate::core::binary::{Params, MAGIC, ROOT_BLOCK, VERSION};
use crate::core::value::Value;
use crate::core::{DeclId, DeclKind, Desc, TypeLookup};

#[derive(Debug)]
pub enum ReadError {
    Io(io::Error),
    BadMagic,
    UnsupportedVersion(u8),
    AlignmentMismatch { expected: usize, found: u8 },
    /// A reference that is not strictly smaller than the block containing it.
    ForwardRef { block: u64, parent: u64 },
    NullRef { parent: u64 },
    RefOutOfBounds { block: u64, blocks: u64 },
    InvalidTag { decl: String, tag: u64 },
    InvalidBool(u64),
    IntOutOfRange(u64),
    UnterminatedString { block: u64 },
    InvalidUtf8 { block: u64 },
    /// The root type is an enum, which cannot be referenced.
    RootNotRecord,
    Unsupported { desc: String },
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Io(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
                write!(f, "unexpected end of input")
            }
            ReadError::Io(error) => write!(f, "failed to read input: {error}"),
            ReadError::BadMagic => write!(f, "not an OHeap file"),
            ReadError::UnsupportedVersion(version) => {
                write!(f, "unsupported OHeap version {version}")
            }
            ReadError::AlignmentMismatch { expected, found } => {
                write!(f, "expected an alignment of {expected}, found {found}")
            }
            ReadError::ForwardRef { block, parent } => {
                write!(f, "block {parent} refers forward to block {block}")
            }
            ReadError::NullRef { parent } => write!(f, "block {parent} contains a null reference"),
            ReadError::RefOutOfBounds { block, blocks } => {
                write!(f, "reference to block {block} is outside of the {blocks} blocks")
            }
            ReadError::InvalidTag { decl, tag } => write!(f, "invalid tag {tag} for `{decl}`"),
            ReadError::InvalidBool(n) => write!(f, "invalid boolean {n}"),
            ReadError::IntOutOfRange(n) => write!(f, "integer {n} is out of range"),
            ReadError::UnterminatedString { block } => {
                write!(f, "string in block {block} is not terminated")
            }
            ReadError::InvalidUtf8 { block } => {
                write!(f, "string in block {block} is not valid UTF-8")
            }
            ReadError::RootNotRecord => write!(f, "the root type must be a product or sum"),
            ReadError::Unsupported { desc } => {
                write!(f, "values of type `{desc}` cannot be decoded")
            }
        }
    }
}

impl std::error::Error for ReadError {}

impl From<io::Error> for ReadError {
    fn from(error: io::Error) -> ReadError {
        ReadError::Io(error)
    }
}

pub trait SeekRead: Seek + Read {}

impl<T: Seek + Read> SeekRead for T {}

pub struct Context<'a> {
    lookup: &'a TypeLookup,
    params: Params,
}

/// The decoder's view of the input.
struct Input<'r> {
    reader: &'r mut dyn SeekRead,
    blocks: u64,
}

impl<'a> Context<'a> {
    pub fn new(lookup: &'a TypeLookup, params: Params) -> Context<'a> {
        Context { lookup, params }
    }

    /// Read a blob whose root value has the type `root`.
    pub fn read(&self, reader: &mut dyn SeekRead, root: DeclId) -> Result<Value, ReadError> {
        if self.lookup.decl(root).is_simple_sum() {
            return Err(ReadError::RootNotRecord);
        }

        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let [m0, m1, m2, version] = read_array(reader)?;
        if &[m0, m1, m2] != MAGIC {
            return Err(ReadError::BadMagic);
        }
        if version != VERSION {
            return Err(ReadError::UnsupportedVersion(version));
        }

        let mut input = Input {
            reader,
            blocks: len / self.params.alignment() as u64,
        };

        self.seek_block(&mut input, ROOT_BLOCK)?;
        let [alignment] = read_array(input.reader)?;
        if alignment as usize != self.params.alignment() {
            return Err(ReadError::AlignmentMismatch {
                expected: self.params.alignment(),
                found: alignment,
            });
        }
        let root_ref = self.read_ref(&mut input, ROOT_BLOCK)?;

        self.read_record(&mut input, root, root_ref)
    }

    fn read_record(
        &self,
        input: &mut Input<'_>,
        id: DeclId,
        block: u64,
    ) -> Result<Value, ReadError> {
        self.seek_block(input, block)?;
        let decl = self.lookup.decl(id);

        let (variant, field_descs) = match &decl.kind {
            DeclKind::Product(product) => (None, product.fields.as_slice()),
            DeclKind::Sum(sum) => {
                let tag = read_uint(input.reader, self.params.tag_width())?;
                let variant = u32::try_from(tag).ok().and_then(|tag| sum.variant(tag));
                match variant {
                    Some(variant) => (Some(variant.tag), variant.fields.as_slice()),
                    None => {
                        return Err(ReadError::InvalidTag {
                            decl: decl.name.clone(),
                            tag,
                        })
                    }
                }
            }
        };

        // Read the whole record before following any of its references
        let mut raw_fields = Vec::with_capacity(field_descs.len());
        for field in field_descs {
            let width = match self.is_inline(&field.desc) {
                true => self.params.int_width(),
                false => self.params.ref_width(),
            };
            raw_fields.push(read_uint(input.reader, width)?);
        }

        let mut fields = Vec::with_capacity(field_descs.len());
        for (field, raw) in field_descs.iter().zip(raw_fields) {
            fields.push(self.read_field(input, &field.desc, raw, block)?);
        }

        Ok(Value::Record {
            decl: id,
            variant,
            fields,
        })
    }

    /// Interpret a field's raw inline value or reference.
    fn read_field(
        &self,
        input: &mut Input<'_>,
        desc: &Desc,
        raw: u64,
        parent: u64,
    ) -> Result<Value, ReadError> {
        if self.is_inline(desc) {
            return self.inline_value(desc, raw);
        }

        match desc {
            Desc::Maybe(_) if raw == 0 => Ok(Value::Maybe(None)),
            Desc::Maybe(elem) => {
                let block = self.check_ref(input, raw, parent)?;
                let value = self.read_out_of_line(input, elem, block)?;
                Ok(Value::Maybe(Some(Box::new(value))))
            }
            Desc::Array(elem) => {
                let block = self.check_ref(input, raw, parent)?;
                self.read_array(input, elem, block)
            }
            desc => {
                let block = self.check_ref(input, raw, parent)?;
                self.read_out_of_line(input, desc, block)
            }
        }
    }

    fn read_out_of_line(
        &self,
        input: &mut Input<'_>,
        desc: &Desc,
        block: u64,
    ) -> Result<Value, ReadError> {
        match desc {
            Desc::Str => self.read_str(input, block),
            Desc::Sum(id) | Desc::Product(id) => self.read_record(input, *id, block),
            // Arrays of arrays and optional scalars are never encoded
            desc => Err(ReadError::Unsupported {
                desc: self.lookup.display_desc(desc).to_string(),
            }),
        }
    }

    fn read_array(
        &self,
        input: &mut Input<'_>,
        elem: &Desc,
        block: u64,
    ) -> Result<Value, ReadError> {
        self.seek_block(input, block)?;
        let len = read_uint(input.reader, self.params.index_width())?;

        let width = match self.is_inline(elem) {
            true => self.params.int_width(),
            false => self.params.ref_width(),
        };
        // Bound the allocation by what the input can actually hold
        let capacity = std::cmp::min(len, input.blocks * self.params.alignment() as u64);
        let mut raw_elems = Vec::with_capacity(capacity as usize);
        for _ in 0..len {
            raw_elems.push(read_uint(input.reader, width)?);
        }

        let mut elems = Vec::with_capacity(raw_elems.len());
        for raw in raw_elems {
            elems.push(self.read_field(input, elem, raw, block)?);
        }

        Ok(Value::Array(elems))
    }

    fn read_str(&self, input: &mut Input<'_>, block: u64) -> Result<Value, ReadError> {
        self.seek_block(input, block)?;

        let mut bytes = Vec::new();
        loop {
            match read_array::<1>(input.reader) {
                Ok([0]) => break,
                Ok([byte]) => bytes.push(byte),
                Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(ReadError::UnterminatedString { block })
                }
                Err(error) => return Err(ReadError::Io(error)),
            }
        }

        match String::from_utf8(bytes) {
            Ok(s) => Ok(Value::Str(s)),
            Err(_) => Err(ReadError::InvalidUtf8 { block }),
        }
    }

    fn inline_value(&self, desc: &Desc, raw: u64) -> Result<Value, ReadError> {
        match desc {
            Desc::Bool => match raw {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                raw => Err(ReadError::InvalidBool(raw)),
            },
            Desc::Sum(id) => {
                let decl = self.lookup.decl(*id);
                let valid = match &decl.kind {
                    DeclKind::Sum(sum) => u32::try_from(raw).ok().and_then(|tag| sum.variant(tag)),
                    DeclKind::Product(_) => None,
                };
                match valid {
                    Some(variant) => Ok(Value::Enum {
                        decl: *id,
                        tag: variant.tag,
                    }),
                    None => Err(ReadError::InvalidTag {
                        decl: decl.name.clone(),
                        tag: raw,
                    }),
                }
            }
            _ => match i64::try_from(raw) {
                Ok(n) => Ok(Value::Int(n)),
                Err(_) => Err(ReadError::IntOutOfRange(raw)),
            },
        }
    }

    fn read_ref(&self, input: &mut Input<'_>, parent: u64) -> Result<u64, ReadError> {
        let raw = read_uint(input.reader, self.params.ref_width())?;
        self.check_ref(input, raw, parent)
    }

    /// References must point strictly backwards, past the header blocks.
    fn check_ref(&self, input: &Input<'_>, block: u64, parent: u64) -> Result<u64, ReadError> {
        if block == 0 {
            return Err(ReadError::NullRef { parent });
        }
        if block >= input.blocks {
            return Err(ReadError::RefOutOfBounds {
                block,
                blocks: input.blocks,
            });
        }
        // The root reference lives in block 1, so it points forwards
        if parent != ROOT_BLOCK && block >= parent {
            return Err(ReadError::ForwardRef { block, parent });
        }
        if parent == ROOT_BLOCK && block <= ROOT_BLOCK {
            return Err(ReadError::ForwardRef { block, parent });
        }
        Ok(block)
    }

    fn seek_block(&self, input: &mut Input<'_>, block: u64) -> io::Result<()> {
        let offset = block * self.params.alignment() as u64;
        input.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn is_inline(&self, desc: &Desc) -> bool {
        match desc {
            Desc::Int | Desc::Bool | Desc::User(_) => true,
            Desc::Sum(id) => self.lookup.decl(*id).is_simple_sum(),
            Desc::Str | Desc::Array(_) | Desc::Maybe(_) | Desc::Product(_) => false,
        }
    }
}

fn read_array<const N: usize>(reader: &mut dyn SeekRead) -> io::Result<[u8; N]> {
    let mut buf = [0; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read a little-endian unsigned integer of `width` bytes.
fn read_uint(reader: &mut dyn SeekRead, width: usize) -> io::Result<u64> {
    let mut buf = [0; 8];
    reader.read_exact(&mut buf[..width])?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::core::binary;
    use crate::files::FileId;
    use crate::surface::{elaboration, Module};

    fn lookup(source: &str) -> TypeLookup {
        let module = Module::parse(FileId::try_from(1).unwrap(), source).unwrap();
        elaboration::elaborate(&module, &["id".to_owned()]).unwrap()
    }

    fn round_trip(lookup: &TypeLookup, params: Params, value: &Value) -> Value {
        let root = match value {
            Value::Record { decl, .. } => *decl,
            _ => panic!("expected a record"),
        };
        let mut buffer = Cursor::new(Vec::new());
        binary::Context::new(lookup, params)
            .encode(&mut buffer, value)
            .unwrap();
        Context::new(lookup, params).read(&mut buffer, root).unwrap()
    }

    const SCHEMA: &str = "module M {
        op = Add | Sub
        expr = Const(int i)
             | Binary(op op, expr left, expr right)
             | Call(string name, expr* args, id tok, bool pure)
             | Let(binding b, expr body)
        binding = (string name, expr? init, op* ops)
    }";

    fn sample(lookup: &TypeLookup) -> Value {
        let (expr, _) = lookup.by_constructor("expr", "Const").unwrap();
        let (op, _) = lookup.by_constructor("op", "Sub").unwrap();
        let binding = match lookup.by_type_name("binding") {
            Some(Desc::Product(id)) => *id,
            desc => panic!("unexpected descriptor: {desc:?}"),
        };
        let spids = |ids: &[i64]| Value::Array(ids.iter().map(|&id| Value::Int(id)).collect());
        let constant = |i| Value::Record {
            decl: expr,
            variant: Some(1),
            fields: vec![Value::Int(i), spids(&[i])],
        };

        Value::Record {
            decl: expr,
            variant: Some(4),
            fields: vec![
                Value::Record {
                    decl: binding,
                    variant: None,
                    fields: vec![
                        Value::Str("x".to_owned()),
                        Value::Maybe(Some(Box::new(constant(7)))),
                        Value::Array(vec![
                            Value::Enum { decl: op, tag: 2 },
                            Value::Enum { decl: op, tag: 1 },
                        ]),
                        spids(&[]),
                    ],
                },
                Value::Record {
                    decl: expr,
                    variant: Some(3),
                    fields: vec![
                        Value::Str("f".to_owned()),
                        Value::Array(vec![
                            constant(1),
                            Value::Record {
                                decl: expr,
                                variant: Some(2),
                                fields: vec![
                                    Value::Enum { decl: op, tag: 1 },
                                    constant(2),
                                    constant(3),
                                    spids(&[1, 2]),
                                ],
                            },
                        ]),
                        Value::Int(5),
                        Value::Bool(true),
                        spids(&[]),
                    ],
                },
                spids(&[42]),
            ],
        }
    }

    #[test]
    fn encode_then_decode_is_identity() {
        let lookup = lookup(SCHEMA);
        let value = sample(&lookup);

        assert_eq!(round_trip(&lookup, Params::default(), &value), value);
        let wide = Params::new(8, 2, 4, 8, 4).unwrap();
        assert_eq!(round_trip(&lookup, wide, &value), value);
    }

    #[test]
    fn bad_magic() {
        let lookup = lookup(SCHEMA);
        let (expr, _) = lookup.by_constructor("expr", "Const").unwrap();
        let mut input = Cursor::new(b"OHQ\x01\x04\x02\0\0".to_vec());

        let error = Context::new(&lookup, Params::default())
            .read(&mut input, expr)
            .unwrap_err();
        assert!(matches!(error, ReadError::BadMagic));
    }

    #[test]
    fn forward_refs_are_rejected() {
        let lookup = lookup("module M { wrap = (string s) }");
        let wrap = match lookup.by_type_name("wrap") {
            Some(Desc::Product(id)) => *id,
            desc => panic!("unexpected descriptor: {desc:?}"),
        };
        // The record in block 2 refers to a string in block 3
        let mut bytes = b"OHP\x01\x04\x02\0\0".to_vec();
        bytes.extend_from_slice(&[3, 0, 0, 0, 0, 0, 0, 0]);
        bytes.extend_from_slice(b"hi\0\0");

        let error = Context::new(&lookup, Params::default())
            .read(&mut Cursor::new(bytes), wrap)
            .unwrap_err();
        assert!(matches!(error, ReadError::ForwardRef { block: 3, parent: 2 }));
    }

    #[test]
    fn out_of_bounds_root() {
        let lookup = lookup("module M { wrap = (string s) }");
        let wrap = match lookup.by_type_name("wrap") {
            Some(Desc::Product(id)) => *id,
            desc => panic!("unexpected descriptor: {desc:?}"),
        };
        let mut input = Cursor::new(b"OHP\x01\x04\x09\0\0".to_vec());

        let error = Context::new(&lookup, Params::default())
            .read(&mut input, wrap)
            .unwrap_err();
        assert!(matches!(error, ReadError::RefOutOfBounds { block: 9, blocks: 2 }));
    }
}
