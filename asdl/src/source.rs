//! Types related to source files.

use std::fmt;
use std::ops::{Deref, Range};

use crate::files::FileId;

/// Byte offsets into source files.
pub type BytePos = u32;

/// Byte ranges in source files.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ByteRange {
    file_id: FileId,
    start: BytePos,
    end: BytePos,
}

impl fmt::Debug for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ByteRange({}, {}..{})",
            self.file_id, self.start, self.end
        )
    }
}

impl ByteRange {
    pub const fn new(file_id: FileId, start: BytePos, end: BytePos) -> ByteRange {
        ByteRange {
            file_id,
            start,
            end,
        }
    }

    pub const fn file_id(&self) -> FileId {
        self.file_id
    }

    pub const fn start(&self) -> BytePos {
        self.start
    }

    pub const fn end(&self) -> BytePos {
        self.end
    }

    /// The smallest range covering both `self` and `other`, if they are in
    /// the same file.
    pub fn merge(&self, other: &ByteRange) -> Option<ByteRange> {
        if self.file_id == other.file_id {
            Some(ByteRange::new(
                self.file_id,
                std::cmp::min(self.start, other.start),
                std::cmp::max(self.end, other.end),
            ))
        } else {
            None
        }
    }
}

impl From<ByteRange> for Range<usize> {
    fn from(range: ByteRange) -> Self {
        (range.start as usize)..(range.end as usize)
    }
}

/// Data that covers some range of source code.
#[derive(Debug, Clone)]
pub struct Ranged<Data> {
    pub range: ByteRange,
    pub data: Data,
}

impl<Data> Ranged<Data> {
    pub fn new(range: ByteRange, data: Data) -> Ranged<Data> {
        Ranged { range, data }
    }
}

impl<Data: PartialEq> PartialEq for Ranged<Data> {
    /// Ignores source location metadata.
    fn eq(&self, other: &Ranged<Data>) -> bool {
        self.data == other.data
    }
}

impl<Data: Eq> Eq for Ranged<Data> {}

impl<Data> Deref for Ranged<Data> {
    type Target = Data;

    fn deref(&self) -> &Data {
        &self.data
    }
}

impl<Data: fmt::Display> fmt::Display for Ranged<Data> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.data.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_id() -> FileId {
        FileId::try_from(1).unwrap()
    }

    #[test]
    /// `ByteRange` is used a lot. Ensure it doesn't grow accidentally.
    fn byte_range_size() {
        assert_eq!(std::mem::size_of::<ByteRange>(), 12);
    }

    #[test]
    fn ranged_eq_ignores_ranges() {
        let a = Ranged::new(ByteRange::new(file_id(), 0, 3), "foo");
        let b = Ranged::new(ByteRange::new(file_id(), 10, 13), "foo");
        assert_eq!(a, b);
    }

    #[test]
    fn merge_ranges() {
        let a = ByteRange::new(file_id(), 4, 8);
        let b = ByteRange::new(file_id(), 2, 5);
        let merged = a.merge(&b).unwrap();
        assert_eq!((merged.start(), merged.end()), (2, 8));
    }
}
