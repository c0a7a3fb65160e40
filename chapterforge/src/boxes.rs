//! The box (ISO/BMFF "atom") tree: every `moov`/`trak`/`stbl`/... structure in this
//! crate is assembled as a plain `Atom` tree, then serialized by one generic walk.
//!
//! A box owns a possibly-empty raw `payload` (the FullBox version/flags +
//! fields, when present) and an ordered list of `children`. Both may be
//! non-empty at once (`stsd`, `meta`) because some boxes carry a FullBox
//! header *and* child boxes.

use crate::bytes::{fourcc, ByteWriter};
use crate::error::{ChapterForgeError, Result};
use std::io::Write;

#[derive(Debug, Clone)]
pub struct Atom {
    pub kind: u32,
    pub payload: Vec<u8>,
    pub children: Vec<Atom>,
    computed_size: u64,
}

impl Atom {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: fourcc(kind),
            payload: Vec::new(),
            children: Vec::new(),
            computed_size: 0,
        }
    }

    pub fn with_payload(kind: &str, payload: Vec<u8>) -> Self {
        Self {
            kind: fourcc(kind),
            payload,
            children: Vec::new(),
            computed_size: 0,
        }
    }

    /// Like `new`, but takes an already-packed box type, for tags that aren't
    /// valid ASCII `&str` (e.g. the `0xA9`-prefixed iTunes metadata keys).
    pub fn new_raw(kind: u32) -> Self {
        Self {
            kind,
            payload: Vec::new(),
            children: Vec::new(),
            computed_size: 0,
        }
    }

    pub fn add_child(&mut self, child: Atom) -> &mut Self {
        self.children.push(child);
        self
    }

    pub fn with_child(mut self, child: Atom) -> Self {
        self.children.push(child);
        self
    }

    /// Pre-order search, including `self` if it matches.
    pub fn find<'a>(&'a self, kind: &str) -> Vec<&'a Atom> {
        let target = fourcc(kind);
        let mut out = Vec::new();
        self.find_into(target, &mut out);
        out
    }

    fn find_into<'a>(&'a self, target: u32, out: &mut Vec<&'a Atom>) {
        if self.kind == target {
            out.push(self);
        }
        for child in &self.children {
            child.find_into(target, out);
        }
    }

    pub fn find_mut<'a>(&'a mut self, kind: &str) -> Vec<&'a mut Atom> {
        let target = fourcc(kind);
        let mut out = Vec::new();
        Self::find_mut_into(self, target, &mut out);
        out
    }

    fn find_mut_into<'a>(atom: &'a mut Atom, target: u32, out: &mut Vec<&'a mut Atom>) {
        // Split the recursion manually since `out` borrows disjoint subtrees.
        let matches = atom.kind == target;
        let Atom { children, .. } = atom;
        for child in children.iter_mut() {
            Self::find_mut_into(child, target, out);
        }
        if matches {
            out.push(atom);
        }
    }

    /// Post-order: sets `computed_size` on every node to `8 + payload.len() + Σ children`.
    pub fn fix_size_recursive(&mut self) -> u64 {
        let mut total = 8u64 + self.payload.len() as u64;
        for child in &mut self.children {
            total += child.fix_size_recursive();
        }
        self.computed_size = total;
        total
    }

    /// Cached size from the last `fix_size_recursive` call.
    pub fn size(&self) -> u64 {
        self.computed_size
    }

    pub fn write<W: Write>(&self, sink: &mut W) -> Result<()> {
        if self.computed_size > u32::MAX as u64 {
            return Err(ChapterForgeError::Oversize {
                what: "box",
                size: self.computed_size,
            });
        }
        let mut header = ByteWriter::with_capacity(8);
        header.put_u32(self.computed_size as u32).put_u32(self.kind);
        sink.write_all(header.as_slice())?;
        sink.write_all(&self.payload)?;
        for child in &self.children {
            child.write(sink)?;
        }
        Ok(())
    }

    pub fn serialize(mut self) -> Result<Vec<u8>> {
        self.fix_size_recursive();
        let mut out = Vec::with_capacity(self.computed_size as usize);
        self.write(&mut out)?;
        Ok(out)
    }
}
