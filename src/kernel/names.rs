//! String pool and canonical name table
//!
//! All identifiers in a kernel program live in one UTF-8 pool addressed by
//! [`StringIndex`]. Cross-module references use canonical names: a tree whose
//! root is the program, whose children are libraries (named by import URI),
//! then classes, then administrative nodes (`@methods`, `@fields`, ...) and
//! finally members. Private member names get an extra node naming the library
//! in which they are visible:
//!
//! ```text
//! root / "file:///a.k" / "Foo" / "@methods" / "file:///a.k" / "_bar"
//! ```

use serde::{Deserialize, Serialize};

/// Index into the string pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StringIndex(pub u32);

/// Index into the canonical name table; `NameIndex::ROOT` is the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameIndex(pub u32);

impl NameIndex {
    pub const ROOT: NameIndex = NameIndex(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Concatenated UTF-8 string data plus end offsets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringTable {
    /// `offsets[i]` is the end of string `i`; string `i` starts at `offsets[i - 1]`.
    offsets: Vec<u32>,
    data: String,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a string, returning its index. Equal strings are shared.
    pub fn intern(
        &mut self,
        s: &str,
    ) -> StringIndex {
        if let Some(existing) = self.find(s) {
            return existing;
        }
        self.data.push_str(s);
        self.offsets.push(self.data.len() as u32);
        StringIndex(self.offsets.len() as u32 - 1)
    }

    pub fn find(
        &self,
        s: &str,
    ) -> Option<StringIndex> {
        (0..self.offsets.len())
            .map(|i| StringIndex(i as u32))
            .find(|&index| self.get(index) == s)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    fn start(
        &self,
        index: StringIndex,
    ) -> usize {
        match index.0 {
            0 => 0,
            i => self.offsets[i as usize - 1] as usize,
        }
    }

    /// Byte offset of the string in the pool
    pub fn string_offset(
        &self,
        index: StringIndex,
    ) -> usize {
        self.start(index)
    }

    /// Byte length of the string
    pub fn string_size(
        &self,
        index: StringIndex,
    ) -> usize {
        self.offsets[index.0 as usize] as usize - self.start(index)
    }

    pub fn get(
        &self,
        index: StringIndex,
    ) -> &str {
        let start = self.start(index);
        let end = self.offsets[index.0 as usize] as usize;
        &self.data[start..end]
    }

    /// Byte at `position` of the string, or `None` past the end
    pub fn character_at(
        &self,
        index: StringIndex,
        position: usize,
    ) -> Option<u8> {
        self.get(index).as_bytes().get(position).copied()
    }

    pub fn equals(
        &self,
        index: StringIndex,
        other: &str,
    ) -> bool {
        self.get(index) == other
    }
}

/// One node of the canonical name tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalName {
    pub parent: Option<NameIndex>,
    pub name: StringIndex,
}

/// Canonical name tree stored as a parent-linked table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalNameTable {
    entries: Vec<CanonicalName>,
}

impl CanonicalNameTable {
    /// Create a table holding only the root, named by `root_name`.
    pub fn new(root_name: StringIndex) -> Self {
        Self {
            entries: vec![CanonicalName {
                parent: None,
                name: root_name,
            }],
        }
    }

    /// Add (or find) the child `name` of `parent`
    pub fn child(
        &mut self,
        parent: NameIndex,
        name: StringIndex,
    ) -> NameIndex {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.parent == Some(parent) && e.name == name)
        {
            return NameIndex(pos as u32);
        }
        self.entries.push(CanonicalName {
            parent: Some(parent),
            name,
        });
        NameIndex(self.entries.len() as u32 - 1)
    }

    pub fn lookup_child(
        &self,
        parent: NameIndex,
        name: StringIndex,
    ) -> Option<NameIndex> {
        self.entries
            .iter()
            .position(|e| e.parent == Some(parent) && e.name == name)
            .map(|pos| NameIndex(pos as u32))
    }

    #[inline]
    pub fn parent(
        &self,
        name: NameIndex,
    ) -> Option<NameIndex> {
        self.entries[name.index()].parent
    }

    #[inline]
    pub fn string(
        &self,
        name: NameIndex,
    ) -> StringIndex {
        self.entries[name.index()].name
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Administrative node names
pub mod tags {
    pub const FIELDS: &str = "@fields";
    pub const METHODS: &str = "@methods";
    pub const GETTERS: &str = "@getters";
    pub const SETTERS: &str = "@setters";
    pub const CONSTRUCTORS: &str = "@constructors";
    pub const FACTORIES: &str = "@factories";
}

/// Helper for building canonical names together with their strings
pub struct NameBuilder<'a> {
    pub strings: &'a mut StringTable,
    pub names: &'a mut CanonicalNameTable,
}

impl<'a> NameBuilder<'a> {
    pub fn new(
        strings: &'a mut StringTable,
        names: &'a mut CanonicalNameTable,
    ) -> Self {
        Self { strings, names }
    }

    pub fn library(
        &mut self,
        uri: &str,
    ) -> NameIndex {
        let s = self.strings.intern(uri);
        self.names.child(NameIndex::ROOT, s)
    }

    pub fn class(
        &mut self,
        library: NameIndex,
        name: &str,
    ) -> NameIndex {
        let s = self.strings.intern(name);
        self.names.child(library, s)
    }

    /// Member of `owner` (a class or library) under administrative node `tag`.
    /// `library` is required for private names.
    pub fn member(
        &mut self,
        owner: NameIndex,
        tag: &str,
        library: NameIndex,
        name: &str,
    ) -> NameIndex {
        let tag = self.strings.intern(tag);
        let mut parent = self.names.child(owner, tag);
        if name.starts_with('_') {
            let uri = self.names.string(library);
            parent = self.names.child(parent, uri);
        }
        let s = self.strings.intern(name);
        self.names.child(parent, s)
    }
}
