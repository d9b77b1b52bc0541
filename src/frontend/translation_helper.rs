//! 名称与类型解析服务
//!
//! Resolves canonical names of the kernel program to object model entities,
//! mangles private names, translates kernel types, and composes diagnostics
//! for the errors only this stage can detect.

use crate::frontend::error::{BuildError, BuildResult};
use crate::kernel::ast::{KernelConstant, KernelType, Name, Program};
use crate::kernel::reader::MemberRef;
use crate::kernel::{KernelReader, NameIndex, StringIndex};
use crate::object::store::{private_key, TypeScope, GETTER_PREFIX, SETTER_PREFIX};
use crate::object::{AbstractType, ClassId, FieldId, FunctionId, LibraryId, ObjectStore};
use crate::util::span::TokenPosition;

/// Target of a static get or set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticMember {
    Field(FieldId),
    Function(FunctionId),
}

#[derive(Debug, Clone, Copy)]
pub struct TranslationHelper<'a> {
    reader: &'a KernelReader<'a>,
    store: &'a ObjectStore,
}

impl<'a> TranslationHelper<'a> {
    pub fn new(
        reader: &'a KernelReader<'a>,
        store: &'a ObjectStore,
    ) -> Self {
        Self { reader, store }
    }

    #[inline]
    pub fn reader(&self) -> &'a KernelReader<'a> {
        self.reader
    }

    #[inline]
    pub fn store(&self) -> &'a ObjectStore {
        self.store
    }

    #[inline]
    pub fn program(&self) -> &'a Program {
        self.reader.program()
    }

    // ===== 字符串与名称 =====

    #[inline]
    pub fn string(
        &self,
        index: StringIndex,
    ) -> &'a str {
        self.reader.string(index)
    }

    /// Last component of a canonical name
    pub fn name_string(
        &self,
        name: NameIndex,
    ) -> &'a str {
        self.string(self.program().names.string(name))
    }

    /// Library node a canonical name belongs to
    pub fn enclosing_library(
        &self,
        mut name: NameIndex,
    ) -> Option<NameIndex> {
        let names = &self.program().names;
        loop {
            let parent = names.parent(name)?;
            if parent == NameIndex::ROOT {
                return Some(name);
            }
            name = parent;
        }
    }

    pub fn library_uri(
        &self,
        library: NameIndex,
    ) -> &'a str {
        self.name_string(library)
    }

    /// Member name as stored in the object model
    pub fn member_name(
        &self,
        name: NameIndex,
    ) -> String {
        let text = self.name_string(name);
        if !text.starts_with('_') {
            return text.to_string();
        }
        let uri = self
            .program()
            .names
            .parent(name)
            .map(|library| self.name_string(library))
            .unwrap_or_default();
        format!("{}{}", text, private_key(uri))
    }

    #[inline]
    pub fn is_private(
        &self,
        name: &Name,
    ) -> bool {
        self.string(name.text).starts_with('_')
    }

    /// Selector used for dynamic dispatch on `name`
    pub fn dynamic_name(
        &self,
        name: &Name,
    ) -> String {
        let text = self.string(name.text);
        match name.library {
            Some(library) if text.starts_with('_') => {
                format!("{}{}", text, private_key(self.library_uri(library)))
            }
            _ => text.to_string(),
        }
    }

    pub fn getter_name(
        &self,
        name: &Name,
    ) -> String {
        format!("{}{}", GETTER_PREFIX, self.dynamic_name(name))
    }

    pub fn setter_name(
        &self,
        name: &Name,
    ) -> String {
        format!("{}{}", SETTER_PREFIX, self.dynamic_name(name))
    }

    /// Symbol text; private symbols are mangled with the library they appear in
    pub fn symbol(
        &self,
        text: StringIndex,
        library_uri: &str,
    ) -> String {
        let text = self.string(text);
        if text.starts_with('_') {
            format!("{}{}", text, private_key(library_uri))
        } else {
            text.to_string()
        }
    }

    pub fn constant(
        &self,
        index: usize,
    ) -> BuildResult<&'a KernelConstant> {
        self.program()
            .constants
            .get(index)
            .ok_or_else(|| BuildError::Unresolved {
                kind: "constant",
                name: index.to_string(),
            })
    }

    // ===== 实体查找 =====

    pub fn lookup_library(
        &self,
        name: NameIndex,
    ) -> BuildResult<LibraryId> {
        let uri = self.library_uri(name);
        self.store.lookup_library(uri).ok_or_else(|| BuildError::Unresolved {
            kind: "library",
            name: uri.to_string(),
        })
    }

    pub fn lookup_class(
        &self,
        name: NameIndex,
    ) -> BuildResult<ClassId> {
        self.store
            .resolve_class_name(self.program(), name)
            .ok_or_else(|| BuildError::Unresolved {
                kind: "class",
                name: self.name_string(name).to_string(),
            })
    }

    pub fn lookup_field(
        &self,
        name: NameIndex,
    ) -> BuildResult<FieldId> {
        let field = match self.reader.member(name) {
            Some(MemberRef::Field(field)) => self.store.field_at(field.offset),
            _ => None,
        };
        field.ok_or_else(|| BuildError::Unresolved {
            kind: "field",
            name: self.member_name(name),
        })
    }

    /// Procedure or constructor named by `name`
    pub fn lookup_function(
        &self,
        name: NameIndex,
    ) -> BuildResult<FunctionId> {
        let function = match self.reader.member(name) {
            Some(MemberRef::Procedure(procedure)) => self.store.function_at(procedure.function.offset),
            Some(MemberRef::Constructor(constructor)) => self.store.function_at(constructor.function.offset),
            _ => None,
        };
        function.ok_or_else(|| BuildError::Unresolved {
            kind: "function",
            name: self.member_name(name),
        })
    }

    /// Target of a static get or set: a field or an accessor
    pub fn lookup_static_member(
        &self,
        name: NameIndex,
    ) -> BuildResult<StaticMember> {
        match self.reader.member(name) {
            Some(MemberRef::Field(_)) => self.lookup_field(name).map(StaticMember::Field),
            Some(_) => self.lookup_function(name).map(StaticMember::Function),
            None => Err(BuildError::Unresolved {
                kind: "member",
                name: self.member_name(name),
            }),
        }
    }

    /// The member lives in a library loaded on demand
    pub fn is_deferred(
        &self,
        name: NameIndex,
    ) -> bool {
        self.enclosing_library(name)
            .and_then(|library| self.store.lookup_library(self.library_uri(library)))
            .map(|library| self.store.library(library).is_deferred)
            .unwrap_or(false)
    }

    // ===== 类型 =====

    pub fn translate_type(
        &self,
        ty: &KernelType,
        scope: TypeScope<'_>,
    ) -> AbstractType {
        self.store.resolve_type(self.program(), ty, scope)
    }

    pub fn translate_type_arguments(
        &self,
        types: &[KernelType],
        scope: TypeScope<'_>,
    ) -> Vec<AbstractType> {
        types.iter().map(|ty| self.translate_type(ty, scope)).collect()
    }

    // ===== 诊断 =====

    /// URI of the script a function was read from
    pub fn script_uri(
        &self,
        function: FunctionId,
    ) -> &'a str {
        let owner = self.store.class(self.store.function(function).owner);
        &self.store.library(owner.library).uri
    }

    pub fn report_error(
        &self,
        script: &str,
        position: TokenPosition,
        message: impl Into<String>,
    ) -> BuildError {
        BuildError::Compile {
            script: script.to_string(),
            position,
            message: message.into(),
        }
    }
}
