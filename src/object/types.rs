//! Runtime types and call shapes

use crate::object::ClassId;
use std::fmt;

/// Where a type parameter is declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeParameterOwner {
    /// Read from the instantiator type arguments
    Class,
    /// Read from the function type arguments
    Function,
}

/// A type after resolution against the object model
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AbstractType {
    #[default]
    Dynamic,
    Void,
    Bottom,
    Interface {
        class: ClassId,
        name: String,
        arguments: Vec<AbstractType>,
    },
    Function {
        parameters: Vec<AbstractType>,
        named: Vec<(String, AbstractType)>,
        result: Box<AbstractType>,
    },
    TypeParameter {
        name: String,
        index: usize,
        owner: TypeParameterOwner,
    },
    /// Type that failed to resolve; checks against it always throw
    Malformed(String),
}

impl AbstractType {
    /// Does not mention any type parameter
    pub fn is_instantiated(&self) -> bool {
        match self {
            AbstractType::TypeParameter { .. } => false,
            AbstractType::Interface { arguments, .. } => arguments.iter().all(AbstractType::is_instantiated),
            AbstractType::Function {
                parameters,
                named,
                result,
            } => {
                parameters.iter().all(AbstractType::is_instantiated)
                    && named.iter().all(|(_, t)| t.is_instantiated())
                    && result.is_instantiated()
            }
            _ => true,
        }
    }

    /// Mentions a type parameter of the given kind
    pub fn mentions(
        &self,
        owner: TypeParameterOwner,
    ) -> bool {
        match self {
            AbstractType::TypeParameter { owner: o, .. } => *o == owner,
            AbstractType::Interface { arguments, .. } => arguments.iter().any(|t| t.mentions(owner)),
            AbstractType::Function {
                parameters,
                named,
                result,
            } => {
                parameters.iter().any(|t| t.mentions(owner))
                    || named.iter().any(|(_, t)| t.mentions(owner))
                    || result.mentions(owner)
            }
            _ => false,
        }
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, AbstractType::Dynamic)
    }

    /// Every value is assignable to it
    pub fn is_top(
        &self,
        object_class: ClassId,
    ) -> bool {
        match self {
            AbstractType::Dynamic | AbstractType::Void => true,
            AbstractType::Interface { class, .. } => *class == object_class,
            _ => false,
        }
    }

    #[inline]
    pub fn is_malformed(&self) -> bool {
        matches!(self, AbstractType::Malformed(_))
    }

    /// Class of an interface type
    #[inline]
    pub fn class(&self) -> Option<ClassId> {
        match self {
            AbstractType::Interface { class, .. } => Some(*class),
            _ => None,
        }
    }
}

impl fmt::Display for AbstractType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            AbstractType::Dynamic => write!(f, "dynamic"),
            AbstractType::Void => write!(f, "void"),
            AbstractType::Bottom => write!(f, "<bottom>"),
            AbstractType::Interface { name, arguments, .. } => {
                write!(f, "{}", name)?;
                if !arguments.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in arguments.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            AbstractType::Function {
                parameters,
                named,
                result,
            } => {
                write!(f, "(")?;
                for (i, p) in parameters.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                if !named.is_empty() {
                    if !parameters.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "{{")?;
                    for (i, (name, ty)) in named.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{} {}", ty, name)?;
                    }
                    write!(f, "}}")?;
                }
                write!(f, ") => {}", result)
            }
            AbstractType::TypeParameter { name, .. } => write!(f, "{}", name),
            AbstractType::Malformed(reason) => write!(f, "<malformed: {}>", reason),
        }
    }
}

/// Shape of a call site: how many arguments, and which are named
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ArgumentsDescriptor {
    /// Number of type arguments, zero for non-generic calls
    pub type_args_len: usize,
    /// All arguments including the receiver
    pub count: usize,
    pub named: Vec<String>,
}

impl ArgumentsDescriptor {
    pub fn new(
        type_args_len: usize,
        count: usize,
        named: Vec<String>,
    ) -> Self {
        debug_assert!(named.len() <= count);
        Self {
            type_args_len,
            count,
            named,
        }
    }

    #[inline]
    pub fn positional_count(&self) -> usize {
        self.count - self.named.len()
    }

    #[inline]
    pub fn named_count(&self) -> usize {
        self.named.len()
    }

    /// Arguments pushed by the caller, the type argument vector included
    #[inline]
    pub fn pushed_count(&self) -> usize {
        self.count + usize::from(self.type_args_len > 0)
    }
}

impl fmt::Display for ArgumentsDescriptor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "args({}", self.count)?;
        if self.type_args_len > 0 {
            write!(f, ", targs {}", self.type_args_len)?;
        }
        if !self.named.is_empty() {
            write!(f, ", named [{}]", self.named.join(", "))?;
        }
        write!(f, ")")
    }
}
