//! Offset index over a kernel program
//!
//! The graph builder never walks the program from the top; it asks for the
//! node at an offset. [`KernelReader`] builds that index once.

use crate::kernel::ast::{
    Arguments, Class, Constructor, Expression, ExpressionKind, Field, FunctionNode, Initializer, Library,
    NodeOffset, Procedure, Program, Statement, StatementKind,
};
use crate::kernel::names::{NameIndex, StringIndex};
use std::collections::HashMap;

/// Where a function node lives
#[derive(Debug, Clone, Copy)]
pub enum FunctionOwner<'p> {
    Procedure(&'p Procedure),
    Constructor(&'p Constructor),
    /// Closure nested in the function node at the given offset
    Closure { parent: NodeOffset },
}

/// Member whose body encloses a node
#[derive(Debug, Clone, Copy)]
pub enum MemberRef<'p> {
    Procedure(&'p Procedure),
    Constructor(&'p Constructor),
    Field(&'p Field),
}

impl<'p> MemberRef<'p> {
    pub fn canonical_name(&self) -> NameIndex {
        match self {
            MemberRef::Procedure(p) => p.canonical_name,
            MemberRef::Constructor(c) => c.canonical_name,
            MemberRef::Field(f) => f.canonical_name,
        }
    }

    pub fn offset(&self) -> NodeOffset {
        match self {
            MemberRef::Procedure(p) => p.offset,
            MemberRef::Constructor(c) => c.offset,
            MemberRef::Field(f) => f.offset,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionEntry<'p> {
    pub node: &'p FunctionNode,
    pub owner: FunctionOwner<'p>,
    /// Outermost member containing the function
    pub member: MemberRef<'p>,
    pub class: Option<&'p Class>,
    pub library: &'p Library,
}

/// Random access to a [`Program`] by node offset and canonical name
#[derive(Debug)]
pub struct KernelReader<'p> {
    program: &'p Program,
    functions: HashMap<NodeOffset, FunctionEntry<'p>>,
    members: HashMap<NameIndex, MemberRef<'p>>,
    classes: HashMap<NameIndex, (&'p Class, &'p Library)>,
    fields: HashMap<NodeOffset, &'p Field>,
}

impl<'p> KernelReader<'p> {
    pub fn new(program: &'p Program) -> Self {
        let mut reader = Self {
            program,
            functions: HashMap::new(),
            members: HashMap::new(),
            classes: HashMap::new(),
            fields: HashMap::new(),
        };
        for library in &program.libraries {
            for procedure in &library.procedures {
                reader.index_procedure(procedure, None, library);
            }
            for field in &library.fields {
                reader.index_field(field, None, library);
            }
            for class in &library.classes {
                reader.classes.insert(class.canonical_name, (class, library));
                for procedure in &class.procedures {
                    reader.index_procedure(procedure, Some(class), library);
                }
                for constructor in &class.constructors {
                    reader.index_constructor(constructor, class, library);
                }
                for field in &class.fields {
                    reader.index_field(field, Some(class), library);
                }
            }
        }
        reader
    }

    #[inline]
    pub fn program(&self) -> &'p Program {
        self.program
    }

    #[inline]
    pub fn string(
        &self,
        index: StringIndex,
    ) -> &'p str {
        self.program.strings.get(index)
    }

    /// Function node (member body or closure) at `offset`
    pub fn function_at(
        &self,
        offset: NodeOffset,
    ) -> Option<&FunctionEntry<'p>> {
        self.functions.get(&offset)
    }

    pub fn member(
        &self,
        name: NameIndex,
    ) -> Option<MemberRef<'p>> {
        self.members.get(&name).copied()
    }

    pub fn class(
        &self,
        name: NameIndex,
    ) -> Option<&'p Class> {
        self.classes.get(&name).map(|(class, _)| *class)
    }

    pub fn field_at(
        &self,
        offset: NodeOffset,
    ) -> Option<&'p Field> {
        self.fields.get(&offset).copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionEntry<'p>> {
        self.functions.values()
    }

    fn index_field(
        &mut self,
        field: &'p Field,
        class: Option<&'p Class>,
        library: &'p Library,
    ) {
        let member = MemberRef::Field(field);
        self.members.insert(field.canonical_name, member);
        self.fields.insert(field.offset, field);
        // 初始化器中的闭包以字段偏移为父节点
        if let Some(initializer) = &field.initializer {
            let mut closures = Vec::new();
            collect_closures_in_expression(initializer, &mut closures);
            for node in closures {
                let entry = FunctionEntry {
                    node,
                    owner: FunctionOwner::Closure { parent: field.offset },
                    member,
                    class,
                    library,
                };
                self.index_function(entry);
            }
        }
    }

    fn index_procedure(
        &mut self,
        procedure: &'p Procedure,
        class: Option<&'p Class>,
        library: &'p Library,
    ) {
        let member = MemberRef::Procedure(procedure);
        self.members.insert(procedure.canonical_name, member);
        let entry = FunctionEntry {
            node: &procedure.function,
            owner: FunctionOwner::Procedure(procedure),
            member,
            class,
            library,
        };
        self.index_function(entry);
    }

    fn index_constructor(
        &mut self,
        constructor: &'p Constructor,
        class: &'p Class,
        library: &'p Library,
    ) {
        let member = MemberRef::Constructor(constructor);
        self.members.insert(constructor.canonical_name, member);
        let entry = FunctionEntry {
            node: &constructor.function,
            owner: FunctionOwner::Constructor(constructor),
            member,
            class: Some(class),
            library,
        };
        for initializer in &constructor.initializers {
            let mut closures = Vec::new();
            match initializer {
                Initializer::Field { value, .. } => collect_closures_in_expression(value, &mut closures),
                Initializer::Super { arguments, .. } | Initializer::Redirecting { arguments, .. } => {
                    collect_closures_in_arguments(arguments, &mut closures)
                }
                Initializer::Local { variable } => {
                    if let Some(init) = &variable.initializer {
                        collect_closures_in_expression(init, &mut closures);
                    }
                }
                Initializer::Invalid => {}
            }
            for node in closures {
                self.index_closure(node, entry.node.offset, &entry);
            }
        }
        self.index_function(entry);
    }

    fn index_function(
        &mut self,
        entry: FunctionEntry<'p>,
    ) {
        let mut closures = Vec::new();
        for parameter in entry.node.parameters() {
            if let Some(init) = &parameter.initializer {
                collect_closures_in_expression(init, &mut closures);
            }
        }
        if let Some(body) = &entry.node.body {
            collect_closures_in_statement(body, &mut closures);
        }
        let parent = entry.node.offset;
        for node in closures {
            self.index_closure(node, parent, &entry);
        }
        self.functions.insert(entry.node.offset, entry);
    }

    fn index_closure(
        &mut self,
        node: &'p FunctionNode,
        parent: NodeOffset,
        outer: &FunctionEntry<'p>,
    ) {
        let entry = FunctionEntry {
            node,
            owner: FunctionOwner::Closure { parent },
            member: outer.member,
            class: outer.class,
            library: outer.library,
        };
        self.index_function(entry);
    }
}

/// Collect function nodes of closures directly nested in `statement`
/// (closures nested inside those are not included).
pub fn collect_closures_in_statement<'p>(
    statement: &'p Statement,
    out: &mut Vec<&'p FunctionNode>,
) {
    match &statement.kind {
        StatementKind::Expression(e) => collect_closures_in_expression(e, out),
        StatementKind::Block(statements) => {
            for s in statements {
                collect_closures_in_statement(s, out);
            }
        }
        StatementKind::Empty | StatementKind::Break { .. } | StatementKind::ContinueSwitch { .. } => {}
        StatementKind::Assert { condition, message } => {
            collect_closures_in_expression(condition, out);
            if let Some(m) = message {
                collect_closures_in_expression(m, out);
            }
        }
        StatementKind::Labeled(body) => collect_closures_in_statement(body, out),
        StatementKind::While { condition, body } | StatementKind::Do { body, condition } => {
            collect_closures_in_expression(condition, out);
            collect_closures_in_statement(body, out);
        }
        StatementKind::For {
            variables,
            condition,
            updates,
            body,
        } => {
            for v in variables {
                if let Some(init) = &v.initializer {
                    collect_closures_in_expression(init, out);
                }
            }
            if let Some(c) = condition {
                collect_closures_in_expression(c, out);
            }
            for u in updates {
                collect_closures_in_expression(u, out);
            }
            collect_closures_in_statement(body, out);
        }
        StatementKind::ForIn { iterable, body, .. } => {
            collect_closures_in_expression(iterable, out);
            collect_closures_in_statement(body, out);
        }
        StatementKind::Switch { condition, cases } => {
            collect_closures_in_expression(condition, out);
            for case in cases {
                collect_closures_in_statement(&case.body, out);
            }
        }
        StatementKind::If {
            condition,
            then,
            otherwise,
        } => {
            collect_closures_in_expression(condition, out);
            collect_closures_in_statement(then, out);
            if let Some(o) = otherwise {
                collect_closures_in_statement(o, out);
            }
        }
        StatementKind::Return(value) => {
            if let Some(v) = value {
                collect_closures_in_expression(v, out);
            }
        }
        StatementKind::TryCatch { body, catches } => {
            collect_closures_in_statement(body, out);
            for c in catches {
                collect_closures_in_statement(&c.body, out);
            }
        }
        StatementKind::TryFinally { body, finalizer } => {
            collect_closures_in_statement(body, out);
            collect_closures_in_statement(finalizer, out);
        }
        StatementKind::Yield { expression, .. } => collect_closures_in_expression(expression, out),
        StatementKind::VariableDeclaration(v) => {
            if let Some(init) = &v.initializer {
                collect_closures_in_expression(init, out);
            }
        }
        StatementKind::FunctionDeclaration { function, .. } => out.push(function),
    }
}

pub fn collect_closures_in_expression<'p>(
    expression: &'p Expression,
    out: &mut Vec<&'p FunctionNode>,
) {
    use ExpressionKind as E;
    match &expression.kind {
        E::FunctionExpression(function) => out.push(function),
        E::VariableSet { value, .. } | E::StaticSet { value, .. } => collect_closures_in_expression(value, out),
        E::PropertyGet { receiver, .. } | E::DirectPropertyGet { receiver, .. } => {
            collect_closures_in_expression(receiver, out)
        }
        E::PropertySet { receiver, value, .. } | E::DirectPropertySet { receiver, value, .. } => {
            collect_closures_in_expression(receiver, out);
            collect_closures_in_expression(value, out);
        }
        E::MethodInvocation {
            receiver, arguments, ..
        }
        | E::DirectMethodInvocation {
            receiver, arguments, ..
        } => {
            collect_closures_in_expression(receiver, out);
            collect_closures_in_arguments(arguments, out);
        }
        E::SuperMethodInvocation { arguments, .. }
        | E::StaticInvocation { arguments, .. }
        | E::ConstructorInvocation { arguments, .. } => collect_closures_in_arguments(arguments, out),
        E::Not(operand) | E::Throw(operand) => collect_closures_in_expression(operand, out),
        E::Is { operand, .. } | E::As { operand, .. } => collect_closures_in_expression(operand, out),
        E::Logical { left, right, .. } => {
            collect_closures_in_expression(left, out);
            collect_closures_in_expression(right, out);
        }
        E::Conditional {
            condition,
            then,
            otherwise,
        } => {
            collect_closures_in_expression(condition, out);
            collect_closures_in_expression(then, out);
            collect_closures_in_expression(otherwise, out);
        }
        E::StringConcatenation(parts) | E::ListLiteral { elements: parts, .. } => {
            for p in parts {
                collect_closures_in_expression(p, out);
            }
        }
        E::MapLiteral { entries, .. } => {
            for entry in entries {
                collect_closures_in_expression(&entry.key, out);
                collect_closures_in_expression(&entry.value, out);
            }
        }
        E::Let { variable, body } => {
            if let Some(init) = &variable.initializer {
                collect_closures_in_expression(init, out);
            }
            collect_closures_in_expression(body, out);
        }
        E::Invalid
        | E::VariableGet { .. }
        | E::StaticGet { .. }
        | E::StringLiteral(_)
        | E::IntLiteral(_)
        | E::DoubleLiteral(_)
        | E::BoolLiteral(_)
        | E::NullLiteral
        | E::SymbolLiteral(_)
        | E::TypeLiteral(_)
        | E::This
        | E::Rethrow
        | E::Constant(_) => {}
    }
}

fn collect_closures_in_arguments<'p>(
    arguments: &'p Arguments,
    out: &mut Vec<&'p FunctionNode>,
) {
    for e in &arguments.positional {
        collect_closures_in_expression(e, out);
    }
    for n in &arguments.named {
        collect_closures_in_expression(&n.value, out);
    }
}
