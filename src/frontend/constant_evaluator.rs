//! 常量求值
//!
//! Evaluates expressions that must be compile-time constants: switch case
//! labels, const field initializers, references into the program's constant
//! table and const literals. Anything else is a [`BuildError::NotConstant`].

use crate::frontend::error::{BuildError, BuildResult};
use crate::frontend::translation_helper::TranslationHelper;
use crate::il::instruction::ConstantValue;
use crate::kernel::ast::{Expression, ExpressionKind, KernelConstant, LogicalOperator};
use crate::kernel::reader::MemberRef;
use crate::kernel::NameIndex;
use crate::object::store::TypeScope;
use crate::util::span::TokenPosition;

/// Nesting limit for const fields referring to other const fields
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct ConstantEvaluator<'a> {
    helper: TranslationHelper<'a>,
    /// Library the evaluated code belongs to, for private symbols
    library_uri: &'a str,
}

impl<'a> ConstantEvaluator<'a> {
    pub fn new(
        helper: TranslationHelper<'a>,
        library_uri: &'a str,
    ) -> Self {
        Self { helper, library_uri }
    }

    pub fn evaluate_expression(
        &self,
        expression: &Expression,
        scope: TypeScope<'_>,
    ) -> BuildResult<ConstantValue> {
        self.evaluate(expression, scope, 0)
    }

    /// Entry of the program's constant table
    pub fn evaluate_constant(
        &self,
        index: usize,
        scope: TypeScope<'_>,
    ) -> BuildResult<ConstantValue> {
        self.evaluate_table_entry(index, scope, 0)
    }

    fn evaluate(
        &self,
        expression: &Expression,
        scope: TypeScope<'_>,
        depth: usize,
    ) -> BuildResult<ConstantValue> {
        let position = expression.position;
        match &expression.kind {
            ExpressionKind::NullLiteral => Ok(ConstantValue::Null),
            ExpressionKind::BoolLiteral(value) => Ok(ConstantValue::Bool(*value)),
            ExpressionKind::IntLiteral(value) => Ok(ConstantValue::Int(*value)),
            ExpressionKind::DoubleLiteral(value) => Ok(ConstantValue::Double(*value)),
            ExpressionKind::StringLiteral(index) => Ok(ConstantValue::String(self.helper.string(*index).to_string())),
            ExpressionKind::SymbolLiteral(index) => Ok(ConstantValue::Symbol(self.helper.symbol(*index, self.library_uri))),
            ExpressionKind::TypeLiteral(ty) => {
                let ty = self.helper.translate_type(ty, scope);
                if !ty.is_instantiated() {
                    return Err(not_constant(position, "type literal is not instantiated"));
                }
                Ok(ConstantValue::Type(ty))
            }
            ExpressionKind::Constant(index) => self.evaluate_table_entry(*index, scope, depth),
            ExpressionKind::StaticGet { target } => self.evaluate_static_get(*target, position, scope, depth),
            ExpressionKind::Not(operand) => match self.evaluate(operand, scope, depth)? {
                ConstantValue::Bool(value) => Ok(ConstantValue::Bool(!value)),
                _ => Err(not_constant(position, "operand of ! is not a bool")),
            },
            ExpressionKind::Logical { left, operator, right } => {
                let left = self.evaluate_bool(left, scope, depth)?;
                // 短路求值
                match (operator, left) {
                    (LogicalOperator::And, false) => Ok(ConstantValue::Bool(false)),
                    (LogicalOperator::Or, true) => Ok(ConstantValue::Bool(true)),
                    _ => Ok(ConstantValue::Bool(self.evaluate_bool(right, scope, depth)?)),
                }
            }
            ExpressionKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.evaluate_bool(condition, scope, depth)? {
                    self.evaluate(then, scope, depth)
                } else {
                    self.evaluate(otherwise, scope, depth)
                }
            }
            ExpressionKind::StringConcatenation(parts) => {
                let mut text = String::new();
                for part in parts {
                    match self.evaluate(part, scope, depth)? {
                        ConstantValue::String(s) => text.push_str(&s),
                        ConstantValue::Int(i) => text.push_str(&i.to_string()),
                        ConstantValue::Double(d) => text.push_str(&d.to_string()),
                        ConstantValue::Bool(b) => text.push_str(&b.to_string()),
                        ConstantValue::Null => text.push_str("null"),
                        _ => return Err(not_constant(part.position, "interpolated value is not a primitive")),
                    }
                }
                Ok(ConstantValue::String(text))
            }
            ExpressionKind::ListLiteral {
                element_type,
                elements,
                is_const: true,
            } => {
                let element_type = self.helper.translate_type(element_type, scope);
                let elements = elements
                    .iter()
                    .map(|e| self.evaluate(e, scope, depth))
                    .collect::<BuildResult<Vec<_>>>()?;
                Ok(ConstantValue::List { element_type, elements })
            }
            ExpressionKind::MapLiteral {
                key_type,
                value_type,
                entries,
                is_const: true,
            } => {
                let key_type = self.helper.translate_type(key_type, scope);
                let value_type = self.helper.translate_type(value_type, scope);
                let entries = entries
                    .iter()
                    .map(|entry| {
                        Ok((
                            self.evaluate(&entry.key, scope, depth)?,
                            self.evaluate(&entry.value, scope, depth)?,
                        ))
                    })
                    .collect::<BuildResult<Vec<_>>>()?;
                Ok(ConstantValue::Map {
                    key_type,
                    value_type,
                    entries,
                })
            }
            ExpressionKind::ConstructorInvocation { is_const: true, .. } => {
                Err(not_constant(position, "const constructor invocations are not evaluated"))
            }
            _ => Err(not_constant(position, "not a constant expression")),
        }
    }

    fn evaluate_bool(
        &self,
        expression: &Expression,
        scope: TypeScope<'_>,
        depth: usize,
    ) -> BuildResult<bool> {
        match self.evaluate(expression, scope, depth)? {
            ConstantValue::Bool(value) => Ok(value),
            _ => Err(not_constant(expression.position, "condition is not a bool")),
        }
    }

    fn evaluate_static_get(
        &self,
        target: NameIndex,
        position: TokenPosition,
        scope: TypeScope<'_>,
        depth: usize,
    ) -> BuildResult<ConstantValue> {
        if depth >= MAX_DEPTH {
            return Err(not_constant(position, "constant refers to itself"));
        }
        match self.helper.reader().member(target) {
            Some(MemberRef::Field(field)) if field.is_const => match &field.initializer {
                Some(initializer) => self.evaluate(initializer, scope, depth + 1),
                None => Ok(ConstantValue::Null),
            },
            Some(MemberRef::Procedure(_)) => {
                // 静态方法的拆分引用
                let function = self.helper.lookup_function(target)?;
                let store = self.helper.store();
                match store.function(function).implicit_closure {
                    Some(closure) if store.function(function).is_static => Ok(ConstantValue::Closure(closure)),
                    _ => Err(not_constant(position, "tear-off of a non-static member")),
                }
            }
            Some(_) => Err(not_constant(position, "static get of a non-const member")),
            None => Err(BuildError::Unresolved {
                kind: "member",
                name: self.helper.member_name(target),
            }),
        }
    }

    fn evaluate_table_entry(
        &self,
        index: usize,
        scope: TypeScope<'_>,
        depth: usize,
    ) -> BuildResult<ConstantValue> {
        if depth >= MAX_DEPTH {
            return Err(not_constant(TokenPosition::NO_SOURCE, "constant table entry refers to itself"));
        }
        let value = match self.helper.constant(index)? {
            KernelConstant::Null => ConstantValue::Null,
            KernelConstant::Bool(value) => ConstantValue::Bool(*value),
            KernelConstant::Int(value) => ConstantValue::Int(*value),
            KernelConstant::Double(value) => ConstantValue::Double(*value),
            KernelConstant::String(text) => ConstantValue::String(self.helper.string(*text).to_string()),
            KernelConstant::Symbol(text) => ConstantValue::Symbol(self.helper.symbol(*text, self.library_uri)),
            KernelConstant::Type(ty) => ConstantValue::Type(self.helper.translate_type(ty, scope)),
            KernelConstant::List { element_type, elements } => ConstantValue::List {
                element_type: self.helper.translate_type(element_type, scope),
                elements: elements
                    .iter()
                    .map(|&e| self.evaluate_table_entry(e, scope, depth + 1))
                    .collect::<BuildResult<Vec<_>>>()?,
            },
            KernelConstant::Map {
                key_type,
                value_type,
                entries,
            } => ConstantValue::Map {
                key_type: self.helper.translate_type(key_type, scope),
                value_type: self.helper.translate_type(value_type, scope),
                entries: entries
                    .iter()
                    .map(|&(k, v)| {
                        Ok((
                            self.evaluate_table_entry(k, scope, depth + 1)?,
                            self.evaluate_table_entry(v, scope, depth + 1)?,
                        ))
                    })
                    .collect::<BuildResult<Vec<_>>>()?,
            },
            KernelConstant::TearOff(target) => {
                let function = self.helper.lookup_function(*target)?;
                match self.helper.store().function(function).implicit_closure {
                    Some(closure) => ConstantValue::Closure(closure),
                    None => {
                        return Err(not_constant(
                            TokenPosition::NO_SOURCE,
                            format!("'{}' cannot be torn off", self.helper.member_name(*target)),
                        ))
                    }
                }
            }
        };
        Ok(value)
    }
}

fn not_constant(
    position: TokenPosition,
    message: impl Into<String>,
) -> BuildError {
    BuildError::NotConstant {
        position,
        message: message.into(),
    }
}
