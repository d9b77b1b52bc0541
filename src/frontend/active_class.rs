//! 活动类上下文
//!
//! The lexical type environment of the code being translated: enclosing
//! class, member, innermost function, and the type parameters visible at
//! this point. Nested translation installs a new environment and gets the
//! previous one back to restore on every exit path.

use crate::object::store::TypeScope;
use crate::object::{ClassId, FunctionId, FunctionKind, ObjectStore};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveClass {
    pub class: Option<ClassId>,
    /// Member whose body is being translated
    pub member: Option<FunctionId>,
    /// Innermost function, a closure when translating one
    pub enclosing: Option<FunctionId>,
    pub class_type_parameters: Vec<String>,
    /// Type parameters of the enclosing functions, innermost last
    pub function_type_parameters: Vec<String>,
}

impl ActiveClass {
    /// Environment of `function` and the functions enclosing it
    pub fn for_function(
        store: &ObjectStore,
        function: FunctionId,
    ) -> Self {
        let f = store.function(function);
        let member = store.outermost_function(function);
        let class = store.class(f.owner);

        // 静态成员看不到类型参数，工厂除外
        let member_function = store.function(member);
        let sees_class_parameters = !member_function.is_static || member_function.kind == FunctionKind::Factory;
        let class_type_parameters = if sees_class_parameters {
            class.type_parameters.clone()
        } else {
            Vec::new()
        };

        let mut chain = vec![function];
        let mut current = f.parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = store.function(parent).parent;
        }
        let function_type_parameters = chain
            .iter()
            .rev()
            .flat_map(|&id| store.function(id).type_parameters.iter().cloned())
            .collect();

        Self {
            class: Some(f.owner),
            member: Some(member),
            enclosing: Some(function),
            class_type_parameters,
            function_type_parameters,
        }
    }

    pub fn type_scope(&self) -> TypeScope<'_> {
        TypeScope {
            class_parameters: &self.class_type_parameters,
            function_parameters: &self.function_type_parameters,
        }
    }

    /// Install `next`, returning the environment to restore afterwards
    pub fn enter(
        &mut self,
        next: ActiveClass,
    ) -> ActiveClass {
        std::mem::replace(self, next)
    }

    pub fn restore(
        &mut self,
        saved: ActiveClass,
    ) {
        *self = saved;
    }
}
