use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::function::Function;
use super::value::Value;

/// How a variable came to exist in its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Local,
    Parameter,
    OptionalParameter,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub value: Value,
    pub binding: Binding,
}

/// A scope: variables, functions and an optional parent. Cloning shares
/// the scope.
#[derive(Clone)]
pub struct Env(Rc<RefCell<EnvData>>);

/// Non-owning link to a scope, held by the functions defined in it.
#[derive(Clone)]
pub struct WeakEnv(Weak<RefCell<EnvData>>);

struct EnvData {
    variables: HashMap<String, Variable>,
    functions: HashMap<String, Function>,
    parent: Option<Env>,
}

impl Env {
    pub fn new() -> Self {
        Env(Rc::new(RefCell::new(EnvData {
            variables: HashMap::new(),
            functions: HashMap::new(),
            parent: None,
        })))
    }

    pub fn child(&self) -> Self {
        Env(Rc::new(RefCell::new(EnvData {
            variables: HashMap::new(),
            functions: HashMap::new(),
            parent: Some(self.clone()),
        })))
    }

    pub fn downgrade(&self) -> WeakEnv {
        WeakEnv(Rc::downgrade(&self.0))
    }

    pub fn is_global(&self) -> bool {
        self.0.borrow().parent.is_none()
    }

    /// Reads a variable of this scope only. Enclosing scopes are not
    /// consulted.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0
            .borrow()
            .variables
            .get(name)
            .map(|var| var.value.clone())
    }

    pub fn variable(&self, name: &str) -> Option<Variable> {
        self.0.borrow().variables.get(name).cloned()
    }

    /// Stores `value`, creating a local if the name is new. An existing
    /// variable keeps its binding kind.
    pub fn set(&self, name: &str, value: Value) {
        let mut data = self.0.borrow_mut();
        match data.variables.get_mut(name) {
            Some(var) => var.value = value,
            None => {
                data.variables.insert(
                    name.to_string(),
                    Variable {
                        value,
                        binding: Binding::Local,
                    },
                );
            }
        }
    }

    pub fn bind(&self, name: impl Into<String>, value: Value, binding: Binding) {
        self.0
            .borrow_mut()
            .variables
            .insert(name.into(), Variable { value, binding });
    }

    /// Looks a function up here, then in each enclosing scope.
    pub fn function(&self, name: &str) -> Option<Function> {
        let data = self.0.borrow();
        if let Some(func) = data.functions.get(name) {
            return Some(func.clone());
        }
        data.parent.as_ref().and_then(|parent| parent.function(name))
    }

    pub fn define_function(&self, name: impl Into<String>, func: Function) {
        self.0.borrow_mut().functions.insert(name.into(), func);
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl WeakEnv {
    pub fn upgrade(&self) -> Option<Env> {
        self.0.upgrade().map(Env)
    }
}
