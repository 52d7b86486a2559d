use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{Arg, AssignOp, Callee, Node, NodeKind, Param, Program};
use crate::config::Settings;
use crate::diagnostics::{ConsoleReporter, LexError, ParseError, Reporter};
use crate::parser;
use crate::span::Span;

mod builtins;
pub mod env;
pub mod function;
pub mod plugin;
pub mod rewrite;
pub mod value;

pub use env::{Binding, Env, Variable};
pub use function::{ArgList, Argument, Function, NativeFn, UserFunction};
pub use plugin::{
    dynamic_lib_filename, DylibLoader, ImportTarget, ModuleLoader, NativeModule, PluginRegistry,
    StaticLoader, StaticModule, SymbolTable,
};
pub use value::{apply_binary, apply_unary, Clip, Value, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Type,
    Arity,
    ArgumentOrder,
    UnknownParameter,
    Name,
    Assignment,
    Syntax,
    Configuration,
    OutOfMemory,
    Io,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Type => "TypeError",
            ErrorKind::Arity => "ArityError",
            ErrorKind::ArgumentOrder => "ArgumentOrderError",
            ErrorKind::UnknownParameter => "UnknownParameterError",
            ErrorKind::Name => "NameError",
            ErrorKind::Assignment => "AssignmentError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::OutOfMemory => "OutOfMemoryError",
            ErrorKind::Io => "IoError",
        }
    }
}

/// A fatal evaluation error. Once located it keeps the line and function
/// it was first attributed to.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    kind: ErrorKind,
    message: String,
    span: Option<Span>,
    function: Option<String>,
}

impl RuntimeError {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            function: None,
        }
    }

    pub fn type_error<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn name_error<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Name, message)
    }

    pub fn syntax<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn located(mut self, span: Span, function: Option<&str>) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
            self.function = function.map(str::to_string);
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn span(&self) -> Option<Span> {
        self.span
    }

    pub fn line(&self) -> Option<usize> {
        self.span.map(|span| span.line)
    }

    pub fn function(&self) -> Option<&str> {
        self.function.as_deref()
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

impl std::error::Error for RuntimeError {}

impl From<LexError> for RuntimeError {
    fn from(err: LexError) -> Self {
        let span = err.span();
        RuntimeError::syntax(err.to_string()).located(span, None)
    }
}

impl From<ParseError> for RuntimeError {
    fn from(err: ParseError) -> Self {
        let kind = match err {
            ParseError::ArgumentOrder { .. } | ParseError::ParameterOrder { .. } => {
                ErrorKind::ArgumentOrder
            }
            _ => ErrorKind::Syntax,
        };
        let span = err.span();
        RuntimeError::new(kind, err.to_string()).located(span, None)
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Outcome of evaluating a node: keep going, or unwind to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Continue(Value),
    Return(Value),
}

impl Flow {
    pub fn into_value(self) -> Value {
        match self {
            Flow::Continue(value) | Flow::Return(value) => value,
        }
    }
}

/// Caller state saved across a call.
struct Frame {
    function: Option<String>,
    span: Span,
}

pub struct Interpreter {
    globals: Env,
    plugin_dir: PathBuf,
    script_extension: String,
    reporter: Box<dyn Reporter>,
    loader: Box<dyn ModuleLoader>,
    span: Span,
    current_function: Option<String>,
    importing: Vec<PathBuf>,
    // Must stay the last field: dropped after the scopes.
    plugins: PluginRegistry,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_settings(&Settings::default())
    }

    pub fn with_settings(settings: &Settings) -> Self {
        let mut interpreter = Self {
            globals: Env::new(),
            plugin_dir: settings.plugin_dir(),
            script_extension: settings.script_extension.clone(),
            reporter: Box::new(ConsoleReporter::new(settings.color)),
            loader: Box::new(DylibLoader),
            span: Span::default(),
            current_function: None,
            importing: Vec::new(),
            plugins: PluginRegistry::default(),
        };
        builtins::register(&mut interpreter);
        interpreter
    }

    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = dir.into();
        self
    }

    pub fn with_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Adds a native function to the global scope.
    pub fn register_core(&mut self, name: &str, func: NativeFn) {
        self.globals.define_function(
            name,
            Function::Core {
                name: name.to_string(),
                func,
            },
        );
    }

    pub fn globals(&self) -> Env {
        self.globals.clone()
    }

    /// Reads a global variable.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name)
    }

    pub fn current_line(&self) -> usize {
        self.span.line
    }

    pub fn current_function(&self) -> Option<&str> {
        self.current_function.as_deref()
    }

    /// Writes a plain message through the reporter.
    pub fn message(&mut self, text: &str) {
        self.reporter.message(text);
    }

    pub fn warn(&mut self, text: &str) {
        let line = self.current_line();
        self.reporter
            .warning(line, self.current_function.as_deref(), text);
    }

    pub fn run_source(&mut self, source: &str) -> RuntimeResult<()> {
        let program = parser::parse(source)?;
        self.run(program)
    }

    /// Evaluates each top-level statement in the global scope, dropping it
    /// once it has run. A top-level `return` ends the script.
    pub fn run(&mut self, program: Program) -> RuntimeResult<()> {
        let globals = self.globals.clone();
        for statement in program.statements {
            let span = statement.span;
            self.span = span;
            let statement = rewrite::rewrite(statement).map_err(|err| err.located(span, None))?;
            let flow = self
                .evaluate(&globals, &statement)
                .map_err(|err| self.locate(err))?;
            if let Flow::Return(_) = flow {
                debug!(line = span.line, "top-level return");
                break;
            }
        }
        Ok(())
    }

    pub fn evaluate(&mut self, env: &Env, node: &Node) -> RuntimeResult<Flow> {
        self.span = node.span;
        match &node.kind {
            NodeKind::Leaf(Value::Identifier(name)) => self.lookup(env, name).map(Flow::Continue),
            NodeKind::Leaf(value) => Ok(Flow::Continue(value.clone())),
            NodeKind::Sequence(nodes) => {
                let mut last = Value::Void;
                for child in nodes {
                    match self.evaluate(env, child)? {
                        Flow::Continue(value) => last = value,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Continue(last))
            }
            NodeKind::Assign { target, op, value } => self
                .assign(env, target, *op, value)
                .map(Flow::Continue),
            NodeKind::Binary { op, lhs, rhs } => {
                let lhs = self.value(env, lhs)?;
                let rhs = self.value(env, rhs)?;
                self.span = node.span;
                apply_binary(*op, lhs, rhs).map(Flow::Continue)
            }
            NodeKind::Unary { op, operand } => {
                let operand = self.value(env, operand)?;
                self.span = node.span;
                apply_unary(*op, operand).map(Flow::Continue)
            }
            NodeKind::Ternary {
                condition,
                then,
                otherwise,
            } => match self.value(env, condition)? {
                Value::Boolean(true) => self.value(env, then).map(Flow::Continue),
                Value::Boolean(false) => self.value(env, otherwise).map(Flow::Continue),
                other => Err(RuntimeError::type_error(format!(
                    "arg 1 of ?| expected boolean, got {}",
                    other.kind_name()
                ))),
            },
            NodeKind::If {
                condition,
                then,
                otherwise,
            } => match self.value(env, condition)? {
                Value::Boolean(true) => self.evaluate(env, then),
                Value::Boolean(false) => match otherwise {
                    Some(branch) => self.evaluate(env, branch),
                    None => Ok(Flow::Continue(Value::Void)),
                },
                other => Err(RuntimeError::type_error(format!(
                    "if expected boolean, got {}",
                    other.kind_name()
                ))),
            },
            NodeKind::Call { callee, args } => {
                self.call(env, callee, args).map(Flow::Continue)
            }
            NodeKind::Chain { value, call } => {
                let call = match value.as_identifier() {
                    Some(plugin) if self.names_plugin(env, plugin) => {
                        rewrite::plugin_call(plugin, (**call).clone(), node.span)?
                    }
                    _ => rewrite::rewrite_chain((**value).clone(), (**call).clone(), node.span)?,
                };
                self.evaluate(env, &call)
            }
            NodeKind::FunctionDef { name, params, body } => {
                self.define_function(env, name, params, body)?;
                Ok(Flow::Continue(Value::Void))
            }
            NodeKind::Default { name, value } => {
                self.set_default(env, name, value)?;
                Ok(Flow::Continue(Value::Void))
            }
            NodeKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.value(env, expr)?,
                    None => Value::Void,
                };
                Ok(Flow::Return(value))
            }
            NodeKind::Import(name) => {
                self.import(name)?;
                Ok(Flow::Continue(Value::Void))
            }
        }
    }

    /// `name.f()` targets a plugin when `name` is a loaded plugin that no
    /// variable or function visible here shadows.
    fn names_plugin(&self, env: &Env, name: &str) -> bool {
        self.plugins.contains(name) && env.get(name).is_none() && env.function(name).is_none()
    }

    fn value(&mut self, env: &Env, node: &Node) -> RuntimeResult<Value> {
        self.evaluate(env, node).map(Flow::into_value)
    }

    /// A variable of the current scope, else a visible function called with
    /// no arguments.
    fn lookup(&mut self, env: &Env, name: &str) -> RuntimeResult<Value> {
        if let Some(value) = env.get(name) {
            return Ok(value);
        }
        if let Some(func) = env.function(name) {
            return self.invoke(func, ArgList::new());
        }
        Err(RuntimeError::name_error(format!(
            "reference to undefined variable or function \"{name}\""
        )))
    }

    fn assign(&mut self, env: &Env, target: &Node, op: AssignOp, value: &Node) -> RuntimeResult<Value> {
        let Some(name) = target.as_identifier() else {
            return Err(RuntimeError::new(
                ErrorKind::Assignment,
                format!(
                    "invalid assignment: can't assign to constant type {}",
                    target.kind_name()
                ),
            ));
        };
        let new_value = if let Some(op) = op.binary() {
            let current = self.value(env, target)?;
            let rhs = self.value(env, value)?;
            apply_binary(op, current, rhs)?
        } else if op == AssignOp::Chain {
            let call = rewrite::rewrite_chain(target.clone(), value.clone(), value.span)?;
            self.value(env, &call)?
        } else {
            self.value(env, value)?
        };
        if !new_value.is_storable() {
            return Err(RuntimeError::type_error(format!(
                "invalid assignment: can't assign type {} to variable",
                new_value.kind_name()
            )));
        }
        env.set(name, new_value.clone());
        Ok(new_value)
    }

    fn define_function(
        &mut self,
        env: &Env,
        name: &str,
        params: &[Param],
        body: &Rc<Node>,
    ) -> RuntimeResult<()> {
        let func = UserFunction::new(name.to_string(), params.to_vec(), Rc::clone(body), env);
        func.check_param_order()?;
        if env.get(name).is_some() || env.function(name).is_some() {
            self.warn(&format!("overwrote previous definition of {name}"));
        }
        trace!(function = name, params = params.len(), "defined function");
        env.define_function(name, Function::User(Rc::new(func)));
        Ok(())
    }

    fn set_default(&mut self, env: &Env, name: &str, value: &Node) -> RuntimeResult<()> {
        if env.is_global() {
            return Err(RuntimeError::syntax(
                "can't set defaults outside of function body",
            ));
        }
        let variable = env.variable(name);
        match variable.as_ref().map(|var| var.binding) {
            Some(Binding::OptionalParameter) => {}
            Some(Binding::Parameter) => {
                return Err(RuntimeError::new(
                    ErrorKind::UnknownParameter,
                    format!("could not set default of mandatory parameter {name}"),
                ))
            }
            Some(Binding::Local) | None => {
                return Err(RuntimeError::new(
                    ErrorKind::UnknownParameter,
                    format!("could not set default of undefined parameter {name}"),
                ))
            }
        }
        if !matches!(variable.map(|var| var.value), Some(Value::Void)) {
            return Ok(());
        }
        let default = self.value(env, value)?;
        if !default.is_storable() {
            return Err(RuntimeError::type_error(format!(
                "invalid assignment: can't assign type {} to variable",
                default.kind_name()
            )));
        }
        env.set(name, default);
        Ok(())
    }

    /// Evaluates call arguments in the caller's scope, left to right.
    fn materialize(&mut self, env: &Env, args: &[Arg]) -> RuntimeResult<ArgList> {
        let mut list = ArgList::new();
        for arg in args {
            let value = self.value(env, &arg.value)?;
            list.push(arg.name.clone(), value)?;
        }
        Ok(list)
    }

    fn call(&mut self, env: &Env, callee: &Callee, args: &[Arg]) -> RuntimeResult<Value> {
        let args = self.materialize(env, args)?;
        match callee {
            Callee::Named(name) => {
                let func = self.resolve_function(env, name)?;
                self.invoke(func, args)
            }
            Callee::Plugin { plugin, function } => {
                let func = self.plugins.resolve(plugin, function)?;
                self.call_native(&callee.display_name(), func, &args)
            }
        }
    }

    fn resolve_function(&self, env: &Env, name: &str) -> RuntimeResult<Function> {
        if let Some(func) = env.function(name) {
            return Ok(func);
        }
        if let Some(value) = env.get(name) {
            return Err(RuntimeError::type_error(format!(
                "\"{name}\" is a {}, not a function",
                value.kind_name()
            )));
        }
        Err(RuntimeError::name_error(format!(
            "reference to undefined function \"{name}\""
        )))
    }

    /// Calls `func` with already materialized arguments.
    pub fn invoke(&mut self, func: Function, args: ArgList) -> RuntimeResult<Value> {
        match func {
            Function::Core { name, func } => self.call_native(&name, func, &args),
            Function::User(user) => self.call_user(&user, args),
        }
    }

    fn call_native(&mut self, name: &str, func: NativeFn, args: &ArgList) -> RuntimeResult<Value> {
        let frame = self.enter(name);
        let result = func(self, args).map_err(|err| self.locate(err));
        self.leave(frame);
        result
    }

    fn call_user(&mut self, func: &UserFunction, args: ArgList) -> RuntimeResult<Value> {
        let defining = func.defining_env().ok_or_else(|| {
            RuntimeError::name_error(format!("reference to undefined function \"{}\"", func.name))
        })?;
        let env = defining.child();
        let frame = self.enter(&func.name);
        let result = func
            .bind(&env, args)
            .and_then(|()| self.evaluate(&env, &func.body))
            .map(|flow| match flow {
                Flow::Return(value) => value,
                Flow::Continue(_) => Value::Void,
            })
            .map_err(|err| self.locate(err));
        self.leave(frame);
        result
    }

    fn enter(&mut self, name: &str) -> Frame {
        trace!(function = name, line = self.span.line, "call");
        Frame {
            function: self.current_function.replace(name.to_string()),
            span: self.span,
        }
    }

    fn leave(&mut self, frame: Frame) {
        self.current_function = frame.function;
        self.span = frame.span;
    }

    fn locate(&self, err: RuntimeError) -> RuntimeError {
        err.located(self.span, self.current_function.as_deref())
    }

    fn import(&mut self, name: &str) -> RuntimeResult<()> {
        match plugin::locate(&self.plugin_dir, name, &self.script_extension)? {
            ImportTarget::Plugin(path) => {
                if self.plugins.contains(name) {
                    debug!(plugin = name, "plugin already loaded");
                    return Ok(());
                }
                let module = self.loader.load(name, &path)?;
                self.plugins.register(name, module);
                debug!(plugin = name, path = %path.display(), "plugin registered");
                Ok(())
            }
            ImportTarget::Script(path) => {
                if self.importing.contains(&path) {
                    return Err(RuntimeError::new(
                        ErrorKind::Configuration,
                        format!("script \"{name}\" is already being imported"),
                    ));
                }
                debug!(script = name, path = %path.display(), "importing script");
                let source = fs::read_to_string(&path).map_err(|err| {
                    RuntimeError::new(
                        ErrorKind::Io,
                        format!("could not read script \"{}\": {err}", path.display()),
                    )
                })?;
                let program = parser::parse(&source)?;
                let saved = Frame {
                    function: self.current_function.take(),
                    span: self.span,
                };
                self.importing.push(path);
                let result = self.run(program);
                self.importing.pop();
                self.leave(saved);
                result
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
