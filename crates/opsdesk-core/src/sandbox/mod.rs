//! Turns recovered component code into something that can be rendered.
//!
//! Code goes through [`preflight`] (structural checks, rewrites, banned
//! identifiers), is compiled by an engine that only knows the allow-listed
//! bindings, and is executed once to define its functions. The resulting
//! [`Component`] is then rendered on demand.

pub mod engine;
pub mod hooks;
pub mod node;
pub mod preflight;

pub use engine::Limits;
pub use node::{SelectOption, UiNode};
pub use rhai::FnPtr;

use rhai::{CallFnOptions, Dynamic, Engine, Scope, AST};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::ApiTransport;
use engine::build_engine;
use hooks::{lock, HookState};

/// Effects can trigger further renders; stop after this many.
const MAX_RENDER_PASSES: usize = 4;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("incomplete control-flow block, likely truncated")]
    IncompleteBlock { code: String },

    #[error("component uses `{identifier}`, which is not available")]
    ForbiddenIdentifier { identifier: String, code: String },

    #[error("component failed to compile: {message}")]
    Compile { message: String, code: String },

    #[error("component threw: {message}")]
    Execution { message: String, code: String },

    #[error("component function `{name}` is not defined")]
    MissingFunction { name: String, code: String },

    #[error("`{name}` did not produce a valid component")]
    NotCallable { name: String, code: String },
}

impl RenderError {
    /// The source the error refers to, for display next to the message.
    pub fn code(&self) -> &str {
        match self {
            RenderError::IncompleteBlock { code }
            | RenderError::ForbiddenIdentifier { code, .. }
            | RenderError::Compile { code, .. }
            | RenderError::Execution { code, .. }
            | RenderError::MissingFunction { code, .. }
            | RenderError::NotCallable { code, .. } => code,
        }
    }
}

/// What a component is allowed to reach.
#[derive(Clone)]
pub struct Bindings {
    pub api: Arc<dyn ApiTransport>,
    pub limits: Limits,
}

impl Bindings {
    pub fn new(api: Arc<dyn ApiTransport>) -> Self {
        Self {
            api,
            limits: Limits::default(),
        }
    }

    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.limits = self.limits.with_max_operations(max_operations);
        self
    }
}

enum Entry {
    Script(String),
    Pointer(FnPtr),
}

pub struct Component {
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    entry: Entry,
    hooks: Arc<Mutex<HookState>>,
    code: String,
    name: String,
}

fn resolve_entry(ast: &AST, scope: &Scope, name: &str, code: &str) -> Result<Entry, RenderError> {
    if ast
        .iter_functions()
        .any(|f| f.name == name && f.params.is_empty())
    {
        return Ok(Entry::Script(name.to_string()));
    }
    if let Some(ptr) = scope.get_value::<FnPtr>(name) {
        return Ok(Entry::Pointer(ptr));
    }
    let defined = scope.contains(name) || ast.iter_functions().any(|f| f.name == name);
    if defined {
        Err(RenderError::NotCallable {
            name: name.to_string(),
            code: code.to_string(),
        })
    } else {
        Err(RenderError::MissingFunction {
            name: name.to_string(),
            code: code.to_string(),
        })
    }
}

pub fn materialize(code: &str, bindings: &Bindings) -> Result<Component, RenderError> {
    let prepared = preflight::prepare(code).map_err(|e| {
        warn!(error = %e, "Component rejected before compiling");
        e
    })?;

    let hooks = Arc::new(Mutex::new(HookState::default()));
    let engine = build_engine(bindings.limits, hooks.clone(), bindings.api.clone());

    let ast = engine
        .compile(&prepared.code)
        .map_err(|e| RenderError::Compile {
            message: e.to_string(),
            code: code.to_string(),
        })?;

    let mut scope = Scope::new();
    engine
        .run_ast_with_scope(&mut scope, &ast)
        .map_err(|e| RenderError::Execution {
            message: e.to_string(),
            code: code.to_string(),
        })?;

    let entry = resolve_entry(&ast, &scope, &prepared.name, code)?;
    debug!(name = %prepared.name, "Component materialized");

    Ok(Component {
        engine,
        ast,
        scope,
        entry,
        hooks,
        code: code.to_string(),
        name: prepared.name,
    })
}

impl Component {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    fn execution_error(&self, message: String) -> RenderError {
        warn!(component = %self.name, %message, "Component execution failed");
        RenderError::Execution {
            message,
            code: self.code.clone(),
        }
    }

    /// Effects and handlers run for their side effects; results are dropped.
    fn call(&mut self, ptr: &FnPtr) -> Result<(), RenderError> {
        ptr.call::<Dynamic>(&self.engine, &self.ast, ())
            .map(|_| ())
            .map_err(|e| self.execution_error(e.to_string()))
    }

    fn render_once(&mut self) -> Result<UiNode, RenderError> {
        let result = match &self.entry {
            Entry::Script(name) => self.engine.call_fn_with_options::<Dynamic>(
                CallFnOptions::new().eval_ast(false).rewind_scope(true),
                &mut self.scope,
                &self.ast,
                name,
                (),
            ),
            Entry::Pointer(ptr) => ptr.call::<Dynamic>(&self.engine, &self.ast, ()),
        };
        result
            .map(UiNode::from_dynamic)
            .map_err(|e| self.execution_error(e.to_string()))
    }

    /// Render the entry function, then run queued effects and render again
    /// until nothing new is queued.
    pub fn render(&mut self) -> Result<UiNode, RenderError> {
        let mut tree = self.render_once()?;
        for _ in 0..MAX_RENDER_PASSES {
            let effects = lock(&self.hooks).take_pending_effects();
            if effects.is_empty() {
                break;
            }
            for (key, effect) in effects {
                debug!(component = %self.name, effect = %key, "Running effect");
                self.call(&effect)?;
            }
            tree = self.render_once()?;
        }
        Ok(tree)
    }

    /// Run an event handler and re-render.
    pub fn dispatch(&mut self, handler: &FnPtr) -> Result<UiNode, RenderError> {
        self.call(handler)?;
        self.render()
    }

    pub fn set_input(&mut self, key: &str, text: &str) {
        lock(&self.hooks).set_input(key, text);
    }

    pub fn state(&self, key: &str) -> Option<Dynamic> {
        lock(&self.hooks).get(key).cloned()
    }

    pub fn take_alerts(&mut self) -> Vec<String> {
        lock(&self.hooks).take_alerts()
    }
}
