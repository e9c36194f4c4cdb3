//! A scripted evaluator for tests.
//!
//! `ScriptedRuntime` understands a tiny statement language, just enough to
//! exercise inline mode without embedding a real interpreter:
//!
//! ```text
//! echo <expr>;          write to the current capture frame
//! $name = <expr>;       assign a global (persists across runs)
//! const NAME = <expr>;  declare a constant (redeclaring fails)
//! throw <message>;      fail with ScriptError::Uncaught
//!
//! <expr> := <term> ( '*' <term> )*
//! <term> := integer | 'text' | "text" | $name | NAME
//! ```
//!
//! `$name` resolves bindings from the [`InlineScope`] first, then globals.
//! Statements end at `;` outside quotes. Products are checked 64-bit integers.
//! The entry marker and the diagnostics directive are accepted and ignored.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::evaluator::{Evaluator, InlineScope, ScriptInput};

/// Failures raised by [`ScriptedRuntime`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("uncaught: {0}")]
    Uncaught(String),
    #[error("cannot redeclare {0}")]
    Redeclared(String),
    #[error("undefined: {0}")]
    Undefined(String),
    #[error("unsupported operand: {0}")]
    NotANumber(String),
    #[error("integer overflow: {0}")]
    Overflow(String),
    #[error("unsupported statement: {0}")]
    Unsupported(String),
    #[error("failed opening {location}: {message}")]
    Load { location: String, message: String },
}

/// Scripted stand-in for a host runtime.
#[derive(Debug, Default)]
pub struct ScriptedRuntime {
    entry_marker: String,
    globals: HashMap<String, String>,
    constants: HashMap<String, String>,
    evaluations: usize,
    last_location: Option<String>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self {
            entry_marker: "<?php".to_string(),
            ..Default::default()
        }
    }

    /// Number of `evaluate` calls so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn global(&self, name: &str) -> Option<&str> {
        self.globals.get(name).map(String::as_str)
    }

    pub fn constant(&self, name: &str) -> Option<&str> {
        self.constants.get(name).map(String::as_str)
    }

    /// Location of the last script included, if it had one.
    pub fn last_location(&self) -> Option<&str> {
        self.last_location.as_deref()
    }

    fn run(&mut self, source: &str, scope: &InlineScope<'_>) -> Result<(), ScriptError> {
        let source = source.trim();
        let source = source.strip_prefix(self.entry_marker.as_str()).unwrap_or(source);

        for statement in statements(source) {
            self.statement(statement, scope)?;
        }
        Ok(())
    }

    fn statement(&mut self, statement: &str, scope: &InlineScope<'_>) -> Result<(), ScriptError> {
        if let Some(expr) = statement.strip_prefix("echo ") {
            let value = self.expr(expr, scope)?;
            scope.echo(&value);
        } else if let Some(message) = statement.strip_prefix("throw ") {
            return Err(ScriptError::Uncaught(message.trim().to_string()));
        } else if let Some(decl) = statement.strip_prefix("const ") {
            let (name, expr) = split_assignment(decl)
                .ok_or_else(|| ScriptError::Unsupported(statement.to_string()))?;
            if self.constants.contains_key(name) {
                return Err(ScriptError::Redeclared(name.to_string()));
            }
            let value = self.expr(expr, scope)?;
            self.constants.insert(name.to_string(), value);
        } else if let Some(assign) = statement.strip_prefix('$') {
            let (name, expr) = split_assignment(assign)
                .ok_or_else(|| ScriptError::Unsupported(statement.to_string()))?;
            let value = self.expr(expr, scope)?;
            self.globals.insert(name.to_string(), value);
        } else if statement.starts_with("ini_set(") || statement.starts_with("error_reporting(") {
            // diagnostics directive
        } else {
            return Err(ScriptError::Unsupported(statement.to_string()));
        }
        Ok(())
    }

    fn expr(&self, expr: &str, scope: &InlineScope<'_>) -> Result<String, ScriptError> {
        let terms = expr
            .split('*')
            .map(|term| self.term(term.trim(), scope))
            .collect::<Result<Vec<_>, _>>()?;

        if let [single] = terms.as_slice() {
            return Ok(single.clone());
        }

        let mut product: i64 = 1;
        for term in &terms {
            let n: i64 = term
                .trim()
                .parse()
                .map_err(|_| ScriptError::NotANumber(term.clone()))?;
            product = product
                .checked_mul(n)
                .ok_or_else(|| ScriptError::Overflow(expr.trim().to_string()))?;
        }
        Ok(product.to_string())
    }

    fn term(&self, term: &str, scope: &InlineScope<'_>) -> Result<String, ScriptError> {
        if let Some(name) = term.strip_prefix('$') {
            return scope
                .binding(name)
                .or_else(|| self.global(name))
                .map(str::to_string)
                .ok_or_else(|| ScriptError::Undefined(term.to_string()));
        }

        for quote in ['\'', '"'] {
            if let Some(text) = term.strip_prefix(quote).and_then(|t| t.strip_suffix(quote)) {
                return Ok(text.to_string());
            }
        }

        if term.parse::<i64>().is_ok() {
            return Ok(term.to_string());
        }

        self.constant(term)
            .map(str::to_string)
            .ok_or_else(|| ScriptError::Undefined(term.to_string()))
    }
}

/// Split on `;` outside single- or double-quoted text. Empty statements are dropped.
fn statements(source: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in source.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ';') => {
                out.push(&source[start..i]);
                start = i + 1;
            }
            (None, _) => {}
        }
    }
    out.push(&source[start..]);

    out.into_iter().map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn split_assignment(text: &str) -> Option<(&str, &str)> {
    let (name, expr) = text.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some((name, expr.trim()))
}

#[async_trait]
impl Evaluator for ScriptedRuntime {
    type Error = ScriptError;

    async fn evaluate(
        &mut self,
        input: ScriptInput<'_>,
        scope: &InlineScope<'_>,
    ) -> Result<(), ScriptError> {
        self.evaluations += 1;
        self.last_location = input.location().map(str::to_string);

        let source = input.source().await.map_err(|e| ScriptError::Load {
            location: input.location().unwrap_or("<direct>").to_string(),
            message: e.to_string(),
        })?;
        self.run(&source, scope)
    }
}
