// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The compiler for the built-in GAML subset: parsing plus a semantic pass
//! that resolves every name a body refers to.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use super::ast::{Expr, Model, SpeciesDecl, SpeciesKind, Stmt};
use super::parser::parse_model;
use super::{Compiler, Diagnostic};

const BUILTINS: &[&str] =
    &["length", "string", "int", "float", "abs", "sqrt", "round", "min", "max", "sum"];

const DOCUMENTATION: &[(&str, &str)] = &[
    ("write", "write expr; prints the value of expr on the console"),
    ("debug", "debug expr; prints the value of expr on the debug console"),
    ("tell", "tell expr; opens a dialog displaying the value of expr"),
    ("create", "create species number: n; creates n agents of the species"),
    ("do", "do action arg: value; runs an action of the current agent"),
    ("if", "if condition { ... } else { ... }; conditional execution"),
    ("loop", "loop times: n { ... }; repeats the block n times"),
    ("return", "return expr; ends the action with the value of expr"),
    ("reflex", "reflex name when: condition { ... }; behavior run at every cycle"),
    ("action", "action name(type arg) { ... }; behavior run on demand"),
    ("species", "species name { ... }; declares a population of agents"),
    ("grid", "grid name width: w height: h { ... }; declares a grid of cells"),
    ("global", "global { ... }; declares the attributes and behaviors of the world"),
    ("experiment", "experiment name { ... }; declares a way to run the model"),
    ("parameter", "parameter \"title\" var: name; exposes a global variable"),
    ("length", "length(list or string) -> int; number of elements"),
    ("string", "string(value) -> string; textual representation"),
    ("int", "int(value) -> int; conversion to an integer"),
    ("float", "float(value) -> float; conversion to a float"),
    ("abs", "abs(number) -> number; absolute value"),
    ("sqrt", "sqrt(number) -> float; square root"),
    ("round", "round(number) -> int; nearest integer"),
    ("min", "min(list) -> value; smallest element"),
    ("max", "max(list) -> value; largest element"),
    ("sum", "sum(list) -> value; sum of the elements"),
    ("cycle", "cycle -> int; number of cycles run since initialization"),
];

/// Compiler for models written in the built-in GAML subset.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinCompiler;

impl Compiler for BuiltinCompiler {
    fn compile(&self, path: &Path) -> Result<Arc<Model>, Vec<Diagnostic>> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            vec![Diagnostic::new(0, 0, format!("unable to read {}: {e}", path.display()))]
        })?;
        let mut model = parse_model(&source)?;
        let errors = check(&model);
        if !errors.is_empty() {
            return Err(errors);
        }
        model.path = Some(path.to_owned());
        Ok(Arc::new(model))
    }

    fn validate(&self, source: &str, syntax_only: bool) -> Vec<Diagnostic> {
        match parse_model(source) {
            Err(errors) => errors,
            Ok(_) if syntax_only => vec![],
            Ok(model) => check(&model),
        }
    }

    fn documentation(&self, topic: &str) -> Option<String> {
        DOCUMENTATION.iter().find(|(name, _)| *name == topic).map(|(_, doc)| (*doc).to_owned())
    }
}

/// Semantic checks over a parsed model.
pub fn check(model: &Model) -> Vec<Diagnostic> {
    let mut errors = vec![];
    let mut seen = HashSet::new();
    for species in &model.species {
        if species.name == model.name || !seen.insert(species.name.as_str()) {
            errors.push(semantic(format!("species {} is declared twice", species.name)));
        }
    }
    for experiment in &model.experiments {
        for parameter in &experiment.parameters {
            if model.global.attribute(&parameter.var).is_none() {
                errors.push(semantic(format!(
                    "experiment {}: parameter '{}' refers to unknown variable {}",
                    experiment.name, parameter.title, parameter.var
                )));
            }
        }
    }

    for species in std::iter::once(&model.global).chain(model.species.iter()) {
        let checker = Checker { model, species };
        for attribute in &species.attributes {
            if let Some(init) = &attribute.init {
                checker.expr(init, &HashSet::new(), &format!("attribute {}", attribute.name), &mut errors);
            }
        }
        checker.body(&species.init, HashSet::new(), "init", &mut errors);
        for reflex in &species.reflexes {
            let context = format!("reflex {}", reflex.name);
            if let Some(when) = &reflex.when {
                checker.expr(when, &HashSet::new(), &context, &mut errors);
            }
            checker.body(&reflex.body, HashSet::new(), &context, &mut errors);
        }
        for action in &species.actions {
            let locals = action.params.iter().map(|(_, name)| name.clone()).collect();
            checker.body(&action.body, locals, &format!("action {}", action.name), &mut errors);
        }
    }
    errors
}

fn semantic(message: String) -> Diagnostic {
    Diagnostic::new(0, 0, message)
}

struct Checker<'a> {
    model: &'a Model,
    species: &'a SpeciesDecl,
}

impl Checker<'_> {
    fn owner(&self) -> String {
        match self.species.kind {
            SpeciesKind::Global => "global".to_owned(),
            _ => format!("species {}", self.species.name),
        }
    }

    fn is_attribute(&self, name: &str) -> bool {
        self.species.attribute(name).is_some() || self.model.global.attribute(name).is_some()
    }

    fn resolves(&self, name: &str, locals: &HashSet<String>) -> bool {
        locals.contains(name)
            || self.is_attribute(name)
            || matches!(name, "cycle" | "self")
            || self.model.species.iter().any(|s| s.name == name)
    }

    fn body(
        &self,
        body: &[Stmt],
        mut locals: HashSet<String>,
        context: &str,
        errors: &mut Vec<Diagnostic>,
    ) {
        for stmt in body {
            match stmt {
                Stmt::Declare { name, init, .. } => {
                    if let Some(init) = init {
                        self.expr(init, &locals, context, errors);
                    }
                    locals.insert(name.clone());
                }
                Stmt::Assign { target, value } => {
                    if !locals.contains(target) && !self.is_attribute(target) {
                        errors.push(self.error(context, format!("Unknown variable: {target}")));
                    }
                    self.expr(value, &locals, context, errors);
                }
                Stmt::Write(expr) | Stmt::Debug(expr) | Stmt::Tell(expr) => {
                    self.expr(expr, &locals, context, errors);
                }
                Stmt::Return(expr) => {
                    if let Some(expr) = expr {
                        self.expr(expr, &locals, context, errors);
                    }
                }
                Stmt::Create { species, number } => {
                    if !self.model.species.iter().any(|s| &s.name == species) {
                        errors.push(self.error(context, format!("Unknown species: {species}")));
                    }
                    if let Some(number) = number {
                        self.expr(number, &locals, context, errors);
                    }
                }
                Stmt::Do { action, args } => {
                    if self.species.action(action).is_none() {
                        errors.push(self.error(context, format!("Unknown action: {action}")));
                    }
                    for (_, expr) in args {
                        self.expr(expr, &locals, context, errors);
                    }
                }
                Stmt::If { cond, then, otherwise } => {
                    self.expr(cond, &locals, context, errors);
                    self.body(then, locals.clone(), context, errors);
                    self.body(otherwise, locals.clone(), context, errors);
                }
                Stmt::Loop { times, body } => {
                    self.expr(times, &locals, context, errors);
                    self.body(body, locals.clone(), context, errors);
                }
            }
        }
    }

    fn expr(&self, expr: &Expr, locals: &HashSet<String>, context: &str, errors: &mut Vec<Diagnostic>) {
        match expr {
            Expr::Lit(_) => {}
            Expr::Var(name) => {
                if !self.resolves(name, locals) {
                    errors.push(self.error(context, format!("Unknown variable: {name}")));
                }
            }
            Expr::List(items) => items.iter().for_each(|e| self.expr(e, locals, context, errors)),
            Expr::Unary(_, inner) => self.expr(inner, locals, context, errors),
            Expr::Binary(_, left, right) => {
                self.expr(left, locals, context, errors);
                self.expr(right, locals, context, errors);
            }
            Expr::Call(name, args) => {
                if !BUILTINS.contains(&name.as_str()) {
                    errors.push(self.error(context, format!("Unknown operator: {name}")));
                }
                args.iter().for_each(|e| self.expr(e, locals, context, errors));
            }
        }
    }

    fn error(&self, context: &str, message: String) -> Diagnostic {
        semantic(format!("{} {context}: {message}", self.owner()))
    }
}

#[cfg(test)]
#[path = "compiler_tests.rs"]
mod tests;
