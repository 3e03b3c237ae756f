// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use super::value::{Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Value),
    Var(String),
    List(Vec<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Declare { ty: ValueType, name: String, init: Option<Expr> },
    Assign { target: String, value: Expr },
    Write(Expr),
    Debug(Expr),
    Tell(Expr),
    Create { species: String, number: Option<Expr> },
    Do { action: String, args: Vec<(String, Expr)> },
    If { cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt> },
    Loop { times: Expr, body: Vec<Stmt> },
    Return(Option<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDecl {
    pub name: String,
    pub ty: ValueType,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReflexDecl {
    pub name: String,
    pub when: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionDecl {
    pub name: String,
    pub params: Vec<(ValueType, String)>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeciesKind {
    Global,
    Species,
    Grid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesDecl {
    pub name: String,
    pub kind: SpeciesKind,
    pub attributes: Vec<AttributeDecl>,
    pub init: Vec<Stmt>,
    pub reflexes: Vec<ReflexDecl>,
    pub actions: Vec<ActionDecl>,
    /// Grid populations are created up front with `width * height` cells.
    pub cells: Option<(Expr, Expr)>,
}

impl SpeciesDecl {
    pub fn new(name: impl Into<String>, kind: SpeciesKind) -> Self {
        Self {
            name: name.into(),
            kind,
            attributes: vec![],
            init: vec![],
            reflexes: vec![],
            actions: vec![],
            cells: None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&ActionDecl> {
        self.actions.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDecl {
    pub title: String,
    pub var: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentDecl {
    pub name: String,
    pub parameters: Vec<ParameterDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub name: String,
    pub path: Option<PathBuf>,
    pub global: SpeciesDecl,
    pub species: Vec<SpeciesDecl>,
    pub experiments: Vec<ExperimentDecl>,
}

impl Model {
    /// An empty model, used to host the platform agent that evaluates
    /// expressions sent without an experiment.
    pub fn platform() -> Self {
        Self {
            name: "platform".into(),
            path: None,
            global: SpeciesDecl::new("platform", SpeciesKind::Global),
            species: vec![],
            experiments: vec![],
        }
    }

    pub fn species(&self, name: &str) -> Option<&SpeciesDecl> {
        if name == self.global.name {
            return Some(&self.global);
        }
        self.species.iter().find(|s| s.name == name)
    }

    pub fn experiment(&self, name: &str) -> Option<&ExperimentDecl> {
        self.experiments.iter().find(|e| e.name == name)
    }
}
