// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recursive-descent parser for the GAML subset.
//!
//! Parsing stops at the first error; the lexer may report several at once.

use super::ast::{
    ActionDecl, AttributeDecl, BinOp, ExperimentDecl, Expr, Model, ParameterDecl, ReflexDecl,
    SpeciesDecl, SpeciesKind, Stmt, UnOp,
};
use super::lexer::{tokenize, Tok, Token};
use super::value::{Value, ValueType};
use super::Diagnostic;

type PResult<T> = Result<T, Diagnostic>;

/// Parse a complete model file.
pub fn parse_model(source: &str) -> Result<Model, Vec<Diagnostic>> {
    let mut parser = Parser::new(source)?;
    parser.model().map_err(|d| vec![d])
}

/// Parse text that must be exactly one expression.
pub fn parse_expression(source: &str) -> Result<Expr, Vec<Diagnostic>> {
    let mut parser = Parser::new(source)?;
    let expr = parser.expr().map_err(|d| vec![d])?;
    match parser.peek() {
        None => Ok(expr),
        Some(_) => Err(vec![parser.unexpected("end of expression")]),
    }
}

/// Parse a sequence of statements. The trailing `;` may be omitted.
pub fn parse_statements(source: &str) -> Result<Vec<Stmt>, Vec<Diagnostic>> {
    let mut parser = Parser::new(source)?;
    if let Some(last) = parser.tokens.last() {
        if !matches!(last.tok, Tok::Sym(";") | Tok::Sym("}")) {
            let (line, column) = (last.line, last.column + 1);
            parser.tokens.push(Token { tok: Tok::Sym(";"), line, column });
        }
    }
    let mut body = vec![];
    while parser.peek().is_some() {
        body.push(parser.statement().map_err(|d| vec![d])?);
    }
    Ok(body)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: (usize, usize),
}

impl Parser {
    fn new(source: &str) -> Result<Self, Vec<Diagnostic>> {
        let tokens = tokenize(source)?;
        let line = source.matches('\n').count() + 1;
        let column = source.rsplit('\n').next().map(|l| l.chars().count() + 1).unwrap_or(1);
        Ok(Self { tokens, pos: 0, end: (line, column) })
    }

    // -- Token helpers -------------------------------------------------------

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset).map(|t| &t.tok)
    }

    fn position(&self) -> (usize, usize) {
        self.tokens.get(self.pos).map(|t| (t.line, t.column)).unwrap_or(self.end)
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        let (line, column) = self.position();
        let found = self.peek().map(Tok::describe).unwrap_or_else(|| "end of input".into());
        Diagnostic::new(line, column, format!("expected {expected} but found {found}"))
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|t| t.tok.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn is_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Some(Tok::Sym(s)) if *s == sym)
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(s)) if s == word)
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if self.is_sym(sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.is_word(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> PResult<()> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{sym}'")))
        }
    }

    fn ident(&mut self, what: &str) -> PResult<String> {
        match self.peek() {
            Some(Tok::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// `name: expr` pairs up to (not including) `{` or `;`.
    fn facets(&mut self) -> PResult<Vec<(String, Expr)>> {
        let mut facets = vec![];
        while matches!(self.peek(), Some(Tok::Ident(_))) && matches!(self.peek_at(1), Some(Tok::Sym(":"))) {
            let name = self.ident("facet name")?;
            self.expect_sym(":")?;
            facets.push((name, self.expr()?));
        }
        Ok(facets)
    }

    /// Skip a statement or block this subset does not model (aspects, outputs).
    fn skip_member(&mut self) -> PResult<()> {
        let mut depth = 0usize;
        loop {
            match self.next() {
                None if depth == 0 => return Ok(()),
                None => return Err(self.unexpected("'}'")),
                Some(Tok::Sym("{")) => depth += 1,
                Some(Tok::Sym("}")) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(Tok::Sym(";")) if depth == 0 => return Ok(()),
                Some(_) => {}
            }
        }
    }

    // -- Model structure -----------------------------------------------------

    fn model(&mut self) -> PResult<Model> {
        if !self.eat_word("model") {
            return Err(self.unexpected("'model'"));
        }
        let name = self.ident("model name")?;
        let mut model = Model {
            name: name.clone(),
            path: None,
            global: SpeciesDecl::new(name, SpeciesKind::Global),
            species: vec![],
            experiments: vec![],
        };

        while let Some(tok) = self.peek() {
            match tok {
                Tok::Ident(w) if w == "import" => {
                    self.pos += 1;
                    self.next();
                    self.eat_sym(";");
                }
                Tok::Ident(w) if w == "global" => {
                    self.pos += 1;
                    self.facets()?;
                    self.species_body(&mut model.global)?;
                }
                Tok::Ident(w) if w == "species" || w == "grid" => {
                    let kind = if w == "grid" { SpeciesKind::Grid } else { SpeciesKind::Species };
                    self.pos += 1;
                    let mut species = SpeciesDecl::new(self.ident("species name")?, kind);
                    let facets = self.facets()?;
                    if kind == SpeciesKind::Grid {
                        let width = facets.iter().find(|(n, _)| n == "width").map(|(_, e)| e.clone());
                        let height = facets.iter().find(|(n, _)| n == "height").map(|(_, e)| e.clone());
                        species.cells = Some((
                            width.unwrap_or(Expr::Lit(Value::Int(1))),
                            height.unwrap_or(Expr::Lit(Value::Int(1))),
                        ));
                    }
                    if !self.eat_sym(";") {
                        self.species_body(&mut species)?;
                    }
                    model.species.push(species);
                }
                Tok::Ident(w) if w == "experiment" => {
                    self.pos += 1;
                    let experiment = self.experiment()?;
                    model.experiments.push(experiment);
                }
                _ => return Err(self.unexpected("'global', 'species', 'grid' or 'experiment'")),
            }
        }
        Ok(model)
    }

    fn species_body(&mut self, species: &mut SpeciesDecl) -> PResult<()> {
        self.expect_sym("{")?;
        while !self.eat_sym("}") {
            let Some(tok) = self.peek() else {
                return Err(self.unexpected("'}'"));
            };
            match tok {
                Tok::Ident(w) if ValueType::from_keyword(w).is_some() => {
                    let attribute = self.attribute()?;
                    species.attributes.push(attribute);
                }
                Tok::Ident(w) if w == "init" => {
                    self.pos += 1;
                    let body = self.block()?;
                    species.init.extend(body);
                }
                Tok::Ident(w) if w == "reflex" => {
                    self.pos += 1;
                    let name = self.ident("reflex name")?;
                    let when = self.facets()?.into_iter().find(|(n, _)| n == "when").map(|(_, e)| e);
                    let body = self.block()?;
                    species.reflexes.push(ReflexDecl { name, when, body });
                }
                Tok::Ident(w) if w == "action" => {
                    self.pos += 1;
                    let action = self.action()?;
                    species.actions.push(action);
                }
                Tok::Ident(w) if w == "aspect" => self.skip_member()?,
                _ => return Err(self.unexpected("a declaration")),
            }
        }
        Ok(())
    }

    fn attribute(&mut self) -> PResult<AttributeDecl> {
        let keyword = self.ident("type")?;
        let ty = ValueType::from_keyword(&keyword).unwrap_or(ValueType::Unknown);
        let name = self.ident("attribute name")?;
        let mut init = if self.eat_sym("<-") { Some(self.expr()?) } else { None };
        for (facet, value) in self.facets()? {
            if facet == "init" {
                init = Some(value);
            }
        }
        self.expect_sym(";")?;
        Ok(AttributeDecl { name, ty, init })
    }

    fn action(&mut self) -> PResult<ActionDecl> {
        let name = self.ident("action name")?;
        let mut params = vec![];
        if self.eat_sym("(") {
            while !self.eat_sym(")") {
                if !params.is_empty() {
                    self.expect_sym(",")?;
                }
                let keyword = self.ident("argument type")?;
                let ty = ValueType::from_keyword(&keyword).unwrap_or(ValueType::Unknown);
                params.push((ty, self.ident("argument name")?));
            }
        }
        let body = self.block()?;
        Ok(ActionDecl { name, params, body })
    }

    fn experiment(&mut self) -> PResult<ExperimentDecl> {
        let name = match self.next() {
            Some(Tok::Ident(name)) | Some(Tok::Str(name)) => name,
            _ => return Err(self.unexpected("experiment name")),
        };
        self.facets()?;
        self.expect_sym("{")?;
        let mut parameters = vec![];
        while !self.eat_sym("}") {
            if self.peek().is_none() {
                return Err(self.unexpected("'}'"));
            }
            if self.eat_word("parameter") {
                let title = match self.next() {
                    Some(Tok::Str(title)) => title,
                    _ => return Err(self.unexpected("parameter title")),
                };
                let var = self
                    .facets()?
                    .into_iter()
                    .find_map(|(facet, value)| match (facet.as_str(), value) {
                        ("var", Expr::Var(var)) => Some(var),
                        _ => None,
                    })
                    .ok_or_else(|| self.unexpected("'var:' facet"))?;
                self.expect_sym(";")?;
                parameters.push(ParameterDecl { title, var });
            } else {
                self.skip_member()?;
            }
        }
        Ok(ExperimentDecl { name, parameters })
    }

    // -- Statements ----------------------------------------------------------

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_sym("{")?;
        let mut body = vec![];
        while !self.eat_sym("}") {
            if self.peek().is_none() {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn statement(&mut self) -> PResult<Stmt> {
        let word = match self.peek() {
            Some(Tok::Ident(w)) => w.clone(),
            _ => return Err(self.unexpected("a statement")),
        };

        if let Some(ty) = ValueType::from_keyword(&word) {
            self.pos += 1;
            let name = self.ident("variable name")?;
            let init = if self.eat_sym("<-") { Some(self.expr()?) } else { None };
            self.expect_sym(";")?;
            return Ok(Stmt::Declare { ty, name, init });
        }

        // `name <- value` takes priority over keywords so attributes may
        // shadow statement names.
        if matches!(self.peek_at(1), Some(Tok::Sym("<-"))) {
            self.pos += 2;
            let value = self.expr()?;
            self.expect_sym(";")?;
            return Ok(Stmt::Assign { target: word, value });
        }

        self.pos += 1;
        let stmt = match word.as_str() {
            "write" => Stmt::Write(self.expr()?),
            "debug" => Stmt::Debug(self.expr()?),
            "tell" => Stmt::Tell(self.expr()?),
            "return" => {
                if self.is_sym(";") {
                    Stmt::Return(None)
                } else {
                    Stmt::Return(Some(self.expr()?))
                }
            }
            "create" => {
                let species = self.ident("species name")?;
                let number = self.facets()?.into_iter().find(|(n, _)| n == "number").map(|(_, e)| e);
                Stmt::Create { species, number }
            }
            "do" => {
                let action = self.ident("action name")?;
                let args = if self.eat_sym("(") {
                    let mut args = vec![];
                    while !self.eat_sym(")") {
                        if !args.is_empty() {
                            self.expect_sym(",")?;
                        }
                        let name = self.ident("argument name")?;
                        self.expect_sym(":")?;
                        args.push((name, self.expr()?));
                    }
                    args
                } else {
                    self.facets()?
                };
                Stmt::Do { action, args }
            }
            "if" => return self.if_statement(),
            "loop" => {
                let times = self
                    .facets()?
                    .into_iter()
                    .find(|(n, _)| n == "times")
                    .map(|(_, e)| e)
                    .ok_or_else(|| self.unexpected("'times:' facet"))?;
                let body = self.block()?;
                return Ok(Stmt::Loop { times, body });
            }
            _ => {
                self.pos -= 1;
                return Err(self.unexpected("a statement"));
            }
        };
        self.expect_sym(";")?;
        Ok(stmt)
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        let cond = self.expr()?;
        let then = self.block()?;
        let otherwise = if self.eat_word("else") {
            if self.eat_word("if") {
                vec![self.if_statement()?]
            } else {
                self.block()?
            }
        } else {
            vec![]
        };
        Ok(Stmt::If { cond, then, otherwise })
    }

    // -- Expressions ---------------------------------------------------------

    pub(crate) fn expr(&mut self) -> PResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_word("or") {
            let right = self.and_expr()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mut left = self.comparison()?;
        while self.eat_word("and") {
            let right = self.comparison()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Tok::Sym("=")) => BinOp::Eq,
            Some(Tok::Sym("!=")) => BinOp::Ne,
            Some(Tok::Sym("<")) => BinOp::Lt,
            Some(Tok::Sym("<=")) => BinOp::Le,
            Some(Tok::Sym(">")) => BinOp::Gt,
            Some(Tok::Sym(">=")) => BinOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> PResult<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Sym("+")) => BinOp::Add,
                Some(Tok::Sym("-")) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Sym("*")) => BinOp::Mul,
                Some(Tok::Sym("/")) => BinOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> PResult<Expr> {
        if self.eat_sym("-") {
            return Ok(Expr::Unary(UnOp::Neg, Box::new(self.unary()?)));
        }
        if self.eat_sym("!") || self.eat_word("not") {
            return Ok(Expr::Unary(UnOp::Not, Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> PResult<Expr> {
        let Some(tok) = self.peek().cloned() else {
            return Err(self.unexpected("an expression"));
        };
        match tok {
            Tok::Int(i) => {
                self.pos += 1;
                Ok(Expr::Lit(Value::Int(i)))
            }
            Tok::Float(f) => {
                self.pos += 1;
                Ok(Expr::Lit(Value::Float(f)))
            }
            Tok::Str(s) => {
                self.pos += 1;
                Ok(Expr::Lit(Value::Str(s)))
            }
            Tok::Sym("(") => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            Tok::Sym("[") => {
                self.pos += 1;
                let mut items = vec![];
                while !self.eat_sym("]") {
                    if !items.is_empty() {
                        self.expect_sym(",")?;
                    }
                    items.push(self.expr()?);
                }
                Ok(Expr::List(items))
            }
            Tok::Ident(word) => {
                self.pos += 1;
                match word.as_str() {
                    "true" => return Ok(Expr::Lit(Value::Bool(true))),
                    "false" => return Ok(Expr::Lit(Value::Bool(false))),
                    "nil" => return Ok(Expr::Lit(Value::Nil)),
                    _ => {}
                }
                if self.eat_sym("(") {
                    let mut args = vec![];
                    while !self.eat_sym(")") {
                        if !args.is_empty() {
                            self.expect_sym(",")?;
                        }
                        args.push(self.expr()?);
                    }
                    return Ok(Expr::Call(word, args));
                }
                Ok(Expr::Var(word))
            }
            Tok::Sym(_) => Err(self.unexpected("an expression")),
        }
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
