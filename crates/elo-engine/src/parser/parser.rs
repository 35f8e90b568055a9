//! The main parser implementation: token plumbing and statements.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Scanner, Token, TokenKind};

/// A recursive descent parser for elo.
pub struct Parser<'a> {
    scanner: Scanner<'a>,
    pub(super) current: Token,
    lookahead: Option<Token>,
    file: String,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self::with_file(source, "<input>")
    }

    /// Creates a parser that reports errors against `file`.
    pub fn with_file(source: &'a str, file: impl Into<String>) -> Self {
        let mut scanner = Scanner::new(source);
        let current = scanner.next_token();
        Self {
            scanner,
            current,
            lookahead: None,
            file: file.into(),
        }
    }

    /// Parses the source code into a Program AST node.
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();

        loop {
            self.skip_semicolons();
            if self.is_at_end() {
                break;
            }
            body.push(self.parse_statement()?);
            self.expect_terminator()?;
        }

        Ok(Program { body })
    }

    /// Parses a single statement.
    pub fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let line = self.current.line;
        let declares_function = self.check(&TokenKind::Func)
            && matches!(self.peek().kind, TokenKind::Identifier(_));
        let kind = match &self.current.kind {
            TokenKind::Var | TokenKind::Const => self.parse_declaration()?,
            TokenKind::Func if declares_function => {
                self.advance();
                StatementKind::Function(self.parse_function_declaration()?)
            }
            TokenKind::If => StatementKind::If(self.parse_if_statement()?),
            TokenKind::For => self.parse_for_statement()?,
            TokenKind::Break => {
                self.advance();
                StatementKind::Branch(BranchKind::Break)
            }
            TokenKind::Continue => {
                self.advance();
                StatementKind::Branch(BranchKind::Continue)
            }
            TokenKind::Return => {
                self.advance();
                let values = if self.at_terminator() {
                    Vec::new()
                } else {
                    self.parse_expression_list()?
                };
                StatementKind::Return(values)
            }
            TokenKind::LeftBrace => StatementKind::Block(self.parse_block()?),
            kind if kind.is_reserved() => {
                return Err(self.error(format!("reserved keyword {} is not supported", kind)));
            }
            _ => return self.parse_simple_statement(),
        };
        Ok(Statement::new(kind, line))
    }

    /// Parses an expression, assignment or short declaration statement.
    pub(super) fn parse_simple_statement(&mut self) -> Result<Statement, ParseError> {
        let line = self.current.line;
        let exprs = self.parse_expression_list()?;
        self.finish_simple_statement(exprs, line)
    }

    fn finish_simple_statement(
        &mut self,
        exprs: Vec<Expression>,
        line: u32,
    ) -> Result<Statement, ParseError> {
        let operator = match &self.current.kind {
            TokenKind::ColonEqual => {
                self.advance();
                let mut names = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    match expr.kind {
                        ExpressionKind::Identifier(name) => names.push(name),
                        _ => return Err(self.error("non-name on left side of :=")),
                    }
                }
                let values = self.parse_expression_list()?;
                return Ok(Statement::new(
                    StatementKind::Declaration(Declaration {
                        kind: DeclarationKind::Short,
                        names,
                        values,
                    }),
                    line,
                ));
            }
            TokenKind::Equal => AssignOperator::Assign,
            TokenKind::PlusEqual => AssignOperator::Compound(BinaryOperator::Add),
            TokenKind::MinusEqual => AssignOperator::Compound(BinaryOperator::Sub),
            TokenKind::StarEqual => AssignOperator::Compound(BinaryOperator::Mul),
            TokenKind::SlashEqual => AssignOperator::Compound(BinaryOperator::Div),
            TokenKind::PercentEqual => AssignOperator::Compound(BinaryOperator::Mod),
            TokenKind::AmpersandEqual => AssignOperator::Compound(BinaryOperator::BitAnd),
            TokenKind::PipeEqual => AssignOperator::Compound(BinaryOperator::BitOr),
            TokenKind::CaretEqual => AssignOperator::Compound(BinaryOperator::BitXor),
            _ => {
                if exprs.len() != 1 {
                    return Err(self.error(format!("unexpected {} after expression list", self.current.kind)));
                }
                let expr = exprs.into_iter().next().ok_or_else(|| self.error("expected expression"))?;
                return Ok(Statement::new(StatementKind::Expression(expr), line));
            }
        };
        self.advance();

        if matches!(operator, AssignOperator::Compound(_)) && exprs.len() != 1 {
            return Err(self.error("compound assignment takes a single target"));
        }
        let values = self.parse_expression_list()?;
        if matches!(operator, AssignOperator::Compound(_)) && values.len() != 1 {
            return Err(self.error("compound assignment takes a single value"));
        }
        Ok(Statement::new(
            StatementKind::Assignment(Assignment {
                operator,
                targets: exprs,
                values,
            }),
            line,
        ))
    }

    fn parse_declaration(&mut self) -> Result<StatementKind, ParseError> {
        let kind = match self.current.kind {
            TokenKind::Const => DeclarationKind::Const,
            _ => DeclarationKind::Var,
        };
        self.advance();

        let mut names = vec![self.expect_identifier()?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            names.push(self.expect_identifier()?);
        }

        let values = if self.check(&TokenKind::Equal) {
            self.advance();
            self.parse_expression_list()?
        } else {
            Vec::new()
        };

        Ok(StatementKind::Declaration(Declaration {
            kind,
            names,
            values,
        }))
    }

    /// Parses `name(params) body` or `a.b.c(params) body` after `func`.
    fn parse_function_declaration(&mut self) -> Result<FunctionLiteral, ParseError> {
        let line = self.current.line;
        let first = self.expect_identifier()?;
        let name = if self.check(&TokenKind::Dot) {
            let mut path = Expression::new(ExpressionKind::Identifier(first), line);
            while self.check(&TokenKind::Dot) {
                self.advance();
                let field = self.expect_identifier()?;
                path = Expression::new(
                    ExpressionKind::Selector(SelectorExpression {
                        object: Box::new(path),
                        field,
                    }),
                    line,
                );
            }
            FunctionName::Path(Box::new(path))
        } else {
            FunctionName::Simple(first)
        };

        let mut literal = self.parse_function_rest()?;
        literal.name = Some(name);
        Ok(literal)
    }

    /// Parses `(params) { body }` or `(params) => exprs`.
    pub(super) fn parse_function_rest(&mut self) -> Result<FunctionLiteral, ParseError> {
        self.expect(&TokenKind::LeftParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            params.push(self.expect_identifier()?);
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(&TokenKind::RightParen)?;

        let body = if self.check(&TokenKind::Arrow) {
            let line = self.current.line;
            self.advance();
            let values = self.parse_expression_list()?;
            Block {
                statements: vec![Statement::new(StatementKind::Return(values), line)],
            }
        } else {
            self.parse_block()?
        };

        Ok(FunctionLiteral {
            name: None,
            params,
            body,
        })
    }

    fn parse_if_statement(&mut self) -> Result<IfStatement, ParseError> {
        self.advance(); // consume 'if'

        let first = self.parse_simple_statement()?;
        let (init, condition) = if self.check(&TokenKind::Semicolon) {
            self.advance();
            (Some(Box::new(first)), self.parse_expression()?)
        } else {
            (None, self.statement_as_condition(first)?)
        };

        let then_branch = self.parse_block()?;

        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            let line = self.current.line;
            if self.check(&TokenKind::If) {
                Some(Box::new(Statement::new(
                    StatementKind::If(self.parse_if_statement()?),
                    line,
                )))
            } else {
                Some(Box::new(Statement::new(
                    StatementKind::Block(self.parse_block()?),
                    line,
                )))
            }
        } else {
            None
        };

        Ok(IfStatement {
            init,
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_for_statement(&mut self) -> Result<StatementKind, ParseError> {
        self.advance(); // consume 'for'

        if self.check(&TokenKind::LeftBrace) {
            let body = self.parse_block()?;
            return Ok(StatementKind::For(ForStatement {
                init: None,
                condition: None,
                step: None,
                body,
            }));
        }

        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            let line = self.current.line;
            let exprs = self.parse_expression_list()?;
            if self.check(&TokenKind::In) {
                return self.parse_for_in(exprs).map(StatementKind::ForIn);
            }
            Some(self.finish_simple_statement(exprs, line)?)
        };

        // `for cond { }`
        if self.check(&TokenKind::LeftBrace) {
            let condition = match init {
                Some(stmt) => Some(self.statement_as_condition(stmt)?),
                None => None,
            };
            let body = self.parse_block()?;
            return Ok(StatementKind::For(ForStatement {
                init: None,
                condition,
                step: None,
                body,
            }));
        }

        self.expect(&TokenKind::Semicolon)?;
        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;
        let step = if self.check(&TokenKind::LeftBrace) {
            None
        } else {
            Some(Box::new(self.parse_simple_statement()?))
        };
        let body = self.parse_block()?;

        Ok(StatementKind::For(ForStatement {
            init: init.map(Box::new),
            condition,
            step,
            body,
        }))
    }

    fn parse_for_in(&mut self, vars: Vec<Expression>) -> Result<ForInStatement, ParseError> {
        let mut names = Vec::with_capacity(2);
        for var in vars {
            match var.kind {
                ExpressionKind::Identifier(name) => names.push(name),
                _ => return Err(self.error("for-in variables must be names")),
            }
        }
        if names.len() > 2 {
            return Err(self.error("for-in takes at most two variables"));
        }
        self.advance(); // consume 'in'

        let collection = self.parse_expression()?;
        let body = self.parse_block()?;
        let mut names = names.into_iter();
        let key = names.next().ok_or_else(|| self.error("expected loop variable"))?;

        Ok(ForInStatement {
            key,
            value: names.next(),
            collection,
            body,
        })
    }

    fn statement_as_condition(&self, stmt: Statement) -> Result<Expression, ParseError> {
        match stmt.kind {
            StatementKind::Expression(expr) => Ok(expr),
            _ => Err(self.error("expected condition expression")),
        }
    }

    /// Parses `{ statements }`.
    pub(super) fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut statements = Vec::new();

        loop {
            self.skip_semicolons();
            if self.check(&TokenKind::RightBrace) || self.is_at_end() {
                break;
            }
            statements.push(self.parse_statement()?);
            self.expect_terminator()?;
        }

        self.expect(&TokenKind::RightBrace)?;
        Ok(Block { statements })
    }

    // Helper methods

    pub(super) fn advance(&mut self) {
        let next = match self.lookahead.take() {
            Some(token) => token,
            None => self.scanner.next_token(),
        };
        self.current = next;
    }

    pub(super) fn peek(&mut self) -> &Token {
        let scanner = &mut self.scanner;
        self.lookahead.get_or_insert_with(|| scanner.next_token())
    }

    pub(super) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    pub(super) fn expect(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", kind, self.current.kind)))
        }
    }

    pub(super) fn expect_identifier(&mut self) -> Result<String, ParseError> {
        if let TokenKind::Identifier(name) = &self.current.kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error(format!("expected identifier, found {}", self.current.kind)))
        }
    }

    pub(super) fn skip_semicolons(&mut self) {
        while self.check(&TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn at_terminator(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::Eof
        )
    }

    fn expect_terminator(&mut self) -> Result<(), ParseError> {
        match self.current.kind {
            TokenKind::Semicolon => {
                self.advance();
                Ok(())
            }
            TokenKind::RightBrace | TokenKind::Eof => Ok(()),
            _ => Err(self.error(format!(
                "expected ';' or newline after statement, found {}",
                self.current.kind
            ))),
        }
    }

    pub(super) fn is_at_end(&self) -> bool {
        matches!(self.current.kind, TokenKind::Eof)
    }

    pub(super) fn error(&self, message: impl Into<String>) -> ParseError {
        let message = match &self.current.kind {
            TokenKind::Invalid(lexical) => lexical.clone(),
            _ => message.into(),
        };
        ParseError {
            file: self.file.clone(),
            line: self.current.line,
            message,
        }
    }
}
