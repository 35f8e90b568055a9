//! Expression parsing.
//!
//! Precedence, lowest first:
//!
//! | Level | Operators |
//! |-------|-----------|
//! | ternary | `? :` |
//! | or | `\|\|` |
//! | and | `&&` |
//! | equality | `== !=` |
//! | comparison | `< <= > >=` |
//! | additive | `+ - \| ^` |
//! | multiplicative | `* / % ** << >> &` |
//! | unary | `- ! not ~ ++ --` |
//! | postfix | `. [] () ++ -- ...` |

use super::Parser;
use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::TokenKind;

impl Parser<'_> {
    /// Parses a full expression.
    pub fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_ternary()
    }

    /// Parses one or more comma-separated expressions.
    pub(super) fn parse_expression_list(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut exprs = vec![self.parse_expression()?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            exprs.push(self.parse_expression()?);
        }
        Ok(exprs)
    }

    fn parse_ternary(&mut self) -> Result<Expression, ParseError> {
        let condition = self.parse_binary(0)?;

        if self.check(&TokenKind::Question) {
            let line = condition.line;
            self.advance(); // consume '?'
            let then_value = self.parse_ternary()?;
            self.expect(&TokenKind::Colon)?;
            let else_value = self.parse_ternary()?;

            return Ok(Expression::new(
                ExpressionKind::Ternary(TernaryExpression {
                    condition: Box::new(condition),
                    then_value: Box::new(then_value),
                    else_value: Box::new(else_value),
                }),
                line,
            ));
        }

        Ok(condition)
    }

    /// Precedence climbing over the binary operator table.
    fn parse_binary(&mut self, min_level: usize) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;

        while let Some((operator, level)) = binary_operator(&self.current.kind) {
            if level < min_level {
                break;
            }
            self.advance();
            let right = self.parse_binary(level + 1)?;
            let line = left.line;
            left = Expression::new(
                ExpressionKind::Binary(BinaryExpression {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                }),
                line,
            );
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        let line = self.current.line;
        let operator = match self.current.kind {
            TokenKind::Minus => UnaryOperator::Minus,
            TokenKind::Bang | TokenKind::Not => UnaryOperator::Not,
            TokenKind::Tilde => UnaryOperator::Complement,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let operator = if self.check(&TokenKind::PlusPlus) {
                    UpdateOperator::Increment
                } else {
                    UpdateOperator::Decrement
                };
                self.advance();
                let target = self.parse_unary()?;
                return Ok(Expression::new(
                    ExpressionKind::Update(UpdateExpression {
                        operator,
                        prefix: true,
                        target: Box::new(target),
                    }),
                    line,
                ));
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;

        Ok(Expression::new(
            ExpressionKind::Unary(UnaryExpression {
                operator,
                operand: Box::new(operand),
            }),
            line,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            let line = expr.line;
            match &self.current.kind {
                TokenKind::Dot => {
                    self.advance();
                    let field = self.expect_identifier()?;
                    expr = Expression::new(
                        ExpressionKind::Selector(SelectorExpression {
                            object: Box::new(expr),
                            field,
                        }),
                        line,
                    );
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RightBracket)?;
                    expr = Expression::new(
                        ExpressionKind::Subscript(SubscriptExpression {
                            object: Box::new(expr),
                            index: Box::new(index),
                        }),
                        line,
                    );
                }
                TokenKind::LeftParen => {
                    self.advance();
                    let args = self.parse_arguments()?;
                    expr = Expression::new(
                        ExpressionKind::Call(CallExpression {
                            callee: Box::new(expr),
                            args,
                        }),
                        line,
                    );
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let operator = if self.check(&TokenKind::PlusPlus) {
                        UpdateOperator::Increment
                    } else {
                        UpdateOperator::Decrement
                    };
                    self.advance();
                    return Ok(Expression::new(
                        ExpressionKind::Update(UpdateExpression {
                            operator,
                            prefix: false,
                            target: Box::new(expr),
                        }),
                        line,
                    ));
                }
                TokenKind::Ellipsis => {
                    self.advance();
                    return Ok(Expression::new(ExpressionKind::Spread(Box::new(expr)), line));
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Parses call arguments after `(`, consuming the `)`.
    fn parse_arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut args = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            args.push(self.parse_expression()?);
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let line = self.current.line;
        let kind = match &self.current.kind {
            TokenKind::Number(n) => ExpressionKind::Number(*n),
            TokenKind::String(s) => ExpressionKind::String(s.clone()),
            TokenKind::Identifier(name) => ExpressionKind::Identifier(name.clone()),
            TokenKind::True => ExpressionKind::Bool(true),
            TokenKind::False => ExpressionKind::Bool(false),
            TokenKind::Nil => ExpressionKind::Nil,
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RightParen)?;
                return Ok(expr);
            }
            TokenKind::LeftBracket => return self.parse_array_literal(),
            TokenKind::LeftBrace => return self.parse_object_literal(),
            TokenKind::Func => {
                self.advance();
                let literal = self.parse_function_rest()?;
                return Ok(Expression::new(ExpressionKind::Function(Box::new(literal)), line));
            }
            other => return Err(self.error(format!("unexpected {}", other))),
        };
        self.advance();
        Ok(Expression::new(kind, line))
    }

    fn parse_array_literal(&mut self) -> Result<Expression, ParseError> {
        let line = self.current.line;
        self.advance(); // consume '['

        let mut elements = Vec::new();
        while !self.check(&TokenKind::RightBracket) {
            elements.push(self.parse_expression()?);
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(&TokenKind::RightBracket)?;

        Ok(Expression::new(ExpressionKind::Array(elements), line))
    }

    fn parse_object_literal(&mut self) -> Result<Expression, ParseError> {
        let line = self.current.line;
        self.advance(); // consume '{'

        let mut fields = Vec::new();
        loop {
            self.skip_semicolons();
            if self.check(&TokenKind::RightBrace) {
                break;
            }

            let key_line = self.current.line;
            let key = match &self.current.kind {
                TokenKind::Identifier(name) => name.clone(),
                TokenKind::String(s) => s.clone(),
                other => return Err(self.error(format!("expected field name, found {}", other))),
            };
            let shorthand = matches!(self.current.kind, TokenKind::Identifier(_));
            self.advance();

            let value = if self.check(&TokenKind::Colon) {
                self.advance();
                self.parse_expression()?
            } else if shorthand {
                Expression::new(ExpressionKind::Identifier(key.clone()), key_line)
            } else {
                return Err(self.error(format!("expected ':' after field {:?}", key)));
            };
            fields.push(ObjectField { key, value });

            self.skip_semicolons();
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.skip_semicolons();
        self.expect(&TokenKind::RightBrace)?;

        Ok(Expression::new(ExpressionKind::Object(fields), line))
    }
}

/// Maps a token to its binary operator and precedence level.
fn binary_operator(kind: &TokenKind) -> Option<(BinaryOperator, usize)> {
    Some(match kind {
        TokenKind::PipePipe => (BinaryOperator::Or, 0),
        TokenKind::AmpersandAmpersand => (BinaryOperator::And, 1),
        TokenKind::EqualEqual => (BinaryOperator::Eq, 2),
        TokenKind::BangEqual => (BinaryOperator::Ne, 2),
        TokenKind::Less => (BinaryOperator::Lt, 3),
        TokenKind::LessEqual => (BinaryOperator::Le, 3),
        TokenKind::Greater => (BinaryOperator::Gt, 3),
        TokenKind::GreaterEqual => (BinaryOperator::Ge, 3),
        TokenKind::Plus => (BinaryOperator::Add, 4),
        TokenKind::Minus => (BinaryOperator::Sub, 4),
        TokenKind::Pipe => (BinaryOperator::BitOr, 4),
        TokenKind::Caret => (BinaryOperator::BitXor, 4),
        TokenKind::Star => (BinaryOperator::Mul, 5),
        TokenKind::Slash => (BinaryOperator::Div, 5),
        TokenKind::Percent => (BinaryOperator::Mod, 5),
        TokenKind::StarStar => (BinaryOperator::Pow, 5),
        TokenKind::LessLess => (BinaryOperator::Shl, 5),
        TokenKind::GreaterGreater => (BinaryOperator::Shr, 5),
        TokenKind::Ampersand => (BinaryOperator::BitAnd, 5),
        _ => return None,
    })
}
