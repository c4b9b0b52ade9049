//! 切点表达式语法分析
//!
//! 优先级（由低到高）：`||` < `&&` < 比较运算 < `!` < 成员调用 < 基本表达式

use super::lexer::{tokenize, Spanned, Token};
use super::SyntaxError;
use regex::Regex;

/// 表达式最大嵌套深度
pub(crate) const MAX_NESTING_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Str(String),
    Int(i64),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    StartsWith,
    EndsWith,
    Contains,
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Literal),
    Array(Vec<Expr>),
    Variable(String),
    Call {
        function: String,
        args: Vec<Expr>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// 右侧必须是字符串字面量，正则在编译期构建
    Matches {
        subject: Box<Expr>,
        pattern: Regex,
    },
}

pub(crate) fn parse(source: &str) -> Result<Expr, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected trailing token {:?}", other))),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let index = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[index].token
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            position: self.tokens[self.pos].offset,
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), SyntaxError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, found {:?}", expected, self.peek())))
        }
    }

    /// 在下一层嵌套中解析，超过深度上限时报错
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error(format!(
                "expression nested deeper than {} levels",
                MAX_NESTING_DEPTH
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn is_keyword(&self, ahead: usize, keyword: &str) -> bool {
        matches!(self.peek_at(ahead), Token::Ident(word) if word == keyword)
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        self.nested(|parser| {
            let mut left = parser.parse_and()?;
            while matches!(parser.peek(), Token::OrOr) || parser.is_keyword(0, "or") {
                parser.advance();
                let right = parser.parse_and()?;
                left = Expr::Or(Box::new(left), Box::new(right));
            }
            Ok(left)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_comparison()?;
        while matches!(self.peek(), Token::AndAnd) || self.is_keyword(0, "and") {
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Eq | Token::StrictEq => Some((BinaryOp::Eq, 1)),
                Token::Ne | Token::StrictNe => Some((BinaryOp::Ne, 1)),
                Token::Lt => Some((BinaryOp::Lt, 1)),
                Token::Le => Some((BinaryOp::Le, 1)),
                Token::Gt => Some((BinaryOp::Gt, 1)),
                Token::Ge => Some((BinaryOp::Ge, 1)),
                _ if self.is_keyword(0, "in") => Some((BinaryOp::In, 1)),
                _ if self.is_keyword(0, "not") && self.is_keyword(1, "in") => {
                    Some((BinaryOp::NotIn, 2))
                }
                _ if self.is_keyword(0, "starts") && self.is_keyword(1, "with") => {
                    Some((BinaryOp::StartsWith, 2))
                }
                _ if self.is_keyword(0, "ends") && self.is_keyword(1, "with") => {
                    Some((BinaryOp::EndsWith, 2))
                }
                _ if self.is_keyword(0, "contains") => Some((BinaryOp::Contains, 1)),
                _ if self.is_keyword(0, "matches") => {
                    self.advance();
                    left = self.parse_matches(left)?;
                    continue;
                }
                _ => None,
            };

            let Some((op, width)) = op else {
                return Ok(left);
            };
            for _ in 0..width {
                self.advance();
            }
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_matches(&mut self, subject: Expr) -> Result<Expr, SyntaxError> {
        let Token::Str(raw) = self.peek().clone() else {
            return Err(self.error("`matches` expects a string literal pattern"));
        };
        let pattern = strip_delimiters(&raw);
        let regex = Regex::new(pattern)
            .map_err(|e| self.error(format!("invalid regular expression: {}", e)))?;
        self.advance();
        Ok(Expr::Matches {
            subject: Box::new(subject),
            pattern: regex,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        if matches!(self.peek(), Token::Bang) || self.is_keyword(0, "not") {
            self.advance();
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary()?;
        while matches!(self.peek(), Token::Dot) {
            self.advance();
            let Token::Ident(method) = self.advance() else {
                return Err(self.error("expected method name after '.'"));
            };
            let args = self.parse_arguments()?;
            expr = Expr::MethodCall {
                receiver: Box::new(expr),
                method,
                args,
            };
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        self.expect(Token::LParen)?;
        let args = self.parse_list(Token::RParen)?;
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn parse_list(&mut self, close: Token) -> Result<Vec<Expr>, SyntaxError> {
        let mut items = Vec::new();
        if *self.peek() == close {
            return Ok(items);
        }
        loop {
            items.push(self.parse_or()?);
            if matches!(self.peek(), Token::Comma) {
                self.advance();
                // 允许尾随逗号
                if *self.peek() == close {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(items)
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek().clone() {
            Token::Str(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::Str(value)))
            }
            Token::Int(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::Int(value)))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                self.advance();
                let items = self.parse_list(Token::RBracket)?;
                self.expect(Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Token::Ident(name) => {
                self.advance();
                match name.as_str() {
                    "true" => Ok(Expr::Literal(Literal::Bool(true))),
                    "false" => Ok(Expr::Literal(Literal::Bool(false))),
                    "null" => Ok(Expr::Literal(Literal::Null)),
                    _ if matches!(self.peek(), Token::LParen) => {
                        let args = self.parse_arguments()?;
                        Ok(Expr::Call {
                            function: name,
                            args,
                        })
                    }
                    _ => Ok(Expr::Variable(name)),
                }
            }
            Token::Eof => Err(self.error("unexpected end of expression")),
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }
}

/// 去掉 `/.../` 形式的正则分隔符
fn strip_delimiters(raw: &str) -> &str {
    if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}
