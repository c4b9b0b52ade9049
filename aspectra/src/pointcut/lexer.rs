//! 切点表达式词法分析

use super::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Str(String),
    Int(i64),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    AndAnd,
    OrOr,
    Bang,
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, SyntaxError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let peek = chars.get(i + 1).map(|(_, c)| *c);
        let peek2 = chars.get(i + 2).map(|(_, c)| *c);
        let mut push = |token: Token, width: usize| {
            tokens.push(Spanned { token, offset });
            width
        };

        let width = match c {
            '(' => push(Token::LParen, 1),
            ')' => push(Token::RParen, 1),
            '[' => push(Token::LBracket, 1),
            ']' => push(Token::RBracket, 1),
            ',' => push(Token::Comma, 1),
            '.' => push(Token::Dot, 1),
            '&' if peek == Some('&') => push(Token::AndAnd, 2),
            '|' if peek == Some('|') => push(Token::OrOr, 2),
            '=' if peek == Some('=') && peek2 == Some('=') => push(Token::StrictEq, 3),
            '=' if peek == Some('=') => push(Token::Eq, 2),
            '!' if peek == Some('=') && peek2 == Some('=') => push(Token::StrictNe, 3),
            '!' if peek == Some('=') => push(Token::Ne, 2),
            '!' => push(Token::Bang, 1),
            '<' if peek == Some('=') => push(Token::Le, 2),
            '<' => push(Token::Lt, 1),
            '>' if peek == Some('=') => push(Token::Ge, 2),
            '>' => push(Token::Gt, 1),
            '\'' | '"' => {
                let (value, consumed) = read_string(&chars, i)?;
                push(Token::Str(value), consumed)
            }
            c if c.is_ascii_digit()
                || (c == '-' && peek.is_some_and(|p| p.is_ascii_digit())) =>
            {
                let mut end = i + 1;
                while end < chars.len() && chars[end].1.is_ascii_digit() {
                    end += 1;
                }
                let text: String = chars[i..end].iter().map(|(_, c)| c).collect();
                let value = text.parse::<i64>().map_err(|e| SyntaxError {
                    position: offset,
                    message: format!("invalid integer '{}': {}", text, e),
                })?;
                push(Token::Int(value), end - i)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = i + 1;
                while end < chars.len() && (chars[end].1.is_alphanumeric() || chars[end].1 == '_') {
                    end += 1;
                }
                let ident: String = chars[i..end].iter().map(|(_, c)| c).collect();
                push(Token::Ident(ident), end - i)
            }
            other => {
                return Err(SyntaxError {
                    position: offset,
                    message: format!("unexpected character '{}'", other),
                })
            }
        };
        i += width;
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: source.len(),
    });
    Ok(tokens)
}

/// 读取引号字符串，返回内容与消耗的字符数
fn read_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), SyntaxError> {
    let (offset, quote) = chars[start];
    let mut value = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i].1;
        if c == quote {
            return Ok((value, i + 1 - start));
        }
        if c == '\\' {
            match chars.get(i + 1).map(|(_, c)| *c) {
                Some('\\') => value.push('\\'),
                Some('\'') => value.push('\''),
                Some('"') => value.push('"'),
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some(other) => {
                    value.push('\\');
                    value.push(other);
                }
                None => break,
            }
            i += 2;
            continue;
        }
        value.push(c);
        i += 1;
    }

    Err(SyntaxError {
        position: offset,
        message: "unterminated string literal".to_string(),
    })
}
