//! 切点（Pointcut）表达式系统
//!
//! 切点是针对静态反射事实的布尔谓词，在织入期对每个候选方法求值一次。
//!
//! 支持的语法：
//! - 逻辑运算：`&&`/`and`、`||`/`or`、`!`/`not`、括号
//! - 比较运算：`==`/`===`、`!=`/`!==`、`<`、`<=`、`>`、`>=`
//! - 集合与字符串：`in`、`not in`、`starts with`、`ends with`、`contains`、`matches`
//! - 字面量：字符串、整数、`true`、`false`、`null`、数组 `[a, b]`
//! - 变量：`class`、`method`、`serviceId`、`serviceTags`、`parentClasses`
//! - 函数：`count(list)`
//!
//! 形如 `Class::method` 的完整签名走快速路径，直接与候选方法签名比较

mod eval;
mod lexer;
mod parser;

use crate::error::{AopError, AopResult};
use crate::metadata::{ClassMetadata, MethodMetadata};
use parser::Expr;

/// 词法/语法错误
#[derive(Debug, Clone)]
pub(crate) struct SyntaxError {
    pub(crate) position: usize,
    pub(crate) message: String,
}

#[derive(Debug, Clone)]
enum PointcutKind {
    Signature,
    Expression(Expr),
}

/// 编译后的切点
#[derive(Debug, Clone)]
pub struct Pointcut {
    statement: String,
    kind: PointcutKind,
}

impl Pointcut {
    /// 编译切点语句
    ///
    /// 语法错误在这里立即报告，不会在匹配时静默失败
    pub fn compile(statement: &str) -> AopResult<Self> {
        let statement = statement.trim();
        if is_signature(statement) {
            return Ok(Self {
                statement: statement.to_string(),
                kind: PointcutKind::Signature,
            });
        }

        let expr = parser::parse(statement).map_err(|e| AopError::MalformedPointcut {
            statement: statement.to_string(),
            position: e.position,
            message: e.message,
        })?;

        Ok(Self {
            statement: statement.to_string(),
            kind: PointcutKind::Expression(expr),
        })
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// 是否是完整方法签名
    pub fn is_signature(&self) -> bool {
        matches!(self.kind, PointcutKind::Signature)
    }

    /// 检查候选方法是否匹配
    pub fn matches(&self, ctx: &MatchContext<'_>) -> AopResult<bool> {
        match &self.kind {
            PointcutKind::Signature => Ok(self.statement == ctx.signature()),
            PointcutKind::Expression(expr) => eval::evaluate(expr, ctx)
                .map(|value| value.truthy())
                .map_err(|message| AopError::PointcutEvaluation {
                    statement: self.statement.clone(),
                    message,
                }),
        }
    }
}

/// `Class::method` 形式：无空白，包含 `::`，只由标识符字符与路径分隔符组成
fn is_signature(statement: &str) -> bool {
    statement.contains("::")
        && !statement.starts_with(':')
        && !statement.ends_with(':')
        && statement
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == ':' || c == '\\')
}

/// 切点求值的上下文
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub class: &'a ClassMetadata,
    pub method: &'a MethodMetadata,
    pub service_id: &'a str,
    pub service_tags: &'a [String],
    /// 自身 + 祖先类 + 接口
    pub parent_classes: &'a [String],
}

impl MatchContext<'_> {
    /// 候选方法的完整签名
    pub fn signature(&self) -> String {
        self.class.signature(self.method.name())
    }
}

/// 编译并求值一条语句
pub fn matches(statement: &str, ctx: &MatchContext<'_>) -> AopResult<bool> {
    Pointcut::compile(statement)?.matches(ctx)
}
