//! 通知（Advice）定义
//!
//! 一条通知 = 通知类型 + 切点。切点既可以是完整的表达式，
//! 也可以是几种常用的简写形式，简写在织入期被合成为表达式文本

use std::fmt;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdviceKind {
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（抛出异常时执行）
    AfterThrowing,
    /// 环绕通知（可以控制方法执行）
    Around,
}

impl AdviceKind {
    pub const ALL: [AdviceKind; 5] = [
        AdviceKind::Before,
        AdviceKind::After,
        AdviceKind::AfterReturning,
        AdviceKind::AfterThrowing,
        AdviceKind::Around,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceKind::Before => "Before",
            AdviceKind::After => "After",
            AdviceKind::AfterReturning => "AfterReturning",
            AdviceKind::AfterThrowing => "AfterThrowing",
            AdviceKind::Around => "Around",
        }
    }
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 切点的声明形式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointcutSpec {
    /// 完整的表达式，或 `Class::method` 形式的精确签名
    Statement(String),
    /// 类上带有指定属性
    ClassAttribute(String),
    /// 方法上带有指定属性
    MethodAttribute(String),
    /// 服务 ID 匹配，支持 `*suffix` 与 `prefix*` 通配
    ServiceIds(Vec<String>),
    /// 服务带有任一标签
    ServiceTags(Vec<String>),
    /// 继承/实现任一父类型，且自身不是 final
    ParentClasses(Vec<String>),
}

impl PointcutSpec {
    /// 合成表达式文本
    pub fn statement(&self) -> String {
        match self {
            PointcutSpec::Statement(statement) => statement.clone(),
            PointcutSpec::ClassAttribute(name) => {
                format!("count(class.getAttributes({})) > 0", quote(name))
            }
            PointcutSpec::MethodAttribute(name) => {
                format!("count(method.getAttributes({})) > 0", quote(name))
            }
            PointcutSpec::ServiceIds(ids) => service_id_statement(ids),
            PointcutSpec::ServiceTags(tags) => {
                or_all(tags.iter().map(|tag| format!("({} in serviceTags)", quote(tag))))
            }
            PointcutSpec::ParentClasses(parents) => {
                if parents.is_empty() {
                    return "false".to_string();
                }
                let any_parent =
                    or_all(parents.iter().map(|p| format!("({} in parentClasses)", quote(p))));
                format!("!class.isFinal() && ({})", any_parent)
            }
        }
    }
}

/// 服务 ID 语句：精确集合、`*suffix`、`prefix*` 三类以 OR 组合
///
/// 精确集合为空时不生成 `serviceId in ['']` 子句，否则空字符串 ID 会被误匹配；
/// 整个列表为空时结果为 `false`
fn service_id_statement(ids: &[String]) -> String {
    let mut exact = Vec::new();
    let mut ends_with = Vec::new();
    let mut starts_with = Vec::new();

    for id in ids {
        let mut wildcard = false;
        if id.starts_with('*') {
            ends_with.push(id.trim_matches('*'));
            wildcard = true;
        }
        if id.ends_with('*') {
            starts_with.push(id.trim_matches('*'));
            wildcard = true;
        }
        if !wildcard {
            exact.push(id.as_str());
        }
    }

    let mut clauses = Vec::new();
    if !exact.is_empty() {
        let list: Vec<String> = exact.iter().map(|id| quote(id)).collect();
        clauses.push(format!("(serviceId in [{}])", list.join(", ")));
    }
    for item in ends_with {
        clauses.push(format!("(serviceId ends with {})", quote(item)));
    }
    for item in starts_with {
        clauses.push(format!("(serviceId starts with {})", quote(item)));
    }
    or_all(clauses.into_iter())
}

fn or_all(clauses: impl Iterator<Item = String>) -> String {
    let clauses: Vec<String> = clauses.collect();
    if clauses.is_empty() {
        "false".to_string()
    } else {
        clauses.join(" || ")
    }
}

/// 单引号字符串字面量
pub(crate) fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// 通知声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advice {
    kind: AdviceKind,
    pointcut: PointcutSpec,
}

impl Advice {
    pub fn new(kind: AdviceKind, pointcut: PointcutSpec) -> Self {
        Self { kind, pointcut }
    }

    pub fn before(statement: impl Into<String>) -> Self {
        Self::new(AdviceKind::Before, PointcutSpec::Statement(statement.into()))
    }

    pub fn after(statement: impl Into<String>) -> Self {
        Self::new(AdviceKind::After, PointcutSpec::Statement(statement.into()))
    }

    pub fn after_returning(statement: impl Into<String>) -> Self {
        Self::new(
            AdviceKind::AfterReturning,
            PointcutSpec::Statement(statement.into()),
        )
    }

    pub fn after_throwing(statement: impl Into<String>) -> Self {
        Self::new(
            AdviceKind::AfterThrowing,
            PointcutSpec::Statement(statement.into()),
        )
    }

    pub fn around(statement: impl Into<String>) -> Self {
        Self::new(AdviceKind::Around, PointcutSpec::Statement(statement.into()))
    }

    pub fn kind(&self) -> AdviceKind {
        self.kind
    }

    pub fn pointcut(&self) -> &PointcutSpec {
        &self.pointcut
    }

    /// 切点语句；空语句视为未声明
    pub fn statement(&self) -> Option<String> {
        let statement = self.pointcut.statement();
        if statement.trim().is_empty() {
            None
        } else {
            Some(statement)
        }
    }
}
