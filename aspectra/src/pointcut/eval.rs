//! 切点表达式求值

use super::parser::{BinaryOp, Expr, Literal};
use super::MatchContext;
use crate::metadata::{ClassMetadata, MethodMetadata};

#[derive(Debug, Clone)]
pub(crate) enum Val<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Val<'a>>),
    Class(&'a ClassMetadata),
    Method(&'a MethodMetadata),
}

impl Val<'_> {
    pub(crate) fn truthy(&self) -> bool {
        match self {
            Val::Null => false,
            Val::Bool(b) => *b,
            Val::Int(n) => *n != 0,
            Val::Str(s) => !s.is_empty(),
            Val::List(items) => !items.is_empty(),
            Val::Class(_) | Val::Method(_) => true,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Bool(_) => "bool",
            Val::Int(_) => "int",
            Val::Str(_) => "string",
            Val::List(_) => "array",
            Val::Class(_) => "class",
            Val::Method(_) => "method",
        }
    }

    fn strict_eq(&self, other: &Val<'_>) -> bool {
        match (self, other) {
            (Val::Null, Val::Null) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::List(a), Val::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.strict_eq(y))
            }
            (Val::Class(a), Val::Class(b)) => a.name() == b.name(),
            (Val::Method(a), Val::Method(b)) => a.name() == b.name(),
            _ => false,
        }
    }
}

pub(crate) fn evaluate<'a>(expr: &Expr, ctx: &MatchContext<'a>) -> Result<Val<'a>, String> {
    match expr {
        Expr::Literal(literal) => Ok(match literal {
            Literal::Str(s) => Val::Str(s.clone()),
            Literal::Int(n) => Val::Int(*n),
            Literal::Bool(b) => Val::Bool(*b),
            Literal::Null => Val::Null,
        }),
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Val::List),
        Expr::Variable(name) => variable(name, ctx),
        Expr::Call { function, args } => call_function(function, args, ctx),
        Expr::MethodCall {
            receiver,
            method,
            args,
        } => {
            let receiver = evaluate(receiver, ctx)?;
            let args = args
                .iter()
                .map(|arg| evaluate(arg, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            call_method(receiver, method, &args)
        }
        Expr::Not(inner) => Ok(Val::Bool(!evaluate(inner, ctx)?.truthy())),
        Expr::And(left, right) => {
            // 短路求值
            if !evaluate(left, ctx)?.truthy() {
                return Ok(Val::Bool(false));
            }
            Ok(Val::Bool(evaluate(right, ctx)?.truthy()))
        }
        Expr::Or(left, right) => {
            if evaluate(left, ctx)?.truthy() {
                return Ok(Val::Bool(true));
            }
            Ok(Val::Bool(evaluate(right, ctx)?.truthy()))
        }
        Expr::Binary { op, left, right } => {
            let left = evaluate(left, ctx)?;
            let right = evaluate(right, ctx)?;
            binary(*op, &left, &right).map(Val::Bool)
        }
        Expr::Matches { subject, pattern } => match evaluate(subject, ctx)? {
            Val::Str(s) => Ok(Val::Bool(pattern.is_match(&s))),
            other => Err(format!("`matches` expects a string, got {}", other.type_name())),
        },
    }
}

fn variable<'a>(name: &str, ctx: &MatchContext<'a>) -> Result<Val<'a>, String> {
    let strings = |items: &[String]| Val::List(items.iter().cloned().map(Val::Str).collect());
    match name {
        "class" => Ok(Val::Class(ctx.class)),
        "method" => Ok(Val::Method(ctx.method)),
        "serviceId" => Ok(Val::Str(ctx.service_id.to_string())),
        "serviceTags" => Ok(strings(ctx.service_tags)),
        "parentClasses" => Ok(strings(ctx.parent_classes)),
        other => Err(format!("unknown variable '{}'", other)),
    }
}

fn call_function<'a>(
    function: &str,
    args: &[Expr],
    ctx: &MatchContext<'a>,
) -> Result<Val<'a>, String> {
    match function {
        "count" => {
            let [arg] = args else {
                return Err(format!("count() takes 1 argument, {} given", args.len()));
            };
            match evaluate(arg, ctx)? {
                Val::List(items) => Ok(Val::Int(items.len() as i64)),
                other => Err(format!("count() expects an array, got {}", other.type_name())),
            }
        }
        other => Err(format!("unknown function '{}'", other)),
    }
}

/// 可选的单个字符串参数（属性名过滤）
fn name_filter<'v>(method: &str, args: &'v [Val<'_>]) -> Result<Option<&'v str>, String> {
    match args {
        [] => Ok(None),
        [Val::Str(name)] => Ok(Some(name.as_str())),
        _ => Err(format!("{}() takes an optional string argument", method)),
    }
}

fn attribute_list<'a>(attributes: &[String], filter: Option<&str>) -> Val<'a> {
    Val::List(
        attributes
            .iter()
            .filter(|a| filter.map_or(true, |name| a.as_str() == name))
            .cloned()
            .map(Val::Str)
            .collect(),
    )
}

fn call_method<'a>(receiver: Val<'a>, method: &str, args: &[Val<'a>]) -> Result<Val<'a>, String> {
    let no_args = || {
        if args.is_empty() {
            Ok(())
        } else {
            Err(format!("{}() takes no arguments", method))
        }
    };

    match receiver {
        Val::Class(class) => match method {
            "getName" => no_args().map(|_| Val::Str(class.name().to_string())),
            "getShortName" => no_args().map(|_| Val::Str(class.short_name().to_string())),
            "isFinal" => no_args().map(|_| Val::Bool(class.is_final())),
            "isAbstract" => no_args().map(|_| Val::Bool(class.is_abstract())),
            "getInterfaceNames" => no_args().map(|_| {
                Val::List(class.interface_names().into_iter().map(Val::Str).collect())
            }),
            "getAttributes" => {
                let filter = name_filter(method, args)?;
                Ok(attribute_list(class.attributes(), filter))
            }
            other => Err(format!("unknown class method '{}'", other)),
        },
        Val::Method(m) => match method {
            "getName" => no_args().map(|_| Val::Str(m.name().to_string())),
            "isPublic" => no_args().map(|_| Val::Bool(m.is_public())),
            "getAttributes" => {
                let filter = name_filter(method, args)?;
                Ok(attribute_list(m.attributes(), filter))
            }
            other => Err(format!("unknown method method '{}'", other)),
        },
        other => Err(format!(
            "cannot call {}() on a value of type {}",
            method,
            other.type_name()
        )),
    }
}

fn binary(op: BinaryOp, left: &Val<'_>, right: &Val<'_>) -> Result<bool, String> {
    match op {
        BinaryOp::Eq => Ok(left.strict_eq(right)),
        BinaryOp::Ne => Ok(!left.strict_eq(right)),
        BinaryOp::In | BinaryOp::NotIn => {
            let Val::List(items) = right else {
                return Err(format!("`in` expects an array, got {}", right.type_name()));
            };
            let found = items.iter().any(|item| item.strict_eq(left));
            Ok(if op == BinaryOp::In { found } else { !found })
        }
        BinaryOp::StartsWith | BinaryOp::EndsWith | BinaryOp::Contains => {
            let (Val::Str(haystack), Val::Str(needle)) = (left, right) else {
                return Err(format!(
                    "string operator expects strings, got {} and {}",
                    left.type_name(),
                    right.type_name()
                ));
            };
            Ok(match op {
                BinaryOp::StartsWith => haystack.starts_with(needle.as_str()),
                BinaryOp::EndsWith => haystack.ends_with(needle.as_str()),
                _ => haystack.contains(needle.as_str()),
            })
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Val::Int(a), Val::Int(b)) => a.cmp(b),
                (Val::Str(a), Val::Str(b)) => a.cmp(b),
                _ => {
                    return Err(format!(
                        "cannot compare {} with {}",
                        left.type_name(),
                        right.type_name()
                    ))
                }
            };
            Ok(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}
