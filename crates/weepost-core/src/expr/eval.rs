//! Tree-walking evaluator

use std::cmp::Ordering;

use super::{BinaryOp, CmpOp, EvalError, Expr, UnaryOp};
use crate::sample::Sample;
use crate::value::Value;

impl Expr {
    /// Evaluate against a sample's fields. Never mutates anything.
    pub fn eval(&self, sample: &Sample) -> Result<Value, EvalError> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Field(name) => sample
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedName(name.clone())),
            Self::Unary(op, e) => unary(*op, e.eval(sample)?),
            Self::Binary(op, a, b) => binary(*op, a.eval(sample)?, b.eval(sample)?),
            Self::Compare(op, a, b) => compare(*op, &a.eval(sample)?, &b.eval(sample)?),
            Self::And(a, b) => {
                let lhs = a.eval(sample)?;
                if lhs.is_truthy() { b.eval(sample) } else { Ok(lhs) }
            }
            Self::Or(a, b) => {
                let lhs = a.eval(sample)?;
                if lhs.is_truthy() { Ok(lhs) } else { b.eval(sample) }
            }
            Self::Not(e) => Ok(Value::Bool(!e.eval(sample)?.is_truthy())),
            Self::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if cond.eval(sample)?.is_truthy() {
                    then.eval(sample)
                } else {
                    otherwise.eval(sample)
                }
            }
            Self::Call(func, args) => {
                let values = args
                    .iter()
                    .map(|a| a.eval(sample))
                    .collect::<Result<Vec<_>, _>>()?;
                func.apply(&values)
            }
        }
    }
}

fn unary(op: UnaryOp, v: Value) -> Result<Value, EvalError> {
    match (op, v) {
        (UnaryOp::Neg, Value::Int(i)) => Ok(i
            .checked_neg()
            .map_or(Value::Float(-(i as f64)), Value::Int)),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-i64::from(b))),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(i64::from(b))),
        (UnaryOp::Pos, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
        (op, v) => {
            let sym = if op == UnaryOp::Neg { "-" } else { "+" };
            Err(EvalError::Type(format!(
                "bad operand type for unary {sym}: '{}'",
                v.type_name()
            )))
        }
    }
}

/// Integer view for int-preserving arithmetic (bool counts as int)
fn as_int(v: &Value) -> Option<i64> {
    match *v {
        Value::Int(i) => Some(i),
        Value::Bool(b) => Some(i64::from(b)),
        _ => None,
    }
}

fn binary(op: BinaryOp, a: Value, b: Value) -> Result<Value, EvalError> {
    if let (BinaryOp::Add, Value::Text(x), Value::Text(y)) = (op, &a, &b) {
        return Ok(Value::Text(format!("{x}{y}")));
    }

    if let (Some(x), Some(y)) = (as_int(&a), as_int(&b)) {
        if let Some(v) = int_arith(op, x, y)? {
            return Ok(v);
        }
    }

    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(EvalError::Type(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            symbol(op),
            a.type_name(),
            b.type_name()
        )));
    };
    float_arith(op, x, y).map(Value::Float)
}

/// Integer arithmetic; `Ok(None)` means fall back to float (true division,
/// negative exponent, overflow).
fn int_arith(op: BinaryOp, x: i64, y: i64) -> Result<Option<Value>, EvalError> {
    let r = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::Div => None,
        BinaryOp::FloorDiv | BinaryOp::Mod if y == 0 => return Err(EvalError::ZeroDivision),
        // floor semantics: result takes the sign of the divisor
        BinaryOp::FloorDiv => x.checked_div_euclid(y).map(|q| {
            if y < 0 && x.rem_euclid(y) != 0 { q - 1 } else { q }
        }),
        BinaryOp::Mod => x.checked_rem_euclid(y).map(|r| {
            if y < 0 && r != 0 { r + y } else { r }
        }),
        BinaryOp::Pow => u32::try_from(y).ok().and_then(|e| x.checked_pow(e)),
    };
    Ok(r.map(Value::Int))
}

fn float_arith(op: BinaryOp, x: f64, y: f64) -> Result<f64, EvalError> {
    match op {
        BinaryOp::Add => Ok(x + y),
        BinaryOp::Sub => Ok(x - y),
        BinaryOp::Mul => Ok(x * y),
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if y == 0.0 => {
            Err(EvalError::ZeroDivision)
        }
        BinaryOp::Div => Ok(x / y),
        BinaryOp::FloorDiv => Ok((x / y).floor()),
        BinaryOp::Mod => {
            let r = x % y;
            Ok(if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r })
        }
        BinaryOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            if x < 0.0 && y.fract() != 0.0 {
                return Err(EvalError::Domain(
                    "negative number raised to a fractional power".into(),
                ));
            }
            Ok(x.powf(y))
        }
    }
}

const fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
    }
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<Value, EvalError> {
    let result = match op {
        CmpOp::Eq | CmpOp::Is => equal(a, b),
        CmpOp::Ne | CmpOp::IsNot => !equal(a, b),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ord = order(a, b).ok_or_else(|| {
                EvalError::Type(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    cmp_symbol(op),
                    a.type_name(),
                    b.type_name()
                ))
            })?;
            match op {
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Le => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }
        }
    };
    Ok(Value::Bool(result))
}

fn equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Text(x), Value::Text(y)) => x == y,
        _ => match (as_int(a), as_int(b)) {
            (Some(x), Some(y)) => x == y,
            _ => matches!((a.as_f64(), b.as_f64()), (Some(x), Some(y)) if x == y),
        },
    }
}

/// `None` for incomparable pairs, including NaN operands
fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        _ => match (as_int(a), as_int(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
    }
}

const fn cmp_symbol(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "<",
        CmpOp::Le => "<=",
        CmpOp::Gt => ">",
        CmpOp::Ge => ">=",
        CmpOp::Eq => "==",
        CmpOp::Ne => "!=",
        CmpOp::Is => "is",
        CmpOp::IsNot => "is not",
    }
}
