//! Fixed, read-only function table available to filter expressions

use super::EvalError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    // math namespace
    Sqrt,
    Exp,
    Log,
    Log10,
    Log2,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Floor,
    Ceil,
    Fabs,
    Pow,
    Radians,
    Degrees,
    Hypot,
    Trunc,
    // builtins
    Abs,
    Round,
    Min,
    Max,
    Int,
    Float,
}

impl Function {
    pub fn lookup(name: &str) -> Option<Self> {
        let f = match name {
            "math.sqrt" => Self::Sqrt,
            "math.exp" => Self::Exp,
            "math.log" => Self::Log,
            "math.log10" => Self::Log10,
            "math.log2" => Self::Log2,
            "math.sin" => Self::Sin,
            "math.cos" => Self::Cos,
            "math.tan" => Self::Tan,
            "math.asin" => Self::Asin,
            "math.acos" => Self::Acos,
            "math.atan" => Self::Atan,
            "math.atan2" => Self::Atan2,
            "math.floor" => Self::Floor,
            "math.ceil" => Self::Ceil,
            "math.fabs" => Self::Fabs,
            "math.pow" => Self::Pow,
            "math.radians" => Self::Radians,
            "math.degrees" => Self::Degrees,
            "math.hypot" => Self::Hypot,
            "math.trunc" => Self::Trunc,
            "abs" => Self::Abs,
            "round" => Self::Round,
            "min" => Self::Min,
            "max" => Self::Max,
            "int" => Self::Int,
            "float" => Self::Float,
            _ => return None,
        };
        Some(f)
    }

    /// Accepted argument count range (inclusive)
    pub const fn arity(self) -> (usize, usize) {
        match self {
            Self::Atan2 | Self::Pow | Self::Hypot => (2, 2),
            Self::Log | Self::Round => (1, 2),
            Self::Min | Self::Max => (1, usize::MAX),
            _ => (1, 1),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqrt => "math.sqrt",
            Self::Exp => "math.exp",
            Self::Log => "math.log",
            Self::Log10 => "math.log10",
            Self::Log2 => "math.log2",
            Self::Sin => "math.sin",
            Self::Cos => "math.cos",
            Self::Tan => "math.tan",
            Self::Asin => "math.asin",
            Self::Acos => "math.acos",
            Self::Atan => "math.atan",
            Self::Atan2 => "math.atan2",
            Self::Floor => "math.floor",
            Self::Ceil => "math.ceil",
            Self::Fabs => "math.fabs",
            Self::Pow => "math.pow",
            Self::Radians => "math.radians",
            Self::Degrees => "math.degrees",
            Self::Hypot => "math.hypot",
            Self::Trunc => "math.trunc",
            Self::Abs => "abs",
            Self::Round => "round",
            Self::Min => "min",
            Self::Max => "max",
            Self::Int => "int",
            Self::Float => "float",
        }
    }

    /// Apply to already-evaluated arguments.
    pub fn apply(self, args: &[Value]) -> Result<Value, EvalError> {
        let (min, max) = self.arity();
        if args.len() < min || args.len() > max {
            let expected = match (min, max) {
                (min, max) if min == max => min.to_string(),
                (min, usize::MAX) => format!("at least {min}"),
                (min, max) => format!("{min} to {max}"),
            };
            return Err(EvalError::Type(format!(
                "{}() takes {expected} arguments, got {}",
                self.name(),
                args.len()
            )));
        }
        match self {
            Self::Sqrt => {
                let x = self.num(&args[0])?;
                self.domain(x >= 0.0)?;
                Ok(Value::Float(x.sqrt()))
            }
            Self::Exp => self.unary(args, f64::exp),
            Self::Log => {
                let x = self.num(&args[0])?;
                self.domain(x > 0.0)?;
                match args.get(1) {
                    None => Ok(Value::Float(x.ln())),
                    Some(base) => {
                        let b = self.num(base)?;
                        self.domain(b > 0.0 && b != 1.0)?;
                        Ok(Value::Float(x.ln() / b.ln()))
                    }
                }
            }
            Self::Log10 | Self::Log2 => {
                let x = self.num(&args[0])?;
                self.domain(x > 0.0)?;
                let y = if self == Self::Log10 { x.log10() } else { x.log2() };
                Ok(Value::Float(y))
            }
            Self::Sin => self.unary(args, f64::sin),
            Self::Cos => self.unary(args, f64::cos),
            Self::Tan => self.unary(args, f64::tan),
            Self::Asin | Self::Acos => {
                let x = self.num(&args[0])?;
                self.domain((-1.0..=1.0).contains(&x))?;
                let y = if self == Self::Asin { x.asin() } else { x.acos() };
                Ok(Value::Float(y))
            }
            Self::Atan => self.unary(args, f64::atan),
            Self::Atan2 => {
                let (y, x) = (self.num(&args[0])?, self.num(&args[1])?);
                Ok(Value::Float(y.atan2(x)))
            }
            Self::Floor => self.to_int(args, f64::floor),
            Self::Ceil => self.to_int(args, f64::ceil),
            Self::Trunc => self.to_int(args, f64::trunc),
            Self::Fabs => self.unary(args, f64::abs),
            Self::Pow => {
                let (x, y) = (self.num(&args[0])?, self.num(&args[1])?);
                self.domain(!(x < 0.0 && y.fract() != 0.0))?;
                self.domain(!(x == 0.0 && y < 0.0))?;
                Ok(Value::Float(x.powf(y)))
            }
            Self::Radians => self.unary(args, f64::to_radians),
            Self::Degrees => self.unary(args, f64::to_degrees),
            Self::Hypot => {
                let (x, y) = (self.num(&args[0])?, self.num(&args[1])?);
                Ok(Value::Float(x.hypot(y)))
            }
            Self::Abs => match &args[0] {
                Value::Int(i) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::Domain("abs() overflow".into())),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                other => Ok(Value::Float(self.num(other)?.abs())),
            },
            Self::Round => self.round(args),
            Self::Min | Self::Max => self.extremum(args),
            Self::Int => match &args[0] {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Text(s) => s.trim().parse().map(Value::Int).map_err(|_| {
                    EvalError::Domain(format!("invalid literal for int(): {s:?}"))
                }),
                other => self.to_int(std::slice::from_ref(other), f64::trunc),
            },
            Self::Float => match &args[0] {
                Value::Text(s) => s.trim().parse().map(Value::Float).map_err(|_| {
                    EvalError::Domain(format!("could not convert string to float: {s:?}"))
                }),
                other => Ok(Value::Float(self.num(other)?)),
            },
        }
    }

    fn num(self, v: &Value) -> Result<f64, EvalError> {
        v.as_f64().ok_or_else(|| {
            EvalError::Type(format!(
                "{}() argument must be a number, not {}",
                self.name(),
                v.type_name()
            ))
        })
    }

    fn domain(self, ok: bool) -> Result<(), EvalError> {
        if ok {
            Ok(())
        } else {
            Err(EvalError::Domain(format!("{}() math domain error", self.name())))
        }
    }

    fn unary(self, args: &[Value], f: fn(f64) -> f64) -> Result<Value, EvalError> {
        Ok(Value::Float(f(self.num(&args[0])?)))
    }

    /// floor/ceil/trunc return integers
    fn to_int(self, args: &[Value], f: fn(f64) -> f64) -> Result<Value, EvalError> {
        if let Value::Int(i) = args[0] {
            return Ok(Value::Int(i));
        }
        let x = f(self.num(&args[0])?);
        if !x.is_finite() || x < i64::MIN as f64 || x >= i64::MAX as f64 {
            return Err(EvalError::Domain(format!(
                "{}() cannot convert {x} to integer",
                self.name()
            )));
        }
        Ok(Value::Int(x as i64))
    }

    fn round(self, args: &[Value]) -> Result<Value, EvalError> {
        let digits = match args.get(1) {
            None | Some(Value::Null) => None,
            Some(Value::Int(n)) => Some(*n),
            Some(other) => {
                return Err(EvalError::Type(format!(
                    "round() digits must be an integer, not {}",
                    other.type_name()
                )));
            }
        };
        match (&args[0], digits) {
            (Value::Int(i), _) => Ok(Value::Int(*i)),
            (v, None) => self.to_int(std::slice::from_ref(v), round_half_even),
            (v, Some(n)) => {
                let x = self.num(v)?;
                let n = n.clamp(-308, 308) as i32;
                let scale = 10f64.powi(n);
                Ok(Value::Float(round_half_even(x * scale) / scale))
            }
        }
    }

    fn extremum(self, args: &[Value]) -> Result<Value, EvalError> {
        let mut best = &args[0];
        let mut best_num = self.num(best)?;
        for v in &args[1..] {
            let n = self.num(v)?;
            let better = if self == Self::Min { n < best_num } else { n > best_num };
            if better {
                best = v;
                best_num = n;
            }
        }
        Ok(best.clone())
    }
}

/// Round half to even
fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
        r - x.signum()
    } else {
        r
    }
}
