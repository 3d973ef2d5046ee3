//! Recursive-descent parser producing [`Expr`] trees

use super::functions::Function;
use super::lexer::{Spanned, Token, tokenize};
use super::{BinaryOp, CmpOp, Expr, ParseError, UnaryOp};
use crate::value::Value;

/// Deepest nesting (parentheses, unary chains, operator chains) accepted
const MAX_DEPTH: usize = 100;

/// Parse a complete expression; trailing tokens are an error.
pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: src.len(),
        depth: 0,
    };
    let expr = parser.conditional()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(parser.error(format!("unexpected {tok:?} after expression"))),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Source length, reported for errors at end of input
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, at)| *at)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.offset(), message)
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Token, what: &str) -> Result<(), ParseError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    /// Count one more level of nesting; fails past [`MAX_DEPTH`].
    fn deepen(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run a recursive production one level deeper.
    fn nested(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        self.deepen()?;
        let expr = f(self)?;
        self.depth -= 1;
        Ok(expr)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    // a if cond else b
    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let then = self.or()?;
        if !self.eat(&Token::If) {
            return Ok(then);
        }
        let cond = self.or()?;
        self.expect(&Token::Else, "'else'")?;
        let otherwise = self.nested(Self::conditional)?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    // Each link of an operator chain nests the tree one level, so chains
    // count against the depth limit too.
    fn or(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.and()?;
        while self.eat(&Token::Or) {
            self.deepen()?;
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.not()?;
        while self.eat(&Token::And) {
            self.deepen()?;
            let rhs = self.not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Not) {
            let inner = self.nested(Self::not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::EqEq) => CmpOp::Eq,
            Some(Token::NotEq) => CmpOp::Ne,
            Some(Token::Is) => {
                self.pos += 1;
                let op = if self.eat(&Token::Not) {
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                };
                let rhs = self.additive()?;
                return self.finish_comparison(op, lhs, rhs);
            }
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        self.finish_comparison(op, lhs, rhs)
    }

    fn finish_comparison(&self, op: CmpOp, lhs: Expr, rhs: Expr) -> Result<Expr, ParseError> {
        if matches!(
            self.peek(),
            Some(Token::Lt | Token::Le | Token::Gt | Token::Ge | Token::EqEq | Token::NotEq | Token::Is)
        ) {
            return Err(self.error("chained comparisons are not supported"));
        }
        Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.deepen()?;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::SlashSlash) => BinaryOp::FloorDiv,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            self.deepen()?;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            let inner = self.nested(Self::unary)?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        if self.eat(&Token::Plus) {
            let inner = self.nested(Self::unary)?;
            return Ok(Expr::Unary(UnaryOp::Pos, Box::new(inner)));
        }
        self.power()
    }

    // ** is right-associative and binds tighter than a unary minus on its left
    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.primary()?;
        if self.eat(&Token::StarStar) {
            let exp = self.nested(Self::unary)?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let at = self.offset();
        let tok = self
            .next()
            .ok_or_else(|| ParseError::new(at, "unexpected end of expression"))?;
        match tok {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::Text(s))),
            Token::None => Ok(Expr::Literal(Value::Null)),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::LParen => {
                let inner = self.nested(Self::conditional)?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Name(name) => self.name(name, at),
            other => Err(ParseError::new(at, format!("unexpected {other:?}"))),
        }
    }

    /// Field reference, namespaced constant, or function call
    fn name(&mut self, name: String, at: usize) -> Result<Expr, ParseError> {
        let qualified = if self.eat(&Token::Dot) {
            let member_at = self.offset();
            match self.next() {
                Some(Token::Name(member)) => format!("{name}.{member}"),
                _ => return Err(ParseError::new(member_at, "expected name after '.'")),
            }
        } else {
            name
        };

        if self.peek() != Some(&Token::LParen) {
            return match qualified.as_str() {
                "math.pi" => Ok(Expr::Literal(Value::Float(std::f64::consts::PI))),
                "math.e" => Ok(Expr::Literal(Value::Float(std::f64::consts::E))),
                q if q.contains('.') => {
                    Err(ParseError::new(at, format!("unknown constant {q}")))
                }
                _ => Ok(Expr::Field(qualified)),
            };
        }

        self.pos += 1;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.nested(Self::conditional)?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma, "',' or ')'")?;
            }
        }

        let func = Function::lookup(&qualified)
            .ok_or_else(|| ParseError::new(at, format!("unknown function {qualified}")))?;
        let (min, max) = func.arity();
        if args.len() < min || args.len() > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            };
            return Err(ParseError::new(
                at,
                format!("{qualified}() takes {expected} arguments, got {}", args.len()),
            ));
        }
        Ok(Expr::Call(func, args))
    }
}
