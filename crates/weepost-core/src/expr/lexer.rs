//! Tokenizer for filter expressions

use super::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    // keywords
    If,
    Else,
    And,
    Or,
    Not,
    Is,
    None,
    True,
    False,
    // punctuation
    LParen,
    RParen,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
}

/// A token and the byte offset where it starts
pub type Spanned = (Token, usize);

pub fn tokenize(src: &str) -> Result<Vec<Spanned>, ParseError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
                continue;
            }
            b'0'..=b'9' => {
                let (tok, end) = lex_number(src, start)?;
                tokens.push((tok, start));
                i = end;
                continue;
            }
            b'.' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                let (tok, end) = lex_number(src, start)?;
                tokens.push((tok, start));
                i = end;
                continue;
            }
            b'"' | b'\'' => {
                let (s, end) = lex_string(src, start)?;
                tokens.push((Token::Str(s), start));
                i = end;
                continue;
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                tokens.push((keyword_or_name(&src[start..i]), start));
                continue;
            }
            _ => {}
        }

        let next = bytes.get(i + 1).copied();
        let (tok, width) = match (c, next) {
            (b'*', Some(b'*')) => (Token::StarStar, 2),
            (b'/', Some(b'/')) => (Token::SlashSlash, 2),
            (b'<', Some(b'=')) => (Token::Le, 2),
            (b'>', Some(b'=')) => (Token::Ge, 2),
            (b'=', Some(b'=')) => (Token::EqEq, 2),
            (b'!', Some(b'=')) => (Token::NotEq, 2),
            (b'(', _) => (Token::LParen, 1),
            (b')', _) => (Token::RParen, 1),
            (b',', _) => (Token::Comma, 1),
            (b'.', _) => (Token::Dot, 1),
            (b'+', _) => (Token::Plus, 1),
            (b'-', _) => (Token::Minus, 1),
            (b'*', _) => (Token::Star, 1),
            (b'/', _) => (Token::Slash, 1),
            (b'%', _) => (Token::Percent, 1),
            (b'<', _) => (Token::Lt, 1),
            (b'>', _) => (Token::Gt, 1),
            _ => {
                let ch = src[start..].chars().next().unwrap_or('?');
                return Err(ParseError::new(start, format!("unexpected character {ch:?}")));
            }
        };
        tokens.push((tok, start));
        i += width;
    }

    Ok(tokens)
}

fn keyword_or_name(word: &str) -> Token {
    match word {
        "if" => Token::If,
        "else" => Token::Else,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "is" => Token::Is,
        "None" => Token::None,
        "True" => Token::True,
        "False" => Token::False,
        _ => Token::Name(word.to_string()),
    }
}

fn lex_number(src: &str, start: usize) -> Result<(Token, usize), ParseError> {
    let bytes = src.as_bytes();
    let mut i = start;
    let mut is_float = false;

    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        is_float = true;
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < bytes.len() && matches!(bytes[j], b'+' | b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text = &src[start..i];
    let tok = if is_float {
        text.parse()
            .map(Token::Float)
            .map_err(|_| ParseError::new(start, format!("invalid number {text:?}")))?
    } else {
        text.parse()
            .map(Token::Int)
            .map_err(|_| ParseError::new(start, format!("integer literal {text} out of range")))?
    };
    Ok((tok, i))
}

fn lex_string(src: &str, start: usize) -> Result<(String, usize), ParseError> {
    let mut chars = src[start..].char_indices();
    let (_, quote) = chars.next().ok_or_else(|| ParseError::new(start, "empty string"))?;
    let mut out = String::new();

    while let Some((off, ch)) = chars.next() {
        match ch {
            c if c == quote => return Ok((out, start + off + c.len_utf8())),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, c)) => out.push(c),
                None => break,
            },
            c => out.push(c),
        }
    }
    Err(ParseError::new(start, "unterminated string literal"))
}
