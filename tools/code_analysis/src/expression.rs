//! Static typing of primitive expressions such as `count * 2L` or `name + ":" + id`.
//!
//! Applies Java's unary and binary numeric promotion, string concatenation and the boolean
//! operators to a parsed expression. Operand types come from a caller-supplied lookup; method
//! calls and unknown names make the arithmetic around them unknown.

use crate::types;

/// Infers the type of an operator expression.
pub trait ExpressionTyper: Send + Sync {
    /// Returns the boxed, qualified type name of `expression` (`java.lang.Long`, ...), or `None`
    /// when it cannot be determined. `lookup` maps identifiers to their declared types.
    fn infer(&self, expression: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Option<String>;
}

/// The default [`ExpressionTyper`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NumericPromotionTyper;

impl ExpressionTyper for NumericPromotionTyper {
    fn infer(&self, expression: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Option<String> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            lookup,
        };
        let ty = parser.ternary().ok()?;
        if parser.pos != parser.tokens.len() {
            return None;
        }
        ty.map(Ty::into_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Ty {
    Bool,
    Char,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Str,
    Other(String),
}

impl Ty {
    fn from_name(name: &str) -> Ty {
        let name = types::erase_generics(name);
        match name.as_str() {
            "boolean" | "Boolean" | types::BOOLEAN => Ty::Bool,
            "char" | "Character" | types::CHARACTER => Ty::Char,
            "byte" | "Byte" | types::BYTE => Ty::Byte,
            "short" | "Short" | types::SHORT => Ty::Short,
            "int" | "Integer" | types::INTEGER => Ty::Int,
            "long" | "Long" | types::LONG => Ty::Long,
            "float" | "Float" | types::FLOAT => Ty::Float,
            "double" | "Double" | types::DOUBLE => Ty::Double,
            "String" | types::STRING => Ty::Str,
            _ => Ty::Other(name),
        }
    }

    fn into_name(self) -> String {
        match self {
            Ty::Bool => types::BOOLEAN.into(),
            Ty::Char => types::CHARACTER.into(),
            Ty::Byte => types::BYTE.into(),
            Ty::Short => types::SHORT.into(),
            Ty::Int => types::INTEGER.into(),
            Ty::Long => types::LONG.into(),
            Ty::Float => types::FLOAT.into(),
            Ty::Double => types::DOUBLE.into(),
            Ty::Str => types::STRING.into(),
            Ty::Other(name) => name,
        }
    }

    /// Rank in the numeric promotion order, `None` for non-numeric types.
    fn numeric_rank(&self) -> Option<u8> {
        match self {
            Ty::Char | Ty::Byte | Ty::Short | Ty::Int => Some(0),
            Ty::Long => Some(1),
            Ty::Float => Some(2),
            Ty::Double => Some(3),
            _ => None,
        }
    }

    fn is_integral(&self) -> bool {
        matches!(self, Ty::Char | Ty::Byte | Ty::Short | Ty::Int | Ty::Long)
    }
}

fn unary_promotion(ty: Option<Ty>) -> Option<Ty> {
    match ty? {
        Ty::Char | Ty::Byte | Ty::Short | Ty::Int => Some(Ty::Int),
        t if t.numeric_rank().is_some() => Some(t),
        _ => None,
    }
}

fn binary_promotion(left: Option<Ty>, right: Option<Ty>) -> Option<Ty> {
    let rank = left?.numeric_rank()?.max(right?.numeric_rank()?);
    Some(match rank {
        0 => Ty::Int,
        1 => Ty::Long,
        2 => Ty::Float,
        _ => Ty::Double,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Number(String),
    Str,
    Char,
    Op(&'static str),
    Open,
    Close,
    OpenIndex,
    CloseIndex,
    Comma,
}

const OPERATORS: [&str; 23] = [
    ">>>", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+", "-", "*", "/", "%", "&", "|",
    "^", "~", "!", "<", ">", "?", ":",
];

fn tokenize(text: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '"' || c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += if chars[i] == '\\' { 2 } else { 1 };
            }
            if i >= chars.len() {
                return None;
            }
            i += 1;
            tokens.push(if c == '"' { Token::Str } else { Token::Char });
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            let hex = c == '0' && matches!(chars.get(i + 1), Some('x' | 'X'));
            while i < chars.len() {
                let d = chars[i];
                let exponent_sign = !hex
                    && (d == '+' || d == '-')
                    && matches!(chars[i - 1], 'e' | 'E');
                if d.is_ascii_alphanumeric() || d == '.' || d == '_' || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$' | '.')) {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let single = match c {
                '(' => Some(Token::Open),
                ')' => Some(Token::Close),
                '[' => Some(Token::OpenIndex),
                ']' => Some(Token::CloseIndex),
                ',' => Some(Token::Comma),
                _ => None,
            };
            if let Some(token) = single {
                tokens.push(token);
                i += 1;
                continue;
            }
            let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
            let op = OPERATORS.iter().find(|op| rest.starts_with(**op))?;
            tokens.push(Token::Op(*op));
            i += op.len();
        }
    }
    Some(tokens)
}

fn literal_type(literal: &str) -> Ty {
    let lower = literal.to_ascii_lowercase();
    if lower.starts_with("0x") || lower.starts_with("0b") {
        return if lower.ends_with('l') { Ty::Long } else { Ty::Int };
    }
    if lower.ends_with('l') {
        Ty::Long
    } else if lower.ends_with('f') {
        Ty::Float
    } else if lower.ends_with('d') || lower.contains('.') || lower.contains('e') {
        Ty::Double
    } else {
        Ty::Int
    }
}

fn precedence(op: &str) -> Option<u8> {
    Some(match op {
        "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" => 6,
        "<" | ">" | "<=" | ">=" => 7,
        "<<" | ">>" | ">>>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    })
}

const INSTANCEOF_PRECEDENCE: u8 = 7;

#[derive(Debug)]
struct Malformed;

type Typed = Result<Option<Ty>, Malformed>;

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, token: Token) -> Result<(), Malformed> {
        if self.next() == Some(token) { Ok(()) } else { Err(Malformed) }
    }

    fn ternary(&mut self) -> Typed {
        let condition = self.binary(1)?;
        if self.peek() != Some(&Token::Op("?")) {
            return Ok(condition);
        }
        self.pos += 1;
        let yes = self.ternary()?;
        self.expect(Token::Op(":"))?;
        let no = self.ternary()?;
        Ok(match (yes, no) {
            (Some(a), Some(b)) if a == b => Some(a),
            (a, b) => binary_promotion(a, b),
        })
    }

    fn binary(&mut self, min_precedence: u8) -> Typed {
        let mut left = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Ident(word)) if word == "instanceof" && INSTANCEOF_PRECEDENCE >= min_precedence => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(_)) => left = Some(Ty::Bool),
                        _ => return Err(Malformed),
                    }
                }
                Some(Token::Op(op)) => {
                    let op = *op;
                    let Some(precedence) = precedence(op).filter(|p| *p >= min_precedence) else {
                        return Ok(left);
                    };
                    self.pos += 1;
                    let right = self.binary(precedence + 1)?;
                    left = combine(op, left, right);
                }
                _ => return Ok(left),
            }
        }
    }

    fn unary(&mut self) -> Typed {
        match self.peek() {
            Some(Token::Op("-" | "+" | "~")) => {
                self.pos += 1;
                let operand = self.unary()?;
                Ok(unary_promotion(operand))
            }
            Some(Token::Op("!")) => {
                self.pos += 1;
                self.unary()?;
                Ok(Some(Ty::Bool))
            }
            Some(Token::Open) => {
                if let Some(cast) = self.cast_type() {
                    // `(` type `)`
                    self.pos += 3;
                    self.unary()?;
                    return Ok(Some(cast));
                }
                self.pos += 1;
                let inner = self.ternary()?;
                self.expect(Token::Close)?;
                Ok(inner)
            }
            _ => self.primary(),
        }
    }

    /// The target type if the tokens at the cursor form a cast `(Type) operand`.
    fn cast_type(&self) -> Option<Ty> {
        let Some(Token::Ident(name)) = self.tokens.get(self.pos + 1) else {
            return None;
        };
        if self.tokens.get(self.pos + 2) != Some(&Token::Close) {
            return None;
        }
        if types::is_primitive(name) {
            return Some(Ty::from_name(name));
        }
        let starts_operand = matches!(
            self.tokens.get(self.pos + 3),
            Some(Token::Ident(_) | Token::Number(_) | Token::Str | Token::Char | Token::Open)
        );
        let looks_like_type = types::simple_name(name)
            .chars()
            .next()
            .is_some_and(char::is_uppercase);
        (starts_operand && looks_like_type).then(|| Ty::from_name(name))
    }

    fn primary(&mut self) -> Typed {
        match self.next() {
            Some(Token::Number(literal)) => Ok(Some(literal_type(&literal))),
            Some(Token::Str) => Ok(Some(Ty::Str)),
            Some(Token::Char) => Ok(Some(Ty::Char)),
            Some(Token::Ident(name)) => {
                match name.as_str() {
                    "true" | "false" => return Ok(Some(Ty::Bool)),
                    "null" => return Ok(None),
                    _ => {}
                }
                match self.peek() {
                    Some(Token::Open) => {
                        // Method call; its return type is not known here.
                        self.skip_group(Token::Open, Token::Close)?;
                        Ok(None)
                    }
                    Some(Token::OpenIndex) => {
                        self.skip_group(Token::OpenIndex, Token::CloseIndex)?;
                        Ok((self.lookup)(&name)
                            .and_then(|t| t.trim().strip_suffix("[]").map(str::to_string))
                            .map(|t| Ty::from_name(&t)))
                    }
                    _ => Ok((self.lookup)(&name).map(|t| Ty::from_name(&t))),
                }
            }
            _ => Err(Malformed),
        }
    }

    fn skip_group(&mut self, open: Token, close: Token) -> Result<(), Malformed> {
        let mut depth = 0usize;
        while let Some(token) = self.next() {
            if token == open {
                depth += 1;
            } else if token == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
        Err(Malformed)
    }
}

fn combine(op: &str, left: Option<Ty>, right: Option<Ty>) -> Option<Ty> {
    match op {
        "&&" | "||" | "==" | "!=" | "<" | ">" | "<=" | ">=" => Some(Ty::Bool),
        "+" if left == Some(Ty::Str) || right == Some(Ty::Str) => Some(Ty::Str),
        "+" | "-" | "*" | "/" | "%" => binary_promotion(left, right),
        "<<" | ">>" | ">>>" => {
            let left = left.filter(Ty::is_integral)?;
            right.filter(Ty::is_integral)?;
            unary_promotion(Some(left))
        }
        "&" | "|" | "^" => match (left, right) {
            (Some(Ty::Bool), Some(Ty::Bool)) => Some(Ty::Bool),
            (Some(l), Some(r)) if l.is_integral() && r.is_integral() => {
                binary_promotion(Some(l), Some(r))
            }
            _ => None,
        },
        _ => None,
    }
}
