//! Decomposition of call chains such as `a.b().c(x).d()` into hops, resolving the receiver type
//! of every hop until the one the compiler complains about.

use crate::AnalysisError;
use crate::brackets::{
    find_matching, find_open_paren, last_top_level_assignment, operand_at, split_arguments,
    split_top_level,
};
use crate::resolver::{TypeResolver, literal_type};
use crate::types;
use bump_core::ErrorLocation;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::trace;

static CAST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(\s*([A-Za-z_$][\w$.]*(?:<[^()]*>)?(?:\[\])*)\s*\)\s*[A-Za-z_$(\x22']").unwrap());

const CONTROL_KEYWORDS: [&str; 4] = ["if", "while", "switch", "synchronized"];
const LEADING_KEYWORDS: [&str; 4] = ["return", "throw", "else", "yield"];

/// javac expands tabs to this width when it reports columns.
const TAB_WIDTH: usize = 8;

/// Where a chain comes from: the broken code and enough of its surroundings to resolve names.
#[derive(Debug, Clone, Copy)]
pub struct ChainInput<'a> {
    /// 1-based column of the diagnostic on the first line of `expression`.
    pub column: usize,
    /// 1-based line of the diagnostic.
    pub line: usize,
    pub expression: &'a str,
    /// Source the broken code was read from.
    pub class_file: &'a Path,
    /// Simple name of the broken class.
    pub class_name: &'a str,
}

/// The hop of a chain a diagnostic is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodChainAnalysis {
    pub target_class: String,
    pub target_method: Option<String>,
    pub parameter_types: Vec<Option<String>>,
    pub is_constructor: bool,
}

impl From<MethodChainAnalysis> for ErrorLocation {
    fn from(analysis: MethodChainAnalysis) -> ErrorLocation {
        ErrorLocation::new(
            analysis.target_class,
            analysis.target_method,
            analysis.parameter_types,
        )
    }
}

/// Converts a javac column (1-based, tabs expanded) into a byte offset into `line`.
pub fn column_to_offset(line: &str, column: usize) -> usize {
    let target = column.saturating_sub(1);
    let mut visual = 0;
    for (offset, c) in line.char_indices() {
        if visual >= target {
            return offset;
        }
        visual = if c == '\t' {
            (visual / TAB_WIDTH + 1) * TAB_WIDTH
        } else {
            visual + 1
        };
    }
    line.len()
}

/// The part of the broken code the analysis works on, with the column relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Focus {
    text: String,
    column: usize,
    is_constructor: bool,
}

impl Focus {
    fn cut_front(&mut self, n: usize) {
        self.text.drain(..n);
        self.column = self.column.saturating_sub(n);
    }

    fn cut_to(&mut self, start: usize, end: usize) {
        self.text.truncate(end);
        self.cut_front(start);
    }

    fn trim(&mut self) {
        let trailing: &[char] = &[';', '{', ' ', '\t', '\r', '\n'];
        let kept = self.text.trim_end_matches(trailing).len();
        self.text.truncate(kept);
        let leading = self.text.len() - self.text.trim_start().len();
        self.cut_front(leading);
    }

    /// Removes the leading word `word` if followed by whitespace or `(`.
    fn strip_word(&mut self, word: &str) -> bool {
        let Some(rest) = self.text.strip_prefix(word) else {
            return false;
        };
        if !rest.starts_with(|c: char| c.is_whitespace() || c == '(') {
            return false;
        }
        self.cut_front(word.len());
        self.trim();
        true
    }

    /// Peels statement syntax off the front until an expression starts.
    fn strip_prefixes(&mut self) {
        self.is_constructor = false;
        loop {
            self.trim();
            if let Some(i) = last_top_level_assignment(&self.text) {
                self.cut_front(i + 1);
                continue;
            }
            if self.text.starts_with('}') || self.text.starts_with('!') {
                self.cut_front(1);
                continue;
            }
            if LEADING_KEYWORDS.iter().any(|k| self.strip_word(k)) {
                continue;
            }
            if CONTROL_KEYWORDS.iter().any(|k| self.strip_word(k)) {
                if self.text.starts_with('(') {
                    if let Some(close) = find_matching(&self.text, 0) {
                        self.cut_to(1, close);
                    }
                }
                continue;
            }
            if let Some(arrow) = top_level_arrow(&self.text) {
                self.cut_front(arrow + 2);
                continue;
            }
            let cast_end = CAST
                .captures(&self.text)
                .and_then(|c| c.get(1))
                .map(|m| m.end());
            if let Some(end) = cast_end {
                let close = self.text[end..].find(')').map_or(end, |i| end + i + 1);
                self.cut_front(close);
                continue;
            }
            break;
        }
        let (start, end) = operand_at(&self.text, self.column);
        if (start, end) != (0, self.text.len()) {
            self.cut_to(start, end);
            self.trim();
        }
        if self.strip_word("new") {
            self.is_constructor = true;
        }
    }

    /// Narrows to the argument that holds the column when the column lies inside the arguments
    /// of a call that themselves contain a call. Returns whether it narrowed.
    fn drill(&mut self) -> bool {
        let mut from = 0;
        while let Some(open) = find_open_paren(&self.text, from) {
            let Some(close) = find_matching(&self.text, open) else {
                return false;
            };
            if self.column > open && self.column < close {
                let inner = &self.text[open + 1..close];
                if !inner.contains('(') {
                    return false;
                }
                let relative = self.column - (open + 1);
                let (start, piece) = split_top_level(inner, b',')
                    .into_iter()
                    .rev()
                    .find(|(start, _)| *start <= relative)
                    .unwrap_or((0, inner));
                let (start, end) = (open + 1 + start, open + 1 + start + piece.len());
                self.cut_to(start, end);
                return true;
            }
            from = close + 1;
        }
        false
    }
}

/// Index of a lambda arrow outside any brackets.
fn top_level_arrow(text: &str) -> Option<usize> {
    let pieces = split_top_level(text, b'>');
    pieces
        .iter()
        .take(pieces.len().saturating_sub(1))
        .map(|(start, piece)| start + piece.len())
        .find(|&gt| gt > 0 && text.as_bytes()[gt - 1] == b'-')
        .map(|gt| gt - 1)
}

fn narrow(expression: &str, offset: usize) -> Focus {
    let mut focus = Focus {
        text: expression.to_string(),
        column: offset,
        is_constructor: false,
    };
    focus.strip_prefixes();
    while focus.drill() {
        focus.strip_prefixes();
    }
    focus
}

/// One hop of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    name: String,
    /// `None` for field access.
    arguments: Option<Vec<String>>,
    /// Offset of the `.` before the segment.
    dot: Option<usize>,
}

impl Segment {
    fn is_call(&self) -> bool {
        self.arguments.is_some()
    }

    fn starts_uppercase(&self) -> bool {
        self.name.starts_with(|c: char| c.is_uppercase())
    }
}

fn parse_call(piece: &str) -> (String, Option<Vec<String>>) {
    let piece = piece.trim();
    if piece.starts_with('(') {
        return (piece.to_string(), None);
    }
    let Some(open) = find_open_paren(piece, 0) else {
        return (piece.to_string(), None);
    };
    let close = find_matching(piece, open).unwrap_or(piece.len());
    let arguments = split_arguments(&piece[open + 1..close.max(open + 1)])
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut name = piece[..open].trim();
    // Explicit type arguments: `Collections.<String>emptyList()`.
    if name.starts_with('<') {
        name = name.rsplit('>').next().unwrap_or(name).trim();
    }
    (types::erase_generics(name), Some(arguments))
}

/// Splits a chain at its top-level dots. For a constructor chain the dotted class name and its
/// argument list form the first segment.
fn parse_segments(text: &str, is_constructor: bool) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest_start = 0;
    if is_constructor {
        let close = find_open_paren(text, 0).and_then(|open| find_matching(text, open));
        let end = close.map_or(text.len(), |c| c + 1);
        let (name, arguments) = parse_call(&text[..end]);
        segments.push(Segment {
            name,
            arguments: arguments.or_else(|| Some(Vec::new())),
            dot: None,
        });
        match text[end..].find('.') {
            Some(dot) => rest_start = end + dot + 1,
            None => return segments,
        }
    }
    for (start, piece) in split_top_level(&text[rest_start..], b'.') {
        let start = rest_start + start;
        let (name, arguments) = parse_call(piece);
        let dot = (start > 0).then(|| start - 1);
        segments.push(Segment {
            name,
            arguments,
            dot,
        });
    }
    segments
}

/// Result of resolving one hop.
struct Hop {
    resolved: Option<String>,
    parameter_types: Vec<Option<String>>,
}

pub struct MethodChainAnalyzer<'r> {
    resolver: &'r TypeResolver,
}

impl<'r> MethodChainAnalyzer<'r> {
    pub fn new(resolver: &'r TypeResolver) -> MethodChainAnalyzer<'r> {
        MethodChainAnalyzer { resolver }
    }

    /// Finds the hop of the chain in `input` nearest the diagnostic column. A hop whose receiver
    /// type cannot be resolved ends the walk: the result then names the last resolved class and
    /// the failing hop.
    pub fn analyze(&self, input: &ChainInput) -> Result<Option<MethodChainAnalysis>, AnalysisError> {
        let first_line = input.expression.lines().next().unwrap_or_default();
        let focus = narrow(input.expression, column_to_offset(first_line, input.column));
        trace!("chain focus {:?} at {}", focus.text, focus.column);
        let segments = parse_segments(&focus.text, focus.is_constructor);
        if segments.is_empty() || segments[0].name.is_empty() {
            return Ok(None);
        }
        let last = segments
            .iter()
            .rposition(|s| s.dot.is_none_or(|d| d <= focus.column))
            .unwrap_or(0);
        let segments = &segments[..=last];

        if segments.len() == 1 {
            let segment = &segments[0];
            let parameter_types = self.argument_types(segment, input)?;
            let name = segment.name.clone();
            return Ok(Some(if focus.is_constructor {
                MethodChainAnalysis {
                    target_method: Some(types::simple_name(&name).to_string()),
                    target_class: name,
                    parameter_types,
                    is_constructor: true,
                }
            } else {
                MethodChainAnalysis {
                    target_class: name,
                    target_method: None,
                    parameter_types,
                    is_constructor: false,
                }
            }));
        }

        let Some((mut receiver, next)) = self.start(segments, focus.is_constructor, input)? else {
            return Ok(None);
        };
        if next > last {
            return Ok(Some(MethodChainAnalysis {
                target_class: receiver,
                target_method: None,
                parameter_types: Vec::new(),
                is_constructor: false,
            }));
        }
        for segment in &segments[next..last] {
            let hop = self.hop(&receiver, segment, input)?;
            match hop.resolved {
                Some(resolved) => receiver = resolved,
                None => {
                    trace!("chain breaks at {receiver}.{}", segment.name);
                    return Ok(Some(MethodChainAnalysis {
                        target_class: receiver,
                        target_method: Some(segment.name.clone()),
                        parameter_types: hop.parameter_types,
                        is_constructor: false,
                    }));
                }
            }
        }
        let target = &segments[last];
        Ok(Some(MethodChainAnalysis {
            target_class: receiver,
            target_method: Some(target.name.clone()),
            parameter_types: self.argument_types(target, input)?,
            is_constructor: false,
        }))
    }

    /// The type an expression evaluates to: the last hop's return or field type, the class of a
    /// constructor call, or the declared type of a plain name.
    pub fn expression_type(&self, expression: &str, input: &ChainInput) -> Result<Option<String>, AnalysisError> {
        let mut focus = Focus {
            text: expression.to_string(),
            column: 0,
            is_constructor: false,
        };
        focus.strip_prefixes();
        let segments = parse_segments(&focus.text, focus.is_constructor);
        if segments.is_empty() || segments[0].name.is_empty() {
            return Ok(None);
        }
        let Some((mut receiver, next)) = self.start(&segments, focus.is_constructor, input)? else {
            return Ok(None);
        };
        for segment in segments.iter().skip(next) {
            match self.hop(&receiver, segment, input)?.resolved {
                Some(resolved) => receiver = resolved,
                None => return Ok(None),
            }
        }
        Ok(Some(receiver))
    }

    /// Types of a call's arguments, boxed. Field access has none.
    fn argument_types(&self, segment: &Segment, input: &ChainInput) -> Result<Vec<Option<String>>, AnalysisError> {
        let Some(arguments) = &segment.arguments else {
            return Ok(Vec::new());
        };
        arguments.iter().map(|a| self.argument_type(a, input)).collect()
    }

    /// Type of one call argument, boxed: literals, casts, object creation, call chains and
    /// variables are recognized. `null` and anything unresolvable give `None`.
    pub fn argument_type(&self, argument: &str, input: &ChainInput) -> Result<Option<String>, AnalysisError> {
        let argument = argument.trim();
        if argument.is_empty() || argument == "null" {
            return Ok(None);
        }
        if let Some(ty) = literal_type(argument) {
            return Ok(Some(ty));
        }
        if argument == "this" {
            return Ok(Some(input.class_name.to_string()));
        }
        if let Some(cast) = CAST.captures(argument) {
            return Ok(Some(types::boxed(&types::erase_generics(&cast[1]))));
        }
        if let Some(created) = argument.strip_prefix("new ") {
            let end = created.find(['(', '[', '{']).unwrap_or(created.len());
            let mut name = types::erase_generics(&created[..end]);
            if created[end..].starts_with('[') {
                name.push_str("[]");
            }
            return Ok(Some(name));
        }
        let (start, end) = operand_at(argument, 0);
        let single_operand = (start, end) == (0, argument.len());
        let member_chain = argument.contains('(')
            || (argument.contains('.')
                && argument.chars().all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '$')));
        let ty = if single_operand && member_chain {
            self.expression_type(argument, input)?
        } else {
            self.resolver
                .resolve_variable_in_hierarchy(argument, input.class_file, input.line, input.class_name)?
        };
        Ok(ty.map(|t| types::boxed(&t)))
    }

    /// Resolves the receiver the chain starts from. Returns its type and the index of the first
    /// segment still to walk.
    fn start(
        &self,
        segments: &[Segment],
        is_constructor: bool,
        input: &ChainInput,
    ) -> Result<Option<(String, usize)>, AnalysisError> {
        let first = &segments[0];
        if is_constructor {
            return Ok(Some((first.name.clone(), 1)));
        }
        if first.name.starts_with('(') {
            // `((Widget) o).size()` or `(a.b()).c()`.
            let close = find_matching(&first.name, 0).unwrap_or(first.name.len());
            let inner = first.name[1..close.max(1)].trim();
            let ty = match CAST.captures(inner) {
                Some(cast) => Some(types::erase_generics(&cast[1])),
                None => self.expression_type(inner, input)?,
            };
            return Ok(ty.map(|t| (t, 1)));
        }
        match first.name.as_str() {
            "super" => {
                let parent = self.resolver.resolve_parent_class(input.class_file)?;
                return Ok(parent.map(|p| (p, 1)));
            }
            "this" => return Ok(Some((input.class_name.to_string(), 1))),
            _ => {}
        }
        if first.is_call() {
            // Unqualified call: the first hop is on the current class.
            return Ok(Some((input.class_name.to_string(), 0)));
        }
        if let Some(ty) = self.resolver.resolve_variable_in_hierarchy(
            &first.name,
            input.class_file,
            input.line,
            input.class_name,
        )? {
            return Ok(Some((types::erase_generics(&ty), 1)));
        }
        // A static reference: `Widget.create()`, or `com.example.Widget.create()` whose package
        // segments fold into the class name.
        let mut class = first.name.clone();
        let mut next = 1;
        if !first.starts_uppercase() {
            while let Some(segment) = segments.get(next) {
                if segment.is_call() {
                    break;
                }
                class = format!("{class}.{}", segment.name);
                next += 1;
                if segment.starts_uppercase() {
                    break;
                }
            }
            if !types::simple_name(&class).starts_with(|c: char| c.is_uppercase()) {
                // No class segment: treat the name itself as the class.
                class = first.name.clone();
                next = 1;
            }
        }
        Ok(Some((class, next)))
    }

    /// Resolves `receiver.segment`.
    fn hop(&self, receiver: &str, segment: &Segment, input: &ChainInput) -> Result<Hop, AnalysisError> {
        if !segment.is_call() {
            let resolved = if segment.name == "length" && receiver.ends_with("[]") {
                Some("int".to_string())
            } else {
                self.resolver
                    .resolve_field_type(receiver, &segment.name)
                    .or_else(|| self.resolver.resolve_field_type_from_bytecode(receiver, &segment.name))
                    .or_else(|| {
                        // Unknown capitalized member of a class: a nested class.
                        segment
                            .starts_uppercase()
                            .then(|| format!("{receiver}.{}", segment.name))
                    })
            };
            return Ok(Hop {
                resolved: resolved.map(|t| types::erase_generics(&t)),
                parameter_types: Vec::new(),
            });
        }
        let parameter_types = self.argument_types(segment, input)?;
        let resolved = self
            .resolver
            .resolve_method_return_type(receiver, &segment.name, &parameter_types)
            .map(|t| types::erase_generics(&t));
        Ok(Hop {
            resolved,
            parameter_types,
        })
    }
}
