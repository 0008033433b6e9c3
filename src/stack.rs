//! Parser for Go-style runtime stack dumps.
//!
//! A dump is a sequence of records, each opened by a header line like
//! `goroutine 123 [chan receive]:` and followed by frame lines (a function
//! call line plus an indented source location) until the next header or end
//! of input. This module turns that text into [`Stack`] records; it never
//! interprets goroutine states beyond carrying them as opaque strings.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

/// Prefix that opens every record in a dump.
const HEADER_PREFIX: &str = "goroutine ";

/// Prefix of the synthetic frame naming the function that spawned a unit.
const CREATED_BY_PREFIX: &str = "created by ";

/// A single goroutine's captured stack.
#[derive(Debug, Clone)]
pub struct Stack {
    id: u64,
    state: String,
    first_function: String,
    all_functions: HashSet<String>,
    full: String,
}

impl Stack {
    /// Goroutine ID from the header line. Unique within one dump, but dumps
    /// list goroutines in no particular order.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Scheduler state from the header, e.g. `running` or `chan receive`.
    /// Opaque free text; callers match it by prefix or substring.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Name of the function on top of the stack. For a record whose first
    /// body line is a `created by` annotation, this is the creator function.
    pub fn first_function(&self) -> &str {
        &self.first_function
    }

    /// Reports whether `name` appears anywhere in this stack, including as
    /// the creator function.
    pub fn has_function(&self, name: &str) -> bool {
        self.all_functions.contains(name)
    }

    /// The verbatim record body (everything after the header line).
    pub fn full(&self) -> &str {
        &self.full
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Goroutine {} in state {}, with {} on top of the stack:\n{}",
            self.id, self.state, self.first_function, self.full
        )
    }
}

/// Failure to parse a single record. The parser keeps going after one of
/// these; only the offending record is lost.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Header line did not split into `goroutine <id> [<state>]:`.
    #[error("parse header: unexpected format: {0:?}")]
    UnexpectedFormat(String),

    /// Header id token was not an integer.
    #[error("parse header: bad goroutine ID {id:?} in line {line:?}")]
    BadGoroutineId { id: String, line: String },

    /// First frame line of a record carried no function signature.
    #[error("extract function: no function found: {0:?}")]
    NoFunction(String),
}

/// Line scanner with single-line push-back, so the header that terminates
/// one record can start the next.
struct LineScanner<'a> {
    lines: std::str::Lines<'a>,
    current: Option<&'a str>,
    unscanned: bool,
}

impl<'a> LineScanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            current: None,
            unscanned: false,
        }
    }

    fn scan(&mut self) -> Option<&'a str> {
        if self.unscanned {
            self.unscanned = false;
            return self.current;
        }
        self.current = self.lines.next();
        self.current
    }

    /// Make the next `scan` return the current line again.
    fn unscan(&mut self) {
        if self.current.is_some() {
            self.unscanned = true;
        }
    }
}

/// Streaming parser over one dump. Records that fail to parse are reported
/// alongside the ones that succeed.
pub struct StackParser<'a> {
    scan: LineScanner<'a>,
    stacks: Vec<Stack>,
    errors: Vec<ParseError>,
}

impl<'a> StackParser<'a> {
    pub fn new(dump: &'a str) -> Self {
        Self {
            scan: LineScanner::new(dump),
            stacks: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Parse the whole dump, returning records in input order plus every
    /// per-record error encountered.
    pub fn parse(mut self) -> (Vec<Stack>, Vec<ParseError>) {
        while let Some(line) = self.scan.scan() {
            if line.starts_with(HEADER_PREFIX) {
                match self.parse_stack(line) {
                    Ok(stack) => self.stacks.push(stack),
                    Err(err) => self.errors.push(err),
                }
            }
        }
        (self.stacks, self.errors)
    }

    /// Parse one record starting at `header`, consuming body lines up to
    /// (but not including) the next header.
    fn parse_stack(&mut self, header: &str) -> Result<Stack, ParseError> {
        let (id, state) = parse_header(header)?;

        let mut first_function = String::new();
        let mut all_functions = HashSet::new();
        let mut full = String::new();

        while let Some(line) = self.scan.scan() {
            if line.starts_with(HEADER_PREFIX) {
                // End of this record; push back so the outer loop sees the
                // next header.
                self.scan.unscan();
                break;
            }

            full.push_str(line);
            full.push('\n');

            // Indented lines are source locations, not calls.
            if line.starts_with('\t') || line.starts_with(' ') {
                continue;
            }

            match parse_func_name(line) {
                Ok(name) => {
                    if first_function.is_empty() {
                        first_function.clone_from(&name);
                    }
                    all_functions.insert(name);
                }
                // The first line after the header is the top of the stack
                // and must carry a signature; later unparseable lines are
                // kept as body text only.
                Err(err) if first_function.is_empty() => return Err(err),
                Err(_) => {}
            }
        }

        Ok(Stack {
            id,
            state,
            first_function,
            all_functions,
            full,
        })
    }
}

/// Parse a header line such as `goroutine 643 [runnable]:` into the
/// goroutine ID and state text.
fn parse_header(line: &str) -> Result<(u64, String), ParseError> {
    // Trailing newline and colon are trimmed separately so each is optional.
    let line = line.trim_end_matches('\n').trim_end_matches(':');

    let parts: Vec<&str> = line.splitn(3, ' ').collect();
    if parts.len() != 3 {
        return Err(ParseError::UnexpectedFormat(line.to_string()));
    }

    let id: u64 = parts[1].parse().map_err(|_| ParseError::BadGoroutineId {
        id: parts[1].to_string(),
        line: line.to_string(),
    })?;

    let state = parts[2];
    let state = state.strip_prefix('[').unwrap_or(state);
    let state = state.strip_suffix(']').unwrap_or(state);

    Ok((id, state.to_string()))
}

/// Extract the qualified function name from a call line.
///
/// A normal call line is everything up to its last `(`. A `created by` line
/// names the spawning function, with any trailing ` in goroutine N`
/// annotation stripped.
fn parse_func_name(line: &str) -> Result<String, ParseError> {
    let line = line.trim();

    if let Some(creator) = line.strip_prefix(CREATED_BY_PREFIX) {
        let name = match creator.find(" in goroutine ") {
            Some(idx) => &creator[..idx],
            None => creator,
        };
        return Ok(name.to_string());
    }

    match line.rfind('(') {
        Some(idx) if idx > 0 => Ok(line[..idx].to_string()),
        _ => Err(ParseError::NoFunction(line.to_string())),
    }
}

/// Parse a dump produced by a live snapshot capability.
///
/// Such dumps are well-formed by contract, so any parse failure here means
/// the parser and the runtime's dump format have diverged. That is a bug in
/// this crate, not a recoverable condition, so it aborts with the full
/// context rather than returning an error.
pub fn parse_trusted(dump: &str) -> Vec<Stack> {
    let (stacks, errors) = StackParser::new(dump).parse();
    if !errors.is_empty() {
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        panic!("failed to parse stack dump:\n{joined}\n\nraw dump:\n{dump}");
    }
    stacks
}
