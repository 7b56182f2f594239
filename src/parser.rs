use memmap::Mmap;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;
use std::fs::File;

const COMMENT_MARKERS: [&str; 3] = ["//", "#", ";"];

#[derive(Debug)]
pub(crate) enum ParseErrorKind {
    FileOpenError(Box<dyn Error>),
    MemoryMapError(Box<dyn Error>),
    SourceNotUtf8(std::str::Utf8Error),
    UnterminatedString(usize),
    UnknownOpcode(usize, String),
    OperandCount(usize, &'static str, usize, usize),
    InvalidInteger(usize, String),
    InvalidLabel(usize, String),
    ExpectedString(usize, &'static str, String),
    UnexpectedString(usize, &'static str, &'static str),
    EmptyString(usize),
    LabelRedefined(usize, usize, String),
    DanglingLabel(usize, String),
}

impl ParseErrorKind {
    pub(crate) fn throw<T>(self) -> Result<T, ParseError> {
        let msg = match &self {
            ParseErrorKind::FileOpenError(err) => {
                format!("failed to open source file, details: {}", err)
            }
            ParseErrorKind::MemoryMapError(err) => {
                format!("failed to memory map source file, details: {}", err)
            }
            ParseErrorKind::SourceNotUtf8(err) => {
                format!("source file is not valid utf-8, details: {}", err)
            }
            ParseErrorKind::UnterminatedString(line) => {
                format!("unterminated string literal on line {}", line)
            }
            ParseErrorKind::UnknownOpcode(line, name) => {
                format!("unknown opcode '{}' on line {}", name, line)
            }
            ParseErrorKind::OperandCount(line, opcode, expected, found) => format!(
                "opcode '{}' on line {} expected {} operand(s), got {}",
                opcode, line, expected, found
            ),
            ParseErrorKind::InvalidInteger(line, token) => {
                format!("invalid integer literal '{}' on line {}", token, line)
            }
            ParseErrorKind::InvalidLabel(line, name) => {
                format!("invalid label name '{}' on line {}", name, line)
            }
            ParseErrorKind::ExpectedString(line, opcode, token) => format!(
                "opcode '{}' on line {} expected a quoted string, got '{}'",
                opcode, line, token
            ),
            ParseErrorKind::UnexpectedString(line, opcode, kind) => format!(
                "opcode '{}' on line {} expected {} operand, got a quoted string",
                opcode, line, kind
            ),
            ParseErrorKind::EmptyString(line) => {
                format!("string literal on line {} cannot be empty", line)
            }
            ParseErrorKind::LabelRedefined(line, first_line, name) => format!(
                "label '{}' re-defined on line {} (first seen on line {})",
                name, line, first_line
            ),
            ParseErrorKind::DanglingLabel(line, name) => format!(
                "label '{}' on line {} is not attached to an instruction",
                name, line
            ),
        };
        Err(ParseError { msg, kind: self })
    }
}

impl Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Raised when the source text violates the instruction format.
#[derive(Debug)]
pub struct ParseError {
    pub(crate) msg: String,
    pub(crate) kind: ParseErrorKind,
}

impl Error for ParseError {}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

/// The kind of value an operand slot accepts.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OperandKind {
    Int,
    Str,
    Label,
}

/// The closed instruction set. Adding an opcode means adding a variant here
/// and covering it in `mnemonic`, `from_mnemonic` and `operand_kinds`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Opcode {
    Sip,
    Ember,
    Twist,
    Flash,
    Drift,
    GlintZero,
    GlintPos,
    Quiet,
}

impl Opcode {
    pub fn from_mnemonic(token: &str) -> Option<Opcode> {
        match token {
            "SIP" => Some(Opcode::Sip),
            "EMBER" => Some(Opcode::Ember),
            "TWIST" => Some(Opcode::Twist),
            "FLASH" => Some(Opcode::Flash),
            "DRIFT" => Some(Opcode::Drift),
            "GLINT.ZERO" => Some(Opcode::GlintZero),
            "GLINT.POS" => Some(Opcode::GlintPos),
            "QUIET" => Some(Opcode::Quiet),
            _ => None,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Sip => "SIP",
            Opcode::Ember => "EMBER",
            Opcode::Twist => "TWIST",
            Opcode::Flash => "FLASH",
            Opcode::Drift => "DRIFT",
            Opcode::GlintZero => "GLINT.ZERO",
            Opcode::GlintPos => "GLINT.POS",
            Opcode::Quiet => "QUIET",
        }
    }

    /// The operand shape each opcode requires, one kind per slot.
    pub fn operand_kinds(&self) -> &'static [OperandKind] {
        match self {
            Opcode::Sip | Opcode::Quiet => &[],
            Opcode::Ember | Opcode::Twist => &[OperandKind::Int],
            Opcode::Flash => &[OperandKind::Str],
            Opcode::Drift | Opcode::GlintZero | Opcode::GlintPos => &[OperandKind::Label],
        }
    }
}

/// A validated operand value as it appears before linking.
#[derive(Debug, PartialEq, Clone)]
pub enum Operand {
    Int(i32),
    Str(String),
    Label(String),
}

/// A single validated source instruction together with the labels declared
/// in front of it and its original 1-based source line.
#[derive(Debug, PartialEq, Clone)]
pub struct Instruction {
    pub(crate) opcode: Opcode,
    pub(crate) operands: Vec<Operand>,
    pub(crate) labels: Vec<String>,
    pub(crate) line: usize,
}

enum SourceBuf {
    Mapped(Mmap),
    Owned(String),
}

/// The component responsible for reading and parsing the source text.
pub struct Parser {
    source: SourceBuf,
}

impl Parser {
    /// Memory maps the source file at `file_name` for parsing.
    pub fn from_file(file_name: &str) -> Result<Parser, ParseError> {
        let file = match File::open(file_name) {
            Ok(content) => content,
            Err(err) => return ParseErrorKind::FileOpenError(Box::new(err)).throw(),
        };
        let source = unsafe {
            match Mmap::map(&file) {
                Ok(content) => content,
                Err(err) => return ParseErrorKind::MemoryMapError(Box::new(err)).throw(),
            }
        };

        Ok(Parser {
            source: SourceBuf::Mapped(source),
        })
    }

    /// Wraps already-loaded source text for parsing.
    pub fn new(source: &str) -> Parser {
        Parser {
            source: SourceBuf::Owned(source.to_string()),
        }
    }

    /// Parses the whole source into an ordered instruction sequence,
    /// aborting on the first defect encountered.
    pub fn parse(&self) -> Result<Vec<Instruction>, ParseError> {
        let text = match &self.source {
            SourceBuf::Mapped(map) => match std::str::from_utf8(&map[..]) {
                Ok(content) => content,
                Err(err) => return ParseErrorKind::SourceNotUtf8(err).throw(),
            },
            SourceBuf::Owned(text) => text.as_str(),
        };

        let mut instructions = vec![];
        let mut pending_labels: Vec<(String, usize)> = vec![];
        let mut defined_labels: HashMap<String, usize> = HashMap::new();

        for (index, raw_line) in text.lines().enumerate() {
            let line_no = index + 1;
            let cleaned = strip_comments(raw_line).trim();
            if cleaned.is_empty() {
                continue;
            }

            let tokens = tokenize(cleaned, line_no)?;
            let mut rest = &tokens[..];

            while let Some(token) = rest.first() {
                if token.quoted || !token.text.ends_with(':') {
                    break;
                }
                let name = &token.text[..token.text.len() - 1];
                if !is_label_name(name) {
                    return ParseErrorKind::InvalidLabel(line_no, name.to_string()).throw();
                }
                if let Some(&first_line) = defined_labels.get(name) {
                    return ParseErrorKind::LabelRedefined(line_no, first_line, name.to_string())
                        .throw();
                }
                defined_labels.insert(name.to_string(), line_no);
                pending_labels.push((name.to_string(), line_no));
                rest = &rest[1..];
            }

            if rest.is_empty() {
                continue;
            }

            let opcode_token = &rest[0];
            let opcode = if opcode_token.quoted {
                None
            } else {
                Opcode::from_mnemonic(&opcode_token.text)
            };
            let opcode = match opcode {
                Some(content) => content,
                None => {
                    return ParseErrorKind::UnknownOpcode(line_no, opcode_token.text.clone())
                        .throw()
                }
            };

            let kinds = opcode.operand_kinds();
            let operand_tokens = &rest[1..];
            if operand_tokens.len() != kinds.len() {
                return ParseErrorKind::OperandCount(
                    line_no,
                    opcode.mnemonic(),
                    kinds.len(),
                    operand_tokens.len(),
                )
                .throw();
            }

            let mut operands = Vec::with_capacity(kinds.len());
            for (token, kind) in operand_tokens.iter().zip(kinds) {
                operands.push(parse_operand(token, *kind, opcode, line_no)?);
            }

            let labels = pending_labels.drain(..).map(|(name, _)| name).collect();
            instructions.push(Instruction {
                opcode,
                operands,
                labels,
                line: line_no,
            });
        }

        if let Some((name, line)) = pending_labels.first() {
            return ParseErrorKind::DanglingLabel(*line, name.clone()).throw();
        }

        Ok(instructions)
    }
}

/// Removes everything from an unquoted comment marker to the end of the
/// line. Markers inside a double-quoted span are left alone.
fn strip_comments(line: &str) -> &str {
    let mut in_quotes = false;
    for (idx, character) in line.char_indices() {
        if character == '"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        for marker in COMMENT_MARKERS {
            if line[idx..].starts_with(marker) {
                return &line[..idx];
            }
        }
    }
    line
}

struct Token {
    text: String,
    quoted: bool,
}

/// Splits a cleaned line into whitespace-separated tokens, keeping a
/// double-quoted span together as one token and remembering it was quoted.
fn tokenize(line: &str, line_no: usize) -> Result<Vec<Token>, ParseError> {
    let mut tokens = vec![];
    let mut text = String::new();
    let mut in_token = false;
    let mut quoted = false;

    let mut characters = line.chars();
    while let Some(character) = characters.next() {
        match character {
            '"' => {
                in_token = true;
                quoted = true;
                loop {
                    match characters.next() {
                        Some('"') => break,
                        Some(inner) => text.push(inner),
                        None => return ParseErrorKind::UnterminatedString(line_no).throw(),
                    }
                }
            }
            character if character.is_whitespace() => {
                if in_token {
                    tokens.push(Token {
                        text: std::mem::take(&mut text),
                        quoted,
                    });
                    in_token = false;
                    quoted = false;
                }
            }
            character => {
                in_token = true;
                text.push(character);
            }
        }
    }
    if in_token {
        tokens.push(Token { text, quoted });
    }

    Ok(tokens)
}

fn is_label_name(name: &str) -> bool {
    let mut characters = name.chars();
    match characters.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    characters.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn parse_operand(
    token: &Token,
    kind: OperandKind,
    opcode: Opcode,
    line_no: usize,
) -> Result<Operand, ParseError> {
    match kind {
        OperandKind::Int => {
            if token.quoted {
                return ParseErrorKind::UnexpectedString(line_no, opcode.mnemonic(), "an int")
                    .throw();
            }
            match token.text.parse::<i32>() {
                Ok(value) => Ok(Operand::Int(value)),
                Err(_) => ParseErrorKind::InvalidInteger(line_no, token.text.clone()).throw(),
            }
        }
        OperandKind::Label => {
            if token.quoted {
                return ParseErrorKind::UnexpectedString(line_no, opcode.mnemonic(), "a label")
                    .throw();
            }
            if !is_label_name(&token.text) {
                return ParseErrorKind::InvalidLabel(line_no, token.text.clone()).throw();
            }
            Ok(Operand::Label(token.text.clone()))
        }
        OperandKind::Str => {
            if !token.quoted {
                return ParseErrorKind::ExpectedString(
                    line_no,
                    opcode.mnemonic(),
                    token.text.clone(),
                )
                .throw();
            }
            if token.text.is_empty() {
                return ParseErrorKind::EmptyString(line_no).throw();
            }
            Ok(Operand::Str(token.text.clone()))
        }
    }
}
