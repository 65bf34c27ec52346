use std::fmt;
use std::ops::Range;
use regex::Regex;
use once_cell::sync::Lazy;
use log::{warn, debug};

use crate::errors::MarkupError;

// @module: Markup validation, repair and document model

// @const: Tag token regex (opening, closing and self-closing tags)
static TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"</?[A-Za-z][A-Za-z0-9_-]*(?:\s[^<>]*)?/?>").unwrap()
});

// @const: XML comment regex
static COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<!--.*?-->").unwrap()
});

// @const: Entity body regex, anchored after an ampersand
static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:amp|lt|gt|apos|quot|#[0-9]+|#x[0-9a-fA-F]+);").unwrap()
});

// @const: Full entity regex for decoding text content
static ENTITY_DECODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(amp|lt|gt|apos|quot|#[0-9]+|#x[0-9a-fA-F]+);").unwrap()
});

// @const: Control characters XML 1.0 forbids
static CONTROL_CHAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]").unwrap()
});

// @const: Blank-line paragraph separator for bare text input
static BLANK_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\n\s*\n").unwrap()
});

// @const: Sentence boundary for bare text input (terminal punctuation + space)
static SENTENCE_END_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[.!?]+["')\]]*\s+"#).unwrap()
});

/// Tags the synthesis service accepts; everything else is stripped during repair
const SUPPORTED_TAGS: &[&str] = &[
    "speak", "p", "s", "break", "emphasis", "prosody", "say-as", "sub",
    "phoneme", "mark",
];

/// Void elements that never carry content
const VOID_TAGS: &[&str] = &["break", "mark"];

/// Upper bound on repair actions before the input is declared unrepairable
const MAX_REPAIR_ACTIONS: usize = 256;

/// A repair applied to the input markup before parsing.
///
/// Repairs are surfaced to the caller verbatim; a repaired document is never
/// passed off as pristine input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairAction {
    /// Bare `&` characters were escaped to `&amp;`
    EscapedAmpersands { count: usize },
    /// Stray `<` / `>` in text content were escaped
    EscapedAngleBrackets { count: usize },
    /// An unsupported tag was removed, keeping its text content
    StrippedUnsupportedTag { name: String },
    /// An unterminated tag was auto-closed
    ClosedUnterminatedTag { name: String },
    /// A closing tag with no matching opening tag was dropped
    RemovedStrayClosingTag { name: String },
    /// XML-invalid control characters were removed
    RemovedControlCharacters { count: usize },
    /// Content outside paragraph structure was wrapped into paragraphs
    WrappedBareText,
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EscapedAmpersands { count } => {
                write!(f, "escaped {} bare ampersand(s)", count)
            }
            Self::EscapedAngleBrackets { count } => {
                write!(f, "escaped {} stray angle bracket(s)", count)
            }
            Self::StrippedUnsupportedTag { name } => {
                write!(f, "stripped unsupported tag <{}>", name)
            }
            Self::ClosedUnterminatedTag { name } => {
                write!(f, "auto-closed unterminated tag <{}>", name)
            }
            Self::RemovedStrayClosingTag { name } => {
                write!(f, "removed stray closing tag </{}>", name)
            }
            Self::RemovedControlCharacters { count } => {
                write!(f, "removed {} control character(s)", count)
            }
            Self::WrappedBareText => {
                write!(f, "wrapped bare text in paragraph structure")
            }
        }
    }
}

/// A section header detected in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Spoken title of the section
    pub title: String,
    /// Narration-text offset of the header's first character
    pub text_offset: usize,
}

/// A sentence-equivalent unit inside a block, the finest split boundary
#[derive(Debug, Clone)]
pub struct Sentence {
    /// Serialized markup of this sentence
    pub markup: String,
    /// Narration-text range covered by this sentence
    pub text_range: Range<usize>,
}

/// A top-level structural unit: one paragraph plus any header/break material
/// that immediately precedes it.
///
/// Gluing a header to its following paragraph is what guarantees a chunk
/// split can never land between a header marker and its first sentence.
#[derive(Debug, Clone)]
pub struct Block {
    /// Section header introducing this block, if any
    pub header: Option<Header>,
    /// Serialized markup preceding the paragraph (header, breaks)
    pub prefix_markup: String,
    /// Serialized markup of the paragraph itself
    pub body_markup: String,
    /// Sentence units for finer-grained splitting
    pub sentences: Vec<Sentence>,
    /// Narration-text range covered by the whole block, header included
    pub text_range: Range<usize>,
}

impl Block {
    /// Full serialized markup of the block
    pub fn markup(&self) -> String {
        match (self.prefix_markup.is_empty(), self.body_markup.is_empty()) {
            (true, _) => self.body_markup.clone(),
            (false, true) => self.prefix_markup.clone(),
            (false, false) => format!("{}\n{}", self.prefix_markup, self.body_markup),
        }
    }
}

/// A parsed, repaired markup document.
///
/// Immutable once constructed; the pipeline borrows it for the duration of a
/// job. All offsets are narration-text character positions (markup stripped),
/// not raw markup bytes.
#[derive(Debug, Clone)]
pub struct Document {
    blocks: Vec<Block>,
    text_len: usize,
}

impl Document {
    /// Parse raw markup into a document, applying bounded repair first.
    ///
    /// Returns the document together with the list of repairs taken; callers
    /// must surface that list. Fails with [`MarkupError::Malformed`] when the
    /// input needs more repair than the bounded budget allows.
    pub fn parse(raw: &str) -> Result<(Self, Vec<RepairAction>), MarkupError> {
        let mut actions = Vec::new();

        // Leading/embedded XML comments carry converter metadata, not speech
        let without_comments = COMMENT_REGEX.replace_all(raw, "");

        let (cleaned, removed_controls) = strip_control_characters(&without_comments);
        if removed_controls > 0 {
            actions.push(RepairAction::RemovedControlCharacters { count: removed_controls });
        }

        let (escaped, amp_count) = escape_bare_ampersands(&cleaned);
        if amp_count > 0 {
            actions.push(RepairAction::EscapedAmpersands { count: amp_count });
        }

        let (escaped, angle_count) = escape_stray_open_brackets(&escaped);

        let (tokens, text_angle_count) = tokenize(&escaped);
        let total_angles = angle_count + text_angle_count;
        if total_angles > 0 {
            actions.push(RepairAction::EscapedAngleBrackets { count: total_angles });
        }

        let tokens = strip_unsupported_tags(tokens, &mut actions);
        let tokens = balance_tags(tokens, &mut actions);

        if actions.len() > MAX_REPAIR_ACTIONS {
            return Err(MarkupError::Malformed {
                reason: format!(
                    "input required {} repairs, exceeding the repair budget of {}",
                    actions.len(),
                    MAX_REPAIR_ACTIONS
                ),
            });
        }

        let document = build_document(tokens, &mut actions)?;

        if !actions.is_empty() {
            warn!("Markup required {} repair action(s) before parsing", actions.len());
            for action in &actions {
                debug!("Repair: {}", action);
            }
        }

        Ok((document, actions))
    }

    /// Top-level structural units in document order
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Total narration-text length in characters
    pub fn text_len(&self) -> usize {
        self.text_len
    }

    /// Whether the document contains no speakable content
    pub fn is_empty(&self) -> bool {
        self.text_len == 0
    }

    /// Deterministic serialized form of the whole document.
    ///
    /// Re-parsing this output always succeeds with zero repair actions;
    /// repair is idempotent.
    pub fn serialize(&self) -> String {
        if self.blocks.is_empty() {
            return "<speak></speak>".to_string();
        }
        let body: Vec<String> = self.blocks.iter().map(|b| b.markup()).collect();
        format!("<speak>\n{}\n</speak>", body.join("\n"))
    }

    /// The spoken text of the document with all markup stripped
    pub fn narration_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            if let Some(header) = &block.header {
                out.push_str(&header.title);
            }
            for sentence in &block.sentences {
                out.push_str(&strip_tags(&sentence.markup));
            }
        }
        out
    }
}

/// Count the characters the synthesis service bills for: the tag-stripped
/// narration text, not the UTF-8 byte size of the markup.
pub fn billable_chars(markup: &str) -> u64 {
    strip_tags(markup).trim().chars().count() as u64
}

/// Remove all tags from a markup fragment, keeping decoded text content
pub fn strip_tags(markup: &str) -> String {
    let mut out = String::new();
    let mut last = 0;
    for m in TAG_REGEX.find_iter(markup) {
        out.push_str(&decode_entities(&markup[last..m.start()]));
        last = m.end();
    }
    out.push_str(&decode_entities(&markup[last..]));
    out
}

// ---------------------------------------------------------------------------
// Tokenization and repair passes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open { name: String, attrs: String },
    Close { name: String },
    SelfClose { name: String, attrs: String },
    /// Decoded text content; whitespace-only runs between tags are dropped
    Text(String),
}

impl Token {
    fn serialize(&self) -> String {
        match self {
            Token::Open { name, attrs } => format!("<{}{}>", name, attrs),
            Token::Close { name } => format!("</{}>", name),
            Token::SelfClose { name, attrs } => format!("<{}{}/>", name, attrs),
            Token::Text(text) => escape_text(text),
        }
    }

    fn text_len(&self) -> usize {
        match self {
            Token::Text(text) => text.chars().count(),
            _ => 0,
        }
    }
}

fn strip_control_characters(input: &str) -> (String, usize) {
    let count = CONTROL_CHAR_REGEX.find_iter(input).count();
    if count == 0 {
        return (input.to_string(), 0);
    }
    (CONTROL_CHAR_REGEX.replace_all(input, "").into_owned(), count)
}

/// Escape `&` characters that do not start a recognized entity
fn escape_bare_ampersands(input: &str) -> (String, usize) {
    let mut out = String::with_capacity(input.len());
    let mut count = 0;
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if ENTITY_REGEX.is_match(after) {
            out.push('&');
        } else {
            out.push_str("&amp;");
            count += 1;
        }
        rest = after;
    }
    out.push_str(rest);
    (out, count)
}

/// Escape `<` characters that cannot start a tag.
///
/// A `<` is kept only when followed by a tag-name start or `/` + tag-name
/// start; anything else is text content.
fn escape_stray_open_brackets(input: &str) -> (String, usize) {
    let mut out = String::with_capacity(input.len());
    let mut count = 0;
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '<' {
            let next = chars.get(i + 1).copied();
            let keeps = match next {
                Some(n) if n.is_ascii_alphabetic() => true,
                Some('/') => chars
                    .get(i + 2)
                    .is_some_and(|n| n.is_ascii_alphabetic()),
                _ => false,
            };
            if keeps {
                out.push('<');
            } else {
                out.push_str("&lt;");
                count += 1;
            }
        } else {
            out.push(c);
        }
        i += 1;
    }
    (out, count)
}

/// Split repaired input into tag and text tokens.
///
/// Returns the token stream plus the number of raw angle brackets found
/// inside text segments (these are escaped on re-serialization).
fn tokenize(input: &str) -> (Vec<Token>, usize) {
    let mut tokens = Vec::new();
    let mut stray_angles = 0;
    let mut last = 0;

    let mut push_text = |segment: &str, tokens: &mut Vec<Token>, stray: &mut usize| {
        if segment.trim().is_empty() {
            return;
        }
        *stray += segment.matches(['<', '>']).count();
        tokens.push(Token::Text(decode_entities(segment)));
    };

    for m in TAG_REGEX.find_iter(input) {
        push_text(&input[last..m.start()], &mut tokens, &mut stray_angles);
        tokens.push(parse_tag(m.as_str()));
        last = m.end();
    }
    push_text(&input[last..], &mut tokens, &mut stray_angles);

    (tokens, stray_angles)
}

fn parse_tag(raw: &str) -> Token {
    // Strip the surrounding < >
    let inner = &raw[1..raw.len() - 1];
    let closing = inner.starts_with('/');
    let inner = inner.trim_start_matches('/');
    let self_closing = inner.ends_with('/');
    let inner = inner.trim_end_matches('/').trim_end();

    let (name, attrs) = match inner.find(char::is_whitespace) {
        Some(pos) => (&inner[..pos], inner[pos..].trim()),
        None => (inner, ""),
    };
    let name = name.to_ascii_lowercase();
    let attrs = if attrs.is_empty() {
        String::new()
    } else {
        format!(" {}", attrs)
    };

    if closing {
        Token::Close { name }
    } else if self_closing || VOID_TAGS.contains(&name.as_str()) {
        // break/mark never carry content; normalize them to self-closing
        Token::SelfClose { name, attrs }
    } else {
        Token::Open { name, attrs }
    }
}

fn strip_unsupported_tags(tokens: Vec<Token>, actions: &mut Vec<RepairAction>) -> Vec<Token> {
    let mut stripped_names: Vec<String> = Vec::new();
    let mut out = Vec::with_capacity(tokens.len());

    for token in tokens {
        let name = match &token {
            Token::Open { name, .. } | Token::Close { name } | Token::SelfClose { name, .. } => {
                Some(name.clone())
            }
            Token::Text(_) => None,
        };
        match name {
            Some(name) if !SUPPORTED_TAGS.contains(&name.as_str()) => {
                if !stripped_names.contains(&name) {
                    actions.push(RepairAction::StrippedUnsupportedTag { name: name.clone() });
                    stripped_names.push(name);
                }
            }
            _ => out.push(token),
        }
    }
    out
}

/// Enforce well-formed nesting: drop stray closing tags and auto-close
/// anything left open.
fn balance_tags(tokens: Vec<Token>, actions: &mut Vec<RepairAction>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut stack: Vec<String> = Vec::new();

    for token in tokens {
        match token {
            Token::Open { name, attrs } => {
                stack.push(name.clone());
                out.push(Token::Open { name, attrs });
            }
            Token::Close { name } => {
                if stack.last() == Some(&name) {
                    stack.pop();
                    out.push(Token::Close { name });
                } else if stack.contains(&name) {
                    // Close intervening tags so nesting stays well-formed
                    while let Some(top) = stack.pop() {
                        if top == name {
                            out.push(Token::Close { name: top });
                            break;
                        }
                        actions.push(RepairAction::ClosedUnterminatedTag { name: top.clone() });
                        out.push(Token::Close { name: top });
                    }
                } else {
                    actions.push(RepairAction::RemovedStrayClosingTag { name });
                }
            }
            other => out.push(other),
        }
    }

    while let Some(top) = stack.pop() {
        actions.push(RepairAction::ClosedUnterminatedTag { name: top.clone() });
        out.push(Token::Close { name: top });
    }

    out
}

// ---------------------------------------------------------------------------
// Document structure
// ---------------------------------------------------------------------------

fn build_document(
    tokens: Vec<Token>,
    actions: &mut Vec<RepairAction>,
) -> Result<Document, MarkupError> {
    // Unwrap the <speak> root if present; otherwise the whole stream is body
    let inner = match tokens.first() {
        Some(Token::Open { name, .. }) if name == "speak" => {
            match find_matching_close(&tokens, 0) {
                Some(end) if end == tokens.len() - 1 => tokens[1..end].to_vec(),
                // Content after </speak> is folded into the body
                Some(end) => {
                    let mut inner = tokens[1..end].to_vec();
                    inner.extend_from_slice(&tokens[end + 1..]);
                    inner
                }
                None => {
                    return Err(MarkupError::Malformed {
                        reason: "unclosed <speak> root survived repair".to_string(),
                    });
                }
            }
        }
        Some(_) => {
            record_once(actions, RepairAction::WrappedBareText);
            tokens
        }
        None => Vec::new(),
    };

    let mut builder = DocumentBuilder::default();
    let mut i = 0;
    while i < inner.len() {
        match &inner[i] {
            Token::Text(text) => {
                record_once(actions, RepairAction::WrappedBareText);
                let text = text.clone();
                builder.push_plain_text(&text);
                i += 1;
            }
            Token::SelfClose { .. } => {
                builder.push_prefix(inner[i].serialize());
                i += 1;
            }
            Token::Open { name, .. } if name == "prosody" => {
                let end = find_matching_close(&inner, i).unwrap_or(inner.len() - 1);
                builder.push_header(&inner[i..=end]);
                i = end + 1;
            }
            Token::Open { name, .. } if name == "p" => {
                let end = find_matching_close(&inner, i).unwrap_or(inner.len() - 1);
                builder.push_paragraph(&inner[i..=end]);
                i = end + 1;
            }
            Token::Open { name, .. } if name == "s" => {
                record_once(actions, RepairAction::WrappedBareText);
                let end = find_matching_close(&inner, i).unwrap_or(inner.len() - 1);
                builder.push_loose_sentence(&inner[i..=end]);
                i = end + 1;
            }
            Token::Open { .. } => {
                // Inline element at top level: absorb it and everything up to
                // the next structural boundary as one loose run
                record_once(actions, RepairAction::WrappedBareText);
                let end = find_run_end(&inner, i);
                builder.push_loose_sentence(&inner[i..end]);
                i = end;
            }
            Token::Close { .. } => {
                // Balanced stream cannot produce a top-level close; skip
                i += 1;
            }
        }
    }

    Ok(builder.finish())
}

fn record_once(actions: &mut Vec<RepairAction>, action: RepairAction) {
    if !actions.contains(&action) {
        actions.push(action);
    }
}

/// Index of the Close token matching the Open at `start`
fn find_matching_close(tokens: &[Token], start: usize) -> Option<usize> {
    let name = match &tokens[start] {
        Token::Open { name, .. } => name.clone(),
        _ => return None,
    };
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(start) {
        match token {
            Token::Open { name: n, .. } if *n == name => depth += 1,
            Token::Close { name: n } if *n == name => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// End (exclusive) of a loose inline run starting at `start`
fn find_run_end(tokens: &[Token], start: usize) -> usize {
    let mut i = start;
    let mut depth = 0usize;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Open { name, .. } if depth == 0 && (name == "p" || name == "s" || name == "prosody") => {
                break;
            }
            Token::Open { .. } => depth += 1,
            Token::Close { .. } => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    i.max(start + 1)
}

#[derive(Default)]
struct DocumentBuilder {
    blocks: Vec<Block>,
    offset: usize,
    pending_header: Option<Header>,
    pending_prefix: Vec<String>,
    pending_start: Option<usize>,
}

impl DocumentBuilder {
    fn block_start(&mut self) -> usize {
        *self.pending_start.get_or_insert(self.offset)
    }

    fn push_prefix(&mut self, markup: String) {
        self.block_start();
        self.pending_prefix.push(markup);
    }

    fn push_header(&mut self, segment: &[Token]) {
        // A second header before any paragraph closes the previous section
        // as a header-only block
        if self.pending_header.is_some() {
            self.flush_headerless_body(Vec::new());
        }
        let start = self.block_start();
        let title: String = segment
            .iter()
            .filter_map(|t| match t {
                Token::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        self.pending_header = Some(Header {
            title: title.trim().to_string(),
            text_offset: start,
        });
        self.offset += segment.iter().map(Token::text_len).sum::<usize>();
        let markup: String = segment.iter().map(Token::serialize).collect();
        self.pending_prefix.push(markup);
    }

    fn push_paragraph(&mut self, segment: &[Token]) {
        let start = self.block_start();
        let p_open = segment[0].serialize();
        let inner = &segment[1..segment.len() - 1];
        let sentences = self.parse_sentences(inner);
        let body = format!(
            "{}{}</p>",
            p_open,
            sentences.iter().map(|s| s.markup.as_str()).collect::<String>()
        );
        self.finish_block(start, body, sentences);
    }

    fn push_loose_sentence(&mut self, segment: &[Token]) {
        let start = self.block_start();
        let text_start = self.offset;
        self.offset += segment.iter().map(Token::text_len).sum::<usize>();
        let raw: String = segment.iter().map(Token::serialize).collect();
        let markup = if matches!(&segment[0], Token::Open { name, .. } if name == "s") {
            raw
        } else {
            format!("<s>{}</s>", raw)
        };
        let sentence = Sentence {
            markup,
            text_range: text_start..self.offset,
        };
        let body = format!("<p>{}</p>", sentence.markup);
        self.finish_block(start, body, vec![sentence]);
    }

    fn push_plain_text(&mut self, text: &str) {
        // Bare text becomes paragraph/sentence structure so the chunker has
        // real boundaries to work with
        let paragraphs: Vec<String> = BLANK_LINE_REGEX
            .split(text)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        for para in paragraphs {
            let start = self.block_start();
            let mut sentences = Vec::new();
            for piece in split_plain_sentences(&para) {
                let text_start = self.offset;
                self.offset += piece.chars().count();
                sentences.push(Sentence {
                    markup: format!("<s>{}</s>", escape_text(&piece)),
                    text_range: text_start..self.offset,
                });
            }
            let body = format!(
                "<p>{}</p>",
                sentences.iter().map(|s| s.markup.as_str()).collect::<String>()
            );
            self.finish_block(start, body, sentences);
        }
    }

    fn parse_sentences(&mut self, inner: &[Token]) -> Vec<Sentence> {
        let mut sentences = Vec::new();
        let mut i = 0;
        let mut run_start = None::<usize>;

        let mut flush_run = |from: usize, to: usize, builder: &mut Self, out: &mut Vec<Sentence>| {
            if from >= to {
                return;
            }
            let segment = &inner[from..to];
            let text_start = builder.offset;
            builder.offset += segment.iter().map(Token::text_len).sum::<usize>();
            out.push(Sentence {
                markup: segment.iter().map(Token::serialize).collect(),
                text_range: text_start..builder.offset,
            });
        };

        while i < inner.len() {
            match &inner[i] {
                Token::Open { name, .. } if name == "s" => {
                    if let Some(start) = run_start.take() {
                        flush_run(start, i, self, &mut sentences);
                    }
                    let end = inner_matching_close(inner, i);
                    let segment = &inner[i..=end];
                    let text_start = self.offset;
                    self.offset += segment.iter().map(Token::text_len).sum::<usize>();
                    sentences.push(Sentence {
                        markup: segment.iter().map(Token::serialize).collect(),
                        text_range: text_start..self.offset,
                    });
                    i = end + 1;
                }
                _ => {
                    run_start.get_or_insert(i);
                    // Skip over nested elements so an <s> inside an inline
                    // element does not split the run
                    if let Token::Open { .. } = &inner[i] {
                        i = inner_matching_close(inner, i) + 1;
                    } else {
                        i += 1;
                    }
                }
            }
        }
        if let Some(start) = run_start.take() {
            flush_run(start, inner.len(), self, &mut sentences);
        }
        sentences
    }

    fn finish_block(&mut self, start: usize, body: String, sentences: Vec<Sentence>) {
        self.blocks.push(Block {
            header: self.pending_header.take(),
            prefix_markup: self.pending_prefix.drain(..).collect::<Vec<_>>().join("\n"),
            body_markup: body,
            sentences,
            text_range: start..self.offset,
        });
        self.pending_start = None;
    }

    fn flush_headerless_body(&mut self, sentences: Vec<Sentence>) {
        let start = self.pending_start.take().unwrap_or(self.offset);
        self.blocks.push(Block {
            header: self.pending_header.take(),
            prefix_markup: self.pending_prefix.drain(..).collect::<Vec<_>>().join("\n"),
            body_markup: String::new(),
            sentences,
            text_range: start..self.offset,
        });
    }

    fn finish(mut self) -> Document {
        // Trailing header/break material with no paragraph still gets spoken
        if self.pending_header.is_some() || !self.pending_prefix.is_empty() {
            self.flush_headerless_body(Vec::new());
        }
        Document {
            text_len: self.offset,
            blocks: self.blocks,
        }
    }
}

/// Matching close index for an Open at `start`, clamped to the slice end
fn inner_matching_close(tokens: &[Token], start: usize) -> usize {
    find_matching_close(tokens, start).unwrap_or(tokens.len() - 1)
}

fn split_plain_sentences(paragraph: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in SENTENCE_END_REGEX.find_iter(paragraph) {
        let piece = paragraph[last..m.end()].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        last = m.end();
    }
    let tail = paragraph[last..].trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}

// ---------------------------------------------------------------------------
// Entity handling
// ---------------------------------------------------------------------------

/// Decode the XML entities the schema allows into plain characters
pub fn decode_entities(text: &str) -> String {
    ENTITY_DECODE_REGEX
        .replace_all(text, |caps: &regex::Captures| {
            match &caps[1] {
                "amp" => "&".to_string(),
                "lt" => "<".to_string(),
                "gt" => ">".to_string(),
                "apos" => "'".to_string(),
                "quot" => "\"".to_string(),
                numeric => {
                    let code = if let Some(hex) = numeric.strip_prefix("#x") {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        numeric.strip_prefix('#').and_then(|d| d.parse().ok())
                    };
                    code.and_then(char::from_u32)
                        .map(String::from)
                        .unwrap_or_default()
                }
            }
        })
        .into_owned()
}

/// Escape text content for serialization
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
