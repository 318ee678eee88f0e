//! Line-oriented lexer for annotated SQL using nom.
//!
//! [`lex`] splits text into one [`Token`] per physical line. The sub-lexers
//! decompose a single token further and return `None` when the line does not
//! have the expected shape, which callers treat as "not this directive".
//!
//! ```text
//! --  :name get_user :one
//! ─┬─ ──┬── ───┬──── ──┬─
//!  │    │      │       └── keyword (inline result)
//!  │    │      └── name
//!  │    └── keyword
//!  └── lead (two or more dashes)
//! ```
//!
//! Positions are re-derived from the width of each consumed prefix, never by
//! re-scanning the text.

use nom::{
    bytes::complete::{take_till1, take_while_m_n},
    character::complete::{char, multispace0},
    combinator::{opt, recognize, rest},
    sequence::{pair, tuple},
    IResult,
};

use crate::position::SourcePosition;

/// What a token holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// A whole line starting with `--`.
    Comment,
    /// Any other whole line, including blank ones.
    QueryLine,
    /// A `:keyword` inside a comment line.
    Keyword,
    /// A statement name on a `:name` line.
    Name,
    /// Whatever follows the last recognized field.
    Remainder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub tag: Tag,
    pub value: String,
    pub position: SourcePosition,
}

impl Token {
    pub fn new(tag: Tag, value: impl Into<String>, position: SourcePosition) -> Self {
        Self {
            tag,
            value: value.into(),
            position,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// `-- :keyword rest`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentParts {
    pub keyword: Token,
    pub rest: Token,
}

/// `name [:keyword] [rest]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts {
    pub name: Token,
    pub keyword: Option<Token>,
    pub rest: Token,
}

/// `:keyword [rest]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultParts {
    pub keyword: Token,
    pub rest: Token,
}

/// Lex `text` into one token per line, starting from `start`.
pub fn lex(text: &str, start: &SourcePosition) -> Vec<Token> {
    let mut position = start.clone();
    text.lines()
        .map(|line| {
            position = position.advance_lines(1);
            categorize(line, &position)
        })
        .collect()
}

fn categorize(line: &str, position: &SourcePosition) -> Token {
    let (position, value) = skip_leading_whitespace(line, position);
    let value = value.trim_end();

    let tag = if value.starts_with("--") {
        Tag::Comment
    } else {
        Tag::QueryLine
    };
    Token::new(tag, value, position)
}

/// Decompose a comment line into its `:keyword` and the remainder.
pub fn lex_comment(token: &Token) -> Option<CommentParts> {
    let (_, (lead, keyword, ws, remainder)) = comment_directive(&token.value).ok()?;

    let keyword_at = width(lead);
    let rest_at = keyword_at + width(keyword) + width(ws);

    Some(CommentParts {
        keyword: Token::new(Tag::Keyword, keyword, token.position.advance_cols(keyword_at)),
        rest: Token::new(Tag::Remainder, remainder, token.position.advance_cols(rest_at)),
    })
}

/// Decompose the remainder of a `:name` line into name, optional keyword and
/// trailing input. `None` for an empty or whitespace-only line.
pub fn lex_name(token: &Token) -> Option<NameParts> {
    let (position, line) = skip_leading_whitespace(&token.value, &token.position);
    let (_, (name, ws, keyword, ws2, remainder)) = name_line(line.trim_end()).ok()?;

    let keyword_at = width(name) + width(ws);
    let rest_at = keyword_at + keyword.map_or(0, width) + width(ws2);

    Some(NameParts {
        name: Token::new(Tag::Name, name, position.clone()),
        keyword: keyword
            .map(|kw| Token::new(Tag::Keyword, kw, position.advance_cols(keyword_at))),
        rest: Token::new(Tag::Remainder, remainder, position.advance_cols(rest_at)),
    })
}

/// Decompose a result declaration into its `:keyword` and anything after it.
/// `None` unless the (trimmed) line begins with `:`.
///
/// The remainder is positioned directly after the keyword.
pub fn lex_result(token: &Token) -> Option<ResultParts> {
    let (position, line) = skip_leading_whitespace(&token.value, &token.position);
    let (remainder, kw) = keyword(line).ok()?;

    Some(ResultParts {
        keyword: Token::new(Tag::Keyword, kw, position.clone()),
        rest: Token::new(
            Tag::Remainder,
            remainder.trim(),
            position.advance_cols(width(kw)),
        ),
    })
}

fn comment_directive(input: &str) -> IResult<&str, (&str, &str, &str, &str)> {
    tuple((dash_lead, keyword, multispace0, rest))(input)
}

fn name_line(input: &str) -> IResult<&str, (&str, &str, Option<&str>, &str, &str)> {
    tuple((
        take_till1(char::is_whitespace),
        multispace0,
        opt(keyword),
        multispace0,
        rest,
    ))(input)
}

/// Two or more dashes plus any whitespace after them.
fn dash_lead(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while_m_n(2, usize::MAX, |c| c == '-'),
        multispace0,
    ))(input)
}

/// `:` followed by at least one non-whitespace character.
fn keyword(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(':'), take_till1(char::is_whitespace)))(input)
}

fn skip_leading_whitespace<'a>(
    text: &'a str,
    position: &SourcePosition,
) -> (SourcePosition, &'a str) {
    let trimmed = text.trim_start();
    let skipped = width(text) - width(trimmed);
    (position.advance_cols(skipped), trimmed)
}

/// Width in characters, matching how columns are counted.
fn width(s: &str) -> usize {
    s.chars().count()
}
