//! Annotation parser.
//!
//! Reads the leading comment block of one annotated unit, interprets its
//! `:name` and `:result` directives, and builds a [`Statement`].
//!
//! # Syntax Overview
//!
//! ```text
//! -- :name find_users :many        <- name line, optional inline result
//! -- :result :many                 <- or a separate result line
//! -- Users matching any name.      <- kept as commentary
//! select * from users where username in :names
//! ```
//!
//! Result keywords: `:one`/`:1`, `:many`/`:*`, `:affected`/`:n`, `:insert`,
//! `:scalar`, `:raw` (the default).

use std::path::PathBuf;

use crate::error::{ParserError, Result};
use crate::lexer::{self, Tag, Token};
use crate::position::SourcePosition;
use crate::result::ResultKind;
use crate::statement::{is_legal_name, Statement};

/// Parser settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Prefix the SQL with a comment naming the statement and its source.
    pub header: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { header: true }
    }
}

/// Parse one annotated unit.
///
/// `context` is where the text starts; `None` means a literal string.
pub fn parse(text: &str, context: Option<&SourcePosition>) -> Result<Statement> {
    parse_with(text, context, &ParseOptions::default())
}

/// Parse one annotated unit with explicit options.
pub fn parse_with(
    text: &str,
    context: Option<&SourcePosition>,
    options: &ParseOptions,
) -> Result<Statement> {
    let start = context.cloned().unwrap_or_else(SourcePosition::literal);

    let tokens = lexer::lex(text, &start);
    let split = tokens.iter().take_while(|t| is_annotation(t)).count();
    let (annotation, body) = tokens.split_at(split);

    let mut annotations = Annotations::default();
    for token in annotation {
        annotations.consume(token)?;
    }

    let name = annotations.name.unwrap_or_default();
    let doc = doc_text(&annotations.unconsumed);

    let mut lines = Vec::with_capacity(1 + annotations.unconsumed.len() + body.len());
    if options.header {
        lines.push(header(&name, &start));
    }
    lines.extend(annotations.unconsumed);
    lines.extend(body.iter().map(|t| t.value.clone()));

    let filename = (!start.is_literal()).then(|| PathBuf::from(start.source()));

    Statement::new(name, lines.join("\n"), doc, annotations.result, filename)
}

/// Comment lines and blank lines belong to the leading annotation block.
fn is_annotation(token: &Token) -> bool {
    token.tag == Tag::Comment || token.value.trim().is_empty()
}

fn header(name: &str, start: &SourcePosition) -> String {
    let file = if start.is_literal() {
        start.source().to_string()
    } else {
        format!("\"{}\"", start.source())
    };
    format!(
        "-- sqlfn statement {} in file {} at line {}",
        name,
        file,
        start.line + 1
    )
}

/// Commentary lines with their dashes removed, or `None` if there is none.
fn doc_text(unconsumed: &[String]) -> Option<String> {
    let text = unconsumed
        .iter()
        .map(|line| line.trim_start_matches('-').trim())
        .collect::<Vec<_>>()
        .join("\n");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[derive(Debug, Default)]
struct Annotations {
    name: Option<String>,
    result: ResultKind,
    unconsumed: Vec<String>,
}

impl Annotations {
    fn consume(&mut self, token: &Token) -> std::result::Result<(), ParserError> {
        let Some(parts) = lexer::lex_comment(token) else {
            self.unconsumed.push(token.value.clone());
            return Ok(());
        };

        match parts.keyword.value.as_str() {
            ":name" => self.consume_name(&parts.rest),
            ":result" => self.consume_result(&parts.rest),
            _ => {
                self.unconsumed.push(token.value.clone());
                Ok(())
            }
        }
    }

    fn consume_name(&mut self, rest: &Token) -> std::result::Result<(), ParserError> {
        let parts = lexer::lex_name(rest)
            .ok_or_else(|| ParserError::new("expected a query name.", &rest.position))?;

        if !is_legal_name(&parts.name.value) {
            return Err(ParserError::new(
                format!("'{}' is not a legal function name.", parts.name.value),
                &parts.name.position,
            ));
        }
        self.name = Some(parts.name.value);

        match parts.keyword {
            None if !parts.rest.is_empty() => Err(ParserError::new(
                "encountered unexpected input after query name.",
                &parts.rest.position,
            )),
            None => Ok(()),
            Some(_) if !parts.rest.is_empty() => Err(ParserError::new(
                "encountered unexpected input after result type.",
                &parts.rest.position,
            )),
            Some(keyword) => self.set_result(&keyword),
        }
    }

    fn consume_result(&mut self, rest: &Token) -> std::result::Result<(), ParserError> {
        if rest.is_empty() {
            return Err(ParserError::new("expected keyword", &rest.position));
        }
        self.set_result(rest)
    }

    fn set_result(&mut self, token: &Token) -> std::result::Result<(), ParserError> {
        let parts = lexer::lex_result(token)
            .ok_or_else(|| ParserError::new("expected keyword", &token.position))?;

        if !parts.rest.is_empty() {
            return Err(ParserError::new(
                "encountered unexpected input after result type",
                &parts.rest.position,
            ));
        }

        let keyword = &parts.keyword;
        self.result = ResultKind::from_keyword(&keyword.value).ok_or_else(|| {
            ParserError::new(
                format!("unrecognized keyword '{}'", keyword.value),
                &keyword.position,
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    fn literal(text: &str) -> Statement {
        parse(text, None).unwrap()
    }

    fn bare(text: &str) -> Statement {
        parse_with(text, None, &ParseOptions { header: false }).unwrap()
    }

    fn parse_error(text: &str) -> String {
        match parse(text, None) {
            Err(Error::Parse(err)) => err.to_string(),
            other => panic!("expected a parser error, got {:?}", other),
        }
    }

    // ====================================================================
    // Basics
    // ====================================================================

    #[test]
    fn test_get_user() {
        let s = bare("-- :name get_user :1\nselect * from users where id = :id");
        assert_eq!(s.name(), "get_user");
        assert_eq!(s.result(), ResultKind::Row);
        assert_eq!(s.sql(), "select * from users where id = :id");
        assert_eq!(s.filename(), None);
    }

    #[test]
    fn test_header_comment() {
        assert_eq!(
            literal("-- :name username_for_id :1\nselect username from users where user_id = :user_id").sql(),
            "-- sqlfn statement username_for_id in file <literal> at line 1\n\
             select username from users where user_id = :user_id"
        );
    }

    #[test]
    fn test_header_names_file_and_line() {
        let start = SourcePosition::at("sql/users.sql", 7, 1);
        let s = parse("-- :name multiline_syntax :many\nselect * from foo where bar = :bar;", Some(&start)).unwrap();
        assert_eq!(
            s.sql(),
            "-- sqlfn statement multiline_syntax in file \"sql/users.sql\" at line 8\n\
             select * from foo where bar = :bar;"
        );
        assert_eq!(s.filename(), Some(std::path::Path::new("sql/users.sql")));
    }

    #[test]
    fn test_extra_comments_are_kept() {
        let s = literal("-- :name foobar\n-- some extra commentary\nselect * from foo where bar = :bar");
        assert_eq!(
            s.sql(),
            "-- sqlfn statement foobar in file <literal> at line 1\n\
             -- some extra commentary\n\
             select * from foo where bar = :bar"
        );
        assert_eq!(s.doc(), Some("some extra commentary"));
    }

    #[test]
    fn test_no_doc_without_commentary() {
        assert_eq!(literal("-- :name foo\nselect 1").doc(), None);
    }

    #[test]
    fn test_segments_are_preserved_in_order() {
        let s = bare(
            "-- first note\n\
             -- :name ordered :many\n\
             -- :other directive\n\
             -- second note\n\
             select a\n\
             -- body comment\n\
             from t",
        );
        assert_eq!(
            s.sql(),
            "-- first note\n-- :other directive\n-- second note\nselect a\n-- body comment\nfrom t"
        );
        assert_eq!(s.result(), ResultKind::Rows);
    }

    #[test]
    fn test_multiline_body_and_blank_lines() {
        let s = bare("-- :name has_commentary_whitespace\n\n-- :result :scalar\n\nselect 1\n\nfrom dual");
        assert_eq!(s.name(), "has_commentary_whitespace");
        assert_eq!(s.result(), ResultKind::Scalar);
        assert_eq!(s.sql(), "select 1\n\nfrom dual");
    }

    #[test]
    fn test_missing_name_fails_construction() {
        match parse("-- just a comment\nselect 1", None) {
            Err(Error::InvalidStatement(msg)) => assert_eq!(msg, "Statement must have a name."),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_body_fails_construction() {
        let result = parse_with("-- :name foo\n", None, &ParseOptions { header: false });
        assert!(matches!(result, Err(Error::InvalidStatement(_))));
    }

    // ====================================================================
    // Result keywords
    // ====================================================================

    #[test]
    fn test_inline_result_keywords() {
        let cases = [
            ("", ResultKind::Raw),
            (" :raw", ResultKind::Raw),
            (" :1", ResultKind::Row),
            (" :one", ResultKind::Row),
            (" :*", ResultKind::Rows),
            (" :many", ResultKind::Rows),
            (" :n", ResultKind::AffectedCount),
            (" :affected", ResultKind::AffectedCount),
            (" :insert", ResultKind::InsertedKey),
            (" :scalar", ResultKind::Scalar),
        ];
        for (suffix, kind) in cases {
            let s = literal(&format!("-- :name username_for_id{}\nselect 1", suffix));
            assert_eq!(s.result(), kind, "{:?}", suffix);
            assert_eq!(s.name(), "username_for_id");
        }
    }

    #[test]
    fn test_result_line_keywords() {
        for keyword in [":1", ":one", ":*", ":many", ":n", ":affected", ":insert", ":scalar", ":raw"] {
            let s = literal(&format!("-- :name foo\n-- :result {}\nselect 1", keyword));
            assert_eq!(Some(s.result()), ResultKind::from_keyword(keyword));
        }
    }

    #[test]
    fn test_result_line_whitespace() {
        for text in [
            "-- :name foo\n--   :result :1\nselect 1",
            "-- :name foo\n--   :result :1   \nselect 1",
            "-- :name foo\n--   :result     :1   \nselect 1",
            "  -- :name foo\n\t-- :result :1\nselect 1",
        ] {
            assert_eq!(literal(text).result(), ResultKind::Row, "{:?}", text);
        }
    }

    #[test]
    fn test_many_dashes() {
        let s = literal("---- :name foo :many\nselect 1");
        assert_eq!(s.result(), ResultKind::Rows);
    }

    // ====================================================================
    // Errors
    // ====================================================================

    #[test]
    fn test_no_name() {
        assert_eq!(
            parse_error("-- :name \nselect 1;"),
            "Error in <literal>:1:9 - expected a query name."
        );
    }

    #[test]
    fn test_name_only_extra() {
        assert_eq!(
            parse_error("-- :name foo and some other stuff\nselect 1"),
            "Error in <literal>:1:14 - encountered unexpected input after query name."
        );
    }

    #[test]
    fn test_extra_after_result_nameline() {
        assert_eq!(
            parse_error("-- :name foo :affected things\nselect 1"),
            "Error in <literal>:1:24 - encountered unexpected input after result type."
        );
    }

    #[test]
    fn test_unrecognized_keyword_nameline() {
        assert_eq!(
            parse_error("-- :name foo :wrong\nselect 1"),
            "Error in <literal>:1:14 - unrecognized keyword ':wrong'"
        );
    }

    #[test]
    fn test_unrecognized_keyword_resultline() {
        assert_eq!(
            parse_error("-- :name foo\n-- :result :nope\nselect 1"),
            "Error in <literal>:2:12 - unrecognized keyword ':nope'"
        );
    }

    #[test]
    fn test_missing_result_type_result_line() {
        assert_eq!(
            parse_error("-- :name foo\n-- :result \nselect 1"),
            "Error in <literal>:2:11 - expected keyword"
        );
    }

    #[test]
    fn test_result_type_not_keyword_result_line() {
        assert_eq!(
            parse_error("-- :name foo\n-- :result raw\nselect 1"),
            "Error in <literal>:2:12 - expected keyword"
        );
    }

    #[test]
    fn test_extra_after_result_result_line() {
        assert_eq!(
            parse_error("-- :name foo\n-- :result :raw thing\nselect 1"),
            "Error in <literal>:2:16 - encountered unexpected input after result type"
        );
    }

    #[test]
    fn test_error_reports_file() {
        let start = SourcePosition::at("sql/bad.sql", 4, 1);
        match parse("-- :name foo :wrong\nselect 1", Some(&start)) {
            Err(Error::Parse(err)) => {
                assert_eq!(err.position.line, 5);
                assert_eq!(err.to_string(), "Error in sql/bad.sql:5:14 - unrecognized keyword ':wrong'");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_column_accounts_for_indent() {
        assert_eq!(
            parse_error("   -- :name foo :wrong\nselect 1"),
            "Error in <literal>:1:17 - unrecognized keyword ':wrong'"
        );
    }

    // ====================================================================
    // Names
    // ====================================================================

    fn illegal(name: &str) -> String {
        format!("Error in <literal>:1:10 - '{}' is not a legal function name.", name)
    }

    #[test]
    fn test_illegal_names() {
        for name in ["foo#", "9foo", "foo-bar", "x"] {
            assert_eq!(
                parse_error(&format!("-- :name {}\nselect 1", name)),
                illegal(name)
            );
        }
    }

    #[test]
    fn test_legal_names() {
        for name in ["foo1", "foo_bar", "_foo_bar", "_FOO_BAR"] {
            assert_eq!(literal(&format!("-- :name {}\nselect 1", name)).name(), name);
        }
    }

    #[test]
    fn test_name_matches_lexed_name() {
        let line = "-- :name  spaced_out   :many";
        let token = &lexer::lex(line, &SourcePosition::literal())[0];
        let rest = lexer::lex_comment(token).unwrap().rest;
        let lexed = lexer::lex_name(&rest).unwrap().name.value;
        assert_eq!(literal(&format!("{}\nselect 1", line)).name(), lexed);
    }
}
