//! The tokenizer: query text to operator and value tokens.
//!
//! Operators are matched longest-first against a fixed table; everything
//! else is a value. Values use `\` escaping for operator characters,
//! whitespace, `"`, `#` and `\` itself, or can be written double-quoted
//! (inside quotes only `\"` and `\\` are escaped). Comments run from `#`
//! to end of line.
//!
//! After tokenizing, adjacent operator pairs `([ !)`, `(& !)`, `(| !)`
//! and `(^ !)` are fused into the single logical operators `[!`, `&!`,
//! `|!` and `^!`.
//!
//! Tokens carry byte offsets into the *canonical* one-line rendering of
//! the query (operators and re-escaped values joined by single spaces),
//! which is what error carets are drawn against.

use axial_common::utils::error::{Error, QueryError, QueryErrorKind, Result};
use regex::Regex;
use std::sync::LazyLock;

/// All operators, longest first so that greedy matching is unambiguous.
///
/// The fused forms (`[!`, `&!`, `|!`, `^!`) are listed too so they can be
/// written without a space.
pub const OPERATORS: &[&str] = &[
    "||", "??", "::", "=@", ">>", ">-", ">|", "-/", "|/", "@|", "@-", "[!", "&!", "|!", "^!",
    "<=", ">=", "!=", "!~", "?", "@", ".", ":", "%", "/", "*", "[", "]", "&", "|", "^", "<", "=",
    ">", "~", "!",
];

static OPERATOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = OPERATORS
        .iter()
        .map(|operator| regex::escape(operator))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("^(?:{alternation})")).expect("the operator table is a valid regex")
});

/// True for every character that appears in some operator.
#[must_use]
pub fn is_operator_char(character: char) -> bool {
    OPERATORS
        .iter()
        .any(|operator| operator.contains(character))
}

/// A single token of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Whether this is an operator (as opposed to a value).
    pub is_operator: bool,
    /// The operator text, or the decoded (unescaped) value.
    pub value: String,
    /// Byte offset of the token in the canonical one-line rendering.
    pub start: usize,
    /// Byte offset one past the token in the canonical rendering.
    pub end: usize,
}

/// Splits query text into tokens, fuses `!` pairs, and assigns canonical
/// offsets.
pub fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = scan(text)?;
    fuse_negations(&mut tokens);
    assign_canonical_offsets(&mut tokens);
    Ok(tokens)
}

/// The canonical one-line rendering of a token stream.
#[must_use]
pub fn canonical_text(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(printed)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Re-escapes a decoded value for canonical printing.
///
/// The empty value prints as `""`; any operator character, whitespace,
/// `"`, `#` or `\` is prefixed with `\`.
#[must_use]
pub fn escape_value(value: &str) -> String {
    if value.is_empty() {
        return "\"\"".to_string();
    }
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        if is_operator_char(character)
            || character.is_whitespace()
            || matches!(character, '\\' | '"' | '#')
        {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

fn printed(token: &Token) -> String {
    if token.is_operator {
        token.value.clone()
    } else {
        escape_value(&token.value)
    }
}

fn syntax_error(text: &str, offset: usize, message: &str) -> Error {
    Error::Query(
        QueryError::new(QueryErrorKind::Syntax, message.to_string()).with_location(
            text.replace('\n', " "),
            offset,
            offset + 1,
        ),
    )
}

fn scan(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let characters: Vec<(usize, char)> = text.char_indices().collect();
    let mut index = 0;
    while index < characters.len() {
        let (offset, character) = characters[index];
        if character.is_whitespace() {
            index += 1;
        } else if character == '#' {
            while index < characters.len() && characters[index].1 != '\n' {
                index += 1;
            }
        } else if character == '"' {
            let (value, next) = scan_quoted(text, &characters, index)?;
            tokens.push(Token {
                is_operator: false,
                value,
                start: 0,
                end: 0,
            });
            index = next;
        } else if is_operator_char(character) {
            let matched = OPERATOR_REGEX
                .find(&text[offset..])
                .ok_or_else(|| syntax_error(text, offset, "unknown operator"))?;
            tokens.push(Token {
                is_operator: true,
                value: matched.as_str().to_string(),
                start: 0,
                end: 0,
            });
            index += matched.as_str().chars().count();
        } else {
            let (value, next) = scan_bare(text, &characters, index)?;
            tokens.push(Token {
                is_operator: false,
                value,
                start: 0,
                end: 0,
            });
            index = next;
        }
    }
    Ok(tokens)
}

fn scan_quoted(text: &str, characters: &[(usize, char)], start: usize) -> Result<(String, usize)> {
    let mut value = String::new();
    let mut index = start + 1;
    while index < characters.len() {
        let (offset, character) = characters[index];
        match character {
            '"' => return Ok((value, index + 1)),
            '\\' => {
                let Some(&(_, escaped)) = characters.get(index + 1) else {
                    return Err(syntax_error(text, offset, "unterminated escape"));
                };
                value.push(escaped);
                index += 2;
            }
            other => {
                value.push(other);
                index += 1;
            }
        }
    }
    Err(syntax_error(
        text,
        characters[start].0,
        "unterminated quoted value",
    ))
}

fn scan_bare(text: &str, characters: &[(usize, char)], start: usize) -> Result<(String, usize)> {
    let mut value = String::new();
    let mut index = start;
    while index < characters.len() {
        let (offset, character) = characters[index];
        if character == '\\' {
            let Some(&(_, escaped)) = characters.get(index + 1) else {
                return Err(syntax_error(text, offset, "unterminated escape"));
            };
            value.push(escaped);
            index += 2;
        } else if character.is_whitespace()
            || is_operator_char(character)
            || matches!(character, '#' | '"')
        {
            break;
        } else {
            value.push(character);
            index += 1;
        }
    }
    Ok((value, index))
}

/// Fuses an operator out of `{ [, &, |, ^ }` with a following `!` token.
fn fuse_negations(tokens: &mut Vec<Token>) {
    let mut index = 0;
    while index + 1 < tokens.len() {
        let fusable = tokens[index].is_operator
            && matches!(tokens[index].value.as_str(), "[" | "&" | "|" | "^")
            && tokens[index + 1].is_operator
            && tokens[index + 1].value == "!";
        if fusable {
            tokens.remove(index + 1);
            tokens[index].value.push('!');
        } else {
            index += 1;
        }
    }
}

fn assign_canonical_offsets(tokens: &mut [Token]) {
    let mut offset = 0;
    for (position, token) in tokens.iter_mut().enumerate() {
        if position > 0 {
            offset += 1; // the joining space
        }
        token.start = offset;
        offset += printed(token).len();
        token.end = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(tokens: &[Token]) -> Vec<(bool, String)> {
        tokens
            .iter()
            .map(|token| (token.is_operator, token.value.clone()))
            .collect()
    }

    #[test]
    fn test_operators_and_values() {
        let tokens = tokenize("@ cell : age >> Sum").unwrap();
        assert_eq!(
            values(&tokens),
            vec![
                (true, "@".to_string()),
                (false, "cell".to_string()),
                (true, ":".to_string()),
                (false, "age".to_string()),
                (true, ">>".to_string()),
                (false, "Sum".to_string()),
            ]
        );
    }

    #[test]
    fn test_longest_operator_wins() {
        let tokens = tokenize("@ cell :: UMIs >| Sum").unwrap();
        assert_eq!(tokens[2].value, "::");
        assert_eq!(tokens[4].value, ">|");
    }

    #[test]
    fn test_negation_fusion() {
        let fused = tokenize("[ ! marker ]").unwrap();
        assert_eq!(
            values(&fused),
            vec![
                (true, "[!".to_string()),
                (false, "marker".to_string()),
                (true, "]".to_string()),
            ]
        );
        // Written adjacent, the lexer matches the fused operator directly.
        assert_eq!(values(&tokenize("[! marker ]").unwrap()), values(&fused));
        let combine = tokenize("[ a & ! b ]").unwrap();
        assert_eq!(combine[2].value, "&!");
    }

    #[test]
    fn test_escapes_and_quotes() {
        let tokens = tokenize(r"@ cell : batch\.age").unwrap();
        assert_eq!(tokens[3].value, "batch.age");
        let tokens = tokenize(r#"?? "deep blue""#).unwrap();
        assert_eq!(tokens[1].value, "deep blue");
        let tokens = tokenize(r#"?? "say \"hi\"""#).unwrap();
        assert_eq!(tokens[1].value, "say \"hi\"");
        let tokens = tokenize("?? \"\"").unwrap();
        assert_eq!(tokens[1].value, "");
    }

    #[test]
    fn test_comments_are_stripped() {
        let tokens = tokenize("@ cell # the cells\n: age").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[2].value, ":");
    }

    #[test]
    fn test_syntax_errors() {
        assert!(tokenize(r"@ cell \").is_err());
        assert!(tokenize("?? \"open").is_err());
        assert!(tokenize("- oops").is_err());
    }

    #[test]
    fn test_canonical_offsets_rebuild_text() {
        let tokens = tokenize("  @   cell\n: batch\\.age  ").unwrap();
        let canonical = canonical_text(&tokens);
        assert_eq!(canonical, r"@ cell : batch\.age");
        for token in &tokens {
            assert_eq!(&canonical[token.start..token.end], printed(token));
        }
    }

    #[test]
    fn test_escape_value_roundtrip() {
        for original in ["plain", "with space", "a|b", "x\\y", "", "#tag", "50%"] {
            let escaped = escape_value(original);
            let tokens = tokenize(&format!("?? {escaped}")).unwrap();
            assert_eq!(tokens[1].value, original, "for {original:?}");
        }
    }
}
