//! Property tests over the compiler: canonical printing round-trips and
//! operation-sequence composition.

use axial_query::parse;
use axial_query::tokens::escape_value;
use proptest::prelude::*;
use proptest::strategy::Union;

/// Arbitrary value text, biased towards characters that need escaping.
fn value_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        proptest::char::ranges(vec!['a'..='z', '0'..='9', ' '..=' ', '!'..='/', ':'..='@'].into()),
        0..10,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

/// One canonical query snippet (a single operation, rendered the way the
/// printer renders it).
fn snippet() -> BoxedStrategy<String> {
    fn with_value(prefix: &'static str) -> BoxedStrategy<String> {
        value_text()
            .prop_map(move |value| format!("{prefix} {}", escape_value(&value)))
            .boxed()
    }
    fn fixed(text: &'static str) -> BoxedStrategy<String> {
        Just(text.to_string()).boxed()
    }
    Union::new(vec![
        fixed("@"),
        with_value("@"),
        with_value(":"),
        with_value("."),
        with_value("::"),
        with_value("||"),
        fixed("??"),
        with_value("??"),
        with_value("/"),
        with_value("-/"),
        with_value("|/"),
        with_value("*"),
        with_value("@|"),
        with_value("@-"),
        fixed("=@"),
        with_value("=@"),
        fixed("?"),
        fixed("? scalars"),
        fixed("? axes"),
        with_value("<"),
        with_value(">="),
        with_value("!="),
        fixed("% Abs"),
        fixed("% Clamp min 0 max 1"),
        fixed("% Log base 2 eps 1e0"),
        fixed(">> Sum type Int64"),
        fixed(">> Quantile p 0\\.5"),
        fixed(">- Mean"),
        fixed(">| Max"),
        (value_text(), value_text())
            .prop_map(|(first, second)| {
                format!("[ {} &! {} ]", escape_value(&first), escape_value(&second))
            })
            .boxed(),
        value_text()
            .prop_map(|value| format!("[! {} ]", escape_value(&value)))
            .boxed(),
    ])
    .boxed()
}

fn query_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(snippet(), 1..6).prop_map(|snippets| snippets.join(" "))
}

proptest! {
    /// Printing a parsed canonical query reproduces it byte for byte.
    #[test]
    fn print_parse_roundtrip(text in query_text()) {
        let query = parse(&text).expect("canonical snippets always parse");
        prop_assert_eq!(query.to_string(), text);
    }

    /// Parsing is stable under a print cycle.
    #[test]
    fn parse_print_is_idempotent(text in query_text()) {
        let once = parse(&text).unwrap();
        let twice = parse(&once.to_string()).unwrap();
        prop_assert_eq!(once.to_string(), twice.to_string());
    }

    /// Concatenating parses equals parsing the concatenation.
    #[test]
    fn operation_sequences_compose(left in query_text(), right in query_text()) {
        let composed = parse(&left).unwrap().concat(&parse(&right).unwrap());
        let joined = parse(&format!("{left} {right}")).unwrap();
        prop_assert_eq!(composed.to_string(), joined.to_string());
        prop_assert_eq!(composed.len(), joined.len());
    }

    /// Escaped values survive a tokenize cycle no matter their content.
    #[test]
    fn escaped_values_roundtrip(value in value_text()) {
        let text = format!("?? {}", escape_value(&value));
        let query = parse(&text).unwrap();
        prop_assert_eq!(query.to_string(), text);
    }
}
