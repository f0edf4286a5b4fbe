use std::borrow::Cow;

/// Return the input string with an added "s" at the end if `count` is larger than one and non-zero.
pub fn pluralize(value: &str, count: usize) -> Cow<'_, str> {
    if count == 1 {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("{value}s"))
    }
}

/// Wraps a value into double quotes, so that HTCondor treats it as a ClassAd string literal.
pub fn quoted(value: &str) -> String {
    format!("\"{value}\"")
}

/// Escapes a single word for the "new" HTCondor syntax used by `arguments` and `environment`.
///
/// Words with whitespace or single quotes are wrapped in single quotes (with inner single
/// quotes repeated). Double quotes are always repeated.
fn condor_escape_word(word: &str) -> Cow<'_, str> {
    let needs_quotes = word.is_empty() || word.contains(|c: char| c.is_whitespace() || c == '\'');
    if !needs_quotes && !word.contains('"') {
        return Cow::Borrowed(word);
    }
    let mut escaped = word.replace('"', "\"\"");
    if needs_quotes {
        escaped = format!("'{}'", escaped.replace('\'', "''"));
    }
    Cow::Owned(escaped)
}

/// Formats a list of words as a double quoted HTCondor `arguments`/`environment` value.
pub fn condor_quote_words<I, S>(words: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let words: Vec<String> = words
        .into_iter()
        .map(|w| condor_escape_word(w.as_ref()).into_owned())
        .collect();
    quoted(&words.join(" "))
}
