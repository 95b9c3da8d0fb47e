//! Text normalization helpers shared by the deduplicator and extractors.

use crate::constants::dedup::{COMPANY_SUFFIXES, POSTING_KEY_SEPARATOR, TITLE_ABBREVIATIONS};
use crate::types::{CompanyName, PostingKey, RoleTitle};

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_inline_whitespace<T: AsRef<str>>(text: T) -> String {
    let mut normalized = String::new();
    let mut seen_space = false;
    for ch in text.as_ref().chars() {
        if ch.is_whitespace() {
            if !seen_space {
                normalized.push(' ');
                seen_space = true;
            }
        } else {
            normalized.push(ch);
            seen_space = false;
        }
    }
    normalized.trim().to_string()
}

/// Lower-case, strip punctuation, and collapse whitespace.
///
/// `"Sr. Backend-Engineer  (Remote)"` becomes `"sr backend engineer remote"`.
pub fn normalize_key_fragment(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical company name: whitespace collapsed, trailing legal suffixes removed.
///
/// `"Acme, Inc."` and `"ACME Corp"` both reduce to a name whose key fragment is `acme`.
pub fn canonical_company(raw: &str) -> CompanyName {
    let collapsed = normalize_inline_whitespace(raw);
    let mut words: Vec<&str> = collapsed.split(' ').filter(|w| !w.is_empty()).collect();
    while words.len() > 1 {
        let Some(last) = words.last() else {
            break;
        };
        let fragment = normalize_key_fragment(last);
        if fragment.is_empty() || COMPANY_SUFFIXES.contains(&fragment.as_str()) {
            words.pop();
        } else {
            break;
        }
    }
    words
        .join(" ")
        .trim_end_matches(|ch: char| ch == ',' || ch == '.' || ch == '-')
        .trim()
        .to_string()
}

/// Canonical title: whitespace collapsed and common abbreviations expanded.
///
/// `"Sr. Software Eng."` becomes `"Senior Software Engineer"`.
pub fn canonical_title(raw: &str) -> RoleTitle {
    normalize_inline_whitespace(raw)
        .split(' ')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let bare = word.trim_end_matches(['.', ',']).to_lowercase();
            TITLE_ABBREVIATIONS
                .iter()
                .find(|(abbr, _)| *abbr == bare)
                .map(|(_, expanded)| (*expanded).to_string())
                .unwrap_or_else(|| word.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable posting key built from canonical company and title.
pub fn posting_key(company: &str, title: &str) -> PostingKey {
    format!(
        "{}{}{}",
        normalize_key_fragment(company),
        POSTING_KEY_SEPARATOR,
        normalize_key_fragment(title)
    )
}

/// A lowercase token with its byte span in the source text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// Lowercased token text.
    pub text: String,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

/// Split text into lowercase tokens suitable for alias matching.
///
/// Tokens are runs of alphanumerics; `+` and `#` attach to a preceding token
/// (`c++`, `c#`) and `.` is kept when followed by an alphanumeric (`node.js`,
/// `.net`). Everything else separates tokens, so `ci/cd` yields `ci`, `cd`.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut last_alnum = false;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        let next_alnum = chars
            .peek()
            .map(|(_, next)| next.is_alphanumeric())
            .unwrap_or(false);
        let keep = if ch.is_alphanumeric() {
            true
        } else if ch == '+' || ch == '#' {
            start.is_some()
        } else if ch == '.' {
            next_alnum && (start.is_none() || last_alnum)
        } else {
            false
        };

        if keep {
            if start.is_none() {
                start = Some(idx);
            }
            last_alnum = ch.is_alphanumeric();
        } else if let Some(begin) = start.take() {
            push_token(text, begin, idx, &mut tokens);
            last_alnum = false;
        }
    }
    if let Some(begin) = start {
        push_token(text, begin, text.len(), &mut tokens);
    }
    tokens
}

fn push_token(text: &str, start: usize, end: usize, tokens: &mut Vec<Token>) {
    tokens.push(Token {
        text: text[start..end].to_lowercase(),
        start,
        end,
    });
}

/// Join token texts with single spaces (the alias lookup key form).
pub fn join_tokens(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|token| token.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_inline_whitespace_collapses_runs() {
        let input = "Alpha\n\n  Beta\tGamma";
        assert_eq!(normalize_inline_whitespace(input), "Alpha Beta Gamma");
    }

    #[test]
    fn key_fragment_strips_punctuation_and_case() {
        assert_eq!(
            normalize_key_fragment("  Sr. Backend-Engineer\t(Remote) "),
            "sr backend engineer remote"
        );
        assert_eq!(normalize_key_fragment("..."), "");
    }

    #[test]
    fn company_suffixes_are_removed() {
        assert_eq!(canonical_company("Acme, Inc."), "Acme");
        assert_eq!(canonical_company("  Globex   Corporation "), "Globex");
        assert_eq!(canonical_company("Initech LLC"), "Initech");
        assert_eq!(canonical_company("Hooli Holdings Ltd."), "Hooli Holdings");
        // A lone suffix-like name is kept rather than emptied.
        assert_eq!(canonical_company("Company"), "Company");
    }

    #[test]
    fn title_abbreviations_expand() {
        assert_eq!(canonical_title("Sr. Software Eng."), "Senior Software Engineer");
        assert_eq!(canonical_title("Jr  Backend Dev"), "Junior Backend Developer");
        assert_eq!(canonical_title("Staff Engineer"), "Staff Engineer");
    }

    #[test]
    fn posting_key_is_normalized() {
        let a = posting_key(&canonical_company("Acme Inc"), &canonical_title("Sr. Engineer"));
        let b = posting_key(&canonical_company("ACME"), &canonical_title("Senior  Engineer"));
        assert_eq!(a, "acme::senior engineer");
        assert_eq!(a, b);
    }

    #[test]
    fn tokenize_keeps_symbol_languages_and_dotted_names() {
        let tokens: Vec<String> = tokenize("C++, C#, Node.js and .NET; CI/CD pipelines.")
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(
            tokens,
            vec!["c++", "c#", "node.js", "and", ".net", "ci", "cd", "pipelines"]
        );
    }

    #[test]
    fn tokenize_reports_byte_spans() {
        let text = "Use Rust!";
        let tokens = tokenize(text);
        assert_eq!(tokens.len(), 2);
        assert_eq!(&text[tokens[1].start..tokens[1].end], "Rust");
        assert_eq!(tokens[1].text, "rust");
    }

    #[test]
    fn tokenize_empty_text_is_empty() {
        assert!(tokenize("   \n\t").is_empty());
        assert!(tokenize("").is_empty());
    }
}
