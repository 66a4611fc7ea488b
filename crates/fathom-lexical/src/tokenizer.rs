//! Word-boundary tokenization with an optional code-aware mode.
//!
//! Code mode splits camelCase and snake_case identifiers into sub-tokens
//! and separates embedded digits from letters before lowercasing, e.g.
//! `getUserData` → `get user data`, `user123` → `user 123`. The same
//! tokenizer must be used for both indexing and querying.

/// Tokenize `text` into lowercase terms.
pub fn tokenize(text: &str, code_aware: bool) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if word.is_empty() {
            continue;
        }
        if code_aware {
            split_identifier(word, &mut tokens);
        } else {
            tokens.push(word.to_lowercase());
        }
    }
    tokens
}

/// Split one identifier-like word at snake_case, camelCase, and
/// letter↔digit boundaries, pushing lowercased sub-tokens.
fn split_identifier(word: &str, out: &mut Vec<String>) {
    for part in word.split('_') {
        if part.is_empty() {
            continue;
        }
        let chars: Vec<char> = part.chars().collect();
        let mut start = 0;
        for i in 1..chars.len() {
            let prev = chars[i - 1];
            let curr = chars[i];
            let camel = prev.is_lowercase() && curr.is_uppercase();
            // `HTTPServer` → `http` + `server`: break before the last
            // uppercase of an acronym run when a lowercase follows.
            let acronym_end = prev.is_uppercase()
                && curr.is_uppercase()
                && chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            let digit_boundary = prev.is_ascii_digit() != curr.is_ascii_digit();
            if camel || acronym_end || digit_boundary {
                out.push(chars[start..i].iter().collect::<String>().to_lowercase());
                start = i;
            }
        }
        if start < chars.len() {
            out.push(chars[start..].iter().collect::<String>().to_lowercase());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words_lowercase() {
        assert_eq!(
            tokenize("Hello World", false),
            vec!["hello".to_string(), "world".to_string()]
        );
    }

    #[test]
    fn punctuation_separates_tokens() {
        assert_eq!(
            tokenize("jwt-token, auth!", false),
            vec!["jwt", "token", "auth"]
        );
    }

    #[test]
    fn camel_case_splits() {
        assert_eq!(tokenize("getUserData", true), vec!["get", "user", "data"]);
    }

    #[test]
    fn snake_case_splits() {
        assert_eq!(tokenize("parse_json_value", true), vec!["parse", "json", "value"]);
    }

    #[test]
    fn digits_separated_from_letters() {
        assert_eq!(tokenize("user123", true), vec!["user", "123"]);
        assert_eq!(tokenize("sha256sum", true), vec!["sha", "256", "sum"]);
    }

    #[test]
    fn acronym_runs_split_before_trailing_word() {
        assert_eq!(tokenize("HTTPServer", true), vec!["http", "server"]);
    }

    #[test]
    fn non_code_mode_keeps_identifiers_whole() {
        assert_eq!(tokenize("getUserData", false), vec!["getuserdata"]);
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize("", true).is_empty());
        assert!(tokenize("   \t\n", true).is_empty());
    }
}
