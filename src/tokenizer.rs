//! Trace line tokenizer
//!
//! Turns one raw load file line into the bounded token list the replay loop
//! works on. The per-client placeholder is substituted first, then path
//! separators are normalized: `\` becomes `/`, and any run of `/` collapses
//! to a single one. The order matters: a Windows style `\\server` capture
//! only collapses after the backslashes have been converted.

use crate::constants::{CLIENT_PLACEHOLDER, MAX_TOKENS};

/// Tokens of one line, terminated by an empty end-of-arguments entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    items: Vec<String>,
}

impl Tokens {
    /// Number of real tokens (the terminator is not counted).
    pub fn len(&self) -> usize {
        self.items.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Token `i`, or `""` past the end of the argument list.
    pub fn get(&self, i: usize) -> &str {
        self.items.get(i).map(String::as_str).unwrap_or("")
    }

    /// Real tokens, without the terminator.
    pub fn as_slice(&self) -> &[String] {
        &self.items[..self.len()]
    }

    pub fn into_vec(mut self) -> Vec<String> {
        self.items.pop();
        self.items
    }
}

/// Apply client substitution and separator normalization to a raw line.
pub fn normalize(line: &str, client_name: &str) -> String {
    let mut s = line.replace(CLIENT_PLACEHOLDER, client_name).replace('\\', "/");
    while s.contains("//") {
        s = s.replace("//", "/");
    }
    s
}

/// Split a line into at most `MAX_TOKENS` entries, the last of which is
/// always the empty terminator. Double quotes group words and are dropped.
pub fn tokenize(line: &str, client_name: &str) -> Tokens {
    let normalized = normalize(line.trim_end_matches(['\r', '\n']), client_name);

    let mut items = Vec::with_capacity(8);
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in normalized.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    items.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        items.push(current);
    }

    items.truncate(MAX_TOKENS - 1);
    items.push(String::new());
    Tokens { items }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_client_and_normalizes() {
        let t = tokenize(r#"NTCreateX "\clients\client1\~dmtmp\WORD\CHAP10.DOC" 0x1 0x1 12 NT_STATUS_OK"#, "client7");
        assert_eq!(t.len(), 6);
        assert_eq!(t.get(0), "NTCreateX");
        assert_eq!(t.get(1), "/clients/client7/~dmtmp/WORD/CHAP10.DOC");
        assert_eq!(t.get(5), "NT_STATUS_OK");
        assert_eq!(t.get(6), "");
        assert_eq!(t.get(19), "");
    }

    #[test]
    fn test_separator_order() {
        assert_eq!(normalize(r"\\server\share", "client3"), "/server/share");
        assert_eq!(normalize("a//b///c", "client3"), "a/b/c");
    }

    #[test]
    fn test_quoted_token_keeps_spaces() {
        let t = tokenize(r#"Unlink "/client1/My Documents/a b.txt" 0x16 NT_STATUS_OK"#, "client2");
        assert_eq!(t.get(1), "/client2/My Documents/a b.txt");
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn test_short_lines() {
        assert_eq!(tokenize("", "client1").len(), 0);
        assert_eq!(tokenize("   \t ", "client1").len(), 0);
        assert_eq!(tokenize("Close", "client1").len(), 1);
        assert!(tokenize("", "client1").is_empty());
    }

    #[test]
    fn test_bounded_token_count() {
        let line = (0..40).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let t = tokenize(&line, "client1");
        assert_eq!(t.len(), MAX_TOKENS - 1);
        assert_eq!(t.get(MAX_TOKENS - 1), "");
    }

    #[test]
    fn test_idempotent() {
        let line = r"ReadX 4321 0 65536 65536 NT_STATUS_OK";
        for _ in 0..3 {
            assert_eq!(tokenize(line, "client9"), tokenize(line, "client9"));
        }
        let once = normalize(r"Rename \client1\a \client1\\b NT_STATUS_OK", "client4");
        assert_eq!(normalize(&once, "client4"), once);
    }
}
