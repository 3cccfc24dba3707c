//! Query text normalization.

/// Two views of one query: `lowered` for matching statement shapes,
/// `preserved` for extracting literals with their original case.
///
/// `lowered` is an ASCII lower-casing of `preserved`, so byte offsets found in
/// one are valid in the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    lowered: String,
    preserved: String,
}

impl NormalizedQuery {
    /// Collapses whitespace runs outside quotes to a single space and trims
    /// surrounding whitespace and trailing semicolons.
    pub fn new(text: &str) -> Self {
        let mut preserved = String::with_capacity(text.len());
        let mut quote: Option<char> = None;
        let mut pending_space = false;

        for ch in text.chars() {
            if let Some(q) = quote {
                preserved.push(ch);
                if ch == q {
                    quote = None;
                }
                continue;
            }
            if ch.is_whitespace() {
                pending_space = !preserved.is_empty();
                continue;
            }
            if pending_space {
                preserved.push(' ');
                pending_space = false;
            }
            if ch == '\'' || ch == '"' {
                quote = Some(ch);
            }
            preserved.push(ch);
        }

        while preserved.ends_with(';') || preserved.ends_with(' ') {
            preserved.pop();
        }

        Self {
            lowered: preserved.to_ascii_lowercase(),
            preserved,
        }
    }

    pub fn lowered(&self) -> &str {
        &self.lowered
    }

    pub fn preserved(&self) -> &str {
        &self.preserved
    }

    pub fn is_empty(&self) -> bool {
        self.lowered.is_empty()
    }

    /// Returns the leading keyword, lower-cased.
    pub fn first_word(&self) -> &str {
        let end = self
            .lowered
            .find(|c: char| !is_word_char(c))
            .unwrap_or(self.lowered.len());
        &self.lowered[..end]
    }

    /// Finds `keyword` as a whole word outside quoted text, starting at byte
    /// offset `from`. `keyword` must be lower-case and may contain single
    /// spaces (`"order by"`).
    pub fn find_keyword(&self, keyword: &str, from: usize) -> Option<usize> {
        let bytes = self.lowered.as_bytes();
        let mut quote: Option<u8> = None;

        for (i, &b) in bytes.iter().enumerate() {
            if let Some(q) = quote {
                if b == q {
                    quote = None;
                }
                continue;
            }
            if b == b'\'' || b == b'"' {
                quote = Some(b);
                continue;
            }
            if i < from || !bytes[i..].starts_with(keyword.as_bytes()) {
                continue;
            }
            let before_ok = i == 0 || !is_word_byte(bytes[i - 1]);
            let after = i + keyword.len();
            let after_ok = after >= bytes.len() || !is_word_byte(bytes[after]);
            if before_ok && after_ok {
                return Some(i);
            }
        }
        None
    }
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}
