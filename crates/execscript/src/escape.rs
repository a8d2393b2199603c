//! Escaping for identifiers, string literals, store labels and mapping keys.

use crate::error::{Error, Result};
use encoding_rs::{Encoding, WINDOWS_1252};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Characters the store refuses inside a label.
pub const FORBIDDEN_KEY_CHARS: &[char] = &[':', '[', ']'];

/// Opening of a non-printable token, e.g. `{{unc181}}`.
pub const TOKEN_OPEN: &str = "{{unc";
pub const TOKEN_CLOSE: &str = "}}";

/// Codes at or above this offset carry a code point the legacy encoding
/// cannot represent.
const UNMAPPABLE_OFFSET: u32 = 0x11_0000;

/// Turn `name` into a valid script identifier.
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`.
pub fn escape_identifier(name: &str) -> Result<String> {
    let escaped: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if escaped.is_empty() {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    Ok(escaped)
}

/// Escape `text` for use inside a double-quoted script string literal.
///
/// Backslashes go first so later escapes are not escaped again.
pub fn escape_string_literal(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
        .replace('\0', "\\0")
}

fn token_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:\{\{unc\d+\}\})+").expect("valid token run regex"))
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{unc(\d+)\}\}").expect("valid token regex"))
}

/// Round-trip codec for characters above printable ASCII.
///
/// The store's string channel is not reliably 8-bit clean, so every
/// character with a code point above 126 is replaced by one `{{unc<n>}}`
/// token per byte of its legacy encoding. Decoding collects runs of
/// consecutive tokens as raw bytes and decodes them as one unit, which
/// reassembles multi-byte characters.
#[derive(Clone, Copy)]
pub struct NonPrintableCodec {
    encoding: &'static Encoding,
}

impl Default for NonPrintableCodec {
    fn default() -> Self {
        Self {
            encoding: WINDOWS_1252,
        }
    }
}

impl fmt::Debug for NonPrintableCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonPrintableCodec")
            .field("encoding", &self.encoding.name())
            .finish()
    }
}

impl NonPrintableCodec {
    /// Codec for a WHATWG encoding label such as `windows-1252` or `utf-8`.
    pub fn new(label: &str) -> Result<Self> {
        Encoding::for_label(label.trim().as_bytes())
            .map(|e| Self {
                encoding: e.output_encoding(),
            })
            .ok_or_else(|| Error::Config(format!("unknown encoding label '{label}'")))
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn escape(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut buf = [0u8; 4];
        for (i, c) in text.char_indices() {
            if c == '{' && text[i..].starts_with(TOKEN_OPEN) {
                push_token(&mut out, u32::from(b'{'));
            } else if (c as u32) > 126 {
                let (bytes, _, had_errors) = self.encoding.encode(c.encode_utf8(&mut buf));
                if had_errors {
                    push_token(&mut out, UNMAPPABLE_OFFSET + c as u32);
                } else {
                    for b in bytes.iter() {
                        push_token(&mut out, u32::from(*b));
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    pub fn unescape(&self, text: &str) -> String {
        token_run_regex()
            .replace_all(text, |run: &regex::Captures| self.decode_run(&run[0]))
            .into_owned()
    }

    fn decode_run(&self, run: &str) -> String {
        let mut out = String::new();
        let mut bytes: Vec<u8> = Vec::new();
        for token in token_regex().captures_iter(run) {
            let Ok(code) = token[1].parse::<u32>() else {
                self.flush(&mut bytes, &mut out);
                out.push_str(&token[0]);
                continue;
            };
            if let Ok(byte) = u8::try_from(code) {
                bytes.push(byte);
                continue;
            }
            self.flush(&mut bytes, &mut out);
            let point = if code >= UNMAPPABLE_OFFSET {
                code - UNMAPPABLE_OFFSET
            } else {
                code
            };
            out.push(char::from_u32(point).unwrap_or(char::REPLACEMENT_CHARACTER));
        }
        self.flush(&mut bytes, &mut out);
        out
    }

    fn flush(&self, bytes: &mut Vec<u8>, out: &mut String) {
        if bytes.is_empty() {
            return;
        }
        let (decoded, _) = self.encoding.decode_without_bom_handling(bytes);
        out.push_str(&decoded);
        bytes.clear();
    }
}

fn push_token(out: &mut String, code: u32) {
    out.push_str(TOKEN_OPEN);
    out.push_str(&code.to_string());
    out.push_str(TOKEN_CLOSE);
}

/// Escape with the default legacy encoding.
pub fn escape_non_printable(text: &str) -> String {
    NonPrintableCodec::default().escape(text)
}

/// Unescape with the default legacy encoding.
pub fn unescape_non_printable(text: &str) -> String {
    NonPrintableCodec::default().unescape(text)
}

/// Callback correcting a key: receives the key and the offending character.
pub type KeyFixer = Arc<dyn Fn(&str, char) -> String + Send + Sync>;

/// What to do with mapping keys containing [`FORBIDDEN_KEY_CHARS`].
#[derive(Clone, Default)]
pub enum KeyPolicy {
    /// Fail with [`Error::InvalidKeyCharacter`].
    #[default]
    Reject,
    /// Replace every forbidden character with this string.
    Substitute(String),
    /// Replace per character; characters missing from the table are rejected.
    Table(HashMap<char, String>),
    /// Ask a callback for a corrected key.
    Callback(KeyFixer),
}

impl fmt::Debug for KeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPolicy::Reject => f.write_str("Reject"),
            KeyPolicy::Substitute(s) => f.debug_tuple("Substitute").field(s).finish(),
            KeyPolicy::Table(t) => f.debug_tuple("Table").field(t).finish(),
            KeyPolicy::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl KeyPolicy {
    pub fn callback(f: impl Fn(&str, char) -> String + Send + Sync + 'static) -> Self {
        KeyPolicy::Callback(Arc::new(f))
    }

    /// Return `key` with forbidden characters handled by this policy.
    pub fn apply(&self, key: &str) -> Result<String> {
        let mut current = key.to_string();
        // A callback may return a key that still needs fixing; bound the retries.
        for _ in 0..=key.chars().count() {
            let Some(bad) = current.chars().find(|c| FORBIDDEN_KEY_CHARS.contains(c)) else {
                return Ok(current);
            };
            current = match self {
                KeyPolicy::Reject => {
                    return Err(Error::InvalidKeyCharacter {
                        key: key.to_string(),
                        character: bad,
                    });
                }
                KeyPolicy::Substitute(with) => current
                    .chars()
                    .map(|c| {
                        if FORBIDDEN_KEY_CHARS.contains(&c) {
                            with.clone()
                        } else {
                            c.to_string()
                        }
                    })
                    .collect(),
                KeyPolicy::Table(table) => {
                    let replacement = table.get(&bad).ok_or_else(|| Error::InvalidKeyCharacter {
                        key: key.to_string(),
                        character: bad,
                    })?;
                    current.replace(bad, replacement)
                }
                KeyPolicy::Callback(fix) => fix(&current, bad),
            };
        }
        match current.chars().find(|c| FORBIDDEN_KEY_CHARS.contains(c)) {
            Some(bad) => Err(Error::InvalidKeyCharacter {
                key: key.to_string(),
                character: bad,
            }),
            None => Ok(current),
        }
    }

    /// [`apply`](Self::apply) to every key of one mapping.
    ///
    /// Fails with [`Error::KeyCollision`] when two keys end up equal.
    pub fn apply_all<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> Result<Vec<String>> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        let mut fixed = Vec::new();
        for key in keys {
            let corrected = self.apply(key)?;
            if let Some(first) = seen.insert(corrected.clone(), key) {
                return Err(Error::KeyCollision {
                    first: first.to_string(),
                    second: key.to_string(),
                    corrected,
                });
            }
            fixed.push(corrected);
        }
        Ok(fixed)
    }
}
