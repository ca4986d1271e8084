//! Reserved marker values and node names.
//!
//! Sentinels live in their own enum rather than being encoded as magic
//! strings, so a user value that happens to read `"error"` or `"$else"` can
//! never be mistaken for one once it has been typed as a `T`.

use std::fmt;

/// The closed set of reserved markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    /// No status yet, or no resolvable transition.
    Unknown,
    /// Default-edge key.
    Else,
    /// Error-edge key.
    Error,
    /// Reserved start-node name.
    Input,
    /// Reserved end-node name.
    Output,
}

impl Sentinel {
    /// Map a textual token (`$input`, `$output`, `$else`, `$error`, any ASCII
    /// case) to its sentinel.
    ///
    /// `$unknown` has no token form.
    pub fn from_token(token: &str) -> Option<Self> {
        const TOKENS: [(&str, Sentinel); 4] = [
            ("$input", Sentinel::Input),
            ("$output", Sentinel::Output),
            ("$else", Sentinel::Else),
            ("$error", Sentinel::Error),
        ];

        TOKENS
            .iter()
            .find(|(text, _)| text.eq_ignore_ascii_case(token))
            .map(|(_, sentinel)| *sentinel)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentinel::Unknown => "$unknown",
            Sentinel::Else => "$else",
            Sentinel::Error => "$error",
            Sentinel::Input => "$input",
            Sentinel::Output => "$output",
        }
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// NodeName
// ---------------------------------------------------------------------------

/// Identity of a node inside a graph.
///
/// Text and numeric names are distinct keys: `Text("1")` != `Number(1)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeName {
    Input,
    Output,
    Text(String),
    Number(i64),
}

impl NodeName {
    /// Whether this name can identify a node. Blank text cannot.
    pub fn is_usable(&self) -> bool {
        match self {
            NodeName::Text(text) => !text.trim().is_empty(),
            _ => true,
        }
    }
}

impl From<&str> for NodeName {
    fn from(value: &str) -> Self {
        match Sentinel::from_token(value) {
            Some(Sentinel::Input) => NodeName::Input,
            Some(Sentinel::Output) => NodeName::Output,
            _ => NodeName::Text(value.to_owned()),
        }
    }
}

impl From<String> for NodeName {
    fn from(value: String) -> Self {
        match Sentinel::from_token(&value) {
            Some(Sentinel::Input) => NodeName::Input,
            Some(Sentinel::Output) => NodeName::Output,
            _ => NodeName::Text(value),
        }
    }
}

impl From<&String> for NodeName {
    fn from(value: &String) -> Self {
        NodeName::from(value.as_str())
    }
}

impl From<i64> for NodeName {
    fn from(value: i64) -> Self {
        NodeName::Number(value)
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeName::Input => Sentinel::Input.fmt(f),
            NodeName::Output => Sentinel::Output.fmt(f),
            NodeName::Text(text) => f.write_str(text),
            NodeName::Number(n) => write!(f, "#{n}"),
        }
    }
}

// ---------------------------------------------------------------------------
// AsToken
// ---------------------------------------------------------------------------

/// Exposes the textual form of a literal vector key, if it has one.
///
/// String-like keys spelled `$else` / `$error` are normalized to the
/// corresponding sentinel key when an edge is registered.
pub trait AsToken {
    fn as_token(&self) -> Option<&str> {
        None
    }
}

impl AsToken for String {
    fn as_token(&self) -> Option<&str> {
        Some(self)
    }
}

impl AsToken for &'static str {
    fn as_token(&self) -> Option<&str> {
        Some(self)
    }
}

impl AsToken for serde_json::Value {
    fn as_token(&self) -> Option<&str> {
        self.as_str()
    }
}

impl AsToken for i32 {}
impl AsToken for i64 {}
impl AsToken for u16 {}
impl AsToken for u32 {}
impl AsToken for u64 {}
impl AsToken for bool {}
impl AsToken for char {}
