//! Dynamic values and property keys.
//!
//! `Value` is the single currency of the interop core: everything the
//! interpreter or a host member sees is one of these. Heap data lives
//! behind `Arc`, so values are cheap to clone and `Send + Sync`.

use std::fmt;
use std::sync::Arc;

use crate::object::{DynamicObject, ObjectRef};

/// A unique symbol key.
///
/// Identity is the allocation: two symbols are equal only if they are
/// clones of the same `Symbol`.
#[derive(Clone)]
pub struct Symbol(Arc<SymbolData>);

struct SymbolData {
    description: Option<String>,
}

impl Symbol {
    /// Create a fresh symbol with an optional description.
    pub fn new(description: Option<&str>) -> Self {
        Self(Arc::new(SymbolData {
            description: description.map(str::to_owned),
        }))
    }

    /// The description passed at creation, if any.
    pub fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(d) => write!(f, "Symbol({d})"),
            None => write!(f, "Symbol()"),
        }
    }
}

/// Property key (string, integer index, or symbol).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum PropertyKey {
    /// String property key.
    String(Arc<str>),
    /// Integer index (arrays and canonical numeric strings).
    Index(u32),
    /// Symbol property key.
    Symbol(Symbol),
}

impl PropertyKey {
    /// Create a key from a name, canonicalizing numeric strings.
    ///
    /// `"0"`, `"2"`, ... become `Index` keys so enumeration order treats
    /// them numerically; `"01"` and `"4294967296"` stay strings.
    pub fn new(name: &str) -> Self {
        if let Some(index) = canonical_index(name) {
            Self::Index(index)
        } else {
            Self::String(Arc::from(name))
        }
    }

    /// The string form of this key (indices render in decimal).
    pub fn to_display(&self) -> String {
        match self {
            Self::String(s) => s.to_string(),
            Self::Index(i) => {
                let mut buf = itoa::Buffer::new();
                buf.format(*i).to_string()
            }
            Self::Symbol(s) => format!("{s:?}"),
        }
    }
}

/// Parse a canonical array index: decimal, no leading zeros except "0".
fn canonical_index(name: &str) -> Option<u32> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    if !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

impl From<&str> for PropertyKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<u32> for PropertyKey {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

impl From<Symbol> for PropertyKey {
    fn from(symbol: Symbol) -> Self {
        Self::Symbol(symbol)
    }
}

/// A dynamic value.
///
/// Integers and doubles are kept apart (as in the VM's value encoding) so
/// coercion can tell an exact `i32` from a floating-point number.
#[derive(Clone)]
pub enum Value {
    /// The undefined value.
    Undefined,
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A 32-bit integer.
    Int(i32),
    /// A double-precision number.
    Number(f64),
    /// An immutable string.
    String(Arc<str>),
    /// A symbol.
    Symbol(Symbol),
    /// A dynamic object (scripted or host-backed).
    Object(ObjectRef),
}

impl Value {
    /// The undefined value.
    pub fn undefined() -> Self {
        Self::Undefined
    }

    /// The null value.
    pub fn null() -> Self {
        Self::Null
    }

    /// A boolean value.
    pub fn boolean(b: bool) -> Self {
        Self::Bool(b)
    }

    /// A 32-bit integer value.
    pub fn int32(i: i32) -> Self {
        Self::Int(i)
    }

    /// A double value.
    pub fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// A string value.
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::String(s.into())
    }

    /// An object value.
    pub fn object(o: ObjectRef) -> Self {
        Self::Object(o)
    }

    /// True for `Undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for `Undefined` or `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// The boolean payload, if any.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, if any.
    pub fn as_int32(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The numeric payload (ints widen), if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string payload, if any.
    pub fn as_string(&self) -> Option<&Arc<str>> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The object payload, if any.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// ECMAScript truthiness.
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Symbol(_) | Self::Object(_) => true,
        }
    }

    /// ECMAScript ToNumber, including numeric-literal string parsing.
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Int(i) => *i as f64,
            Self::Number(n) => *n,
            Self::String(s) => string_to_number(s),
            Self::Symbol(_) | Self::Object(_) => f64::NAN,
        }
    }

    /// Display form for error messages: value plus enough type context to
    /// identify it ("3.5", "\"abc\"", "[object Point]").
    pub fn display(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => {
                let mut buf = itoa::Buffer::new();
                buf.format(*i).to_string()
            }
            Self::Number(n) => format_number(*n),
            Self::String(s) => format!("\"{s}\""),
            Self::Symbol(s) => format!("{s:?}"),
            Self::Object(o) => format!("[object {}]", o.class_name()),
        }
    }

    /// The `typeof` name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null | Self::Object(_) => "object",
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
        }
    }

    /// ECMAScript SameValue (NaN equals NaN; +0 and -0 differ).
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => same_object(a, b),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => {
                    if x.is_nan() && y.is_nan() {
                        true
                    } else {
                        x == y && x.is_sign_positive() == y.is_sign_positive()
                    }
                }
                _ => false,
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Pointer identity of two object handles.
pub fn same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const dyn DynamicObject as *const u8,
        Arc::as_ptr(b) as *const dyn DynamicObject as *const u8,
    )
}

/// Numeric-literal parsing per the language rules: surrounding whitespace,
/// optional sign on decimal literals, unsigned `0x`/`0X` hex, `Infinity`,
/// empty string is zero.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(|c: char| c.is_whitespace());
    if trimmed.is_empty() {
        return 0.0;
    }
    let (sign, explicit_sign, body) = match trimmed.as_bytes()[0] {
        b'+' => (1.0, true, &trimmed[1..]),
        b'-' => (-1.0, true, &trimmed[1..]),
        _ => (1.0, false, trimmed),
    };
    if body == "Infinity" {
        return sign * f64::INFINITY;
    }
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        // The grammar admits no sign in front of a hex literal.
        if explicit_sign {
            return f64::NAN;
        }
        return match u64::from_str_radix(hex, 16) {
            Ok(v) => v as f64,
            Err(_) => f64::NAN,
        };
    }
    // Restrict to the decimal-literal grammar; Rust's parser would also
    // accept "inf" and "NaN", which the language does not.
    if !body
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return f64::NAN;
    }
    match body.parse::<f64>() {
        Ok(v) => sign * v,
        Err(_) => f64::NAN,
    }
}

/// Format a double the way the language prints numbers: integral values
/// without a trailing `.0`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == n.trunc() && n.abs() < 1e21 {
        let mut buf = itoa::Buffer::new();
        return buf.format(n as i64).to_string();
    }
    let mut buf = ryu::Buffer::new();
    buf.format(n).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_index_keys() {
        assert_eq!(PropertyKey::new("0"), PropertyKey::Index(0));
        assert_eq!(PropertyKey::new("42"), PropertyKey::Index(42));
        assert!(matches!(PropertyKey::new("01"), PropertyKey::String(_)));
        assert!(matches!(PropertyKey::new("4294967296"), PropertyKey::String(_)));
        assert!(matches!(PropertyKey::new("x"), PropertyKey::String(_)));
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert!(string_to_number("-0x10").is_nan());
        assert!(string_to_number("+0x10").is_nan());
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert_eq!(string_to_number("3.25"), 3.25);
        assert!(string_to_number("12abc").is_nan());
        assert!(string_to_number("e5").is_nan());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::undefined().to_boolean());
        assert!(!Value::null().to_boolean());
        assert!(!Value::number(f64::NAN).to_boolean());
        assert!(!Value::string("").to_boolean());
        assert!(Value::string("x").to_boolean());
        assert!(Value::int32(-1).to_boolean());
    }

    #[test]
    fn test_same_value() {
        assert!(Value::number(f64::NAN).same_value(&Value::number(f64::NAN)));
        assert!(!Value::number(0.0).same_value(&Value::number(-0.0)));
        assert!(Value::int32(3).same_value(&Value::number(3.0)));
    }

    #[test]
    fn test_symbol_identity() {
        let a = Symbol::new(Some("tag"));
        let b = Symbol::new(Some("tag"));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
