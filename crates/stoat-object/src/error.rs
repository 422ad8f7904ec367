//! Script-visible error types and the interop message catalog.
//!
//! Every failure that script code can catch is a [`ScriptError`] carrying a
//! [`Message`]: a catalog id plus interpolated arguments. Formatting goes
//! through a [`Catalog`] so embedders can localize the templates without
//! touching error-raising code.

use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;

/// Identifier of a message template in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Property write rejected: slot is read-only.
    ReadOnlyProperty,
    /// Property write rejected: object is not extensible.
    NotExtensible,
    /// Delete rejected: slot is permanent.
    PermanentProperty,
    /// Accessor property has no setter.
    GetterOnly,
    /// Redefinition of a non-configurable property.
    RedefineNonConfigurable,
    /// Prototype assignment would create a cycle.
    PrototypeCycle,
    /// Value is not callable.
    NotCallable,
    /// Value is not a constructor.
    NotConstructible,
    /// Cannot produce a primitive default value.
    NoDefaultValue,
    /// Conversion to a host type failed.
    CannotConvert,
    /// No overload accepts the given argument types.
    NoOverloadMatch,
    /// Named member does not exist on the host class.
    MemberNotFound,
    /// Abstract class or interface cannot be instantiated directly.
    NotInstantiable,
    /// Host class is not visible to this scope.
    ClassNotVisible,
    /// Host array index outside the array bounds.
    ArrayIndexOutOfRange,
    /// A host member threw during invocation.
    WrappedHostFailure,
}

/// Default English template for a message id.
///
/// `{0}`, `{1}`, ... are replaced by the message arguments.
pub fn default_template(id: MessageId) -> &'static str {
    match id {
        MessageId::ReadOnlyProperty => "cannot assign to read-only property \"{0}\"",
        MessageId::NotExtensible => "cannot add property \"{0}\" to a non-extensible object",
        MessageId::PermanentProperty => "property \"{0}\" is permanent and cannot be deleted",
        MessageId::GetterOnly => "property \"{0}\" has a getter but no setter",
        MessageId::RedefineNonConfigurable => {
            "cannot redefine non-configurable property \"{0}\""
        }
        MessageId::PrototypeCycle => "prototype chain would contain a cycle",
        MessageId::NotCallable => "{0} is not a function",
        MessageId::NotConstructible => "{0} is not a constructor",
        MessageId::NoDefaultValue => "cannot convert {0} to a primitive value",
        MessageId::CannotConvert => "cannot convert {0} to {1}",
        MessageId::NoOverloadMatch => "no overload of {0} matches arguments ({1})",
        MessageId::MemberNotFound => "class {0} has no member \"{1}\"",
        MessageId::NotInstantiable => "{0} is abstract or an interface and cannot be instantiated",
        MessageId::ClassNotVisible => "class {0} is not available",
        MessageId::ArrayIndexOutOfRange => "array index {0} is out of range (length {1})",
        MessageId::WrappedHostFailure => "host member {0} failed: {1}",
    }
}

/// A catalog id plus its interpolation arguments.
///
/// `Display` formats with the default English templates; use
/// [`Catalog::format`] for localized output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Which template to use.
    pub id: MessageId,
    /// Interpolated arguments, already rendered to display form.
    pub args: SmallVec<[String; 2]>,
}

impl Message {
    /// Create a message from an id and rendered arguments.
    pub fn new<I, S>(id: MessageId, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn interpolate(&self, template: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            f.write_str(&rest[..open])?;
            rest = &rest[open..];
            let Some(close) = rest.find('}') else {
                return f.write_str(rest);
            };
            let index: usize = rest[1..close].parse().map_err(|_| fmt::Error)?;
            match self.args.get(index) {
                Some(arg) => f.write_str(arg)?,
                None => f.write_str("?")?,
            }
            rest = &rest[close + 1..];
        }
        f.write_str(rest)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.interpolate(default_template(self.id), f)
    }
}

/// Localizable message catalog.
///
/// Starts out empty (falls through to the default templates); embedders
/// install overrides per id.
#[derive(Debug, Default)]
pub struct Catalog {
    overrides: rustc_hash::FxHashMap<MessageId, String>,
}

impl Catalog {
    /// Install a template override for one message id.
    pub fn set(&mut self, id: MessageId, template: impl Into<String>) {
        self.overrides.insert(id, template.into());
    }

    /// Format a message through this catalog.
    pub fn format(&self, message: &Message) -> String {
        match self.overrides.get(&message.id) {
            Some(template) => {
                struct Via<'a>(&'a Message, &'a str);
                impl fmt::Display for Via<'_> {
                    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        self.0.interpolate(self.1, f)
                    }
                }
                Via(message, template).to_string()
            }
            None => message.to_string(),
        }
    }
}

/// A script-catchable error.
///
/// The variant selects the language error kind; the payload is always a
/// catalog message so host and interop failures present uniformly.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScriptError {
    /// TypeError: wrong kind of value or illegal property operation.
    #[error("TypeError: {0}")]
    Type(Message),

    /// RangeError: numeric value outside the representable range.
    #[error("RangeError: {0}")]
    Range(Message),

    /// EvalError: interop-level failure (unresolved overload, bad class).
    #[error("EvalError: {0}")]
    Eval(Message),

    /// A host member failed; the cause is unwrapped to its real message.
    #[error("Error: {0}")]
    Wrapped(Message),
}

impl ScriptError {
    /// Create a TypeError.
    pub fn type_error<I, S>(id: MessageId, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Type(Message::new(id, args))
    }

    /// Create a RangeError.
    pub fn range_error<I, S>(id: MessageId, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Range(Message::new(id, args))
    }

    /// Create an EvalError.
    pub fn eval_error<I, S>(id: MessageId, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Eval(Message::new(id, args))
    }

    /// Wrap a host failure for the named member.
    pub fn wrapped(member: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Wrapped(Message::new(
            MessageId::WrappedHostFailure,
            [member.into(), cause.into()],
        ))
    }

    /// The catalog message carried by this error.
    pub fn message(&self) -> &Message {
        match self {
            Self::Type(m) | Self::Range(m) | Self::Eval(m) | Self::Wrapped(m) => m,
        }
    }
}

/// Result type for protocol operations.
pub type ScriptResult<T> = Result<T, ScriptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_interpolation() {
        let err = ScriptError::type_error(MessageId::CannotConvert, ["NaN", "i32"]);
        assert_eq!(err.to_string(), "TypeError: cannot convert NaN to i32");
    }

    #[test]
    fn test_missing_argument_renders_placeholder() {
        let msg = Message::new(MessageId::CannotConvert, ["only-one"]);
        assert_eq!(msg.to_string(), "cannot convert only-one to ?");
    }

    #[test]
    fn test_catalog_override() {
        let mut catalog = Catalog::default();
        catalog.set(MessageId::MemberNotFound, "{1} fehlt auf {0}");
        let msg = Message::new(MessageId::MemberNotFound, ["Point", "nope"]);
        assert_eq!(catalog.format(&msg), "nope fehlt auf Point");
        // Untouched ids keep the default template.
        let other = Message::new(MessageId::PrototypeCycle, Vec::<String>::new());
        assert_eq!(catalog.format(&other), "prototype chain would contain a cycle");
    }
}
