//! Property keys for objects and arrays.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

/// A key addressing one slot of an object or array.
///
/// Objects store every key as a name; an `Index` key used against an object
/// is looked up by its decimal name. Arrays accept `Index` keys and names
/// that spell a canonical index, plus the readable `length` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Named property: `{"key": value}`
    Name(Rc<str>),
    /// Positional slot: `[index]`
    Index(usize),
}

impl Key {
    /// Name of the synthetic array length property.
    pub const LENGTH: &'static str = "length";

    /// Create a named key.
    #[inline]
    pub fn name(name: impl Into<Rc<str>>) -> Self {
        Key::Name(name.into())
    }

    /// Returns the key as an object property name.
    pub fn as_name(&self) -> Cow<'_, str> {
        match self {
            Key::Name(name) => Cow::Borrowed(name),
            Key::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// Returns the key as an array index, if it spells one.
    ///
    /// Only canonical decimal names count: `"7"` is an index, `"07"` is not.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            Key::Name(name) => {
                let canonical = &**name == "0" || (!name.starts_with('0') && !name.is_empty());
                if canonical && name.bytes().all(|b| b.is_ascii_digit()) {
                    name.parse().ok()
                } else {
                    None
                }
            }
        }
    }

    /// Returns true if this key names the array `length` property.
    #[inline]
    pub fn is_length(&self) -> bool {
        matches!(self, Key::Name(name) if &**name == Self::LENGTH)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, ".{}", name),
            Key::Index(index) => write!(f, "[{}]", index),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(Rc::from(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(Rc::from(name))
    }
}

impl From<Rc<str>> for Key {
    fn from(name: Rc<str>) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<i32> for Key {
    fn from(index: i32) -> Self {
        match usize::try_from(index) {
            Ok(index) => Key::Index(index),
            Err(_) => Key::Name(Rc::from(index.to_string())),
        }
    }
}
