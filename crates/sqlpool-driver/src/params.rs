//! Named statement parameters.
//!
//! Statements reference parameters by name (`@id`, `:id`, `$id`, whatever the
//! driver's dialect uses). The pool layers never inspect them; they are
//! handed to the driver untouched.
//!
//! ```rust
//! use sqlpool_driver::{NamedParam, SqlValue};
//!
//! let params = [NamedParam::new("id", 42), NamedParam::new("name", "Alice")];
//! assert_eq!(params[0].value, SqlValue::Int(42));
//! ```

use crate::value::SqlValue;

/// A named statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedParam {
    /// Parameter name (without dialect prefix).
    pub name: String,
    /// Parameter value.
    pub value: SqlValue,
}

impl NamedParam {
    /// Create a new named parameter.
    pub fn new<S: Into<String>, V: Into<SqlValue>>(name: S, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Create a NULL parameter.
    pub fn null<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            value: SqlValue::Null,
        }
    }
}

/// Look up a parameter by name.
#[must_use]
pub fn find<'a>(params: &'a [NamedParam], name: &str) -> Option<&'a SqlValue> {
    params.iter().find(|p| p.name == name).map(|p| &p.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_name() {
        let params = [NamedParam::new("a", 1), NamedParam::null("b")];
        assert_eq!(find(&params, "a"), Some(&SqlValue::Int(1)));
        assert_eq!(find(&params, "b"), Some(&SqlValue::Null));
        assert_eq!(find(&params, "c"), None);
    }
}
