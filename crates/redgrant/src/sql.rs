//! SQL quoting helpers.

use std::fmt;

/// A Redshift identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes, so
/// reserved words like `user`, `group` or `table` are safe as names.
///
/// # Example
/// ```
/// use redgrant::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// A schema-qualified name, rendered as `"schema"."name"`.
pub struct Qualified<'a> {
    pub schema: Option<&'a str>,
    pub name: &'a str,
}

impl fmt::Display for Qualified<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = self.schema {
            write!(f, "{}.", Ident(schema))?;
        }
        write!(f, "{}", Ident(self.name))
    }
}
