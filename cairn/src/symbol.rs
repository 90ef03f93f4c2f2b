use std::fmt;

use once_cell::sync::Lazy;

static INTERNER: Lazy<lasso::ThreadedRodeo> = Lazy::new(lasso::ThreadedRodeo::default);

/// An interned name. Variable, state, method and parser names are all symbols,
/// so comparing and hashing them is cheap.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(lasso::Spur);

impl Symbol {
    pub fn intern(sym: impl AsRef<str>) -> Self {
        Self(INTERNER.get_or_intern(sym))
    }

    pub fn intern_static(sym: &'static str) -> Self {
        Self(INTERNER.get_or_intern_static(sym))
    }

    pub fn resolve(&self) -> &'static str {
        INTERNER.resolve(&self.0)
    }

    /// Returns a symbol that has not been interned before, formed by
    /// prepending `prefix` to `base` until it no longer matches `is_taken`.
    pub fn fresh(prefix: &str, base: &str, is_taken: impl Fn(&str) -> bool) -> Symbol {
        let mut name = format!("{prefix}{base}");
        while is_taken(&name) {
            name.insert_str(0, prefix);
        }
        Symbol::intern(name)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        self.resolve()
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resolve())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resolve())
    }
}
