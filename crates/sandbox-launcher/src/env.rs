//! Immutable snapshot of the launcher's environment.
//!
//! The environment is captured once at startup. Later stages read from the
//! snapshot rather than the process environment, and the variables the
//! policy consumes are stripped from the copy handed to the target command.

use std::collections::BTreeMap;
use std::env;
use std::ffi::{OsStr, OsString};

/// Environment variables captured at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<OsString, OsString>,
}

impl EnvSnapshot {
    /// Captures the current process environment.
    #[must_use]
    pub fn capture() -> Self {
        env::vars_os().collect()
    }

    /// Returns the value of `key`, distinguishing absence from emptiness.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.vars.get(OsStr::new(key)).map(OsString::as_os_str)
    }

    /// Returns true when `key` is present, even with an empty value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(OsStr::new(key))
    }

    /// Returns a copy of the snapshot with `keys` removed.
    #[must_use]
    pub fn without<'a, I>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut vars = self.vars.clone();
        for key in keys {
            let _ = vars.remove(OsStr::new(key));
        }
        Self { vars }
    }

    /// Iterates over the captured variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars
            .iter()
            .map(|(key, value)| (key.as_os_str(), value.as_os_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for EnvSnapshot
where
    K: Into<OsString>,
    V: Into<OsString>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}
