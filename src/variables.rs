use {
    crate::{config::Config, error::Result},
    serde::{Deserialize, Serialize},
    std::{fmt, ops::AddAssign},
};

/// An ordered set of variable names.
///
/// Semantically a set (no duplicates); order only affects display and the
/// layout of fields derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSet {
    names: Vec<String>,
}

impl VariableSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vars = VariableSet::default();
        for name in names {
            vars.push(name.into());
        }
        vars
    }

    /// Reads a list-of-names entry from the configuration.
    pub fn from_config(config: &Config, key: &str) -> Result<Self> {
        Ok(VariableSet::new(config.get_str_list(key)?))
    }

    pub fn push(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.has(&name) {
            self.names.push(name);
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl AddAssign<&VariableSet> for VariableSet {
    fn add_assign(&mut self, rhs: &VariableSet) {
        for name in rhs.iter() {
            self.push(name);
        }
    }
}

impl fmt::Display for VariableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names.join(", "))
    }
}
