use {
    crate::error::{Error, Result},
    chrono::{DateTime, Utc},
    serde_yaml::Value,
    std::{fmt, fs::File, path::Path},
};

/// Hierarchical, read-only configuration.
///
/// Thin wrapper over a YAML value tree. Keys are dotted paths whose segments
/// index nested mappings (`"soca increments.template"` looks up `template`
/// inside the `soca increments` mapping). Every accessor either succeeds or
/// returns a fatal [`Error::Config`]; there are no defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    root: Value,
}

impl Config {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let root = serde_yaml::from_reader(file).map_err(|e| Error::Format {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Config { root })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let root = serde_yaml::from_str(yaml).map_err(|e| Error::Config {
            key: String::new(),
            reason: e.to_string(),
        })?;
        Ok(Config { root })
    }

    pub fn from_value(root: Value) -> Self {
        Config { root }
    }

    pub fn value(&self) -> &Value {
        &self.root
    }

    pub fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    pub fn get_str(&self, key: &str) -> Result<String> {
        match self.lookup(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(Error::config(key, "expected a string")),
            None => Err(Error::config(key, "missing key")),
        }
    }

    pub fn get_usize(&self, key: &str) -> Result<usize> {
        match self.lookup(key) {
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| Error::config(key, "expected a non-negative integer")),
            Some(_) => Err(Error::config(key, "expected a non-negative integer")),
            None => Err(Error::config(key, "missing key")),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.lookup(key) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(Error::config(key, "expected a boolean")),
            None => Err(Error::config(key, "missing key")),
        }
    }

    pub fn get_str_list(&self, key: &str) -> Result<Vec<String>> {
        let seq = match self.lookup(key) {
            Some(Value::Sequence(xs)) => xs,
            Some(_) => return Err(Error::config(key, "expected a list of strings")),
            None => return Err(Error::config(key, "missing key")),
        };
        seq.iter()
            .map(|x| match x {
                Value::String(s) => Ok(s.clone()),
                _ => Err(Error::config(key, "expected a list of strings")),
            })
            .collect()
    }

    /// Mapping of variable name to scalar, e.g. per-variable coefficients.
    pub fn get_f64_map(&self, key: &str) -> Result<Vec<(String, f64)>> {
        let map = match self.lookup(key) {
            Some(Value::Mapping(m)) => m,
            Some(_) => return Err(Error::config(key, "expected a name-to-number mapping")),
            None => return Err(Error::config(key, "missing key")),
        };
        map.iter()
            .map(|(k, v)| match (k, v) {
                (Value::String(name), Value::Number(n)) => n
                    .as_f64()
                    .map(|x| (name.clone(), x))
                    .ok_or_else(|| Error::config(key, "expected a name-to-number mapping")),
                _ => Err(Error::config(key, "expected a name-to-number mapping")),
            })
            .collect()
    }

    pub fn get_date(&self, key: &str) -> Result<DateTime<Utc>> {
        let s = self.get_str(key)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| Error::Date {
                value: s,
                reason: e.to_string(),
            })
    }

    /// Extracts a sub-configuration as an owned tree.
    pub fn sub(&self, key: &str) -> Result<Config> {
        match self.lookup(key) {
            Some(v @ Value::Mapping(_)) => Ok(Config { root: v.clone() }),
            Some(_) => Err(Error::config(key, "expected a sub-configuration")),
            None => Err(Error::config(key, "missing key")),
        }
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        let mut node = &self.root;
        for part in key.split('.') {
            node = match node {
                Value::Mapping(m) => m.get(&Value::String(part.to_string()))?,
                _ => return None,
            };
        }
        Some(node)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_yaml::to_string(&self.root) {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("<unprintable configuration>"),
        }
    }
}
