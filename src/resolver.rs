use {crate::config::Config, serde_yaml::Value};

/// Resolves the templated input configuration for one ensemble member.
///
/// An empty pattern means the single-increment mode: the template is
/// returned unchanged. Otherwise every occurrence of `pattern` inside the
/// template's string values is replaced with the decimal member index. The
/// template itself is never mutated; it is reused across members.
pub fn resolve(template: &Config, pattern: &str, member: usize) -> Config {
    if pattern.is_empty() {
        return template.clone();
    }
    let replacement = member.to_string();
    Config::from_value(substitute(template.value(), pattern, &replacement))
}

fn substitute(value: &Value, pattern: &str, replacement: &str) -> Value {
    match value {
        Value::String(s) => Value::String(swap_pattern(s, pattern, replacement)),
        Value::Sequence(xs) => Value::Sequence(
            xs.iter()
                .map(|x| substitute(x, pattern, replacement))
                .collect(),
        ),
        Value::Mapping(m) => Value::Mapping(
            m.iter()
                .map(|(k, v)| (k.clone(), substitute(v, pattern, replacement)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Replaces every occurrence of `pattern` in `input` with `replacement`.
///
/// The scan resumes after each inserted replacement, so occurrences of the
/// pattern inside the replacement text are left alone (no recursive
/// expansion). Plain substring matching, not a regex.
pub fn swap_pattern(input: &str, pattern: &str, replacement: &str) -> String {
    if pattern.is_empty() {
        return input.to_string();
    }
    let mut result = input.to_string();
    let mut start = 0;
    while let Some(pos) = result[start..].find(pattern) {
        let pos = start + pos;
        result.replace_range(pos..pos + pattern.len(), replacement);
        start = pos + replacement.len();
    }
    result
}
