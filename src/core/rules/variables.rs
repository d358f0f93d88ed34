use indexmap::IndexMap;
use regex::{Captures, Regex};
use tracing::warn;

/// Templates starting with this prefix are evaluated as queries against the event snapshot.
pub const QUERY_PREFIX: &str = "$expr:";

/// Case-insensitive string variables for one invocation.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct VariableTable {
    values: IndexMap<String, String>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(normalize(name), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&normalize(name)).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.shift_remove(&normalize(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(&normalize(name))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Case-insensitive pattern matching `$name$` for every defined name.
    fn token_pattern(&self) -> Option<Regex> {
        let names: Vec<String> = self
            .values
            .keys()
            .filter(|name| !name.is_empty())
            .map(|name| regex::escape(name))
            .collect();
        if names.is_empty() {
            return None;
        }
        match Regex::new(&format!(r"(?i)\$({})\$", names.join("|"))) {
            Ok(regex) => Some(regex),
            Err(err) => {
                warn!("variable names do not form a valid pattern: {}", err);
                None
            }
        }
    }

    pub fn extend<'a, I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (name, value) in entries {
            self.set(name, value.clone());
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Query body when `template` carries the query prefix.
pub fn query_body(template: &str) -> Option<&str> {
    template.trim_start().strip_prefix(QUERY_PREFIX).map(str::trim)
}

/// Replace every `$name$` token whose name is defined. Unknown tokens stay as written.
pub fn substitute(template: &str, table: &VariableTable) -> String {
    if !template.contains('$') {
        return template.to_string();
    }
    let Some(pattern) = table.token_pattern() else {
        return template.to_string();
    };
    pattern
        .replace_all(template, |caps: &Captures| match table.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render a query result as the text that replaces the template.
pub fn render_query_result(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::Null => return String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let trimmed = text.trim();
    if trimmed == "null" {
        return String::new();
    }
    trimmed.trim_matches('"').to_string()
}
