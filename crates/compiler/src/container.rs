//! Container-scoped name resolution.
//!
//! A reference to `x.y.z` inside container `a.b` resolves against the
//! candidates `a.b.x.y.z`, `a.x.y.z`, `x.y.z`, first match winning. A name
//! with a leading dot is absolute. Host-declared abbreviations expand after
//! explicit qualification.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Container {
    name: String,
    abbreviations: HashMap<String, String>,
}

impl Container {
    pub fn root() -> Container {
        Container::default()
    }

    pub fn new(name: impl Into<String>) -> Container {
        Container {
            name: name.into(),
            abbreviations: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers `alias` as an abbreviation for `qualified`.
    pub fn add_abbreviation(
        &mut self,
        alias: impl Into<String>,
        qualified: impl Into<String>,
    ) {
        self.abbreviations.insert(alias.into(), qualified.into());
    }

    /// Resolution candidates, most qualified first.
    pub fn candidates(&self, name: &str) -> Vec<String> {
        if let Some(absolute) = name.strip_prefix('.') {
            return vec![absolute.to_string()];
        }
        let mut out = Vec::new();
        if !self.name.is_empty() {
            let mut prefix = self.name.as_str();
            loop {
                out.push(format!("{prefix}.{name}"));
                match prefix.rfind('.') {
                    Some(i) => prefix = &prefix[..i],
                    None => break,
                }
            }
        }
        out.push(name.to_string());
        // Abbreviations resolve after explicit qualification.
        let first_segment = name.split('.').next().unwrap_or(name);
        if let Some(expansion) = self.abbreviations.get(first_segment) {
            let rest = &name[first_segment.len()..];
            out.push(format!("{expansion}{rest}"));
        }
        out
    }
}
