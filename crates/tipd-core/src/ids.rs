use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one mounted tooltip instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TooltipId(String);

impl TooltipId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TooltipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TooltipId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Hands out stable instance ids.
///
/// A caller-supplied id is used verbatim; otherwise ids are `tooltip-1`,
/// `tooltip-2`, ... for the lifetime of the generator.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, requested: Option<&str>) -> TooltipId {
        match requested {
            Some(id) if !id.trim().is_empty() => TooltipId::new(id),
            _ => {
                self.next += 1;
                TooltipId::new(format!("tooltip-{}", self.next))
            }
        }
    }
}
