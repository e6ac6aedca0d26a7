use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Named counters bumped by passes. Nothing is recorded while disabled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    enabled: bool,
    counters: BTreeMap<String, usize>,
}

impl Statistics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            counters: BTreeMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn add(&mut self, name: &str, by: usize) {
        if self.enabled {
            *self.counters.entry(name.to_string()).or_insert(0) += by;
        }
    }

    pub fn get(&self, name: &str) -> usize {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counters.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl Display for Statistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== statistics ===")?;
        for (name, value) in self.iter() {
            writeln!(f, "{value:>8} {name}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_statistics_record_nothing() {
        let mut stats = Statistics::new(false);
        stats.add("cse.eliminated", 3);
        assert!(stats.is_empty());
        assert_eq!(stats.get("cse.eliminated"), 0);
    }

    #[test]
    fn test_statistics_are_sorted() {
        let mut stats = Statistics::new(true);
        stats.add("dce.removed", 2);
        stats.add("cse.eliminated", 1);
        stats.add("dce.removed", 1);
        assert_eq!(stats.get("dce.removed"), 3);
        let rendered = stats.to_string();
        let cse = rendered.find("cse.eliminated").unwrap();
        let dce = rendered.find("dce.removed").unwrap();
        assert!(cse < dce);
        assert!(rendered.contains("       3 dce.removed"));
    }
}
