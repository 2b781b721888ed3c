//! Plugin kind and container-level naming.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Family a dynamically loaded plugin belongs to. Each kind has its own
/// directory under the plugin home.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Reader,
    Writer,
    Transformer,
}

impl PluginKind {
    pub const ALL: [PluginKind; 3] = [Self::Reader, Self::Writer, Self::Transformer];

    /// Directory name under the plugin home.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Writer => "writer",
            Self::Transformer => "transformer",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reader" => Ok(Self::Reader),
            "writer" => Ok(Self::Writer),
            "transformer" => Ok(Self::Transformer),
            other => Err(format!("unknown plugin kind '{other}'")),
        }
    }
}

/// Which half of an adapter is being instantiated: the job-level planner or
/// the per-task worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Job,
    Task,
}

impl ContainerKind {
    /// Suffix appended to an adapter entry name.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Job => "Job",
            Self::Task => "Task",
        }
    }

    /// Concrete symbol for an adapter entry, e.g. `mysqlreader$Task`.
    #[must_use]
    pub fn entry_symbol(self, entry: &str) -> String {
        format!("{entry}${}", self.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_symbol_appends_suffix() {
        assert_eq!(ContainerKind::Job.entry_symbol("demo"), "demo$Job");
        assert_eq!(ContainerKind::Task.entry_symbol("demo"), "demo$Task");
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Writer".parse::<PluginKind>().unwrap(), PluginKind::Writer);
        assert!("loader".parse::<PluginKind>().is_err());
    }
}
