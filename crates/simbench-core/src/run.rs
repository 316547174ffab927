//! Run configurations: one parameterized invocation of the simulation executable.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Flag that directs the executable's artifacts into a directory.
pub const OUTPUT_FLAG: &str = "--output";

/// A single command-line flag, with an optional value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flag {
    pub name: String,
    pub value: Option<String>,
}

impl Flag {
    /// A flag followed by a value (`--tlog 1000`).
    pub fn valued(name: impl Into<String>, value: impl ToString) -> Self {
        Self {
            name: name.into(),
            value: Some(value.to_string()),
        }
    }

    /// A bare switch (`--test-performance`).
    pub fn switch(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

/// Identity of a run within its batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RunIdentity {
    /// 1-based repetition index.
    Sequence(usize),

    /// Label encoding the swept parameter, e.g. `benchmark-250`.
    Label(String),
}

impl RunIdentity {
    /// Human-readable label; repetitions render as `run-<n>`.
    pub fn label(&self) -> String {
        match self {
            RunIdentity::Sequence(n) => format!("run-{n}"),
            RunIdentity::Label(label) => label.clone(),
        }
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Immutable invocation request for the simulation executable.
///
/// The output directory is always passed first as `--output <dir>`, followed by the
/// remaining flags in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunConfiguration {
    identity: RunIdentity,
    output_dir: PathBuf,
    flags: Vec<Flag>,
}

impl RunConfiguration {
    pub fn new(identity: RunIdentity, output_dir: impl Into<PathBuf>, flags: Vec<Flag>) -> Self {
        Self {
            identity,
            output_dir: output_dir.into(),
            flags,
        }
    }

    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    pub fn label(&self) -> String {
        self.identity.label()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    /// Value of the first flag called `name`, if present and valued.
    pub fn flag_value(&self, name: &str) -> Option<&str> {
        self.flags
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.value.as_deref())
    }

    /// Full argument vector handed to the executable.
    pub fn argv(&self) -> Vec<OsString> {
        let mut argv = Vec::with_capacity(2 + self.flags.len() * 2);
        argv.push(OsString::from(OUTPUT_FLAG));
        argv.push(self.output_dir.clone().into_os_string());
        for flag in &self.flags {
            argv.push(OsString::from(&flag.name));
            if let Some(value) = &flag.value {
                argv.push(OsString::from(value));
            }
        }
        argv
    }

    /// Argument vector rendered for logs and reports.
    pub fn display_args(&self) -> Vec<String> {
        self.argv()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}
