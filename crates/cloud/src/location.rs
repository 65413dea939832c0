//! Logical container paths.
//!
//! Results are addressed as `"<container>/<path>"`. The first segment is the
//! container; anything after it becomes a prefix on every blob name.

use std::fmt;

/// A container plus an optional blob-name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPath {
    container: String,
    prefix: Option<String>,
}

impl ContainerPath {
    /// Split `"container/a/b"` into container `container` and prefix `a/b`.
    /// Leading, trailing and repeated slashes are ignored.
    pub fn parse(path: &str) -> Self {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let container = segments.next().unwrap_or_default().to_string();
        let rest: Vec<&str> = segments.collect();
        let prefix = if rest.is_empty() {
            None
        } else {
            Some(rest.join("/"))
        };
        Self { container, prefix }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Full blob name for `name` inside this path.
    pub fn blob_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{name}"),
            None => name.to_string(),
        }
    }
}

impl fmt::Display for ContainerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}/{prefix}", self.container),
            None => f.write_str(&self.container),
        }
    }
}
