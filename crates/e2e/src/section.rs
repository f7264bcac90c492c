//! The two fixed test sections and their suite order

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two fixed test groupings. `Auth` exercises the extension
/// against a server that believes the user is logged in; `NoAuth` runs the
/// anonymous path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestSection {
    Auth,
    NoAuth,
}

impl TestSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestSection::Auth => "auth",
            TestSection::NoAuth => "noauth",
        }
    }
}

impl fmt::Display for TestSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The order the suite runs its sections in.
pub fn default_sections() -> [TestSection; 2] {
    [TestSection::Auth, TestSection::NoAuth]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_run_auth_then_noauth() {
        assert_eq!(default_sections(), [TestSection::Auth, TestSection::NoAuth]);
    }

    #[test]
    fn section_labels_match_suite_directories() {
        assert_eq!(TestSection::Auth.as_str(), "auth");
        assert_eq!(TestSection::NoAuth.as_str(), "noauth");
    }
}
