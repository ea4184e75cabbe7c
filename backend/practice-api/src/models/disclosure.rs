use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisclosureKind {
    Hint,
    Solution,
}

impl DisclosureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisclosureKind::Hint => "hint",
            DisclosureKind::Solution => "solution",
        }
    }
}

/// Why a disclosure happened: the student asked, or a terminal transition
/// forced the solution open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisclosureTrigger {
    Requested,
    Forced,
}

impl DisclosureTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisclosureTrigger::Requested => "requested",
            DisclosureTrigger::Forced => "forced",
        }
    }
}
