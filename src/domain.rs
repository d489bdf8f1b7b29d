//! Closed vocabularies of the domain: roles, visibility, synthesis targets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub const ALL: [&'static str; 2] = ["user", "admin"];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A realm member's rights. Owners are not members; they hold every right.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Member,
    Editor,
}

impl MemberRole {
    pub const ALL: [&'static str; 2] = ["member", "editor"];

    pub fn as_str(self) -> &'static str {
        match self {
            MemberRole::Member => "member",
            MemberRole::Editor => "editor",
        }
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(MemberRole::Member),
            "editor" => Ok(MemberRole::Editor),
            other => Err(format!("unknown member role: {}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Realm,
    Public,
}

impl Visibility {
    pub const ALL: [&'static str; 3] = ["private", "realm", "public"];
}

/// What a synthesis annotates. Stored as the `polymorphic_type` / `polymorphic_id` column pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SynthesisTarget {
    Signal(String),
    Cluster(String),
}

impl SynthesisTarget {
    pub const KINDS: [&'static str; 2] = ["signal", "cluster"];

    pub fn from_parts(kind: &str, id: &str) -> Option<Self> {
        match kind {
            "signal" => Some(SynthesisTarget::Signal(id.to_string())),
            "cluster" => Some(SynthesisTarget::Cluster(id.to_string())),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SynthesisTarget::Signal(_) => "signal",
            SynthesisTarget::Cluster(_) => "cluster",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SynthesisTarget::Signal(id) | SynthesisTarget::Cluster(id) => id,
        }
    }

    /// Table holding the target row.
    pub fn table(&self) -> &'static str {
        match self {
            SynthesisTarget::Signal(_) => "signals",
            SynthesisTarget::Cluster(_) => "clusters",
        }
    }
}

impl fmt::Display for SynthesisTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}
