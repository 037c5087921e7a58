use serde::{Deserialize, Serialize};

use crate::domain::request::Division;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Hr,
    Rpm,
    Pic,
    Qc,
    Ops,
    TopManagement,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hr => "hr",
            Self::Rpm => "rpm",
            Self::Pic => "pic",
            Self::Qc => "qc",
            Self::Ops => "ops",
            Self::TopManagement => "top_management",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hr" => Some(Self::Hr),
            "rpm" => Some(Self::Rpm),
            "pic" => Some(Self::Pic),
            "qc" => Some(Self::Qc),
            "ops" => Some(Self::Ops),
            "top_management" | "top management" => Some(Self::TopManagement),
            _ => None,
        }
    }
}

/// Identity supplied by the external auth collaborator. Read-only from
/// the engine's perspective.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub division: Division,
}

/// Normalized key for the legacy display-name matching between requests
/// and the users who act on them.
pub fn name_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
