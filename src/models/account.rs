use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guardian,
    Subject,
    Provider,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guardian => "guardian",
            Role::Subject => "subject",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "guardian" => Some(Role::Guardian),
            "subject" => Some(Role::Subject),
            "provider" => Some(Role::Provider),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Only guardians and self-service subjects may book through chat.
    pub fn can_book(&self) -> bool {
        matches!(self, Role::Guardian | Role::Subject)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub first_name: Option<String>,
}

/// The person an appointment is for: the account holder or one of their dependents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subject {
    pub id: i64,
    pub account_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
}

impl Subject {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}
