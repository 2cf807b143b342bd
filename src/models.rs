use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Available,
    Limited,
    Unavailable,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Available => "AVAILABLE",
            Status::Limited => "LIMITED",
            Status::Unavailable => "UNAVAILABLE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "AVAILABLE" => Some(Status::Available),
            "LIMITED" => Some(Status::Limited),
            "UNAVAILABLE" => Some(Status::Unavailable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    CaseManager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::CaseManager => "CASE_MANAGER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CASE_MANAGER" => Some(Role::CaseManager),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// One day/hours pair inside `contactDetails.hours`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoursEntry {
    pub day: String,
    pub hours: String,
}

/// Semi-structured contact blob persisted as JSON. Field names are part of
/// the stored-data contract; absent fields collapse to empty values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactDetails {
    pub address: String,
    pub phone: String,
    pub email: String,
    pub website: String,
    pub description: String,
    pub services: Vec<String>,
    pub eligibility: Vec<String>,
    pub hours: Vec<HoursEntry>,
}

/// Partial-update DTO for `contactDetails`. Only keys present in the payload
/// are applied; supplied lists replace the stored list wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactDetailsPatch {
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub services: Option<Vec<String>>,
    pub eligibility: Option<Vec<String>>,
    pub hours: Option<Vec<HoursEntry>>,
}

impl ContactDetailsPatch {
    pub fn apply_to(self, details: &mut ContactDetails) {
        if let Some(address) = self.address {
            details.address = address;
        }
        if let Some(phone) = self.phone {
            details.phone = phone;
        }
        if let Some(email) = self.email {
            details.email = email;
        }
        if let Some(website) = self.website {
            details.website = website;
        }
        if let Some(description) = self.description {
            details.description = description;
        }
        if let Some(services) = self.services {
            details.services = services;
        }
        if let Some(eligibility) = self.eligibility {
            details.eligibility = eligibility;
        }
        if let Some(hours) = self.hours {
            details.hours = hours;
        }
    }
}

/// One entry in a resource's append-only notes log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub status: Status,
    pub contact_details: ContactDetails,
    pub notes: Vec<Note>,
    pub zipcode: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Wire shape for a user; never carries the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourceRequest {
    pub name: String,
    pub category: String,
    pub zipcode: String,
    #[serde(default)]
    pub status: Option<Status>,
    /// Accepted as an object or a JSON-encoded string; anything else falls
    /// back to `{"address": ""}`.
    #[serde(default)]
    pub contact_details: Option<Value>,
}

/// A candidate record for bulk creation, either extracted from HTML or
/// submitted pre-extracted through the import endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportCandidate {
    pub name: String,
    pub category: String,
    pub address: String,
    pub phone: String,
    pub website: String,
    pub description: String,
    pub city: String,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportItemError {
    pub index: usize,
    pub message: String,
    pub record: ImportCandidate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCreateOutcome {
    pub created_count: usize,
    pub errors: Vec<ImportItemError>,
}

/// Combined mutation request for `PUT /resources/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdatePatch {
    pub status: Option<Status>,
    pub contact_details: Option<Value>,
    pub note_content: Option<String>,
    pub suggest_removal: Option<bool>,
    pub expected_version: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePage {
    pub items: Vec<Resource>,
    pub page: u32,
    pub total_pages: u32,
    pub total_count: u64,
}
