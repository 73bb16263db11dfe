//! Entity shapes shared by every component. All entities are tagged records keyed by
//! `key`/`kind`; references between entities are string keys, never
//! in-memory pointers, so sub-stores stay arena-indexed and serializable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub key: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_sub: Option<String>,
}

pub const DEFAULT_USER_KEY: &str = "default";

impl User {
    pub fn default_singleton() -> Self {
        User {
            key: DEFAULT_USER_KEY.to_string(),
            name: "Default User".to_string(),
            email: "default@localhost".to_string(),
            provider: None,
            picture: None,
            provider_sub: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Commenter,
    Writer,
    Owner,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PermissionType {
    User,
    Group,
    Anyone,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    pub key: String,
    #[serde(rename = "type")]
    pub perm_type: PermissionType,
    /// Present when `perm_type == User | Group`; absent for `Anyone`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub adding_user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<i64>,
}

impl Permission {
    pub fn is_expired(&self, now_unix_ms: i64) -> bool {
        matches!(self.expiration_time, Some(exp) if exp <= now_unix_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct File {
    pub key: String,
    pub kind: String,
    /// Ancestor keys, nearest-last: `parents[parents.len()-1]` is the direct parent.
    #[serde(default)]
    pub parents: Vec<String>,
    pub owner: String,
    #[serde(default)]
    pub permission_ids: Vec<String>,
    pub created: i64,
    pub updated: i64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub info: Value,
    /// Permissions named by `permission_ids`, hydrated at read time by the
    /// `Files` store; never persisted on the file record itself.
    #[serde(default, skip_serializing, skip_deserializing)]
    pub attached_permissions: Vec<Permission>,
}

impl File {
    pub fn direct_parent(&self) -> Option<&str> {
        self.parents.last().map(String::as_str)
    }

    /// Ancestor chain, nearest first (reverse of storage order), for
    /// `AccessControl::resolve` walking up toward the root.
    pub fn ancestors_nearest_first(&self) -> impl Iterator<Item = &str> {
        self.parents.iter().rev().map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectContents {
    pub key: String,
    #[serde(default)]
    pub deleted: bool,
    pub document: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Modification {
    pub user: String,
    pub time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Revision {
    pub key: String,
    pub kind: String,
    pub id: String,
    pub created: i64,
    #[serde(default)]
    pub deleted: bool,
    pub patch: Value,
    pub modification: Modification,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryType {
    User,
    Space,
    Project,
    Request,
    App,
}

impl HistoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryType::User => "user",
            HistoryType::Space => "space",
            HistoryType::Project => "project",
            HistoryType::Request => "request",
            HistoryType::App => "app",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub key: String,
    pub user: String,
    pub created: i64,
    pub log: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinEntry {
    pub key: String,
    pub deleted_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SharedEntry {
    pub target_key: String,
    pub user_key: String,
    pub kind: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

/// `{authenticated:false, state?, nonce?}` or `{authenticated:true, uid}`.
/// `authenticated` is a JSON boolean, not a string tag, so this is
/// (de)serialized by hand instead of via `#[serde(tag = ...)]`, which only
/// dispatches on string tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Unauthenticated { state: Option<String>, nonce: Option<String> },
    Authenticated { uid: String },
}

impl Session {
    pub fn uid(&self) -> Option<&str> {
        match self {
            Session::Authenticated { uid } => Some(uid),
            Session::Unauthenticated { .. } => None,
        }
    }
}

impl Serialize for Session {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        match self {
            Session::Unauthenticated { state, nonce } => {
                let mut s = serializer.serialize_struct("Session", 3)?;
                s.serialize_field("authenticated", &false)?;
                s.serialize_field("state", state)?;
                s.serialize_field("nonce", nonce)?;
                s.end()
            }
            Session::Authenticated { uid } => {
                let mut s = serializer.serialize_struct("Session", 2)?;
                s.serialize_field("authenticated", &true)?;
                s.serialize_field("uid", uid)?;
                s.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Session {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let authenticated = value
            .get("authenticated")
            .and_then(Value::as_bool)
            .ok_or_else(|| serde::de::Error::missing_field("authenticated"))?;
        if authenticated {
            let uid = value
                .get("uid")
                .and_then(Value::as_str)
                .ok_or_else(|| serde::de::Error::missing_field("uid"))?
                .to_string();
            Ok(Session::Authenticated { uid })
        } else {
            let state = value.get("state").and_then(Value::as_str).map(str::to_string);
            let nonce = value.get("nonce").and_then(Value::as_str).map(str::to_string);
            Ok(Session::Unauthenticated { state, nonce })
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EventOperation {
    Created,
    Patch,
    Deleted,
    AccessChange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub operation: EventOperation,
    pub kind: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Event {
    pub fn new(operation: EventOperation, kind: impl Into<String>, id: impl Into<String>, data: Option<Value>) -> Self {
        Event { event_type: "event", operation, kind: kind.into(), id: id.into(), data }
    }
}
