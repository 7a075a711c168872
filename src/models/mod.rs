use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashMap;

/// Default length for generated (non-custom) short codes
pub const GENERATED_CODE_LENGTH: usize = 7;

/// Current time as unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a random alphanumeric short code
pub fn generate_code() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), GENERATED_CODE_LENGTH)
}

/// A tag attached to a link or QR code, duplicated by value so that
/// read paths stay single-lookup
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct TagRef {
    pub tag_id: i64,
    pub tag_name: String,
}

/// An owner-scoped label; name is unique per owner
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
}

/// A short code mapped to a destination URL
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Link {
    pub id: i64,
    pub owner_id: String,
    pub code: String,
    pub is_custom_code: bool,
    pub destination: String,
    pub title: String,
    /// Code of the QR code this link was created alongside, if any
    pub qr_code_ref: Option<String>,
    /// True when the link exists only to host a QR code's destination;
    /// traffic on it is attributed to the QR code as scans
    pub is_qr_hosting: bool,
    pub clicks: i64,
    pub created_at: i64,
    #[sqlx(skip)]
    pub tags: Vec<TagRef>,
}

/// A generated QR code with the same redirect/analytics surface as a link
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QrCode {
    pub id: i64,
    pub owner_id: String,
    pub code: String,
    pub destination: String,
    pub title: String,
    /// Code of the link exposing the same destination as a plain short URL
    pub attached_link_code: Option<String>,
    /// Opaque styling options, stored verbatim
    pub styling: Option<String>,
    pub scans: i64,
    pub created_at: i64,
    #[sqlx(skip)]
    pub tags: Vec<TagRef>,
}

/// Input for creating a link
#[derive(Debug, Clone)]
pub struct NewLink {
    pub owner_id: String,
    /// Caller-chosen code; when None a random code is generated
    pub custom_code: Option<String>,
    pub destination: String,
    pub title: String,
    pub qr_code_ref: Option<String>,
    pub is_qr_hosting: bool,
    pub tags: Vec<TagRef>,
}

/// Input for creating a QR code
#[derive(Debug, Clone)]
pub struct NewQrCode {
    pub owner_id: String,
    pub custom_code: Option<String>,
    pub destination: String,
    pub title: String,
    pub attached_link_code: Option<String>,
    pub styling: Option<String>,
    pub tags: Vec<TagRef>,
}

/// The entity a click event is attributed to, resolved once per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
    Link(String),
    QrCode(String),
}

impl ClickTarget {
    pub fn code(&self) -> &str {
        match self {
            ClickTarget::Link(code) | ClickTarget::QrCode(code) => code,
        }
    }
}

/// Raw traffic fields as supplied by the request-routing layer.
/// This type never touches HTTP parsing itself.
#[derive(Debug, Clone, Default)]
pub struct RawClick {
    pub address: String,
    pub user_agent: String,
    pub referrer: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub path: Option<String>,
    pub query_params: HashMap<String, String>,
}

/// An enriched click/scan event ready to be appended
#[derive(Debug, Clone)]
pub struct NewClickEvent {
    pub address: String,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub referrer: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub path: Option<String>,
    pub query_params: HashMap<String, String>,
    pub created_at: i64,
}

/// An immutable stored click/scan event
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClickEvent {
    pub id: i64,
    pub address: String,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub referrer: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub path: Option<String>,
    pub query_params: Json<HashMap<String, String>>,
    pub created_at: i64,
}

/// Persisted rate-limit state for one identifier
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RateLimitRecord {
    pub identifier: String,
    pub attempts: i64,
    pub last_attempt_at: i64,
    pub blocked_until: Option<i64>,
}
