use serde::{Deserialize, Serialize};

/// Canonical column order of the delimited log, legacy and export alike.
pub const EXPECTED_HEADER: [&str; 8] = [
    "Timestamp",
    "Event",
    "File Path",
    "Domain",
    "File Size",
    "File Type",
    "Download URL",
    "Is Duplicate",
];

pub const URL_NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Moved,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Moved => write!(f, "Moved"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Created" | "created" => Ok(Self::Created),
            "Moved" | "moved" => Ok(Self::Moved),
            _ => Err(format!("unknown event kind: {s}")),
        }
    }
}

/// Duplicate marker as accepted from callers and legacy logs.
///
/// Truthy inputs are `true`, `"yes"`, `"true"` and `"1"` (case-insensitive);
/// everything else is falsy. Externally it always reads `Yes`/`No`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DuplicateFlag(bool);

impl DuplicateFlag {
    pub fn is_set(self) -> bool {
        self.0
    }

    pub fn as_label(self) -> &'static str {
        if self.0 {
            "Yes"
        } else {
            "No"
        }
    }
}

impl From<bool> for DuplicateFlag {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

impl From<&str> for DuplicateFlag {
    fn from(value: &str) -> Self {
        let lowered = value.trim().to_ascii_lowercase();
        Self(matches!(lowered.as_str(), "yes" | "true" | "1"))
    }
}

impl From<i64> for DuplicateFlag {
    fn from(value: i64) -> Self {
        Self(value != 0)
    }
}

/// One immutable row of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRecord {
    pub id: i64,
    pub timestamp: String,
    pub event: EventKind,
    pub file_path: String,
    pub domain: String,
    pub file_size: Option<i64>,
    pub file_type: String,
    pub download_url: String,
    pub is_duplicate: bool,
}

impl InsightRecord {
    pub fn duplicate_label(&self) -> &'static str {
        DuplicateFlag::from(self.is_duplicate).as_label()
    }
}

/// A record as it appears in the delimited format, column for column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Event")]
    pub event: String,
    #[serde(rename = "File Path")]
    pub file_path: String,
    #[serde(rename = "Domain")]
    pub domain: String,
    #[serde(rename = "File Size")]
    pub file_size: String,
    #[serde(rename = "File Type")]
    pub file_type: String,
    #[serde(rename = "Download URL")]
    pub download_url: String,
    #[serde(rename = "Is Duplicate")]
    pub is_duplicate: String,
}

impl From<&InsightRecord> for InsightRow {
    fn from(record: &InsightRecord) -> Self {
        Self {
            timestamp: record.timestamp.clone(),
            event: record.event.to_string(),
            file_path: record.file_path.clone(),
            domain: record.domain.clone(),
            file_size: record
                .file_size
                .map(|size| size.to_string())
                .unwrap_or_default(),
            file_type: record.file_type.clone(),
            download_url: record.download_url.clone(),
            is_duplicate: record.duplicate_label().to_string(),
        }
    }
}
