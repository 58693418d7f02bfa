use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictPair {
    pub proposed_id: String,
    pub existing_id: String,
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("malformed date: {0}")]
    MalformedDate(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("unresolved overlap between shifts [{}]; resubmit with an explicit policy", all_ids(.pairs))]
    UnresolvedOverlap { pairs: Vec<ConflictPair> },
    #[error("overlap is not acceptable for shifts [{}]", all_ids(.pairs))]
    OverlapNotAcceptable { pairs: Vec<ConflictPair> },
    #[error("shifts have fact records: [{}]", .shift_ids.join(", "))]
    HasFactRecord { shift_ids: Vec<String> },
    #[error("timeline {timeline_id} is {status}; changing it requires resetting approval status to draft")]
    ApprovalStatusChanging { timeline_id: String, status: String },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("consistency error: {0}")]
    Consistency(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl ScheduleError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedOverlap { .. }
                | Self::OverlapNotAcceptable { .. }
                | Self::HasFactRecord { .. }
                | Self::ApprovalStatusChanging { .. }
        )
    }

    pub fn conflicting_ids(&self) -> Vec<String> {
        match self {
            Self::UnresolvedOverlap { pairs } | Self::OverlapNotAcceptable { pairs } => {
                let mut ids = Vec::new();
                for pair in pairs {
                    for id in [&pair.existing_id, &pair.proposed_id] {
                        if !ids.contains(id) {
                            ids.push(id.clone());
                        }
                    }
                }
                ids
            }
            Self::HasFactRecord { shift_ids } => shift_ids.clone(),
            _ => Vec::new(),
        }
    }
}

fn all_ids(pairs: &[ConflictPair]) -> String {
    pairs
        .iter()
        .map(|pair| format!("{}<->{}", pair.proposed_id, pair.existing_id))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
