// models/src/diary.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One e-diary submission. Append-only: entries are never edited and are
/// removed only by a patient cascade delete. `content` is encrypted at rest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: Uuid,
    pub date: NaiveDateTime,
    pub content: String,
    pub patient_id: Uuid,
}
