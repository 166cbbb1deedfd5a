use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// Coarse phase of an analysis, reported by the backend and mirrored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Idle,
    Fetching,
    Analyzing,
    Complete,
    Error,
}

impl Stage {
    pub fn is_active(&self) -> bool {
        matches!(self, Stage::Fetching | Stage::Analyzing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sentiment {
    #[serde(default)]
    pub positive: f64,
    #[serde(default)]
    pub negative: f64,
    #[serde(default)]
    pub neutral: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HiddenGem {
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, rename = "likeCount")]
    pub like_count: u64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControversyTopic {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub description: String,
}

/// Normalized analysis output. Array fields are always present (empty when
/// the backend omitted them) and `summary` is never empty after parsing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_en: Option<String>,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics_en: Option<Vec<String>>,
    #[serde(default, rename = "hiddenGems")]
    pub hidden_gems: Vec<HiddenGem>,
    #[serde(default)]
    pub controversy: Vec<ControversyTopic>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Transient progress message from the backend (or the local simulation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    #[serde(default)]
    pub current: f64,
    #[serde(default)]
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl SummaryLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLength::Short => "short",
            SummaryLength::Medium => "medium",
            SummaryLength::Long => "long",
        }
    }
}

/// Caller-tunable request parameters with moderate defaults.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub comment_limit: u32,
    pub summary_length: SummaryLength,
    pub language: Option<String>,
    pub no_cache: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            comment_limit: 300,
            summary_length: SummaryLength::Medium,
            language: None,
            no_cache: false,
        }
    }
}

/// One user-initiated analysis attempt and its state. Mutated only by the
/// session controller; everyone else reads cloned snapshots.
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    pub id: Uuid,
    pub video_id: String,
    pub title: Option<String>,
    pub stage: Stage,
    pub progress_current: f64,
    pub progress_total: f64,
    pub started_at: SystemTime,
    pub result: Option<AnalysisResult>,
    pub error: Option<SessionError>,
}

impl AnalysisSession {
    pub fn new(video_id: impl Into<String>, title: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            video_id: video_id.into(),
            title,
            stage: Stage::Idle,
            progress_current: 0.0,
            progress_total: 100.0,
            started_at: SystemTime::now(),
            result: None,
            error: None,
        }
    }

    pub fn is_analyzing(&self) -> bool {
        self.stage.is_active()
    }
}

impl Default for AnalysisSession {
    fn default() -> Self {
        Self::new(String::new(), None)
    }
}
