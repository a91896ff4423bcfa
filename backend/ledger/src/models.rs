use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub type UserId = String;
pub type SubmissionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// A community submission as stored in the content store.
///
/// Membership maps mirror the document shape `{[userId]: true}`, so empty maps
/// may be missing entirely from stored documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub submitted_by: UserId,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_score")]
    pub ai_score: u8,
    #[serde(default)]
    pub upvotes: u32,
    #[serde(default)]
    pub downvotes: u32,
    #[serde(default)]
    pub upvoted_by: BTreeMap<UserId, bool>,
    #[serde(default)]
    pub downvoted_by: BTreeMap<UserId, bool>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

impl Submission {
    pub fn voters(&self, direction: Direction) -> &BTreeMap<UserId, bool> {
        match direction {
            Direction::Up => &self.upvoted_by,
            Direction::Down => &self.downvoted_by,
        }
    }

    pub fn has_voted(&self, user_id: &str, direction: Direction) -> bool {
        self.voters(direction).get(user_id).copied().unwrap_or(false)
    }

    pub fn vote_of(&self, user_id: &str) -> Option<Direction> {
        [Direction::Up, Direction::Down]
            .into_iter()
            .find(|&direction| self.has_voted(user_id, direction))
    }
}

/// Stored scores may be any JSON number. Rounded and clamped to `0..=100`.
fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if !raw.is_finite() {
        return Ok(0);
    }
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubmission {
    pub title: String,
    pub content: String,
}

impl NewSubmission {
    /// `ai_score` comes from scoring `content`, never from the client.
    pub fn into_submission(self, submitted_by: &str, ai_score: u8) -> Submission {
        Submission {
            id: Uuid::new_v4().to_string(),
            title: self.title,
            content: self.content,
            submitted_by: submitted_by.to_string(),
            submitted_at: Utc::now(),
            ai_score: ai_score.min(100),
            upvotes: 0,
            downvotes: 0,
            upvoted_by: BTreeMap::new(),
            downvoted_by: BTreeMap::new(),
            evidence: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: String,
    pub user_id: UserId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub badges: Vec<String>,
}

/// One completed analysis. Written once, never updated.
///
/// `summary` and `score` are optional so that malformed documents still load;
/// the aggregator decides what to do with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    pub analyzed_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn new(summary: impl Into<String>, score: f64) -> Self {
        Self {
            summary: Some(summary.into()),
            score: Some(score),
            analyzed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingTopic {
    pub summary: String,
    pub count: usize,
    pub average_score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreBand {
    #[serde(rename = "Likely False")]
    LikelyFalse,
    Uncertain,
    #[serde(rename = "Likely True")]
    LikelyTrue,
}

impl ScoreBand {
    pub fn from_score(score: f64) -> Self {
        if score < 40.0 {
            ScoreBand::LikelyFalse
        } else if score < 70.0 {
            ScoreBand::Uncertain
        } else {
            ScoreBand::LikelyTrue
        }
    }
}
