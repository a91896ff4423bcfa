use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    models::{Evidence, Submission, User},
    votes::VoteSummary,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedEvidence {
    #[serde(flatten)]
    pub evidence: Evidence,
    pub user: Option<User>,
}

/// A submission joined with its author and evidence authors, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedSubmission {
    pub id: String,
    pub title: String,
    pub content: String,
    pub submitted_by: Option<User>,
    pub submitted_at: DateTime<Utc>,
    pub ai_score: u8,
    pub upvotes: u32,
    pub downvotes: u32,
    pub votes: VoteSummary,
    pub evidence: Vec<HydratedEvidence>,
}

/// Newest first. Unknown user ids hydrate to `None`.
pub fn hydrate_submissions(submissions: Vec<Submission>, users: &[User]) -> Vec<HydratedSubmission> {
    let users: HashMap<&str, &User> = users.iter().map(|u| (u.id.as_str(), u)).collect();
    let lookup = |id: &str| users.get(id).map(|u| (*u).clone());

    let mut hydrated: Vec<HydratedSubmission> = submissions
        .into_iter()
        .map(|submission| {
            let votes = VoteSummary::of(&submission);
            HydratedSubmission {
                submitted_by: lookup(&submission.submitted_by),
                evidence: submission
                    .evidence
                    .into_iter()
                    .map(|evidence| HydratedEvidence {
                        user: lookup(&evidence.user_id),
                        evidence,
                    })
                    .collect(),
                id: submission.id,
                title: submission.title,
                content: submission.content,
                submitted_at: submission.submitted_at,
                ai_score: submission.ai_score,
                upvotes: submission.upvotes,
                downvotes: submission.downvotes,
                votes,
            }
        })
        .collect();

    hydrated.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    hydrated
}

pub fn leaderboard(mut users: Vec<User>) -> Vec<User> {
    users.sort_by(|a, b| b.points.cmp(&a.points));
    users
}
