//! Guild leaderboard built from cached user records

use serde::Serialize;

use super::record::UserRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based
    pub position: usize,
    pub user_id: String,
    #[serde(flatten)]
    pub record: UserRecord,
}

/// Rank users by level, then lifetime XP, then id; keep the first `limit`
pub fn rank(mut users: Vec<(String, UserRecord)>, limit: Option<usize>) -> Vec<LeaderboardEntry> {
    users.sort_by(|(a_id, a), (b_id, b)| {
        b.level
            .cmp(&a.level)
            .then(b.total_xp.cmp(&a.total_xp))
            .then_with(|| a_id.cmp(b_id))
    });
    users
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(i, (user_id, record))| LeaderboardEntry {
            position: i + 1,
            user_id,
            record,
        })
        .collect()
}
