// author: kodeholic (powered by Claude)
// Suspicious-Activity Sink — 활동 이벤트 영속화 계약
//
// 운영 배포에서는 DB 테이블(user_suspicious_activities)을 쓰는 구현으로
// 교체한다. 코어와 테스트는 인메모리 구현으로 돈다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProctorResult;

/// 탐지 가능한 의심 행동 종류
/// 직렬화 문자열은 DB/클라이언트와 공유하는 표기 그대로
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    #[serde(rename = "No face")]
    NoFace,
    #[serde(rename = "Multiple faces")]
    MultipleFaces,
    #[serde(rename = "Looking away")]
    LookingAway,
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityKind::NoFace        => write!(f, "No face"),
            ActivityKind::MultipleFaces => write!(f, "Multiple faces"),
            ActivityKind::LookingAway   => write!(f, "Looking away"),
        }
    }
}

/// 영속화된 활동 이벤트 — 기록 이후 불변
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub id:        u64,
    pub user_id:   String,
    pub activity:  ActivityKind,
    /// RFC 3339
    pub timestamp: String,
}

/// 활동 이벤트 영속화 계약
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// 이벤트 1건 기록
    async fn append(&self, user_id: &str, activity: ActivityKind, timestamp: &str)
        -> ProctorResult<()>;

    /// 특정 사용자 이벤트 조회 — 최신순
    async fn list(&self, user_id: &str) -> Vec<ActivityEvent>;
}

// ----------------------------------------------------------------------------
// [MemoryActivitySink]
// ----------------------------------------------------------------------------

pub struct MemoryActivitySink {
    events:  Mutex<HashMap<String, Vec<ActivityEvent>>>,
    next_id: AtomicU64,
}

impl MemoryActivitySink {
    pub fn new() -> Self {
        Self {
            events:  Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryActivitySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActivitySink for MemoryActivitySink {
    async fn append(&self, user_id: &str, activity: ActivityKind, timestamp: &str)
        -> ProctorResult<()>
    {
        let event = ActivityEvent {
            id:        self.next_id.fetch_add(1, Ordering::Relaxed),
            user_id:   user_id.to_string(),
            activity,
            timestamp: timestamp.to_string(),
        };
        self.events
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .push(event);
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Vec<ActivityEvent> {
        let mut rows = self
            .events
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        rows.reverse(); // 삽입순 보관 → 최신순 반환
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_and_list_newest_first() {
        let sink = MemoryActivitySink::new();
        sink.append("S1", ActivityKind::NoFace, "2026-01-01T00:00:00Z").await.unwrap();
        sink.append("S1", ActivityKind::LookingAway, "2026-01-01T00:00:05Z").await.unwrap();

        let rows = sink.list("S1").await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].activity, ActivityKind::LookingAway);
        assert_eq!(rows[1].activity, ActivityKind::NoFace);
        assert!(rows[0].id > rows[1].id);
    }

    #[tokio::test]
    async fn list_is_scoped_by_user() {
        let sink = MemoryActivitySink::new();
        sink.append("S1", ActivityKind::NoFace, "t").await.unwrap();
        sink.append("S2", ActivityKind::MultipleFaces, "t").await.unwrap();

        assert_eq!(sink.list("S1").await.len(), 1);
        assert_eq!(sink.list("S2").await.len(), 1);
        assert!(sink.list("S3").await.is_empty());
    }

    #[test]
    fn activity_kind_wire_strings() {
        assert_eq!(serde_json::to_string(&ActivityKind::NoFace).unwrap(), "\"No face\"");
        assert_eq!(serde_json::to_string(&ActivityKind::LookingAway).unwrap(), "\"Looking away\"");
        assert_eq!(serde_json::to_string(&ActivityKind::MultipleFaces).unwrap(), "\"Multiple faces\"");
    }
}
