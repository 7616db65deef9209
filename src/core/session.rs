// author: kodeholic (powered by Claude)
// Session — 협상된 피어 연결 1개의 서버측 엔티티
//
// 엔진 연결 핸들과 세션에 딸린 태스크(엔진 watcher, 분석 파이프라인)를
// 배타 소유한다. student_id / sid 같은 식별자는 외부 소유 엔진 핸들에
// 덕타이핑으로 붙이지 않고 여기 명시 필드로 둔다.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::trace;

use crate::auth::Role;
use crate::media::MediaConnection;
use crate::utils::current_timestamp;

/// 세션 연결 상태 머신
/// New → Negotiating → Connected → {Disconnected, Failed} → Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    New          = 0,
    Negotiating  = 1,
    Connected    = 2,
    Disconnected = 3,
    Failed       = 4,
    Closed       = 5,
}

impl SessionState {
    /// Disconnected/Failed는 teardown 경유, Closed는 종결
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Disconnected | SessionState::Failed | SessionState::Closed
        )
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::New,
            1 => SessionState::Negotiating,
            2 => SessionState::Connected,
            3 => SessionState::Disconnected,
            4 => SessionState::Failed,
            _ => SessionState::Closed,
        }
    }
}

pub struct Session {
    /// 생성 시점의 전송 연결 식별자(sid)와 동일
    pub id:         String,
    pub role:       Role,
    /// Student 세션이면 감시 대상 본인, Admin 세션이면 보고 있는 학생
    pub student_id: String,
    pub created_at: u64,

    state: AtomicU8,
    /// 엔진 연결 핸들 — teardown 시 take되어 단 한 번만 close된다
    media: Mutex<Option<Arc<dyn MediaConnection>>>,
    /// 세션 소속 태스크 (watcher / 파이프라인) — teardown 시 abort
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    pub fn new(
        id:         impl Into<String>,
        role:       Role,
        student_id: impl Into<String>,
        media:      Arc<dyn MediaConnection>,
    ) -> Self {
        let id = id.into();
        let student_id = student_id.into();
        trace!("Session::new sid={} role={} student={}", id, role, student_id);
        Self {
            id,
            role,
            student_id,
            created_at: current_timestamp(),
            state: AtomicU8::new(SessionState::New as u8),
            media: Mutex::new(Some(media)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, next: SessionState) {
        trace!("Session {} state {:?} -> {:?}", self.id, self.state(), next);
        self.state.store(next as u8, Ordering::Release);
    }

    /// 비종결 상태 = 살아있는 세션
    pub fn is_live(&self) -> bool {
        !self.state().is_terminal()
    }

    /// candidate 추가 등 핸들 공유 접근 (소유권 이전 없음)
    pub fn media(&self) -> Option<Arc<dyn MediaConnection>> {
        self.media.lock().unwrap().clone()
    }

    /// teardown 전용 — 핸들 소유권을 가져간다. 두 번째 호출부터는 None.
    pub fn take_media(&self) -> Option<Arc<dyn MediaConnection>> {
        self.media.lock().unwrap().take()
    }

    pub fn track_task(&self, handle: JoinHandle<()>) {
        self.tasks.lock().unwrap().push(handle);
    }

    /// 세션 소속 태스크 전부 중단 (파이프라인 취소 포함)
    pub fn abort_tasks(&self) {
        for handle in self.tasks.lock().unwrap().drain(..) {
            handle.abort();
        }
    }
}
