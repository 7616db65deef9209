// author: kodeholic (powered by Claude)
// SessionRegistry — 라이브 세션 + 뷰어 매핑 + cleanup 티켓
//
// 내부 상태 전체가 단일 Mutex 뒤에 있어서 같은 student_id에 대한 모든
// 변이는 자연히 직렬화된다 (disconnect와 failed 콜백이 동시에 teardown을
// 시도하는 레이스 제거). begin_cleanup이 유일한 teardown 게이트 —
// 티켓을 따낸 호출자만 미디어 핸들을 해제할 수 있다.
//
// 락은 await를 가로질러 잡지 않는다. 핸들 close 같은 비동기 작업은
// 세션에서 핸들을 take한 뒤 락 밖에서 수행할 것.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::core::session::Session;

#[derive(Default)]
struct RegistryInner {
    /// sid → 세션
    sessions:   HashMap<String, Arc<Session>>,
    /// student_id → 라이브 Student 세션의 sid
    by_student: HashMap<String, String>,
    /// student_id → 감독관 sid (단일 감독관, last-write-wins)
    viewer_map: HashMap<String, String>,
    /// 진행 중인 teardown 티켓 (sid)
    cleanup:    HashSet<String>,
}

pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        trace!("Initializing SessionRegistry");
        Self { inner: Mutex::new(RegistryInner::default()) }
    }

    /// Student 세션 등록 — 같은 student_id의 기존 세션은 호출 전에
    /// teardown되어 있어야 한다 (last-offer-wins는 라우터 책임)
    pub fn insert_student(&self, session: Arc<Session>) {
        let mut inner = self.inner.lock().unwrap();
        inner.by_student.insert(session.student_id.clone(), session.id.clone());
        inner.sessions.insert(session.id.clone(), session);
    }

    /// AdminViewer 세션 등록
    pub fn insert_admin(&self, session: Arc<Session>) {
        self.inner.lock().unwrap().sessions.insert(session.id.clone(), session);
    }

    pub fn get(&self, sid: &str) -> Option<Arc<Session>> {
        self.inner.lock().unwrap().sessions.get(sid).cloned()
    }

    /// student_id의 라이브 Student 세션 조회
    pub fn find_student_session(&self, student_id: &str) -> Option<Arc<Session>> {
        let inner = self.inner.lock().unwrap();
        let sid = inner.by_student.get(student_id)?;
        inner.sessions.get(sid).filter(|s| s.is_live()).cloned()
    }

    /// 감독관 전송 id로 AdminViewer 세션 조회
    pub fn find_admin_session(&self, sid: &str) -> Option<Arc<Session>> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .get(sid)
            .filter(|s| s.role == crate::auth::Role::Admin)
            .cloned()
    }

    /// 뷰어 매핑 등록 — 기존 감독관은 덮어쓴다 (last-write-wins)
    pub fn map_viewer(&self, student_id: &str, admin_sid: &str) {
        let prev = self
            .inner
            .lock()
            .unwrap()
            .viewer_map
            .insert(student_id.to_string(), admin_sid.to_string());
        if let Some(prev) = prev {
            if prev != admin_sid {
                debug!("[registry] viewer remapped student={} {} -> {}", student_id, prev, admin_sid);
            }
        }
    }

    pub fn resolve_viewer(&self, student_id: &str) -> Option<String> {
        self.inner.lock().unwrap().viewer_map.get(student_id).cloned()
    }

    /// teardown 게이트. 티켓이 이미 있거나 미지의 세션이면 false —
    /// 호출자는 아무것도 해제해서는 안 된다.
    pub fn begin_cleanup(&self, sid: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.sessions.contains_key(sid) {
            return false;
        }
        let granted = inner.cleanup.insert(sid.to_string());
        if granted {
            debug!("[registry] cleanup ticket granted sid={}", sid);
        }
        granted
    }

    /// teardown 완료 — 세션/티켓/학생 인덱스/관련 뷰어 매핑 제거.
    /// 어느 쪽(학생/감독관)이 끊겨도 해당 매핑 엔트리는 사라진다.
    pub fn complete_cleanup(&self, sid: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.cleanup.remove(sid);
        let removed = inner.sessions.remove(sid);

        inner.by_student.retain(|_, live_sid| live_sid != sid);
        if let Some(session) = removed {
            // 학생 세션이었다면 그 학생의 뷰어 매핑도 제거
            if session.role == crate::auth::Role::Student {
                inner.viewer_map.remove(&session.student_id);
            }
        }
        // 감독관 세션이었다면 값 기준으로 제거
        inner.viewer_map.retain(|_, admin_sid| admin_sid != sid);
        debug!("[registry] cleanup complete sid={}", sid);
    }

    /// 전송 id 기준 뷰어 매핑만 제거 (세션 없는 감독관 disconnect 대비)
    pub fn remove_viewer_by_admin(&self, admin_sid: &str) {
        self.inner
            .lock()
            .unwrap()
            .viewer_map
            .retain(|_, sid| sid != admin_sid);
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    /// 전체 세션 스냅샷 (reaper 순회용)
    pub fn all_sessions(&self) -> Vec<Arc<Session>> {
        self.inner.lock().unwrap().sessions.values().cloned().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
