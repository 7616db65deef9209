// author: kodeholic (powered by Claude)
// 통합 테스트 공용 목 — 스크립트 가능한 미디어 엔진/탐지기

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};

use mini_proctor::analysis::detector::{center_offset_pose, FaceDetector, FaceRegion, HeadPose};
use mini_proctor::error::{ProctorError, ProctorResult};
use mini_proctor::media::engine::{
    EngineEvent, FrameSource, IceConfig, MediaConnection, MediaEngine, SessionDescription,
    VideoFrame, VideoTap,
};
use mini_proctor::protocol::candidate::CandidateParams;

pub const FRAME_W: u32 = 640;
pub const FRAME_H: u32 = 4;

/// 프레임 첫 바이트가 탐지 시나리오를 정한다:
///   0 → 얼굴 없음, 1 → 정면 1명, 2 → 왼쪽 응시 1명, 3 → 2명
pub fn frame(tag: u8) -> VideoFrame {
    let mut data = vec![0u8; (FRAME_W * FRAME_H * 3) as usize];
    data[0] = tag;
    VideoFrame::packed(FRAME_W, FRAME_H, Bytes::from(data))
}

// ----------------------------------------------------------------------------
// [ScriptedDetector]
// ----------------------------------------------------------------------------

pub struct ScriptedDetector {
    pub calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl FaceDetector for ScriptedDetector {
    async fn detect_faces(&self, frame: &VideoFrame) -> ProctorResult<Vec<FaceRegion>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let centered = FaceRegion { x: 300, y: 0, width: 40, height: 40 };
        let left = FaceRegion { x: 10, y: 0, width: 40, height: 40 };
        Ok(match frame.data[0] {
            0 => vec![],
            1 => vec![centered],
            2 => vec![left],
            _ => vec![centered, left],
        })
    }

    async fn estimate_head_pose(
        &self,
        faces: &[FaceRegion],
        frame: &VideoFrame,
    ) -> ProctorResult<Option<HeadPose>> {
        Ok(faces.first().map(|f| center_offset_pose(f, frame.width)))
    }
}

// ----------------------------------------------------------------------------
// [MockEngine / MockConnection]
// ----------------------------------------------------------------------------

pub struct MockEngine {
    connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { connections: Mutex::new(Vec::new()) })
    }

    /// i번째로 생성된 연결
    pub fn connection(&self, i: usize) -> Arc<MockConnection> {
        Arc::clone(&self.connections.lock().unwrap()[i])
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

impl MediaEngine for MockEngine {
    fn create_connection(&self, _ice: &IceConfig) -> ProctorResult<Arc<dyn MediaConnection>> {
        let conn = MockConnection::new();
        self.connections.lock().unwrap().push(Arc::clone(&conn));
        Ok(conn)
    }
}

pub struct MockConnection {
    pub remote:      Mutex<Option<SessionDescription>>,
    pub local:       Mutex<Option<SessionDescription>>,
    pub candidates:  Mutex<Vec<CandidateParams>>,
    pub attached:    Mutex<Option<VideoTap>>,
    pub close_calls: AtomicUsize,
    events_tx: mpsc::Sender<EngineEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<EngineEvent>>>,
    tap:       VideoTap,
}

impl MockConnection {
    fn new() -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (tap, _) = broadcast::channel(64);
        Arc::new(Self {
            remote:      Mutex::new(None),
            local:       Mutex::new(None),
            candidates:  Mutex::new(Vec::new()),
            attached:    Mutex::new(None),
            close_calls: AtomicUsize::new(0),
            events_tx,
            events_rx:   Mutex::new(Some(events_rx)),
            tap,
        })
    }

    /// 비디오 트랙 수신 이벤트 주입 — 주어진 프레임들을 생산하고 끝나는 소스
    pub async fn push_track(&self, frames: Vec<VideoFrame>) {
        let source = Box::new(VecSource(frames.into()));
        self.events_tx
            .send(EngineEvent::VideoTrack(source))
            .await
            .expect("watcher가 이벤트를 수신해야 합니다");
    }

    /// 연결 상태 변화 이벤트 주입
    pub async fn push_state(&self, state: mini_proctor::media::EngineConnState) {
        let _ = self.events_tx.send(EngineEvent::ConnectionState(state)).await;
    }

    pub fn closes(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

struct VecSource(VecDeque<VideoFrame>);

#[async_trait]
impl FrameSource for VecSource {
    async fn next_frame(&mut self) -> Option<VideoFrame> {
        self.0.pop_front()
    }
}

#[async_trait]
impl MediaConnection for MockConnection {
    async fn set_remote_description(&self, desc: SessionDescription) -> ProctorResult<()> {
        *self.remote.lock().unwrap() = Some(desc);
        Ok(())
    }

    async fn create_answer(&self) -> ProctorResult<SessionDescription> {
        if self.remote.lock().unwrap().is_none() {
            return Err(ProctorError::EngineFailure("no remote description".to_string()));
        }
        Ok(SessionDescription::answer("v=0\r\no=mock 0 0 IN IP4 127.0.0.1\r\n"))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> ProctorResult<()> {
        *self.local.lock().unwrap() = Some(desc);
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    async fn add_ice_candidate(&self, candidate: CandidateParams) -> ProctorResult<()> {
        if self.remote.lock().unwrap().is_none() {
            return Err(ProctorError::EngineFailure("no remote description".to_string()));
        }
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<EngineEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    fn video_tap(&self) -> VideoTap {
        self.tap.clone()
    }

    async fn attach_video(&self, tap: VideoTap) -> ProctorResult<()> {
        *self.attached.lock().unwrap() = Some(tap);
        Ok(())
    }

    async fn stop_transceivers(&self) {}

    async fn close(&self) -> ProctorResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
