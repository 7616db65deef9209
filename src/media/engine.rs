// author: kodeholic (powered by Claude)
// Media Engine Adapter 계약
//
// 코어는 ICE/DTLS/SRTP/코덱 내부를 모른다 — 연결 객체가 노출하는
// 능력(description 교환, candidate 추가, 이벤트 구독, 종료)만 소비한다.
// 연결 핸들은 세션이 배타 소유하며 complete_cleanup까지 유지된다.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::{broadcast, mpsc};

use crate::error::ProctorResult;
use crate::protocol::candidate::CandidateParams;

// ----------------------------------------------------------------------------
// [SDP / ICE 설정]
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SessionDescription {
    pub sdp: String,
    /// "offer" | "answer"
    pub kind: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { sdp: sdp.into(), kind: "offer".to_string() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { sdp: sdp.into(), kind: "answer".to_string() }
    }
}

/// 연결 생성 시 엔진에 넘기는 ICE 설정
#[derive(Debug, Clone, Default)]
pub struct IceConfig {
    pub stun_servers: Vec<String>,
}

// ----------------------------------------------------------------------------
// [엔진 이벤트]
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineConnState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl EngineConnState {
    /// teardown으로 라우팅해야 하는 상태인가
    pub fn is_dead(&self) -> bool {
        matches!(
            self,
            EngineConnState::Disconnected | EngineConnState::Failed | EngineConnState::Closed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineIceState {
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// 연결 객체가 비동기로 올리는 이벤트
pub enum EngineEvent {
    /// 원격 비디오 트랙 수신 — 프레임 소스 소유권 이전
    VideoTrack(Box<dyn FrameSource>),
    ConnectionState(EngineConnState),
    IceState(EngineIceState),
}

// ----------------------------------------------------------------------------
// [프레임]
// ----------------------------------------------------------------------------

/// 디코딩된 비디오 프레임 (BGR 3채널 기준)
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width:    u32,
    pub height:   u32,
    pub channels: u32,
    /// 행 단위 바이트 수 — 패딩이 있으면 width*channels보다 크다
    pub stride:   usize,
    pub data:     Bytes,
}

impl VideoFrame {
    /// 패딩 없는 연속 버퍼 프레임
    pub fn packed(width: u32, height: u32, data: Bytes) -> Self {
        Self {
            width,
            height,
            channels: 3,
            stride: width as usize * 3,
            data,
        }
    }

    /// 무결성 검증 + 연속 버퍼 확보.
    /// 빈 버퍼 / 3채널 아님 / 0 이하 치수 / 길이 부족이면 None.
    /// stride에 패딩이 있으면 행 단위로 재패킹한 복사본을 반환한다.
    pub fn contiguous(&self) -> Option<Bytes> {
        if self.data.is_empty() || self.channels != 3 || self.width == 0 || self.height == 0 {
            return None;
        }
        let row = self.width as usize * self.channels as usize;
        if self.stride < row || self.data.len() < self.stride * self.height as usize {
            return None;
        }
        if self.stride == row {
            return Some(self.data.clone());
        }
        let mut packed = BytesMut::with_capacity(row * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * self.stride;
            packed.extend_from_slice(&self.data[start..start + row]);
        }
        Some(packed.freeze())
    }
}

/// 트랙이 생산하는 프레임 시퀀스 — lazy, 재시작 불가
#[async_trait]
pub trait FrameSource: Send {
    /// 다음 프레임. None이면 트랙 종료.
    async fn next_frame(&mut self) -> Option<VideoFrame>;
}

/// 세션 수신 비디오의 투명 탭 — 파이프라인이 발행, 감독관 연결이 구독
pub type VideoTap = broadcast::Sender<VideoFrame>;

// ----------------------------------------------------------------------------
// [연결 / 엔진 계약]
// ----------------------------------------------------------------------------

#[async_trait]
pub trait MediaConnection: Send + Sync {
    async fn set_remote_description(&self, desc: SessionDescription) -> ProctorResult<()>;
    async fn create_answer(&self) -> ProctorResult<SessionDescription>;
    async fn set_local_description(&self, desc: SessionDescription) -> ProctorResult<()>;
    fn local_description(&self) -> Option<SessionDescription>;

    async fn add_ice_candidate(&self, candidate: CandidateParams) -> ProctorResult<()>;

    /// 엔진 이벤트 수신 채널 — 최초 1회만 take 가능
    fn take_events(&self) -> Option<mpsc::Receiver<EngineEvent>>;

    /// 이 연결의 수신 비디오 탭
    fn video_tap(&self) -> VideoTap;

    /// 다른 연결의 탭을 이 연결의 송신 트랙으로 부착 (감독관 릴레이)
    async fn attach_video(&self, tap: VideoTap) -> ProctorResult<()>;

    /// 트랜시버/데이터채널 정지 — 실패는 삼킨다 (best-effort)
    async fn stop_transceivers(&self);

    async fn close(&self) -> ProctorResult<()>;
}

pub trait MediaEngine: Send + Sync {
    fn create_connection(&self, ice: &IceConfig) -> ProctorResult<Arc<dyn MediaConnection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_frame_is_contiguous() {
        let frame = VideoFrame::packed(4, 2, Bytes::from(vec![7u8; 4 * 2 * 3]));
        let buf = frame.contiguous().unwrap();
        assert_eq!(buf.len(), 24);
    }

    #[test]
    fn padded_stride_is_repacked() {
        // 행당 4바이트 패딩
        let row = 4 * 3;
        let stride = row + 4;
        let mut data = Vec::new();
        for y in 0..2u8 {
            data.extend(std::iter::repeat(y + 1).take(row));
            data.extend(std::iter::repeat(0xEE).take(4));
        }
        let frame = VideoFrame {
            width: 4,
            height: 2,
            channels: 3,
            stride,
            data: Bytes::from(data),
        };
        let buf = frame.contiguous().unwrap();
        assert_eq!(buf.len(), row * 2);
        assert!(buf[..row].iter().all(|&b| b == 1));
        assert!(buf[row..].iter().all(|&b| b == 2));
    }

    #[test]
    fn invalid_frames_rejected() {
        // 빈 버퍼
        assert!(VideoFrame::packed(4, 2, Bytes::new()).contiguous().is_none());
        // 4채널
        let frame = VideoFrame {
            width: 2, height: 2, channels: 4, stride: 8,
            data: Bytes::from(vec![0u8; 16]),
        };
        assert!(frame.contiguous().is_none());
        // 0 치수
        assert!(VideoFrame::packed(0, 2, Bytes::from(vec![0u8; 6])).contiguous().is_none());
        // 버퍼 길이 부족
        assert!(VideoFrame::packed(4, 2, Bytes::from(vec![0u8; 10])).contiguous().is_none());
    }

    #[test]
    fn dead_states() {
        assert!(EngineConnState::Failed.is_dead());
        assert!(EngineConnState::Disconnected.is_dead());
        assert!(EngineConnState::Closed.is_dead());
        assert!(!EngineConnState::Connected.is_dead());
        assert!(!EngineConnState::New.is_dead());
    }
}
