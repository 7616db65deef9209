// author: kodeholic (powered by Claude)

use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::sink::ActivityKind;

// ----------------------------------------------------------------------------
// [공통] Gateway 패킷 봉투 (Envelope)
// ----------------------------------------------------------------------------

/// 모든 WebSocket 메시지의 최상위 구조체
/// 수신/송신 공통으로 사용하며, payload는 op에 따라 해석합니다.
/// payload 필드명은 브라우저 클라이언트와 맞추기 위해 camelCase.
///
/// 예시:
///   { "op": 10, "d": { "studentId": "S1", "sdp": "...", "type": "offer" } }
#[derive(Serialize, Deserialize, Debug)]
pub struct GatewayPacket {
    /// opcode (protocol::opcode 참조)
    pub op: u8,
    /// payload. op에 따라 구조가 달라지므로 raw JSON으로 보관
    pub d: Option<serde_json::Value>,
}

impl GatewayPacket {
    pub fn new(op: u8, payload: impl Serialize) -> Self {
        Self {
            op,
            d: Some(serde_json::to_value(payload).unwrap_or(serde_json::Value::Null)),
        }
    }

    pub fn no_data(op: u8) -> Self {
        Self { op, d: None }
    }
}

// ----------------------------------------------------------------------------
// [C→S] 클라이언트 요청 payload 타입들
// ----------------------------------------------------------------------------

/// op: IDENTIFY (3)
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyPayload {
    pub user_id: String,
    pub token:   String,
}

/// SDP 본문 — ADMIN_OFFER의 중첩 sdp 객체와 공용
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SdpBody {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// op: OFFER (10) — 학생의 분석용 offer
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OfferPayload {
    pub student_id: Option<String>,
    pub sdp:        String,
    #[serde(rename = "type")]
    pub kind:       String,
}

/// op: ADMIN_OFFER (11) — 감독관의 학생 영상 요청
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdminOfferPayload {
    pub student_id: Option<String>,
    pub sdp:        SdpBody,
}

/// op: ANSWER (12)
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub student_id: Option<String>,
    pub sdp:        String,
    #[serde(rename = "type")]
    pub kind:       String,
    pub admin_id:   Option<String>,
    #[serde(default)]
    pub from_admin:  bool,
    #[serde(default)]
    pub is_analysis: bool,
}

/// op: CANDIDATE (13)
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    pub student_id: Option<String>,
    pub admin_id:   Option<String>,
    pub candidate:       String,
    pub sdp_mid:         Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u32>,
    #[serde(default)]
    pub from_admin:  bool,
    #[serde(default)]
    pub is_analysis: bool,
}

// ----------------------------------------------------------------------------
// [S→C] 서버 응답 payload 타입들
// ----------------------------------------------------------------------------

/// op: HELLO (0) — 연결 직후 sid와 heartbeat 주기 안내
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    pub sid:                String,
    pub heartbeat_interval: u64,
}

/// op: READY (4) — IDENTIFY 성공 응답
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    pub sid:     String,
    pub user_id: String,
    pub role:    Role,
}

/// op: ANSWER (101) — 서버 분석 answer 또는 릴레이
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutPayload {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind:       String,
    pub student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id:   Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub from_admin:  bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_analysis: bool,
}

/// op: ADMIN_ANSWER (102) — 감독관 연결에 대한 서버 answer
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdminAnswerPayload {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind:       String,
    pub student_id: String,
}

/// op: OFFER (100) — offer 릴레이 (직접 연결 / 감독관 offer 전달)
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OfferRelayPayload {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind:       String,
    pub student_id: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_admin_offer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id:   Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub from_admin: bool,
}

/// op: CANDIDATE (103) — candidate 릴레이
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRelayPayload {
    pub candidate:       String,
    pub sdp_mid:         Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u32>,
    pub student_id:      Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id:        Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub from_admin:      bool,
}

/// op: SUSPICIOUS_ACTIVITY (110) — 감독관 실시간 알림
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousActivityPayload {
    pub student_id: String,
    pub activity:   ActivityKind,
    pub timestamp:  String,
    pub id:         u64,
}

/// op: ERROR (201)
#[derive(Serialize, Debug)]
pub struct ErrorPayload {
    pub code:   u16,
    pub reason: String,
}
