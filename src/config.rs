// author: kodeholic (powered by Claude)
// 매직 넘버를 배제하고 시스템 전체의 성능과 한계를 제어하는 상수 모음입니다.

/// 웹소켓 시그널링 서버 TCP 포트
pub const SIGNALING_PORT: u16 = 5002;

/// ICE-Lite answerer가 광고하는 미디어 플레인 UDP 포트
/// 실제 종단(DTLS/SRTP)은 외부 미디어 엔진이 담당한다
pub const MEDIA_UDP_PORT: u16 = 10000;

/// 송신(Egress) 워커 큐 사이즈.
/// 꽉 차면 지연 발생 방지를 위해 오래된 패킷을 버립니다(Drop/Backpressure).
pub const EGRESS_QUEUE_SIZE: usize = 2048;

/// 엔진 이벤트(트랙 수신/상태 변경) 큐 사이즈
pub const ENGINE_EVENT_QUEUE_SIZE: usize = 64;

/// ActivityDetected 디스패치 큐 사이즈
pub const ACTIVITY_QUEUE_SIZE: usize = 256;

/// 세션 비디오 탭(broadcast) 버퍼 — 느린 구독자는 오래된 프레임부터 유실
pub const VIDEO_TAP_BUFFER: usize = 16;

/// 프레임 샘플링 간격 — N 프레임당 1회만 분석 (미디어 경로 비차단 보장)
pub const FRAME_SAMPLE_INTERVAL: u64 = 5;

/// 헤드 포즈 center 판정 허용 오프셋 (픽셀)
pub const HEAD_POSE_CENTER_MARGIN: i32 = 50;

/// 좀비 세션 reaper 실행 주기 (10초)
pub const REAPER_INTERVAL_MS: u64 = 10_000;

/// 연결이 끊긴 좀비 세션을 정리하기 위한 타임아웃 (30초)
pub const ZOMBIE_TIMEOUT_MS: u64 = 30_000;

/// 클라이언트가 HEARTBEAT를 보내야 하는 주기 (밀리초)
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// IDENTIFY 토큰 검증용 Secret Key
/// 운영 환경에서는 환경변수 PROCTOR_SECRET 으로 오버라이드 할 것
pub const DEFAULT_SECRET_KEY: &str = "changeme-secret";

/// STUN 서버 목록 — 브라우저 측 ICE 수집용으로 answer에 반영되지는 않지만
/// 엔진 어댑터 생성 시 그대로 전달한다
pub const STUN_SERVERS: &[&str] = &["stun:stun.l.google.com:19302"];
