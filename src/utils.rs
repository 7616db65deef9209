// author: kodeholic (powered by Gemini)

use std::time::{SystemTime, UNIX_EPOCH};

/// 현재 시간을 밀리초 단위의 Unix Timestamp로 반환합니다.
/// 에러 발생 시 시스템 패닉 대신 0(기본값)을 반환하여 장애를 방어합니다.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// 현재 시간을 RFC 3339 문자열로 반환합니다 (활동 이벤트 타임스탬프용).
pub fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// 전송 연결 식별자(sid) 생성 — "sid_<millis>_<랜덤4자>"
/// 밀리초 단독으로는 동시 접속 시 충돌 가능하므로 랜덤 접미사를 붙입니다.
pub fn generate_sid() -> String {
    use rand::Rng;
    let charset: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect();
    format!("sid_{}_{}", current_timestamp(), suffix)
}
