// author: kodeholic (powered by Claude)

use crate::error::ProctorError;

/// 1xxx: 연결/인증
pub const NOT_AUTHENTICATED:   u16 = 1000;
pub const INVALID_TOKEN:       u16 = 1001;
pub const ADMIN_ROLE_REQUIRED: u16 = 1002;
pub const INVALID_OPCODE:      u16 = 1003;
pub const INVALID_PAYLOAD:     u16 = 1004;

/// 2xxx: 시그널링
pub const MISSING_STUDENT_ID:  u16 = 2000;
pub const STUDENT_NOT_FOUND:   u16 = 2001;
pub const SESSION_NOT_FOUND:   u16 = 2002;

/// 4xxx: 미디어 엔진
pub const ENGINE_FAILURE:      u16 = 4000;

/// 9xxx: 서버 내부
pub const INTERNAL_ERROR:      u16 = 9000;

/// ProctorError → 에러 코드 변환
/// 에러 응답 패킷 생성 시 사용
pub fn to_error_code(err: &ProctorError) -> u16 {
    match err {
        ProctorError::NotAuthenticated   => NOT_AUTHENTICATED,
        ProctorError::InvalidToken       => INVALID_TOKEN,
        ProctorError::AdminRoleRequired  => ADMIN_ROLE_REQUIRED,
        ProctorError::InvalidOpcode(_)   => INVALID_OPCODE,
        ProctorError::InvalidPayload(_)  => INVALID_PAYLOAD,

        ProctorError::MissingStudentId   => MISSING_STUDENT_ID,
        ProctorError::StudentNotFound(_) => STUDENT_NOT_FOUND,
        ProctorError::SessionNotFound(_) => SESSION_NOT_FOUND,

        ProctorError::EngineFailure(_)   => ENGINE_FAILURE,

        ProctorError::SinkFailure(_)
        | ProctorError::DetectorFailure(_)
        | ProctorError::InternalError(_)
        | ProctorError::IoError(_)       => INTERNAL_ERROR,
    }
}
