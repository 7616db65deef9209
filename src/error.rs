// author: kodeholic (powered by Gemini)

use std::fmt;

#[derive(Debug)]
pub enum ProctorError {
    NotAuthenticated,
    InvalidToken,
    AdminRoleRequired,
    InvalidOpcode(u8),
    InvalidPayload(String),
    MissingStudentId,
    StudentNotFound(String),
    SessionNotFound(String),
    EngineFailure(String),
    SinkFailure(String),
    DetectorFailure(String),
    InternalError(String),
    IoError(std::io::Error),
}

impl fmt::Display for ProctorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProctorError::NotAuthenticated => write!(f, "Socket has not identified yet"),
            ProctorError::InvalidToken => write!(f, "Token verification failed"),
            ProctorError::AdminRoleRequired => write!(f, "Admin role required for this operation"),
            ProctorError::InvalidOpcode(op) => write!(f, "Unknown opcode: {}", op),
            ProctorError::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
            ProctorError::MissingStudentId => write!(f, "No student ID provided"),
            ProctorError::StudentNotFound(id) => write!(f, "No live session for student: {}", id),
            ProctorError::SessionNotFound(sid) => write!(f, "Session not found: {}", sid),
            ProctorError::EngineFailure(msg) => write!(f, "Media engine failure: {}", msg),
            ProctorError::SinkFailure(msg) => write!(f, "Activity sink failure: {}", msg),
            ProctorError::DetectorFailure(msg) => write!(f, "Detection failure: {}", msg),
            ProctorError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ProctorError::IoError(err) => write!(f, "Network I/O error: {}", err),
        }
    }
}

impl std::error::Error for ProctorError {}

impl From<std::io::Error> for ProctorError {
    fn from(err: std::io::Error) -> Self {
        ProctorError::IoError(err)
    }
}

pub type ProctorResult<T> = Result<T, ProctorError>;
