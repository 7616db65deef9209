// author: kodeholic (powered by Claude)
// 토큰 검증 시드 — 실제 발급/해시는 인증 서버(외부) 몫이고,
// 시그널링 코어는 verify 계약만 소비한다.
// 감독관 전용 op(ADMIN_OFFER 등)는 Admin 클레임 없이는 라우터에 닿지 못한다.

use serde::{Deserialize, Serialize};

use crate::config;

/// 접속 주체 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Admin   => write!(f, "admin"),
        }
    }
}

/// 토큰 검증 결과
#[derive(Debug, Clone)]
pub struct AuthClaims {
    pub role:     Role,
    pub identity: String,
}

/// 토큰 검증 계약 — 운영 배포에서는 JWT 검증기 등으로 교체
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Option<AuthClaims>;
}

// ----------------------------------------------------------------------------
// [SharedSecretVerifier] — "<secret>.<role>.<identity>" 형식
// ----------------------------------------------------------------------------

pub struct SharedSecretVerifier {
    secret: String,
}

impl SharedSecretVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// 환경변수 PROCTOR_SECRET 우선, 없으면 DEFAULT_SECRET_KEY
    pub fn from_env() -> Self {
        let secret = std::env::var("PROCTOR_SECRET")
            .unwrap_or_else(|_| config::DEFAULT_SECRET_KEY.to_string());
        Self { secret }
    }
}

impl TokenVerifier for SharedSecretVerifier {
    fn verify(&self, token: &str) -> Option<AuthClaims> {
        let mut parts = token.splitn(3, '.');
        if parts.next()? != self.secret {
            return None;
        }
        let role = match parts.next()? {
            "student" => Role::Student,
            "admin"   => Role::Admin,
            _ => return None,
        };
        let identity = parts.next()?;
        if identity.is_empty() {
            return None;
        }
        Some(AuthClaims { role, identity: identity.to_string() })
    }
}
