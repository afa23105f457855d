//! Auth Service / Identity Store 계약
//!
//! 토큰 발급과 검증은 외부 협력자의 책임이다. 여기에는 trait 과
//! 메모리 기반 참조 구현(`TokenAuthService`, `MemoryIdentityStore`)만 둔다.

use async_trait::async_trait;
use aranes_foundation::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Principal
// ============================================================================

/// 토큰에서 확인된 호출 주체
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,

    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            roles: Vec::new(),
        }
    }

    /// in-process 호출자 (플러그인, 코어 컴포넌트)
    pub fn internal(component: impl AsRef<str>) -> Self {
        Self {
            subject: format!("internal:{}", component.as_ref()),
            roles: vec!["internal".to_string()],
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

// ============================================================================
// Contracts
// ============================================================================

/// 토큰 발급/검증
#[async_trait]
pub trait AuthService: Send + Sync {
    /// 자격 증명 확인 후 토큰 발급 (`InvalidCredentials`)
    async fn issue_token(&self, username: &str, password: &str) -> Result<String>;

    /// 토큰 검증 (`Unauthorized` / `Expired`)
    async fn validate(&self, token: &str) -> Result<Principal>;
}

/// 사용자 저장소
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Principal>;

    async fn find(&self, subject: &str) -> Result<Option<Principal>>;
}

// ============================================================================
// MemoryIdentityStore
// ============================================================================

struct UserEntry {
    password: String,
    roles: Vec<String>,
}

/// 메모리 사용자 저장소
#[derive(Default)]
pub struct MemoryIdentityStore {
    users: RwLock<HashMap<String, UserEntry>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, username: &str, password: &str) -> Self {
        self.add_user(username, password, Vec::new());
        self
    }

    pub fn add_user(&self, username: &str, password: &str, roles: Vec<String>) {
        self.users.write().insert(
            username.to_string(),
            UserEntry {
                password: password.to_string(),
                roles,
            },
        );
    }

    pub fn remove_user(&self, username: &str) -> bool {
        self.users.write().remove(username).is_some()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Principal> {
        let users = self.users.read();
        match users.get(username) {
            Some(user) if user.password == password => Ok(Principal {
                subject: username.to_string(),
                roles: user.roles.clone(),
            }),
            _ => Err(Error::InvalidCredentials),
        }
    }

    async fn find(&self, subject: &str) -> Result<Option<Principal>> {
        Ok(self.users.read().get(subject).map(|user| Principal {
            subject: subject.to_string(),
            roles: user.roles.clone(),
        }))
    }
}

// ============================================================================
// TokenAuthService
// ============================================================================

struct TokenEntry {
    subject: String,
    expires_at: DateTime<Utc>,
}

/// 불투명 UUID 토큰 + TTL 참조 구현
pub struct TokenAuthService {
    identities: Arc<dyn IdentityStore>,
    ttl: Duration,
    tokens: RwLock<HashMap<String, TokenEntry>>,
}

impl TokenAuthService {
    pub fn new(identities: Arc<dyn IdentityStore>, ttl: Duration) -> Self {
        Self {
            identities,
            ttl,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// 토큰 폐기
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.write().remove(token).is_some()
    }

    /// 만료된 토큰 정리
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, entry| entry.expires_at > now);
        before - tokens.len()
    }
}

#[async_trait]
impl AuthService for TokenAuthService {
    async fn issue_token(&self, username: &str, password: &str) -> Result<String> {
        let principal = self.identities.authenticate(username, password).await?;
        let token = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now();

        let mut tokens = self.tokens.write();
        // 발급할 때마다 만료된 토큰 정리
        tokens.retain(|_, entry| entry.expires_at > now);
        tokens.insert(
            token.clone(),
            TokenEntry {
                subject: principal.subject.clone(),
                expires_at: now + self.ttl,
            },
        );
        drop(tokens);
        debug!("[Auth] issued token for {}", principal.subject);
        Ok(token)
    }

    async fn validate(&self, token: &str) -> Result<Principal> {
        let subject = {
            let tokens = self.tokens.read();
            let entry = tokens
                .get(token)
                .ok_or_else(|| Error::Unauthorized("invalid token".to_string()))?;
            if entry.expires_at <= Utc::now() {
                None
            } else {
                Some(entry.subject.clone())
            }
        };

        let Some(subject) = subject else {
            self.revoke(token);
            return Err(Error::Expired);
        };

        self.identities
            .find(&subject)
            .await?
            .ok_or_else(|| Error::Unauthorized(format!("unknown subject: {}", subject)))
    }
}
