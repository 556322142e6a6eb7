use common::auth::{basic_authorization, DigestAuth, DigestChallenge};
use common::{GatewayError, Result};
use tracing::{debug, warn};

/// 每个摄像头的认证状态，Basic 与 Digest 不会同时生效
#[derive(Debug, Default)]
pub struct AuthState {
    username: String,
    password: String,
    basic: Option<String>,
    digest: Option<DigestAuth>,
}

impl AuthState {
    pub fn new(username: &str, password: &str) -> Self {
        let basic = if !username.is_empty() && !password.is_empty() {
            Some(basic_authorization(username, password))
        } else {
            None
        };
        Self {
            username: username.to_string(),
            password: password.to_string(),
            basic,
            digest: None,
        }
    }

    pub fn is_digest(&self) -> bool {
        self.digest.is_some()
    }

    pub fn is_basic(&self) -> bool {
        self.basic.is_some()
    }

    /// 当前请求应携带的 `Authorization` 头
    pub fn authorization(&mut self, method: &str, uri: &str) -> Option<String> {
        if let Some(digest) = self.digest.as_mut() {
            return Some(digest.authorization(method, uri));
        }
        self.basic.clone()
    }

    /// 处理 401 质询，成功后调用方可以重发一次请求
    pub fn on_challenge(&mut self, www_authenticate: Option<&str>) -> Result<()> {
        let header = www_authenticate.ok_or_else(|| {
            GatewayError::Configuration("camera replied 401 without a WWW-Authenticate header".into())
        })?;

        if self.password.is_empty() {
            return Err(GatewayError::Configuration(
                "camera requires authentication but no password is configured".into(),
            ));
        }

        if let Some(challenge) = DigestChallenge::parse(header) {
            if self.basic.take().is_some() {
                warn!("⚠️ Camera asked for Digest auth, Basic header removed");
            }
            debug!("Digest challenge received for realm {}", challenge.realm);
            self.digest = Some(DigestAuth::new(&self.username, &self.password, challenge));
            return Ok(());
        }

        if header.trim_start().to_ascii_lowercase().starts_with("basic") {
            if self.digest.is_some() {
                warn!("⚠️ Ignoring Basic challenge while Digest is in use");
                return Err(GatewayError::Communication(
                    "camera tried to downgrade Digest to Basic auth".into(),
                ));
            }
            self.basic = Some(basic_authorization(&self.username, &self.password));
            return Ok(());
        }

        Err(GatewayError::Configuration(format!(
            "unsupported authentication scheme: {}",
            header
        )))
    }

    pub fn clear(&mut self) {
        self.basic = None;
        self.digest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = r#"Digest realm="cam", nonce="abc", qop="auth""#;

    #[test]
    fn test_basic_when_credentials_present() {
        let mut auth = AuthState::new("admin", "pw");
        assert_eq!(auth.authorization("GET", "/").as_deref(), Some("Basic YWRtaW46cHc="));
        assert!(AuthState::new("", "").authorization("GET", "/").is_none());
    }

    #[test]
    fn test_digest_replaces_basic() {
        let mut auth = AuthState::new("admin", "pw");
        auth.on_challenge(Some(DIGEST)).unwrap();
        assert!(auth.is_digest());
        assert!(!auth.is_basic());
        let header = auth.authorization("GET", "/snapshot.jpg").unwrap();
        assert!(header.starts_with("Digest "));
        assert!(header.contains(r#"uri="/snapshot.jpg""#));
    }

    #[test]
    fn test_basic_downgrade_refused() {
        let mut auth = AuthState::new("admin", "pw");
        auth.on_challenge(Some(DIGEST)).unwrap();
        let err = auth.on_challenge(Some(r#"Basic realm="cam""#)).unwrap_err();
        assert!(err.is_retryable());
        assert!(auth.is_digest());
    }

    #[test]
    fn test_configuration_errors() {
        let mut auth = AuthState::new("admin", "pw");
        assert!(auth.on_challenge(None).unwrap_err().is_configuration());

        let mut no_password = AuthState::new("admin", "");
        assert!(no_password.on_challenge(Some(DIGEST)).unwrap_err().is_configuration());
    }

    #[test]
    fn test_clear() {
        let mut auth = AuthState::new("admin", "pw");
        auth.on_challenge(Some(DIGEST)).unwrap();
        auth.clear();
        assert!(auth.authorization("GET", "/").is_none());
    }
}
