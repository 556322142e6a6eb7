//! HTTP Basic / Digest 认证头构造
//!
//! 网关（客户端）和摄像头模拟器（服务端）共用这里的解析与计算逻辑。

use base64::{engine::general_purpose, Engine as _};
use rand::Rng;

/// nc 计数超过该值后回绕到 1，部分摄像头固件不接受过大的 nc
const MAX_NONCE_COUNT: u32 = 125;

/// 构造 `Basic base64(user:pass)` 认证头
pub fn basic_authorization(username: &str, password: &str) -> String {
    let token = general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    format!("Basic {}", token)
}

/// 校验 Basic 认证头
pub fn verify_basic(authorization: &str, username: &str, password: &str) -> bool {
    authorization == basic_authorization(username, password)
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// 生成随机十六进制串，用作 cnonce / nonce
pub fn random_hex() -> String {
    let value: u64 = rand::thread_rng().gen();
    format!("{:016x}", value)
}

/// 查询参数中被视为凭据的键（Foscam 的 usr/pwd 等）
const SECRET_QUERY_KEYS: [&str; 6] = ["usr", "user", "pwd", "password", "loginuse", "loginpas"];

/// 日志用：隐藏URL中的 `user:pass@` 和凭据类查询参数
pub fn masked_uri(uri: &str) -> String {
    let mut masked = uri.to_string();
    if let Some(scheme_end) = masked.find("://") {
        let start = scheme_end + 3;
        let end = masked[start..]
            .find(|c| matches!(c, '/' | '?' | '#'))
            .map_or(masked.len(), |i| start + i);
        if let Some(at) = masked[start..end].rfind('@') {
            masked.replace_range(start..start + at, "****");
        }
    }

    let Some(query_start) = masked.find('?') else {
        return masked;
    };
    let (head, query) = masked.split_at(query_start + 1);
    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _))
                if SECRET_QUERY_KEYS
                    .iter()
                    .any(|secret| key.eq_ignore_ascii_case(secret)) =>
            {
                format!("{}=****", key)
            }
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{}{}", head, query)
}

/// 解析 `key="value", key=value` 形式的参数列表，键统一转为小写
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => {
                    let value = quoted[..end].to_string();
                    rest = &quoted[end + 1..];
                    value
                }
                None => {
                    let value = quoted.to_string();
                    rest = "";
                    value
                }
            }
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            rest = &rest[end..];
            value
        };

        rest = rest.trim_start().trim_start_matches(',').trim_start();
        if !key.is_empty() {
            params.push((key, value));
        }
    }

    params
}

fn find_param(params: &[(String, String)], key: &str) -> Option<String> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}

fn strip_scheme<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    let header = header.trim();
    let prefix = header.get(..scheme.len())?;
    if !prefix.eq_ignore_ascii_case(scheme) {
        return None;
    }
    header.get(scheme.len()..)
}

/// 摄像头在 `WWW-Authenticate` 中下发的 Digest 质询
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub qop: Option<String>,
    pub algorithm: Option<String>,
}

impl DigestChallenge {
    /// 解析 `Digest realm="..", nonce="..", qop="auth"`，缺少 realm 或 nonce 时返回 None
    pub fn parse(header: &str) -> Option<Self> {
        let params = parse_params(strip_scheme(header, "Digest")?);
        let realm = find_param(&params, "realm")?;
        let nonce = find_param(&params, "nonce")?;

        // 摄像头可能同时声明 auth 和 auth-int，只支持 auth
        let qop = find_param(&params, "qop").map(|qop| {
            let options: Vec<&str> = qop.split(',').map(str::trim).collect();
            if options.contains(&"auth") {
                "auth".to_string()
            } else {
                options.first().map(|s| s.to_string()).unwrap_or_default()
            }
        });

        Some(Self {
            realm,
            nonce,
            opaque: find_param(&params, "opaque"),
            qop: qop.filter(|q| !q.is_empty()),
            algorithm: find_param(&params, "algorithm"),
        })
    }

    /// 渲染为 `WWW-Authenticate` 头
    pub fn render(&self) -> String {
        let mut header = format!(r#"Digest realm="{}", nonce="{}""#, self.realm, self.nonce);
        if let Some(qop) = &self.qop {
            header.push_str(&format!(r#", qop="{}""#, qop));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(r#", opaque="{}""#, opaque));
        }
        header
    }
}

/// 计算 Digest response 值
pub fn digest_response(
    username: &str,
    password: &str,
    realm: &str,
    method: &str,
    uri: &str,
    nonce: &str,
    qop: Option<(&str, &str, &str)>,
) -> String {
    let ha1 = md5_hex(&format!("{}:{}:{}", username, realm, password));
    let ha2 = md5_hex(&format!("{}:{}", method, uri));
    match qop {
        Some((qop, nc, cnonce)) => {
            md5_hex(&format!("{}:{}:{}:{}:{}:{}", ha1, nonce, nc, cnonce, qop, ha2))
        }
        None => md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2)),
    }
}

/// 客户端 Digest 状态：保存质询并维护 nc 计数
#[derive(Debug, Clone)]
pub struct DigestAuth {
    username: String,
    password: String,
    challenge: DigestChallenge,
    nonce_count: u32,
}

impl DigestAuth {
    pub fn new(username: &str, password: &str, challenge: DigestChallenge) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            challenge,
            nonce_count: 0,
        }
    }

    pub fn challenge(&self) -> &DigestChallenge {
        &self.challenge
    }

    /// 为一次请求生成 `Authorization` 头
    pub fn authorization(&mut self, method: &str, uri: &str) -> String {
        let cnonce = random_hex();
        self.authorization_with_cnonce(method, uri, &cnonce)
    }

    pub fn authorization_with_cnonce(&mut self, method: &str, uri: &str, cnonce: &str) -> String {
        self.nonce_count += 1;
        if self.nonce_count > MAX_NONCE_COUNT {
            self.nonce_count = 1;
        }
        let nc = format!("{:08x}", self.nonce_count);
        let challenge = &self.challenge;

        let mut header = match challenge.qop.as_deref() {
            Some(qop) => {
                let response = digest_response(
                    &self.username,
                    &self.password,
                    &challenge.realm,
                    method,
                    uri,
                    &challenge.nonce,
                    Some((qop, &nc, cnonce)),
                );
                format!(
                    r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", cnonce="{}", nc={}, qop="{}", response="{}""#,
                    self.username, challenge.realm, challenge.nonce, uri, cnonce, nc, qop, response
                )
            }
            None => {
                let response = digest_response(
                    &self.username,
                    &self.password,
                    &challenge.realm,
                    method,
                    uri,
                    &challenge.nonce,
                    None,
                );
                format!(
                    r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}""#,
                    self.username, challenge.realm, challenge.nonce, uri, response
                )
            }
        };

        if let Some(opaque) = &challenge.opaque {
            header.push_str(&format!(r#", opaque="{}""#, opaque));
        }
        header
    }
}

/// 服务端收到的 Digest `Authorization` 头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestCredentials {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
}

impl DigestCredentials {
    pub fn parse(authorization: &str) -> Option<Self> {
        let params = parse_params(strip_scheme(authorization, "Digest")?);
        Some(Self {
            username: find_param(&params, "username")?,
            realm: find_param(&params, "realm")?,
            nonce: find_param(&params, "nonce")?,
            uri: find_param(&params, "uri")?,
            response: find_param(&params, "response")?,
            qop: find_param(&params, "qop"),
            nc: find_param(&params, "nc"),
            cnonce: find_param(&params, "cnonce"),
        })
    }

    /// 用服务端已知的密码重新计算 response 并比对
    pub fn verify(&self, password: &str, method: &str) -> bool {
        let qop = match (&self.qop, &self.nc, &self.cnonce) {
            (Some(qop), Some(nc), Some(cnonce)) => Some((qop.as_str(), nc.as_str(), cnonce.as_str())),
            (None, _, _) => None,
            _ => return false,
        };
        let expected = digest_response(
            &self.username,
            password,
            &self.realm,
            method,
            &self.uri,
            &self.nonce,
            qop,
        );
        expected == self.response
    }
}
