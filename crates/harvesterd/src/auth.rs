//! Token authentication and access logging middleware.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

// ============================================================
// Token set
// ============================================================

fn enabled_by_default() -> bool {
    true
}

/// One accepted token. Only the label is ever logged.
#[derive(Clone, Deserialize, PartialEq)]
pub(crate) struct TokenEntry {
    token: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

impl std::fmt::Debug for TokenEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEntry")
            .field("label", &self.label)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DenyReason {
    MissingToken,
    InvalidToken,
    Revoked,
}

impl DenyReason {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            DenyReason::MissingToken => "missing_token",
            DenyReason::InvalidToken => "invalid_token",
            DenyReason::Revoked => "revoked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AuthDecision {
    Allowed { label: Option<String> },
    Denied { reason: DenyReason, label: Option<String> },
}

/// Immutable set of tokens accepted by the daemon. Empty means auth is off.
#[derive(Debug, Default)]
pub(crate) struct TokenSet {
    entries: Vec<TokenEntry>,
}

impl TokenSet {
    /// Tokens given on the command line or in the environment, labelled `env-N`.
    pub(crate) fn from_tokens(tokens: &[String]) -> Self {
        let entries = tokens
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .enumerate()
            .map(|(idx, token)| TokenEntry {
                token: token.to_string(),
                label: Some(format!("env-{}", idx + 1)),
                enabled: true,
            })
            .collect();
        Self { entries }
    }

    /// Parses a token file: a JSON list of `{token, label?, enabled?}` objects.
    /// Entries without a usable token are skipped with a warning.
    pub(crate) fn from_json(text: &str, origin: &str) -> Result<Self, String> {
        let items: Vec<serde_json::Value> = serde_json::from_str(text)
            .map_err(|e| format!("token file {} must be a JSON list: {}", origin, e))?;
        let mut entries = Vec::new();
        for (idx, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<TokenEntry>(item) {
                Ok(entry) if !entry.token.trim().is_empty() => entries.push(entry),
                Ok(_) => warn!(file = origin, entry = idx, "token entry with empty token skipped"),
                Err(e) => warn!(file = origin, entry = idx, error = %e, "invalid token entry skipped"),
            }
        }
        Ok(Self { entries })
    }

    /// Token file wins over inline tokens when both are given.
    pub(crate) fn load(tokens: &[String], file: Option<&Path>) -> Result<Self, String> {
        match file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| format!("cannot read token file {}: {}", path.display(), e))?;
                let set = Self::from_json(&text, &path.display().to_string())?;
                if !tokens.is_empty() {
                    warn!("both a token file and inline tokens given, inline tokens ignored");
                }
                Ok(set)
            }
            None => Ok(Self::from_tokens(tokens)),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks a presented token against every entry without short-circuiting.
    pub(crate) fn check(&self, presented: Option<&str>) -> AuthDecision {
        let Some(presented) = presented.filter(|p| !p.is_empty()) else {
            return AuthDecision::Denied {
                reason: DenyReason::MissingToken,
                label: None,
            };
        };

        let mut matched: Option<&TokenEntry> = None;
        for entry in &self.entries {
            let equal: bool = entry.token.as_bytes().ct_eq(presented.as_bytes()).into();
            if equal && matched.is_none() {
                matched = Some(entry);
            }
        }

        match matched {
            Some(entry) if entry.enabled => AuthDecision::Allowed {
                label: entry.label.clone(),
            },
            Some(entry) => AuthDecision::Denied {
                reason: DenyReason::Revoked,
                label: entry.label.clone(),
            },
            None => AuthDecision::Denied {
                reason: DenyReason::InvalidToken,
                label: None,
            },
        }
    }
}

/// Token from `Authorization: Bearer <token>` or `X-Auth-Token: <token>`.
pub(crate) fn presented_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION)
        && let Ok(s) = value.to_str()
        && let Some((scheme, token)) = s.split_once(' ')
        && scheme.eq_ignore_ascii_case("bearer")
    {
        return Some(token.trim().to_owned());
    }
    headers
        .get("x-auth-token")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_owned())
}

fn unauthorized_json(reason: DenyReason, label: Option<&str>) -> Response {
    let mut body = serde_json::json!({"error": "unauthorized", "reason": reason.as_str()});
    if let Some(label) = label {
        body["label"] = serde_json::Value::from(label);
    }
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-store"));
    headers.insert(header::WWW_AUTHENTICATE, header::HeaderValue::from_static("Bearer"));
    response
}

// ============================================================
// Token auth layer (tower Layer + Service)
// ============================================================

/// Label of the token presented with the request, carried on the response
/// for the access log.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TokenLabel(pub(crate) String);

#[derive(Clone)]
pub(crate) struct TokenAuthLayer {
    pub(crate) tokens: Arc<TokenSet>,
}

impl<S> tower::Layer<S> for TokenAuthLayer {
    type Service = TokenAuthService<S>;
    fn layer(&self, inner: S) -> Self::Service {
        TokenAuthService {
            inner,
            tokens: self.tokens.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct TokenAuthService<S> {
    inner: S,
    tokens: Arc<TokenSet>,
}

impl<S> tower::Service<Request> for TokenAuthService<S>
where
    S: tower::Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        if self.tokens.is_empty() {
            return Box::pin(async move { inner.call(req).await });
        }

        let path = req.uri().path().to_owned();
        let client = client_addr(&req);
        match self.tokens.check(presented_token(req.headers()).as_deref()) {
            AuthDecision::Allowed { label } => {
                debug!(client, path, label = label.as_deref().unwrap_or("-"), "authenticated");
                Box::pin(async move {
                    let mut response = inner.call(req).await?;
                    if let Some(label) = label {
                        response.extensions_mut().insert(TokenLabel(label));
                    }
                    Ok(response)
                })
            }
            AuthDecision::Denied { reason, label } => {
                warn!(
                    client,
                    path,
                    reason = reason.as_str(),
                    label = label.as_deref().unwrap_or("-"),
                    "unauthorized request"
                );
                let mut response = unauthorized_json(reason, label.as_deref());
                if let Some(label) = label {
                    response.extensions_mut().insert(TokenLabel(label));
                }
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

fn client_addr(req: &Request) -> String {
    req.extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "-".to_owned())
}

// ============================================================
// Access log layer (tower Layer + Service)
// ============================================================

#[derive(Clone)]
pub(crate) struct AccessLogLayer;

impl<S> tower::Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;
    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService { inner }
    }
}

#[derive(Clone)]
pub(crate) struct AccessLogService<S> {
    inner: S,
}

impl<S> tower::Service<Request> for AccessLogService<S>
where
    S: tower::Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let client = client_addr(&req);
        let t0 = Instant::now();

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let response = inner.call(req).await?;
            let latency_ms = t0.elapsed().as_millis() as u64;
            let status = response.status().as_u16();
            let label = response
                .extensions()
                .get::<TokenLabel>()
                .map_or("-", |l| l.0.as_str());
            info!(client, label, status, latency_ms, "{method} {path}");
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn tokens() -> TokenSet {
        TokenSet::from_json(
            r#"[
                {"token": "alpha-secret", "label": "ops"},
                {"token": "old-secret", "label": "retired", "enabled": false},
                {"label": "no token here"},
                {"token": "  "},
                "not-an-object"
            ]"#,
            "tokens.json",
        )
        .unwrap()
    }

    #[test]
    fn test_token_file_skips_invalid_entries() {
        assert_eq!(tokens().len(), 2);
        assert!(TokenSet::from_json(r#"{"token": "x"}"#, "t.json").is_err());
    }

    #[test]
    fn test_auth_decisions() {
        let set = tokens();
        assert_eq!(
            set.check(Some("alpha-secret")),
            AuthDecision::Allowed {
                label: Some("ops".into())
            }
        );
        assert_eq!(
            set.check(Some("old-secret")),
            AuthDecision::Denied {
                reason: DenyReason::Revoked,
                label: Some("retired".into())
            }
        );
        assert_eq!(
            set.check(Some("alpha")),
            AuthDecision::Denied {
                reason: DenyReason::InvalidToken,
                label: None
            }
        );
        assert_eq!(
            set.check(None),
            AuthDecision::Denied {
                reason: DenyReason::MissingToken,
                label: None
            }
        );
    }

    #[test]
    fn test_inline_tokens_are_labelled() {
        let set = TokenSet::from_tokens(&["a".into(), " ".into(), "b".into()]);
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.check(Some("b")),
            AuthDecision::Allowed {
                label: Some("env-2".into())
            }
        );
    }

    #[test]
    fn test_token_file_wins_over_inline_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, r#"[{"token": "from-file"}]"#).unwrap();
        let set = TokenSet::load(&["inline".into()], Some(&path)).unwrap();
        assert!(matches!(set.check(Some("from-file")), AuthDecision::Allowed { .. }));
        assert!(matches!(set.check(Some("inline")), AuthDecision::Denied { .. }));

        assert!(TokenSet::load(&[], Some(&dir.path().join("missing.json"))).is_err());
    }

    #[test]
    fn test_presented_token_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_token(&headers), None);

        headers.insert("x-auth-token", HeaderValue::from_static("from-header"));
        assert_eq!(presented_token(&headers).as_deref(), Some("from-header"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(presented_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn test_debug_never_shows_token() {
        let rendered = format!("{:?}", tokens());
        assert!(!rendered.contains("alpha-secret"));
        assert!(rendered.contains("ops"));
    }
}
