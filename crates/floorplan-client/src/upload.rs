//! Upload submitter: pre-signed target + direct binary transfer.

use std::path::Path;

use async_trait::async_trait;

use crate::api::ApiClient;
use crate::config::UploadLimits;
use crate::error::{ClientError, Result};

/// Marker sent as the username when nobody is signed in.
pub const UNAUTHENTICATED: &str = "unauthenticated";

/// Content type implied by a file name's extension.
pub fn guess_content_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// An image selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    name: String,
    content_type: String,
    bytes: Vec<u8>,
}

impl UploadFile {
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing its content type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let content_type = guess_content_type(&name);
        Ok(Self::from_bytes(name, content_type, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reject files the back end would refuse anyway.
    pub fn validate(&self, limits: &UploadLimits) -> Result<()> {
        let lower = self.name.to_ascii_lowercase();
        if !limits
            .accepted_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
        {
            return Err(ClientError::InvalidUpload {
                name: self.name.clone(),
                reason: format!(
                    "unsupported file type, expected one of {}",
                    limits.accepted_extensions.join(", ")
                ),
            });
        }
        if self.is_empty() {
            return Err(ClientError::InvalidUpload {
                name: self.name.clone(),
                reason: "file is empty".to_string(),
            });
        }
        if self.len() > limits.max_bytes {
            return Err(ClientError::InvalidUpload {
                name: self.name.clone(),
                reason: format!("{} bytes exceeds the {} byte limit", self.len(), limits.max_bytes),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub email: Option<String>,
}

/// Session state supplied by the external identity provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_user(&self) -> Option<User>;

    /// Access token when the session is authenticated.
    async fn access_token(&self) -> Option<String>;
}

/// No identity provider: every upload is unauthenticated.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

#[async_trait]
impl AuthProvider for Anonymous {
    async fn current_user(&self) -> Option<User> {
        None
    }

    async fn access_token(&self) -> Option<String> {
        None
    }
}

/// Fixed identity, e.g. a token passed on the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    pub user: Option<User>,
    pub token: Option<String>,
}

#[async_trait]
impl AuthProvider for StaticSession {
    async fn current_user(&self) -> Option<User> {
        self.user.clone()
    }

    async fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Identity headers attached to the upload-target request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    username: String,
    token: Option<String>,
}

impl AuthHeaders {
    pub fn new(email: Option<&str>, token: Option<String>) -> Self {
        Self {
            username: email
                .filter(|e| !e.is_empty())
                .unwrap_or(UNAUTHENTICATED)
                .to_string(),
            token,
        }
    }

    pub async fn resolve(user: Option<&User>, auth: &dyn AuthProvider) -> Self {
        let token = auth.access_token().await;
        Self::new(user.and_then(|u| u.email.as_deref()), token)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// Upload `file` and return the name the back end stored it under.
///
/// Single shot: a failed transfer is not cleaned up, callers retry the whole call.
pub async fn upload_image(
    api: &ApiClient,
    auth: &dyn AuthProvider,
    user: Option<&User>,
    file: &UploadFile,
    limits: &UploadLimits,
) -> Result<String> {
    file.validate(limits)?;

    let headers = AuthHeaders::resolve(user, auth).await;
    tracing::debug!(
        file = %file.name(),
        bytes = file.len(),
        authenticated = headers.is_authenticated(),
        "Requesting upload target"
    );

    let target = api.upload_target(file.content_type(), &headers).await?;
    api.put_object(&target.url, file, limits.max_bytes).await?;

    tracing::info!(file = %file.name(), image_name = %target.image_name, "Image uploaded");
    Ok(target.image_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png(bytes: usize) -> UploadFile {
        UploadFile::from_bytes("plan.PNG", "image/png", vec![0u8; bytes])
    }

    fn api(server: &MockServer) -> ApiClient {
        let base = reqwest::Url::parse(&format!("{}/api/", server.uri())).unwrap();
        ApiClient::with_timeout(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn validate_accepts_known_extensions_case_insensitively() {
        assert!(png(10).validate(&UploadLimits::default()).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_extension() {
        let file = UploadFile::from_bytes("plan.gif", "image/gif", vec![1]);
        let err = file.validate(&UploadLimits::default()).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUpload { ref name, .. } if name == "plan.gif"));
    }

    #[test]
    fn validate_rejects_oversize_and_empty() {
        let limits = UploadLimits {
            max_bytes: 8,
            ..Default::default()
        };
        assert!(png(9).validate(&limits).is_err());
        assert!(png(8).validate(&limits).is_ok());
        assert!(png(0).validate(&limits).is_err());
    }

    #[tokio::test]
    async fn from_path_guesses_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.jpeg");
        std::fs::write(&path, b"jpeg bytes").unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.name(), "flat.jpeg");
        assert_eq!(file.content_type(), "image/jpeg");
        assert_eq!(file.bytes(), b"jpeg bytes");
    }

    #[test]
    fn guesses_from_extension() {
        assert_eq!(guess_content_type("a.png"), "image/png");
        assert_eq!(guess_content_type("a.JPG"), "image/jpeg");
        assert_eq!(guess_content_type("no-extension"), "application/octet-stream");
    }

    #[test]
    fn headers_for_anonymous_user() {
        let headers = AuthHeaders::new(None, None);
        assert_eq!(headers.username(), UNAUTHENTICATED);
        assert_eq!(headers.bearer(), None);
        assert!(!headers.is_authenticated());
    }

    #[test]
    fn headers_for_signed_in_user() {
        let headers = AuthHeaders::new(Some("ada@example.com"), Some("abc".into()));
        assert_eq!(headers.username(), "ada@example.com");
        assert_eq!(headers.bearer().as_deref(), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn resolve_uses_provider_token_and_user_email() {
        let session = StaticSession {
            user: Some(User {
                name: "Ada".into(),
                email: Some("ada@example.com".into()),
            }),
            token: Some("t0k".into()),
        };
        let user = session.current_user().await;
        let headers = AuthHeaders::resolve(user.as_ref(), &session).await;
        assert_eq!(headers, AuthHeaders::new(Some("ada@example.com"), Some("t0k".into())));

        let anonymous = AuthHeaders::resolve(None, &Anonymous).await;
        assert_eq!(anonymous.username(), UNAUTHENTICATED);
    }

    #[tokio::test]
    async fn upload_image_requests_target_then_puts_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/images/upload-url"))
            .and(header("username", UNAUTHENTICATED))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": format!("{}/bucket/img-1", server.uri()),
                "image_name": "img-1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/bucket/img-1"))
            .and(header_exists("x-goog-content-length-range"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let name = upload_image(
            &api(&server),
            &Anonymous,
            None,
            &png(16),
            &UploadLimits::default(),
        )
        .await
        .unwrap();
        assert_eq!(name, "img-1");
    }

    #[tokio::test]
    async fn upload_image_fails_when_target_request_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = upload_image(
            &api(&server),
            &Anonymous,
            None,
            &png(16),
            &UploadLimits::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn invalid_file_never_reaches_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let file = UploadFile::from_bytes("notes.txt", "text/plain", vec![1]);
        let err = upload_image(&api(&server), &Anonymous, None, &file, &UploadLimits::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidUpload { .. }));
    }
}
