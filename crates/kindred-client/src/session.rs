use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use tracing::{debug, info};
use url::Url;

use kindred_types::api::ProfileResponse;
use kindred_types::models::Viewer;

use crate::error::{ChatError, Result};

pub const DEFAULT_COOKIE_NAME: &str = "token";

/// Session credentials presented on every REST call and on the channel upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub cookie_name: String,
    pub token: Option<String>,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.into(),
            token: None,
        }
    }
}

impl Credentials {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// `Cookie` header value, if a token is present.
    pub fn cookie_header(&self) -> Option<String> {
        self.token
            .as_ref()
            .map(|token| format!("{}={}", self.cookie_name, token))
    }

    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self.cookie_header() {
            Some(cookie) => request.header(header::COOKIE, cookie),
            None => request,
        }
    }
}

/// Identity and credentials handed to a conversation when it is mounted.
///
/// The viewer may still be unknown at mount time; the conversation is told
/// about it later through [`crate::Conversation::set_viewer`].
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub viewer: Option<Viewer>,
    pub credentials: Credentials,
}

impl SessionContext {
    pub fn new(viewer: Option<Viewer>, credentials: Credentials) -> Self {
        Self { viewer, credentials }
    }
}

/// Resolves the signed-in viewer from `GET /profile/view`.
#[derive(Debug, Clone)]
pub struct ProfileClient {
    client: Client,
    api_url: Url,
    credentials: Credentials,
}

impl ProfileClient {
    pub fn new(client: Client, api_url: Url, credentials: Credentials) -> Self {
        Self {
            client,
            api_url,
            credentials,
        }
    }

    pub async fn view(&self) -> Result<Viewer> {
        let url = endpoint(&self.api_url, &["profile", "view"])?;
        debug!("Resolving viewer from {}", url);

        let resp = self
            .credentials
            .apply(self.client.get(url.clone()))
            .send()
            .await?;
        let profile: ProfileResponse = check_status(resp).await?.json().await?;

        info!("Signed in as {} ({})", profile.first_name, profile.id);
        Ok(profile.into())
    }
}

/// Append path segments to a base URL, keeping any path prefix the base has.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ChatError::Config(format!("{} cannot be used as a base url", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Map non-success responses onto the error kinds the conversation logs.
pub(crate) async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ChatError::Unauthorized),
        _ => Err(ChatError::Status {
            status,
            url: resp.url().to_string(),
        }),
    }
}
