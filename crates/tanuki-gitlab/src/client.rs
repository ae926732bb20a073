//! Thin GitLab REST client for the few calls the session layer needs.

use reqwest::{header, Client};
use tracing::instrument;
use url::Url;

use tanuki_auth::Credential;

use crate::error::GitlabError;
use crate::types::{CurrentUser, Project, User};

/// Client for one server, authenticated with one credential.
#[derive(Debug, Clone)]
pub struct GitlabClient {
    base_url: Url,
    client: Client,
    credential: Credential,
}

impl GitlabClient {
    /// Create a client for `server_url` authenticating with `credential`.
    pub fn new(server_url: &str, credential: Credential) -> Result<Self, GitlabError> {
        let base_url =
            Url::parse(server_url).map_err(|e| GitlabError::InvalidUrl(e.to_string()))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url,
            client,
            credential,
        })
    }

    /// Validate the credential and fetch the user it belongs to.
    #[instrument(skip(self), level = "info")]
    pub async fn authenticate(&self) -> Result<CurrentUser, GitlabError> {
        let request = self.build_request(self.client.get(self.api_url("user")));
        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Look up a user by exact username.
    #[instrument(skip(self), level = "info")]
    pub async fn find_user(&self, username: &str) -> Result<Option<User>, GitlabError> {
        let url = format!(
            "{}?username={}",
            self.api_url("users"),
            urlencoding::encode(username)
        );

        let request = self.build_request(self.client.get(&url));
        let response = request.send().await?;
        let users: Vec<User> = self.handle_response(response).await?;

        Ok(users.into_iter().next())
    }

    /// Projects belonging to `user_id`.
    #[instrument(skip(self), level = "info")]
    pub async fn user_projects(&self, user_id: u64) -> Result<Vec<Project>, GitlabError> {
        let url = self.api_url(&format!("users/{}/projects", user_id));
        let request = self.build_request(self.client.get(&url));
        let response = request.send().await?;
        self.handle_response(response).await
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v4/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path
        )
    }

    /// Attach auth headers for the held credential.
    fn build_request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header(header::USER_AGENT, "tanuki");
        match &self.credential {
            Credential::Pat { access_token } => req.header("PRIVATE-TOKEN", access_token),
            Credential::OAuth { access_token, .. } => {
                req.header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            }
        }
    }

    /// Map response statuses onto typed errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, GitlabError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| GitlabError::Api {
                status: 0,
                message: format!("JSON parse error: {}", e),
            })
        } else if status.as_u16() == 401 {
            Err(GitlabError::Unauthorized)
        } else if status.as_u16() == 403 {
            Err(GitlabError::Forbidden)
        } else if status.as_u16() == 404 {
            let text = response.text().await.unwrap_or_default();
            Err(GitlabError::NotFound(text))
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(GitlabError::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }
}
