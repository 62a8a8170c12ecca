//! GitHub API client: repo metadata, tarball download, remote tree digest.

use std::io::Write as _;

use {futures::StreamExt as _, skilldock_config::{CatalogConfig, FetchLimits}};

use crate::{
    error::{Error, Result},
    hash,
};

const USER_AGENT: &str = "skilldock";

pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
    limits: FetchLimits,
}

impl GithubClient {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.fetch_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: "https://api.github.com".to_string(),
            token: config.github_token.clone(),
            limits: config.limits,
        })
    }

    /// Point the client at a different API base. Used by tests.
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub(crate) fn limits(&self) -> FetchLimits {
        self.limits
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Default branch of a repository, resolved via metadata lookup.
    /// Falls back to `main` when the lookup fails for any reason.
    pub async fn default_branch(&self, owner: &str, repo: &str) -> String {
        let url = format!("{}/repos/{owner}/{repo}", self.api_base);
        let branch = async {
            let resp = self.request(&url).send().await.ok()?;
            if !resp.status().is_success() {
                return None;
            }
            let value: serde_json::Value = resp.json().await.ok()?;
            value
                .get("default_branch")
                .and_then(|b| b.as_str())
                .map(ToOwned::to_owned)
        }
        .await;
        branch.unwrap_or_else(|| "main".to_string())
    }

    /// Latest commit SHA on a ref. Best-effort: `None` on any failure.
    pub async fn latest_commit_sha(&self, owner: &str, repo: &str, git_ref: &str) -> Option<String> {
        let url = format!(
            "{}/repos/{owner}/{repo}/commits?per_page=1&sha={git_ref}",
            self.api_base
        );
        let resp = self.request(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let value: serde_json::Value = resp.json().await.ok()?;
        value
            .as_array()?
            .first()?
            .get("sha")?
            .as_str()
            .filter(|sha| sha.len() == 40)
            .map(ToOwned::to_owned)
    }

    /// Stream a tarball for `(owner, repo, ref)` into a temp file, enforcing
    /// the download ceiling incrementally so an oversized repository is
    /// aborted before it accumulates.
    pub async fn download_tarball(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
    ) -> Result<tempfile::NamedTempFile> {
        let url = format!("{}/repos/{owner}/{repo}/tarball/{git_ref}", self.api_base);
        let resp = self.request(&url).send().await?;

        match resp.status().as_u16() {
            404 => return Err(Error::NotFoundOrPrivate),
            403 => return Err(Error::RateLimited),
            status if !resp.status().is_success() => {
                return Err(Error::network(format!(
                    "failed to fetch tarball: HTTP {status}"
                )));
            },
            _ => {},
        }

        let mut file = tempfile::Builder::new()
            .prefix("skilldock-tar-")
            .suffix(".tar.gz")
            .tempfile()?;
        let mut total: u64 = 0;
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            total += chunk.len() as u64;
            if total > self.limits.max_download_bytes {
                return Err(Error::size_limit(
                    format!("tarball download for {owner}/{repo}"),
                    self.limits.max_download_bytes,
                ));
            }
            file.write_all(&chunk)?;
        }
        file.flush()?;

        tracing::debug!(%owner, %repo, %git_ref, bytes = total, "downloaded tarball");
        Ok(file)
    }

    /// Lightweight remote digest of the subtree at `path`, computed from the
    /// recursive tree listing without downloading an archive. Uses the same
    /// line format as [`hash::content_hash`], so the two are comparable.
    /// `None` when the listing fails, is truncated, or covers no files —
    /// callers treat that as "unknown".
    pub async fn tree_digest(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Option<String> {
        let url = format!(
            "{}/repos/{owner}/{repo}/git/trees/{git_ref}?recursive=1",
            self.api_base
        );
        let resp = self.request(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let value: serde_json::Value = resp.json().await.ok()?;

        if value
            .get("truncated")
            .and_then(|t| t.as_bool())
            .unwrap_or(false)
        {
            tracing::debug!(%owner, %repo, "tree listing truncated, treating remote as unknown");
            return None;
        }

        let prefix = path.trim_matches('/');
        let mut lines = Vec::new();
        for entry in value.get("tree")?.as_array()? {
            if entry.get("type").and_then(|t| t.as_str()) != Some("blob") {
                continue;
            }
            let Some(entry_path) = entry.get("path").and_then(|p| p.as_str()) else {
                continue;
            };
            let rel = if prefix.is_empty() {
                entry_path
            } else {
                match entry_path.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
                    Some(r) => r,
                    None => continue,
                }
            };
            if rel.is_empty() || rel.split('/').any(hash::is_excluded_name) {
                continue;
            }
            let Some(sha) = entry.get("sha").and_then(|s| s.as_str()) else {
                continue;
            };
            lines.push(format!("{rel}:{sha}"));
        }

        if lines.is_empty() {
            return None;
        }
        Some(hash::digest_lines(lines))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::ServerGuard) -> GithubClient {
        let config = CatalogConfig {
            fetch_timeout_secs: 5,
            ..CatalogConfig::default()
        };
        GithubClient::new(&config)
            .unwrap()
            .with_api_base(server.url())
    }

    #[tokio::test]
    async fn default_branch_from_metadata_with_fallback() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/repos/o/r")
            .with_body(r#"{"default_branch":"develop"}"#)
            .create_async()
            .await;
        assert_eq!(client(&server).default_branch("o", "r").await, "develop");
        m.assert_async().await;

        // No mock for this repo: lookup fails, fall back to main.
        assert_eq!(client(&server).default_branch("o", "missing").await, "main");
    }

    #[tokio::test]
    async fn tarball_404_maps_to_not_found_or_private() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/o/r/tarball/main")
            .with_status(404)
            .create_async()
            .await;
        let err = client(&server)
            .download_tarball("o", "r", "main")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFoundOrPrivate));
    }

    #[tokio::test]
    async fn tarball_403_maps_to_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/o/r/tarball/main")
            .with_status(403)
            .create_async()
            .await;
        let err = client(&server)
            .download_tarball("o", "r", "main")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited));
    }

    #[tokio::test]
    async fn download_ceiling_aborts_stream() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/o/r/tarball/main")
            .with_body(vec![0u8; 4096])
            .create_async()
            .await;

        let config = CatalogConfig {
            fetch_timeout_secs: 5,
            limits: FetchLimits {
                max_download_bytes: 1024,
                ..FetchLimits::default()
            },
            ..CatalogConfig::default()
        };
        let client = GithubClient::new(&config)
            .unwrap()
            .with_api_base(server.url());
        let err = client.download_tarball("o", "r", "main").await.unwrap_err();
        assert!(matches!(err, Error::SizeLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn tree_digest_matches_local_content_hash() {
        let body = b"---\nname: demo\ndescription: d\n---\nbody\n";
        let blob = hash::git_blob_sha1(body);

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/o/r/git/trees/main")
            .match_query(mockito::Matcher::Any)
            .with_body(format!(
                r#"{{"truncated":false,"tree":[
                    {{"path":"skills/demo/SKILL.md","type":"blob","sha":"{blob}"}},
                    {{"path":"skills/demo","type":"tree","sha":"ffff"}},
                    {{"path":"skills/demo/.hidden","type":"blob","sha":"eeee"}}
                ]}}"#
            ))
            .create_async()
            .await;

        let remote = client(&server)
            .tree_digest("o", "r", "main", "skills/demo")
            .await
            .unwrap();

        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("SKILL.md"), body).unwrap();
        let (local, reason) = hash::content_hash(tmp.path());
        assert!(reason.is_none());
        assert_eq!(remote, local);
    }

    #[tokio::test]
    async fn truncated_tree_is_unknown() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/o/r/git/trees/main")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"truncated":true,"tree":[]}"#)
            .create_async()
            .await;
        assert!(client(&server).tree_digest("o", "r", "main", "").await.is_none());
    }
}
