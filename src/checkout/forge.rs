//! Source-forge REST lookups
//!
//! Only the two queries the checkout resolver needs: "does the source author
//! own a fork of this repository" and "does a pull request exist from this
//! head into this base". Lookup misses are negotiated negative results
//! (`None`/`false`), never errors.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

/// Fork and pull-request lookups against a source forge.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// Name of `source_owner`'s fork of `target_owner/repo`, if one exists.
    ///
    /// Forks can be renamed, so the returned name may differ from `repo`.
    async fn fork_name(
        &self,
        target_owner: &str,
        source_owner: &str,
        repo: &str,
    ) -> Result<Option<String>>;

    /// Whether an open pull request exists from `head` into `base_branch`
    /// on `owner/repo`. `head` uses the forge's `owner:branch` form.
    async fn has_pull_request(
        &self,
        owner: &str,
        repo: &str,
        head: &str,
        base_branch: &str,
    ) -> Result<bool>;
}

/// GitHub REST API client.
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForkRecord {
    name: String,
    owner: ForkOwner,
}

#[derive(Debug, Deserialize)]
struct ForkOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoRecord {
    name: String,
    #[serde(default)]
    fork: bool,
    parent: Option<RepoParent>,
}

#[derive(Debug, Deserialize)]
struct RepoParent {
    full_name: String,
}

/// Whether a repository record is a fork of `target_owner/repo`.
fn is_fork_of(record: &RepoRecord, target_owner: &str, repo: &str) -> bool {
    record.fork
        && record
            .parent
            .as_ref()
            .is_some_and(|parent| parent.full_name == format!("{target_owner}/{repo}"))
}

/// Whether a `Link` response header announces a further result page.
fn has_next_page(link: Option<&str>) -> bool {
    link.is_some_and(|value| value.split(',').any(|part| part.contains("rel=\"next\"")))
}

impl GithubClient {
    /// Create a client for the given API base URL with an optional token.
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("build-chain/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Fast path: the author's fork kept the upstream repository name, so
    /// `source_owner/repo` exists and its parent is `target_owner/repo`.
    async fn same_name_fork(
        &self,
        target_owner: &str,
        source_owner: &str,
        repo: &str,
    ) -> Result<Option<String>> {
        let url = format!("{}/repos/{source_owner}/{repo}", self.api_url);
        let response = self
            .get(url)
            .send()
            .await
            .with_context(|| format!("Fork lookup failed for {source_owner}/{repo}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            bail!(
                "Fork lookup for {source_owner}/{repo} returned {}",
                response.status()
            );
        }

        let record: RepoRecord = response
            .json()
            .await
            .context("Failed to decode repository")?;
        if is_fork_of(&record, target_owner, repo) {
            Ok(Some(record.name))
        } else {
            Ok(None)
        }
    }

    /// Renamed forks only show up in the target's fork list; follow
    /// pagination until the author's fork is found or every page is
    /// exhausted.
    async fn renamed_fork(
        &self,
        target_owner: &str,
        source_owner: &str,
        repo: &str,
    ) -> Result<Option<String>> {
        let mut page: u32 = 1;
        loop {
            let url = format!(
                "{}/repos/{target_owner}/{repo}/forks?per_page=100&page={page}",
                self.api_url
            );
            let response = self
                .get(url)
                .send()
                .await
                .with_context(|| format!("Fork lookup failed for {target_owner}/{repo}"))?;

            // A repository without forks (or a missing repository) is a
            // miss, not an error: the resolver falls through to the next
            // case.
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !response.status().is_success() {
                bail!(
                    "Fork lookup for {target_owner}/{repo} returned {}",
                    response.status()
                );
            }

            let more_pages = has_next_page(
                response
                    .headers()
                    .get(reqwest::header::LINK)
                    .and_then(|value| value.to_str().ok()),
            );
            let forks: Vec<ForkRecord> = response
                .json()
                .await
                .context("Failed to decode fork list")?;

            if let Some(fork) = forks.into_iter().find(|fork| fork.owner.login == source_owner)
            {
                return Ok(Some(fork.name));
            }
            if !more_pages {
                return Ok(None);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl ForgeClient for GithubClient {
    async fn fork_name(
        &self,
        target_owner: &str,
        source_owner: &str,
        repo: &str,
    ) -> Result<Option<String>> {
        if let Some(name) = self.same_name_fork(target_owner, source_owner, repo).await? {
            return Ok(Some(name));
        }
        self.renamed_fork(target_owner, source_owner, repo).await
    }

    async fn has_pull_request(
        &self,
        owner: &str,
        repo: &str,
        head: &str,
        base_branch: &str,
    ) -> Result<bool> {
        let url = format!(
            "{}/repos/{owner}/{repo}/pulls?state=open&head={head}&base={base_branch}",
            self.api_url
        );
        let response = self
            .get(url)
            .send()
            .await
            .with_context(|| format!("Pull request lookup failed for {owner}/{repo}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            bail!(
                "Pull request lookup for {owner}/{repo} returned {}",
                response.status()
            );
        }

        let pulls: Vec<serde_json::Value> = response
            .json()
            .await
            .context("Failed to decode pull request list")?;

        Ok(!pulls.is_empty())
    }
}

/// Forge stub that answers every lookup with a miss, so resolution always
/// lands on the no-pull-request case without touching the network.
pub struct NullForge;

#[async_trait]
impl ForgeClient for NullForge {
    async fn fork_name(&self, _: &str, _: &str, _: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn has_pull_request(&self, _: &str, _: &str, _: &str, _: &str) -> Result<bool> {
        Ok(false)
    }
}
