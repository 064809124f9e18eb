use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use vigil_core::{ChangedFile, CommentSide, VigilError};

/// Returned by [`HostGateway::get_content`] for binary or non-UTF-8 content.
pub const BINARY_SENTINEL: &str = "[Binary file not shown]";
/// Returned by [`HostGateway::get_content`] when neither ref has the path.
pub const UNAVAILABLE_SENTINEL: &str = "[File content unavailable]";

const PER_PAGE: u32 = 100;
const MAX_PAGES: u32 = 50;

/// Whether `content` is one of the degraded-content sentinels.
///
/// # Examples
///
/// ```
/// use vigil_review::github::{is_sentinel, BINARY_SENTINEL};
///
/// assert!(is_sentinel(BINARY_SENTINEL));
/// assert!(!is_sentinel("fn main() {}"));
/// ```
pub fn is_sentinel(content: &str) -> bool {
    content == BINARY_SENTINEL || content == UNAVAILABLE_SENTINEL
}

/// Identifies a pull request on the host.
///
/// # Examples
///
/// ```
/// use vigil_review::github::PullRequestId;
///
/// let pr: PullRequestId = "rust-lang/rust#12345".parse().unwrap();
/// assert_eq!(pr.owner, "rust-lang");
/// assert_eq!(pr.repo, "rust");
/// assert_eq!(pr.number, 12345);
/// assert_eq!(pr.to_string(), "rust-lang/rust#12345");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestId {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl std::str::FromStr for PullRequestId {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_pr_reference(s)
    }
}

impl std::fmt::Display for PullRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Parse a PR reference string (`owner/repo#number`) into its components.
///
/// # Errors
///
/// Returns [`VigilError::Config`] if the format is invalid.
///
/// # Examples
///
/// ```
/// use vigil_review::github::parse_pr_reference;
///
/// let pr = parse_pr_reference("octocat/hello-world#42").unwrap();
/// assert_eq!(pr.repo, "hello-world");
/// assert!(parse_pr_reference("octocat/hello-world").is_err());
/// ```
pub fn parse_pr_reference(pr_ref: &str) -> Result<PullRequestId, VigilError> {
    let invalid =
        || VigilError::Config(format!("invalid PR reference '{pr_ref}', expected owner/repo#number"));
    let (owner_repo, number_str) = pr_ref.trim().split_once('#').ok_or_else(invalid)?;
    let (owner, repo) = owner_repo.split_once('/').ok_or_else(invalid)?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return Err(invalid());
    }
    let number: u64 = number_str
        .parse()
        .map_err(|_| VigilError::Config(format!("invalid PR number: {number_str}")))?;
    Ok(PullRequestId {
        owner: owner.to_string(),
        repo: repo.to_string(),
        number,
    })
}

/// Head and base commits of a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    pub head_commit: String,
    pub base_commit: String,
}

/// A conversation comment on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostComment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
}

impl HostComment {
    /// Comment text, empty if the host sent none.
    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}

/// A line-anchored review comment to post.
///
/// `start_line` is only set for multi-line ranges; the host rejects a
/// `start_line` equal to `line`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewCommentRequest {
    pub commit_id: String,
    pub path: String,
    pub body: String,
    pub side: CommentSide,
    pub start_line: Option<u32>,
    pub line: u32,
}

impl ReviewCommentRequest {
    /// Request payload for the pull request review comments endpoint.
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_core::CommentSide;
    /// use vigil_review::github::ReviewCommentRequest;
    ///
    /// let req = ReviewCommentRequest {
    ///     commit_id: "abc".into(),
    ///     path: "src/a.rs".into(),
    ///     body: "x".into(),
    ///     side: CommentSide::Right,
    ///     start_line: None,
    ///     line: 4,
    /// };
    /// let payload = req.to_payload();
    /// assert_eq!(payload["line"], 4);
    /// assert!(payload.get("start_line").is_none());
    /// ```
    pub fn to_payload(&self) -> serde_json::Value {
        let mut payload = json!({
            "body": self.body,
            "commit_id": self.commit_id,
            "path": self.path,
            "line": self.line,
            "side": self.side,
        });
        if let Some(start) = self.start_line {
            payload["start_line"] = json!(start);
            payload["start_side"] = json!(self.side);
        }
        payload
    }
}

/// One entry of a repository directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectoryEntry {
    pub path: String,
    /// `file`, `dir`, `symlink` or `submodule`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Source-control host operations the orchestrator depends on.
///
/// Implemented for GitHub by [`OctocrabHost`]; tests supply in-memory fakes.
#[async_trait]
pub trait HostGateway: Send + Sync {
    /// Resolve the head and base commits of the pull request.
    async fn get_pull_request(&self, pr: &PullRequestId) -> Result<PullRequestRef, VigilError>;

    /// Files changed between two commits, with their patches.
    async fn get_files_between_commits(
        &self,
        pr: &PullRequestId,
        base: &str,
        head: &str,
    ) -> Result<Vec<ChangedFile>, VigilError>;

    /// Full content of `path`, read from `head_ref` and falling back to
    /// `base_ref`. Missing or binary files yield a sentinel string.
    async fn get_content(
        &self,
        pr: &PullRequestId,
        base_ref: &str,
        head_ref: &str,
        path: &str,
    ) -> Result<String, VigilError>;

    /// Every conversation comment on the pull request, oldest first.
    async fn list_comments(&self, pr: &PullRequestId) -> Result<Vec<HostComment>, VigilError>;

    /// Post a conversation comment.
    async fn create_comment(&self, pr: &PullRequestId, body: &str) -> Result<(), VigilError>;

    /// Post a line-anchored review comment.
    async fn create_review_comment(
        &self,
        pr: &PullRequestId,
        comment: &ReviewCommentRequest,
    ) -> Result<(), VigilError>;

    /// List a repository directory at `git_ref`. An empty path is the root.
    async fn list_directory(
        &self,
        pr: &PullRequestId,
        git_ref: &str,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, VigilError>;
}

/// GitHub implementation of [`HostGateway`].
///
/// JSON endpoints go through `octocrab`; raw file contents are fetched with
/// `reqwest` so binary payloads can be detected before decoding.
///
/// # Examples
///
/// ```no_run
/// use vigil_review::github::OctocrabHost;
///
/// let host = OctocrabHost::new("ghp_xxxx", "https://api.github.com").unwrap();
/// ```
pub struct OctocrabHost {
    octocrab: octocrab::Octocrab,
    http: reqwest::Client,
    token: String,
    api_url: String,
}

#[derive(Serialize)]
struct PageParams {
    per_page: u32,
    page: u32,
}

#[derive(Deserialize)]
struct PullDto {
    head: CommitRefDto,
    base: CommitRefDto,
}

#[derive(Deserialize)]
struct CommitRefDto {
    sha: String,
}

#[derive(Deserialize)]
struct CompareDto {
    #[serde(default)]
    files: Vec<ChangedFile>,
}

impl OctocrabHost {
    /// Create a client for the given token and API root.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::Config`] if the token is empty or the API URL is
    /// invalid, or [`VigilError::Host`] if the client cannot be built.
    pub fn new(token: &str, api_url: &str) -> Result<Self, VigilError> {
        if token.trim().is_empty() {
            return Err(VigilError::Config(
                "GitHub token not set. Pass --github-token or set GITHUB_TOKEN".into(),
            ));
        }
        let api_url = api_url.trim_end_matches('/').to_string();

        let octocrab = octocrab::Octocrab::builder()
            .personal_token(token.to_string())
            .base_uri(api_url.as_str())
            .map_err(|e| VigilError::Config(format!("invalid GitHub API URL {api_url}: {e}")))?
            .build()
            .map_err(|e| VigilError::Host(format!("failed to create GitHub client: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent("vigil")
            .build()
            .map_err(|e| VigilError::Host(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            octocrab,
            http,
            token: token.to_string(),
            api_url,
        })
    }

    async fn fetch_raw(
        &self,
        pr: &PullRequestId,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, VigilError> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url,
            pr.owner,
            pr.repo,
            path.trim_start_matches('/')
        );

        let response = self
            .http
            .get(&url)
            .query(&[("ref", git_ref)])
            .header("Accept", "application/vnd.github.raw")
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(|e| VigilError::Host(format!("failed to fetch {path}@{git_ref}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| VigilError::Host(format!("failed to read {path}@{git_ref}: {e}")))?;
        Ok(Some(bytes.to_vec()))
    }
}

#[async_trait]
impl HostGateway for OctocrabHost {
    async fn get_pull_request(&self, pr: &PullRequestId) -> Result<PullRequestRef, VigilError> {
        let route = format!("/repos/{}/{}/pulls/{}", pr.owner, pr.repo, pr.number);
        let dto: PullDto = self
            .octocrab
            .get(route, None::<&()>)
            .await
            .map_err(|e| octocrab_error(&format!("failed to fetch pull request {pr}"), e))?;
        Ok(PullRequestRef {
            head_commit: dto.head.sha,
            base_commit: dto.base.sha,
        })
    }

    async fn get_files_between_commits(
        &self,
        pr: &PullRequestId,
        base: &str,
        head: &str,
    ) -> Result<Vec<ChangedFile>, VigilError> {
        let route = format!("/repos/{}/{}/compare/{base}...{head}", pr.owner, pr.repo);
        let mut files = Vec::new();
        for page in 1..=MAX_PAGES {
            let params = PageParams {
                per_page: PER_PAGE,
                page,
            };
            let dto: CompareDto = self
                .octocrab
                .get(&route, Some(&params))
                .await
                .map_err(|e| octocrab_error(&format!("failed to compare {base}...{head}"), e))?;
            let count = dto.files.len();
            files.extend(dto.files);
            if count < PER_PAGE as usize {
                break;
            }
        }
        Ok(files)
    }

    async fn get_content(
        &self,
        pr: &PullRequestId,
        base_ref: &str,
        head_ref: &str,
        path: &str,
    ) -> Result<String, VigilError> {
        let bytes = match self.fetch_raw(pr, head_ref, path).await? {
            Some(bytes) => bytes,
            None => match self.fetch_raw(pr, base_ref, path).await? {
                Some(bytes) => bytes,
                None => return Ok(UNAVAILABLE_SENTINEL.to_string()),
            },
        };
        Ok(decode_content(bytes))
    }

    async fn list_comments(&self, pr: &PullRequestId) -> Result<Vec<HostComment>, VigilError> {
        let route = format!(
            "/repos/{}/{}/issues/{}/comments",
            pr.owner, pr.repo, pr.number
        );
        let mut comments = Vec::new();
        for page in 1..=MAX_PAGES {
            let params = PageParams {
                per_page: PER_PAGE,
                page,
            };
            let items: Vec<HostComment> = self
                .octocrab
                .get(&route, Some(&params))
                .await
                .map_err(|e| octocrab_error(&format!("failed to list comments on {pr}"), e))?;
            let count = items.len();
            comments.extend(items);
            if count < PER_PAGE as usize {
                break;
            }
        }
        Ok(comments)
    }

    async fn create_comment(&self, pr: &PullRequestId, body: &str) -> Result<(), VigilError> {
        self.octocrab
            .issues(&pr.owner, &pr.repo)
            .create_comment(pr.number, body)
            .await
            .map_err(|e| octocrab_error(&format!("failed to comment on {pr}"), e))?;
        Ok(())
    }

    async fn create_review_comment(
        &self,
        pr: &PullRequestId,
        comment: &ReviewCommentRequest,
    ) -> Result<(), VigilError> {
        let route = format!(
            "/repos/{}/{}/pulls/{}/comments",
            pr.owner, pr.repo, pr.number
        );
        let payload = comment.to_payload();
        let _: serde_json::Value = self
            .octocrab
            .post(route, Some(&payload))
            .await
            .map_err(|e| {
                octocrab_error(
                    &format!("failed to post review comment on {}:{}", comment.path, comment.line),
                    e,
                )
            })?;
        Ok(())
    }

    async fn list_directory(
        &self,
        pr: &PullRequestId,
        git_ref: &str,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, VigilError> {
        #[derive(Serialize)]
        struct RefParam<'a> {
            #[serde(rename = "ref")]
            git_ref: &'a str,
        }

        let path = path.trim_matches('/');
        let route = format!("/repos/{}/{}/contents/{path}", pr.owner, pr.repo);
        let value: serde_json::Value = self
            .octocrab
            .get(route, Some(&RefParam { git_ref }))
            .await
            .map_err(|e| octocrab_error(&format!("failed to list directory '{path}'"), e))?;

        // A file path returns a single object instead of an array.
        let entries = match value {
            serde_json::Value::Array(_) => serde_json::from_value(value)?,
            other => vec![serde_json::from_value(other)?],
        };
        Ok(entries)
    }
}

/// Decode raw bytes, substituting the binary sentinel for content that is
/// not displayable text.
///
/// # Examples
///
/// ```
/// use vigil_review::github::{decode_content, BINARY_SENTINEL};
///
/// assert_eq!(decode_content(b"let x = 1;".to_vec()), "let x = 1;");
/// assert_eq!(decode_content(vec![0x89, b'P', b'N', b'G', 0]), BINARY_SENTINEL);
/// ```
pub fn decode_content(bytes: Vec<u8>) -> String {
    if bytes.contains(&0) {
        return BINARY_SENTINEL.to_string();
    }
    String::from_utf8(bytes).unwrap_or_else(|_| BINARY_SENTINEL.to_string())
}

fn status_error(status: u16, body: &str) -> VigilError {
    let lower = body.to_ascii_lowercase();
    match status {
        401 => VigilError::Auth(format!("GitHub API error {status}: {body}")),
        429 => VigilError::RateLimited(format!("GitHub API error {status}: {body}")),
        403 if lower.contains("rate limit") => {
            VigilError::RateLimited(format!("GitHub API error {status}: {body}"))
        }
        _ => VigilError::Host(format!("GitHub API error {status}: {body}")),
    }
}

fn octocrab_error(context: &str, err: octocrab::Error) -> VigilError {
    let detail = err.to_string();
    let lower = detail.to_ascii_lowercase();
    if lower.contains("bad credentials") || lower.contains("requires authentication") {
        return VigilError::Auth(format!("{context}: {detail}"));
    }
    if lower.contains("rate limit") {
        return VigilError::RateLimited(format!("{context}: {detail}"));
    }
    VigilError::Host(format!("{context}: {detail}"))
}
