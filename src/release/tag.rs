//! Release tag creation against the source host.

use crate::error::{Result, TagError};
use crate::github::{RepoId, TagService};
use log::{info, warn};

/// Branch used when the default-branch lookup fails.
const FALLBACK_BRANCH: &str = "master";

/// Creates release tags, detecting pre-existing ones.
pub struct TagManager<'a> {
    tags: &'a dyn TagService,
}

/// Result of a tag-creation attempt.
///
/// An already-existing tag is a distinguishable outcome the caller may
/// override (force), not an exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    /// The tag was created at the given commit.
    Created {
        /// Commit the tag points at
        sha: String,
    },
    /// An exact `refs/tags/<tag>` ref already exists; nothing was mutated.
    AlreadyExists,
}

impl<'a> TagManager<'a> {
    /// Build a tag manager over a tag service.
    pub fn new(tags: &'a dyn TagService) -> Self {
        Self { tags }
    }

    /// Create an annotated tag and its ref for `tag` on `repo`.
    ///
    /// With `commit_sha` the commit is verified first; an unknown SHA
    /// fails the whole step rather than creating a dangling tag. Without
    /// it, the default branch tip is used, falling back to `master` when
    /// the default-branch lookup fails.
    pub async fn create_tag(
        &self,
        repo: &RepoId,
        tag: &str,
        commit_sha: Option<&str>,
    ) -> Result<TagOutcome> {
        let refs = self.tags.matching_tag_refs(repo, tag).await?;
        let exact = format!("refs/tags/{tag}");
        if refs.iter().any(|r| r.name == exact) {
            info!("tag {tag} already exists on {repo}");
            return Ok(TagOutcome::AlreadyExists);
        }

        let sha = match commit_sha {
            Some(sha) if !sha.is_empty() => {
                if !self.tags.commit_exists(repo, sha).await? {
                    return Err(TagError::CommitNotFound {
                        sha: sha.to_string(),
                    }
                    .into());
                }
                sha.to_string()
            }
            _ => self.resolve_branch_tip(repo).await?,
        };

        self.tags
            .create_annotated_tag(repo, tag, tag, &sha)
            .await?;
        self.tags.create_tag_ref(repo, tag, &sha).await?;
        info!("created tag {tag} on {repo} at {sha}");

        Ok(TagOutcome::Created { sha })
    }

    async fn resolve_branch_tip(&self, repo: &RepoId) -> Result<String> {
        let branch = match self.tags.default_branch(repo).await {
            Ok(branch) => branch,
            Err(err) => {
                warn!("default branch lookup failed for {repo} ({err}), falling back to {FALLBACK_BRANCH}");
                FALLBACK_BRANCH.to_string()
            }
        };
        let head = self.tags.branch_head(repo, &branch).await.map_err(|_| {
            TagError::BranchNotFound {
                branch: branch.clone(),
            }
        })?;
        Ok(head.object.sha)
    }
}
