//! Origin backed by local git repositories
//!
//! Projects live below a root directory, either as `<root>/<project>` or as
//! `<root>/<project>.git`. Page tokens are decimal offsets into a
//! topological walk.

use anyhow::{Context, Result};
use async_trait::async_trait;
use git2::{Repository, Sort};
use revindex_core::{refs::ref_matches, RawCommit};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::origin::{LogPage, Origin};

pub struct GitOrigin {
    root: PathBuf,
}

impl GitOrigin {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn repo_path(&self, project: &str) -> PathBuf {
        let plain = self.root.join(project);
        if plain.exists() {
            return plain;
        }
        self.root.join(format!("{}.git", project))
    }

    fn open(&self, project: &str) -> Result<Repository> {
        let path = self.repo_path(project);
        Repository::open(&path).with_context(|| format!("Failed to open repository at {:?}", path))
    }
}

fn resolve_blocking(repo: &Repository, refs_path: &str) -> Result<BTreeMap<String, String>> {
    let mut refs = BTreeMap::new();

    for reference in repo.references().context("Failed to list references")? {
        let reference = reference.context("Failed to read reference")?;
        let Some(name) = reference.name() else {
            continue;
        };
        if !ref_matches(refs_path, name) {
            continue;
        }
        let tip = reference
            .peel_to_commit()
            .map(|c| c.id().to_string())
            .unwrap_or_default();
        refs.insert(name.to_string(), tip);
    }

    Ok(refs)
}

fn log_blocking(repo: &Repository, committish: &str, offset: usize, page_size: usize) -> Result<LogPage> {
    let start = repo
        .revparse_single(committish)
        .and_then(|obj| obj.peel_to_commit())
        .with_context(|| format!("Failed to resolve {}", committish))?;

    let mut revwalk = repo.revwalk()?;
    revwalk.push(start.id())?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

    let mut commits = Vec::with_capacity(page_size);
    let mut has_more = false;

    for oid in revwalk.skip(offset) {
        let oid = oid.context("Failed to get commit OID")?;
        if commits.len() == page_size {
            has_more = true;
            break;
        }
        let commit = repo.find_commit(oid)?;
        commits.push(RawCommit {
            hash: oid.to_string(),
            parents: commit.parent_ids().map(|p| p.to_string()).collect(),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
        });
    }

    let next_page_token = has_more.then(|| (offset + commits.len()).to_string());
    Ok(LogPage {
        commits,
        next_page_token,
    })
}

#[async_trait]
impl Origin for GitOrigin {
    async fn resolve_refs(&self, project: &str, refs_path: &str) -> Result<BTreeMap<String, String>> {
        let repo = self.open(project)?;
        let refs_path = refs_path.to_string();
        tokio::task::spawn_blocking(move || resolve_blocking(&repo, &refs_path)).await?
    }

    async fn log(
        &self,
        project: &str,
        committish: &str,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<LogPage> {
        let offset = match page_token.filter(|t| !t.is_empty()) {
            Some(token) => token
                .parse::<usize>()
                .with_context(|| format!("Invalid page token {:?}", token))?,
            None => 0,
        };
        let repo = self.open(project)?;
        let committish = committish.to_string();
        let page_size = page_size.max(1);
        tokio::task::spawn_blocking(move || log_blocking(&repo, &committish, offset, page_size)).await?
    }
}
