//! Repository detection via the `git` CLI.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::process::{Command, Stdio};

static GITHUB_REMOTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"github\.com[/:]([^/]+)/([^/]+?)(?:\.git)?/?$").expect("valid regex")
});

/// A GitHub repository parsed from a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepo {
    pub owner: String,
    pub name: String,
}

impl GitHubRepo {
    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Parse `https://github.com/o/r(.git)`, `git@github.com:o/r.git` or `ssh://git@github.com/o/r.git`.
pub fn parse_github_remote(url: &str) -> Option<GitHubRepo> {
    let caps = GITHUB_REMOTE.captures(url.trim())?;
    Some(GitHubRepo {
        owner: caps[1].to_string(),
        name: caps[2].to_string(),
    })
}

/// GitHub repository for the checkout containing `dir`, preferring `origin`.
pub fn detect_github_repo(dir: &Path) -> Option<GitHubRepo> {
    let url = git(dir, &["remote", "get-url", "origin"]).or_else(|| {
        let remotes = git(dir, &["remote", "-v"])?;
        remotes
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .map(str::to_string)
    })?;
    parse_github_remote(&url)
}

/// Current branch name, or `None` outside a repository.
pub fn detect_branch(dir: &Path) -> Option<String> {
    git(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
}

fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
