// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job eligibility rules.
//!
//! Every job definition may carry a [`Rules`] block constraining where it is
//! scheduled. Tree and branch lists share one grammar: an entry is `"name"`,
//! `"tree:branch"`, or either form with a `!` prefix to deny. A job is
//! eligible iff no negative entry matches and either no positive entries
//! exist or at least one matches.

use crate::error::CatalogError;
use cv_core::Node;
use serde::{Deserialize, Serialize};

/// Kernel version floor/ceiling, compared lexicographically as
/// `(version, patchlevel)` with inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub version: u32,
    #[serde(default)]
    pub patchlevel: u32,
}

/// One parsed scope entry from a tree or branch list.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScopeRule {
    negate: bool,
    first: String,
    second: Option<String>,
}

impl ScopeRule {
    fn parse(entry: &str) -> Result<Self, CatalogError> {
        let (negate, rest) = match entry.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, entry),
        };
        if rest.is_empty() {
            return Err(CatalogError::InvalidRule(entry.to_string()));
        }
        let (first, second) = match rest.split_once(':') {
            Some((a, b)) if !a.is_empty() && !b.is_empty() => (a.to_string(), Some(b.to_string())),
            Some(_) => return Err(CatalogError::InvalidRule(entry.to_string())),
            None => (rest.to_string(), None),
        };
        Ok(Self { negate, first, second })
    }

    /// Match against a revision when this entry came from a `tree` list:
    /// the bare form names a tree.
    fn matches_tree(&self, tree: &str, branch: &str) -> bool {
        match self.second.as_deref() {
            Some(b) => self.first == tree && b == branch,
            None => self.first == tree,
        }
    }

    /// Match against a revision when this entry came from a `branch` list:
    /// the bare form names a branch.
    fn matches_branch(&self, tree: &str, branch: &str) -> bool {
        match self.second.as_deref() {
            Some(b) => self.first == tree && b == branch,
            None => self.first == branch,
        }
    }
}

fn scope_eligible<F>(entries: &[String], matches: F) -> bool
where
    F: Fn(&ScopeRule) -> bool,
{
    let rules: Vec<ScopeRule> = entries.iter().filter_map(|e| ScopeRule::parse(e).ok()).collect();
    if rules.iter().filter(|r| r.negate).any(|r| matches(r)) {
        return false;
    }
    let positives: Vec<&ScopeRule> = rules.iter().filter(|r| !r.negate).collect();
    positives.is_empty() || positives.into_iter().any(matches)
}

/// Membership rule over node attributes (`arch`, `defconfig`, `fragments`)
/// with `!` negation.
fn set_eligible(entries: &[String], values: &[&str]) -> bool {
    if entries.is_empty() {
        return true;
    }
    let mut has_positive = false;
    let mut positive_hit = false;
    for entry in entries {
        match entry.strip_prefix('!') {
            Some(denied) => {
                if values.contains(&denied) {
                    return false;
                }
            }
            None => {
                has_positive = true;
                if values.contains(&entry.as_str()) {
                    positive_hit = true;
                }
            }
        }
    }
    !has_positive || positive_hit
}

/// Eligibility predicate attached to a job definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rules {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tree: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branch: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_version: Option<Version>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arch: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defconfig: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fragments: Vec<String>,
    /// Scheduling window of form `[Nd][Nh][Nm]`; evaluated by the scheduler
    /// against the store, not here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
}

impl Rules {
    /// Evaluate every store-independent predicate against the event node.
    pub fn eligible(&self, node: &Node) -> bool {
        let needs_revision = !self.tree.is_empty()
            || !self.branch.is_empty()
            || self.min_version.is_some()
            || self.max_version.is_some();
        if needs_revision {
            let Some(rev) = node.revision() else {
                return false;
            };
            if !scope_eligible(&self.tree, |r| r.matches_tree(&rev.tree, &rev.branch)) {
                return false;
            }
            if !scope_eligible(&self.branch, |r| r.matches_branch(&rev.tree, &rev.branch)) {
                return false;
            }
            if self.min_version.is_some() || self.max_version.is_some() {
                let Some((version, patchlevel)) = rev.version_tuple() else {
                    return false;
                };
                if let Some(min) = self.min_version {
                    if (version, patchlevel) < (min.version, min.patchlevel) {
                        return false;
                    }
                }
                if let Some(max) = self.max_version {
                    if (version, patchlevel) > (max.version, max.patchlevel) {
                        return false;
                    }
                }
            }
        }

        let arch = node.data.arch.as_deref();
        if !set_eligible(&self.arch, arch.as_slice()) {
            return false;
        }
        let defconfig = node.data.defconfig.as_deref();
        if !set_eligible(&self.defconfig, defconfig.as_slice()) {
            return false;
        }
        let fragments: Vec<&str> = node.data.fragments.iter().map(String::as_str).collect();
        if !set_eligible(&self.fragments, &fragments) {
            return false;
        }
        true
    }

    /// Parsed frequency window, if one is configured.
    pub fn frequency_window(&self) -> Result<Option<chrono::Duration>, CatalogError> {
        self.frequency.as_deref().map(parse_window).transpose()
    }

    /// Check that every entry parses; called from settings validation.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for entry in self.tree.iter().chain(&self.branch) {
            ScopeRule::parse(entry)?;
        }
        for entry in self.arch.iter().chain(&self.defconfig).chain(&self.fragments) {
            let bare = entry.strip_prefix('!').unwrap_or(entry);
            if bare.is_empty() {
                return Err(CatalogError::InvalidRule(entry.clone()));
            }
        }
        self.frequency_window()?;
        Ok(())
    }
}

/// Parse a scheduling window of form `[Nd][Nh][Nm]`, e.g. `1d`, `12h`, `1d6h30m`.
pub fn parse_window(s: &str) -> Result<chrono::Duration, CatalogError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::InvalidDuration(s.to_string()));
    }
    let mut total = chrono::Duration::zero();
    let mut digits = String::new();
    for c in trimmed.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: i64 =
            digits.parse().map_err(|_| CatalogError::InvalidDuration(s.to_string()))?;
        digits.clear();
        total += match c {
            'd' => chrono::Duration::days(n),
            'h' => chrono::Duration::hours(n),
            'm' => chrono::Duration::minutes(n),
            _ => return Err(CatalogError::InvalidDuration(s.to_string())),
        };
    }
    if !digits.is_empty() {
        // trailing number without a unit
        return Err(CatalogError::InvalidDuration(s.to_string()));
    }
    Ok(total)
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
