//! Priority Scorer.
//!
//! Ranking is a cascade of seven predicates evaluated top-down. A candidate is scored by the
//! first (most specific) tier whose predicate it satisfies; candidates sharing a tier are
//! ordered by usage count, then recency, then id. Since ids are unique the result is a total
//! order and identical inputs always rank identically.

use std::{cmp::Reverse, fmt, sync::Arc};

use hiproc_types::{Command, ResolutionContext};
use hiproc_util::{DirectoryMatching, directory_basename, directory_depth, normalize_directory, parent_directory};
use serde::Serialize;
use tracing::debug;

/// Ranking tier. Lower numbers are more specific and always sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Same user, host and directory (and namespace, when hinted).
    Exact = 1,
    /// Same user and host (and namespace, when hinted).
    SameOrigin = 2,
    /// Same user, host and directory, namespace aside.
    SameOriginDirectory = 3,
    /// Stored directory looks like the working directory.
    SimilarDirectory = 4,
    /// Namespace equals the hint, whoever saved it.
    Namespace = 5,
    /// Used at least once.
    Frequent = 6,
    /// Anything else the caller can see.
    Fallback = 7,
}

impl MatchTier {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::SameOrigin => "same user and host",
            Self::SameOriginDirectory => "same user, host and directory",
            Self::SimilarDirectory => "similar directory",
            Self::Namespace => "namespace",
            Self::Frequent => "frequently used",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {} ({})", self.number(), self.label())
    }
}

/// Structural similarity test between a stored directory and the working directory.
pub trait DirectoryHeuristic: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Whether `stored` should count as "the same kind of place" as `cwd`.
    fn is_similar(&self, stored: &str, cwd: &str) -> bool;
}

/// Same final path component, e.g. `/home/alice/webapp` and `/srv/checkouts/webapp`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Basename;

impl DirectoryHeuristic for Basename {
    fn name(&self) -> &'static str {
        "basename"
    }

    fn is_similar(&self, stored: &str, cwd: &str) -> bool {
        match (directory_basename(stored), directory_basename(cwd)) {
            (Some(stored), Some(cwd)) => stored == cwd,
            _ => false,
        }
    }
}

/// [`Basename`], or siblings under a common parent that is not the filesystem root.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasenameOrSibling;

impl DirectoryHeuristic for BasenameOrSibling {
    fn name(&self) -> &'static str {
        "basename_or_sibling"
    }

    fn is_similar(&self, stored: &str, cwd: &str) -> bool {
        if Basename.is_similar(stored, cwd) {
            return true;
        }
        directory_depth(stored) >= 2
            && directory_depth(stored) == directory_depth(cwd)
            && parent_directory(stored).is_some_and(|parent| Some(parent) == parent_directory(cwd))
    }
}

/// Heuristic selected by configuration.
pub fn heuristic_for(matching: DirectoryMatching) -> Arc<dyn DirectoryHeuristic> {
    match matching {
        DirectoryMatching::Basename => Arc::new(Basename),
        DirectoryMatching::BasenameOrSibling => Arc::new(BasenameOrSibling),
    }
}

type TierPredicate = fn(&Command, &ResolutionContext, &dyn DirectoryHeuristic) -> bool;

fn same_directory(command: &Command, context: &ResolutionContext) -> bool {
    normalize_directory(&command.directory) == context.cwd
}

const TIER_RULES: [(MatchTier, TierPredicate); 7] = [
    (MatchTier::Exact, |command, context, _| {
        context.is_same_origin(command) && same_directory(command, context) && context.namespace_hint_matches(command)
    }),
    (MatchTier::SameOrigin, |command, context, _| {
        context.is_same_origin(command) && context.namespace_hint_matches(command)
    }),
    (MatchTier::SameOriginDirectory, |command, context, _| {
        context.is_same_origin(command) && same_directory(command, context)
    }),
    (MatchTier::SimilarDirectory, |command, context, heuristic| {
        heuristic.is_similar(&normalize_directory(&command.directory), &context.cwd)
    }),
    (MatchTier::Namespace, |command, context, _| {
        context.namespace_hint.as_deref().is_some_and(|hint| hint == command.namespace)
    }),
    (MatchTier::Frequent, |command, _, _| command.usage_count > 0),
    (MatchTier::Fallback, |_, _, _| true),
];

/// The most specific tier `command` reaches under `context`.
pub fn classify(command: &Command, context: &ResolutionContext, heuristic: &dyn DirectoryHeuristic) -> MatchTier {
    TIER_RULES
        .iter()
        .find(|(_, predicate)| predicate(command, context, heuristic))
        .map(|(tier, _)| *tier)
        .unwrap_or(MatchTier::Fallback)
}

/// A candidate together with the tier it reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedCandidate {
    pub command: Command,
    pub tier: MatchTier,
}

/// The winner of a ranking, plus everything it beat, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub winner: Command,
    pub tier: MatchTier,
    pub runners_up: Vec<RankedCandidate>,
}

/// Order `candidates` best first.
pub fn rank(candidates: Vec<Command>, context: &ResolutionContext, heuristic: &dyn DirectoryHeuristic) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .map(|command| {
            let tier = classify(&command, context, heuristic);
            RankedCandidate { command, tier }
        })
        .collect();

    ranked.sort_by_key(|candidate| {
        (
            candidate.tier,
            Reverse(candidate.command.usage_count),
            Reverse(candidate.command.last_used_at),
            candidate.command.id,
        )
    });
    ranked
}

/// Rank and split off the winner. `None` only for an empty candidate set.
pub fn select(candidates: Vec<Command>, context: &ResolutionContext, heuristic: &dyn DirectoryHeuristic) -> Option<MatchResult> {
    let mut ranked = rank(candidates, context, heuristic).into_iter();
    let RankedCandidate { command: winner, tier } = ranked.next()?;
    let runners_up: Vec<RankedCandidate> = ranked.collect();
    debug!(
        winner = winner.id,
        tier = tier.number(),
        heuristic = heuristic.name(),
        runners_up = runners_up.len(),
        "ranked candidates"
    );
    Some(MatchResult { winner, tier, runners_up })
}
