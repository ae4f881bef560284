use std::collections::HashSet;
use tracing::debug;
use url::Url;

use super::canonical::{canonicalize, dedup_canonical};

/// Removes denied URLs from a candidate list
///
/// Computes `canonical(candidates) - canonical(deny_list)` and maps each
/// surviving key back to its first-seen candidate URL. Pure: no I/O.
///
/// Any tooling that has to reproduce a filtering decision (for example
/// [`super::reconciler::purge_denied`]) calls this function instead of
/// comparing URLs itself. Changing the comparison here changes it there.
pub fn apply(candidates: &[Url], deny_list: &[Url]) -> Vec<Url> {
    let denied: HashSet<_> = deny_list.iter().map(canonicalize).collect();

    let survivors = dedup_canonical(
        candidates
            .iter()
            .filter(|url| !denied.contains(&canonicalize(url)))
            .cloned(),
    );

    debug!(
        "Deny list filter: {} candidates, {} denied keys, {} survivors",
        candidates.len(),
        denied.len(),
        survivors.len()
    );
    survivors
}

/// The complement of [`apply`]: candidates the deny list removes
pub fn denied_subset(candidates: &[Url], deny_list: &[Url]) -> Vec<Url> {
    let kept: HashSet<_> = apply(candidates, deny_list)
        .iter()
        .map(canonicalize)
        .collect();
    candidates
        .iter()
        .filter(|url| !kept.contains(&canonicalize(url)))
        .cloned()
        .collect()
}
