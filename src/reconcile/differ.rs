use std::collections::BTreeSet;
use url::Url;

/// Changes needed to turn a target URL set into a source URL set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub to_add: BTreeSet<Url>,
    pub to_delete: BTreeSet<Url>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_delete.is_empty()
    }
}

/// Computes `to_add = source - target` and `to_delete = target - source`
///
/// Compares exact URL values. Inputs are expected to be canonicalized
/// already, so no case folding happens here.
pub fn diff(source: &[Url], target: &[Url]) -> Diff {
    let source: BTreeSet<Url> = source.iter().cloned().collect();
    let target: BTreeSet<Url> = target.iter().cloned().collect();

    Diff {
        to_add: source.difference(&target).cloned().collect(),
        to_delete: target.difference(&source).cloned().collect(),
    }
}
