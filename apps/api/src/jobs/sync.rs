use std::collections::BTreeSet;

use tracing::debug;

use crate::errors::AppError;
use crate::store::{Association, JobTx};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SetDiff {
    pub to_add: Vec<i64>,
    pub to_remove: Vec<i64>,
}

impl SetDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Additions and removals that turn `current` into `desired`. Both lists are
/// sorted and free of duplicates.
pub fn diff(current: &[i64], desired: &[i64]) -> SetDiff {
    let current: BTreeSet<i64> = current.iter().copied().collect();
    let desired: BTreeSet<i64> = desired.iter().copied().collect();
    SetDiff {
        to_add: desired.difference(&current).copied().collect(),
        to_remove: current.difference(&desired).copied().collect(),
    }
}

/// Replaces the association set of a job with exactly `desired`.
pub async fn sync(
    tx: &mut dyn JobTx,
    job_id: i64,
    assoc: Association,
    desired: &[i64],
) -> Result<SetDiff, AppError> {
    let current = tx.associated_ids(job_id, assoc).await?;
    let changes = diff(&current, desired);
    if changes.is_empty() {
        return Ok(changes);
    }
    debug!(
        "Syncing {:?} of job definition {job_id}: +{:?} -{:?}",
        assoc, changes.to_add, changes.to_remove
    );
    tx.detach(job_id, assoc, &changes.to_remove).await?;
    tx.attach(job_id, assoc, &changes.to_add).await?;
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_adds_and_removes() {
        let changes = diff(&[1, 2, 3], &[3, 4]);
        assert_eq!(changes.to_add, vec![4]);
        assert_eq!(changes.to_remove, vec![1, 2]);
    }

    #[test]
    fn test_diff_same_set_in_other_order_is_empty() {
        assert!(diff(&[3, 1, 2], &[2, 3, 1]).is_empty());
    }

    #[test]
    fn test_diff_collapses_duplicates() {
        let changes = diff(&[], &[5, 5, 7]);
        assert_eq!(changes.to_add, vec![5, 7]);
        assert!(changes.to_remove.is_empty());
    }

    #[test]
    fn test_diff_to_empty_removes_everything() {
        let changes = diff(&[8, 9], &[]);
        assert_eq!(changes.to_remove, vec![8, 9]);
    }
}
