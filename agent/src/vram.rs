//! Per-GPU VRAM bookkeeping (component D). A single lock is held across the
//! read of current device usage and the commit of a new reservation so two
//! concurrent allocations never observe the same free capacity.

use crate::tools::{self, GpuRow};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct UsageMap(BTreeMap<u32, u32>);

pub struct VramAllocator {
    query_binary: String,
    reserved: Mutex<UsageMap>,
}

impl VramAllocator {
    pub fn new(query_binary: impl Into<String>) -> Self {
        Self { query_binary: query_binary.into(), reserved: Mutex::new(UsageMap::default()) }
    }

    /// Allocates `required_mib` across one or more GPUs per §4.D's policy,
    /// returning each GPU index with the share reserved on it. `required_mib
    /// = 0` returns the first GPU index with a zero share.
    pub async fn allocate(&self, required_mib: u32) -> anyhow::Result<Vec<(u32, u32)>> {
        let rows = match tools::query_gpus(&self.query_binary).await {
            Ok(rows) => rows,
            Err(e) => {
                debug!("GPU query tool unavailable, treating as no capacity: {e}");
                return Err(NoCapacity.into());
            }
        };

        let mut reserved = self.reserved.lock().await;
        let candidates: Vec<(u32, u32)> = rows
            .into_iter()
            .filter_map(|GpuRow { index, total_mib, used_mib }| {
                let already_reserved = reserved.0.get(&index).copied().unwrap_or(0);
                let free = (total_mib as i64) - (used_mib as i64) - (already_reserved as i64);
                (free > 0).then_some((index, free as u32))
            })
            .collect();

        let shares = plan_allocation(&candidates, required_mib)?;
        for (index, share) in &shares {
            *reserved.0.entry(*index).or_default() += share;
        }
        Ok(shares)
    }

    /// Releases a previously committed allocation's shares, deleting zero entries.
    pub async fn release(&self, usage: &[(u32, u32)]) {
        let mut reserved = self.reserved.lock().await;
        for (index, share) in usage {
            if let Some(entry) = reserved.0.get_mut(index) {
                *entry = entry.saturating_sub(*share);
                if *entry == 0 {
                    reserved.0.remove(index);
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("no GPU capacity available")]
pub struct NoCapacity;

/// The pure allocation policy of §4.D, isolated from the GPU query tool so it
/// can be tested against the literal scenarios in §8. `candidates` is a list
/// of `(gpu_index, free_mib)` with non-positive-free GPUs already dropped.
fn plan_allocation(candidates: &[(u32, u32)], required_mib: u32) -> Result<Vec<(u32, u32)>, NoCapacity> {
    if candidates.is_empty() {
        return Err(NoCapacity);
    }

    let mut sorted: Vec<(u32, u32)> = candidates.to_vec();
    sorted.sort_by_key(|(index, _)| *index);

    if required_mib == 0 {
        return Ok(vec![(sorted[0].0, 0)]);
    }

    if let Some((index, _)) = sorted.iter().find(|(_, free)| *free >= required_mib) {
        return Ok(vec![(*index, required_mib)]);
    }

    let mut remaining = required_mib;
    let mut shares = Vec::new();
    for (index, free) in &sorted {
        if remaining == 0 {
            break;
        }
        let take = (*free).min(remaining);
        if take == 0 {
            continue;
        }
        shares.push((*index, take));
        remaining -= take;
    }

    if remaining > 0 { Err(NoCapacity) } else { Ok(shares) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tracing_test::traced_test;

    fn alloc_from(reserved: BTreeMap<u32, u32>) -> VramAllocator {
        VramAllocator { query_binary: "unused".into(), reserved: Mutex::new(UsageMap(reserved)) }
    }

    #[rstest]
    // Spec §8 scenario 2: partial single-GPU allocation, first GPU with enough room wins.
    #[case(&[(0, 8000), (1, 8000)], 2000, vec![(0, 2000)])]
    #[case(&[(0, 6000), (1, 8000)], 7000, vec![(1, 7000)])]
    // Spec §8 scenario 3: two 40000-MiB GPUs each with 1000 used, need 60000.
    #[case(&[(0, 39000), (1, 39000)], 60000, vec![(0, 39000), (1, 21000)])]
    #[case(&[(0, 1000)], 0, vec![(0, 0)])]
    fn scenario_allocations(#[case] candidates: &[(u32, u32)], #[case] required_mib: u32, #[case] expected: Vec<(u32, u32)>) {
        assert_eq!(plan_allocation(candidates, required_mib).unwrap(), expected);
    }

    #[rstest]
    #[case(&[(0, 1000), (1, 1000)], 2001)]
    #[case(&[], 100)]
    fn rejected_allocations(#[case] candidates: &[(u32, u32)], #[case] required_mib: u32) {
        assert!(plan_allocation(candidates, required_mib).is_err());
    }

    #[tokio::test]
    async fn release_deletes_zero_entries() {
        let allocator = alloc_from(BTreeMap::from([(0, 2000)]));
        allocator.release(&[(0, 2000)]).await;
        assert!(allocator.reserved.lock().await.0.is_empty());
    }

    #[tokio::test]
    async fn release_unknown_index_is_noop() {
        let allocator = alloc_from(BTreeMap::new());
        allocator.release(&[(5, 100)]).await;
        assert!(allocator.reserved.lock().await.0.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn allocate_logs_and_fails_closed_when_the_query_tool_is_missing() {
        let allocator = VramAllocator::new("/nonexistent/nvidia-smi-xyz");
        let err = allocator.allocate(1000).await.unwrap_err();
        assert!(err.is::<NoCapacity>());
        assert!(logs_contain("GPU query tool unavailable"));
    }
}
