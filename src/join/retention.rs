//! Retention / cleanup sweep (spec §4.3): bounds `sourceDir` by age and by
//! count, and reaps orphaned index entries.

use super::error::JoinResult;
use super::model::SourceRef;
use super::store::SourceStore;

/// Summary of a completed sweep, for logging/testing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed_for_age: usize,
    pub removed_for_count: usize,
    pub orphans_reaped: usize,
}

/// Runs one sweep of the retention algorithm over every collection tracked
/// by `store`, per `max_days`/`max_files` (`0` means "no cap").
///
/// 1. Any entry older than `max_days` is removed (silent delete: logged,
///    index entry retained on I/O failure).
/// 2. Within what remains, entries are grouped by `collectionId` and capped
///    at `max_files`, keeping the newest; ties broken by `id` ascending.
/// 3. Any entry whose backing file is already gone is reaped as an orphan
///    (handled implicitly by `SourceStore::delete`'s not-found path).
pub fn sweep(store: &SourceStore, max_days: u32, max_files: u32) -> JoinResult<SweepReport> {
    let mut report = SweepReport::default();
    let all_refs = store.all_refs()?;

    let mut by_collection: std::collections::BTreeMap<String, Vec<SourceRef>> =
        std::collections::BTreeMap::new();
    for source_ref in all_refs {
        by_collection
            .entry(source_ref.collection_id.clone())
            .or_default()
            .push(source_ref);
    }

    let now = chrono::Utc::now();

    for (collection_id, mut refs) in by_collection {
        if max_days > 0 {
            let cutoff = now - chrono::Duration::days(max_days as i64);
            let (expired, survivors): (Vec<_>, Vec<_>) =
                refs.into_iter().partition(|r| r.time_stamp < cutoff);
            refs = survivors;

            for source_ref in expired {
                let was_orphan = !source_ref.ref_path.is_file();
                if store.delete(&source_ref.ref_path, &collection_id, &source_ref.id, true)? {
                    if was_orphan {
                        report.orphans_reaped += 1;
                    } else {
                        report.removed_for_age += 1;
                    }
                }
            }
        }

        if max_files > 0 && refs.len() as u32 > max_files {
            // Newest first; ties broken by id ascending so the sweep is
            // deterministic across runs with identical timestamps.
            refs.sort_by(|a, b| {
                b.time_stamp
                    .cmp(&a.time_stamp)
                    .then_with(|| a.id.cmp(&b.id))
            });

            for source_ref in refs.split_off(max_files as usize) {
                let was_orphan = !source_ref.ref_path.is_file();
                if store.delete(&source_ref.ref_path, &collection_id, &source_ref.id, true)? {
                    if was_orphan {
                        report.orphans_reaped += 1;
                    } else {
                        report.removed_for_count += 1;
                    }
                }
            }
        } else {
            // Even when under the count cap, still reap any orphan left
            // among the survivors (index entry with no backing file).
            for source_ref in refs {
                if !source_ref.ref_path.is_file()
                    && store.delete(&source_ref.ref_path, &collection_id, &source_ref.id, true)?
                {
                    report.orphans_reaped += 1;
                }
            }
        }
    }

    Ok(report)
}
