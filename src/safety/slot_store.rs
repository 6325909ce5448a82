/// Fixed-capacity pool of sandbox slots
///
/// State lives in a mutex-guarded table; free slot ids circulate through a
/// bounded channel so waiters block instead of polling. Each id is queued at
/// most once, tracked by `SlotEntry::queued`, so the channel never overflows.
use crate::config::types::{GraderError, Result, SlotState};
use crate::safety::workspace::WorkspaceWriter;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct SlotEntry {
    state: SlotState,
    busy_since: Option<DateTime<Utc>>,
    queued: bool,
}

#[derive(Debug, Default)]
struct PoolMetrics {
    acquisitions: AtomicU64,
    contentions: AtomicU64,
    releases: AtomicU64,
    cleanup_failures: AtomicU64,
    recoveries: AtomicU64,
}

#[derive(Clone, Copy)]
enum Wait {
    Never,
    Forever,
    Until(Instant),
}

/// Owned slot table. Share it through `Arc`; several stores can coexist.
#[derive(Debug)]
pub struct SlotStore {
    workspace: WorkspaceWriter,
    entries: Mutex<Vec<SlotEntry>>,
    free_tx: Sender<usize>,
    free_rx: Receiver<usize>,
    metrics: PoolMetrics,
}

/// Holder of a busy slot. Dropping the lease releases the slot.
#[derive(Debug)]
pub struct SlotLease<'a> {
    store: &'a SlotStore,
    slot_id: usize,
    released: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotSnapshot {
    pub slot_id: usize,
    pub state: SlotState,
    pub path: PathBuf,
    pub busy_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PoolCounters {
    pub acquisitions: u64,
    pub contentions: u64,
    pub releases: u64,
    pub cleanup_failures: u64,
    pub recoveries: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub capacity: usize,
    pub available: usize,
    pub busy: usize,
    pub errored: usize,
    pub slots: Vec<SlotSnapshot>,
    pub counters: PoolCounters,
}

impl SlotStore {
    /// Create the slot layout and mark every slot available. Leftover run
    /// artifacts from a previous process are purged first.
    pub fn init(workspace: WorkspaceWriter) -> Result<Self> {
        let capacity = workspace.capacity();
        if capacity == 0 {
            return Err(GraderError::Config(
                "slot pool capacity must be at least 1".to_string(),
            ));
        }

        workspace.create_layout()?;
        for slot_id in 0..capacity {
            workspace.purge_run_artifacts(slot_id)?;
        }

        let (free_tx, free_rx) = crossbeam_channel::bounded(capacity);
        let mut entries = Vec::with_capacity(capacity);
        for slot_id in 0..capacity {
            free_tx
                .try_send(slot_id)
                .map_err(|_| GraderError::Config("free slot channel rejected an id".to_string()))?;
            entries.push(SlotEntry {
                state: SlotState::Available,
                busy_since: None,
                queued: true,
            });
        }

        info!(
            "Initialized slot pool with {} slot(s) at {}",
            capacity,
            workspace.root().display()
        );

        Ok(Self {
            workspace,
            entries: Mutex::new(entries),
            free_tx,
            free_rx,
            metrics: PoolMetrics::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.workspace.capacity()
    }

    pub fn workspace(&self) -> &WorkspaceWriter {
        &self.workspace
    }

    pub fn slot_dir(&self, slot_id: usize) -> Result<PathBuf> {
        self.workspace.slot_dir(slot_id)
    }

    pub fn state(&self, slot_id: usize) -> Result<SlotState> {
        self.check_slot(slot_id)?;
        Ok(self.lock_entries()[slot_id].state)
    }

    /// Take a free slot without waiting
    pub fn try_acquire(&self) -> Result<SlotLease<'_>> {
        self.claim(Wait::Never)
    }

    /// Block until a slot is free
    pub fn acquire(&self) -> Result<SlotLease<'_>> {
        self.claim(Wait::Forever)
    }

    /// Block up to `timeout` for a free slot
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<SlotLease<'_>> {
        self.claim(Wait::Until(Instant::now() + timeout))
    }

    fn claim(&self, wait: Wait) -> Result<SlotLease<'_>> {
        let mut contended = false;

        loop {
            let received = match self.free_rx.try_recv() {
                Ok(slot_id) => Some(slot_id),
                Err(TryRecvError::Empty) => {
                    if !contended {
                        contended = true;
                        self.metrics.contentions.fetch_add(1, Ordering::Relaxed);
                    }
                    match wait {
                        Wait::Never => None,
                        Wait::Forever => self.free_rx.recv().ok(),
                        Wait::Until(deadline) => self.free_rx.recv_deadline(deadline).ok(),
                    }
                }
                Err(TryRecvError::Disconnected) => None,
            };

            let Some(slot_id) = received else {
                return Err(GraderError::PoolExhausted {
                    capacity: self.capacity(),
                });
            };

            let mut entries = self.lock_entries();
            let entry = &mut entries[slot_id];
            entry.queued = false;
            if entry.state != SlotState::Available {
                // Claimed through mark_busy while still queued
                debug!("Skipping stale free-list entry for slot {}", slot_id);
                continue;
            }
            entry.state = SlotState::Busy;
            entry.busy_since = Some(Utc::now());
            drop(entries);

            self.metrics.acquisitions.fetch_add(1, Ordering::Relaxed);
            debug!("Acquired slot {}", slot_id);
            return Ok(SlotLease {
                store: self,
                slot_id,
                released: false,
            });
        }
    }

    /// Move an available slot to busy without going through a lease
    pub fn mark_busy(&self, slot_id: usize) -> Result<()> {
        self.check_slot(slot_id)?;
        let mut entries = self.lock_entries();
        let entry = &mut entries[slot_id];
        if entry.state != SlotState::Available {
            return Err(GraderError::InvalidTransition {
                slot_id,
                from: entry.state,
                to: SlotState::Busy,
            });
        }
        entry.state = SlotState::Busy;
        entry.busy_since = Some(Utc::now());
        self.metrics.acquisitions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Purge the slot's run artifacts and return it to the pool.
    ///
    /// If the purge fails the slot becomes `Errored` and stays out of the pool.
    pub fn release(&self, slot_id: usize) -> Result<()> {
        self.check_slot(slot_id)?;
        let mut entries = self.lock_entries();
        let entry = &mut entries[slot_id];
        if entry.state != SlotState::Busy {
            return Err(GraderError::InvalidTransition {
                slot_id,
                from: entry.state,
                to: SlotState::Available,
            });
        }

        entry.busy_since = None;
        match self.workspace.purge_run_artifacts(slot_id) {
            Ok(()) => {
                entry.state = SlotState::Available;
                self.enqueue(slot_id, entry);
                self.metrics.releases.fetch_add(1, Ordering::Relaxed);
                debug!("Released slot {}", slot_id);
                Ok(())
            }
            Err(e) => {
                entry.state = SlotState::Errored;
                self.metrics.cleanup_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Cleanup of slot {} failed, withholding it: {}", slot_id, e);
                Err(e)
            }
        }
    }

    /// Retry the purge of an errored slot and return it to service
    pub fn recover(&self, slot_id: usize) -> Result<()> {
        self.check_slot(slot_id)?;
        let mut entries = self.lock_entries();
        let entry = &mut entries[slot_id];
        if entry.state != SlotState::Errored {
            return Err(GraderError::InvalidTransition {
                slot_id,
                from: entry.state,
                to: SlotState::Available,
            });
        }

        self.workspace.purge_run_artifacts(slot_id)?;
        entry.state = SlotState::Available;
        self.enqueue(slot_id, entry);
        self.metrics.recoveries.fetch_add(1, Ordering::Relaxed);
        info!("Recovered slot {}", slot_id);
        Ok(())
    }

    pub fn status(&self) -> PoolStatus {
        let entries = self.lock_entries();
        let slots: Vec<SlotSnapshot> = entries
            .iter()
            .enumerate()
            .map(|(slot_id, entry)| SlotSnapshot {
                slot_id,
                state: entry.state,
                path: self.workspace.root().join(slot_id.to_string()),
                busy_since: entry.busy_since,
            })
            .collect();
        drop(entries);

        let count = |state: SlotState| slots.iter().filter(|s| s.state == state).count();
        PoolStatus {
            capacity: self.capacity(),
            available: count(SlotState::Available),
            busy: count(SlotState::Busy),
            errored: count(SlotState::Errored),
            counters: self.counters(),
            slots,
        }
    }

    pub fn counters(&self) -> PoolCounters {
        PoolCounters {
            acquisitions: self.metrics.acquisitions.load(Ordering::Relaxed),
            contentions: self.metrics.contentions.load(Ordering::Relaxed),
            releases: self.metrics.releases.load(Ordering::Relaxed),
            cleanup_failures: self.metrics.cleanup_failures.load(Ordering::Relaxed),
            recoveries: self.metrics.recoveries.load(Ordering::Relaxed),
        }
    }

    /// Export pool metrics in Prometheus format
    pub fn export_metrics(&self) -> String {
        let status = self.status();
        let counters = &status.counters;
        format!(
            "# HELP gradebox_slot_acquisitions_total Total slot acquisitions\n\
             # TYPE gradebox_slot_acquisitions_total counter\n\
             gradebox_slot_acquisitions_total {}\n\
             \n\
             # HELP gradebox_slot_contentions_total Acquisitions that found no free slot\n\
             # TYPE gradebox_slot_contentions_total counter\n\
             gradebox_slot_contentions_total {}\n\
             \n\
             # HELP gradebox_slot_releases_total Total slot releases\n\
             # TYPE gradebox_slot_releases_total counter\n\
             gradebox_slot_releases_total {}\n\
             \n\
             # HELP gradebox_slot_cleanup_failures_total Releases whose cleanup failed\n\
             # TYPE gradebox_slot_cleanup_failures_total counter\n\
             gradebox_slot_cleanup_failures_total {}\n\
             \n\
             # HELP gradebox_slots Slots by state\n\
             # TYPE gradebox_slots gauge\n\
             gradebox_slots{{state=\"available\"}} {}\n\
             gradebox_slots{{state=\"busy\"}} {}\n\
             gradebox_slots{{state=\"errored\"}} {}\n",
            counters.acquisitions,
            counters.contentions,
            counters.releases,
            counters.cleanup_failures,
            status.available,
            status.busy,
            status.errored
        )
    }

    fn enqueue(&self, slot_id: usize, entry: &mut SlotEntry) {
        if entry.queued {
            return;
        }
        match self.free_tx.try_send(slot_id) {
            Ok(()) => entry.queued = true,
            Err(e) => warn!("Could not requeue slot {}: {}", slot_id, e),
        }
    }

    fn check_slot(&self, slot_id: usize) -> Result<()> {
        if slot_id >= self.capacity() {
            return Err(GraderError::InvalidSlot {
                slot_id,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<SlotEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SlotLease<'_> {
    pub fn slot_id(&self) -> usize {
        self.slot_id
    }

    pub fn path(&self) -> Result<PathBuf> {
        self.store.slot_dir(self.slot_id)
    }

    /// Release now and surface cleanup errors instead of logging them
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.store.release(self.slot_id)
    }
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.store.release(self.slot_id) {
            warn!("Release of slot {} on drop failed: {}", self.slot_id, e);
        }
    }
}
