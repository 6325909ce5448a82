/// Resident memory monitor
///
/// Runs beside each process on its own thread, sampling at a fixed cadence
/// until told to stop. A sample above the ceiling claims the kill switch.
/// The report is handed back through the thread's join result.
use crate::config::types::{GraderError, Result, TerminationCause};
use crate::exec::termination::KillSwitch;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Source of resident memory samples. `None` means "no sample".
pub trait MemorySampler: Send + Sync {
    fn sample_kb(&self, pid: u32) -> Option<u64>;
}

/// Reads `VmRSS` from `/proc/<pid>/status`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcStatusSampler;

impl MemorySampler for ProcStatusSampler {
    fn sample_kb(&self, pid: u32) -> Option<u64> {
        let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
        parse_vm_rss(&status)
    }
}

/// Runs `ps -o rss= -p <pid>` where procfs is unavailable
#[derive(Debug, Clone, Copy, Default)]
pub struct PsSampler;

impl MemorySampler for PsSampler {
    fn sample_kb(&self, pid: u32) -> Option<u64> {
        let output = std::process::Command::new("ps")
            .args(["-o", "rss=", "-p", &pid.to_string()])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }
}

/// Sampler for the host platform
pub fn default_sampler() -> Arc<dyn MemorySampler> {
    if cfg!(target_os = "linux") {
        Arc::new(ProcStatusSampler)
    } else {
        Arc::new(PsSampler)
    }
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

/// What the monitor observed over one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub peak_kb: u64,
    pub breached: bool,
    pub samples: u32,
}

#[derive(Clone)]
pub struct ResourceMonitor {
    sampler: Arc<dyn MemorySampler>,
    interval: Duration,
    ceiling_kb: u64,
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("interval", &self.interval)
            .field("ceiling_kb", &self.ceiling_kb)
            .finish_non_exhaustive()
    }
}

/// Running monitor; `stop` delivers the stop signal and joins it
#[derive(Debug)]
pub struct MonitorHandle {
    stop_tx: Sender<()>,
    handle: JoinHandle<MonitorReport>,
}

impl ResourceMonitor {
    pub fn new(sampler: Arc<dyn MemorySampler>, interval: Duration, ceiling_kb: u64) -> Self {
        Self {
            sampler,
            interval,
            ceiling_kb,
        }
    }

    /// Start sampling `pid`; a breach triggers `kill_switch`.
    pub fn supervise(&self, pid: u32, kill_switch: Arc<KillSwitch>) -> Result<MonitorHandle> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let sampler = Arc::clone(&self.sampler);
        let interval = self.interval;
        let ceiling_kb = self.ceiling_kb;

        let handle = thread::Builder::new()
            .name(format!("monitor-{pid}"))
            .spawn(move || {
                let mut report = MonitorReport::default();
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        // Stop signal, or the handle was dropped
                        _ => break,
                    }

                    let Some(kb) = sampler.sample_kb(pid) else {
                        continue;
                    };
                    report.samples += 1;
                    report.peak_kb = report.peak_kb.max(kb);
                    log::debug!("pid {} resident {} KB (peak {} KB)", pid, kb, report.peak_kb);

                    if kb > ceiling_kb {
                        report.breached = true;
                        if kill_switch.trigger(TerminationCause::MemoryCeiling) {
                            log::info!(
                                "pid {} exceeded memory ceiling: {} KB > {} KB",
                                pid,
                                kb,
                                ceiling_kb
                            );
                        }
                        break;
                    }
                }
                report
            })
            .map_err(GraderError::Io)?;

        Ok(MonitorHandle { stop_tx, handle })
    }
}

impl MonitorHandle {
    pub fn stop(self) -> MonitorReport {
        // A monitor that already broke out has dropped its receiver
        let _ = self.stop_tx.try_send(());
        match self.handle.join() {
            Ok(report) => report,
            Err(_) => {
                log::warn!("Memory monitor thread panicked; reporting no samples");
                MonitorReport::default()
            }
        }
    }
}
