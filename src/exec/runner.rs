/// Process runner: one fresh subprocess per recorded input
use crate::config::types::{
    GraderError, GradingResult, Language, Result, RunLimits, TerminationCause,
};
use crate::exec::limits::apply_rlimits;
use crate::exec::monitor::{default_sampler, MemorySampler, ResourceMonitor};
use crate::exec::termination::KillSwitch;
use crate::judge::adapter::LanguageAdapter;
use crate::judge::registry::AdapterRegistry;
use crate::safety::workspace::WorkspaceWriter;
use crate::utils::output::OutputCollector;
use crate::verdict::verdict::{aggregate, RunEvidence, VerdictClassifier};
use log::{debug, warn};
use std::io::{self, ErrorKind, Write};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Watchdog polling cadence
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How long to wait for the output pipe to reach EOF once the group is dead
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct ProcessRunner {
    workspace: WorkspaceWriter,
    registry: AdapterRegistry,
    sampler: Arc<dyn MemorySampler>,
    limits: RunLimits,
}

impl ProcessRunner {
    pub fn new(workspace: WorkspaceWriter, registry: AdapterRegistry, limits: RunLimits) -> Self {
        Self {
            workspace,
            registry,
            sampler: default_sampler(),
            limits,
        }
    }

    /// Replace the memory sampler
    pub fn with_sampler(mut self, sampler: Arc<dyn MemorySampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn limits(&self) -> &RunLimits {
        &self.limits
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Run every recorded input of `slot_id` with the configured limits
    pub fn run(&self, slot_id: usize, language: Language) -> Result<GradingResult> {
        self.run_with_limits(slot_id, language, &self.limits)
    }

    pub fn run_with_limits(
        &self,
        slot_id: usize,
        language: Language,
        limits: &RunLimits,
    ) -> Result<GradingResult> {
        self.execute(slot_id, self.registry.adapter_for(language), limits)
    }

    /// Run the slot's inputs in index order through `adapter`.
    ///
    /// Per-run failures become outcomes. An infrastructure failure aborts the
    /// loop and returns `RunAborted` carrying the outcomes gathered so far.
    pub fn execute(
        &self,
        slot_id: usize,
        adapter: &dyn LanguageAdapter,
        limits: &RunLimits,
    ) -> Result<GradingResult> {
        let argv = adapter.run_command()?;
        let slot_dir = self.workspace.slot_dir(slot_id)?;
        let inputs = self.workspace.list_inputs(slot_id)?;
        if inputs.is_empty() {
            return Ok(GradingResult::empty());
        }

        let monitor = ResourceMonitor::new(
            Arc::clone(&self.sampler),
            limits.sample_interval,
            limits.memory_limit_kb,
        );
        let collector = OutputCollector::new(limits.output_limit_bytes);

        let mut outcomes = Vec::with_capacity(inputs.len());
        for (index, path) in inputs {
            let evidence = self.workspace.read_input(&path).and_then(|content| {
                run_one(&slot_dir, &argv, index, content, limits, &monitor, collector)
            });

            match evidence {
                Ok(evidence) => {
                    let outcome = VerdictClassifier::classify(evidence, adapter);
                    debug!(
                        "slot {} input {}: {:?} in {} ms, peak {} KB",
                        slot_id,
                        index,
                        outcome.verdict,
                        outcome.execution_time_ms,
                        outcome.memory_usage_kb
                    );
                    outcomes.push(outcome);
                }
                Err(source) => {
                    warn!("slot {} aborted at input {}: {}", slot_id, index, source);
                    return Err(GraderError::RunAborted {
                        partial: Box::new(aggregate(outcomes, true)),
                        source: Box::new(source),
                    });
                }
            }
        }

        Ok(aggregate(outcomes, false))
    }
}

fn run_one(
    slot_dir: &Path,
    argv: &[String],
    index: usize,
    content: String,
    limits: &RunLimits,
    monitor: &ResourceMonitor,
    collector: OutputCollector,
) -> Result<RunEvidence> {
    let launch_error = |source: io::Error| GraderError::ProcessLaunch {
        command: argv.join(" "),
        source,
    };
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| launch_error(io::Error::new(ErrorKind::InvalidInput, "empty command")))?;

    // stdout and stderr share one pipe, so output keeps its interleaving
    let (reader, writer) = io::pipe().map_err(launch_error)?;
    let stderr_writer = writer.try_clone().map_err(launch_error)?;

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(slot_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::from(writer))
        .stderr(Stdio::from(stderr_writer))
        .process_group(0);
    apply_rlimits(&mut command, limits.address_space_limit_kb);

    let started = Instant::now();
    let spawned = command.spawn();
    // Close our copies of the write end so EOF arrives when the group dies
    drop(command);
    let mut child = spawned.map_err(launch_error)?;
    let kill_switch = Arc::new(KillSwitch::new(child.id()));

    let output = match collector.spawn(reader) {
        Ok(handle) => handle,
        Err(e) => return Err(abandon(&mut child, &kill_switch, e)),
    };
    if let Err(e) = feed_stdin(&mut child, content.clone().into_bytes()) {
        return Err(abandon(&mut child, &kill_switch, e));
    }
    let monitor_handle = match monitor.supervise(child.id(), Arc::clone(&kill_switch)) {
        Ok(handle) => handle,
        Err(e) => return Err(abandon(&mut child, &kill_switch, e)),
    };

    let deadline = started + limits.timeout;
    let mut deadline_hit = false;
    let exited = loop {
        match leader_exited(&mut child) {
            Ok(true) => break Ok(()),
            Ok(false) => {
                let now = Instant::now();
                if !deadline_hit && now >= deadline {
                    deadline_hit = true;
                    kill_switch.trigger(TerminationCause::Deadline);
                }
                let pause = if deadline_hit {
                    WAIT_POLL_INTERVAL
                } else {
                    WAIT_POLL_INTERVAL.min(deadline - now)
                };
                thread::sleep(pause);
            }
            Err(e) => break Err(e),
        }
    };
    let elapsed = started.elapsed();

    // The leader is not reaped yet, so neither its pid nor its group id can
    // have been reused by the time the monitor stops and the group is swept
    let report = monitor_handle.stop();
    kill_switch.sweep();
    let status = match exited.and_then(|()| child.wait()) {
        Ok(status) => status,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GraderError::ProcessWait(e));
        }
    };

    let termination = kill_switch.cause();
    // Only the monitor claims the switch for memory
    debug_assert!(termination != Some(TerminationCause::MemoryCeiling) || report.breached);
    if report.breached && termination != Some(TerminationCause::MemoryCeiling) {
        debug!("input {}: memory breach came after {:?}", index, termination);
    }

    let output = output.wait(OUTPUT_DRAIN_GRACE);
    if let Some(err) = &output.read_error {
        warn!("Output of input {} is incomplete: {}", index, err);
    }

    Ok(RunEvidence {
        input_index: index,
        input_content: content,
        exit_code: status.code(),
        signal: status.signal(),
        termination,
        output: output.text(),
        output_truncated: output.truncated,
        elapsed_ms: elapsed.as_millis() as u64,
        peak_kb: report.peak_kb,
    })
}

/// Whether the group leader has exited. On Linux the exit is observed
/// without reaping; the caller reaps with `Child::wait` once the group is swept.
#[cfg(target_os = "linux")]
fn leader_exited(child: &mut Child) -> io::Result<bool> {
    use nix::errno::Errno;
    use nix::sys::wait::{waitid, Id, WaitPidFlag, WaitStatus};
    use nix::unistd::Pid;

    let flags = WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT | WaitPidFlag::WNOHANG;
    match waitid(Id::Pid(Pid::from_raw(child.id() as i32)), flags) {
        Ok(WaitStatus::StillAlive) | Err(Errno::EINTR) => Ok(false),
        Ok(_) => Ok(true),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(target_os = "linux"))]
fn leader_exited(child: &mut Child) -> io::Result<bool> {
    child.try_wait().map(|status| status.is_some())
}

/// Write stdin from a helper thread. A program that exits without reading
/// closes the pipe, which ends the feeder with a broken pipe.
fn feed_stdin(child: &mut Child, data: Vec<u8>) -> Result<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    thread::Builder::new()
        .name("stdin-feeder".to_string())
        .spawn(move || {
            if let Err(e) = stdin.write_all(&data) {
                if e.kind() != ErrorKind::BrokenPipe {
                    debug!("stdin feed stopped: {}", e);
                }
            }
        })
        .map_err(GraderError::Io)?;
    Ok(())
}

fn abandon(child: &mut Child, kill_switch: &KillSwitch, error: GraderError) -> GraderError {
    kill_switch.sweep();
    let _ = child.wait();
    error
}
