/// Verdict classification and aggregation
/// Pure functions over the evidence a single run leaves behind.
use crate::config::types::*;
use crate::judge::adapter::LanguageAdapter;

/// Everything the runner observed about one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunEvidence {
    pub input_index: usize,
    pub input_content: String,
    /// Exit code for a normal exit
    pub exit_code: Option<i32>,
    /// Terminating signal, if the process died on one
    pub signal: Option<i32>,
    /// Set when the engine killed the run
    pub termination: Option<TerminationCause>,
    /// Combined stdout and stderr
    pub output: String,
    pub output_truncated: bool,
    pub elapsed_ms: u64,
    pub peak_kb: u64,
}

/// Verdict classifier - pure function over evidence
pub struct VerdictClassifier;

impl VerdictClassifier {
    /// Classify one run. Engine terminations take precedence over the exit
    /// status, since a killed process also reports a failure. Only the final
    /// diagnostic line of a failed run can make it a memory failure.
    pub fn classify(evidence: RunEvidence, adapter: &dyn LanguageAdapter) -> RunOutcome {
        let failed = evidence.termination.is_some() || evidence.exit_code != Some(0);
        let excerpt = if failed {
            Self::error_excerpt(&evidence.output)
        } else {
            None
        };

        let verdict = match evidence.termination {
            Some(TerminationCause::Deadline) => RunVerdict::TimeLimit,
            Some(TerminationCause::MemoryCeiling) => RunVerdict::MemoryLimit,
            None if !failed => RunVerdict::Ok,
            None if excerpt
                .as_deref()
                .is_some_and(|line| adapter.is_out_of_memory(line)) =>
            {
                RunVerdict::MemoryLimit
            }
            None => RunVerdict::RuntimeError,
        };

        let mut outcome = RunOutcome::with_verdict(
            verdict,
            evidence.input_index,
            evidence.input_content,
        );
        outcome.execution_time_ms = evidence.elapsed_ms;
        outcome.memory_usage_kb = evidence.peak_kb;

        match verdict {
            RunVerdict::Ok => {
                outcome.output_content = evidence.output;
                outcome.output_truncated = evidence.output_truncated;
            }
            RunVerdict::TimeLimit => {}
            RunVerdict::MemoryLimit | RunVerdict::RuntimeError => {
                outcome.error = excerpt.or_else(|| {
                    evidence
                        .signal
                        .filter(|_| evidence.termination.is_none())
                        .map(|signal| format!("terminated by signal {signal}"))
                });
            }
        }

        outcome
    }

    /// Second-to-last newline-separated segment of the output. Output with a
    /// trailing newline yields its last line; fewer than three segments yield
    /// nothing.
    pub fn error_excerpt(output: &str) -> Option<String> {
        let segments: Vec<&str> = output.split('\n').collect();
        if segments.len() <= 2 {
            return None;
        }
        let line = segments[segments.len() - 2].trim_end_matches('\r');
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }
}

/// Fold per-run outcomes into the request result. `aborted` marks a loop cut
/// short by an infrastructure failure.
pub fn aggregate(outcomes: Vec<RunOutcome>, aborted: bool) -> GradingResult {
    GradingResult {
        is_error: aborted,
        is_timeout: outcomes.iter().any(|o| o.is_timeout),
        is_memory_exceeded: outcomes.iter().any(|o| o.is_memory_exceeded),
        has_runtime_errors: outcomes.iter().any(|o| o.is_error),
        outcomes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::languages::cpp::CppAdapter;
    use crate::judge::languages::python::PythonAdapter;

    fn evidence(exit_code: Option<i32>, output: &str) -> RunEvidence {
        RunEvidence {
            input_index: 2,
            input_content: "5\n".to_string(),
            exit_code,
            output: output.to_string(),
            elapsed_ms: 12,
            peak_kb: 3000,
            ..RunEvidence::default()
        }
    }

    #[test]
    fn test_classify_ok() {
        let outcome = VerdictClassifier::classify(evidence(Some(0), "5\n"), &PythonAdapter::default());
        assert_eq!(outcome.verdict, RunVerdict::Ok);
        assert_eq!(outcome.output_content, "5\n");
        assert_eq!(outcome.input_index, 2);
        assert_eq!(outcome.input_content, "5\n");
        assert_eq!(outcome.execution_time_ms, 12);
        assert_eq!(outcome.memory_usage_kb, 3000);
        assert!(outcome.error.is_none());
        assert!(!outcome.is_error && !outcome.is_timeout && !outcome.is_memory_exceeded);
    }

    #[test]
    fn test_classify_runtime_error() {
        let traceback = "Traceback (most recent call last):\n  File \"main.py\", line 2, in <module>\nZeroDivisionError: integer division or modulo by zero\n";
        let outcome = VerdictClassifier::classify(evidence(Some(1), traceback), &PythonAdapter::default());
        assert_eq!(outcome.verdict, RunVerdict::RuntimeError);
        assert!(outcome.is_error);
        assert!(outcome.output_content.is_empty());
        assert_eq!(
            outcome.error.as_deref(),
            Some("ZeroDivisionError: integer division or modulo by zero")
        );
    }

    #[test]
    fn test_deadline_wins_over_exit_status() {
        let mut ev = evidence(None, "partial output\nmore\n");
        ev.signal = Some(9);
        ev.termination = Some(TerminationCause::Deadline);
        let outcome = VerdictClassifier::classify(ev, &PythonAdapter::default());
        assert_eq!(outcome.verdict, RunVerdict::TimeLimit);
        assert!(outcome.is_timeout);
        assert!(!outcome.is_error);
        assert!(outcome.output_content.is_empty());
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_monitor_kill_is_memory_limit() {
        let mut ev = evidence(None, "");
        ev.signal = Some(9);
        ev.termination = Some(TerminationCause::MemoryCeiling);
        let outcome = VerdictClassifier::classify(ev, &PythonAdapter::default());
        assert_eq!(outcome.verdict, RunVerdict::MemoryLimit);
        assert!(outcome.is_memory_exceeded);
        assert!(!outcome.is_error);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_runtime_oom_marker_is_memory_limit() {
        let output = "Traceback (most recent call last):\n  File \"main.py\", line 1, in <module>\nMemoryError\n";
        let outcome = VerdictClassifier::classify(evidence(Some(1), output), &PythonAdapter::default());
        assert_eq!(outcome.verdict, RunVerdict::MemoryLimit);
        assert!(outcome.is_memory_exceeded);
        assert!(!outcome.is_error);
        assert_eq!(outcome.error.as_deref(), Some("MemoryError"));
    }

    #[test]
    fn test_memory_marker_in_program_output_is_runtime_error() {
        for output in [
            "MemoryError budget is fine\n",
            "start\nMemoryError budget is fine\n",
            "MemoryError\nTraceback (most recent call last):\nValueError: bad input\n",
        ] {
            let outcome = VerdictClassifier::classify(evidence(Some(2), output), &PythonAdapter::default());
            assert_eq!(outcome.verdict, RunVerdict::RuntimeError, "output: {output:?}");
            assert!(outcome.is_error && !outcome.is_memory_exceeded);
        }
    }

    #[test]
    fn test_bad_alloc_abort_is_memory_limit() {
        let mut ev = evidence(None, "terminate called after throwing an instance of 'std::bad_alloc'\n  what():  std::bad_alloc\n");
        ev.signal = Some(6);
        let outcome = VerdictClassifier::classify(ev, &CppAdapter);
        assert_eq!(outcome.verdict, RunVerdict::MemoryLimit);
        assert_eq!(outcome.error.as_deref(), Some("  what():  std::bad_alloc"));
    }

    #[test]
    fn test_memory_marker_ignored_on_clean_exit() {
        let outcome = VerdictClassifier::classify(
            evidence(Some(0), "caught MemoryError\n"),
            &PythonAdapter::default(),
        );
        assert_eq!(outcome.verdict, RunVerdict::Ok);
    }

    #[test]
    fn test_foreign_signal_is_runtime_error() {
        let mut ev = evidence(None, "");
        ev.signal = Some(11);
        let outcome = VerdictClassifier::classify(ev, &PythonAdapter::default());
        assert_eq!(outcome.verdict, RunVerdict::RuntimeError);
        assert_eq!(outcome.error.as_deref(), Some("terminated by signal 11"));
    }

    #[test]
    fn test_error_excerpt() {
        assert_eq!(VerdictClassifier::error_excerpt("a\nb\nc\n").as_deref(), Some("c"));
        assert_eq!(VerdictClassifier::error_excerpt("a\nb\nc").as_deref(), Some("b"));
        assert_eq!(VerdictClassifier::error_excerpt("only line\n"), None);
        assert_eq!(VerdictClassifier::error_excerpt(""), None);
        assert_eq!(VerdictClassifier::error_excerpt("x\r\nboom\r\n").as_deref(), Some("boom"));
    }

    #[test]
    fn test_aggregate_flags() {
        let ok = RunOutcome::with_verdict(RunVerdict::Ok, 0, "1".into());
        let re = RunOutcome::with_verdict(RunVerdict::RuntimeError, 1, "0".into());
        let tle = RunOutcome::with_verdict(RunVerdict::TimeLimit, 2, "5".into());

        let result = aggregate(vec![ok.clone(), re, tle], false);
        assert!(!result.is_error);
        assert!(result.is_timeout);
        assert!(result.has_runtime_errors);
        assert!(!result.is_memory_exceeded);
        assert_eq!(result.outcomes.len(), 3);

        let aborted = aggregate(vec![ok], true);
        assert!(aborted.is_error);
        assert!(!aborted.has_runtime_errors);
    }

    #[test]
    fn test_aggregate_empty() {
        assert_eq!(aggregate(Vec::new(), false), GradingResult::empty());
    }
}
