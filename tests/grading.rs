use gradebox::config::engine::EngineConfig;
use gradebox::{Grader, GradingRequest, Language, RunVerdict, SlotState};
use std::process::Command;
use std::sync::Arc;
use std::thread;

fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

macro_rules! require_python {
    () => {
        if !python_available() {
            eprintln!("skipping: python3 is not installed");
            return;
        }
    };
}

fn grader(pool_size: usize) -> (tempfile::TempDir, Grader) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        pool_size,
        workspace_root: dir.path().join("sandbox"),
        ..EngineConfig::default()
    };
    (dir, Grader::new(&config).unwrap())
}

fn inputs(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn assert_pool_idle(grader: &Grader) {
    let status = grader.status();
    assert!(status.slots.iter().all(|slot| slot.state == SlotState::Available));
    for slot in &status.slots {
        assert_eq!(std::fs::read_dir(&slot.path).unwrap().count(), 0);
    }
}

#[test]
fn test_echo_program() {
    require_python!();
    let (_dir, grader) = grader(2);

    let result = grader
        .grade(GradingRequest::new("print(input())", Language::Python, inputs(&["5\n"])))
        .unwrap();

    assert!(!result.is_error && !result.is_timeout && !result.is_memory_exceeded);
    assert_eq!(result.outcomes.len(), 1);
    let outcome = &result.outcomes[0];
    assert_eq!(outcome.verdict, RunVerdict::Ok);
    assert_eq!(outcome.output_content, "5\n");
    assert_eq!(outcome.input_content, "5\n");
    assert_eq!(outcome.input_index, 0);
    assert!(outcome.error.is_none());
    assert_pool_idle(&grader);
}

#[test]
fn test_infinite_loop_times_out() {
    require_python!();
    let (_dir, grader) = grader(1);

    let request = GradingRequest::new("while True:\n    pass\n", Language::Python, inputs(&[""]))
        .with_time_limit_ms(200);
    let result = grader.grade(request).unwrap();

    let outcome = &result.outcomes[0];
    assert!(outcome.is_timeout);
    assert!(!outcome.is_error && !outcome.is_memory_exceeded);
    assert!(outcome.output_content.is_empty());
    assert!(outcome.execution_time_ms >= 200);
    assert!(outcome.execution_time_ms < 1000, "took {} ms", outcome.execution_time_ms);
    assert!(result.is_timeout);
    assert_pool_idle(&grader);
}

#[test]
fn test_huge_allocation_exceeds_memory() {
    require_python!();
    let (_dir, grader) = grader(1);

    let result = grader
        .grade(GradingRequest::new("x = [0] * 10**9\n", Language::Python, inputs(&[""])))
        .unwrap();

    let outcome = &result.outcomes[0];
    assert!(outcome.is_memory_exceeded, "outcome: {outcome:?}");
    assert!(!outcome.is_timeout && !outcome.is_error);
    assert!(result.is_memory_exceeded);
    assert_pool_idle(&grader);
}

#[test]
fn test_monitor_kills_growth_within_one_interval() {
    require_python!();
    let dir = tempfile::tempdir().unwrap();
    let ceiling_kb = 64 * 1024;
    let config = EngineConfig {
        pool_size: 1,
        workspace_root: dir.path().join("sandbox"),
        timeout_ms: 10_000,
        memory_limit_kb: ceiling_kb,
        // Zero disables RLIMIT_AS so only the monitor can stop the run
        address_space_limit_kb: Some(0),
        sample_interval_ms: 100,
        ..EngineConfig::default()
    };
    let grader = Grader::new(&config).unwrap();

    // 4 MiB every 50 ms: two chunks per sampling interval
    let code = "import time\nchunks = []\nwhile True:\n    chunks.append(bytearray(4 * 1024 * 1024))\n    time.sleep(0.05)\n";
    let result = grader
        .grade(GradingRequest::new(code, Language::Python, inputs(&[""])))
        .unwrap();

    let outcome = &result.outcomes[0];
    assert_eq!(outcome.verdict, RunVerdict::MemoryLimit, "outcome: {outcome:?}");
    assert!(outcome.is_memory_exceeded && !outcome.is_timeout && !outcome.is_error);

    let chunk_kb = 4 * 1024;
    let growth_per_interval_kb = 2 * chunk_kb;
    assert!(outcome.memory_usage_kb > ceiling_kb);
    assert!(
        outcome.memory_usage_kb <= ceiling_kb + growth_per_interval_kb + chunk_kb,
        "peak {} KB",
        outcome.memory_usage_kb
    );
    assert!(outcome.execution_time_ms < 5000, "took {} ms", outcome.execution_time_ms);
    assert_pool_idle(&grader);
}

#[test]
fn test_marker_text_in_output_is_runtime_error() {
    require_python!();
    let (_dir, grader) = grader(1);

    let code = "print('MemoryError budget is fine')\nprint('checked')\nraise SystemExit(2)\n";
    let result = grader
        .grade(GradingRequest::new(code, Language::Python, inputs(&[""])))
        .unwrap();

    let outcome = &result.outcomes[0];
    assert_eq!(outcome.verdict, RunVerdict::RuntimeError);
    assert!(outcome.is_error && !outcome.is_memory_exceeded);
    assert_eq!(outcome.error.as_deref(), Some("checked"));
    assert!(!result.is_memory_exceeded);
}

#[test]
fn test_crash_is_isolated_to_its_input() {
    require_python!();
    let (_dir, grader) = grader(1);

    let code = "n = int(input())\nprint(10 // n)\n";
    let result = grader
        .grade(GradingRequest::new(code, Language::Python, inputs(&["1", "0", "5"])))
        .unwrap();

    assert_eq!(result.outcomes.len(), 3);
    assert_eq!(result.outcomes[0].output_content, "10\n");
    assert!(result.outcomes[1].is_error);
    assert!(result.outcomes[1]
        .error
        .as_deref()
        .unwrap_or("")
        .contains("ZeroDivisionError"));
    assert_eq!(result.outcomes[2].output_content, "2\n");
    assert!(result.has_runtime_errors);
    assert!(!result.is_error);

    let indices: Vec<usize> = result.outcomes.iter().map(|o| o.input_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn test_many_inputs_keep_order() {
    require_python!();
    let (_dir, grader) = grader(1);

    let values: Vec<String> = (0..12).map(|i| format!("{i}\n")).collect();
    let result = grader
        .grade(GradingRequest::new("print(input())", Language::Python, values.clone()))
        .unwrap();

    let outputs: Vec<&str> = result.outcomes.iter().map(|o| o.output_content.as_str()).collect();
    let expected: Vec<&str> = values.iter().map(String::as_str).collect();
    assert_eq!(outputs, expected);
}

#[test]
fn test_zero_inputs() {
    let (_dir, grader) = grader(1);
    let result = grader
        .grade(GradingRequest::new("print(1)", Language::Python, Vec::new()))
        .unwrap();
    assert!(result.outcomes.is_empty());
    assert!(!result.is_error && !result.is_timeout && !result.is_memory_exceeded);
    assert_pool_idle(&grader);
}

#[test]
fn test_compiled_languages_release_their_slot() {
    let (_dir, grader) = grader(1);
    for language in [Language::C, Language::Cpp] {
        let err = grader
            .grade(GradingRequest::new("int main() { return 0; }", language, inputs(&["1"])))
            .unwrap_err();
        assert!(matches!(err, gradebox::GraderError::NotImplemented { .. }));
    }
    assert_pool_idle(&grader);
}

#[test]
fn test_concurrent_requests_share_the_pool() {
    require_python!();
    let (_dir, grader) = grader(2);
    let grader = Arc::new(grader);

    let workers: Vec<_> = (0..6)
        .map(|i| {
            let grader = Arc::clone(&grader);
            thread::spawn(move || {
                let request = GradingRequest::new(
                    "print(int(input()) * 2)",
                    Language::Python,
                    vec![format!("{i}\n")],
                );
                grader.grade(request).unwrap()
            })
        })
        .collect();

    for (i, worker) in workers.into_iter().enumerate() {
        let result = worker.join().unwrap();
        assert_eq!(result.outcomes[0].output_content, format!("{}\n", i * 2));
    }

    assert_pool_idle(&grader);
    assert_eq!(grader.status().counters.acquisitions, 6);
}
