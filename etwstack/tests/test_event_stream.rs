use etwstack::classification::{FilterConfig, FrameFilter};
use etwstack::domain::ThreadId;
use etwstack::profiling::EventDispatcher;
use etwstack::trace_data::{ResolutionMode, TraceOutput};
use etwstack_common::MarkKind;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::process::Command;

const TRACER_FILE: &str = r"C:\Python\Lib\site-packages\etwtrace\__init__.py";
const THREADING_FILE: &str = "/usr/lib/python3.12/threading.py";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn replay(name: &str, config: &FilterConfig) -> (EventDispatcher, Vec<TraceOutput>) {
    let file = File::open(fixture(name)).expect("fixture exists");
    let mut dispatcher = EventDispatcher::new(FrameFilter::from_config(config));
    let mut outputs = Vec::new();
    dispatcher.replay(BufReader::new(file), |o| outputs.push(o.clone())).expect("fixture readable");
    (dispatcher, outputs)
}

fn stacks(outputs: &[TraceOutput]) -> Vec<Vec<String>> {
    outputs.iter().filter_map(TraceOutput::as_stack).map(|s| s.frames.clone()).collect()
}

fn infrastructure(files: &[&str]) -> FilterConfig {
    FilterConfig {
        infrastructure_files: files.iter().map(ToString::to_string).collect(),
        ..FilterConfig::default()
    }
}

#[test]
fn test_by_arg_sampled() {
    let (dispatcher, outputs) = replay("by_arg_sampled.jsonl", &infrastructure(&[TRACER_FILE]));

    assert_eq!(
        stacks(&outputs),
        vec![vec!["a", "<module>"], vec!["b", "a", "<module>"], vec!["c", "b", "a", "<module>"]]
    );
    assert!(outputs
        .iter()
        .filter_map(TraceOutput::as_stack)
        .all(|s| s.mode == ResolutionMode::Sampled && s.thread_id == ThreadId(4242)));
    assert_eq!(dispatcher.stats().samples, 3);
    assert_eq!(dispatcher.stats().unresolved_addresses, 5);
    assert_eq!(dispatcher.stats().anomalies(), 0);
}

#[test]
fn test_by_arg_instrumented() {
    let (dispatcher, outputs) = replay("by_arg_instrumented.jsonl", &infrastructure(&[TRACER_FILE]));

    assert_eq!(
        stacks(&outputs),
        vec![vec!["a", "<module>"], vec!["b", "a", "<module>"], vec!["c", "b", "a", "<module>"]]
    );
    let labels: Vec<_> =
        outputs.iter().filter_map(TraceOutput::as_stack).map(|s| s.label.clone()).collect();
    assert_eq!(labels, vec![Some("Test".to_string()); 3]);
    assert!(dispatcher.stacks().active_threads().is_empty());
    assert_eq!(dispatcher.stats().stack_mismatch, 0);
}

#[test]
fn test_tracer_frames_visible_without_infrastructure_rules() {
    let (_, outputs) = replay("by_arg_sampled.jsonl", &FilterConfig::default());
    assert_eq!(stacks(&outputs)[0], vec!["_mark_stack", "a", "<module>"]);

    let (_, outputs) = replay("by_arg_instrumented.jsonl", &FilterConfig::default());
    assert_eq!(stacks(&outputs)[0], vec!["_mark_stack", "a", "<module>"]);
}

#[test]
fn test_include_prefix_matches_windows_paths() {
    let config = FilterConfig { include_prefixes: vec!["C:/scripts/".to_string()], ..FilterConfig::default() };
    let (dispatcher, outputs) = replay("by_arg_sampled.jsonl", &config);

    assert_eq!(stacks(&outputs)[2], vec!["c", "b", "a", "<module>"]);
    assert!(dispatcher.filter().diagnostics().count(etwstack::classification::FrameOrigin::NotIncluded) > 0);
}

#[test]
fn test_threaded() {
    let (dispatcher, outputs) = replay("threaded.jsonl", &infrastructure(&[THREADING_FILE]));

    let found: HashSet<Vec<String>> = stacks(&outputs).into_iter().collect();
    let expected: HashSet<Vec<String>> = [vec!["a"], vec!["b", "a"], vec!["c", "b", "a"]]
        .into_iter()
        .map(|s| s.into_iter().map(String::from).collect())
        .collect();
    assert_eq!(found, expected);

    let threads: HashSet<ThreadId> = outputs.iter().map(TraceOutput::thread_id).collect();
    assert_eq!(threads.len(), 3);
    assert!(dispatcher.stacks().active_threads().is_empty());
    assert_eq!(dispatcher.stats().stack_mismatch, 0);
}

#[test]
fn test_malformed_lines_counted_and_skipped() {
    let (dispatcher, outputs) = replay("malformed.jsonl", &FilterConfig::default());

    assert_eq!(dispatcher.stats().malformed, 3);
    assert_eq!(dispatcher.stats().events, 6);
    assert_eq!(outputs.len(), 3);

    let kinds: Vec<Option<MarkKind>> = outputs
        .iter()
        .map(|o| match o {
            TraceOutput::Marker(m) => Some(m.kind),
            TraceOutput::Stack(_) => None,
        })
        .collect();
    assert_eq!(kinds, vec![Some(MarkKind::RangeBegin), None, Some(MarkKind::RangeEnd)]);
    assert_eq!(stacks(&outputs), vec![vec!["main"]]);
}

#[test]
fn test_replay_from_temp_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"event":"module_defined","id":1,"source_file":"late.py"}}"#).unwrap();
    writeln!(file, r#"{{"event":"function_enter","thread_id":5,"function_id":7}}"#).unwrap();
    writeln!(file, r#"{{"event":"mark","thread_id":5,"label":"early","kind":"stack_capture"}}"#).unwrap();
    writeln!(file, r#"{{"event":"function_defined","id":7,"module_id":1,"name":"late"}}"#).unwrap();
    writeln!(file, r#"{{"event":"mark","thread_id":5,"label":"later","kind":"stack_capture"}}"#).unwrap();
    file.flush().unwrap();

    let mut dispatcher = EventDispatcher::new(FrameFilter::new());
    let mut outputs = Vec::new();
    let processed = dispatcher
        .replay(BufReader::new(File::open(file.path()).unwrap()), |o| outputs.push(o.clone()))
        .unwrap();

    // The entry raced ahead of its definition; only the later capture sees it
    assert_eq!(processed, 5);
    assert_eq!(stacks(&outputs), vec![Vec::<String>::new(), vec!["late".to_string()]]);
    assert_eq!(dispatcher.stats().unresolved_ids, 1);
}

#[test]
fn test_non_utf8_line_skipped_and_replay_continues() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{\"event\":\"module_defined\",\"id\":1,\"source_file\":\"caf\xe9.py\"}\n").unwrap();
    writeln!(file, r#"{{"event":"module_defined","id":1,"source_file":"cafe.py"}}"#).unwrap();
    writeln!(file, r#"{{"event":"function_defined","id":1,"module_id":1,"name":"brew"}}"#).unwrap();
    writeln!(file, r#"{{"event":"function_enter","thread_id":3,"function_id":1}}"#).unwrap();
    writeln!(file, r#"{{"event":"mark","thread_id":3,"label":"pour","kind":"stack_capture"}}"#).unwrap();
    file.flush().unwrap();

    let mut dispatcher = EventDispatcher::new(FrameFilter::new());
    let mut outputs = Vec::new();
    let processed = dispatcher
        .replay(BufReader::new(File::open(file.path()).unwrap()), |o| outputs.push(o.clone()))
        .unwrap();

    assert_eq!(processed, 4);
    assert_eq!(dispatcher.stats().malformed, 1);
    assert_eq!(stacks(&outputs), vec![vec!["brew".to_string()]]);

    let status = etwstack().arg(file.path()).args(["--format", "none", "--quiet"]).status().unwrap();
    assert!(status.success());
}

// =============================================================================
// BINARY
// =============================================================================

fn etwstack() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_etwstack"));
    cmd.env_remove("ETWSTACK_IGNORE").env_remove("ETWSTACK_INCLUDE");
    cmd
}

#[test]
fn test_binary_jsonl_output() {
    let output = etwstack()
        .arg(fixture("by_arg_sampled.jsonl"))
        .args(["--format", "jsonl", "--quiet", "--infrastructure", TRACER_FILE])
        .output()
        .unwrap();

    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    let parsed: Vec<TraceOutput> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(stacks(&parsed)[1], vec!["b", "a", "<module>"]);
}

#[test]
fn test_binary_ignore_from_environment() {
    let output = etwstack()
        .env("ETWSTACK_IGNORE", format!("{TRACER_FILE};C:/scripts/by_arg.py"))
        .arg(fixture("by_arg_instrumented.jsonl"))
        .args(["--format", "jsonl", "--quiet"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    let parsed: Vec<TraceOutput> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(parsed.len(), 3);
    assert!(stacks(&parsed).iter().all(Vec::is_empty));
}

#[test]
fn test_binary_summary() {
    let output = etwstack()
        .arg(fixture("threaded.jsonl"))
        .args(["--summary", "--format", "none", "--quiet", "--infrastructure", THREADING_FILE])
        .output()
        .unwrap();

    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.starts_with("HOTSPOTS (3 stacks)"));
    assert!(text.contains("c <- b <- a"));
}

#[test]
fn test_binary_info() {
    let output = etwstack().args(["--info", "--ignore", "x.py"]).output().unwrap();

    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.starts_with("etwstack "));
    assert!(text.contains("x.py"));
}

#[test]
fn test_binary_missing_input_is_usage_error() {
    let output = etwstack().arg(fixture("does_not_exist.jsonl")).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}
