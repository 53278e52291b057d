// SPDX-License-Identifier: MIT

//! Integration tests for manifest loading and task execution
//!
//! These tests drive whole runs through the library API with a fake process
//! runner, plus a few against the real shell.

use async_trait::async_trait;
use keel_rs::keel::config::RunConfig;
use keel_rs::keel::manifest::ManifestLoader;
use keel_rs::keel::pipeline::task::{BUILD_TASK_SUFFIX, ROOT_TASK_NAME};
use keel_rs::keel::pipeline::{
    schedule, CommandOptions, Executor, RunReport, TaskGraph, TaskKind, TaskNormalizer,
    TaskStatus,
};
use keel_rs::kit::error::{GraphError, KeelError, ProcessError};
use keel_rs::kit::process::{OutputLine, OutputStream, ProcessRunner, ShellRunner};
use keel_rs::kit::reference::DockerReferenceNormalizer;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc;

// ============================================================================
// Mock Components
// ============================================================================

/// Runner that records every command; commands containing a configured
/// fragment exit with the matching code, everything else exits 0
struct MockRunner {
    failures: Vec<(String, i32)>,
    invoked: Mutex<Vec<String>>,
}

impl MockRunner {
    fn new() -> Arc<Self> {
        Self::failing(&[])
    }

    fn failing(failures: &[(&str, i32)]) -> Arc<Self> {
        Arc::new(Self {
            failures: failures
                .iter()
                .map(|(f, c)| (f.to_string(), *c))
                .collect(),
            invoked: Mutex::new(vec![]),
        })
    }

    fn invoked(&self) -> Vec<String> {
        self.invoked.lock().unwrap().clone()
    }

    fn invoked_containing(&self, fragment: &str) -> Vec<String> {
        self.invoked()
            .into_iter()
            .filter(|c| c.contains(fragment))
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(&self, command: &str, tx: mpsc::Sender<OutputLine>) -> Result<i32, ProcessError> {
        self.invoked.lock().unwrap().push(command.to_string());
        let _ = tx
            .send(OutputLine {
                stream: OutputStream::Stdout,
                line: "ok".to_string(),
            })
            .await;
        Ok(self
            .failures
            .iter()
            .find(|(fragment, _)| command.contains(fragment.as_str()))
            .map(|(_, code)| *code)
            .unwrap_or(0))
    }
}

fn write_manifest(dir: &TempDir, file: &str, content: &str) -> PathBuf {
    let path = dir.path().join(file);
    fs::write(&path, content).unwrap();
    path
}

fn config_for(path: PathBuf, dry_run: bool) -> RunConfig {
    RunConfig {
        manifests: vec![path],
        dry_run,
        extra_args: vec![],
        default_args: Default::default(),
    }
}

async fn run_yaml(yaml: &str, runner: Arc<MockRunner>, dry_run: bool) -> RunReport {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(&dir, "keel.yaml", yaml);
    keel_rs::keel::run(&config_for(path, dry_run), runner, &DockerReferenceNormalizer::new())
        .await
        .unwrap()
        .expect("manifest declares tasks")
}

fn names(report: &RunReport) -> Vec<&str> {
    report.tasks.iter().map(|t| t.name.as_str()).collect()
}

// ============================================================================
// Whole runs
// ============================================================================

const BASE_APP_MANIFEST: &str = r#"
- task: app
  tag: app:1
  dependsOn: base
- task: base
  tag: base:1
"#;

#[tokio::test]
async fn test_base_app_success() {
    let runner = MockRunner::new();
    let report = run_yaml(BASE_APP_MANIFEST, runner.clone(), false).await;

    assert_eq!(names(&report), vec!["base", "app"]);
    assert!(report.tasks.iter().all(|t| t.status == TaskStatus::Done));
    assert_eq!(report.exit_code(), 0);

    let invoked = runner.invoked();
    assert_eq!(invoked.len(), 2);
    assert!(invoked[0].starts_with("docker build"));
    assert!(invoked[0].contains("-t base:1"));
    assert!(invoked[1].contains("-t app:1"));
}

#[tokio::test]
async fn test_failed_build_cascades() {
    let runner = MockRunner::failing(&[("-t base:1", 1)]);
    let report = run_yaml(BASE_APP_MANIFEST, runner.clone(), false).await;

    let base = report.get("base").unwrap();
    assert_eq!(base.status, TaskStatus::Failed);
    assert_eq!(base.code, Some(1));
    assert_eq!(base.message.as_deref(), Some("Failed with code: 1"));

    let app = report.get("app").unwrap();
    assert_eq!(app.status, TaskStatus::Failed);
    assert!(app.message.as_deref().unwrap().contains("\"base\""));
    assert!(runner.invoked_containing("app:1").is_empty());

    assert_eq!(report.failed_count(), 2);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_skipped_task_is_never_invoked() {
    let runner = MockRunner::new();
    let report = run_yaml(
        r#"
- task: base
  tag: base:1
  skip: true
- task: lint
  command: make lint
"#,
        runner.clone(),
        false,
    )
    .await;

    assert_eq!(report.get("base").unwrap().status, TaskStatus::Skipped);
    assert_eq!(report.get("lint").unwrap().status, TaskStatus::Done);
    assert_eq!(runner.invoked(), vec!["make lint"]);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_validate_already_satisfied() {
    let runner = MockRunner::new();
    let report = run_yaml(
        r#"
- task: gen
  command: make out.txt
  validate: test -f out.txt
"#,
        runner.clone(),
        false,
    )
    .await;

    assert_eq!(report.get("gen").unwrap().status, TaskStatus::Done);
    assert_eq!(runner.invoked(), vec!["test -f out.txt"]);
}

#[tokio::test]
async fn test_dry_run_only_echoes() {
    let runner = MockRunner::new();
    let report = run_yaml(BASE_APP_MANIFEST, runner.clone(), true).await;

    assert!(report.dry_run);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(runner.invoked().len(), 2);
    for command in runner.invoked() {
        assert!(command.starts_with("echo 'dry run of docker build"), "{}", command);
    }
}

#[tokio::test]
async fn test_run_level_default_args() {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(
        &dir,
        "keel.yaml",
        r#"
- task: plain
  command: ./run.sh
- task: own
  command: ./run.sh
  args:
    --env: prod
"#,
    );
    let runner = MockRunner::new();
    let config = config_for(path, false)
        .with_default_args([("--env".to_string(), "ci".to_string())]);

    keel_rs::keel::run(&config, runner.clone(), &DockerReferenceNormalizer::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(runner.invoked(), vec!["./run.sh --env ci", "./run.sh --env prod"]);
}

#[tokio::test]
async fn test_hierarchy_round_trip() {
    let runner = MockRunner::new();
    let report = run_yaml("- task: a:b:c\n  command: make abc\n", runner.clone(), false).await;

    assert_eq!(names(&report), vec!["a:b:c", "a", "a:b"]);
    assert_eq!(report.get("a").unwrap().kind, TaskKind::Control);
    assert_eq!(report.get("a:b").unwrap().kind, TaskKind::Control);
    assert!(report.tasks.iter().all(|t| t.status == TaskStatus::Done));
    assert_eq!(runner.invoked(), vec!["make abc"]);
}

#[tokio::test]
async fn test_push_split() {
    let runner = MockRunner::new();
    let report = run_yaml(
        r#"
- task: x
  tags: [x:1, x:latest]
  push: true
- task: deploy
  command: ./deploy.sh
  dependsOn: x
"#,
        runner.clone(),
        false,
    )
    .await;

    let build_name = format!("x{}", BUILD_TASK_SUFFIX);
    assert_eq!(names(&report), vec![build_name.as_str(), "x", "deploy"]);
    assert_eq!(report.get("x").unwrap().kind, TaskKind::DockerPush);

    let invoked = runner.invoked();
    assert!(invoked[0].contains("docker tag x:1 x:latest"));
    assert_eq!(invoked[1], "docker push x:1 && docker push x:latest");
    assert_eq!(invoked[2], "./deploy.sh");
}

#[tokio::test]
async fn test_failed_push_blocks_consumer() {
    let runner = MockRunner::failing(&[("docker push", 1)]);
    let report = run_yaml(
        r#"
- task: x
  tag: x:1
  push: true
- task: deploy
  command: ./deploy.sh
  dependsOn: x
"#,
        runner.clone(),
        false,
    )
    .await;

    let build_name = format!("x{}", BUILD_TASK_SUFFIX);
    assert_eq!(report.get(&build_name).unwrap().status, TaskStatus::Done);
    assert_eq!(report.get("x").unwrap().status, TaskStatus::Failed);
    assert_eq!(report.get("deploy").unwrap().status, TaskStatus::Failed);
    assert!(runner.invoked_containing("deploy").is_empty());
}

#[tokio::test]
async fn test_unknown_type_fails_only_its_branch() {
    let runner = MockRunner::new();
    let report = run_yaml(
        r#"
- task: weird
  type: DEPLOY
  command: ./weird.sh
- task: after
  command: ./after.sh
  dependsOn: weird
- task: other
  command: ./other.sh
"#,
        runner.clone(),
        false,
    )
    .await;

    assert_eq!(report.get("weird").unwrap().status, TaskStatus::Failed);
    assert_eq!(report.get("after").unwrap().status, TaskStatus::Failed);
    assert_eq!(report.get("other").unwrap().status, TaskStatus::Done);
    assert_eq!(runner.invoked(), vec!["./other.sh"]);
}

#[tokio::test]
async fn test_invalid_tag_fails_task() {
    let runner = MockRunner::new();
    let report = run_yaml("- task: bad\n  tag: Bad/Image\n", runner.clone(), false).await;

    assert_eq!(report.get("bad").unwrap().status, TaskStatus::Failed);
    assert!(runner.invoked().is_empty());
}

#[tokio::test]
async fn test_unresolved_dependency_is_dropped() {
    let runner = MockRunner::new();
    let report = run_yaml(
        "- task: lonely\n  command: ./run.sh\n  dependsOn: ghost\n",
        runner.clone(),
        false,
    )
    .await;

    assert_eq!(report.get("lonely").unwrap().status, TaskStatus::Done);
}

// ============================================================================
// Fatal errors
// ============================================================================

#[tokio::test]
async fn test_cycle_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(
        &dir,
        "keel.yaml",
        r#"
- task: a
  command: ./a.sh
  dependsOn: b
- task: b
  command: ./b.sh
  dependsOn: a
"#,
    );
    let runner = MockRunner::new();
    let err = keel_rs::keel::run(
        &config_for(path, false),
        runner.clone(),
        &DockerReferenceNormalizer::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, KeelError::Graph(GraphError::CycleDetected(_))));
    assert!(err.is_fatal());
    assert!(runner.invoked().is_empty());
}

#[tokio::test]
async fn test_reserved_name_is_fatal() {
    let dir = TempDir::new().unwrap();
    let yaml = format!("- task: \"{}\"\n  command: ./x.sh\n", ROOT_TASK_NAME);
    let path = write_manifest(&dir, "keel.yaml", &yaml);

    let err = keel_rs::keel::run(
        &config_for(path, false),
        MockRunner::new(),
        &DockerReferenceNormalizer::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, KeelError::Graph(GraphError::ReservedName(_))));
}

#[tokio::test]
async fn test_missing_manifest_is_fatal() {
    let dir = TempDir::new().unwrap();
    let err = keel_rs::keel::run(
        &config_for(dir.path().join("nope.yaml"), false),
        MockRunner::new(),
        &DockerReferenceNormalizer::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, KeelError::Manifest(_)));
}

#[tokio::test]
async fn test_empty_manifest_is_soft_exit() {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(&dir, "keel.json", "[]");

    let report = keel_rs::keel::run(
        &config_for(path, false),
        MockRunner::new(),
        &DockerReferenceNormalizer::new(),
    )
    .await
    .unwrap();

    assert!(report.is_none());
}

// ============================================================================
// Manifest loading
// ============================================================================

#[tokio::test]
async fn test_directory_manifest_and_relative_paths() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("app")).unwrap();
    fs::write(dir.path().join("app").join("Dockerfile"), "FROM scratch\n").unwrap();
    write_manifest(
        &dir,
        "keel.json",
        r#"{"task": "app", "tag": "app:1", "dockerfile": "app"}"#,
    );

    let specs = ManifestLoader::new().load_all(&[dir.path()]).unwrap();
    assert_eq!(specs.len(), 1);

    let refs = DockerReferenceNormalizer::new();
    let tasks = TaskNormalizer::new(&refs).normalize_all(&specs);
    let expected_dockerfile = dir.path().join("app").join("Dockerfile");
    assert_eq!(tasks[0].dockerfile.as_deref(), Some(expected_dockerfile.as_path()));
    assert_eq!(tasks[0].context.as_deref(), Some(dir.path().join("app").as_path()));
}

#[tokio::test]
async fn test_multiple_manifests_concatenate() {
    let dir = TempDir::new().unwrap();
    let first = write_manifest(&dir, "one.yaml", "- task: one\n  command: ./one.sh\n");
    let second = write_manifest(
        &dir,
        "two.json",
        r#"[{"task": "two", "command": "./two.sh", "dependsOn": "one"}]"#,
    );

    let runner = MockRunner::new();
    let config = RunConfig {
        manifests: vec![first, second],
        dry_run: false,
        extra_args: vec![],
        default_args: Default::default(),
    };
    let report = keel_rs::keel::run(&config, runner.clone(), &DockerReferenceNormalizer::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(names(&report), vec!["one", "two"]);
    assert_eq!(runner.invoked(), vec!["./one.sh", "./two.sh"]);
}

// ============================================================================
// Real shell
// ============================================================================

#[tokio::test]
async fn test_shell_runner_end_to_end() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("marker");
    let yaml = format!(
        r#"
- task: touch
  command: touch {marker}
  validate: test -f {marker}
- task: fail
  command: "false"
- task: after
  command: "true"
  dependsOn: fail
"#,
        marker = marker.display()
    );
    let path = write_manifest(&dir, "keel.yaml", &yaml);

    let specs = ManifestLoader::new().load(&path).unwrap().tasks;
    let refs = DockerReferenceNormalizer::new();
    let mut graph = TaskGraph::build(TaskNormalizer::new(&refs).normalize_all(&specs)).unwrap();
    let order = schedule(&mut graph).unwrap();
    let report = Executor::new(Arc::new(ShellRunner::new()), CommandOptions::default())
        .run(&mut graph, &order)
        .await;

    assert!(marker.exists());
    assert_eq!(report.get("touch").unwrap().status, TaskStatus::Done);
    assert_eq!(report.get("fail").unwrap().code, Some(1));
    assert_eq!(report.get("after").unwrap().status, TaskStatus::Failed);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_shell_runner_dry_run_has_no_side_effects() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("marker");
    let yaml = format!("- task: touch\n  command: touch {}\n", marker.display());
    let path = write_manifest(&dir, "keel.yaml", &yaml);

    let report = keel_rs::keel::run(
        &config_for(path, true),
        Arc::new(ShellRunner::new()),
        &DockerReferenceNormalizer::new(),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(!marker.exists());
    assert_eq!(report.get("touch").unwrap().code, Some(0));
}

#[tokio::test]
async fn test_shell_runner_dry_run_with_validate_reports_command() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing").join("out.txt");
    let yaml = format!(
        "- task: gen\n  command: touch {path}\n  validate: test -f {path}\n",
        path = missing.display()
    );
    let path = write_manifest(&dir, "keel.yaml", &yaml);

    let report = keel_rs::keel::run(
        &config_for(path, true),
        Arc::new(ShellRunner::new()),
        &DockerReferenceNormalizer::new(),
    )
    .await
    .unwrap()
    .unwrap();

    let gen = report.get("gen").unwrap();
    assert_eq!(gen.status, TaskStatus::Done);
    assert_eq!(
        gen.message.as_deref(),
        Some("Completed successfully, validate passed")
    );
    assert!(gen.command.as_deref().unwrap().starts_with("echo 'dry run of touch"));
    assert!(!missing.exists());
}

#[tokio::test]
async fn test_shell_runner_tolerates_invalid_utf8_output() {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(
        &dir,
        "keel.yaml",
        r#"
- task: noisy
  command: printf 'ok\n\377\376\n'; exit 0
- task: after
  command: "true"
  dependsOn: noisy
"#,
    );

    let report = keel_rs::keel::run(
        &config_for(path, false),
        Arc::new(ShellRunner::new()),
        &DockerReferenceNormalizer::new(),
    )
    .await
    .unwrap()
    .unwrap();

    let noisy = report.get("noisy").unwrap();
    assert_eq!(noisy.status, TaskStatus::Done);
    assert_eq!(noisy.code, Some(0));
    assert_eq!(report.get("after").unwrap().status, TaskStatus::Done);
}
