//! Integration tests: fatal output, pause/resume/cancel signalling and the
//! browser-cookie fallback, against the fake downloader script.
#![cfg(unix)]

mod common;

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::fake_tool::{url, wait_for_exit, wait_until, FakeTool};
use ytq_core::supervisor::{
    platform_signals, FatalKind, ProgressUpdate, Supervisor, TaskEvents, FALLBACK_NOTICE,
    TERMINATE_GRACE,
};
use ytq_core::{Credentials, LaunchSettings, Scheduler, TaskStatus};

/// Event sink for driving a supervisor without a scheduler.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl TaskEvents for Recorder {
    fn progress(&self, update: ProgressUpdate) {
        self.push(format!("progress {}", update.percent));
    }
    fn title(&self, title: String) {
        self.push(format!("title {title}"));
    }
    fn notice(&self, message: String) {
        self.push(format!("notice {message}"));
    }
    fn complete(&self) {
        self.push("complete".into());
    }
    fn error(&self, message: String) {
        self.push(format!("error {message}"));
    }
}

fn supervise(launch: LaunchSettings, url: String) -> (Arc<Supervisor>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let sup = Supervisor::new(url, Arc::new(launch), platform_signals(), recorder.clone());
    (sup, recorder)
}

async fn wait_for_event(recorder: &Recorder, event: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !recorder.events().iter().any(|e| e == event) {
        assert!(
            Instant::now() < deadline,
            "no {event:?} event; saw {:?}",
            recorder.events()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn login_required_line_fails_task_and_stops_process() {
    let tool = FakeTool::new();
    let pidfile = tool.path("login.pid");
    let scheduler = Scheduler::new(tool.launch(), 1).unwrap();
    let started = Instant::now();
    let id = scheduler.enqueue(url("login", &[("pidfile", pidfile.as_path())]));

    let task = wait_until(&scheduler, id, "failed", |t| t.status == TaskStatus::Failed).await;
    assert_eq!(task.error.as_deref(), Some(FatalKind::LoginRequired.message()));
    assert_eq!(scheduler.running_count(), 0);

    wait_for_exit(&pidfile).await;
    assert!(started.elapsed() < TERMINATE_GRACE + Duration::from_secs(2));

    // The duplicate fatal line must not deliver a second error.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(scheduler.get(id).unwrap().error, task.error);
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pause_then_resume_keeps_progress() {
    let tool = FakeTool::new();
    let scheduler = Scheduler::new(tool.launch(), 1).unwrap();
    let id = scheduler.enqueue(url("slow", &[]));
    wait_until(&scheduler, id, "at 10%", |t| t.progress == 10.0).await;

    assert!(scheduler.pause(id));
    let paused = scheduler.get(id).unwrap();
    assert_eq!(paused.status, TaskStatus::Paused);
    assert!(!scheduler.pause(id));
    assert_eq!(scheduler.running_count(), 1);

    assert!(scheduler.resume(id));
    let resumed = scheduler.get(id).unwrap();
    assert_eq!(resumed.status, TaskStatus::Downloading);
    assert_eq!(resumed.progress, 10.0);

    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_while_paused_ends_cancelled() {
    let tool = FakeTool::new();
    let pidfile = tool.path("slow.pid");
    let scheduler = Scheduler::new(tool.launch(), 1).unwrap();
    let id = scheduler.enqueue(url("slow", &[("pidfile", pidfile.as_path())]));
    let next = scheduler.enqueue(url("ok", &[]));
    wait_until(&scheduler, id, "reporting progress", |t| t.progress > 0.0).await;

    assert!(scheduler.pause(id));
    assert!(scheduler.cancel(id));
    assert_eq!(scheduler.get(id).unwrap().status, TaskStatus::Cancelled);

    // The slot is free at once; the next task runs while the old process dies.
    wait_until(&scheduler, next, "completed", |t| t.status == TaskStatus::Completed).await;
    wait_for_exit(&pidfile).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let task = scheduler.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.error.is_none());
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn browser_cookie_failure_falls_back_to_cookie_file() {
    let tool = FakeTool::new();
    let log = tool.path("browser.log");
    let launch = tool.launch().with_credentials(Credentials::Browser {
        browser: "chrome".into(),
        fallback_file: Some(tool.cookie_file()),
    });
    let scheduler = Scheduler::new(launch, 1).unwrap();
    let id = scheduler.enqueue(url("browser", &[("log", log.as_path())]));

    let task = wait_until(&scheduler, id, "completed", |t| t.status == TaskStatus::Completed).await;
    assert_eq!(task.notice.as_deref(), Some(FALLBACK_NOTICE));
    assert!(task.error.is_none());
    assert_eq!(fs::read_to_string(&log).unwrap(), "yes\nno\n");
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fallback_fires_only_once() {
    let tool = FakeTool::new();
    let log = tool.path("always.log");
    let launch = tool.launch().with_credentials(Credentials::Browser {
        browser: "chrome".into(),
        fallback_file: Some(tool.cookie_file()),
    });
    let scheduler = Scheduler::new(launch, 1).unwrap();
    let id = scheduler.enqueue(format!(
        "{}&always=1",
        url("browser", &[("log", log.as_path())])
    ));

    let task = wait_until(&scheduler, id, "failed", |t| t.status == TaskStatus::Failed).await;
    assert_eq!(task.error.as_deref(), Some("process exited with code 1"));
    assert_eq!(task.notice.as_deref(), Some(FALLBACK_NOTICE));
    assert_eq!(fs::read_to_string(&log).unwrap(), "yes\nno\n");
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn browser_failure_without_fallback_file_is_plain_output() {
    let tool = FakeTool::new();
    let log = tool.path("nofallback.log");
    let launch = tool.launch().with_credentials(Credentials::Browser {
        browser: "chrome".into(),
        fallback_file: None,
    });
    let scheduler = Scheduler::new(launch, 1).unwrap();
    let id = scheduler.enqueue(format!(
        "{}&always=1",
        url("browser", &[("log", log.as_path())])
    ));

    let task = wait_until(&scheduler, id, "failed", |t| t.status == TaskStatus::Failed).await;
    assert_eq!(task.error.as_deref(), Some("process exited with code 1"));
    assert!(task.notice.is_none());
    assert_eq!(fs::read_to_string(&log).unwrap(), "yes\n");
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_cookie_file_fails_before_spawn() {
    let tool = FakeTool::new();
    let log = tool.path("never.log");
    let launch = tool
        .launch()
        .with_credentials(Credentials::File(tool.path("gone.txt")));
    let scheduler = Scheduler::new(launch, 1).unwrap();
    let id = scheduler.enqueue(url("ok", &[("log", log.as_path())]));

    let task = wait_until(&scheduler, id, "failed", |t| t.status == TaskStatus::Failed).await;
    let error = task.error.unwrap();
    assert!(error.starts_with("cookie file not found"), "{error}");
    assert!(!log.exists(), "downloader must not have been started");
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cookie_file_mode_passes_file_and_completes() {
    let tool = FakeTool::new();
    let launch = tool
        .launch()
        .with_credentials(Credentials::File(tool.cookie_file()));
    let scheduler = Scheduler::new(launch, 1).unwrap();
    let id = scheduler.enqueue(url("ok", &[]));

    let task = wait_until(&scheduler, id, "completed", |t| t.status == TaskStatus::Completed).await;
    assert_eq!(task.title.as_deref(), Some("Sample Clip"));
    assert_eq!(task.progress, 100.0);
    assert!(task.speed.is_empty());
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn supervisor_pause_and_cancel_report_their_state() {
    let tool = FakeTool::new();
    let (sup, recorder) = supervise(tool.launch(), url("slow", &[]));
    let run = tokio::spawn(Arc::clone(&sup).start());
    wait_for_event(&recorder, "progress 10").await;

    assert!(!sup.is_paused());
    assert!(sup.pause());
    assert!(sup.is_paused());
    assert!(!sup.has_exited());

    sup.cancel().await;
    assert!(sup.is_cancelled());
    assert!(!sup.is_paused());
    assert!(sup.has_exited());
    run.await.unwrap();

    // Neither terminal hook fires after a cancel.
    let events = recorder.events();
    assert!(!events.iter().any(|e| e == "complete" || e.starts_with("error")), "{events:?}");
    assert!(!sup.pause());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn supervisor_marks_fallback_as_used() {
    let tool = FakeTool::new();
    let launch = tool.launch().with_credentials(Credentials::Browser {
        browser: "chrome".into(),
        fallback_file: Some(tool.cookie_file()),
    });
    let (sup, recorder) = supervise(launch, url("browser", &[]));
    assert!(!sup.used_fallback());

    Arc::clone(&sup).start().await;
    assert!(sup.used_fallback());
    assert!(sup.has_exited());
    assert_eq!(
        recorder.events(),
        vec![
            format!("notice {FALLBACK_NOTICE}"),
            "progress 100".to_string(),
            "complete".to_string(),
        ]
    );
}
