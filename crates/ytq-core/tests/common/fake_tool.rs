//! Stand-in downloader for integration tests: a shell script whose behaviour is
//! picked by the URL (`https://media.test/<kind>?k=v&...`).
//!
//! Kinds:
//! - `ok`: destination line, progress 42 then 100, exit 0.
//! - `gate`: progress 5, then waits until the `file` param exists, exit 0.
//! - `slow`: progress 10, then sleeps 30s.
//! - `login`: two "Sign in to confirm" errors, then sleeps.
//! - `browser`: fails to decrypt browser cookies when started with
//!   `--cookies-from-browser` (or always with `always=1`, exiting 1); otherwise succeeds.
//! - `flaky`: exit 2 until the `marker` file exists (created on first run).
//! - `fail`: exit 3.
//!
//! Every run appends `yes`/`no` (browser cookies requested) to the `log`
//! param file and writes its pid to the `pidfile` param file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use ytq_core::config::NETSCAPE_COOKIE_HEADER;
use ytq_core::{Executable, LaunchSettings, Scheduler, Task, TaskId};

const SCRIPT: &str = r#"#!/bin/sh
url=""
browser=no
for a in "$@"; do
  [ "$a" = "--cookies-from-browser" ] && browser=yes
  url="$a"
done
param() { printf '%s\n' "$url" | sed -n "s/.*[?&]$1=\([^&]*\).*/\1/p"; }

log=$(param log)
[ -n "$log" ] && echo "$browser" >> "$log"
pidfile=$(param pidfile)
[ -n "$pidfile" ] && echo $$ > "$pidfile"

case "$url" in
  https://media.test/ok*)
    echo "[download] Destination: /tmp/out/Sample Clip.f137.mp4"
    echo "download: 42.0% 1.00MiB/s 00:05"
    echo "download:100.0% 1.00MiB/s 00:00"
    exit 0 ;;
  https://media.test/gate*)
    echo "download: 5.0% 1.00MiB/s 00:30"
    gate=$(param file)
    while [ ! -e "$gate" ]; do sleep 0.05; done
    exit 0 ;;
  https://media.test/slow*)
    echo "download: 10.0% 1.00MiB/s 01:00"
    exec sleep 30 ;;
  https://media.test/login*)
    echo "ERROR: [youtube] abc: Sign in to confirm you're not a bot" >&2
    echo "ERROR: [youtube] abc: Sign in to confirm you're not a bot" >&2
    exec sleep 30 ;;
  https://media.test/browser*)
    always=$(param always)
    if [ "$browser" = yes ] || [ "$always" = 1 ]; then
      echo "ERROR: Failed to decrypt cookies from browser chrome (keyring unavailable)" >&2
      [ "$always" = 1 ] && exit 1
      exec sleep 30
    fi
    echo "download:100.0% 1.00MiB/s 00:00"
    exit 0 ;;
  https://media.test/flaky*)
    marker=$(param marker)
    if [ ! -e "$marker" ]; then
      : > "$marker"
      echo "ERROR: transient network failure" >&2
      exit 2
    fi
    echo "download:100.0% 1.00MiB/s 00:00"
    exit 0 ;;
  https://media.test/fail*)
    echo "ERROR: something went wrong" >&2
    exit 3 ;;
esac
echo "ERROR: unknown test url $url" >&2
exit 9
"#;

pub struct FakeTool {
    dir: TempDir,
    script: PathBuf,
}

impl FakeTool {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-yt-dlp.sh");
        fs::write(&script, SCRIPT).unwrap();
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::write(
            dir.path().join("cookies.txt"),
            format!("{NETSCAPE_COOKIE_HEADER}\n.media.test\tTRUE\t/\tFALSE\t0\tSID\tabc\n"),
        )
        .unwrap();
        Self { dir, script }
    }

    /// A path inside the tool's temp dir (not created).
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn cookie_file(&self) -> PathBuf {
        self.path("cookies.txt")
    }

    pub fn executable(&self) -> Executable {
        Executable::new("/bin/sh").with_prefix_args([self.script.as_os_str()])
    }

    pub fn launch(&self) -> LaunchSettings {
        LaunchSettings::new(self.executable(), self.path("out"))
    }
}

/// `https://media.test/<kind>?k=v&...`
pub fn url(kind: &str, params: &[(&str, &Path)]) -> String {
    let mut url = format!("https://media.test/{kind}");
    for (i, (key, value)) in params.iter().enumerate() {
        let sep = if i == 0 { '?' } else { '&' };
        url.push_str(&format!("{sep}{key}={}", value.display()));
    }
    url
}

/// Poll until `pred` holds for the task (10s timeout).
pub async fn wait_until<F>(scheduler: &Scheduler, id: TaskId, what: &str, pred: F) -> Task
where
    F: Fn(&Task) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let task = scheduler.get(id).expect("task exists");
        if pred(&task) {
            return task;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for task {id} to be {what}; last snapshot: {task:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Wait until a process written to `pidfile` has exited and been reaped.
pub async fn wait_for_exit(pidfile: &Path) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let pid: libc::pid_t = loop {
        if let Ok(text) = fs::read_to_string(pidfile) {
            if let Ok(pid) = text.trim().parse() {
                break pid;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "no pid written");
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    loop {
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        if !alive {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "process {pid} still running"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
