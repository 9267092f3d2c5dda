//! The process supervisor (spec §4: binary resolution, output directory
//! management, launch, graceful teardown).
//!
//! Binary discovery and the output-directory lifecycle are grounded in
//! `chrome-cli`'s `launcher.rs`/`discovery.rs` (environment override ->
//! candidate path list -> `PATH` search, and a fresh temp directory per
//! launch); the subprocess plumbing itself — `pre_exec`, piped stdio capture
//! — follows the teacher's `async_process.rs`.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::process::{Child, Command};

use crate::error::SessionInitError;
use crate::flags::LaunchOptions;
use crate::pipe::{self, ChildPipeFds};

/// Candidate executable names/paths searched when no explicit executable is
/// configured, in order (spec §4.6 "Binary resolution").
#[cfg(target_os = "linux")]
const CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

#[cfg(target_os = "macos")]
const CANDIDATES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const CANDIDATES: &[&str] = &[];

/// Environment variable an operator can set to skip discovery entirely.
pub const EXECUTABLE_ENV_VAR: &str = "CHROME_PATH";

/// Environment variable overriding where per-session output directories are
/// rooted (spec §4.6).
pub const OUTPUT_ROOT_ENV_VAR: &str = "CDP_OUTPUT_ROOT";

/// Resolve the browser executable: explicit option, then `CHROME_PATH`, then
/// a `PATH` search over [`CANDIDATES`], in that order.
pub fn resolve_executable(explicit: Option<&Path>) -> Result<PathBuf, SessionInitError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(EXECUTABLE_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }
    if CANDIDATES.is_empty() {
        return Err(SessionInitError::UnsupportedPlatform);
    }
    for candidate in CANDIDATES {
        if let Ok(found) = which::which(candidate) {
            return Ok(found);
        }
        let as_path = Path::new(candidate);
        if as_path.is_absolute() && as_path.is_file() {
            return Ok(as_path.to_path_buf());
        }
    }
    Err(SessionInitError::ExecutableNotFound)
}

/// Create `<root>/cv_<unix_millis>_<rand>` and return its path. `root`
/// defaults to `CDP_OUTPUT_ROOT` or the OS temp directory (spec §4.6).
pub fn prepare_output_dir(root: Option<&Path>) -> Result<PathBuf, SessionInitError> {
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => match std::env::var(OUTPUT_ROOT_ENV_VAR) {
            Ok(path) => PathBuf::from(path),
            Err(_) => std::env::temp_dir(),
        },
    };
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix: u32 = rand::thread_rng().gen();
    let dir = root.join(format!("cv_{millis}_{suffix:08x}"));
    std::fs::create_dir_all(&dir).map_err(|source| SessionInitError::OutputDir {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

/// A spawned browser process plus the parent-side transport halves wired to
/// its fd 3/4.
pub struct Launched {
    pub child: Child,
    pub output_dir: PathBuf,
    pub reader: pipe::PipeReader,
    pub writer: pipe::PipeWriter,
}

/// Resolve the executable, build argv from `opts.flags` plus the user data
/// dir, wire up the pipe transport, and spawn.
pub async fn launch(opts: &LaunchOptions) -> Result<Launched, SessionInitError> {
    let executable = resolve_executable(opts.executable.as_deref())?;
    let output_dir = prepare_output_dir(opts.output_root.as_deref())?;

    let user_data_dir = opts
        .user_data_dir
        .clone()
        .unwrap_or_else(|| output_dir.join("profile"));
    std::fs::create_dir_all(&user_data_dir).map_err(|source| SessionInitError::OutputDir {
        path: user_data_dir.clone(),
        source,
    })?;

    let mut flags = opts.flags.clone();
    flags.set_value("user-data-dir", user_data_dir.display().to_string());
    let mut args = flags.to_args();
    args.push("about:blank".to_string());

    let halves = pipe::create().map_err(SessionInitError::PipeSetup)?;
    let pipe::PipeHalves {
        reader,
        writer,
        child: child_fds,
    } = halves;

    let stdout_path = output_dir.join("chrome_stdout.log");
    let stderr_path = output_dir.join("chrome_stderr.log");
    let stdout_file = std::fs::File::create(&stdout_path).map_err(|source| {
        SessionInitError::OutputDir {
            path: stdout_path.clone(),
            source,
        }
    })?;
    let stderr_file = std::fs::File::create(&stderr_path).map_err(|source| {
        SessionInitError::OutputDir {
            path: stderr_path.clone(),
            source,
        }
    })?;

    let mut command = Command::new(&executable);
    command
        .args(&args)
        .envs(&opts.env)
        .stdout(std::process::Stdio::from(stdout_file))
        .stderr(std::process::Stdio::from(stderr_file))
        .stdin(std::process::Stdio::null())
        .kill_on_drop(false);

    unsafe {
        apply_child_fds(&mut command, &child_fds);
    }

    let child = command.spawn().map_err(SessionInitError::Spawn)?;
    pipe::close_child_side(&child_fds);

    Ok(Launched {
        child,
        output_dir,
        reader,
        writer,
    })
}

/// # Safety
/// Must only be called before `spawn`: installs a `pre_exec` hook that runs
/// in the forked child and only touches async-signal-safe libc calls.
unsafe fn apply_child_fds(command: &mut Command, fds: &ChildPipeFds) {
    use tokio::process::unix::CommandExt;
    let fds = ChildPipeFds {
        read_fd: fds.read_fd,
        write_fd: fds.write_fd,
    };
    command.pre_exec(move || fds.dup_onto_standard_fds());
}

/// Teardown strategy once `Browser.close` has been sent: wait out the grace
/// period for the process to exit on its own, then escalate to
/// [`terminate_forcefully`] (spec §4.1 Teardown, §7 Cancel/Close
/// idempotence).
pub async fn terminate_with_grace_period(
    child: &mut Child,
    grace_period: std::time::Duration,
) -> std::io::Result<()> {
    match tokio::time::timeout(grace_period, child.wait()).await {
        Ok(Ok(_status)) => return Ok(()),
        Ok(Err(e)) => return Err(e),
        Err(_elapsed) => {}
    }
    terminate_forcefully(child, grace_period).await
}

/// The forceful half of teardown on its own, with no preceding wait for a
/// natural exit: `SIGTERM`, a second short grace period, then `SIGKILL`
/// (spec §4.1 "`Cancel` sends a terminate signal, then... a kill signal").
/// Used both as the escalation tail of [`terminate_with_grace_period`] and,
/// directly, by a bare `Cancel()` that never sent `Browser.close` at all.
pub async fn terminate_forcefully(
    child: &mut Child,
    grace_period: std::time::Duration,
) -> std::io::Result<()> {
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    match tokio::time::timeout(grace_period, child.wait()).await {
        Ok(result) => return result.map(|_| ()),
        Err(_elapsed) => {}
    }

    child.kill().await?;
    child.wait().await.map(|_| ())
}
