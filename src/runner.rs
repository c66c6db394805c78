//! Sandboxed script execution.
//!
//! Scoped deliberately smaller than the teacher's OS-specific Seatbelt/
//! Landlock runner: this module enforces exactly what the policy model asks
//! for (env allowlisting, a deadline, workdir isolation, best-effort network
//! denial with honest reporting) behind a [`Sandbox`] capability trait, so a
//! stronger backend can be swapped in later without touching the
//! pre-execution policy checks below.

use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::descriptor::SkillDescriptor;
use crate::errors::SkillError;
use crate::policy::{ExecutionPolicy, WorkdirMode};
use crate::resolver;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Cap applied independently to stdout and stderr capture, regardless of the
/// session's resource budget (script output is never charged to it).
const STREAM_CAP_BYTES: usize = 1024 * 1024;
/// Grace period between SIGTERM and SIGKILL on deadline expiry.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Result of one `run_script` call. `exit_code == -1` signals a timeout.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub meta: Map<String, Value>,
}

/// Raw output of a sandbox spawn, before it is wrapped into an
/// [`ExecutionResult`].
pub struct SpawnOutcome {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

/// Capability boundary for running a prepared command to completion under a
/// deadline. Concrete backends (the local-process default, or a stronger
/// future namespace/seccomp jail) implement this without the caller needing
/// to know which one is in effect.
pub trait Sandbox: Send + Sync {
    fn spawn(
        &self,
        command: Command,
        deadline: Duration,
        stdin: Option<Vec<u8>>,
    ) -> Result<SpawnOutcome, SkillError>;
}

/// Default backend: a plain child process, deadline-enforced by polling
/// `try_wait` on a dedicated thread, stdout/stderr captured on dedicated
/// threads into bounded buffers.
#[derive(Debug, Default)]
pub struct LocalProcessSandbox;

impl Sandbox for LocalProcessSandbox {
    fn spawn(
        &self,
        mut command: Command,
        deadline: Duration,
        stdin: Option<Vec<u8>>,
    ) -> Result<SpawnOutcome, SkillError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| SkillError::Internal(format!("failed to spawn script: {e}")))?;

        if let Some(bytes) = stdin {
            if let Some(mut child_stdin) = child.stdin.take() {
                let _ = child_stdin.write_all(&bytes);
            }
        } else {
            drop(child.stdin.take());
        }

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let stdout_handle = thread::spawn(move || read_capped_stream(stdout));
        let stderr_handle = thread::spawn(move || read_capped_stream(stderr));

        let (exit_code, timed_out) = wait_with_deadline(&mut child, deadline)?;

        let (stdout_bytes, stdout_truncated) =
            join_with_timeout(stdout_handle, Duration::from_secs(5)).unwrap_or_default();
        let (stderr_bytes, stderr_truncated) =
            join_with_timeout(stderr_handle, Duration::from_secs(5)).unwrap_or_default();

        Ok(SpawnOutcome {
            exit_code,
            stdout: stdout_bytes,
            stderr: stderr_bytes,
            timed_out,
            stdout_truncated,
            stderr_truncated,
        })
    }
}

fn wait_with_deadline(child: &mut Child, deadline: Duration) -> Result<(i32, bool), SkillError> {
    let start = Instant::now();
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| SkillError::Internal(format!("waitpid failed: {e}")))?
        {
            return Ok((status.code().unwrap_or(-1), false));
        }
        if start.elapsed() >= deadline {
            terminate_then_kill(child);
            return Ok((-1, true));
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[cfg(unix)]
fn terminate_then_kill(child: &mut Child) {
    let pid = child.id() as libc::pid_t;
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    let deadline = Instant::now() + KILL_GRACE;
    while Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        thread::sleep(Duration::from_millis(25));
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
fn terminate_then_kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn read_capped_stream<R: Read>(mut stream: R) -> (Vec<u8>, bool) {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let mut truncated = false;
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() + n > STREAM_CAP_BYTES {
                    let remaining = STREAM_CAP_BYTES.saturating_sub(buf.len());
                    buf.extend_from_slice(&chunk[..remaining]);
                    truncated = true;
                    // Keep draining so the child doesn't block on a full pipe.
                    let mut sink = [0u8; 4096];
                    while stream.read(&mut sink).unwrap_or(0) > 0 {}
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(_) => break,
        }
    }
    (buf, truncated)
}

fn join_with_timeout<T: Send + 'static>(
    handle: thread::JoinHandle<T>,
    timeout: Duration,
) -> Option<T> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = handle.join();
        let _ = tx.send(result);
    });
    match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => Some(value),
        _ => None,
    }
}

/// Runs `rel_path` inside `descriptor`'s skill directory, enforcing
/// `policy`'s pre-execution checks in the order specified: `enabled`, skill
/// allow-list, script glob allow-list, then path resolution.
#[allow(clippy::too_many_arguments)]
pub fn run_script(
    sandbox: &dyn Sandbox,
    policy: &ExecutionPolicy,
    descriptor: &SkillDescriptor,
    rel_path: &str,
    args: &[String],
    stdin: Option<Vec<u8>>,
    timeout_s: Option<u64>,
    audit: &dyn AuditSink,
) -> Result<ExecutionResult, SkillError> {
    if !policy.enabled {
        audit.append(
            AuditEvent::new(AuditKind::PolicyViolation)
                .skill(&descriptor.name)
                .path(rel_path)
                .detail("reason", "script_execution_disabled"),
        );
        return Err(SkillError::ScriptExecutionDisabled);
    }

    if !policy.allow_skills.contains(&descriptor.name) {
        audit.append(
            AuditEvent::new(AuditKind::PolicyViolation)
                .skill(&descriptor.name)
                .path(rel_path)
                .detail("reason", "skill_not_allowlisted"),
        );
        return Err(SkillError::PolicyViolation(format!(
            "skill {} is not in allow_skills",
            descriptor.name
        )));
    }

    if !policy.allows(&descriptor.name, rel_path) {
        audit.append(
            AuditEvent::new(AuditKind::PolicyViolation)
                .skill(&descriptor.name)
                .path(rel_path)
                .detail("reason", "script_not_allowlisted"),
        );
        return Err(SkillError::PolicyViolation(format!(
            "{rel_path} does not match any allow_scripts_glob pattern"
        )));
    }

    let resolved = resolver::resolve(&descriptor.path, rel_path)?;
    let resolved_meta = std::fs::metadata(&resolved)?;
    if !resolved_meta.is_file() {
        return Err(SkillError::PolicyViolation(format!(
            "{rel_path} is not a regular file"
        )));
    }

    let (program, program_args) = dispatch_for_extension(&resolved, args, &policy.python_interpreter);

    let (cwd, _staging_dir) = prepare_workdir(descriptor, policy.workdir_mode)?;

    let mut command = Command::new(program);
    command.args(program_args).current_dir(&cwd);
    configure_environment(&mut command, policy, descriptor);

    let deadline = Duration::from_secs(
        timeout_s
            .map(|t| t.min(policy.timeout_s_default))
            .unwrap_or(policy.timeout_s_default),
    );

    let start = Instant::now();
    let network_enforced = attempt_network_denial(&mut command, policy.network_access);
    let outcome = sandbox.spawn(command, deadline, stdin)?;
    let duration_ms = start.elapsed().as_millis() as u64;

    let mut meta = Map::new();
    meta.insert("sandbox_backend".to_string(), Value::String("local_subprocess".to_string()));
    meta.insert("network_enforced".to_string(), Value::Bool(network_enforced));
    meta.insert("timeout".to_string(), Value::Bool(outcome.timed_out));
    meta.insert("stdout_truncated".to_string(), Value::Bool(outcome.stdout_truncated));
    meta.insert("stderr_truncated".to_string(), Value::Bool(outcome.stderr_truncated));
    meta.insert("workdir_mode".to_string(), Value::String(match policy.workdir_mode {
        WorkdirMode::SkillRoot => "skill_root".to_string(),
        WorkdirMode::Tempdir => "tempdir".to_string(),
    }));

    audit.append(
        AuditEvent::new(AuditKind::Execute)
            .skill(&descriptor.name)
            .path(rel_path)
            .detail("exit_code", outcome.exit_code)
            .detail("timeout", outcome.timed_out)
            .detail("duration_ms", duration_ms),
    );

    Ok(ExecutionResult {
        exit_code: outcome.exit_code,
        stdout: String::from_utf8_lossy(&outcome.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&outcome.stderr).into_owned(),
        duration_ms,
        meta,
    })
}

/// Dispatches by file extension: `.py` through `python_interpreter`, `.sh`
/// through `/bin/sh`, anything else execed directly (the host must already
/// mark it executable).
fn dispatch_for_extension(
    script_path: &Path,
    args: &[String],
    python_interpreter: &str,
) -> (String, Vec<String>) {
    let ext = script_path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let path_str = script_path.to_string_lossy().into_owned();
    match ext.as_str() {
        "py" => {
            let mut full_args = vec![path_str];
            full_args.extend(args.iter().cloned());
            (python_interpreter.to_string(), full_args)
        }
        "sh" => {
            let mut full_args = vec![path_str];
            full_args.extend(args.iter().cloned());
            ("/bin/sh".to_string(), full_args)
        }
        _ => (path_str, args.to_vec()),
    }
}

fn configure_environment(command: &mut Command, policy: &ExecutionPolicy, descriptor: &SkillDescriptor) {
    command.env_clear();
    let parent_env: HashMap<String, String> = std::env::vars().collect();
    for name in &policy.env_allowlist {
        if let Some(value) = parent_env.get(name) {
            command.env(name, value);
        }
    }
    command.env("SKILL_ROOT", descriptor.path.to_string_lossy().into_owned());
    command.env("SKILL_NAME", &descriptor.name);
}

/// Best-effort network denial. Returns whether isolation was actually
/// achieved — callers must report this honestly rather than assume success.
fn attempt_network_denial(command: &mut Command, network_access: bool) -> bool {
    if network_access {
        return true; // network allowed, nothing to enforce
    }
    #[cfg(target_os = "linux")]
    {
        if which_unshare().is_some() {
            wrap_with_unshare(command);
            return true;
        }
    }
    let _ = command;
    false
}

#[cfg(target_os = "linux")]
fn which_unshare() -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|p| p.join("unshare"))
            .find(|p| p.is_file())
    })
}

#[cfg(target_os = "linux")]
fn wrap_with_unshare(command: &mut Command) {
    // Rebuild the command as `unshare --net -- <original program> <args>`
    // while preserving cwd and env already configured on `command`.
    let program = command.get_program().to_owned();
    let args: Vec<std::ffi::OsString> = command.get_args().map(|a| a.to_owned()).collect();
    *command = Command::new("unshare");
    command.arg("--net").arg("--").arg(program).args(args);
}

/// Prepares the child's working directory per `workdir_mode`. For
/// `tempdir`, stages `references/`, `assets/`, and `scripts/` into a fresh
/// temp directory via symlinks (falling back to copies if symlinks are
/// unavailable), returning the guard so it's removed when the caller is done.
fn prepare_workdir(
    descriptor: &SkillDescriptor,
    mode: WorkdirMode,
) -> Result<(PathBuf, Option<tempfile::TempDir>), SkillError> {
    match mode {
        WorkdirMode::SkillRoot => Ok((descriptor.path.clone(), None)),
        WorkdirMode::Tempdir => {
            let staging = tempfile::tempdir()
                .map_err(|e| SkillError::Internal(format!("failed to create tempdir: {e}")))?;
            for subdir in ["references", "assets", "scripts"] {
                let src = descriptor.path.join(subdir);
                if !src.exists() {
                    continue;
                }
                let dst = staging.path().join(subdir);
                stage_entry(&src, &dst)?;
            }
            let path = staging.path().to_path_buf();
            Ok((path, Some(staging)))
        }
    }
}

#[cfg(unix)]
fn stage_entry(src: &Path, dst: &Path) -> Result<(), SkillError> {
    std::os::unix::fs::symlink(src, dst)
        .or_else(|_| copy_dir_recursive(src, dst))
        .map_err(|e| SkillError::Internal(format!("failed to stage {}: {e}", src.display())))
}

#[cfg(not(unix))]
fn stage_entry(src: &Path, dst: &Path) -> Result<(), SkillError> {
    copy_dir_recursive(src, dst)
        .map_err(|e| SkillError::Internal(format!("failed to stage {}: {e}", src.display())))
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if ty.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}
