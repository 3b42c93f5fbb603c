//! Sandboxed execution of cached user code under a provisioned runtime.
//!
//! The child gets its input records on stdin, logs to a per-execution file
//! shared by stdout and stderr, and reports its structured result on a
//! dedicated pipe installed as descriptor 3. Success is only ever derived
//! from a zero exit code; the channel alone proves nothing.

use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::cache::CodeCache;
use crate::config::RunnerConfig;
use crate::errors::RunnerError;
use crate::provision::RuntimeLocator;
use crate::types::{ChildFailure, ExecutionOutcome, ExecutionRequest, Record};

mod result_channel {
    use std::fs::File;
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

    /// Descriptor number the child finds its result channel on.
    pub const RESULT_FD: RawFd = 3;

    /// Creates the result pipe. Both ends are close-on-exec so concurrent
    /// executions never inherit each other's channel; the child's copy is
    /// re-opened on fd 3 by [`route_into_child`] after the fork.
    pub fn create() -> io::Result<(File, OwnedFd)> {
        let mut fds: [libc::c_int; 2] = [0; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let read = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let write = unsafe { OwnedFd::from_raw_fd(fds[1]) };
        set_cloexec(&read)?;
        set_cloexec(&write)?;
        Ok((File::from(read), write))
    }

    fn set_cloexec(fd: &impl AsRawFd) -> io::Result<()> {
        let raw = fd.as_raw_fd();
        let flags = unsafe { libc::fcntl(raw, libc::F_GETFD) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { libc::fcntl(raw, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Installs `write_fd` as fd 3. Runs between fork and exec, so only
    /// async-signal-safe calls are allowed here.
    pub fn route_into_child(write_fd: RawFd) -> io::Result<()> {
        if write_fd == RESULT_FD {
            // dup2 onto itself would leave close-on-exec set; clear it.
            let flags = unsafe { libc::fcntl(write_fd, libc::F_GETFD) };
            if flags < 0 {
                return Err(io::Error::last_os_error());
            }
            if unsafe { libc::fcntl(write_fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } < 0 {
                return Err(io::Error::last_os_error());
            }
            return Ok(());
        }
        if unsafe { libc::dup2(write_fd, RESULT_FD) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Runs user code in a supervised child process.
pub struct SandboxExecutor {
    config: RunnerConfig,
    locator: RuntimeLocator,
    cache: CodeCache,
}

impl SandboxExecutor {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            locator: RuntimeLocator::new(config.clone()),
            cache: CodeCache::new(config.clone()),
            config,
        }
    }

    /// Replaces the runtime locator, for tests and custom provisioning.
    pub fn with_locator(mut self, locator: RuntimeLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Executes `request` to completion and maps the child's fate into an
    /// [`ExecutionOutcome`].
    ///
    /// Faults in the machinery (spawn failures, unreadable channels,
    /// malformed result payloads) come back as `Err`; a child that ran and
    /// failed comes back as `Ok(ExecutionOutcome::Failure)`.
    pub async fn run_code(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionOutcome, RunnerError> {
        request.validate()?;

        let executable = self.locator.locate(request.runtime).await?;
        let materialized = self
            .cache
            .materialize_code(
                request.runtime,
                &request.caller_namespace,
                &request.source,
                request.code_type,
            )
            .await?;

        // Exclusive create: execution ids are unique per attempt, and a
        // collision must fail loudly rather than interleave two logs.
        let log_path = materialized
            .code_dir
            .join(format!("output-{}.log", request.execution_id));
        let log_file = std::fs::OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&log_path)?;

        let kind = request.runtime;
        let args = kind.launch_args(&materialized.code_dir, &materialized.shim_entry);
        let env = kind.launch_env(
            &materialized.code_dir,
            &kind.packages_dir(self.config.root_dir()),
        );

        let (channel_read, channel_write) = result_channel::create()?;

        log::info!(
            "Executing {} code for {} (execution {})",
            kind,
            request.caller_namespace,
            request.execution_id
        );

        // The command is dropped as soon as the child exists so the
        // parent's log-file descriptors go with it.
        let mut child = {
            use std::os::fd::AsRawFd;

            let mut command = Command::new(&executable);
            command
                .args(&args)
                .current_dir(&materialized.code_dir)
                .env_clear()
                .envs(env)
                .stdin(Stdio::piped())
                .stdout(Stdio::from(log_file.try_clone()?))
                .stderr(Stdio::from(log_file))
                .kill_on_drop(true);

            let write_fd = channel_write.as_raw_fd();
            unsafe {
                command.pre_exec(move || result_channel::route_into_child(write_fd));
            }

            command.spawn()?
        };

        // The parent's copy of the write end must close for the reader to
        // see EOF once the child exits.
        drop(channel_write);

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin was not piped"))?;
        let mut payload = serde_json::to_vec(&request.inputs)?;
        payload.push(b'\n');

        // Input feeding and channel draining run concurrently with the
        // child; a child that emits before consuming stdin cannot wedge us.
        let writer = tokio::spawn(async move {
            match stdin.write_all(&payload).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                    // The child may exit without draining stdin; its exit
                    // status carries the real diagnosis.
                    log::debug!("Child closed stdin early: {}", err);
                    Ok(())
                }
                Err(err) => Err(err),
            }
        });
        let reader = tokio::task::spawn_blocking(move || {
            use std::io::Read;
            let mut channel = channel_read;
            let mut bytes = Vec::new();
            channel.read_to_end(&mut bytes).map(|_| bytes)
        });

        let status = match self.config.timeout() {
            None => child.wait().await?,
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    log::warn!(
                        "Execution {} exceeded {:?}, killing child",
                        request.execution_id,
                        limit
                    );
                    child.start_kill()?;
                    let status = child.wait().await?;
                    writer.abort();
                    let _ = reader.await;
                    let log = read_log(&log_path).await?;
                    return Ok(ExecutionOutcome::Failure(ChildFailure {
                        exit_code: status.code().unwrap_or(-1),
                        signal: signal_of(&status),
                        log,
                        timed_out: true,
                    }));
                }
            },
        };

        let channel_bytes = reader.await.map_err(io::Error::other)??;
        writer.await.map_err(io::Error::other)??;

        if status.success() {
            let records = parse_channel(&channel_bytes)?;
            log::info!(
                "Execution {} succeeded with {} record(s)",
                request.execution_id,
                records.len()
            );
            Ok(ExecutionOutcome::Success { records })
        } else {
            let log = read_log(&log_path).await?;
            let failure = ChildFailure {
                exit_code: status.code().unwrap_or(-1),
                signal: signal_of(&status),
                log,
                timed_out: false,
            };
            log::warn!("Execution {}: {}", request.execution_id, failure);
            Ok(ExecutionOutcome::Failure(failure))
        }
    }
}

fn signal_of(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

/// Interprets the drained result channel after a clean exit. An empty
/// channel is a success with no records; anything else must be a JSON
/// record array.
fn parse_channel(bytes: &[u8]) -> Result<Vec<Record>, RunnerError> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(RunnerError::MalformedResult)
}

async fn read_log(path: &Path) -> Result<String, RunnerError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
