//! Elevation workers.
//!
//! A worker receives one `WorkerCommand`, builds its share on a private grid
//! and replies `Status` then `Result`. Two backends exist:
//! - **InProcess**: a blocking task on the coordinator's tokio runtime.
//! - **Subprocess**: a spawned `fault_worker` executable speaking JSON lines.

use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::error::{Result, TerrainError};
use crate::fault::FaultGenerator;
use crate::protocol::{WorkerCommand, WorkerReply};
use crate::seeds::GenerationSeeds;

/// Where remote shares run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum WorkerBackend {
    #[default]
    InProcess,
    Subprocess { program: PathBuf, args: Vec<String> },
}

impl WorkerBackend {
    pub fn subprocess(program: impl Into<PathBuf>) -> Self {
        Self::Subprocess {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

/// Notification from worker `worker` to the coordinator.
#[derive(Debug)]
pub(crate) struct WorkerEvent {
    pub worker: usize,
    pub kind: WorkerEventKind,
}

#[derive(Debug)]
pub(crate) enum WorkerEventKind {
    Reply(WorkerReply),
    /// The worker failed before delivering a result.
    Lost(String),
}

/// Execute `command`, handing each reply to `emit` as it is produced.
pub fn handle_command<F: FnMut(WorkerReply)>(command: &WorkerCommand, mut emit: F) -> Result<()> {
    match command {
        WorkerCommand::BuildElevationMap { iterations, width, height, seed, fault } => {
            let mut generator = FaultGenerator::new(*width, *height, *fault)?;
            emit(WorkerReply::Status);

            let seed = seed.unwrap_or_else(|| GenerationSeeds::default().elevation);
            let mut rng = crate::seeds::rng_for(seed);
            let grid = generator.regenerate(*iterations, &mut rng);
            emit(WorkerReply::Result { data: grid.to_rows() });
            Ok(())
        }
    }
}

#[derive(Default)]
struct ProcessSlot {
    child: Option<Child>,
    cancelled: bool,
}

/// Shared ownership of a worker's child process.
///
/// The reader thread and the coordinator each hold a clone. Whichever side
/// takes the child reaps it, and dropping a clone that still holds a running
/// child kills it, so no worker process outlives the build.
#[derive(Clone, Default)]
pub(crate) struct WorkerHandle {
    slot: Arc<Mutex<ProcessSlot>>,
}

impl WorkerHandle {
    fn lock(&self) -> MutexGuard<'_, ProcessSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand the spawned child over; killed at once if already cancelled.
    fn attach(&self, mut child: Child) {
        let mut slot = self.lock();
        if slot.cancelled {
            let _ = child.kill();
            let _ = child.wait();
        } else {
            slot.child = Some(child);
        }
    }

    /// Wait for a child that has finished its work.
    fn reap(&self) -> Option<io::Result<ExitStatus>> {
        let child = self.lock().child.take();
        child.map(|mut child| child.wait())
    }

    /// Kill and reap the child, now or as soon as it is attached.
    pub(crate) fn kill(&self) {
        let child = {
            let mut slot = self.lock();
            slot.cancelled = true;
            slot.child.take()
        };
        if let Some(mut child) = child {
            debug!(pid = child.id(), "killing worker process");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let child = self.lock().child.take();
        if let Some(mut child) = child {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Start worker `worker` on a blocking task of the current runtime.
///
/// Must be called from inside a tokio runtime. The returned handle kills a
/// subprocess worker when the coordinator gives up on it.
pub(crate) fn spawn_worker(
    backend: &WorkerBackend,
    worker: usize,
    command: WorkerCommand,
    events: UnboundedSender<WorkerEvent>,
) -> WorkerHandle {
    let backend = backend.clone();
    let handle = WorkerHandle::default();
    let process = handle.clone();
    tokio::task::spawn_blocking(move || {
        // The receiver is gone once the coordinator has given up on us.
        let send = |kind: WorkerEventKind| {
            let _ = events.send(WorkerEvent { worker, kind });
        };

        let outcome = match &backend {
            WorkerBackend::InProcess => {
                handle_command(&command, |reply| send(WorkerEventKind::Reply(reply)))
            }
            WorkerBackend::Subprocess { program, args } => {
                run_subprocess(program, args, &command, &process, |reply| {
                    send(WorkerEventKind::Reply(reply))
                })
            }
        };

        if let Err(err) = outcome {
            debug!(worker, error = %err, "worker failed");
            send(WorkerEventKind::Lost(err.to_string()));
        }
    });
    handle
}

fn broken_pipe(what: &str) -> TerrainError {
    TerrainError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("worker {} unavailable", what),
    ))
}

/// Run one command in a child process and forward its replies.
///
/// The child is owned by `process` from spawn onwards, so an early return
/// here leaves it to be killed when the last handle drops.
fn run_subprocess<F: FnMut(WorkerReply)>(
    program: &Path,
    args: &[String],
    command: &WorkerCommand,
    process: &WorkerHandle,
    mut emit: F,
) -> Result<()> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()?;
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    process.attach(child);

    {
        let mut stdin = stdin.ok_or_else(|| broken_pipe("stdin"))?;
        writeln!(stdin, "{}", command.to_json()?)?;
    }

    let stdout = stdout.ok_or_else(|| broken_pipe("stdout"))?;
    let mut delivered = false;
    for line in BufReader::new(stdout).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = WorkerReply::from_json(&line)?;
        let is_result = matches!(reply, WorkerReply::Result { .. });
        emit(reply);
        if is_result {
            delivered = true;
            break;
        }
    }

    let status = match process.reap() {
        Some(status) => status?.to_string(),
        None => "killed".to_string(),
    };
    if !delivered {
        return Err(TerrainError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("worker process exited ({}) without a result", status),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultParams;
    use crate::grid::{Grid, ELEVATION_RANGE};

    fn command(iterations: usize) -> WorkerCommand {
        WorkerCommand::BuildElevationMap {
            iterations,
            width: 24,
            height: 16,
            seed: Some(42),
            fault: FaultParams::default(),
        }
    }

    #[test]
    fn test_status_precedes_result() {
        let mut replies = Vec::new();
        handle_command(&command(30), |reply| replies.push(reply)).unwrap();

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], WorkerReply::Status);
        let WorkerReply::Result { data } = &replies[1] else {
            panic!("expected a result, got {:?}", replies[1]);
        };
        let grid = Grid::from_rows(data.clone()).unwrap();
        assert_eq!((grid.width, grid.height), (24, 16));
        assert!(grid.in_range(ELEVATION_RANGE));
    }

    #[test]
    fn test_seeded_command_is_repeatable() {
        let mut first = Vec::new();
        let mut second = Vec::new();
        handle_command(&command(10), |reply| first.push(reply)).unwrap();
        handle_command(&command(10), |reply| second.push(reply)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_degenerate_command_fails_before_status() {
        let bad = WorkerCommand::BuildElevationMap {
            iterations: 5,
            width: 1,
            height: 1,
            seed: None,
            fault: FaultParams::default(),
        };
        let mut replies = Vec::new();
        assert!(handle_command(&bad, |reply| replies.push(reply)).is_err());
        assert!(replies.is_empty());
    }

    #[test]
    fn test_missing_program_reports_error() {
        let result = run_subprocess(
            Path::new("/nonexistent/fault_worker"),
            &[],
            &command(1),
            &WorkerHandle::default(),
            |_| {},
        );
        assert!(matches!(result, Err(TerrainError::Io(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_malformed_reply_kills_worker_process() {
        let process = WorkerHandle::default();
        let args = vec!["-c".to_string(), "echo garbage; exec sleep 32.5".to_string()];
        let result = run_subprocess(Path::new("sh"), &args, &command(1), &process, |_| {});
        assert!(matches!(result, Err(TerrainError::Json(_))));

        let pid = process.lock().child.as_ref().map(Child::id).unwrap();
        drop(process);
        assert!(!Path::new(&format!("/proc/{}", pid)).exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_cancelled_handle_kills_late_child() {
        let process = WorkerHandle::default();
        process.kill();

        let child = Command::new("sleep").arg("33.5").spawn().unwrap();
        let pid = child.id();
        process.attach(child);

        assert!(process.lock().child.is_none());
        assert!(!Path::new(&format!("/proc/{}", pid)).exists());
    }
}
