//! Multi-process substrate: workers are spawned copies of the current
//! binary.
//!
//! Per worker, four streams: stdin carries the command stream (graph,
//! assignment, barrier release), stdout carries reports, and one extra
//! inherited pipe pair carries the bound broadcast down and the barrier
//! entry up. The extra pipe fds are passed through [`IPC_FDS_ENV`]; worker
//! stderr is inherited so diagnostics pass through untouched.
//!
//! The coordinator's listener multiplexes the report pipes with `poll(2)`.
//! Readiness polling cannot see bytes already sitting in a `BufReader`, so
//! buffered readers are drained before polling.

use std::fs::File;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use chromabound_core::{Graph, SearchNode};

use crate::framing::{FrameError, FrameReader, FrameWriter};
use crate::group::{BoundFeed, CoordinatorFeed, CoordinatorLink, Rank, TransportError, WorkerLink};
use crate::messages::{Frame, Report, Tag};

/// Hidden CLI flag that re-enters the binary as a worker process.
pub const WORKER_FLAG: &str = "--worker-rank";

/// Environment variable carrying the worker's extra pipe fds as
/// `<bound_read_fd>,<barrier_write_fd>`.
pub const IPC_FDS_ENV: &str = "CHROMABOUND_IPC_FDS";

fn raw_pipe() -> std::io::Result<(RawFd, RawFd)> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok((fds[0], fds[1]))
}

/// Marks a parent-side fd close-on-exec so later children do not inherit it.
fn set_cloexec(fd: RawFd) -> std::io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Pipe whose read end stays inheritable for the child; the parent keeps
/// the write end.
fn pipe_child_reads() -> std::io::Result<(RawFd, File)> {
    let (read_fd, write_fd) = raw_pipe()?;
    set_cloexec(write_fd)?;
    Ok((read_fd, unsafe { File::from_raw_fd(write_fd) }))
}

/// Pipe whose write end stays inheritable for the child; the parent keeps
/// the read end.
fn pipe_child_writes() -> std::io::Result<(RawFd, File)> {
    let (read_fd, write_fd) = raw_pipe()?;
    set_cloexec(read_fd)?;
    Ok((write_fd, unsafe { File::from_raw_fd(read_fd) }))
}

pub(crate) fn parse_fd_spec(spec: &str) -> Result<(RawFd, RawFd), TransportError> {
    let mut parts = spec.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(second), None) => {
            let bound = first.trim().parse::<RawFd>();
            let barrier = second.trim().parse::<RawFd>();
            match (bound, barrier) {
                (Ok(bound), Ok(barrier)) if bound >= 0 && barrier >= 0 => Ok((bound, barrier)),
                _ => Err(TransportError::WorkerEnv(format!(
                    "{IPC_FDS_ENV}={spec:?} is not a pair of fds"
                ))),
            }
        }
        _ => Err(TransportError::WorkerEnv(format!(
            "{IPC_FDS_ENV}={spec:?} is not a pair of fds"
        ))),
    }
}

/// The coordinator's two transport halves over pipes.
pub struct ProcessCoordinator {
    /// Main-thread half.
    pub link: PipeCoordinatorLink,
    /// Listener-thread half.
    pub feed: PipeCoordinatorFeed,
}

/// Ownership of the spawned worker processes, separate from the transport
/// halves so the runtime can still reap (or kill) children after the engine
/// has consumed the halves.
pub struct ProcessChildren {
    children: Vec<Child>,
}

impl ProcessChildren {
    /// Waits for every worker to exit cleanly.
    ///
    /// The first unsuccessful exit aborts the wait; the remaining children
    /// are killed on drop.
    pub fn wait_all(mut self) -> Result<(), TransportError> {
        for (index, mut child) in self.children.drain(..).enumerate() {
            let status = child.wait()?;
            if !status.success() {
                return Err(TransportError::WorkerFailed {
                    rank: index + 1,
                    status,
                });
            }
        }
        Ok(())
    }
}

impl Drop for ProcessChildren {
    fn drop(&mut self) {
        for child in &mut self.children {
            if matches!(child.try_wait(), Ok(None)) {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

/// Spawns `workers` copies of the current binary as a process group.
///
/// Each child is started as `<current_exe> --worker-rank <r>` with its extra
/// pipe fds in [`IPC_FDS_ENV`]. Extra arguments (for example a verbosity
/// flag) are appended verbatim.
pub fn spawn_group(
    workers: usize,
    extra_args: &[String],
) -> Result<(ProcessCoordinator, ProcessChildren), TransportError> {
    let exe = std::env::current_exe().map_err(|source| TransportError::Spawn { rank: 0, source })?;

    let mut children = Vec::with_capacity(workers);
    let mut commands = Vec::with_capacity(workers);
    let mut reports = Vec::with_capacity(workers);
    let mut report_fds = Vec::with_capacity(workers);
    let mut bounds = Vec::with_capacity(workers);
    let mut barriers = Vec::with_capacity(workers);

    for rank in 1..=workers {
        let spawn_err = |source: std::io::Error| TransportError::Spawn { rank, source };
        let (bound_child_fd, bound_parent) = pipe_child_reads().map_err(spawn_err)?;
        let (barrier_child_fd, barrier_parent) = pipe_child_writes().map_err(spawn_err)?;

        let spawned = Command::new(&exe)
            .arg(WORKER_FLAG)
            .arg(rank.to_string())
            .args(extra_args)
            .env(IPC_FDS_ENV, format!("{bound_child_fd},{barrier_child_fd}"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn();

        // The child holds its own copies now (or never will); either way the
        // parent must release the inheritable ends.
        unsafe {
            libc::close(bound_child_fd);
            libc::close(barrier_child_fd);
        }
        let mut child = spawned.map_err(spawn_err)?;

        let stdin = child.stdin.take().expect("stdin is piped");
        let stdout = child.stdout.take().expect("stdout is piped");
        report_fds.push(stdout.as_raw_fd());
        commands.push(FrameWriter::new(stdin));
        reports.push(FrameReader::new(stdout));
        bounds.push(FrameWriter::new(bound_parent));
        barriers.push(FrameReader::new(barrier_parent));
        children.push(child);
    }

    Ok((
        ProcessCoordinator {
            link: PipeCoordinatorLink { commands, barriers },
            feed: PipeCoordinatorFeed {
                reports,
                report_fds,
                bounds,
                next_poll: 0,
            },
        },
        ProcessChildren { children },
    ))
}

/// Coordinator main-thread half over pipes.
pub struct PipeCoordinatorLink {
    commands: Vec<FrameWriter<ChildStdin>>,
    barriers: Vec<FrameReader<File>>,
}

impl CoordinatorLink for PipeCoordinatorLink {
    fn worker_count(&self) -> usize {
        self.commands.len()
    }

    fn broadcast_graph(&mut self, graph: &Graph) -> Result<(), TransportError> {
        let frame = Frame::Graph(graph.clone());
        for command in &mut self.commands {
            command.write(&frame)?;
        }
        Ok(())
    }

    fn send_node(&mut self, dest: Rank, tag: Tag, node: &SearchNode) -> Result<(), TransportError> {
        let command = self
            .commands
            .get_mut(dest.wrapping_sub(1))
            .ok_or(TransportError::UnknownRank(dest))?;
        command.write(&Frame::Node(tag, node.clone()))?;
        Ok(())
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        for barrier in &mut self.barriers {
            match barrier.read() {
                Ok(Frame::Barrier) => {}
                Ok(other) => {
                    return Err(TransportError::UnexpectedFrame {
                        expected: "barrier",
                        got: other.kind_name(),
                    });
                }
                Err(FrameError::EndOfStream) => return Err(TransportError::Disconnected),
                Err(e) => return Err(e.into()),
            }
        }
        for command in &mut self.commands {
            command.write(&Frame::Release)?;
        }
        Ok(())
    }
}

/// Coordinator listener-thread half over pipes.
pub struct PipeCoordinatorFeed {
    reports: Vec<FrameReader<ChildStdout>>,
    report_fds: Vec<RawFd>,
    bounds: Vec<FrameWriter<File>>,
    next_poll: usize,
}

impl PipeCoordinatorFeed {
    /// Blocks until some report pipe is readable, returning its index.
    /// Rotates the scan start so no worker can starve the others.
    fn poll_ready(&mut self) -> Result<usize, TransportError> {
        let mut fds: Vec<libc::pollfd> = self
            .report_fds
            .iter()
            .map(|&fd| libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        loop {
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(TransportError::Io(err));
            }
            for offset in 0..fds.len() {
                let index = (self.next_poll + offset) % fds.len();
                if fds[index].revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                    self.next_poll = (index + 1) % fds.len();
                    return Ok(index);
                }
            }
            // Spurious wakeup; poll again.
        }
    }

    fn read_report(&mut self, index: usize) -> Result<Report, TransportError> {
        match self.reports[index].read() {
            Ok(Frame::Node(tag, node)) => Ok(Report {
                source: index + 1,
                tag,
                node,
            }),
            Ok(other) => Err(TransportError::UnexpectedFrame {
                expected: "node",
                got: other.kind_name(),
            }),
            Err(FrameError::EndOfStream) => Err(TransportError::Disconnected),
            Err(e) => Err(e.into()),
        }
    }
}

impl CoordinatorFeed for PipeCoordinatorFeed {
    fn recv_report(&mut self) -> Result<Report, TransportError> {
        if let Some(index) = self.reports.iter().position(|r| r.has_buffered_data()) {
            return self.read_report(index);
        }
        let index = self.poll_ready()?;
        self.read_report(index)
    }

    fn broadcast_bound(&mut self, value: u32) -> Result<(), TransportError> {
        let frame = Frame::Bound(value);
        for bound in &mut self.bounds {
            bound.write(&frame)?;
        }
        Ok(())
    }
}

/// A worker's two transport halves over its inherited pipes.
pub struct ProcessWorker {
    /// Main-thread half.
    pub link: PipeWorkerLink,
    /// Listener-thread half.
    pub feed: PipeBoundFeed,
}

/// Reconstructs a worker's transport from its inherited stdio and
/// [`IPC_FDS_ENV`]. Fatal before any work if the environment is unusable.
pub fn worker_from_env(rank: Rank) -> Result<ProcessWorker, TransportError> {
    let spec = std::env::var(IPC_FDS_ENV)
        .map_err(|_| TransportError::WorkerEnv(format!("{IPC_FDS_ENV} is not set")))?;
    let (bound_fd, barrier_fd) = parse_fd_spec(&spec)?;
    let bound = unsafe { File::from_raw_fd(bound_fd) };
    let barrier = unsafe { File::from_raw_fd(barrier_fd) };
    Ok(ProcessWorker {
        link: PipeWorkerLink {
            rank,
            commands: FrameReader::new(std::io::stdin()),
            reports: FrameWriter::new(std::io::stdout()),
            barrier: FrameWriter::new(barrier),
        },
        feed: PipeBoundFeed {
            bounds: FrameReader::new(bound),
        },
    })
}

/// Worker main-thread half over pipes.
pub struct PipeWorkerLink {
    rank: Rank,
    commands: FrameReader<std::io::Stdin>,
    reports: FrameWriter<std::io::Stdout>,
    barrier: FrameWriter<File>,
}

impl PipeWorkerLink {
    fn next_command(&mut self, expected: &'static str) -> Result<Frame, TransportError> {
        match self.commands.read() {
            Ok(frame) => Ok(frame),
            Err(FrameError::EndOfStream) => Err(TransportError::Disconnected),
            Err(e) => Err(e.into()),
        }
        .and_then(|frame| match (&frame, expected) {
            (Frame::Graph(_), "graph") | (Frame::Node(..), "node") | (Frame::Release, "release") => {
                Ok(frame)
            }
            _ => Err(TransportError::UnexpectedFrame {
                expected,
                got: frame.kind_name(),
            }),
        })
    }
}

impl WorkerLink for PipeWorkerLink {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn recv_graph(&mut self) -> Result<Graph, TransportError> {
        match self.next_command("graph")? {
            Frame::Graph(graph) => Ok(graph),
            _ => unreachable!("next_command filters the kind"),
        }
    }

    fn recv_assignment(&mut self) -> Result<(Tag, SearchNode), TransportError> {
        match self.next_command("node")? {
            Frame::Node(tag, node) => Ok((tag, node)),
            _ => unreachable!("next_command filters the kind"),
        }
    }

    fn send_report(&mut self, tag: Tag, node: &SearchNode) -> Result<(), TransportError> {
        self.reports.write(&Frame::Node(tag, node.clone()))?;
        Ok(())
    }

    fn barrier(&mut self) -> Result<(), TransportError> {
        self.barrier.write(&Frame::Barrier)?;
        self.next_command("release").map(|_| ())
    }
}

/// Worker listener-thread half: the read side of the bound pipe.
pub struct PipeBoundFeed {
    bounds: FrameReader<File>,
}

impl BoundFeed for PipeBoundFeed {
    fn recv_bound(&mut self) -> Result<u32, TransportError> {
        match self.bounds.read() {
            Ok(Frame::Bound(value)) => Ok(value),
            Ok(other) => Err(TransportError::UnexpectedFrame {
                expected: "bound",
                got: other.kind_name(),
            }),
            Err(FrameError::EndOfStream) => Err(TransportError::Disconnected),
            Err(e) => Err(e.into()),
        }
    }
}
