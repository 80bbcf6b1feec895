use crate::errors::RuntimeError;
use nix::{
    sched::{self, CloneFlags},
    unistd,
};
use std::{
    ffi::{CString, NulError, OsStr, OsString},
    os::unix::{ffi::OsStrExt, process::ExitStatusExt},
    path::Path,
    process::Stdio,
};
use tokio::process::Command;

/// Status of a sandboxed command that exited normally
///
/// Much like [std::process::ExitStatus], except that termination by a signal
/// is reported as [RuntimeError::ChildSignaled] instead.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ExitStatus {
    pub(crate) code: i32,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn code(&self) -> i32 {
        self.code
    }
}

/// One command to run inside a prepared root, started with
/// [Launch::status()]
///
/// The command runs as PID 1 of a new PID namespace, with its own UTS
/// namespace and hostname, its root directory changed to the sandbox root
/// and its working directory set to `/`. Standard streams are inherited.
///
/// Only the child is confined. The calling process keeps its own root, but
/// its PID namespace for new children is switched, so one process can launch
/// at most one sandbox.
#[derive(Debug)]
pub struct Launch {
    root: CString,
    hostname: String,
    program: OsString,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    arg_error: Result<(), NulError>,
}

impl Launch {
    pub(crate) fn new<S: AsRef<OsStr>>(root: &Path, hostname: &str, program: S) -> Self {
        let (root, arg_error) = match CString::new(root.as_os_str().as_bytes()) {
            Ok(root) => (root, Ok(())),
            Err(err) => (CString::default(), Err(err)),
        };
        Launch {
            root,
            hostname: hostname.to_owned(),
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            env: Vec::new(),
            arg_error,
        }
    }

    /// Append arguments to the command line
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Append one argument to the command line
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        if let Err(err) = CString::new(arg.as_ref().as_bytes()) {
            self.arg_error = Err(err);
        }
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Add one environment variable on top of the inherited environment
    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.env
            .push((key.as_ref().to_os_string(), val.as_ref().to_os_string()));
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Start the command and wait for it to exit
    ///
    /// This moves the calling thread into a new PID namespace for its future
    /// children. Afterwards that thread can't create threads of its own
    /// (`clone` fails with `EINVAL`), so call it from a single-threaded
    /// runtime or a thread that won't need to run `spawn_blocking` work.
    pub async fn status(self) -> Result<ExitStatus, RuntimeError> {
        self.arg_error?;
        CString::new(self.program.as_bytes())?;
        let description = self.program.to_string_lossy().into_owned();

        let root = self.root;
        let slash = CString::new("/")?;
        let hostname = self.hostname.clone();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("HOSTNAME", &self.hostname)
            .envs(self.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Runs in the forked child. Nothing here may allocate.
        unsafe {
            command.pre_exec(move || {
                sched::unshare(CloneFlags::CLONE_NEWUTS)?;
                unistd::sethostname(&hostname)?;
                unistd::chroot(root.as_c_str())?;
                unistd::chdir(slash.as_c_str())?;
                Ok(())
            });
        }

        // The next child forked from this thread becomes PID 1
        sched::unshare(CloneFlags::CLONE_NEWPID)
            .map_err(|err| RuntimeError::setup("unshare pid namespace")(err.into()))?;
        let mut child = command.spawn().map_err(|source| RuntimeError::ChildExec {
            command: description.clone(),
            source,
        })?;
        log::info!("started {:?} as pid {:?}", description, child.id());

        let status = child
            .wait()
            .await
            .map_err(|source| RuntimeError::ChildExec {
                command: description,
                source,
            })?;
        match (status.code(), status.signal()) {
            (Some(code), _) => Ok(ExitStatus { code }),
            (None, Some(signal)) => Err(RuntimeError::ChildSignaled(signal)),
            (None, None) => Err(RuntimeError::ChildSignaled(0)),
        }
    }
}
