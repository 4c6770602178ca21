//! Building and executing task commands.
//!
//! # Data Flow
//! ```text
//! Task (language, lines, working dir)
//!     → interpreter lookup (language id → program candidates on PATH)
//!     → Runtime::Host   : <program> <flag> <script>
//!     → Runtime::Docker : docker run --rm -i -v <root>:/workspace ... <image> <program> <flag> <script>
//!     → session environment, working directory
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::project::Task;
use crate::runtime::{Runtime, Session};

/// Mount point of the project root inside containers.
pub const CONTAINER_WORKSPACE: &str = "/workspace";

/// How a language's source is handed to its interpreter.
struct Interpreter {
    languages: &'static [&'static str],
    programs: &'static [&'static str],
    flag: &'static str,
}

const INTERPRETERS: &[Interpreter] = &[
    Interpreter { languages: &["sh", "bash", "shell", "shellscript", ""], programs: &["bash", "sh"], flag: "-c" },
    Interpreter { languages: &["zsh"], programs: &["zsh"], flag: "-c" },
    Interpreter { languages: &["ksh"], programs: &["ksh"], flag: "-c" },
    Interpreter { languages: &["fish"], programs: &["fish"], flag: "-c" },
    Interpreter { languages: &["python", "py"], programs: &["python3", "python"], flag: "-c" },
    Interpreter {
        languages: &["js", "javascript", "jsx", "javascriptreact"],
        programs: &["node"],
        flag: "-e",
    },
    Interpreter {
        languages: &["ts", "typescript", "tsx", "typescriptreact"],
        programs: &["ts-node"],
        flag: "-e",
    },
    Interpreter { languages: &["ruby", "rb"], programs: &["ruby"], flag: "-e" },
    Interpreter { languages: &["perl"], programs: &["perl"], flag: "-e" },
    Interpreter { languages: &["php"], programs: &["php"], flag: "-r" },
    Interpreter { languages: &["lua"], programs: &["lua"], flag: "-e" },
];

/// A resolved `<program> <flag> <script>` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSpec {
    pub program: String,
    pub args: Vec<String>,
}

/// Builds commands for tasks under the configured runtime.
#[derive(Debug, Clone)]
pub struct CommandFactory {
    runtime: Runtime,
    session: Arc<Session>,
    project_root: PathBuf,
}

impl CommandFactory {
    pub fn new(runtime: Runtime, session: Arc<Session>, project_root: PathBuf) -> Self {
        Self {
            runtime,
            session,
            project_root,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Interpreter invocation for `task`.
    pub fn program_for(&self, task: &Task) -> Result<ProgramSpec> {
        let language = task.code_block.language.to_ascii_lowercase();
        let script = task.code_block.lines.join("\n");

        let frontmatter_shell = task
            .frontmatter
            .as_ref()
            .map(|f| f.shell.as_str())
            .filter(|s| !s.is_empty());

        let interpreter = INTERPRETERS
            .iter()
            .find(|i| i.languages.contains(&language.as_str()))
            .ok_or_else(|| {
                Error::Usage(format!(
                    "task {:?}: no interpreter for language {:?}",
                    task.name(),
                    task.code_block.language
                ))
            })?;

        let program = match (interpreter.flag, frontmatter_shell) {
            ("-c", Some(shell)) if is_shell_language(&language) => shell.to_string(),
            _ => self.pick_program(interpreter.programs),
        };

        Ok(ProgramSpec {
            program,
            args: vec![interpreter.flag.to_string(), script],
        })
    }

    fn pick_program(&self, candidates: &[&str]) -> String {
        if matches!(self.runtime, Runtime::Docker { .. }) {
            return candidates.first().copied().unwrap_or("sh").to_string();
        }
        candidates
            .iter()
            .find(|c| look_path(c).is_some())
            .or_else(|| candidates.first())
            .copied()
            .unwrap_or("sh")
            .to_string()
    }

    /// A ready-to-spawn command for `task` with inherited stdio.
    pub fn build(&self, task: &Task) -> Result<Command> {
        let spec = self.program_for(task)?;
        let working_dir = task.working_dir();

        let mut command = match &self.runtime {
            Runtime::Host => {
                let program = look_path(&spec.program)
                    .map(PathBuf::into_os_string)
                    .unwrap_or_else(|| OsString::from(&spec.program));
                let mut command = Command::new(program);
                command.args(&spec.args);
                command.current_dir(&working_dir);
                command.env_clear();
                if !self.session.uses_system_env() {
                    if let Some(path) = std::env::var_os("PATH") {
                        command.env("PATH", path);
                    }
                }
                command.envs(self.session.env());
                command
            }
            Runtime::Docker { image, .. } => {
                let mut command = Command::new("docker");
                command.args(["run", "--rm", "-i"]);
                command.arg("-v").arg(format!(
                    "{}:{}",
                    self.project_root.display(),
                    CONTAINER_WORKSPACE
                ));
                command
                    .arg("-w")
                    .arg(container_dir(&self.project_root, &working_dir));
                for (key, value) in self.session.env() {
                    command.arg("-e").arg(format!("{}={}", key, value));
                }
                command.arg(image);
                command.arg(&spec.program).args(&spec.args);
                command
            }
        };

        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        Ok(command)
    }

    /// Run `task` to completion, killing it if `cancel` fires.
    pub async fn execute(&self, task: &Task, cancel: &CancellationToken) -> Result<()> {
        let mut command = self.build(task)?;
        tracing::info!(task = task.name(), runtime = %self.runtime, "Running task");

        let mut child = command
            .spawn()
            .map_err(|e| Error::io(format!("failed to start task {:?}", task.name()), e))?;

        let status = tokio::select! {
            status = child.wait() => status
                .map_err(|e| Error::io(format!("failed to wait for task {:?}", task.name()), e))?,
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(Error::Cancelled);
            }
        };

        check_status(task, status)
    }
}

fn is_shell_language(language: &str) -> bool {
    matches!(language, "sh" | "bash" | "shell" | "shellscript" | "")
}

fn check_status(task: &Task, status: ExitStatus) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    let reason = match status.code() {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    };
    Err(Error::Task {
        name: task.name().to_string(),
        reason,
    })
}

/// Working directory inside the container for a host directory.
fn container_dir(project_root: &Path, working_dir: &Path) -> String {
    match working_dir.strip_prefix(project_root) {
        Ok(rel) if rel.as_os_str().is_empty() => CONTAINER_WORKSPACE.to_string(),
        Ok(rel) => format!("{}/{}", CONTAINER_WORKSPACE, rel.display()),
        Err(_) => CONTAINER_WORKSPACE.to_string(),
    }
}

/// First executable named `program` on the host PATH.
pub fn look_path(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
