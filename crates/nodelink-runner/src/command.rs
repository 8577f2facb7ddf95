use std::path::{Path, PathBuf};

/// Command line for launching a node child process.
///
/// Arguments are passed verbatim to the OS; there is no shell
/// interpretation anywhere in the supervisor.
#[derive(Debug, Clone)]
pub struct NodeCommand {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
}

impl NodeCommand {
    /// Create a command for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    /// Append one argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the child's working directory.
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// The program to launch.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// User arguments, in order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Environment variables set for the child.
    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    /// The child's working directory, if overridden.
    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }
}
