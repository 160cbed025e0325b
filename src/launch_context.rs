use url::Url;

use crate::{PAGE_ARGUMENT_FLAG, PROTOCOL_SCHEME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchKind {
    /// Started with no arguments (tile, menu entry, double click).
    Launch,
    /// Started from a shell command carrying arguments.
    CommandLine,
    /// Started through a `bookshop://` link.
    Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchContextError {
    #[error("unbalanced quoting in command line: {0}")]
    InvalidCommandLine(String),
}

/// Why and how the process (or an already running instance) was activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchContext {
    kind: LaunchKind,
    arguments: Vec<String>,
    reactivation: bool,
}

impl LaunchContext {
    pub fn launch() -> Self {
        Self::from_arguments(Vec::<String>::new())
    }

    /// Builds a context from arguments that exclude the program name.
    pub fn from_arguments<I, S>(arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let arguments: Vec<String> = arguments
            .into_iter()
            .map(Into::into)
            .filter(|argument: &String| !argument.trim().is_empty())
            .collect();
        Self {
            kind: classify_arguments(&arguments),
            arguments,
            reactivation: false,
        }
    }

    /// Builds a context from a full argv, dropping the program name.
    pub fn from_process_args<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_arguments(argv.into_iter().skip(1))
    }

    pub fn from_command_line(raw: &str) -> Result<Self, LaunchContextError> {
        let pieces = shlex::split(raw)
            .ok_or_else(|| LaunchContextError::InvalidCommandLine(raw.to_string()))?;
        Ok(Self::from_arguments(pieces))
    }

    /// Marks the context as delivered to an instance that is already running.
    pub fn into_reactivation(mut self) -> Self {
        self.reactivation = true;
        self
    }

    pub fn kind(&self) -> LaunchKind {
        self.kind
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn is_reactivation(&self) -> bool {
        self.reactivation
    }

    /// Value of `--page <name>` or `--page=<name>`, if present.
    pub fn page_argument(&self) -> Option<&str> {
        let mut arguments = self.arguments.iter();
        while let Some(argument) = arguments.next() {
            if argument == PAGE_ARGUMENT_FLAG {
                return arguments.next().map(String::as_str);
            }
            if let Some(value) = argument
                .strip_prefix(PAGE_ARGUMENT_FLAG)
                .and_then(|rest| rest.strip_prefix('='))
            {
                return Some(value);
            }
        }
        None
    }

    pub fn protocol_uri(&self) -> Option<Url> {
        self.arguments.iter().find_map(|argument| parse_protocol_uri(argument))
    }
}

fn parse_protocol_uri(raw: &str) -> Option<Url> {
    let parsed = Url::parse(raw.trim()).ok()?;
    (parsed.scheme() == PROTOCOL_SCHEME).then_some(parsed)
}

fn classify_arguments(arguments: &[String]) -> LaunchKind {
    if arguments.is_empty() {
        return LaunchKind::Launch;
    }
    if arguments
        .iter()
        .any(|argument| parse_protocol_uri(argument).is_some())
    {
        return LaunchKind::Protocol;
    }
    LaunchKind::CommandLine
}
