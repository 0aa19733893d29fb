//! Chat command parsing.
//!
//! Commands are slash-prefixed words with an optional `@botname` suffix.
//! English names are canonical; the Portuguese names of the original bot are
//! accepted as aliases.

/// Number of processes listed by `/processes`.
pub const TOP_PROCESSES: usize = 10;

/// Telemetry sub-commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TelemetryQuery {
    Status,
    Processes,
    Memory,
    Disk,
    Network,
}

/// A parsed chat command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// `/cmd <text>`. An empty string means the user sent `/cmd` alone.
    Shell(String),
    Telemetry(TelemetryQuery),
    Unknown(String),
}

impl Command {
    pub fn parse(text: &str) -> Command {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return Command::Unknown(text.to_string());
        };

        let (head, args) = match rest.find(char::is_whitespace) {
            Some(pos) => (&rest[..pos], rest[pos..].trim()),
            None => (rest, ""),
        };
        // `/cmd@my_bot ls` addresses a specific bot in group chats.
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();

        match name.as_str() {
            "start" => Command::Start,
            "help" | "ajuda" => Command::Help,
            "cmd" => Command::Shell(args.to_string()),
            "status" => Command::Telemetry(TelemetryQuery::Status),
            "processes" | "processos" => Command::Telemetry(TelemetryQuery::Processes),
            "memory" | "memoria" => Command::Telemetry(TelemetryQuery::Memory),
            "disk" | "disco" => Command::Telemetry(TelemetryQuery::Disk),
            "network" | "rede" => Command::Telemetry(TelemetryQuery::Network),
            _ => Command::Unknown(head.to_string()),
        }
    }
}
