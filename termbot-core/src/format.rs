//! Reply construction and display formatting.
//!
//! Replies are transport-neutral until [`Reply::to_messages`] renders them
//! into chunks small enough for a single chat message.

use crate::executor::CommandOutput;
use crate::telemetry::{DiskInfo, MemoryReport, NetworkInterface, ProcessInfo, SystemStatus};
use crate::types::Decision;

/// Chunk size used when splitting long replies. Telegram's hard limit is
/// 4096 characters per message.
pub const MESSAGE_CHUNK_CHARS: usize = 4000;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Html,
}

/// One message as handed to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub format: TextFormat,
}

/// A reply to one inbound request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// Collaborator output, relayed verbatim inside a preformatted block.
    Output { title: String, body: String },
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }

    pub fn to_messages(&self, limit: usize) -> Vec<OutboundMessage> {
        match self {
            Reply::Text(text) => split_chunks(text, limit)
                .into_iter()
                .map(|chunk| OutboundMessage {
                    text: chunk,
                    format: TextFormat::Plain,
                })
                .collect(),
            Reply::Output { title, body } => {
                let budget = limit.saturating_sub(title.chars().count() + 1).max(1);
                split_chunks(body, budget)
                    .into_iter()
                    .enumerate()
                    .map(|(i, chunk)| {
                        let pre = format!("<pre>{}</pre>", escape_html(&chunk));
                        let text = if i == 0 {
                            format!("{}\n{pre}", escape_html(title))
                        } else {
                            pre
                        };
                        OutboundMessage {
                            text,
                            format: TextFormat::Html,
                        }
                    })
                    .collect()
            }
        }
    }
}

/// Split `text` into chunks of at most `limit` characters, preferring to
/// break after a newline. Always returns at least one chunk.
pub fn split_chunks(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        let hard = rest
            .char_indices()
            .nth(limit)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let cut = match rest[..hard].rfind('\n') {
            Some(nl) if nl > 0 => nl + 1,
            _ => hard,
        };
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

// ─── Access decisions ─────────────────────────────────────────

/// Reply for a non-allow decision. `None` for [`Decision::Allow`].
pub fn decision_reply(decision: &Decision, owner_handle: &str) -> Option<Reply> {
    match decision {
        Decision::Allow => None,
        Decision::Deny {
            attempt,
            max_attempts,
            pending_block: None,
        } => Some(Reply::text(format!(
            "⚠️ You are not authorized to use this bot!\n\
             🔑 Ask the administrator for access.\n\
             Attempt {attempt} of {max_attempts}."
        ))),
        Decision::Deny {
            attempt,
            max_attempts,
            pending_block: Some(_),
        } => Some(Reply::text(format!(
            "⚠️ You are not authorized to use this bot!\n\
             Attempt {attempt} of {max_attempts}.\n\
             The lockout could not be recorded; it will be retried on your next attempt."
        ))),
        Decision::Blocked {
            newly_blocked: true,
        } => Some(Reply::text("🚫 Too many attempts! You have been blocked.")),
        Decision::Blocked {
            newly_blocked: false,
        } => Some(Reply::text(format!(
            "❌ You are blocked! Contact the administrator{}.",
            owner_suffix(owner_handle)
        ))),
    }
}

fn owner_suffix(owner_handle: &str) -> String {
    let handle = owner_handle.trim().trim_start_matches('@');
    if handle.is_empty() {
        String::new()
    } else {
        format!(" (@{handle})")
    }
}

// ─── Help ─────────────────────────────────────────────────────

pub fn render_help(max_attempts: u32, owner_handle: &str) -> String {
    format!(
        "🤖 termbot: control this server from Telegram.\n\
         \n\
         Commands:\n\
         /cmd <command> - run a shell command (e.g. /cmd ls -la)\n\
         /status - system status\n\
         /processes - top {top} processes by CPU\n\
         /memory - RAM and swap usage\n\
         /disk - disk usage per mount\n\
         /network - network interfaces\n\
         /help - show this message\n\
         \n\
         Notes:\n\
         - Only authorized users can use this bot\n\
         - After {max_attempts} failed attempts you will be blocked\n\
         - Only the owner{owner} can unblock users",
        top = crate::commands::TOP_PROCESSES,
        owner = owner_suffix(owner_handle),
    )
}

pub fn render_start(first_name: Option<&str>, max_attempts: u32, owner_handle: &str) -> String {
    let greeting = match first_name {
        Some(name) if !name.trim().is_empty() => format!("👋 Hello {}!\n\n", name.trim()),
        _ => "👋 Hello!\n\n".to_string(),
    };
    format!("{greeting}{}", render_help(max_attempts, owner_handle))
}

// ─── Shell output ─────────────────────────────────────────────

pub fn render_command_output(output: &CommandOutput) -> Reply {
    if output.success() {
        if output.stdout.trim().is_empty() {
            Reply::text("✅ Command executed successfully (no output)")
        } else {
            Reply::Output {
                title: "✅ Result:".to_string(),
                body: output.stdout.clone(),
            }
        }
    } else {
        let status = match output.exit_code {
            Some(code) => format!("exit {code}"),
            None => "killed by signal".to_string(),
        };
        let body = if output.stderr.trim().is_empty() {
            output.stdout.clone()
        } else {
            output.stderr.clone()
        };
        if body.trim().is_empty() {
            Reply::text(format!("❌ Command failed ({status})"))
        } else {
            Reply::Output {
                title: format!("❌ Command failed ({status}):"),
                body,
            }
        }
    }
}

// ─── Telemetry ────────────────────────────────────────────────

fn gb(bytes: u64) -> f64 {
    bytes as f64 / GIB
}

fn mb(bytes: u64) -> f64 {
    bytes as f64 / MIB
}

pub fn render_status(status: &SystemStatus) -> String {
    let mut out = format!(
        "📊 Server status\n\
         \n\
         System:\n\
         • Host: {host}\n\
         • OS: {os} {version}\n\
         • Kernel: {kernel}\n\
         • Arch: {arch}\n\
         • Uptime: {days}d {hours}h\n\
         \n\
         CPU:\n\
         • Model: {brand}\n\
         • Cores: {cores}\n\
         • Speed: {ghz:.2} GHz\n\
         • Usage: {cpu:.1}%\n\
         \n\
         Memory:\n\
         • Total: {mem_total:.2} GB\n\
         • Free: {mem_free:.2} GB\n\
         • Usage: {mem_pct:.2}%",
        host = status.host_name,
        os = status.os_name,
        version = status.os_version,
        kernel = status.kernel_version,
        arch = status.arch,
        days = status.uptime_secs / 86_400,
        hours = (status.uptime_secs % 86_400) / 3_600,
        brand = status.cpu_brand,
        cores = status.cpu_cores,
        ghz = status.cpu_frequency_mhz as f64 / 1000.0,
        cpu = status.cpu_usage_percent,
        mem_total = gb(status.memory.total_bytes),
        mem_free = gb(status.memory.free_bytes),
        mem_pct = status.memory.percent_used(),
    );
    if let Some(disk) = status.disk_root {
        out.push_str(&format!(
            "\n\nDisk (/):\n• Usage: {:.2}%",
            disk.percent_used()
        ));
    }
    out
}

pub fn render_memory(report: &MemoryReport) -> String {
    format!(
        "🧠 Memory usage\n\
         \n\
         RAM:\n\
         • Total: {:.2} GB\n\
         • Used: {:.2} GB\n\
         • Free: {:.2} GB\n\
         • Usage: {:.2}%\n\
         \n\
         Swap:\n\
         • Total: {:.2} GB\n\
         • Used: {:.2} GB\n\
         • Free: {:.2} GB\n\
         • Usage: {:.2}%",
        gb(report.ram.total_bytes),
        gb(report.ram.used_bytes),
        gb(report.ram.free_bytes),
        report.ram.percent_used(),
        gb(report.swap.total_bytes),
        gb(report.swap.used_bytes),
        gb(report.swap.free_bytes),
        report.swap.percent_used(),
    )
}

pub fn render_disks(disks: &[DiskInfo]) -> String {
    if disks.is_empty() {
        return "💾 Disk usage\n\nNo mounted filesystems found.".to_string();
    }
    let mut out = "💾 Disk usage\n".to_string();
    for disk in disks {
        out.push_str(&format!(
            "\n📁 {} ({})\n\
             • Total: {:.2} GB\n\
             • Used: {:.2} GB\n\
             • Free: {:.2} GB\n\
             • Usage: {:.2}%\n",
            disk.mount_point,
            disk.file_system,
            gb(disk.usage.total_bytes),
            gb(disk.usage.used_bytes),
            gb(disk.usage.free_bytes),
            disk.usage.percent_used(),
        ));
    }
    out
}

pub fn render_networks(interfaces: &[NetworkInterface]) -> String {
    if interfaces.is_empty() {
        return "🌐 Network\n\nNo interfaces found.".to_string();
    }
    let mut out = "🌐 Network\n".to_string();
    for iface in interfaces {
        out.push_str(&format!(
            "\n📡 {}\n\
             • MAC: {}\n\
             • RX: {:.2} MB\n\
             • TX: {:.2} MB\n",
            iface.name,
            iface.mac_address,
            mb(iface.received_bytes),
            mb(iface.transmitted_bytes),
        ));
    }
    out
}

pub fn render_processes(processes: &[ProcessInfo]) -> String {
    let mut out = format!("📋 Top {} processes\n", processes.len());
    for proc in processes {
        out.push_str(&format!(
            "\n• {} (PID: {})\n  CPU: {:.1}% | RAM: {:.1} MB\n",
            proc.name,
            proc.pid,
            proc.cpu_percent,
            mb(proc.memory_bytes),
        ));
    }
    out
}
