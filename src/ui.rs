/// file: src/ui.rs
/// description: presentation layer for the live screen, driven by client events
use crate::{
    events::{ClientEvent, EventReceiver},
    formatter::{Colors, OutputFormat, Printer},
    types::Identity,
};
use tracing::{debug, info};

pub struct UIController {
    event_receiver: EventReceiver,
    printer: Printer,
    colored: bool,
    viewer: Identity,
    unread: usize,
}

impl UIController {
    pub fn new(event_receiver: EventReceiver, format: OutputFormat, colored: bool, viewer: Identity) -> Self {
        Self {
            event_receiver,
            printer: Printer::new(format, colored),
            colored,
            viewer,
            unread: 0,
        }
    }

    /// Runs until every event sender has been dropped.
    pub async fn run(&mut self) {
        self.print_startup_banner();
        while let Some(event) = self.event_receiver.recv().await {
            self.handle_event(event);
        }
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Starting => {
                info!("Push channel starting");
            }
            ClientEvent::Connecting { url } => {
                self.print_connection_status("CONNECTING", &url);
            }
            ClientEvent::Connected { session_id } => {
                self.print_connection_status("CONNECTED", &format!("session {}", session_id));
            }
            ClientEvent::Registered { identity_id } => {
                debug!("Registered as {}", identity_id);
                self.print_connection_status(
                    "LISTENING",
                    &format!("Live updates for {}", self.viewer.display_name),
                );
            }
            ClientEvent::ConnectionFailed(error) => {
                self.print_error("CONNECTION FAILED", &error);
            }
            ClientEvent::Reconnecting { attempt, delay_ms } => {
                self.print_reconnect_info(delay_ms, attempt);
            }
            ClientEvent::Disconnected => {
                self.print_connection_status("DISCONNECTED", "Connection closed");
            }
            ClientEvent::AlertRaised(alert) => {
                self.printer.print_alert(&alert);
            }
            ClientEvent::AlertExpired { id } => {
                debug!("Alert {} expired", id);
            }
            ClientEvent::NotificationsRefreshed { total, unread } => {
                if unread != self.unread {
                    self.unread = unread;
                    self.print_badge(total);
                }
            }
            ClientEvent::Stopping => {
                self.print_connection_status("STOPPING", "Push channel shutting down");
            }
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.colored {
            format!("{}{}{}{}", Colors::BOLD, color, text, Colors::RESET)
        } else {
            text.to_string()
        }
    }

    fn print_startup_banner(&self) {
        let rule = "══════════════════════════════════════════════════════════════";
        println!();
        println!("{}", self.paint(Colors::BRIGHT_CYAN, &format!("╔{rule}╗")));
        println!(
            "{}",
            self.paint(
                Colors::BRIGHT_CYAN,
                &format!("║{:^62}║", format!("TASK MASTER LIVE v{}", env!("CARGO_PKG_VERSION")))
            )
        );
        println!(
            "{}",
            self.paint(
                Colors::BRIGHT_CYAN,
                &format!(
                    "║{:^62}║",
                    format!("{} [{}]", self.viewer.display_name, self.viewer.role)
                )
            )
        );
        println!("{}", self.paint(Colors::BRIGHT_CYAN, &format!("╚{rule}╝")));
        println!("commands: list | read <id> | read-all | quit");
        println!();
    }

    fn print_connection_status(&self, status: &str, message: &str) {
        let (color, symbol) = match status {
            "CONNECTING" => (Colors::BRIGHT_YELLOW, "*"),
            "CONNECTED" => (Colors::BRIGHT_GREEN, "+"),
            "LISTENING" => (Colors::BRIGHT_BLUE, "~"),
            "DISCONNECTED" => (Colors::BRIGHT_RED, "X"),
            "STOPPING" => (Colors::BRIGHT_MAGENTA, "!"),
            _ => (Colors::WHITE, "-"),
        };

        println!("{} {} {}", self.paint(color, &format!("[{status}]")), symbol, message);
    }

    fn print_badge(&self, total: usize) {
        println!(
            "{} {} unread of {}",
            self.paint(Colors::BRIGHT_MAGENTA, "[NOTIFICATIONS]"),
            self.unread,
            total
        );
    }

    fn print_error(&self, error_type: &str, message: &str) {
        println!("{} ! {}", self.paint(Colors::BRIGHT_RED, &format!("[{error_type}]")), message);
    }

    fn print_reconnect_info(&self, delay_ms: u64, attempt: u32) {
        println!(
            "{} > Attempt {} in {:.1}s...",
            self.paint(Colors::BRIGHT_YELLOW, "[RECONNECTING]"),
            attempt,
            delay_ms as f64 / 1000.0
        );
    }
}
