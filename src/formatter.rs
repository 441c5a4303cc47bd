use crate::types::{
    Identity, LogEntry, NotificationKind, PersistedNotification, Stats, Task, TaskStatus,
    TransientAlert, User, UserRef,
};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

// ANSI color codes
pub struct Colors;

impl Colors {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const DIM: &'static str = "\x1b[2m";

    pub const RED: &'static str = "\x1b[31m";
    pub const WHITE: &'static str = "\x1b[37m";
    pub const GRAY: &'static str = "\x1b[90m";

    pub const BRIGHT_RED: &'static str = "\x1b[91m";
    pub const BRIGHT_GREEN: &'static str = "\x1b[92m";
    pub const BRIGHT_YELLOW: &'static str = "\x1b[93m";
    pub const BRIGHT_BLUE: &'static str = "\x1b[94m";
    pub const BRIGHT_MAGENTA: &'static str = "\x1b[95m";
    pub const BRIGHT_CYAN: &'static str = "\x1b[96m";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        }
    }
}

fn local_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn local_date(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.with_timezone(&Local).format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn name_of(user: Option<&UserRef>) -> &str {
    user.map(UserRef::display_name).unwrap_or("N/A")
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// "Completed on <date>" for finished tasks, the plain status otherwise.
pub fn status_label(task: &Task) -> String {
    match task.status {
        Some(TaskStatus::Completed) => match task.completion_date {
            Some(_) => format!("Completed on {}", local_date(task.completion_date)),
            None => TaskStatus::Completed.to_string(),
        },
        Some(status) => status.to_string(),
        None => "-".to_string(),
    }
}

/// Renders backend data for the terminal.
pub struct Printer {
    format: OutputFormat,
    colored: bool,
}

impl Printer {
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.colored {
            format!("{}{}{}", color, text, Colors::RESET)
        } else {
            text.to_string()
        }
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("failed to encode output: {}", e),
        }
    }

    fn heading(&self, title: &str) {
        println!("{}", self.paint(&format!("{}{}", Colors::BOLD, Colors::BRIGHT_CYAN), title));
    }

    pub fn print_message(&self, message: &str) {
        if self.format == OutputFormat::Json {
            self.print_json(&serde_json::json!({ "message": message }));
        } else {
            println!("{}", self.paint(Colors::BRIGHT_GREEN, message));
        }
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{}", self.paint(Colors::BRIGHT_RED, &format!("error: {message}")));
    }

    pub fn print_identity(&self, identity: &Identity) {
        if self.format == OutputFormat::Json {
            return self.print_json(identity);
        }
        println!(
            "{} <{}> [{}] id={}",
            self.paint(Colors::BOLD, &identity.display_name),
            identity.email,
            identity.role,
            identity.id
        );
    }

    pub fn print_tasks(&self, tasks: &[Task]) {
        if self.format == OutputFormat::Json {
            return self.print_json(tasks);
        }
        if tasks.is_empty() {
            println!("{}", self.paint(Colors::GRAY, "No tasks found"));
            return;
        }

        let header = format!(
            "{:<24} {:<28} {:<22} {:<8} {:<10} {:<16} {:<16}",
            "ID", "TITLE", "STATUS", "PRIORITY", "DUE", "ASSIGNED TO", "CREATED BY"
        );
        println!("{}", self.paint(&format!("{}{}", Colors::BOLD, Colors::GRAY), &header));

        for task in tasks {
            let status = status_label(task);
            let status = match task.status {
                Some(TaskStatus::Completed) => self.paint(Colors::BRIGHT_GREEN, &format!("{status:<22}")),
                Some(TaskStatus::InProgress) => self.paint(Colors::BRIGHT_YELLOW, &format!("{status:<22}")),
                _ => format!("{status:<22}"),
            };
            println!(
                "{:<24} {:<28} {} {:<8} {:<10} {:<16} {:<16}",
                truncate(&task.id, 24),
                truncate(&task.title, 28),
                status,
                task.priority.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                local_date(task.due_date),
                truncate(name_of(task.assigned_to.as_ref()), 16),
                truncate(name_of(task.created_by.as_ref()), 16),
            );
        }
    }

    pub fn print_task(&self, task: &Task) {
        if self.format == OutputFormat::Json {
            return self.print_json(task);
        }
        self.heading(&task.title);
        println!("  id:          {}", task.id);
        println!("  status:      {}", status_label(task));
        println!(
            "  priority:    {}",
            task.priority.map(|p| p.to_string()).unwrap_or_else(|| "-".into())
        );
        println!("  due:         {}", local_date(task.due_date));
        println!("  assigned to: {}", name_of(task.assigned_to.as_ref()));
        println!("  created by:  {}", name_of(task.created_by.as_ref()));
        println!("  created:     {}", local_time(task.created_at));
        if !task.description.is_empty() {
            println!();
            println!("  {}", task.description);
        }
    }

    pub fn print_users(&self, users: &[User], viewer: Option<&Identity>) {
        if self.format == OutputFormat::Json {
            return self.print_json(users);
        }
        for user in users {
            let marker = if viewer.is_some_and(|v| v.id == user.id) { "*" } else { " " };
            println!(
                "{} {:<24} {:<24} {:<32} {}",
                marker, user.id, truncate(&user.display_name, 24), truncate(&user.email, 32), user.role
            );
        }
    }

    pub fn print_stats(&self, stats: &Stats, viewer: &Identity) {
        if self.format == OutputFormat::Json {
            return self.print_json(stats);
        }
        self.heading("Dashboard");
        println!(
            "  total {}   completed {}   overdue {}",
            stats.total,
            self.paint(Colors::BRIGHT_GREEN, &stats.completed.to_string()),
            self.paint(Colors::BRIGHT_RED, &stats.overdue.to_string())
        );
        println!("  assigned by you:              {}", stats.tasks_assigned_by_person);
        println!("  assigned to you:              {}", stats.tasks_assigned_to_person);
        println!("  your completed tasks:         {}", stats.tasks_completed_by_person);
        println!("  given tasks pending:          {}", stats.given_task_pending);
        println!("  your tasks pending:           {}", stats.your_task_pending);
        println!(
            "  you gave and others completed: {}",
            stats.tasks_assigned_by_others_and_completed
        );

        // Standard accounts only see the per-user breakdown of their own work
        let rows: Vec<_> = stats
            .per_user
            .iter()
            .filter(|row| viewer.role.is_elevated() || row.id == viewer.id)
            .collect();
        if !rows.is_empty() {
            println!();
            self.heading("Completed per user");
            for row in rows {
                println!(
                    "  {:<24} {}",
                    row.display_name.as_deref().unwrap_or(&row.id),
                    row.completed
                );
            }
        }
    }

    pub fn print_logs(&self, logs: &[LogEntry]) {
        if self.format == OutputFormat::Json {
            return self.print_json(logs);
        }
        if logs.is_empty() {
            println!("{}", self.paint(Colors::GRAY, "No logs available."));
            return;
        }
        for log in logs {
            println!(
                "{:<16} {:<16} {:<16} {:<28} {}",
                truncate(name_of(log.assigned_by.as_ref()), 16),
                truncate(name_of(log.assigned_to.as_ref()), 16),
                truncate(&log.action, 16),
                truncate(log.task_title(), 28),
                local_time(log.created_at)
            );
        }
    }

    pub fn print_notifications(&self, notes: &[PersistedNotification]) {
        if self.format == OutputFormat::Json {
            return self.print_json(notes);
        }
        let unread = notes.iter().filter(|n| !n.is_read).count();
        self.heading(&format!("Notifications ({unread} unread)"));
        if notes.is_empty() {
            println!("{}", self.paint(Colors::GRAY, "  No notifications yet"));
            return;
        }
        for note in notes {
            let marker = if note.is_read {
                " ".to_string()
            } else {
                self.paint(Colors::BRIGHT_MAGENTA, "●")
            };
            println!(
                "{} {:<24} {} {}",
                marker,
                note.id,
                self.paint(Colors::DIM, &local_time(note.created_at)),
                note.message
            );
        }
    }

    pub fn format_alert(&self, alert: &TransientAlert) -> String {
        let (color, tag) = match alert.kind {
            NotificationKind::Assigned => (Colors::BRIGHT_BLUE, "ASSIGNED"),
            NotificationKind::Updated => (Colors::BRIGHT_YELLOW, "UPDATED"),
            NotificationKind::Deleted => (Colors::RED, "DELETED"),
            NotificationKind::Other => (Colors::WHITE, "NOTICE"),
        };
        format!(
            "{} {}",
            self.paint(&format!("{}{}", Colors::BOLD, color), &format!("[{tag}]")),
            self.paint(Colors::WHITE, &alert.message)
        )
    }

    pub fn print_alert(&self, alert: &TransientAlert) {
        if self.format == OutputFormat::Json {
            return self.print_json(alert);
        }
        println!("{}", self.format_alert(alert));
    }
}
