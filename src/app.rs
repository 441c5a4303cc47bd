/// file: src/app.rs
/// description: command dispatch tying the session, REST client, push channel and live feed together
use crate::{
    api::ApiClient,
    cli::Command,
    config::Config,
    credentials::FileCredentialStore,
    error::ApiError,
    events::create_event_channel,
    feed::LiveFeed,
    formatter::Printer,
    manager::ChannelManager,
    session::{RouteDecision, SessionStore},
    tasks::{self, Scope, SortKey, TaskQuery},
    types::{Identity, NewAccount, NewTask, Priority, Role, TaskStatus, TaskUpdate, UserUpdate, parse_date},
    ui::UIController,
};
use anyhow::{Result, anyhow, bail};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

const ELEVATED: &[Role] = &[Role::Admin, Role::Manager];
const ADMIN_ONLY: &[Role] = &[Role::Admin];
const UI_DRAIN: Duration = Duration::from_millis(500);

fn parse_field<T>(raw: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse::<T>().map_err(|e| anyhow!(ApiError::validation(e)))
}

/// Form dates are checked locally and sent as typed.
fn check_date(raw: &str) -> Result<String> {
    if parse_date(raw).is_none() {
        bail!(ApiError::validation(format!("Invalid date: {raw}")));
    }
    Ok(raw.to_string())
}

enum WatchStep {
    Continue,
    Quit,
}

pub struct App {
    config: Config,
    session: SessionStore,
    printer: Printer,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let store = FileCredentialStore::new(config.credentials.path.clone(), config.credentials.ttl);
        let api = ApiClient::new(&config.api, Arc::new(store))?;
        let printer = Printer::new(config.output.format, config.output.colored);

        Ok(Self {
            session: SessionStore::new(Arc::new(api)),
            printer,
            config,
        })
    }

    fn api(&self) -> &Arc<ApiClient> {
        self.session.api()
    }

    pub fn printer(&self) -> &Printer {
        &self.printer
    }

    /// Restores the session and applies the access check of a command.
    async fn require(&self, allowed: Option<&[Role]>) -> Result<Identity> {
        self.session.restore().await;

        match self.session.guard(allowed) {
            RouteDecision::Allow => self
                .session
                .current_identity()
                .ok_or_else(|| anyhow!("Not logged in")),
            RouteDecision::Wait => bail!("Session is still loading"),
            RouteDecision::RedirectToLogin => {
                bail!("Not logged in. Run `task-master login` first.")
            }
            RouteDecision::RedirectToDashboard => {
                bail!("Your role is not allowed to do that. Try `task-master stats`.")
            }
        }
    }

    pub async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::Login { email, password } => {
                let identity = self.session.login(&email, &password).await?;
                self.printer.print_message(&format!("Welcome, {}", identity.display_name));
            }
            Command::Logout => {
                self.session.logout().await;
                self.printer.print_message("Logged out");
            }
            Command::Register {
                name,
                email,
                password,
                role,
            } => {
                let account = NewAccount {
                    display_name: name,
                    email,
                    password,
                    role: parse_field(&role)?,
                };
                self.session.register(&account).await?;
                self.printer
                    .print_message("Account created. Log in with `task-master login`.");
            }
            Command::Whoami => {
                let identity = self.require(None).await?;
                self.printer.print_identity(&identity);
            }
            Command::Tasks {
                search,
                status,
                priority,
                due,
                mine,
                sort,
            } => {
                let viewer = self.require(None).await?;
                let key: SortKey = parse_field(&sort)?;
                let query = TaskQuery {
                    search,
                    status: status.as_deref().map(parse_field::<TaskStatus>).transpose()?.map(|s| s.to_string()),
                    priority: priority.as_deref().map(parse_field::<Priority>).transpose()?.map(|p| p.to_string()),
                    due_date: due.as_deref().map(check_date).transpose()?,
                };
                let scope = if mine { Scope::Mine } else { Scope::All };

                let listed = self.api().list_tasks(&query).await?;
                let tasks = tasks::arrange(listed, &viewer, scope, key);
                self.printer.print_tasks(&tasks);
            }
            Command::TaskShow { id } => {
                self.require(None).await?;
                let task = self.api().get_task(&id).await?;
                self.printer.print_task(&task);
            }
            Command::TaskCreate {
                title,
                description,
                due,
                priority,
                status,
                assign_to,
            } => {
                self.require(None).await?;
                tasks::require_title(&title)?;
                let users = self.api().list_users().await?;
                let assignee = tasks::validate_assignee(&users, &assign_to)?;

                let task = NewTask {
                    title,
                    description,
                    due_date: due.as_deref().map(check_date).transpose()?,
                    priority: parse_field(&priority)?,
                    status: parse_field(&status)?,
                    assigned_to: assignee.id.clone(),
                };
                self.api().create_task(&task).await?;
                self.printer
                    .print_message(&format!("Task created and assigned to {}", assignee.display_name));
            }
            Command::TaskUpdate {
                id,
                title,
                description,
                due,
                priority,
                status,
                assign_to,
            } => {
                self.require(None).await?;
                if let Some(title) = &title {
                    tasks::require_title(title)?;
                }
                if let Some(assignee) = &assign_to {
                    let users = self.api().list_users().await?;
                    tasks::validate_assignee(&users, assignee)?;
                }

                let update = TaskUpdate {
                    title,
                    description,
                    due_date: due.as_deref().map(check_date).transpose()?,
                    priority: priority.as_deref().map(parse_field).transpose()?,
                    status: status.as_deref().map(parse_field).transpose()?,
                    assigned_to: assign_to,
                };
                if update.is_empty() {
                    bail!(ApiError::validation("Nothing to update."));
                }
                self.api().update_task(&id, &update).await?;
                self.printer.print_message("Task updated");
            }
            Command::TaskDelete { id } => {
                self.require(Some(ELEVATED)).await?;
                self.api().delete_task(&id).await?;
                self.printer.print_message("Task deleted");
            }
            Command::Users => {
                let viewer = self.require(None).await?;
                let users = self.api().list_users().await?;
                self.printer.print_users(&users, Some(&viewer));
            }
            Command::UserUpdate {
                id,
                name,
                email,
                role,
            } => {
                self.require(Some(ADMIN_ONLY)).await?;
                let update = UserUpdate {
                    display_name: name,
                    email,
                    role: role.as_deref().map(parse_field).transpose()?,
                };
                self.api().update_user(&id, &update).await?;
                self.printer.print_message("User updated");
            }
            Command::UserDelete { id } => {
                self.require(Some(ADMIN_ONLY)).await?;
                self.api().delete_user(&id).await?;
                self.printer.print_message("User deleted");
            }
            Command::Stats => {
                let viewer = self.require(None).await?;
                let stats = self.api().stats(&viewer.id).await?;
                self.printer.print_stats(&stats, &viewer);
            }
            Command::Logs => {
                let viewer = self.require(None).await?;
                let logs = self.api().logs(&viewer).await?;
                self.printer.print_logs(&logs);
            }
            Command::Notifications => {
                self.require(None).await?;
                let notes = self.api().notifications().await?;
                self.printer.print_notifications(&notes);
            }
            Command::Read { id } => {
                self.require(None).await?;
                let feed = self.detached_feed();
                feed.mark_as_read(&id).await?;
                self.printer.print_message("Marked as read");
            }
            Command::ReadAll => {
                self.require(None).await?;
                let feed = self.detached_feed();
                feed.load().await?;
                let count = feed.mark_all_as_read().await?;
                self.printer
                    .print_message(&format!("Marked {count} notifications as read"));
            }
            Command::Watch => {
                let viewer = self.require(None).await?;
                self.watch(viewer).await?;
            }
        }

        Ok(())
    }

    // A feed with nobody listening to its events, for one-shot commands
    fn detached_feed(&self) -> LiveFeed<ApiClient> {
        let (events, _) = create_event_channel();
        LiveFeed::new(self.api().clone(), self.config.feed.alert_dwell, events)
    }

    /// The live screen: push alerts, unread badge and stdin commands until `quit` or ctrl-c.
    async fn watch(&self, viewer: Identity) -> Result<()> {
        let (events, receiver) = create_event_channel();
        let api = self.api().clone();

        let manager = Arc::new(ChannelManager::new(self.config.channel.clone(), events.clone()));
        let channel = manager.attach(&viewer, api.access_token()).await;

        // Logging out elsewhere in the process closes the channel
        let follower = {
            let manager = manager.clone();
            let session = self.session.subscribe();
            let api = api.clone();
            tokio::spawn(async move { manager.follow(session, move || api.access_token()).await })
        };

        let feed = LiveFeed::new(api, self.config.feed.alert_dwell, events);
        feed.bind(&channel);

        let mut ui = UIController::new(
            receiver,
            self.config.output.format,
            self.config.output.colored,
            viewer,
        );
        let ui_task = tokio::spawn(async move { ui.run().await });

        if let Err(e) = feed.load().await {
            self.printer.print_error(&e.message());
        }

        info!("Live screen running. Press Ctrl+C to quit...");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let outcome = loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break Ok(()),
                line = lines.next_line() => match line {
                    Ok(Some(line)) => match self.watch_command(&feed, line.trim()).await {
                        Ok(WatchStep::Continue) => {}
                        Ok(WatchStep::Quit) => break Ok(()),
                        Err(e) if e.requires_login() => {
                            self.session.invalidate();
                            break Err(e);
                        }
                        Err(e) => self.printer.print_error(&e.message()),
                    },
                    Ok(None) => break Ok(()),
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break Ok(());
                    }
                },
            }
        };

        feed.teardown(&channel);
        follower.abort();
        manager.detach().await;
        drop(channel);
        drop(feed);
        drop(manager);

        // Alert timers still hold senders; give the UI a moment to print what is queued
        if tokio::time::timeout(UI_DRAIN, ui_task).await.is_err() {
            debug!("UI still draining, leaving it behind");
        }

        outcome.map_err(Into::into)
    }

    async fn watch_command(
        &self,
        feed: &LiveFeed<ApiClient>,
        line: &str,
    ) -> Result<WatchStep, ApiError> {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (None, _) => {}
            (Some("quit" | "exit" | "q"), _) => return Ok(WatchStep::Quit),
            (Some("list" | "ls"), _) => {
                for alert in feed.transient() {
                    self.printer.print_alert(&alert);
                }
                self.printer.print_notifications(&feed.persisted());
            }
            (Some("read"), Some(id)) => {
                feed.mark_as_read(id).await?;
                self.printer.print_message(&format!("{id} marked as read"));
            }
            (Some("read-all"), _) => {
                let count = feed.mark_all_as_read().await?;
                self.printer
                    .print_message(&format!("Marked {count} notifications as read"));
            }
            _ => self
                .printer
                .print_error("commands: list | read <id> | read-all | quit"),
        }
        Ok(WatchStep::Continue)
    }
}
