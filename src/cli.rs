use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "task-master",
    about = "terminal client for the task master backend with a live notification feed",
    version
)]
pub struct Args {
    /// Backend REST base URL
    #[arg(
        long,
        env = "TASK_MASTER_API_BASE_URL",
        default_value = "http://localhost:5000/api"
    )]
    pub api_url: String,

    /// Push-channel (Socket.IO) server URL
    #[arg(
        long,
        env = "TASK_MASTER_SOCKET_URL",
        default_value = "ws://localhost:5000"
    )]
    pub socket_url: String,

    /// File holding the persisted access token
    #[arg(long, env = "TASK_MASTER_CREDENTIALS")]
    pub credentials_file: Option<String>,

    /// Hours a saved access token stays valid
    #[arg(long, default_value = "24")]
    pub credential_ttl_hours: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Enable metrics server
    #[arg(long)]
    pub metrics: bool,

    /// Metrics server port
    #[arg(long, default_value = "9090")]
    pub metrics_port: u16,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Reconnection delay in seconds
    #[arg(long, default_value = "2")]
    pub reconnect_delay: u64,

    /// Maximum number of reconnection attempts (0 for unlimited)
    #[arg(long, default_value = "0")]
    pub max_reconnects: u32,

    /// Seconds a live alert stays on screen
    #[arg(long, default_value = "10")]
    pub alert_dwell: u64,

    /// Output format: table, json
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Disable colored output (useful for piping to files)
    #[arg(long)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log in and persist the access token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Invalidate the session and forget the stored token
    Logout,
    /// Create a new account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "user")]
        role: String,
    },
    /// Show the current identity
    Whoami,
    /// List tasks
    Tasks {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        /// Due date filter (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
        /// Only tasks assigned to or created by me
        #[arg(long)]
        mine: bool,
        /// Sort key: created, due, priority, status, title
        #[arg(long, default_value = "created")]
        sort: String,
    },
    /// Show one task
    TaskShow { id: String },
    /// Create a task
    TaskCreate {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        due: Option<String>,
        #[arg(long, default_value = "Medium")]
        priority: String,
        #[arg(long, default_value = "Pending")]
        status: String,
        /// Id of the assignee
        #[arg(long)]
        assign_to: String,
    },
    /// Update a task
    TaskUpdate {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        assign_to: Option<String>,
    },
    /// Delete a task
    TaskDelete { id: String },
    /// List users
    Users,
    /// Update a user
    UserUpdate {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        role: Option<String>,
    },
    /// Delete a user with their tasks, logs and notifications
    UserDelete { id: String },
    /// Dashboard statistics for the current user
    Stats,
    /// Activity log
    Logs,
    /// Stored notifications
    Notifications,
    /// Mark one notification as read
    Read { id: String },
    /// Mark every unread notification as read
    ReadAll,
    /// Live screen: push alerts and notification badge
    Watch,
}
