/// file: src/types.rs
/// description: domain records exchanged with the Task Master backend and its push channel
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// Dates arrive either as full RFC 3339 timestamps or as bare form dates
mod flexible_datetime {
    use super::*;

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") => Ok(None),
            Some(s) => parse(s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {s}"))),
        }
    }
}

pub use flexible_datetime::parse as parse_date;

/// Capability level of an account.
///
/// Parsing user input is strict. A role the server sends that this client does
/// not know deserializes as [`Role::User`], the least privileged level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    Admin,
    Manager,
    User,
}

impl Role {
    /// Admins and managers may see every task, not just their own.
    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        value.parse().unwrap_or(Role::User)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated account, as returned by `/users/profile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "fullName")]
    pub display_name: String,
    pub email: String,
    pub role: Role,
}

/// Directory entries share the identity shape.
pub type User = Identity;

/// A user field that is either a bare id or an expanded user object.
///
/// Every task, log and push payload goes through this one normalization, so
/// callers never inspect the raw JSON shape themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UserRef {
    Reference(String),
    Expanded {
        #[serde(rename = "_id")]
        id: String,
        #[serde(rename = "fullName", skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUserRef {
    Id(String),
    Object {
        #[serde(rename = "_id", default)]
        id: Option<String>,
        #[serde(rename = "fullName", default)]
        full_name: Option<String>,
        #[serde(default)]
        role: Option<String>,
    },
}

impl<'de> Deserialize<'de> for UserRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawUserRef::deserialize(deserializer)? {
            RawUserRef::Id(id) => UserRef::Reference(id),
            RawUserRef::Object {
                id,
                full_name,
                role,
            } => UserRef::Expanded {
                id: id.unwrap_or_default(),
                display_name: full_name.filter(|n| !n.is_empty()),
                // An unrecognised role should not make the whole task unreadable
                role: role.and_then(|r| r.parse().ok()),
            },
        })
    }
}

impl UserRef {
    pub fn id(&self) -> &str {
        match self {
            UserRef::Reference(id) => id,
            UserRef::Expanded { id, .. } => id,
        }
    }

    /// The display name when expanded, otherwise the id.
    pub fn display_name(&self) -> &str {
        match self {
            UserRef::Reference(id) => id,
            UserRef::Expanded {
                id, display_name, ..
            } => display_name.as_deref().unwrap_or(id),
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            UserRef::Reference(_) => None,
            UserRef::Expanded { role, .. } => *role,
        }
    }

    /// "Amy (manager)", or just the name when the role is unknown.
    pub fn actor_label(&self) -> String {
        match self.role() {
            Some(role) => format!("{} ({})", self.display_name(), role),
            None => self.display_name().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "flexible_datetime::deserialize")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_to: Option<UserRef>,
    #[serde(default)]
    pub created_by: Option<UserRef>,
    #[serde(default, deserialize_with = "flexible_datetime::deserialize")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_datetime::deserialize")]
    pub completion_date: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == Some(TaskStatus::Completed)
    }

    /// Whether the task was assigned to or created by `user_id`.
    pub fn involves(&self, user_id: &str) -> bool {
        let matches = |r: &Option<UserRef>| r.as_ref().is_some_and(|u| u.id() == user_id);
        matches(&self.assigned_to) || matches(&self.created_by)
    }
}

/// Body of `POST /tasks`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub assigned_to: String,
}

/// Body of `PUT /tasks/:id`; only set fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.assigned_to.is_none()
    }
}

/// Body of `PUT /users/:id`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
    #[serde(rename = "fullName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct NewAccount {
    #[serde(rename = "fullName")]
    pub display_name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    pub user: Option<Identity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Assigned,
    Updated,
    Deleted,
    #[serde(other)]
    Other,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Assigned => "assigned",
            NotificationKind::Updated => "updated",
            NotificationKind::Deleted => "deleted",
            NotificationKind::Other => "other",
        }
    }
}

/// Backend-tracked notification with a durable read state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedNotification {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, deserialize_with = "flexible_datetime::deserialize")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Locally synthesized, self-expiring alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransientAlert {
    pub id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserCompletion {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "fullName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub completed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub total: u64,
    pub completed: u64,
    pub overdue: u64,
    pub per_user: Vec<UserCompletion>,
    pub tasks_assigned_by_person: u64,
    pub tasks_assigned_to_person: u64,
    pub given_task_pending: u64,
    pub your_task_pending: u64,
    pub tasks_completed_by_person: u64,
    pub tasks_assigned_by_others_and_completed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTitle {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub action: String,
    #[serde(rename = "task_id", default)]
    pub task: Option<TaskTitle>,
    #[serde(rename = "task_assigned_by", default)]
    pub assigned_by: Option<UserRef>,
    #[serde(rename = "task_assigned_to", default)]
    pub assigned_to: Option<UserRef>,
    #[serde(
        rename = "createdAt",
        default,
        deserialize_with = "flexible_datetime::deserialize"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl LogEntry {
    pub fn task_title(&self) -> &str {
        self.task
            .as_ref()
            .and_then(|t| t.title.as_deref())
            .unwrap_or("N/A")
    }
}

/// Push-channel topics the client listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    TaskAssigned,
    TaskUpdated,
    TaskDeleted,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::TaskAssigned, Topic::TaskUpdated, Topic::TaskDeleted];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::TaskAssigned => "task-assigned",
            Topic::TaskUpdated => "task-updated",
            Topic::TaskDeleted => "task-deleted",
        }
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown topic: {s}"))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskEventPayload {
    #[serde(default)]
    pub message: String,
    pub task: Task,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDeletedPayload {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub creator: Option<UserRef>,
}

/// A decoded server event.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Assigned(TaskEventPayload),
    Updated(TaskEventPayload),
    Deleted(TaskDeletedPayload),
}

impl PushEvent {
    pub fn decode(topic: Topic, data: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match topic {
            Topic::TaskAssigned => PushEvent::Assigned(serde_json::from_value(data)?),
            Topic::TaskUpdated => PushEvent::Updated(serde_json::from_value(data)?),
            Topic::TaskDeleted => PushEvent::Deleted(serde_json::from_value(data)?),
        })
    }

    pub fn topic(&self) -> Topic {
        match self {
            PushEvent::Assigned(_) => Topic::TaskAssigned,
            PushEvent::Updated(_) => Topic::TaskUpdated,
            PushEvent::Deleted(_) => Topic::TaskDeleted,
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self {
            PushEvent::Assigned(_) => NotificationKind::Assigned,
            PushEvent::Updated(_) => NotificationKind::Updated,
            PushEvent::Deleted(_) => NotificationKind::Deleted,
        }
    }

    /// Human-readable alert text, branching on the payload shape of each topic.
    pub fn describe(&self) -> String {
        let by = |actor: Option<&UserRef>| match actor {
            Some(actor) => format!(" by {}", actor.actor_label()),
            None => String::new(),
        };

        match self {
            PushEvent::Assigned(p) => {
                format!("\"{}\" assigned{}", p.task.title, by(p.task.created_by.as_ref()))
            }
            PushEvent::Updated(p) => {
                format!("\"{}\" updated{}", p.task.title, by(p.task.created_by.as_ref()))
            }
            PushEvent::Deleted(p) => format!("Task deleted{}", by(p.creator.as_ref())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_ref_normalizes_both_wire_shapes() {
        let bare: UserRef = serde_json::from_value(json!("u1")).unwrap();
        assert_eq!(bare, UserRef::Reference("u1".into()));
        assert_eq!(bare.display_name(), "u1");

        let expanded: UserRef =
            serde_json::from_value(json!({"_id": "u2", "fullName": "Amy", "role": "Manager"}))
                .unwrap();
        assert_eq!(expanded.id(), "u2");
        assert_eq!(expanded.display_name(), "Amy");
        assert_eq!(expanded.role(), Some(Role::Manager));
        assert_eq!(expanded.actor_label(), "Amy (manager)");
    }

    #[test]
    fn user_ref_without_name_falls_back_to_id() {
        let r: UserRef = serde_json::from_value(json!({"_id": "u3"})).unwrap();
        assert_eq!(r.display_name(), "u3");
        assert_eq!(r.actor_label(), "u3");
    }

    #[test]
    fn role_parses_case_insensitively() {
        let role: Role = serde_json::from_value(json!("ADMIN")).unwrap();
        assert_eq!(role, Role::Admin);
        assert!(role.is_elevated());
        assert!(!Role::User.is_elevated());
        assert_eq!(serde_json::to_value(Role::Manager).unwrap(), json!("manager"));
        assert!("guest".parse::<Role>().is_err());
    }

    #[test]
    fn unknown_server_values_do_not_fail_the_record() {
        let identity: Identity = serde_json::from_value(json!({
            "_id": "u9",
            "fullName": "Gus",
            "email": "gus@example.com",
            "role": "auditor"
        }))
        .unwrap();
        assert_eq!(identity.role, Role::User);
        assert!(!identity.role.is_elevated());

        let notes: Vec<PersistedNotification> = serde_json::from_value(json!([
            {"_id": "n1", "type": "assigned", "message": "a"},
            {"_id": "n2", "type": "commented", "message": "b", "isRead": true}
        ]))
        .unwrap();
        assert_eq!(notes[0].kind, NotificationKind::Assigned);
        assert_eq!(notes[1].kind, NotificationKind::Other);
        assert!(notes[1].is_read);
    }

    #[test]
    fn task_accepts_form_dates_and_mixed_refs() {
        let task: Task = serde_json::from_value(json!({
            "_id": "t1",
            "title": "Ship report",
            "status": "In Progress",
            "priority": "High",
            "dueDate": "2025-03-01",
            "assignedTo": "u1",
            "createdBy": {"_id": "u2", "fullName": "Amy"},
            "createdAt": "2025-02-01T10:00:00.000Z"
        }))
        .unwrap();

        assert_eq!(task.status, Some(TaskStatus::InProgress));
        assert_eq!(task.priority, Some(Priority::High));
        assert_eq!(task.due_date, parse_date("2025-03-01T00:00:00Z"));
        assert!(task.involves("u1"));
        assert!(task.involves("u2"));
        assert!(!task.involves("u9"));
    }

    #[test]
    fn assigned_event_describes_title_and_actor() {
        let event = PushEvent::decode(
            Topic::TaskAssigned,
            json!({
                "message": "New task",
                "task": {
                    "_id": "t1",
                    "title": "Ship report",
                    "createdBy": {"_id": "u2", "fullName": "Amy", "role": "manager"}
                }
            }),
        )
        .unwrap();

        assert_eq!(event.kind(), NotificationKind::Assigned);
        assert_eq!(event.describe(), "\"Ship report\" assigned by Amy (manager)");
    }

    #[test]
    fn deleted_event_uses_separate_creator() {
        let event = PushEvent::decode(
            Topic::TaskDeleted,
            json!({
                "message": "Task removed",
                "taskId": "t1",
                "creator": {"_id": "u2", "fullName": "Bo", "role": "admin"}
            }),
        )
        .unwrap();
        assert_eq!(event.describe(), "Task deleted by Bo (admin)");

        let anonymous =
            PushEvent::decode(Topic::TaskDeleted, json!({"message": "x", "taskId": "t1"}))
                .unwrap();
        assert_eq!(anonymous.describe(), "Task deleted");
    }

    #[test]
    fn topics_round_trip_through_names() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
        }
        assert!("task-archived".parse::<Topic>().is_err());
    }

    #[test]
    fn stats_default_missing_counters() {
        let stats: Stats = serde_json::from_value(json!({"total": 4, "completed": 1})).unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.overdue, 0);
        assert!(stats.per_user.is_empty());
    }

    #[test]
    fn log_entry_reads_populated_fields() {
        let entry: LogEntry = serde_json::from_value(json!({
            "_id": "l1",
            "action": "created",
            "task_id": {"title": "Ship report"},
            "task_assigned_by": {"_id": "u2", "fullName": "Amy"},
            "task_assigned_to": null,
            "createdAt": "2025-02-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(entry.task_title(), "Ship report");
        assert_eq!(entry.assigned_by.unwrap().display_name(), "Amy");
        assert!(entry.assigned_to.is_none());
    }
}
