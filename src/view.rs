//! Presentation projection
//!
//! Turns the store, directory and reconciler into a [`ConversationView`]:
//! messages grouped by local date under "Today" / "Yesterday" /
//! `dd/mm/yyyy` headers, times as `HH:MM`, and a read tick on the user's own
//! messages once the counterpart has read them. The terminal renderer is
//! a thin layer over that model.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use colored::Colorize;

use crate::directory::{ConversationDirectory, ConversationState};
use crate::models::{ConversationTarget, Message, MessageId, UserId};
use crate::reconciler::ReadStateReconciler;
use crate::store::MessageStore;

/// One rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLine {
    pub id: MessageId,
    pub time: String,
    pub sender: String,
    pub content: String,
    pub own: bool,
    pub read: bool,
}

/// Messages of one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub label: String,
    pub lines: Vec<MessageLine>,
}

/// Everything the terminal needs to draw the active conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationView {
    pub target: Option<ConversationTarget>,
    pub title: String,
    pub loading: bool,
    pub notice: Option<String>,
    pub groups: Vec<DayGroup>,
    /// Unread messages waiting in other conversations.
    pub unread_elsewhere: u32,
}

/// Header label for `date` relative to `today`.
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(date) {
        "Yesterday".to_string()
    } else {
        date.format("%d/%m/%Y").to_string()
    }
}

/// `HH:MM` of `at` in `tz`.
pub fn format_time<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.with_timezone(tz).format("%H:%M").to_string()
}

impl ConversationView {
    /// Build the view in local time.
    pub fn from_parts(
        store: &MessageStore,
        directory: &ConversationDirectory,
        reconciler: &ReadStateReconciler,
        me: UserId,
    ) -> Self {
        Self::from_parts_in(
            &Local,
            Local::now().date_naive(),
            store,
            directory,
            reconciler,
            me,
        )
    }

    /// Build the view in `tz`, labelling days relative to `today`.
    pub fn from_parts_in<Tz: TimeZone>(
        tz: &Tz,
        today: NaiveDate,
        store: &MessageStore,
        directory: &ConversationDirectory,
        reconciler: &ReadStateReconciler,
        me: UserId,
    ) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let (target, loading, notice) = match directory.state() {
            ConversationState::Unselected => (None, false, None),
            ConversationState::Loading { target } => (Some(*target), true, None),
            ConversationState::Ready { target, notice } => (Some(*target), false, notice.clone()),
        };
        let notice = notice.or_else(|| directory.notice().map(str::to_string));

        let title = match target {
            Some(target) => directory.label(target, me),
            None => "No conversation selected".to_string(),
        };

        let groups = store
            .grouped_by_date_in(tz)
            .into_iter()
            .map(|group| DayGroup {
                date: group.date,
                label: day_label(group.date, today),
                lines: group
                    .messages
                    .into_iter()
                    .map(|m| line_in(m, me, tz))
                    .collect(),
            })
            .collect();

        let active_counterpart = target.and_then(|t| directory.counterpart_of(t, me));
        let unread_elsewhere = reconciler
            .counts()
            .iter()
            .filter(|(counterpart, _)| Some(**counterpart) != active_counterpart)
            .map(|(_, count)| *count)
            .sum();

        Self {
            target,
            title,
            loading,
            notice,
            groups,
            unread_elsewhere,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Render for a terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n", self.title.bold()));

        if let Some(notice) = &self.notice {
            out.push_str(&format!("{}\n", notice.yellow()));
        }
        if self.loading {
            out.push_str(&format!("{}\n", "Loading...".dimmed()));
            return out;
        }
        if self.groups.is_empty() {
            out.push_str(&format!("{}\n", "No messages yet.".dimmed()));
        }

        for group in &self.groups {
            out.push_str(&format!("\n{}\n", format!("-- {} --", group.label).dimmed()));
            for l in &group.lines {
                out.push_str(&render_line(l));
                out.push('\n');
            }
        }

        if self.unread_elsewhere > 0 {
            out.push_str(&format!(
                "\n{}\n",
                format!("{} unread in other conversations", self.unread_elsewhere).cyan()
            ));
        }
        out
    }
}

/// Presentation line for `message` in local time.
pub fn message_line(message: &Message, me: UserId) -> MessageLine {
    line_in(message, me, &Local)
}

fn line_in<Tz: TimeZone>(message: &Message, me: UserId, tz: &Tz) -> MessageLine
where
    Tz::Offset: std::fmt::Display,
{
    let own = message.is_from(me);
    MessageLine {
        id: message.id,
        time: format_time(message.created_at, tz),
        sender: if own {
            "You".to_string()
        } else {
            message.sender.username.clone()
        },
        content: message.content.clone(),
        own,
        read: message.is_read,
    }
}

/// One message line for a terminal.
pub fn render_line(line: &MessageLine) -> String {
    let time = format!("[{}]", line.time).dimmed();
    if line.own {
        let tick = if line.read { " \u{2713}" } else { "" };
        format!("{} {}: {}{}", time, line.sender.green().bold(), line.content, tick.green())
    } else {
        format!("{} {}: {}", time, line.sender.cyan().bold(), line.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::config::ServerConfig;
    use crate::models::{Participant, Role};
    use crate::session::SessionContext;
    use std::sync::Arc;

    const ME: UserId = 7;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn message(id: MessageId, from: UserId, at: &str, is_read: bool) -> Message {
        Message {
            id,
            content: format!("text {}", id),
            sender: Participant {
                user_id: from,
                username: if from == ME { "binh" } else { "an" }.to_string(),
                role: if from == ME { Role::Advisor } else { Role::Student },
            },
            receiver: None,
            is_read,
            created_at: DateTime::parse_from_rfc3339(at).unwrap().with_timezone(&Utc),
            chat_box_id: None,
        }
    }

    fn directory() -> ConversationDirectory {
        let session = SessionContext::new();
        let api = Arc::new(ApiClient::new(&ServerConfig::default(), session.clone()).unwrap());
        ConversationDirectory::new(session, api)
    }

    #[test]
    fn test_day_labels() {
        let today = date(2024, 3, 2);
        assert_eq!(day_label(today, today), "Today");
        assert_eq!(day_label(date(2024, 3, 1), today), "Yesterday");
        assert_eq!(day_label(date(2024, 2, 29), today), "29/02/2024");
        assert_eq!(day_label(date(2024, 3, 3), today), "03/03/2024");
    }

    #[test]
    fn test_format_time_uses_timezone() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T08:05:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_time(at, &Utc), "08:05");
        let plus7 = chrono::FixedOffset::east_opt(7 * 3600).unwrap();
        assert_eq!(format_time(at, &plus7), "15:05");
    }

    #[test]
    fn test_view_groups_and_marks_own_messages() {
        let mut store = MessageStore::new();
        store.append(message(1, 42, "2024-03-01T08:00:00Z", true));
        store.append(message(2, ME, "2024-03-01T08:01:00Z", true));
        store.append(message(3, ME, "2024-03-02T09:00:00Z", false));

        let mut dir = directory();
        let generation = dir.begin_loading(ConversationTarget::Direct(42));
        dir.finish_loading(generation, None);

        let view = ConversationView::from_parts_in(
            &Utc,
            date(2024, 3, 2),
            &store,
            &dir,
            &ReadStateReconciler::new(),
            ME,
        );

        assert_eq!(view.target, Some(ConversationTarget::Direct(42)));
        assert_eq!(view.title, "user #42");
        assert!(!view.loading);
        assert_eq!(view.groups.len(), 2);
        assert_eq!(view.groups[0].label, "Yesterday");
        assert_eq!(view.groups[1].label, "Today");

        let own = &view.groups[0].lines[1];
        assert!(own.own && own.read);
        assert_eq!(own.sender, "You");
        assert_eq!(view.groups[0].lines[0].sender, "an");
        assert_eq!(view.groups[1].lines[0].time, "09:00");
    }

    #[test]
    fn test_view_counts_unread_elsewhere_and_notice() {
        let mut reconciler = ReadStateReconciler::new();
        reconciler.record_arrival(&message(10, 42, "2024-03-01T08:00:00Z", false), ME);
        reconciler.record_arrival(&message(11, 43, "2024-03-01T08:00:00Z", false), ME);

        let mut dir = directory();
        let generation = dir.begin_loading(ConversationTarget::Direct(42));
        dir.finish_loading(generation, Some("Could not load conversation".to_string()));

        let view = ConversationView::from_parts_in(
            &Utc,
            date(2024, 3, 2),
            &MessageStore::new(),
            &dir,
            &reconciler,
            ME,
        );
        assert_eq!(view.unread_elsewhere, 1);
        assert_eq!(view.notice.as_deref(), Some("Could not load conversation"));
        assert!(view.is_empty());
        assert!(view.render().contains("No messages yet."));
    }

    #[test]
    fn test_render_shows_tick_only_on_read_own_messages() {
        colored::control::set_override(false);
        let mut l = MessageLine {
            id: 1,
            time: "08:00".to_string(),
            sender: "You".to_string(),
            content: "Hi".to_string(),
            own: true,
            read: true,
        };
        assert_eq!(render_line(&l), "[08:00] You: Hi \u{2713}");
        l.read = false;
        assert_eq!(render_line(&l), "[08:00] You: Hi");
        l.own = false;
        l.read = true;
        l.sender = "an".to_string();
        assert_eq!(render_line(&l), "[08:00] an: Hi");
    }
}
