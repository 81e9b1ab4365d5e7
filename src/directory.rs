//! Conversation directory
//!
//! Knows who the signed-in user may talk to and which conversation is
//! active:
//!
//! - advisors see students, students see advisors (their assigned advisor
//!   is the default counterpart), admins see nobody;
//! - containers are listed for advisors and students and looked up by pair
//!   before a new one is created;
//! - the active target comes from an explicit selection, a navigation
//!   location of the form `/advisor-chat/{id}`, or a default.
//!
//! Activation follows `Unselected -> Loading -> Ready`. Every transition to
//! `Loading` bumps a generation number; a load may only complete when its
//! generation is still the current one, so a slow fetch for a previous
//! target can never finish the current one.
//!
//! Listing failures do not fail the refresh. They are kept as a notice for
//! the presentation layer and the affected list is left empty.

use std::sync::Arc;

use crate::api::ApiClient;
use crate::error::{ChatError, Result};
use crate::models::{ChatBox, ChatBoxId, ConversationTarget, Role, User, UserId};
use crate::session::SessionContext;

/// Navigation prefix that embeds a container id.
pub const LOCATION_PREFIX: &str = "/advisor-chat/";

/// Activation state of the directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Unselected,
    Loading {
        target: ConversationTarget,
    },
    Ready {
        target: ConversationTarget,
        /// Non-fatal failure to surface, e.g. a history fetch error.
        notice: Option<String>,
    },
}

impl ConversationState {
    /// Target being loaded or shown.
    pub fn target(&self) -> Option<ConversationTarget> {
        match self {
            ConversationState::Unselected => None,
            ConversationState::Loading { target } | ConversationState::Ready { target, .. } => {
                Some(*target)
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ConversationState::Loading { .. })
    }
}

#[derive(Debug)]
pub struct ConversationDirectory {
    session: SessionContext,
    api: Arc<ApiClient>,
    counterparts: Vec<User>,
    containers: Vec<ChatBox>,
    default_counterpart: Option<UserId>,
    notice: Option<String>,
    state: ConversationState,
    generation: u64,
}

impl ConversationDirectory {
    pub fn new(session: SessionContext, api: Arc<ApiClient>) -> Self {
        Self {
            session,
            api,
            counterparts: Vec::new(),
            containers: Vec::new(),
            default_counterpart: None,
            notice: None,
            state: ConversationState::Unselected,
            generation: 0,
        }
    }

    /// Reload counterparts and containers for the signed-in user's role.
    ///
    /// # Errors
    ///
    /// Fails only when nobody is signed in. Listing failures are recorded in
    /// [`ConversationDirectory::notice`].
    pub async fn refresh(&mut self) -> Result<()> {
        let me = self.session.require_user().await?;
        self.notice = None;
        self.default_counterpart = None;

        let counterparts = match me.role {
            Role::Advisor => self.api.students().await,
            Role::Student => self.api.advisors().await,
            Role::Admin => Ok(Vec::new()),
        };
        self.counterparts = self.keep_or_notice("counterparts", counterparts);

        if me.role == Role::Student {
            match self.api.my_advisor().await {
                Ok(advisor) => self.default_counterpart = advisor.map(|a| a.user_id),
                Err(e) => self.record_notice("assigned advisor", &e),
            }
        }

        let containers = match me.role {
            Role::Admin => Ok(Vec::new()),
            _ => self.api.chat_boxes().await,
        };
        self.containers = self.keep_or_notice("conversations", containers);

        tracing::info!(
            role = %me.role,
            counterparts = self.counterparts.len(),
            containers = self.containers.len(),
            "Directory refreshed"
        );
        Ok(())
    }

    fn keep_or_notice<T>(&mut self, what: &str, result: Result<Vec<T>>) -> Vec<T> {
        result.unwrap_or_else(|e| {
            self.record_notice(what, &e);
            Vec::new()
        })
    }

    fn record_notice(&mut self, what: &str, error: &anyhow::Error) {
        tracing::warn!("Failed to load {}: {}", what, error);
        self.notice = Some(format!("Could not load {}: {}", what, error));
    }

    /// Students visible to an advisor.
    ///
    /// # Errors
    ///
    /// [`ChatError::PermissionDenied`] for any role other than advisor.
    pub async fn students_for_advisor(&self) -> Result<Vec<User>> {
        let me = self.session.require_user().await?;
        if me.role != Role::Advisor {
            return Err(ChatError::PermissionDenied(format!(
                "only advisors can list their students (signed in as {})",
                me.role
            ))
            .into());
        }
        self.api.students().await
    }

    /// Counterparts for the current role.
    pub fn counterparts(&self) -> &[User] {
        &self.counterparts
    }

    /// Conversation containers of the current user.
    pub fn containers(&self) -> &[ChatBox] {
        &self.containers
    }

    pub fn counterpart(&self, id: UserId) -> Option<&User> {
        self.counterparts.iter().find(|u| u.user_id == id)
    }

    pub fn container(&self, id: ChatBoxId) -> Option<&ChatBox> {
        self.containers.iter().find(|b| b.id == id)
    }

    /// A student's assigned advisor, once refreshed.
    pub fn default_counterpart(&self) -> Option<UserId> {
        self.default_counterpart
    }

    /// Last listing failure, if any.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Container id embedded in a navigation location.
    pub fn resolve_location(location: &str) -> Option<ChatBoxId> {
        let path = location.split(['?', '#']).next().unwrap_or_default();
        path.strip_prefix(LOCATION_PREFIX)?
            .trim_end_matches('/')
            .parse()
            .ok()
    }

    /// Which conversation should become active.
    ///
    /// An explicit selection wins. Otherwise: the container named in
    /// `location` if it is known, the first container, the assigned
    /// advisor, and finally the first counterpart.
    pub fn resolve_active(
        &self,
        selection: Option<ConversationTarget>,
        location: Option<&str>,
    ) -> Option<ConversationTarget> {
        if selection.is_some() {
            return selection;
        }
        if let Some(id) = location.and_then(Self::resolve_location) {
            if self.container(id).is_some() {
                return Some(ConversationTarget::Container(id));
            }
            tracing::debug!(chat_box = id, "Location names an unknown conversation");
        }
        if let Some(first) = self.containers.first() {
            return Some(ConversationTarget::Container(first.id));
        }
        self.default_counterpart
            .or_else(|| self.counterparts.first().map(|u| u.user_id))
            .map(ConversationTarget::Direct)
    }

    /// The counterpart behind `target` from `me`'s point of view.
    pub fn counterpart_of(&self, target: ConversationTarget, me: UserId) -> Option<UserId> {
        match target {
            ConversationTarget::Direct(user) => Some(user),
            ConversationTarget::Container(id) => self.container(id)?.partner_of(me),
        }
    }

    /// Like [`ConversationDirectory::counterpart_of`], but a container
    /// missing from the listing is fetched from the backend and cached.
    pub async fn resolve_counterpart(
        &mut self,
        target: ConversationTarget,
        me: UserId,
    ) -> Result<Option<UserId>> {
        let ConversationTarget::Container(id) = target else {
            return Ok(self.counterpart_of(target, me));
        };
        if self.container(id).is_none() {
            let fetched = self.api.chat_box(id).await?;
            tracing::debug!(chat_box = id, "Fetched conversation container");
            self.containers.push(fetched);
        }
        Ok(self.counterpart_of(target, me))
    }

    /// Display label for `target`.
    pub fn label(&self, target: ConversationTarget, me: UserId) -> String {
        match target {
            ConversationTarget::Direct(user) => self
                .counterpart(user)
                .map(User::display_label)
                .unwrap_or_else(|| format!("user #{}", user)),
            ConversationTarget::Container(id) => match self.container(id) {
                Some(chat_box) => chat_box.partner_label(me),
                None => format!("conversation #{}", id),
            },
        }
    }

    /// The container shared with `counterpart`, creating it if needed.
    ///
    /// Known containers are searched first, then the backend listing; only
    /// when neither has one for the pair is a new container created.
    /// Students create by advisor id alone; advisors name both sides.
    pub async fn ensure_container(&mut self, counterpart: UserId) -> Result<ChatBox> {
        let me = self.session.require_user().await?;

        if let Some(found) = self.find_pair(me.user_id, counterpart) {
            return Ok(found);
        }
        self.containers = self.api.chat_boxes().await?;
        if let Some(found) = self.find_pair(me.user_id, counterpart) {
            return Ok(found);
        }

        let created = match me.role {
            Role::Student => self.api.create_chat_box_with(counterpart).await?,
            Role::Advisor => self.api.create_chat_box(counterpart, me.user_id).await?,
            Role::Admin => {
                return Err(ChatError::PermissionDenied(
                    "admins do not take part in advising conversations".to_string(),
                )
                .into())
            }
        };
        tracing::info!(chat_box = created.id, counterpart, "Created conversation container");
        self.containers.push(created.clone());
        Ok(created)
    }

    fn find_pair(&self, me: UserId, counterpart: UserId) -> Option<ChatBox> {
        self.containers
            .iter()
            .find(|b| b.partner_of(me) == Some(counterpart))
            .cloned()
    }

    // -----------------------------------------------------------------------
    // Activation state machine
    // -----------------------------------------------------------------------

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Target being loaded or shown.
    pub fn active(&self) -> Option<ConversationTarget> {
        self.state.target()
    }

    /// Current activation generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Enter `Loading` for `target` and return its generation.
    pub fn begin_loading(&mut self, target: ConversationTarget) -> u64 {
        self.generation += 1;
        self.state = ConversationState::Loading { target };
        tracing::debug!(conversation = %target, generation = self.generation, "Loading conversation");
        self.generation
    }

    /// Whether `generation` is still the current activation.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.state.is_loading()
    }

    /// Complete the load started by `generation`.
    ///
    /// Returns `false` without changing state when a newer activation has
    /// started since.
    pub fn finish_loading(&mut self, generation: u64, notice: Option<String>) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        if let ConversationState::Loading { target } = self.state {
            self.state = ConversationState::Ready { target, notice };
        }
        true
    }

    /// Return to `Unselected`, invalidating any load in flight.
    pub fn deselect(&mut self) {
        self.generation += 1;
        self.state = ConversationState::Unselected;
    }

    /// Forget everything; used on sign-out.
    pub fn reset(&mut self) {
        self.deselect();
        self.counterparts.clear();
        self.containers.clear();
        self.default_counterpart = None;
        self.notice = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use chrono::Utc;

    fn directory() -> ConversationDirectory {
        let session = SessionContext::new();
        let api = Arc::new(ApiClient::new(&ServerConfig::default(), session.clone()).unwrap());
        ConversationDirectory::new(session, api)
    }

    fn chat_box(id: ChatBoxId, student: UserId, advisor: UserId) -> ChatBox {
        ChatBox {
            id,
            student_id: student,
            advisor_id: advisor,
            student: None,
            advisor: None,
            created_at: Utc::now(),
        }
    }

    fn user(id: UserId) -> User {
        User {
            user_id: id,
            username: format!("user{}", id),
            role: Role::Student,
            email: None,
            student_code: None,
            class_name: None,
            phone_number: None,
        }
    }

    #[test]
    fn test_resolve_location() {
        assert_eq!(ConversationDirectory::resolve_location("/advisor-chat/12"), Some(12));
        assert_eq!(ConversationDirectory::resolve_location("/advisor-chat/12/"), Some(12));
        assert_eq!(ConversationDirectory::resolve_location("/advisor-chat/12?tab=1"), Some(12));
        assert_eq!(ConversationDirectory::resolve_location("/advisor-chat/"), None);
        assert_eq!(ConversationDirectory::resolve_location("/advisor-chat/abc"), None);
        assert_eq!(ConversationDirectory::resolve_location("/students/12"), None);
    }

    #[test]
    fn test_resolve_active_precedence() {
        let mut dir = directory();
        assert_eq!(dir.resolve_active(None, None), None);

        dir.counterparts = vec![user(42), user(43)];
        assert_eq!(dir.resolve_active(None, None), Some(ConversationTarget::Direct(42)));

        dir.default_counterpart = Some(43);
        assert_eq!(dir.resolve_active(None, None), Some(ConversationTarget::Direct(43)));

        dir.containers = vec![chat_box(9, 42, 7), chat_box(12, 43, 7)];
        assert_eq!(dir.resolve_active(None, None), Some(ConversationTarget::Container(9)));
        assert_eq!(
            dir.resolve_active(None, Some("/advisor-chat/12")),
            Some(ConversationTarget::Container(12))
        );
        assert_eq!(
            dir.resolve_active(None, Some("/advisor-chat/99")),
            Some(ConversationTarget::Container(9))
        );
        assert_eq!(
            dir.resolve_active(Some(ConversationTarget::Direct(1)), Some("/advisor-chat/12")),
            Some(ConversationTarget::Direct(1))
        );
    }

    #[test]
    fn test_counterpart_of_container() {
        let mut dir = directory();
        dir.containers = vec![chat_box(9, 42, 7)];
        assert_eq!(dir.counterpart_of(ConversationTarget::Container(9), 7), Some(42));
        assert_eq!(dir.counterpart_of(ConversationTarget::Container(9), 42), Some(7));
        assert_eq!(dir.counterpart_of(ConversationTarget::Container(10), 7), None);
        assert_eq!(dir.counterpart_of(ConversationTarget::Direct(5), 7), Some(5));
    }

    #[test]
    fn test_loading_transitions() {
        let mut dir = directory();
        assert_eq!(dir.state(), &ConversationState::Unselected);

        let generation = dir.begin_loading(ConversationTarget::Direct(42));
        assert!(dir.state().is_loading());
        assert_eq!(dir.active(), Some(ConversationTarget::Direct(42)));

        assert!(dir.finish_loading(generation, None));
        assert_eq!(
            dir.state(),
            &ConversationState::Ready {
                target: ConversationTarget::Direct(42),
                notice: None
            }
        );
        // A completed load cannot complete twice.
        assert!(!dir.finish_loading(generation, Some("late".to_string())));
    }

    #[test]
    fn test_stale_generation_cannot_finish() {
        let mut dir = directory();
        let first = dir.begin_loading(ConversationTarget::Direct(42));
        let second = dir.begin_loading(ConversationTarget::Direct(7));

        assert!(!dir.finish_loading(first, None));
        assert!(dir.state().is_loading());
        assert_eq!(dir.active(), Some(ConversationTarget::Direct(7)));

        assert!(dir.finish_loading(second, Some("failed".to_string())));
        assert_eq!(
            dir.state(),
            &ConversationState::Ready {
                target: ConversationTarget::Direct(7),
                notice: Some("failed".to_string())
            }
        );
    }

    #[test]
    fn test_deselect_invalidates_in_flight_load() {
        let mut dir = directory();
        let generation = dir.begin_loading(ConversationTarget::Container(9));
        dir.deselect();
        assert!(!dir.finish_loading(generation, None));
        assert_eq!(dir.state(), &ConversationState::Unselected);
    }
}
