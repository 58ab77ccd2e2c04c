use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use coffee_scheduler::ReminderQueue;
use coffee_types::{ChatAddress, Clock, InboundMessage, Member, MemberId, MenuToken, PairingScope, Reply};

use crate::cities;
use crate::error::{EngineError, EngineResult};
use crate::match_store::MatchStore;
use crate::orchestrator::{MatchingOrchestrator, RoundSummary};
use crate::registry::UserRegistry;
use crate::strings;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Handle allowed to trigger a matching round by chat.
    pub admin_handle: Option<String>,
    /// How long before the meeting the early reminder goes out.
    pub notify_before: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            admin_handle: None,
            notify_before: Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Stage {
    #[default]
    Idle,
    AwaitingCity,
    AwaitingMeetingTime,
}

#[derive(Debug, Default)]
struct MemberState {
    stage: Stage,
    last_menu: MenuToken,
}

/// Turns member messages into store updates, reminders and replies.
///
/// Conversation state lives in memory only. After a restart every member
/// starts over in `Idle` with the default menu.
pub struct Coordinator {
    users: Arc<dyn UserRegistry>,
    matches: Arc<dyn MatchStore>,
    queue: Arc<dyn ReminderQueue>,
    orchestrator: MatchingOrchestrator,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
    state: HashMap<MemberId, MemberState>,
}

impl Coordinator {
    pub fn new(
        users: Arc<dyn UserRegistry>,
        matches: Arc<dyn MatchStore>,
        queue: Arc<dyn ReminderQueue>,
        orchestrator: MatchingOrchestrator,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            users,
            matches,
            queue,
            orchestrator,
            clock,
            config,
            state: HashMap::new(),
        }
    }

    /// Answer a message. Failures are logged and the member gets a generic
    /// error reply.
    pub fn respond(&mut self, message: &InboundMessage) -> Vec<Reply> {
        match self.process_message(message) {
            Ok(replies) => replies,
            Err(e) => {
                error!("Failed to handle {:?} from member {}: {}", message.text, message.member_id, e);
                let menu = self.last_menu(message.member_id);
                vec![Reply::new(message.chat_address, strings::SOMETHING_WENT_WRONG, menu)]
            }
        }
    }

    pub fn process_message(&mut self, message: &InboundMessage) -> EngineResult<Vec<Reply>> {
        let id = message.member_id;
        let chat = message.chat_address;
        let text = message.text.trim();

        if message.handle.is_empty() {
            return Ok(vec![Reply::new(chat, strings::SORRY_NO_USERNAME, MenuToken::RemoveKeyboard)]);
        }

        if text == strings::START {
            self.state_mut(id).stage = Stage::AwaitingCity;
            return Ok(vec![Reply::new(chat, strings::GREETING_ASK_CITY, MenuToken::Cities)]);
        }

        if text == strings::MAKE_MATCHES && self.is_admin(&message.handle) {
            return Ok(vec![self.admin_round(id, chat)]);
        }

        if self.state_mut(id).stage == Stage::AwaitingCity {
            self.state_mut(id).stage = Stage::Idle;
            self.users.register(id, &message.handle, text, chat)?;
            let menu = self.set_menu(id, MenuToken::RemindStop);
            return Ok(vec![Reply::new(chat, strings::WELCOME, menu)]);
        }

        let Some(member) = self.users.get(id)? else {
            return Ok(vec![Reply::new(chat, strings::NOT_REGISTERED, MenuToken::RemoveKeyboard)]);
        };

        if !member.active && text != strings::ACTIVATE {
            self.state_mut(id).stage = Stage::Idle;
            let menu = self.set_menu(id, MenuToken::Activate);
            return Ok(vec![Reply::new(member.chat_address, strings::INACTIVE_USER, menu)]);
        }

        match text {
            strings::REMIND_ME => self.remind_me(&member),
            strings::CHANGE_TIME => self.change_time(&member),
            strings::STOP_MEETINGS => self.stop_meetings(&member),
            strings::ACTIVATE => self.activate(&member),
            strings::ANY_CITY => self.set_scope(&member, PairingScope::AnyCity),
            strings::ONLY_MY_CITY => self.set_scope(&member, PairingScope::Local),
            _ if self.state_mut(id).stage == Stage::AwaitingMeetingTime => {
                self.set_meeting_time(&member, text)
            }
            _ => {
                let menu = self.last_menu(id);
                Ok(vec![Reply::new(member.chat_address, strings::DEFAULT_REPLY, menu)])
            }
        }
    }

    /// Run a matching round and point every member it touched at the
    /// default menu.
    pub fn run_matching_round(&mut self, reminder_time: DateTime<Utc>) -> EngineResult<RoundSummary> {
        let summary = self.orchestrator.run_matching_round(reminder_time)?;
        for (first, second) in &summary.pairs {
            self.set_menu(first.id, MenuToken::RemindStop);
            self.set_menu(second.id, MenuToken::RemindStop);
        }
        if let Some(member) = &summary.unmatched {
            self.set_menu(member.id, MenuToken::RemindStop);
        }
        Ok(summary)
    }

    fn is_admin(&self, handle: &str) -> bool {
        self.config.admin_handle.as_deref() == Some(handle)
    }

    fn admin_round(&mut self, id: MemberId, chat: ChatAddress) -> Reply {
        let reminder_time = self.clock.now() + Duration::seconds(30);
        let text = match self.run_matching_round(reminder_time) {
            Ok(summary) => format!(
                "MakeMatches succeeded: cycle {}, {} pairs",
                summary.cycle,
                summary.pairs.len()
            ),
            Err(e) => {
                error!("Matching round requested by member {} failed: {}", id, e);
                format!("MakeMatches error: {}", e)
            }
        };
        Reply::new(chat, text, self.last_menu(id))
    }

    // -- Commands --

    fn remind_me(&mut self, member: &Member) -> EngineResult<Vec<Reply>> {
        let Some(current) = self.matches.find_current_match(member.id)? else {
            return Ok(self.no_meeting(member));
        };
        let partner = self.lookup(current.partner_id())?;

        match current.meeting_time {
            None => Ok(self.ask_meeting_time(member, &partner)),
            Some(time) => {
                let menu = self.set_menu(member.id, MenuToken::RemindChangeTimeStop);
                let text = match_message(member, &partner, time);
                Ok(vec![Reply::new(member.chat_address, text, menu)])
            }
        }
    }

    fn change_time(&mut self, member: &Member) -> EngineResult<Vec<Reply>> {
        let Some(current) = self.matches.find_current_match(member.id)? else {
            return Ok(self.no_meeting(member));
        };
        let partner = self.lookup(current.partner_id())?;
        Ok(self.ask_meeting_time(member, &partner))
    }

    fn set_meeting_time(&mut self, member: &Member, text: &str) -> EngineResult<Vec<Reply>> {
        self.state_mut(member.id).stage = Stage::Idle;

        let Some(current) = self.matches.find_current_match(member.id)? else {
            return Ok(self.no_meeting(member));
        };

        let now = self.clock.now();
        let Some(meeting_time) = cities::parse_local_time(text, &member.city, now) else {
            warn!("Could not parse meeting time {:?} from member {}", text, member.id);
            let menu = self.set_menu(member.id, MenuToken::RemindStop);
            return Ok(vec![Reply::new(member.chat_address, strings::COULD_NOT_PARSE_TIME, menu)]);
        };

        self.matches.update_meeting_time(member.id, meeting_time)?;
        let menu = self.set_menu(member.id, MenuToken::RemindChangeTimeStop);
        self.set_menu(current.partner_id(), MenuToken::RemindChangeTimeStop);

        if (meeting_time - now).num_seconds() <= 1 {
            return Ok(vec![Reply::new(member.chat_address, strings::TIME_IN_THE_PAST, menu)]);
        }

        let partner = self.lookup(current.partner_id())?;
        let own_text = match_message(member, &partner, meeting_time);
        let partner_text = match_message(&partner, member, meeting_time);

        self.queue.schedule(meeting_time, member.chat_address, &own_text)?;
        self.queue.schedule(meeting_time, partner.chat_address, &partner_text)?;

        let early = meeting_time - self.config.notify_before;
        if (early - now).num_minutes() >= 1 {
            self.queue.schedule(early, member.chat_address, &own_text)?;
            self.queue.schedule(early, partner.chat_address, &partner_text)?;
        }

        info!("Meeting of {} and {} set for {}", member.id, partner.id, meeting_time);
        Ok(vec![
            Reply::new(member.chat_address, own_text, menu),
            Reply::new(partner.chat_address, partner_text, MenuToken::RemindChangeTimeStop),
        ])
    }

    /// Opt out. A partner left with a meeting still ahead is offered a
    /// replacement; a meeting that already happened is closed quietly.
    fn stop_meetings(&mut self, member: &Member) -> EngineResult<Vec<Reply>> {
        self.users.set_active(member.id, false)?;
        let menu = self.set_menu(member.id, MenuToken::Activate);
        let mut replies = vec![Reply::new(member.chat_address, strings::MEETINGS_STOPPED, menu)];

        let Some(current) = self.matches.find_current_match(member.id)? else {
            return Ok(replies);
        };

        self.matches.break_match(member.id)?;
        if current.meeting_time.is_some_and(|t| t <= self.clock.now()) {
            info!("Closed past meeting of {} and {}", member.id, current.partner_id());
            return Ok(replies);
        }

        let partner = self.lookup(current.partner_id())?;
        replies.extend(self.replace_partner(&partner, member.id)?);
        Ok(replies)
    }

    /// Offer `partner` a new match after `leaving` dropped out. The break is
    /// already done; a failed replacement only changes the notice.
    fn replace_partner(&mut self, partner: &Member, leaving: MemberId) -> EngineResult<Vec<Reply>> {
        let menu = self.set_menu(partner.id, MenuToken::RemindStop);
        let candidate = self
            .orchestrator
            .find_unmatched_partner(&[partner.id, leaving], &partner.city)?;

        if let Some(candidate) = candidate {
            match self.matches.add_match(partner.id, candidate.id) {
                Ok(()) => {
                    info!("Replaced {} with {} for member {}", leaving, candidate.id, partner.id);
                    let mut replies = vec![Reply::new(partner.chat_address, strings::PARTNER_REFUSED, menu)];
                    replies.extend(self.announce_pair(partner, &candidate));
                    return Ok(replies);
                }
                Err(e) => warn!("Replacement for member {} failed: {}", partner.id, e),
            }
        }

        info!("No replacement found for member {}", partner.id);
        let text = format!("{}. {}", strings::PARTNER_REFUSED, strings::COULD_NOT_FIND_MATCH);
        Ok(vec![Reply::new(partner.chat_address, text, menu)])
    }

    fn activate(&mut self, member: &Member) -> EngineResult<Vec<Reply>> {
        if member.active {
            let menu = self.last_menu(member.id);
            return Ok(vec![Reply::new(member.chat_address, strings::ALREADY_ACTIVE, menu)]);
        }

        self.users.set_active(member.id, true)?;
        let menu = self.set_menu(member.id, MenuToken::RemindStop);
        let mut replies = vec![Reply::new(member.chat_address, strings::NOW_ACTIVE, menu)];

        // Before the first round there is nobody to join.
        if self.matches.current_cycle() == 0 || self.matches.find_current_match(member.id)?.is_some() {
            return Ok(replies);
        }

        if let Some(candidate) = self.orchestrator.find_unmatched_partner(&[member.id], &member.city)? {
            match self.matches.add_match(member.id, candidate.id) {
                Ok(()) => replies.extend(self.announce_pair(member, &candidate)),
                Err(e) => warn!("Pairing returning member {} failed: {}", member.id, e),
            }
        }
        Ok(replies)
    }

    fn set_scope(&mut self, member: &Member, scope: PairingScope) -> EngineResult<Vec<Reply>> {
        self.users.set_pairing_scope(member.id, scope)?;
        let text = match scope {
            PairingScope::AnyCity => strings::SCOPE_ANY_CITY,
            PairingScope::Local => strings::SCOPE_ONLY_MY_CITY,
        };
        let menu = self.last_menu(member.id);
        Ok(vec![Reply::new(member.chat_address, text, menu)])
    }

    // -- Helpers --

    fn ask_meeting_time(&mut self, member: &Member, partner: &Member) -> Vec<Reply> {
        self.state_mut(member.id).stage = Stage::AwaitingMeetingTime;
        let menu = self.set_menu(member.id, MenuToken::RemoveKeyboard);
        let known = cities::offset_for(&member.city).is_some();
        let text = strings::ask_meeting_time(&partner.handle, known);
        vec![Reply::new(member.chat_address, text, menu)]
    }

    fn no_meeting(&mut self, member: &Member) -> Vec<Reply> {
        let menu = self.set_menu(member.id, MenuToken::RemindStop);
        vec![Reply::new(member.chat_address, strings::NO_MEETINGS_THIS_WEEK, menu)]
    }

    fn announce_pair(&mut self, first: &Member, second: &Member) -> Vec<Reply> {
        let first_menu = self.set_menu(first.id, MenuToken::RemindStop);
        let second_menu = self.set_menu(second.id, MenuToken::RemindStop);
        vec![
            Reply::new(first.chat_address, strings::this_week_meeting(&second.handle), first_menu),
            Reply::new(second.chat_address, strings::this_week_meeting(&first.handle), second_menu),
        ]
    }

    fn lookup(&self, id: MemberId) -> EngineResult<Member> {
        self.users
            .get(id)?
            .ok_or_else(|| EngineError::NotFound(format!("member {}", id)))
    }

    fn state_mut(&mut self, id: MemberId) -> &mut MemberState {
        self.state.entry(id).or_default()
    }

    fn set_menu(&mut self, id: MemberId, menu: MenuToken) -> MenuToken {
        self.state_mut(id).last_menu = menu;
        menu
    }

    fn last_menu(&self, id: MemberId) -> MenuToken {
        self.state.get(&id).map(|s| s.last_menu).unwrap_or_default()
    }
}

/// The meeting as `member` should see it, in their city's time.
fn match_message(member: &Member, partner: &Member, time: DateTime<Utc>) -> String {
    let text = strings::meeting_with(&partner.handle, &cities::format_local(time, &member.city));
    if member.city != partner.city {
        format!("{} {}", strings::NO_MEETING_IN_YOUR_CITY, text)
    } else {
        text
    }
}
