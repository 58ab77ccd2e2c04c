use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use tracing::{info, warn};

use coffee_scheduler::ReminderQueue;
use coffee_types::{Member, MemberId, PairingScope};

use crate::error::EngineResult;
use crate::match_store::MatchStore;
use crate::registry::UserRegistry;
use crate::strings;

/// What one matching round produced.
#[derive(Debug, Clone, Default)]
pub struct RoundSummary {
    pub cycle: i64,
    pub pairs: Vec<(Member, Member)>,
    /// The odd member left over after every pool was paired.
    pub unmatched: Option<Member>,
}

/// Runs the weekly pairing of active members.
pub struct MatchingOrchestrator {
    users: Arc<dyn UserRegistry>,
    matches: Arc<dyn MatchStore>,
    queue: Arc<dyn ReminderQueue>,
    rng: StdRng,
}

impl MatchingOrchestrator {
    pub fn new(
        users: Arc<dyn UserRegistry>,
        matches: Arc<dyn MatchStore>,
        queue: Arc<dyn ReminderQueue>,
    ) -> Self {
        Self::with_rng(users, matches, queue, StdRng::from_os_rng())
    }

    /// Deterministic shuffles, for tests and replays.
    pub fn with_seed(
        users: Arc<dyn UserRegistry>,
        matches: Arc<dyn MatchStore>,
        queue: Arc<dyn ReminderQueue>,
        seed: u64,
    ) -> Self {
        Self::with_rng(users, matches, queue, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        users: Arc<dyn UserRegistry>,
        matches: Arc<dyn MatchStore>,
        queue: Arc<dyn ReminderQueue>,
        rng: StdRng,
    ) -> Self {
        Self { users, matches, queue, rng }
    }

    /// Pair every active member for a new cycle.
    ///
    /// Members are shuffled, then paired inside their city. Whoever is left
    /// over, together with every `AnyCity` member, is shuffled again and
    /// paired across cities. Announcements are scheduled for `reminder_time`.
    /// A store error aborts the round; pairs written before it stay.
    pub fn run_matching_round(&mut self, reminder_time: DateTime<Utc>) -> EngineResult<RoundSummary> {
        info!("Starting matching round, announcements at {}", reminder_time);

        let mut members = self.users.list_active()?;
        members.shuffle(&mut self.rng);

        let mut cities: BTreeMap<String, Vec<Member>> = BTreeMap::new();
        let mut leftovers = Vec::new();
        for member in members {
            match member.pairing_scope {
                PairingScope::AnyCity => leftovers.push(member),
                PairingScope::Local => cities.entry(member.city.clone()).or_default().push(member),
            }
        }

        let mut summary = RoundSummary {
            cycle: self.matches.advance_cycle(),
            ..Default::default()
        };

        for (city, mut group) in cities {
            if group.len() % 2 == 1 {
                if let Some(odd) = group.pop() {
                    leftovers.push(odd);
                }
            }
            info!("Pairing {} members in {}", group.len(), city);
            self.pair_in_order(group, reminder_time, &mut summary)?;
        }

        leftovers.shuffle(&mut self.rng);
        if leftovers.len() % 2 == 1 {
            summary.unmatched = leftovers.pop();
        }
        info!("Pairing {} members across cities", leftovers.len());
        self.pair_in_order(leftovers, reminder_time, &mut summary)?;

        if let Some(member) = &summary.unmatched {
            warn!("No partner for member {} in cycle {}", member.id, summary.cycle);
            self.queue
                .schedule(reminder_time, member.chat_address, strings::COULD_NOT_FIND_MATCH)?;
        }

        info!(
            "Matching round done: cycle {}, {} pairs, {} unmatched",
            summary.cycle,
            summary.pairs.len(),
            usize::from(summary.unmatched.is_some())
        );
        Ok(summary)
    }

    /// Pair consecutive members and schedule both announcements.
    fn pair_in_order(
        &self,
        members: Vec<Member>,
        reminder_time: DateTime<Utc>,
        summary: &mut RoundSummary,
    ) -> EngineResult<()> {
        let mut members = members.into_iter();
        while let (Some(first), Some(second)) = (members.next(), members.next()) {
            self.matches.add_match(first.id, second.id)?;
            self.queue.schedule(
                reminder_time,
                first.chat_address,
                &strings::this_week_meeting(&second.handle),
            )?;
            self.queue.schedule(
                reminder_time,
                second.chat_address,
                &strings::this_week_meeting(&first.handle),
            )?;
            summary.pairs.push((first, second));
        }
        Ok(())
    }

    /// A random active member without a live match this cycle, preferring
    /// members from `preferred_city`.
    pub fn find_unmatched_partner(
        &mut self,
        exclude: &[MemberId],
        preferred_city: &str,
    ) -> EngineResult<Option<Member>> {
        let matched = self.matches.all_matched_user_ids()?;
        let candidates: Vec<Member> = self
            .users
            .list_active()?
            .into_iter()
            .filter(|m| !matched.contains(&m.id) && !exclude.contains(&m.id))
            .collect();

        let local: Vec<&Member> = candidates.iter().filter(|m| m.city == preferred_city).collect();
        let picked = match local.choose(&mut self.rng) {
            Some(member) => Some((*member).clone()),
            None => candidates.choose(&mut self.rng).cloned(),
        };
        Ok(picked)
    }
}
