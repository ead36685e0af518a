use std::collections::{HashSet, VecDeque};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::query::{clean_query, Dimension, QueryTask};

/// Slot mix per deck: four action, four aesthetic, two identity.
const SLOT_MIX: [(Dimension, usize); 3] = [
    (Dimension::Action, 4),
    (Dimension::Aesthetic, 4),
    (Dimension::Identity, 2),
];

/// Query pools the scheduler draws from, one per dimension plus a fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPools {
    pub action: Vec<String>,
    pub aesthetic: Vec<String>,
    pub identity: Vec<String>,
    pub fallback: Vec<String>,
}

// =============================================================================
// SlotDeck
// =============================================================================

/// A shuffled deck of slot kinds. Refilled and reshuffled when empty, so any
/// run of whole decks has exactly the 4:4:2 mix.
pub struct SlotDeck {
    slots: VecDeque<Dimension>,
    rng: StdRng,
}

impl SlotDeck {
    pub fn new(rng: StdRng) -> Self {
        Self {
            slots: VecDeque::new(),
            rng,
        }
    }

    pub fn draw(&mut self) -> Dimension {
        if self.slots.is_empty() {
            self.refill();
        }
        self.slots.pop_front().unwrap_or(Dimension::Action)
    }

    fn refill(&mut self) {
        let mut deck: Vec<Dimension> = SLOT_MIX
            .iter()
            .flat_map(|&(dimension, count)| std::iter::repeat(dimension).take(count))
            .collect();
        deck.shuffle(&mut self.rng);
        self.slots.extend(deck);
    }
}

// =============================================================================
// QueryScheduler
// =============================================================================

#[derive(Debug, Default)]
struct Pool {
    terms: Vec<String>,
    cursor: usize,
}

impl Pool {
    fn new(raw: Vec<String>) -> Self {
        Self {
            terms: raw.iter().filter_map(|t| clean_query(t)).collect(),
            cursor: 0,
        }
    }

    /// Advance to the next term nobody has tried yet and claim it.
    fn next_untried(&mut self, tried: &mut HashSet<String>) -> Option<String> {
        while self.cursor < self.terms.len() {
            let term = &self.terms[self.cursor];
            self.cursor += 1;
            if tried.insert(term.to_lowercase()) {
                return Some(term.clone());
            }
        }
        None
    }

    fn remaining(&self) -> usize {
        self.terms.len().saturating_sub(self.cursor)
    }
}

/// Plans each round's probes. Owns the tried set, so a query string
/// (case-insensitive) is dispatched at most once per run.
pub struct QueryScheduler {
    action: Pool,
    aesthetic: Pool,
    identity: Pool,
    fallback: Pool,
    tried: HashSet<String>,
    deck: SlotDeck,
    slots_per_round: usize,
}

impl QueryScheduler {
    pub fn new(pools: QueryPools, slots_per_round: usize) -> Self {
        Self::with_rng(pools, slots_per_round, StdRng::from_os_rng())
    }

    /// Deterministic slot order, for tests and replays.
    pub fn seeded(pools: QueryPools, slots_per_round: usize, seed: u64) -> Self {
        Self::with_rng(pools, slots_per_round, StdRng::seed_from_u64(seed))
    }

    fn with_rng(pools: QueryPools, slots_per_round: usize, rng: StdRng) -> Self {
        Self {
            action: Pool::new(pools.action),
            aesthetic: Pool::new(pools.aesthetic),
            identity: Pool::new(pools.identity),
            fallback: Pool::new(pools.fallback),
            tried: HashSet::new(),
            deck: SlotDeck::new(rng),
            slots_per_round,
        }
    }

    /// Draw this round's slots and fill each with an untried query. A slot
    /// whose pool is dry takes a fallback term instead; a slot with nothing
    /// left anywhere is dropped. An empty plan means the run has run out of
    /// queries.
    pub fn plan_round(&mut self) -> Vec<QueryTask> {
        let mut plan = Vec::with_capacity(self.slots_per_round);

        for _ in 0..self.slots_per_round {
            let slot = self.deck.draw();
            let primary = match slot {
                Dimension::Action => self.action.next_untried(&mut self.tried),
                Dimension::Aesthetic => self.aesthetic.next_untried(&mut self.tried),
                Dimension::Identity => self.identity.next_untried(&mut self.tried),
                Dimension::Fallback => None,
            };

            match primary {
                Some(query) => plan.push(QueryTask::new(query, slot)),
                None => match self.fallback.next_untried(&mut self.tried) {
                    Some(query) => {
                        info!(slot = %slot, query = query.as_str(), "Primary pool exhausted, using fallback");
                        plan.push(QueryTask::degraded(query));
                    }
                    None => debug!(slot = %slot, "No untried queries left for slot"),
                },
            }
        }

        plan
    }

    pub fn was_tried(&self, query: &str) -> bool {
        self.tried.contains(&query.trim().to_lowercase())
    }

    pub fn tried_count(&self) -> usize {
        self.tried.len()
    }

    /// Terms not yet consumed across all pools.
    pub fn remaining(&self) -> usize {
        self.action.remaining()
            + self.aesthetic.remaining()
            + self.identity.remaining()
            + self.fallback.remaining()
    }
}
