use std::collections::{HashSet, VecDeque};

/// Whether a traversal still has work to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    Exploring,
    Done,
}

/// The set of known in-domain addresses for one crawl.
///
/// Every address lives in `to_visit`; at any time it is either pending, in
/// flight, or visited. `visited` and `in_flight` are disjoint subsets of
/// `to_visit`, and the crawl is complete once `visited == to_visit`.
///
/// Pending addresses wait in `pending` in discovery order. An address marked
/// visited while still queued is skipped when it reaches the front.
#[derive(Debug, Clone)]
pub struct Frontier {
    to_visit: HashSet<String>,
    visited: HashSet<String>,
    in_flight: HashSet<String>,
    pending: VecDeque<String>,
}

impl Frontier {
    pub fn new(seed: impl Into<String>) -> Self {
        let seed = seed.into();
        Self {
            to_visit: HashSet::from([seed.clone()]),
            visited: HashSet::new(),
            in_flight: HashSet::new(),
            pending: VecDeque::from([seed]),
        }
    }

    /// Add an address; returns `true` if it was not known before.
    pub fn discover(&mut self, address: impl Into<String>) -> bool {
        let address = address.into();
        if self.to_visit.contains(&address) {
            return false;
        }
        self.to_visit.insert(address.clone());
        self.pending.push_back(address);
        true
    }

    /// Claim the oldest pending address and move it in flight.
    pub fn claim_next(&mut self) -> Option<String> {
        while let Some(next) = self.pending.pop_front() {
            if self.visited.contains(&next) || self.in_flight.contains(&next) {
                continue;
            }
            self.in_flight.insert(next.clone());
            return Some(next);
        }
        None
    }

    /// Mark an address visited. Returns `false` if it was already visited.
    pub fn mark_visited(&mut self, address: &str) -> bool {
        self.in_flight.remove(address);
        if !self.to_visit.contains(address) {
            self.to_visit.insert(address.to_string());
        }
        self.visited.insert(address.to_string())
    }

    /// Release every in-flight claim, returning the released addresses.
    ///
    /// Released addresses go back to the front of the pending queue.
    pub fn drain_in_flight(&mut self) -> Vec<String> {
        let released: Vec<String> = self.in_flight.drain().collect();
        for address in &released {
            self.pending.push_front(address.clone());
        }
        released
    }

    pub fn has_pending(&self) -> bool {
        self.visited.len() + self.in_flight.len() < self.to_visit.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn state(&self) -> TraversalState {
        if self.visited.len() == self.to_visit.len() {
            TraversalState::Done
        } else {
            TraversalState::Exploring
        }
    }

    pub fn visited(&self) -> &HashSet<String> {
        &self.visited
    }

    pub fn known(&self) -> &HashSet<String> {
        &self.to_visit
    }

    pub fn into_visited(self) -> HashSet<String> {
        self.visited
    }
}
