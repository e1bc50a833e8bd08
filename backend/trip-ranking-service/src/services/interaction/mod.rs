// ============================================
// Interaction Index (交互索引)
// ============================================
//
// Bipartite user <-> trip relation over implicit feedback.
//
// - trip_to_users[t]: users who liked or saved t
// - user_to_trips[u]: trips u liked, saved, or owns
//
// Rebuilt from the corpus snapshot on every request; never updated in place.

use crate::models::Trip;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct InteractionIndex {
    trip_to_users: HashMap<String, HashSet<String>>,
    user_to_trips: HashMap<String, HashSet<String>>,
}

impl InteractionIndex {
    /// O(total interaction events)
    pub fn build(trips: &[Trip]) -> Self {
        let mut trip_to_users: HashMap<String, HashSet<String>> =
            HashMap::with_capacity(trips.len());
        let mut user_to_trips: HashMap<String, HashSet<String>> = HashMap::new();

        for trip in trips {
            let users = trip_to_users.entry(trip.id.clone()).or_default();

            for user in trip.likes.iter().chain(trip.saved_by.iter()) {
                if user.is_empty() {
                    continue;
                }
                users.insert(user.clone());
                user_to_trips
                    .entry(user.clone())
                    .or_default()
                    .insert(trip.id.clone());
            }

            if !trip.user_id.is_empty() {
                user_to_trips
                    .entry(trip.user_id.clone())
                    .or_default()
                    .insert(trip.id.clone());
            }
        }

        Self {
            trip_to_users,
            user_to_trips,
        }
    }

    pub fn users_of(&self, trip_id: &str) -> Option<&HashSet<String>> {
        self.trip_to_users.get(trip_id)
    }

    pub fn trips_of(&self, user_id: &str) -> Option<&HashSet<String>> {
        self.user_to_trips.get(user_id)
    }

    /// `|trip_to_users[t]|`, 0 for unknown trips
    pub fn trip_degree(&self, trip_id: &str) -> usize {
        self.trip_to_users.get(trip_id).map_or(0, HashSet::len)
    }

    /// `|user_to_trips[u]|`, 0 for unknown users
    pub fn user_degree(&self, user_id: &str) -> usize {
        self.user_to_trips.get(user_id).map_or(0, HashSet::len)
    }

    pub fn user_to_trips(&self) -> &HashMap<String, HashSet<String>> {
        &self.user_to_trips
    }
}

/// Trips the user liked or saved according to the corpus itself
pub fn infer_user_interactions(user_id: &str, trips: &[Trip]) -> HashSet<String> {
    trips
        .iter()
        .filter(|t| t.has_interaction_from(user_id))
        .map(|t| t.id.clone())
        .collect()
}
