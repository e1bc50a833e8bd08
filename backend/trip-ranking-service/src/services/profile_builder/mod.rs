// ============================================
// User Profile Builder (用戶畫像構建器)
// ============================================
//
// Builds the request-scoped preference profile from a stored user record
// and the trip corpus snapshot:
//
// - likedTripsIds: trips whose `likes` contain the user
// - savedTripsIds: from the record
// - tags / recentDestinations: counts over the user's own trips
// - avgBudget: median of the user's own positive trip budgets
//
// Stored preferences ride along unchanged and only act as fallbacks.

use crate::models::{RawWeights, Trip, UserProfile, UserRecord};
use std::collections::HashMap;
use tracing::debug;

pub fn build_profile(user: &UserRecord, trips: &[Trip]) -> UserProfile {
    let liked: Vec<String> = trips
        .iter()
        .filter(|t| t.likes.iter().any(|u| u == &user.id))
        .map(|t| t.id.clone())
        .collect();

    let mut tag_counts: HashMap<String, f64> = HashMap::new();
    let mut destination_counts: HashMap<String, f64> = HashMap::new();
    let mut budgets: Vec<f64> = Vec::new();

    for trip in trips.iter().filter(|t| t.is_owned_by(&user.id)) {
        for tag in trip.tags.iter().filter(|t| !t.is_empty()) {
            *tag_counts.entry(tag.clone()).or_insert(0.0) += 1.0;
        }
        if let Some(destination) = trip.destination() {
            *destination_counts
                .entry(destination.to_string())
                .or_insert(0.0) += 1.0;
        }
        if let Some(budget) = trip.budget() {
            budgets.push(budget);
        }
    }

    debug!(
        user_id = %user.id,
        liked = liked.len(),
        own_tags = tag_counts.len(),
        own_budgets = budgets.len(),
        "Built preference profile"
    );

    let favorite_destinations = user
        .preferences
        .as_ref()
        .and_then(|p| p.favorite_destinations.clone());

    UserProfile {
        user_id: user.id.clone(),
        liked_trips_ids: Some(liked),
        saved_trips_ids: Some(user.saved_trips.clone()),
        tags: Some(RawWeights::Map(tag_counts)),
        recent_destinations: Some(RawWeights::Map(destination_counts)),
        avg_budget: median(budgets),
        travel_style: user.travel_style.clone(),
        favorite_destinations,
        followings: user.followings.clone(),
        preferences: user.preferences.clone(),
    }
}

/// Middle value, or the mean of the two middle values for even counts
fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
