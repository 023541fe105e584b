//! Freelancer search and ranking.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

use super::geo::distance_km;
use super::MarketResult;
use crate::db::{Category, FreelancerProfile, ProfileResponse, ReviewStats, User, UserResponse};
use crate::store::MarketStore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Rating,
    PriceAsc,
    PriceDesc,
    Distance,
}

impl std::str::FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rating" => Ok(Self::Rating),
            "price_asc" => Ok(Self::PriceAsc),
            "price_desc" => Ok(Self::PriceDesc),
            "distance" => Ok(Self::Distance),
            _ => Err(format!("Unknown sort key: {}", s)),
        }
    }
}

/// Search filters. Every `None` field means "don't filter on this".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    /// Case-insensitive match on display name, title or any skill
    pub query: Option<String>,
    pub category: Option<Category>,
    /// Case-insensitive substring of the user's location
    pub location: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    /// Kilometers; only applied to freelancers with known coordinates
    pub max_distance: Option<f64>,
    /// Searcher position, used to compute distances
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub sort_by: Option<SortBy>,
}

impl SearchCriteria {
    fn origin(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// Predicates that only need the stored profile and user
    pub fn matches(&self, profile: &FreelancerProfile, user: &User) -> bool {
        if let Some(ref query) = self.query {
            let needle = query.to_lowercase();
            let hit = user.display_name.to_lowercase().contains(&needle)
                || profile.title.to_lowercase().contains(&needle)
                || profile
                    .skill_list()
                    .iter()
                    .any(|skill| skill.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }

        if let Some(category) = self.category {
            if profile.get_category() != category {
                return false;
            }
        }

        if let Some(ref location) = self.location {
            let needle = location.to_lowercase();
            match user.location {
                Some(ref loc) if loc.to_lowercase().contains(&needle) => {}
                _ => return false,
            }
        }

        if self.min_price.is_some_and(|min| profile.hourly_rate < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| profile.hourly_rate > max) {
            return false;
        }

        true
    }
}

/// Profile, owner and review aggregates for one freelancer
#[derive(Debug, Clone)]
pub struct FreelancerCandidate {
    pub profile: FreelancerProfile,
    pub user: User,
    pub stats: ReviewStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreelancerResult {
    pub profile: ProfileResponse,
    pub user: UserResponse,
    pub avg_rating: f64,
    pub review_count: i64,
    /// Kilometers from the searcher, when both positions are known
    pub distance: Option<f64>,
}

/// Filter and order `candidates`, which arrive in enumeration order
pub fn rank_freelancers(
    candidates: Vec<FreelancerCandidate>,
    criteria: &SearchCriteria,
) -> Vec<FreelancerResult> {
    let origin = criteria.origin();

    let mut results: Vec<FreelancerResult> = candidates
        .into_iter()
        .filter(|c| criteria.matches(&c.profile, &c.user))
        .map(|c| {
            let distance = match (origin, c.user.coordinates()) {
                (Some((lat1, lon1)), Some((lat2, lon2))) => Some(distance_km(lat1, lon1, lat2, lon2)),
                _ => None,
            };
            FreelancerResult {
                profile: c.profile.to_response(),
                user: UserResponse::from(c.user),
                avg_rating: c.stats.average,
                review_count: c.stats.count,
                distance,
            }
        })
        .filter(|r| match (criteria.max_distance, r.distance) {
            (Some(max), Some(distance)) => distance <= max,
            _ => true,
        })
        .filter(|r| criteria.min_rating.map_or(true, |min| r.avg_rating >= min))
        .collect();

    // sort_by is stable, so ties keep enumeration order
    match criteria.sort_by {
        Some(SortBy::Rating) => results.sort_by(|a, b| b.avg_rating.total_cmp(&a.avg_rating)),
        Some(SortBy::PriceAsc) => {
            results.sort_by(|a, b| a.profile.hourly_rate.total_cmp(&b.profile.hourly_rate))
        }
        Some(SortBy::PriceDesc) => {
            results.sort_by(|a, b| b.profile.hourly_rate.total_cmp(&a.profile.hourly_rate))
        }
        Some(SortBy::Distance) => results.sort_by(|a, b| compare_distance(a.distance, b.distance)),
        None => {}
    }

    results
}

/// Known distances first, ascending; unknown ones keep their order at the end
fn compare_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Runs searches against the store
pub struct FreelancerSearch {
    store: Arc<dyn MarketStore>,
}

impl FreelancerSearch {
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self { store }
    }

    pub async fn search(&self, criteria: &SearchCriteria) -> MarketResult<Vec<FreelancerResult>> {
        let freelancers: Vec<(FreelancerProfile, User)> = self
            .store
            .list_freelancers()
            .await?
            .into_iter()
            .filter(|(profile, user)| criteria.matches(profile, user))
            .collect();

        let ids: Vec<String> = freelancers.iter().map(|(p, _)| p.id.clone()).collect();
        let stats = self.store.review_stats(&ids).await?;

        let candidates = freelancers
            .into_iter()
            .map(|(profile, user)| {
                let stats = stats.get(&profile.id).copied().unwrap_or_default();
                FreelancerCandidate {
                    profile,
                    user,
                    stats,
                }
            })
            .collect();

        let results = rank_freelancers(candidates, criteria);
        tracing::debug!(results = results.len(), "Freelancer search completed");
        Ok(results)
    }
}
