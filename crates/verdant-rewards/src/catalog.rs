//! In-memory reward catalog.
//!
//! Stock is the contended resource: the check and the decrement are one
//! indivisible operation on `&mut self`, so two redemptions can never both
//! pass the check for the last unit. Stock is owned exclusively by the
//! redemption path; nothing else mutates it.

use chrono::{DateTime, Utc};
use tracing::debug;

use verdant_core::constants::MAX_PAGE_SIZE;
use verdant_core::error::CatalogError;
use verdant_core::traits::RewardStore;
use verdant_core::types::{CompanyId, NewReward, Reward, RewardFilter, RewardId};

/// In-memory [`RewardStore`]. Not thread-safe — the engine wraps it in its
/// lock.
#[derive(Debug, Default)]
pub struct MemoryRewardStore {
    rewards: Vec<Reward>,
    next_id: u64,
}

impl MemoryRewardStore {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    fn find_mut(&mut self, id: RewardId) -> Result<&mut Reward, CatalogError> {
        self.rewards
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(CatalogError::NotFound(id))
    }

    fn matches(reward: &Reward, company: CompanyId, filter: &RewardFilter) -> bool {
        if !reward.active || !reward.in_scope(company) {
            return false;
        }
        if let Some(category) = &filter.category {
            if &reward.category != category {
                return false;
            }
        }
        if let Some(query) = &filter.query {
            let query = query.to_lowercase();
            let in_title = reward.title.to_lowercase().contains(&query);
            let in_description = reward
                .description
                .as_ref()
                .is_some_and(|d| d.to_lowercase().contains(&query));
            if !in_title && !in_description {
                return false;
            }
        }
        true
    }
}

impl RewardStore for MemoryRewardStore {
    fn insert(&mut self, new: NewReward, now: DateTime<Utc>) -> Reward {
        self.next_id += 1;
        let reward = Reward {
            id: RewardId(self.next_id),
            title: new.title,
            description: new.description,
            category: new.category,
            company_id: new.company_id,
            points_required: new.points_required,
            stock: new.stock,
            active: true,
            created_at: now,
        };
        self.rewards.push(reward.clone());
        reward
    }

    fn get(&self, id: RewardId) -> Option<Reward> {
        self.rewards.iter().find(|r| r.id == id).cloned()
    }

    fn list(&self, company: CompanyId, filter: &RewardFilter) -> Vec<Reward> {
        let mut matched: Vec<Reward> = self
            .rewards
            .iter()
            .filter(|r| Self::matches(r, company, filter))
            .cloned()
            .collect();
        // Newest first; id breaks same-instant inserts.
        matched.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.min(MAX_PAGE_SIZE))
            .collect()
    }

    fn categories(&self, company: CompanyId) -> Vec<String> {
        let mut categories: Vec<String> = self
            .rewards
            .iter()
            .filter(|r| r.active && r.in_scope(company))
            .map(|r| r.category.clone())
            .collect();
        categories.sort_unstable();
        categories.dedup();
        categories
    }

    fn decrement_stock(&mut self, id: RewardId, qty: u32) -> Result<(), CatalogError> {
        if qty == 0 {
            return Err(CatalogError::ZeroQuantity(id));
        }
        let reward = self.find_mut(id)?;
        if !reward.active {
            return Err(CatalogError::Inactive(id));
        }
        match reward.stock {
            None => Ok(()), // unlimited
            Some(available) if available >= qty => {
                reward.stock = Some(available - qty);
                debug!(reward = %id, qty, remaining = available - qty, "stock decremented");
                Ok(())
            }
            Some(available) => Err(CatalogError::OutOfStock { available, requested: qty }),
        }
    }

    fn restore_stock(&mut self, id: RewardId, qty: u32) -> Result<(), CatalogError> {
        let reward = self.find_mut(id)?;
        match reward.stock {
            None => Ok(()),
            Some(current) => {
                let restored = current.checked_add(qty).ok_or_else(|| {
                    CatalogError::InvariantViolation(format!(
                        "stock overflow restoring {qty} units on reward {id}"
                    ))
                })?;
                reward.stock = Some(restored);
                debug!(reward = %id, qty, restored, "stock restored");
                Ok(())
            }
        }
    }

    fn retire(&mut self, id: RewardId) -> Result<Reward, CatalogError> {
        let reward = self.find_mut(id)?;
        reward.active = false;
        Ok(reward.clone())
    }

    fn reward_count(&self) -> usize {
        self.rewards.len()
    }
}
