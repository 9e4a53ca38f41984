//! In-memory user directory.
//!
//! The engine does not own user accounts; the surrounding system assigns
//! ids and handles authentication. This directory keeps the subset the
//! engine needs: company scope, department, and the account-creation
//! instant used as the ranking tie-break.

use std::collections::HashMap;

use crate::error::DirectoryError;
use crate::traits::UserDirectory;
use crate::types::{CompanyId, NewUser, UserId, UserProfile};

/// In-memory [`UserDirectory`]. Not thread-safe — the engine wraps it in
/// its lock.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: HashMap<UserId, UserProfile>,
}

impl MemoryUserDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserDirectory for MemoryUserDirectory {
    fn register(&mut self, new: NewUser) -> Result<UserProfile, DirectoryError> {
        if self.users.contains_key(&new.id) {
            return Err(DirectoryError::AlreadyRegistered(new.id));
        }
        let profile = UserProfile {
            id: new.id,
            company_id: new.company_id,
            display_name: new.display_name,
            department: new.department,
            created_at: new.created_at,
        };
        self.users.insert(profile.id, profile.clone());
        Ok(profile)
    }

    fn get(&self, id: UserId) -> Option<UserProfile> {
        self.users.get(&id).cloned()
    }

    fn users_of_company(&self, company: CompanyId) -> Vec<UserProfile> {
        let mut users: Vec<UserProfile> = self
            .users
            .values()
            .filter(|u| u.company_id == company)
            .cloned()
            .collect();
        users.sort_by_key(|u| (u.created_at, u.id));
        users
    }

    fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn new_user(id: u64, company: u64, created: i64) -> NewUser {
        NewUser {
            id: UserId(id),
            company_id: CompanyId(company),
            display_name: format!("user-{id}"),
            department: None,
            created_at: at(created),
        }
    }

    #[test]
    fn register_and_get() {
        let mut dir = MemoryUserDirectory::new();
        let profile = dir.register(new_user(1, 1, 100)).unwrap();
        assert_eq!(profile.id, UserId(1));
        assert_eq!(dir.get(UserId(1)).unwrap(), profile);
        assert_eq!(dir.user_count(), 1);
    }

    #[test]
    fn register_twice_fails() {
        let mut dir = MemoryUserDirectory::new();
        dir.register(new_user(1, 1, 100)).unwrap();
        let err = dir.register(new_user(1, 2, 200)).unwrap_err();
        assert_eq!(err, DirectoryError::AlreadyRegistered(UserId(1)));
        // The original registration is untouched.
        assert_eq!(dir.get(UserId(1)).unwrap().company_id, CompanyId(1));
    }

    #[test]
    fn get_unknown_user_is_none() {
        let dir = MemoryUserDirectory::new();
        assert!(dir.get(UserId(9)).is_none());
    }

    #[test]
    fn company_listing_is_scoped_and_ordered() {
        let mut dir = MemoryUserDirectory::new();
        dir.register(new_user(3, 1, 300)).unwrap();
        dir.register(new_user(1, 1, 100)).unwrap();
        dir.register(new_user(2, 2, 200)).unwrap();
        dir.register(new_user(4, 1, 100)).unwrap(); // same instant as user 1

        let company1 = dir.users_of_company(CompanyId(1));
        let ids: Vec<UserId> = company1.iter().map(|u| u.id).collect();
        // Ordered by creation time, then id for same-instant registrations.
        assert_eq!(ids, vec![UserId(1), UserId(4), UserId(3)]);
    }

    #[test]
    fn department_is_preserved() {
        let mut dir = MemoryUserDirectory::new();
        let mut new = new_user(1, 1, 100);
        new.department = Some("facilities".into());
        let profile = dir.register(new).unwrap();
        assert_eq!(profile.department.as_deref(), Some("facilities"));
    }
}
