//! Mapping criteria and the satisfaction check.

use std::collections::BTreeSet;

use crate::config::MappingCriteria;

use super::User;

/// Normalized match criteria of one configured mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingSet {
    pub groups: BTreeSet<String>,
    pub roles: BTreeSet<String>,
    /// Carried through from the configuration; not consulted by
    /// [`is_satisfied`].
    pub usernames: BTreeSet<String>,
}

impl MappingSet {
    pub fn from_criteria(criteria: &MappingCriteria) -> Self {
        Self {
            groups: criteria.group.iter().cloned().collect(),
            roles: criteria.role.iter().cloned().collect(),
            usernames: criteria.usernames.iter().flatten().cloned().collect(),
        }
    }

    /// True when no group or role could ever match.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.roles.is_empty()
    }
}

impl From<&MappingCriteria> for MappingSet {
    fn from(criteria: &MappingCriteria) -> Self {
        Self::from_criteria(criteria)
    }
}

/// Whether `user` holds any group or any role listed in `set`.
pub fn is_satisfied(user: &User, set: &MappingSet) -> bool {
    set.groups.iter().any(|g| user.has_group(g)) || set.roles.iter().any(|r| user.has_role(r))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(groups: &[&str], roles: &[&str]) -> User {
        User::new("id", "kc", "alice", "alice@example.com")
            .with_groups(groups.iter().copied())
            .with_roles(roles.iter().copied())
    }

    fn set(groups: &[&str], roles: &[&str]) -> MappingSet {
        MappingSet {
            groups: groups.iter().map(|s| s.to_string()).collect(),
            roles: roles.iter().map(|s| s.to_string()).collect(),
            usernames: BTreeSet::new(),
        }
    }

    #[test]
    fn test_group_match_satisfies() {
        assert!(is_satisfied(&user(&["staff"], &[]), &set(&["staff"], &[])));
    }

    #[test]
    fn test_role_match_satisfies() {
        assert!(is_satisfied(&user(&[], &["admin"]), &set(&[], &["admin"])));
    }

    #[test]
    fn test_union_not_intersection() {
        // Holding only the group is enough even though the role is missing.
        let u = user(&["staff"], &[]);
        assert!(is_satisfied(&u, &set(&["staff"], &["admin"])));
        assert!(is_satisfied(&u, &set(&["ops", "staff"], &[])));
    }

    #[test]
    fn test_group_names_do_not_match_roles() {
        assert!(!is_satisfied(&user(&["admin"], &[]), &set(&[], &["admin"])));
        assert!(!is_satisfied(&user(&[], &["staff"]), &set(&["staff"], &[])));
    }

    #[test]
    fn test_empty_set_never_satisfies() {
        let u = user(&["staff"], &["admin"]);
        let empty = set(&[], &[]);
        assert!(empty.is_empty());
        assert!(!is_satisfied(&u, &empty));
    }

    #[test]
    fn test_usernames_are_not_evaluated() {
        let criteria = MappingCriteria {
            group: None,
            role: None,
            usernames: Some(vec!["alice".into()]),
        };
        let mapping = MappingSet::from_criteria(&criteria);
        assert!(mapping.usernames.contains("alice"));
        assert!(!is_satisfied(&user(&[], &[]), &mapping));
    }

    #[test]
    fn test_matches_set_intersection_definition() {
        let universe = ["a", "b", "c"];
        let subsets: Vec<Vec<&str>> = (0..8u8)
            .map(|mask| {
                universe
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, s)| *s)
                    .collect()
            })
            .collect();

        for ug in &subsets {
            for sg in &subsets {
                for ur in &subsets {
                    for sr in &subsets {
                        let u = user(ug, ur);
                        let s = set(sg, sr);
                        let expected = !u.groups.is_disjoint(&s.groups) || !u.roles.is_disjoint(&s.roles);
                        assert_eq!(is_satisfied(&u, &s), expected);
                    }
                }
            }
        }
    }

    #[test]
    fn test_from_criteria() {
        let criteria = MappingCriteria {
            group: Some("staff".into()),
            role: Some("admin".into()),
            usernames: None,
        };
        let mapping = MappingSet::from(&criteria);
        assert!(mapping.groups.contains("staff"));
        assert!(mapping.roles.contains("admin"));
        assert!(mapping.usernames.is_empty());
    }
}
