//! The pull/push access predicate.

use bellows_records::RecordStore;
use bellows_types::{Repository, User, Visibility};

/// Decides pull and push for `(user, repository)`.
///
/// Both queries are total: they never error and never panic. Callers that
/// could not find the repository must not reach the predicate; a missing
/// repository is a 404 decided by lookup, not here. Transports are
/// responsible for reporting private-repository denials to unauthenticated
/// callers with the same status as a missing repository.
pub trait AccessPredicate: Send + Sync {
    /// May this (possibly anonymous) user fetch from the repository?
    fn can_pull(&self, user: Option<&User>, repo: &Repository) -> bool;

    /// May this (possibly anonymous) user push to the repository?
    fn can_push(&self, user: Option<&User>, repo: &Repository) -> bool;
}

/// Production predicate over visibility, ownership, and membership roles.
#[derive(Clone)]
pub struct RoleAccess {
    records: RecordStore,
}

impl RoleAccess {
    /// Create a predicate over the given records.
    pub fn new(records: RecordStore) -> Self {
        Self { records }
    }

    fn member_can_push(&self, user: &User, repo: &Repository) -> bool {
        self.records
            .members
            .role_of(repo.id, user.id)
            .is_some_and(|role| role.can_push())
    }

    fn is_member(&self, user: &User, repo: &Repository) -> bool {
        self.records.members.role_of(repo.id, user.id).is_some()
    }
}

impl AccessPredicate for RoleAccess {
    fn can_pull(&self, user: Option<&User>, repo: &Repository) -> bool {
        match user {
            None => matches!(
                repo.visibility,
                Visibility::Public | Visibility::Internal
            ),
            Some(user) if user.disabled => false,
            Some(user) => match repo.visibility {
                Visibility::Public | Visibility::Internal => true,
                Visibility::Private => {
                    user.is_admin() || repo.owner_id == user.id || self.is_member(user, repo)
                }
            },
        }
    }

    fn can_push(&self, user: Option<&User>, repo: &Repository) -> bool {
        let Some(user) = user else {
            return false;
        };
        if user.disabled || repo.archived {
            return false;
        }
        // Detached disk-only records have no owner and take no members;
        // nothing, including the admin bypass, may write through them.
        if repo.is_detached() {
            return false;
        }
        user.is_admin() || repo.owner_id == user.id || self.member_can_push(user, repo)
    }
}

/// Test fake that returns fixed answers.
#[derive(Debug, Clone, Copy)]
pub struct FixedAccess {
    /// Answer for every pull query.
    pub pull: bool,
    /// Answer for every push query.
    pub push: bool,
}

impl AccessPredicate for FixedAccess {
    fn can_pull(&self, _user: Option<&User>, _repo: &Repository) -> bool {
        self.pull
    }

    fn can_push(&self, _user: Option<&User>, _repo: &Repository) -> bool {
        self.push
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bellows_types::RepoRole;

    struct Fixture {
        records: RecordStore,
        access: RoleAccess,
        owner: User,
        outsider: User,
        admin: User,
    }

    fn fixture() -> Fixture {
        let records = RecordStore::in_memory();
        let owner = records.users.create("alice", "a@example.com").unwrap();
        let outsider = records.users.create("bob", "b@example.com").unwrap();
        let mut admin = records.users.create("root", "r@example.com").unwrap();
        admin.role = bellows_types::UserRole::Admin;
        let admin = records.users.update(admin).unwrap();
        let access = RoleAccess::new(records.clone());
        Fixture {
            records,
            access,
            owner,
            outsider,
            admin,
        }
    }

    fn repo(f: &Fixture, visibility: Visibility) -> Repository {
        f.records
            .repos
            .create(&f.owner, &format!("r-{visibility}"), visibility)
            .unwrap()
    }

    #[test]
    fn public_repo_decision_table() {
        let f = fixture();
        let repo = repo(&f, Visibility::Public);

        assert!(f.access.can_pull(None, &repo));
        assert!(!f.access.can_push(None, &repo));
        assert!(f.access.can_pull(Some(&f.outsider), &repo));
        assert!(!f.access.can_push(Some(&f.outsider), &repo));
        assert!(f.access.can_push(Some(&f.owner), &repo));
    }

    #[test]
    fn internal_repo_pulls_like_public() {
        let f = fixture();
        let repo = repo(&f, Visibility::Internal);

        assert!(f.access.can_pull(None, &repo));
        assert!(!f.access.can_push(None, &repo));
        assert!(f.access.can_pull(Some(&f.outsider), &repo));
        assert!(!f.access.can_push(Some(&f.outsider), &repo));
    }

    #[test]
    fn private_repo_restricts_pull_to_members() {
        let f = fixture();
        let repo = repo(&f, Visibility::Private);

        assert!(!f.access.can_pull(None, &repo));
        assert!(!f.access.can_pull(Some(&f.outsider), &repo));
        assert!(f.access.can_pull(Some(&f.owner), &repo));

        f.records
            .members
            .set(repo.id, f.outsider.id, RepoRole::Viewer)
            .unwrap();
        assert!(f.access.can_pull(Some(&f.outsider), &repo));
        assert!(!f.access.can_push(Some(&f.outsider), &repo));
    }

    #[test]
    fn developer_and_maintainer_may_push() {
        let f = fixture();
        let repo = repo(&f, Visibility::Private);

        for (role, expect) in [
            (RepoRole::Viewer, false),
            (RepoRole::Developer, true),
            (RepoRole::Maintainer, true),
        ] {
            f.records
                .members
                .set(repo.id, f.outsider.id, role)
                .unwrap();
            assert_eq!(f.access.can_push(Some(&f.outsider), &repo), expect, "{role}");
        }
    }

    #[test]
    fn admin_bypasses_role_checks() {
        let f = fixture();
        let repo = repo(&f, Visibility::Private);
        assert!(f.access.can_pull(Some(&f.admin), &repo));
        assert!(f.access.can_push(Some(&f.admin), &repo));
    }

    #[test]
    fn archived_repo_blocks_push_but_not_pull() {
        let f = fixture();
        let mut repo = repo(&f, Visibility::Public);
        repo.archived = true;
        let repo = f.records.repos.update(repo).unwrap();

        assert!(f.access.can_pull(Some(&f.owner), &repo));
        assert!(!f.access.can_push(Some(&f.owner), &repo));
        assert!(!f.access.can_push(Some(&f.admin), &repo));
    }

    #[test]
    fn disabled_user_is_denied_everywhere() {
        let f = fixture();
        let repo = repo(&f, Visibility::Public);
        let mut owner = f.owner.clone();
        owner.disabled = true;
        let owner = f.records.users.update(owner).unwrap();

        assert!(!f.access.can_pull(Some(&owner), &repo));
        assert!(!f.access.can_push(Some(&owner), &repo));
    }

    #[test]
    fn detached_disk_repo_is_pull_only_for_everyone() {
        let f = fixture();
        let repo = Repository::detached("ghost", "orphan");
        assert!(f.access.can_pull(None, &repo));
        assert!(!f.access.can_push(None, &repo));
        assert!(!f.access.can_push(Some(&f.owner), &repo));
        assert!(!f.access.can_push(Some(&f.admin), &repo));
    }
}
