//! Read-only directory of SRP identities.
//!
//! Storage of users is the embedder's concern; the core only needs lookup
//! by name plus a server-wide seed key for decoy synthesis.

use crate::crypto::keys::random_bytes;
use crate::crypto::srp;

const SALT_SIZE: usize = 64;
const SEED_KEY_SIZE: usize = 64;

/// A single SRP identity.
#[derive(Debug, Clone)]
pub struct User {
    pub name: String,
    /// SRP group id; resolves through [`srp::group_by_id`].
    pub group: String,
    pub salt: Vec<u8>,
    pub verifier: Vec<u8>,
    pub flags: u32,
    /// Bitmask of session types this user may open.
    pub sessions: u32,
}

impl User {
    pub const ENABLED: u32 = 1;

    /// Provision a new identity for the default group: fresh random salt,
    /// verifier derived from the password. Returns `None` for empty
    /// credentials.
    pub fn create(name: &str, password: &str) -> Option<User> {
        if name.is_empty() || password.is_empty() {
            return None;
        }

        let group = srp::fallback_group();
        let salt = random_bytes(SALT_SIZE);
        let verifier = srp::calc_v(name.as_bytes(), password.as_bytes(), &salt, group);

        Some(User {
            name: name.to_string(),
            group: srp::FALLBACK_GROUP_ID.to_string(),
            salt,
            verifier: verifier.to_bytes_be(),
            flags: User::ENABLED,
            sessions: 0,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.flags & User::ENABLED != 0
    }
}

/// Read-only view over the configured users plus the server seed key.
pub struct UserList {
    users: Vec<User>,
    seed_key: Vec<u8>,
}

impl UserList {
    pub fn new() -> UserList {
        UserList::with_seed_key(random_bytes(SEED_KEY_SIZE))
    }

    pub fn with_seed_key(seed_key: Vec<u8>) -> UserList {
        UserList {
            users: Vec::new(),
            seed_key,
        }
    }

    pub fn add(&mut self, user: User) {
        self.users.push(user);
    }

    /// Case-insensitive lookup by user name.
    pub fn find(&self, username: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|user| user.name.eq_ignore_ascii_case(username))
    }

    /// Server-wide secret mixed into synthesized salts so unknown names
    /// produce stable, unguessable parameters.
    pub fn seed_key(&self) -> &[u8] {
        &self.seed_key
    }
}

impl Default for UserList {
    fn default() -> Self {
        UserList::new()
    }
}
