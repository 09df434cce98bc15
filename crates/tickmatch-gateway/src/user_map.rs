//! User id to client id mapping, for trade fan-out.
//!
//! A trade names the buying and selling users, not the clients that
//! submitted the orders; this map closes that gap. Ingress records the
//! binding every time a user sends anything, last writer wins, so a
//! user who reconnects through a new client starts receiving their
//! trades on the new connection.

use std::collections::HashMap;

use parking_lot::RwLock;

#[derive(Default)]
pub struct UserClientMap {
    inner: RwLock<HashMap<u32, u32>>,
}

impl UserClientMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to `client_id`, replacing any previous binding.
    pub fn bind(&self, user_id: u32, client_id: u32) {
        self.inner.write().insert(user_id, client_id);
    }

    /// The client currently owning `user_id`, if any.
    pub fn client_of(&self, user_id: u32) -> Option<u32> {
        self.inner.read().get(&user_id).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
