use domain::Identity;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::traits::IdentityProvider;

/// Process-wide holder for whoever the identity provider says is signed in.
/// The feed only ever reads it.
#[derive(Clone)]
pub struct Session {
    tx: Arc<watch::Sender<Option<Identity>>>,
}

impl Session {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn signed_in(identity: Identity) -> Self {
        let session = Self::new();
        session.set(Some(identity));
        session
    }

    pub fn set(&self, identity: Option<Identity>) {
        match &identity {
            Some(id) => info!("Session signed in as {}", id.id),
            None => info!("Session signed out"),
        }
        self.tx.send_replace(identity);
    }

    pub fn sign_out(&self) {
        self.set(None);
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// Fires on every sign-in / sign-out.
    pub fn changes(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for Session {
    fn current_identity(&self) -> Option<Identity> {
        self.current()
    }
}
