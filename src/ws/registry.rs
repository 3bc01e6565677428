use std::collections::HashMap;

use super::client::{Client, ClientId, ClientSnapshot};

/// Table of connected clients keyed by client id.
///
/// Owned by the hub task, which is the only place it is mutated; everything
/// else refers to clients by [`ClientId`].
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, Client>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, client: Client) {
        self.clients.insert(client.id, client);
    }

    /// Remove a client. Returns `None` if it was already gone.
    pub fn unregister(&mut self, id: ClientId) -> Option<Client> {
        self.clients.remove(&id)
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    /// Copy of every registered client at this instant.
    pub fn list(&self) -> Vec<ClientSnapshot> {
        self.clients.values().map(Client::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::client::Identity;
    use tokio::sync::{mpsc, oneshot};

    fn client(user: &str) -> (Client, oneshot::Receiver<()>) {
        let (tx, _rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let identity = Identity { user_id: user.to_string(), username: user.to_uppercase() };
        (Client::new(identity, tx, shutdown_tx), shutdown_rx)
    }

    #[test]
    fn register_get_unregister() {
        let mut registry = ClientRegistry::new();
        let (c, _shutdown) = client("alice");
        let id = c.id;
        registry.register(c);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(id).map(|c| c.identity.user_id.as_str()), Some("alice"));
        assert!(registry.unregister(id).is_some());
        assert!(registry.unregister(id).is_none());
        assert!(registry.get(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn list_is_a_detached_copy() {
        let mut registry = ClientRegistry::new();
        let (a, _sa) = client("alice");
        let (b, _sb) = client("bob");
        let a_id = a.id;
        registry.register(a);
        registry.register(b);

        let snapshot = registry.list();
        registry.unregister(a_id);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test]
    async fn unregister_fires_shutdown_signal() {
        let mut registry = ClientRegistry::new();
        let (c, shutdown) = client("alice");
        let id = c.id;
        registry.register(c);

        drop(registry.unregister(id));
        assert!(shutdown.await.is_err());
    }
}
