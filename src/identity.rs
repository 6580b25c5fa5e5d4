/// Signed-in identity.
///
/// The current clinic account is injected as an `IdentityProvider`. "Nobody
/// signed in" is an ordinary state (`None`), and interested views subscribe
/// to changes through a `watch` channel; dropping the receiver unsubscribes.

use std::fmt;
use tokio::sync::watch;
use tracing::info;

/// Opaque identifier of a signed-in clinic account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;

    /// Receiver that observes every sign-in and sign-out.
    fn subscribe(&self) -> watch::Receiver<Option<UserId>>;
}

/// In-process identity holder.
#[derive(Debug)]
pub struct SessionIdentity {
    sender: watch::Sender<Option<UserId>>,
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::signed_out()
    }
}

impl SessionIdentity {
    pub fn signed_out() -> Self {
        let (sender, _) = watch::channel(None);
        SessionIdentity { sender }
    }

    pub fn signed_in(user: UserId) -> Self {
        let (sender, _) = watch::channel(Some(user));
        SessionIdentity { sender }
    }

    pub fn sign_in(&self, user: UserId) {
        info!(user = %user, "signed in");
        self.sender.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        if let Some(previous) = self.sender.send_replace(None) {
            info!(user = %previous, "signed out");
        }
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.sender.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let identity = SessionIdentity::signed_out();
        let mut rx = identity.subscribe();
        assert_eq!(identity.current_user(), None);

        identity.sign_in(UserId::new("clinic-1"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().clone(), Some(UserId::new("clinic-1")));

        identity.sign_out();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), None);
    }

    #[test]
    fn test_sign_in_without_subscribers() {
        let identity = SessionIdentity::default();
        identity.sign_in(UserId::new("clinic-2"));
        assert_eq!(identity.current_user().unwrap().as_str(), "clinic-2");
    }
}
