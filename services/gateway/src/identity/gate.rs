use std::sync::Arc;

use http::HeaderMap;
use school_gate_policy::UserContext;
use tracing::debug;

use super::context::UserContextProvider;
use super::session::SessionProvider;
use crate::routes::is_public_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    /// Public path, no identity needed.
    NotRequired,
    Unauthenticated,
    UserContextUnavailable,
    Authenticated(UserContext),
}

pub struct IdentityGate {
    sessions: Arc<dyn SessionProvider>,
    contexts: Arc<dyn UserContextProvider>,
}

impl IdentityGate {
    pub fn new(sessions: Arc<dyn SessionProvider>, contexts: Arc<dyn UserContextProvider>) -> Self {
        Self { sessions, contexts }
    }

    pub async fn authenticate(&self, headers: &HeaderMap, path: &str, tenant_id: &str) -> Authentication {
        if is_public_path(path) {
            return Authentication::NotRequired;
        }

        let Some(session) = self.sessions.session(headers).await else {
            return Authentication::Unauthenticated;
        };

        match self.contexts.user_context(&session, tenant_id).await {
            Ok(user) => Authentication::Authenticated(user),
            Err(e) => {
                debug!(error = %e, user_id = %session.user_id, "No user context for session");
                Authentication::UserContextUnavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Session, UserContextError};
    use async_trait::async_trait;
    use school_gate_policy::Role;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSession(Option<&'static str>);

    #[async_trait]
    impl SessionProvider for FixedSession {
        async fn session(&self, _headers: &HeaderMap) -> Option<Session> {
            self.0.map(|user_id| Session {
                user_id: user_id.to_string(),
                token: "token".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct Contexts {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UserContextProvider for Contexts {
        async fn user_context(
            &self,
            session: &Session,
            _tenant_id: &str,
        ) -> Result<UserContext, UserContextError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(UserContextError::Status { status: 500 });
            }
            Ok(UserContext::new(session.user_id.clone(), Role::Parent))
        }
    }

    fn gate(session: Option<&'static str>, contexts: Arc<Contexts>) -> IdentityGate {
        IdentityGate::new(Arc::new(FixedSession(session)), contexts)
    }

    #[tokio::test]
    async fn test_public_paths_skip_identity() {
        let contexts = Arc::new(Contexts::default());
        let gate = gate(None, Arc::clone(&contexts));

        let outcome = gate.authenticate(&HeaderMap::new(), "/login", "t-1").await;

        assert_eq!(outcome, Authentication::NotRequired);
        assert_eq!(contexts.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_session_is_unauthenticated() {
        let contexts = Arc::new(Contexts::default());
        let gate = gate(None, Arc::clone(&contexts));

        let outcome = gate.authenticate(&HeaderMap::new(), "/parent", "t-1").await;

        assert_eq!(outcome, Authentication::Unauthenticated);
        assert_eq!(contexts.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_context_outcomes() {
        let ok = gate(Some("u-1"), Arc::new(Contexts::default()));
        assert_eq!(
            ok.authenticate(&HeaderMap::new(), "/parent", "t-1").await,
            Authentication::Authenticated(UserContext::new("u-1", Role::Parent))
        );

        let failing = gate(
            Some("u-1"),
            Arc::new(Contexts {
                fail: true,
                ..Default::default()
            }),
        );
        assert_eq!(
            failing.authenticate(&HeaderMap::new(), "/parent", "t-1").await,
            Authentication::UserContextUnavailable
        );
    }
}
