//! Login state for the app: tokens in the session store plus the signed-in user.

use std::cell::RefCell;
use std::rc::Rc;

use circle_shared::{ApiError, Credentials, Id, RegisterRequest, TokenPair, User};

use crate::api::Api;
use crate::config::ClientConfig;
use crate::gateway::Gateway;
use crate::hooks::{CommentThread, FeedHook, FriendshipsHook, MutualFriendCache};
use crate::session::{LogoutReason, SessionStore};

/// Authentication context shared by every view.
#[derive(Clone)]
pub struct AuthContext {
    api: Api,
    user: Rc<RefCell<Option<User>>>,
}

impl AuthContext {
    pub fn new(api: Api) -> Self {
        Self {
            api,
            user: Rc::new(RefCell::new(None)),
        }
    }

    /// Production wiring: reqwest transport and platform storage.
    pub fn from_config(config: ClientConfig) -> Self {
        Self::new(Api::new(Gateway::from_config(config)))
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn session(&self) -> &SessionStore {
        self.api.gateway().session()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_authenticated()
    }

    /// Sign in and load the profile.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        let tokens = self.api.login(credentials).await?;
        self.start_session(tokens).await
    }

    /// Create an account and sign straight in.
    pub async fn register(&self, form: &RegisterRequest) -> Result<User, ApiError> {
        let tokens = self.api.register(form).await?;
        self.start_session(tokens).await
    }

    /// The signed-in user, fetched once per session.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        if !self.is_authenticated() {
            self.user.borrow_mut().take();
            return Err(ApiError::Unauthorized { body: None });
        }
        if let Some(user) = self.user.borrow().clone() {
            return Ok(user);
        }
        let user = self.api.me().await?;
        *self.user.borrow_mut() = Some(user.clone());
        Ok(user)
    }

    /// Id of the cached user, if the profile has been loaded.
    pub fn user_id(&self) -> Option<Id> {
        self.user.borrow().as_ref().map(|u| u.id.clone())
    }

    pub fn logout(&self) {
        self.user.borrow_mut().take();
        self.session().logout(LogoutReason::UserRequested);
    }

    pub fn feed(&self) -> FeedHook {
        FeedHook::new(self.api.clone())
    }

    pub fn friendships(&self, me: Id) -> FriendshipsHook {
        FriendshipsHook::new(self.api.clone(), me)
    }

    pub fn mutual_friends(&self) -> MutualFriendCache {
        MutualFriendCache::new(self.api.clone())
    }

    pub fn comments(&self, post: Id) -> CommentThread {
        CommentThread::new(self.api.clone(), post)
    }

    async fn start_session(&self, tokens: TokenPair) -> Result<User, ApiError> {
        self.user.borrow_mut().take();
        self.session().set_tokens(tokens.access, tokens.refresh);
        crate::log_info!("auth: signed in");
        self.current_user().await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::session::AuthEvent;
    use crate::testing::{bearer, reply, test_config, user_json, MockTransport};

    fn credentials(password: &str) -> Credentials {
        Credentials {
            username: "user7".into(),
            password: password.into(),
        }
    }

    fn context(transport: std::rc::Rc<MockTransport>) -> AuthContext {
        let gateway = Gateway::new(transport, SessionStore::in_memory(), test_config());
        AuthContext::new(Api::new(gateway))
    }

    fn backend() -> std::rc::Rc<MockTransport> {
        MockTransport::new(|req| match req.path.as_str() {
            "/api/auth/login/" => reply(200, json!({ "access": "a-1", "refresh": "r-1" })),
            "/api/users/me/" if bearer(req) == Some("a-1") => reply(200, user_json(7)),
            _ => reply(401, json!({ "detail": "Invalid credentials." })),
        })
    }

    #[tokio::test]
    async fn login_stores_tokens_and_loads_the_user() {
        let transport = backend();
        let auth = context(transport.clone());
        let mut events = auth.session().subscribe();

        let user = auth.login(&credentials("pw")).await.unwrap();

        assert_eq!(user.id, Id::from(7));
        assert!(auth.is_authenticated());
        assert_eq!(auth.session().refresh_token().as_deref(), Some("r-1"));
        assert_eq!(events.try_next().unwrap(), Some(AuthEvent::LoggedIn));

        // Memoized for the rest of the session.
        auth.current_user().await.unwrap();
        assert_eq!(transport.count("/api/users/me/"), 1);
    }

    #[tokio::test]
    async fn bad_credentials_leave_the_session_alone() {
        let transport = MockTransport::new(|_| reply(401, json!({ "detail": "Invalid credentials." })));
        let auth = context(transport.clone());

        let err = auth.login(&credentials("wrong")).await.unwrap_err();

        assert_eq!(err.user_message(), "Invalid credentials.");
        assert!(!auth.is_authenticated());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn logout_forgets_the_user() {
        let transport = backend();
        let auth = context(transport.clone());
        auth.login(&credentials("pw")).await.unwrap();

        auth.logout();

        assert!(!auth.is_authenticated());
        assert_eq!(auth.user_id(), None);
        assert!(matches!(
            auth.current_user().await,
            Err(ApiError::Unauthorized { .. })
        ));
        assert_eq!(transport.count("/api/users/me/"), 1);
    }
}
