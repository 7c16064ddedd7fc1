use circle_shared::{ApiError, Credentials, RefreshedToken, RefreshRequest, RegisterRequest, TokenPair, User};

use super::Api;
use crate::gateway::encode;
use crate::transport::HttpRequest;

const LOGIN: &str = "/api/auth/login/";
const REGISTER: &str = "/api/auth/register/";
const ME: &str = "/api/users/me/";

impl Api {
    /// Exchange credentials for a token pair. Does not touch the session.
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenPair, ApiError> {
        let request = HttpRequest::post(LOGIN).with_json(encode(credentials)?);
        self.gateway.send_public_json(request).await
    }

    /// Create an account; the server answers with a token pair.
    pub async fn register(&self, form: &RegisterRequest) -> Result<TokenPair, ApiError> {
        let request = HttpRequest::post(REGISTER).with_json(encode(form)?);
        self.gateway.send_public_json(request).await
    }

    /// Call the refresh endpoint through the gateway.
    ///
    /// A 401 here is treated as an unrecoverable credential failure.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ApiError> {
        let path = self.gateway.config().refresh_path.clone();
        let body = RefreshRequest {
            refresh: refresh_token.to_string(),
        };
        self.gateway.post_json(&path, &body).await
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        self.gateway.get_json(ME).await
    }
}
