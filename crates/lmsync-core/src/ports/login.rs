//! Login collaborator ports
//!
//! [`ILoginProvider`] owns the token. The API client only reads it and asks
//! for a re-login when the platform rejects it. [`IReauthPrompt`] is the
//! interactive surface (browser, terminal) that produces a fresh token.

/// Port trait for the token owner
#[async_trait::async_trait]
pub trait ILoginProvider: Send + Sync {
    /// Returns true while a token is held
    fn is_logged_in(&self) -> bool;

    /// Returns the current token; callers must not cache it across requests
    fn current_token(&self) -> Option<String>;

    /// Runs the interactive re-login flow
    ///
    /// Resolves to `true` once a new token is in place, `false` if the flow
    /// was abandoned.
    async fn prompt_reauthentication(&self) -> bool;
}

/// Port trait for the interactive surface producing a token
#[async_trait::async_trait]
pub trait IReauthPrompt: Send + Sync {
    /// Returns a fresh token, `Ok(None)` when the user abandons the flow
    async fn request_token(&self) -> anyhow::Result<Option<String>>;
}
