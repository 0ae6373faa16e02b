//! Profile lookups for users embedded in listed items.
//!
//! Listings only carry a user's login. [`UserDirectory`] fills in the
//! display name and public email from the user's profile, reading each
//! login at most once. A lookup that fails leaves both fields out.

use std::collections::HashMap;

use crate::connector::ConnectorError;
use crate::github::{GitHubClient, SimpleUser, short_error_message};
use crate::rate_limit::retry_rate_limited;

/// Per-step cache of user profiles, keyed by login.
pub struct UserDirectory<'a> {
    client: &'a GitHubClient,
    /// `None` records a lookup that failed.
    profiles: HashMap<String, Option<SimpleUser>>,
}

impl<'a> UserDirectory<'a> {
    pub fn new(client: &'a GitHubClient) -> Self {
        Self {
            client,
            profiles: HashMap::new(),
        }
    }

    /// Fill in `name` and `email` unless the user already carries either.
    ///
    /// Only an exhausted rate-limit budget is returned as an error.
    pub async fn complete(&mut self, user: &mut SimpleUser) -> Result<(), ConnectorError> {
        if user.name.is_some() || user.email.is_some() {
            return Ok(());
        }
        if let Some(profile) = self.lookup(&user.login).await? {
            user.name = profile.name.clone();
            user.email = profile.email.clone();
        }
        Ok(())
    }

    pub async fn complete_all<'u, I>(&mut self, users: I) -> Result<(), ConnectorError>
    where
        I: IntoIterator<Item = &'u mut SimpleUser>,
    {
        for user in users {
            self.complete(user).await?;
        }
        Ok(())
    }

    async fn lookup(&mut self, login: &str) -> Result<Option<&SimpleUser>, ConnectorError> {
        if !self.profiles.contains_key(login) {
            let client = self.client;
            let profile = match retry_rate_limited(client, "user lookup", move || {
                client.get_user(login)
            })
            .await
            {
                Ok(profile) => Some(profile),
                Err(ConnectorError::GitHub(e)) => {
                    tracing::debug!(
                        "Could not look up user {}: {}",
                        login,
                        short_error_message(&e)
                    );
                    None
                }
                Err(e) => return Err(e),
            };
            self.profiles.insert(login.to_string(), profile);
        }
        Ok(self.profiles.get(login).and_then(Option::as_ref))
    }
}
