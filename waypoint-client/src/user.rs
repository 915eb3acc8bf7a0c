//! Users and tokens.

use crate::client::WaypointClient;
use crate::{Error, Result};
use tracing::debug;
use waypoint_proto::proto::r#ref;
use waypoint_proto::{
    ConvertInviteTokenRequest, DeleteUserRequest, GetUserRequest, InviteSignup,
    InviteTokenRequest, LoginTokenRequest, User, UserRefKind,
};

/// How a user is addressed in a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserRef {
    Id(String),
    Username(String),
}

impl UserRef {
    pub fn id(id: impl Into<String>) -> Self {
        UserRef::Id(id.into())
    }

    pub fn username(username: impl Into<String>) -> Self {
        UserRef::Username(username.into())
    }

    /// The id or username, whichever this reference carries.
    pub fn as_str(&self) -> &str {
        match self {
            UserRef::Id(id) => id,
            UserRef::Username(username) => username,
        }
    }
}

impl From<&UserRef> for r#ref::User {
    fn from(user: &UserRef) -> Self {
        let kind = match user {
            UserRef::Id(id) => UserRefKind::Id(r#ref::UserId { id: id.clone() }),
            UserRef::Username(username) => UserRefKind::Username(r#ref::UserUsername {
                username: username.clone(),
            }),
        };
        r#ref::User { r#ref: Some(kind) }
    }
}

impl WaypointClient {
    /// Generate a login token for `user`, or for the caller when `None`.
    pub async fn create_token(&self, user: Option<&UserRef>) -> Result<String> {
        debug!(user = ?user, "generating login token");
        let request = LoginTokenRequest {
            duration: String::new(),
            user: user.map(r#ref::User::from),
            trigger: false,
        };

        let response = self.raw().generate_login_token(request).await?;
        Ok(response.into_inner().token)
    }

    /// Generate an invite token that signs up `initial_username`.
    ///
    /// `duration` is a Go-style duration string such as `"24h"`.
    pub async fn invite_user(&self, initial_username: &str, duration: &str) -> Result<String> {
        debug!(initial_username, duration, "generating invite token");
        let request = InviteTokenRequest {
            duration: duration.to_string(),
            signup: Some(InviteSignup {
                initial_username: initial_username.to_string(),
            }),
        };

        let response = self.raw().generate_invite_token(request).await?;
        Ok(response.into_inner().token)
    }

    /// Exchange an invite token for a login token.
    pub async fn accept_invitation(&self, invite_token: &str) -> Result<String> {
        let request = ConvertInviteTokenRequest {
            token: invite_token.to_string(),
        };

        let response = self.raw().convert_invite_token(request).await?;
        Ok(response.into_inner().token)
    }

    pub async fn get_user(&self, user: &UserRef) -> Result<User> {
        let request = GetUserRequest {
            user: Some(user.into()),
        };

        let response = self.raw().get_user(request).await?;
        response
            .into_inner()
            .user
            .ok_or(Error::EmptyResponse("user"))
    }

    pub async fn delete_user(&self, user: &UserRef) -> Result<()> {
        debug!(user = ?user, "deleting user");
        let request = DeleteUserRequest {
            user: Some(user.into()),
        };

        self.raw().delete_user(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_ref() {
        let wire = r#ref::User::from(&UserRef::id("01GZ"));
        assert_eq!(
            wire.r#ref,
            Some(UserRefKind::Id(r#ref::UserId {
                id: "01GZ".to_string()
            }))
        );
    }

    #[test]
    fn test_username_ref_keeps_variant() {
        let wire = r#ref::User::from(&UserRef::username("alice"));
        assert_eq!(
            wire.r#ref,
            Some(UserRefKind::Username(r#ref::UserUsername {
                username: "alice".to_string()
            }))
        );
    }

    #[test]
    fn test_as_str() {
        assert_eq!(UserRef::id("42").as_str(), "42");
        assert_eq!(UserRef::username("bob").as_str(), "bob");
    }
}
