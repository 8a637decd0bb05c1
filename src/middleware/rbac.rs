//! Role-based access control extractors.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::errors::AppError;
use crate::middleware::auth::CurrentUser;
use crate::models::snippet::Partition;
use crate::AppState;

/// Requires a role that may manage site snippets.
#[derive(Debug, Clone)]
pub struct RequireSiteAdmin(pub CurrentUser);

impl FromRequestParts<AppState> for RequireSiteAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.role.can_manage_site() {
            return Err(AppError::Forbidden("Site admin access required".to_string()));
        }
        Ok(RequireSiteAdmin(user))
    }
}

/// Requires the network admin role.
#[derive(Debug, Clone)]
pub struct RequireNetworkAdmin(pub CurrentUser);

impl FromRequestParts<AppState> for RequireNetworkAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.role.can_manage_network() {
            return Err(AppError::Forbidden("Network admin access required".to_string()));
        }
        Ok(RequireNetworkAdmin(user))
    }
}

impl CurrentUser {
    /// Check write access to a partition. The network partition also needs
    /// multisite to be enabled.
    pub fn authorize_write(&self, partition: Partition, multisite: bool) -> Result<(), AppError> {
        match partition {
            Partition::Site if self.role.can_manage_site() => Ok(()),
            Partition::Network if !multisite => Err(AppError::Validation(
                "Network snippets require multisite".to_string(),
            )),
            Partition::Network if self.role.can_manage_network() => Ok(()),
            _ => Err(AppError::Forbidden(format!(
                "Write access to {} snippets denied",
                partition.as_str()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;
    use uuid::Uuid;

    fn user(role: UserRole) -> CurrentUser {
        CurrentUser {
            id: Uuid::nil(),
            username: "u".to_string(),
            role,
        }
    }

    #[test]
    fn partition_write_access() {
        assert!(user(UserRole::SiteAdmin).authorize_write(Partition::Site, true).is_ok());
        assert!(matches!(
            user(UserRole::SiteAdmin).authorize_write(Partition::Network, true),
            Err(AppError::Forbidden(_))
        ));
        assert!(user(UserRole::NetworkAdmin).authorize_write(Partition::Network, true).is_ok());
        assert!(matches!(
            user(UserRole::NetworkAdmin).authorize_write(Partition::Network, false),
            Err(AppError::Validation(_))
        ));
        assert!(user(UserRole::Viewer).authorize_write(Partition::Site, false).is_err());
    }
}
