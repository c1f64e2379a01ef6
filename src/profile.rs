use async_trait::async_trait;

use crate::permission::Action;
use crate::{OAuthError, Profile, ServiceType};

/// Reads the signed-in user's profile from the provider.
///
/// `Ok(None)` and a profile without `uname` both count as a failed login.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch_profile(
        &self,
        action: &Action,
        service_type: ServiceType,
        service_name: &str,
    ) -> Result<Option<Profile>, OAuthError>;
}
