mod github;
mod google;
mod provider;
mod reddit;
mod twitter;

use std::sync::Arc;

use async_trait::async_trait;

pub use github::GithubProvider;
pub use google::GoogleProvider;
pub use provider::Provider;
pub use reddit::RedditProvider;
pub use twitter::TwitterProvider;

use crate::permission::{Action, Permission};
use crate::profile::ProfileFetcher;
use crate::registry::{Finetune, RequestContext};
use crate::{OAuthError, Profile, ServiceType};

/// Dispatches profile fetching and finetuning to providers by service name.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: Vec<Arc<dyn Provider>>,
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|provider| provider.id()))
            .finish()
    }
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// GitHub, Google, Reddit and Twitter.
    pub fn builtin() -> Self {
        Self::new()
            .with_provider(Arc::new(GithubProvider))
            .with_provider(Arc::new(GoogleProvider))
            .with_provider(Arc::new(RedditProvider))
            .with_provider(Arc::new(TwitterProvider))
    }

    /// Adds a provider, replacing one with the same id.
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.retain(|existing| existing.id() != provider.id());
        self.providers.push(provider);
        self
    }

    pub fn get(&self, service_type: ServiceType, service_name: &str) -> Option<&Arc<dyn Provider>> {
        self.providers
            .iter()
            .find(|provider| provider.id() == service_name && provider.service_type() == service_type)
    }
}

#[async_trait]
impl ProfileFetcher for ProviderSet {
    async fn fetch_profile(
        &self,
        action: &Action,
        service_type: ServiceType,
        service_name: &str,
    ) -> Result<Option<Profile>, OAuthError> {
        match self.get(service_type, service_name) {
            Some(provider) => provider.fetch_profile(action).await,
            None => {
                tracing::debug!(%service_type, service_name, "no profile fetcher for service");
                Ok(None)
            }
        }
    }
}

impl Finetune for ProviderSet {
    fn finetune(&self, context: &RequestContext, permission: &mut Permission) {
        if let Some(provider) = self.get(context.key.service_type, &context.key.service_name) {
            provider.finetune(permission);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fixture::StubProvider;
    use crate::oauth20::OAuth20Action;
    use crate::{ServiceKey, ServiceRegistry};

    #[test]
    fn builtin_covers_both_protocols() {
        let set = ProviderSet::builtin();
        assert!(set.get(ServiceType::OAuth10, "twitter").is_some());
        assert!(set.get(ServiceType::OAuth20, "twitter").is_none());
        assert!(set.get(ServiceType::OAuth20, "github").is_some());
        assert!(set.get(ServiceType::OAuth20, "myspace").is_none());
    }

    #[test]
    fn finetune_dispatches_on_service() {
        let mut registry = ServiceRegistry::new(Arc::new(StubProvider::default()))
            .with_finetune(Arc::new(ProviderSet::builtin()));
        registry
            .add_service(RedditProvider.service_config("id", "secret"))
            .unwrap();

        let permission = registry.permission(ServiceType::OAuth20, "reddit").unwrap();
        let context = RequestContext::new(ServiceKey::new(ServiceType::OAuth20, "reddit"));
        let mut permission = registry.finetune_permission(&context, permission);
        let oauth20 = permission.as_oauth20_mut().unwrap();
        assert!(oauth20.basic_auth);
        assert_eq!(
            oauth20.authorize_params,
            vec![("duration".to_string(), "permanent".to_string())]
        );
    }

    #[tokio::test]
    async fn unknown_services_have_no_profile() {
        let stub = Arc::new(StubProvider::default());
        let action = Action::OAuth20(OAuth20Action::new(
            "myspace", "id", "secret", "tok", None, None, stub.clone(),
        ));
        let profile = ProviderSet::builtin()
            .fetch_profile(&action, ServiceType::OAuth20, "myspace")
            .await
            .unwrap();
        assert!(profile.is_none());
        assert!(stub.calls().is_empty());
    }
}
