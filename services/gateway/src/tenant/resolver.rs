use std::sync::Arc;
use std::time::Duration;

use school_gate_policy::TenantConfig;
use tracing::{debug, instrument};

use super::directory::TenantDirectory;
use super::error::ResolveError;
use super::host::{is_valid_subdomain, SubdomainStrategy};
use crate::cache::TtlCache;

pub type TenantCache = TtlCache<String, Arc<TenantConfig>>;

pub struct TenantResolver {
    strategy: Arc<dyn SubdomainStrategy>,
    directory: Arc<dyn TenantDirectory>,
    cache: TenantCache,
    ttl: Duration,
}

impl TenantResolver {
    pub fn new(
        strategy: Arc<dyn SubdomainStrategy>,
        directory: Arc<dyn TenantDirectory>,
        cache: TenantCache,
        ttl: Duration,
    ) -> Self {
        Self {
            strategy,
            directory,
            cache,
            ttl,
        }
    }

    pub fn cache(&self) -> &TenantCache {
        &self.cache
    }

    /// Cached tenant for `host`, without consulting the directory.
    pub fn cached(&self, host: &str) -> Option<Arc<TenantConfig>> {
        let subdomain = self.strategy.subdomain(host)?;
        self.cache.get(&subdomain)
    }

    #[instrument(skip(self), fields(host = %host))]
    pub async fn resolve(&self, host: &str) -> Result<Arc<TenantConfig>, ResolveError> {
        let subdomain = self
            .strategy
            .subdomain(host)
            .ok_or_else(|| ResolveError::NoSubdomain(host.to_string()))?;

        self.resolve_subdomain(&subdomain).await
    }

    /// Cached lookup. Failed lookups are never cached.
    pub async fn resolve_subdomain(&self, subdomain: &str) -> Result<Arc<TenantConfig>, ResolveError> {
        if !is_valid_subdomain(subdomain) {
            return Err(ResolveError::InvalidSubdomain(subdomain.to_string()));
        }

        if let Some(tenant) = self.cache.get(subdomain) {
            debug!(subdomain, tenant_id = %tenant.tenant_id, "Tenant cache hit");
            return Ok(tenant);
        }

        debug!(subdomain, "Tenant cache miss");

        let tenant = Arc::new(self.directory.resolve(subdomain).await?);
        self.cache
            .set(subdomain.to_string(), Arc::clone(&tenant), self.ttl);

        Ok(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::{DirectoryError, LabelSubdomainStrategy};
    use async_trait::async_trait;
    use school_gate_policy::SubscriptionTier;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::advance;

    const TTL: Duration = Duration::from_secs(300);

    #[derive(Default)]
    struct CountingDirectory {
        tenants: HashMap<String, TenantConfig>,
        calls: AtomicUsize,
    }

    impl CountingDirectory {
        fn with(subdomain: &str) -> Self {
            let mut tenants = HashMap::new();
            tenants.insert(
                subdomain.to_string(),
                TenantConfig {
                    subdomain: subdomain.to_string(),
                    tenant_id: format!("t-{}", subdomain),
                    display_name: "Harare Primary".to_string(),
                    subscription_tier: SubscriptionTier::Premium,
                    enabled_modules: Default::default(),
                    custom_domain: None,
                    is_active: true,
                },
            );
            Self {
                tenants,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TenantDirectory for CountingDirectory {
        async fn resolve(&self, subdomain: &str) -> Result<TenantConfig, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tenants
                .get(subdomain)
                .cloned()
                .ok_or_else(|| DirectoryError::NotFound(subdomain.to_string()))
        }
    }

    fn resolver(directory: Arc<CountingDirectory>) -> TenantResolver {
        TenantResolver::new(
            Arc::new(LabelSubdomainStrategy::new(None)),
            directory,
            TtlCache::new(),
            TTL,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_serves_repeat_lookups_until_expiry() {
        let directory = Arc::new(CountingDirectory::with("harare-primary"));
        let resolver = resolver(Arc::clone(&directory));

        for _ in 0..5 {
            let tenant = resolver.resolve("harare-primary.schoolgate.app").await.unwrap();
            assert_eq!(tenant.tenant_id, "t-harare-primary");
        }
        assert_eq!(directory.calls(), 1);

        advance(TTL).await;
        resolver.resolve("harare-primary.schoolgate.app").await.unwrap();
        resolver.resolve("harare-primary.schoolgate.app").await.unwrap();
        assert_eq!(directory.calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_not_cached() {
        let directory = Arc::new(CountingDirectory::default());
        let resolver = resolver(Arc::clone(&directory));

        for _ in 0..2 {
            let result = resolver.resolve("ghost.schoolgate.app").await;
            assert!(matches!(
                result,
                Err(ResolveError::Directory(DirectoryError::NotFound(_)))
            ));
        }
        assert_eq!(directory.calls(), 2);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_hosts_without_valid_subdomain_skip_directory() {
        let directory = Arc::new(CountingDirectory::default());
        let resolver = resolver(Arc::clone(&directory));

        assert!(matches!(
            resolver.resolve("schoolgate.app").await,
            Err(ResolveError::NoSubdomain(_))
        ));
        assert!(matches!(
            resolver.resolve("bad_label.schoolgate.app").await,
            Err(ResolveError::InvalidSubdomain(_))
        ));
        assert_eq!(directory.calls(), 0);
    }

    #[tokio::test]
    async fn test_cached_lookup_never_calls_directory() {
        let directory = Arc::new(CountingDirectory::with("harare-primary"));
        let resolver = resolver(Arc::clone(&directory));

        assert!(resolver.cached("harare-primary.schoolgate.app").is_none());
        assert!(resolver.cached("ghost.schoolgate.app").is_none());
        assert_eq!(directory.calls(), 0);

        resolver.resolve("harare-primary.schoolgate.app").await.unwrap();
        let cached = resolver.cached("Harare-Primary.schoolgate.app:443").unwrap();
        assert_eq!(cached.tenant_id, "t-harare-primary");
        assert_eq!(directory.calls(), 1);
    }
}
