//! The client facade feature views talk to.

use crate::api_client::{ApiQueryFetcher, RestClient, ScholarisApi};
use crate::config::ScholarisConfig;
use crate::error::{ClientError, ClientResult};
use crate::keys;
use crate::notifications::{Notification, NotificationCenter};
use futures_util::future::join_all;
use scholaris_cache::{
    CacheRead, Freshness, Mutation, MutationError, QueryClient, QueryKey, ServerAck,
};
use scholaris_core::{UploadPolicy, UserId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// The signed-in user, stamped on optimistic placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewer {
    pub user_id: UserId,
    pub display_name: String,
}

pub struct ScholarisClient<A> {
    pub(crate) api: Arc<A>,
    pub(crate) queries: QueryClient,
    pub(crate) notifications: Arc<NotificationCenter>,
    pub(crate) upload_policy: UploadPolicy,
    pub(crate) viewer: Viewer,
}

impl ScholarisClient<RestClient> {
    /// Build a REST-backed client from a validated config.
    pub fn from_config(config: &ScholarisConfig, viewer: Viewer) -> ClientResult<Self> {
        let api = Arc::new(RestClient::new(config)?);
        Self::new(
            api,
            QueryClient::new(config.cache_config()),
            NotificationCenter::from_settings(&config.notifications),
            config.upload_policy(),
            viewer,
        )
    }
}

impl<A: ScholarisApi + 'static> ScholarisClient<A> {
    /// Wire `api` in as the fetcher for every REST-backed domain.
    pub fn new(
        api: Arc<A>,
        queries: QueryClient,
        notifications: NotificationCenter,
        upload_policy: UploadPolicy,
        viewer: Viewer,
    ) -> ClientResult<Self> {
        let fetcher = Arc::new(ApiQueryFetcher::new(Arc::clone(&api)));
        for domain in keys::DOMAINS {
            queries.register_fetcher(QueryKey::new(domain), fetcher.clone())?;
        }
        Ok(Self {
            api,
            queries,
            notifications: Arc::new(notifications),
            upload_policy,
            viewer,
        })
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn upload_policy(&self) -> &UploadPolicy {
        &self.upload_policy
    }

    /// Read `key`, fetching from the backend unless `freshness` is satisfied.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        key: &QueryKey,
        freshness: Freshness,
    ) -> ClientResult<CacheRead<T>> {
        Ok(self.queries.fetch_query(key, freshness).await?)
    }

    /// Load several keys concurrently. Every key is attempted; the first
    /// failure is returned.
    pub async fn prefetch(&self, keys: &[QueryKey]) -> ClientResult<()> {
        let reads = keys
            .iter()
            .map(|key| self.queries.fetch_query::<Value>(key, Freshness::Fresh));
        for result in join_all(reads).await {
            result?;
        }
        Ok(())
    }

    /// Run `mutation` around `server_call`, toasting any failure.
    pub(crate) async fn run_mutation<Fut>(
        &self,
        operation: &str,
        mutation: Mutation,
        server_call: Fut,
    ) -> ClientResult<ServerAck>
    where
        Fut: Future<Output = Result<ServerAck, MutationError>>,
    {
        match self.queries.mutate(mutation, server_call).await {
            Ok(ack) => Ok(ack),
            Err(err) => {
                tracing::warn!(operation, error = %err, "Mutation failed");
                self.notifications
                    .push(Notification::mutation_failed(operation, &err));
                Err(ClientError::Mutation(err))
            }
        }
    }
}

/// Decode the canonical entity carried by a settled mutation.
pub(crate) fn server_entity<T: DeserializeOwned>(ack: &ServerAck) -> ClientResult<T> {
    ack.decode::<T>()?
        .ok_or_else(|| MutationError::malformed("server returned no entity").into())
}
