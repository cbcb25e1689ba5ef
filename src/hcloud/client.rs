// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! HTTP implementation of [`RemoteClient`] against the hcloud API.

use crate::config::Config;
use crate::constants::{action, api, USER_AGENT};
use crate::error::{CcmError, Result};
use crate::hcloud::RemoteClient;
use crate::types::{
    Action, ListenerBinding, LoadBalancer, LoadBalancerCreateOpts, Network, NetworkRoute, Server,
    Target,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument};
use url::Url;

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    code: String,
    message: String,
}

#[derive(Deserialize)]
struct LoadBalancerResponse {
    load_balancer: LoadBalancer,
}

#[derive(Deserialize)]
struct LoadBalancersResponse {
    load_balancers: Vec<LoadBalancer>,
}

#[derive(Deserialize)]
struct CreateLoadBalancerResponse {
    load_balancer: LoadBalancer,
    action: Action,
}

#[derive(Deserialize)]
struct ActionResponse {
    action: Action,
}

#[derive(Deserialize)]
struct NetworkResponse {
    network: Network,
}

#[derive(Deserialize)]
struct ServerResponse {
    server: Server,
}

#[derive(Deserialize)]
struct ServersResponse {
    servers: Vec<Server>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Deserialize)]
struct Meta {
    pagination: Pagination,
}

#[derive(Deserialize)]
struct Pagination {
    next_page: Option<u32>,
}

#[derive(Serialize)]
struct ListenPortBody {
    listen_port: u16,
}

#[derive(Serialize)]
struct AddTargetBody {
    #[serde(flatten)]
    target: Target,
    use_private_ip: bool,
}

/// Client for the hcloud API.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct HcloudClient {
    http: reqwest::Client,
    endpoint: Url,
    token: String,
    poll_interval: Duration,
    poll_max_interval: Duration,
    debug: bool,
}

impl HcloudClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CcmError::Config(format!("Failed to build HTTP client: {}", e)))?;

        // Relative joins replace the last path segment unless it ends with '/'
        let mut endpoint = config.endpoint.clone();
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            http,
            endpoint,
            token: config.token.clone(),
            poll_interval: config.action_poll_interval,
            poll_max_interval: Duration::from_millis(action::POLL_MAX_INTERVAL_MS)
                .max(config.action_poll_interval),
            debug: config.debug,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.endpoint
            .join(path)
            .map_err(|e| CcmError::Config(format!("Invalid API path {}: {}", path, e)))
    }

    /// Send a request and return the response body if it was successful or
    /// `None` on a 404
    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<Option<String>> {
        let url = self.url(path)?;
        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(&self.token)
            .query(query);
        if let Some(body) = body {
            if self.debug {
                let payload = serde_json::to_string(body).unwrap_or_default();
                debug!("{} {} request: {}", method, path, payload);
            }
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CcmError::Transport(format!("{} {}: {}", method, path, e)))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            CcmError::Transport(format!("{} {}: failed to read response: {}", method, path, e))
        })?;

        if self.debug {
            debug!("{} {} -> {}: {}", method, path, status, text);
        }

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let reason = match serde_json::from_str::<ApiErrorBody>(&text) {
                Ok(body) => format!("{} ({})", body.error.message, body.error.code),
                Err(_) => text,
            };
            return Err(CcmError::Transport(format!(
                "{} {} returned {}: {}",
                method, path, status, reason
            )));
        }

        Ok(Some(text))
    }

    fn decode<T: DeserializeOwned>(method: &Method, path: &str, body: &str) -> Result<T> {
        serde_json::from_str(body).map_err(|e| {
            CcmError::Transport(format!("{} {}: invalid response body: {}", method, path, e))
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        match self.request::<()>(Method::GET, path, query, None).await? {
            Some(body) => Ok(Some(Self::decode(&Method::GET, path, &body)?)),
            None => Ok(None),
        }
    }

    /// POST to an endpoint that must exist
    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        match self.request(Method::POST, path, &[], Some(body)).await? {
            Some(body) => Self::decode(&Method::POST, path, &body),
            None => Err(CcmError::NotFound(format!("POST {}", path))),
        }
    }

    async fn post_action<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Action> {
        let response: ActionResponse = self.post(path, body).await?;
        Ok(response.action)
    }

    pub async fn action_by_id(&self, id: i64) -> Result<Action> {
        let path = format!("actions/{}", id);
        match self.get::<ActionResponse>(&path, &[]).await? {
            Some(response) => Ok(response.action),
            None => Err(CcmError::NotFound(format!("action {}", id))),
        }
    }

    fn next_poll_delay(&self, previous: Duration) -> Duration {
        if previous.is_zero() {
            self.poll_interval
        } else {
            (previous * 2).min(self.poll_max_interval)
        }
    }
}

#[async_trait]
impl RemoteClient for HcloudClient {
    #[instrument(skip(self))]
    async fn load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>> {
        let response: Option<LoadBalancersResponse> = self
            .get("load_balancers", &[("name", name.to_string())])
            .await?;
        Ok(response.and_then(|r| r.load_balancers.into_iter().next()))
    }

    async fn load_balancer_by_id(&self, id: i64) -> Result<Option<LoadBalancer>> {
        let path = format!("load_balancers/{}", id);
        let response: Option<LoadBalancerResponse> = self.get(&path, &[]).await?;
        Ok(response.map(|r| r.load_balancer))
    }

    #[instrument(skip(self, opts), fields(name = %opts.name))]
    async fn create_load_balancer(
        &self,
        opts: &LoadBalancerCreateOpts,
    ) -> Result<(LoadBalancer, Action)> {
        let response: CreateLoadBalancerResponse = self.post("load_balancers", opts).await?;
        Ok((response.load_balancer, response.action))
    }

    async fn delete_load_balancer(&self, id: i64) -> Result<()> {
        let path = format!("load_balancers/{}", id);
        // Already gone is as good as deleted
        self.request::<()>(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }

    async fn add_service(&self, load_balancer: i64, binding: &ListenerBinding) -> Result<Action> {
        let path = format!("load_balancers/{}/actions/add_service", load_balancer);
        self.post_action(&path, binding).await
    }

    async fn update_service(
        &self,
        load_balancer: i64,
        binding: &ListenerBinding,
    ) -> Result<Action> {
        let path = format!("load_balancers/{}/actions/update_service", load_balancer);
        self.post_action(&path, binding).await
    }

    async fn delete_service(&self, load_balancer: i64, listen_port: u16) -> Result<Action> {
        let path = format!("load_balancers/{}/actions/delete_service", load_balancer);
        self.post_action(&path, &ListenPortBody { listen_port }).await
    }

    async fn add_server_target(&self, load_balancer: i64, server: i64) -> Result<Action> {
        let path = format!("load_balancers/{}/actions/add_target", load_balancer);
        let body = AddTargetBody {
            target: Target::server(server),
            use_private_ip: false,
        };
        self.post_action(&path, &body).await
    }

    async fn remove_server_target(&self, load_balancer: i64, server: i64) -> Result<Action> {
        let path = format!("load_balancers/{}/actions/remove_target", load_balancer);
        self.post_action(&path, &Target::server(server)).await
    }

    async fn network_by_id(&self, id: i64) -> Result<Option<Network>> {
        let path = format!("networks/{}", id);
        let response: Option<NetworkResponse> = self.get(&path, &[]).await?;
        Ok(response.map(|r| r.network))
    }

    #[instrument(skip(self, route), fields(route = %route))]
    async fn add_route(&self, network: i64, route: &NetworkRoute) -> Result<Action> {
        let path = format!("networks/{}/actions/add_route", network);
        self.post_action(&path, route).await
    }

    #[instrument(skip(self, route), fields(route = %route))]
    async fn delete_route(&self, network: i64, route: &NetworkRoute) -> Result<Action> {
        let path = format!("networks/{}/actions/delete_route", network);
        self.post_action(&path, route).await
    }

    #[instrument(skip(self))]
    async fn all_servers(&self) -> Result<Vec<Server>> {
        let mut servers = Vec::new();
        let mut page = Some(1u32);

        while let Some(current) = page {
            let query = [
                ("page", current.to_string()),
                ("per_page", api::SERVERS_PER_PAGE.to_string()),
            ];
            let Some(response) = self.get::<ServersResponse>("servers", &query).await? else {
                return Err(CcmError::NotFound("servers endpoint".to_string()));
            };

            servers.extend(response.servers);
            page = response.meta.and_then(|m| m.pagination.next_page);
        }

        debug!("Listed {} servers", servers.len());
        Ok(servers)
    }

    async fn server_by_id(&self, id: i64) -> Result<Option<Server>> {
        let path = format!("servers/{}", id);
        let response: Option<ServerResponse> = self.get(&path, &[]).await?;
        Ok(response.map(|r| r.server))
    }

    async fn server_by_name(&self, name: &str) -> Result<Option<Server>> {
        let response: Option<ServersResponse> =
            self.get("servers", &[("name", name.to_string())]).await?;
        Ok(response.and_then(|r| r.servers.into_iter().next()))
    }

    /// Polls the action with exponential backoff, emitting every snapshot
    fn watch_action(&self, id: i64) -> BoxStream<'static, Result<Action>> {
        let client = self.clone();

        stream::unfold(Some(Duration::ZERO), move |delay| {
            let client = client.clone();
            async move {
                let delay = delay?;
                if !delay.is_zero() {
                    sleep(delay).await;
                }

                match client.action_by_id(id).await {
                    Ok(action) => {
                        let next = (!action.status.is_terminal())
                            .then(|| client.next_poll_delay(delay));
                        Some((Ok(action), next))
                    }
                    Err(e) => Some((Err(e), None)),
                }
            }
        })
        .boxed()
    }
}
