// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: an in-memory hcloud project and Kubernetes object builders.

use crate::error::{CcmError, Result};
use crate::hcloud::RemoteClient;
use crate::types::server::{Datacenter, Location, PrivateNet, ServerIpv4, ServerPublicNet, ServerType};
use crate::types::{
    Action, ActionError, ActionStatus, ListenerBinding, LoadBalancer, LoadBalancerCreateOpts,
    LoadBalancerPublicNet, Network, NetworkRoute, PublicAddress, Server, ServerStatus, Target,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use k8s_openapi::api::core::v1::{
    Node, NodeAddress, NodeSpec, NodeStatus, Service, ServicePort, ServiceSpec,
};
use http::StatusCode;
use kube::api::ObjectMeta;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

/// A mutating call recorded by [`FakeCloud`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateLoadBalancer { name: String },
    DeleteLoadBalancer { id: i64 },
    AddService { load_balancer: i64, binding: ListenerBinding },
    UpdateService { load_balancer: i64, binding: ListenerBinding },
    DeleteService { load_balancer: i64, listen_port: u16 },
    AddTarget { load_balancer: i64, server: i64 },
    RemoveTarget { load_balancer: i64, server: i64 },
    AddRoute { network: i64, route: NetworkRoute },
    DeleteRoute { network: i64, route: NetworkRoute },
}

#[derive(Default)]
struct State {
    load_balancers: BTreeMap<i64, LoadBalancer>,
    networks: BTreeMap<i64, Network>,
    servers: Vec<Server>,
    actions: HashMap<i64, Action>,
    next_id: i64,
    calls: Vec<Call>,
    /// command -> failure reason reported by the finished action
    failing_actions: HashMap<String, String>,
    /// operation -> error message returned by the request itself
    rejected_requests: HashMap<String, String>,
    hold_actions: bool,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        1000 + self.next_id
    }

    fn check(&self, operation: &str) -> Result<()> {
        match self.rejected_requests.get(operation) {
            Some(message) => Err(CcmError::Transport(message.clone())),
            None => Ok(()),
        }
    }

    fn start_action(&mut self, command: &str) -> Action {
        let id = self.next_id();
        let action = Action {
            id,
            command: command.to_string(),
            status: ActionStatus::Running,
            progress: 0,
            error: None,
        };
        self.actions.insert(id, action.clone());
        action
    }

    fn load_balancer_mut(&mut self, id: i64) -> Result<&mut LoadBalancer> {
        self.load_balancers
            .get_mut(&id)
            .ok_or_else(|| CcmError::NotFound(format!("load balancer {}", id)))
    }

    fn network_mut(&mut self, id: i64) -> Result<&mut Network> {
        self.networks
            .get_mut(&id)
            .ok_or_else(|| CcmError::NotFound(format!("network {}", id)))
    }
}

/// An in-memory hcloud project implementing [`RemoteClient`].
///
/// Mutations are applied to the in-memory state immediately and recorded.
/// Actions finish successfully unless configured otherwise.
#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<State>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_load_balancer(self, load_balancer: LoadBalancer) -> Self {
        self.state
            .lock()
            .unwrap()
            .load_balancers
            .insert(load_balancer.id, load_balancer);
        self
    }

    pub fn with_network(self, network: Network) -> Self {
        self.state.lock().unwrap().networks.insert(network.id, network);
        self
    }

    pub fn with_server(self, server: Server) -> Self {
        self.state.lock().unwrap().servers.push(server);
        self
    }

    /// Actions with this command finish with an error
    pub fn fail_action(self, command: &str, reason: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_actions
            .insert(command.to_string(), reason.to_string());
        self
    }

    /// Calls to this operation (trait method name) fail with a transport error
    pub fn reject_request(self, operation: &str, message: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .rejected_requests
            .insert(operation.to_string(), message.to_string());
        self
    }

    /// Actions never finish
    pub fn hold_actions(self) -> Self {
        self.state.lock().unwrap().hold_actions = true;
        self
    }

    /// Register a running action, as a mutation would
    pub fn start_action(&self, command: &str) -> Action {
        self.state.lock().unwrap().start_action(command)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn load_balancer(&self, id: i64) -> Option<LoadBalancer> {
        self.state.lock().unwrap().load_balancers.get(&id).cloned()
    }

    pub fn load_balancer_named(&self, name: &str) -> Option<LoadBalancer> {
        self.state
            .lock()
            .unwrap()
            .load_balancers
            .values()
            .find(|lb| lb.name == name)
            .cloned()
    }

    pub fn network(&self, id: i64) -> Option<Network> {
        self.state.lock().unwrap().networks.get(&id).cloned()
    }
}

#[async_trait]
impl RemoteClient for FakeCloud {
    async fn load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>> {
        self.state.lock().unwrap().check("load_balancer_by_name")?;
        Ok(self.load_balancer_named(name))
    }

    async fn load_balancer_by_id(&self, id: i64) -> Result<Option<LoadBalancer>> {
        self.state.lock().unwrap().check("load_balancer_by_id")?;
        Ok(self.load_balancer(id))
    }

    async fn create_load_balancer(
        &self,
        opts: &LoadBalancerCreateOpts,
    ) -> Result<(LoadBalancer, Action)> {
        let mut state = self.state.lock().unwrap();
        state.check("create_load_balancer")?;
        state.calls.push(Call::CreateLoadBalancer {
            name: opts.name.clone(),
        });

        let id = state.next_id();
        let created = LoadBalancer {
            id,
            name: opts.name.clone(),
            public_net: LoadBalancerPublicNet::default(),
            services: Vec::new(),
            targets: Vec::new(),
        };
        // Addresses are only assigned once provisioning finished
        let mut provisioned = created.clone();
        provisioned.public_net = make_public_net("203.0.113.10", "2001:db8::10", None);
        state.load_balancers.insert(id, provisioned);

        let action = state.start_action("create_load_balancer");
        Ok((created, action))
    }

    async fn delete_load_balancer(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check("delete_load_balancer")?;
        state.calls.push(Call::DeleteLoadBalancer { id });
        state.load_balancers.remove(&id);
        Ok(())
    }

    async fn add_service(&self, load_balancer: i64, binding: &ListenerBinding) -> Result<Action> {
        let mut state = self.state.lock().unwrap();
        state.check("add_service")?;
        state.calls.push(Call::AddService {
            load_balancer,
            binding: binding.clone(),
        });
        state.load_balancer_mut(load_balancer)?.services.push(binding.clone());
        Ok(state.start_action("add_service"))
    }

    async fn update_service(
        &self,
        load_balancer: i64,
        binding: &ListenerBinding,
    ) -> Result<Action> {
        let mut state = self.state.lock().unwrap();
        state.check("update_service")?;
        state.calls.push(Call::UpdateService {
            load_balancer,
            binding: binding.clone(),
        });
        let lb = state.load_balancer_mut(load_balancer)?;
        for service in lb.services.iter_mut() {
            if service.listen_port == binding.listen_port {
                *service = binding.clone();
            }
        }
        Ok(state.start_action("update_service"))
    }

    async fn delete_service(&self, load_balancer: i64, listen_port: u16) -> Result<Action> {
        let mut state = self.state.lock().unwrap();
        state.check("delete_service")?;
        state.calls.push(Call::DeleteService {
            load_balancer,
            listen_port,
        });
        state
            .load_balancer_mut(load_balancer)?
            .services
            .retain(|s| s.listen_port != listen_port);
        Ok(state.start_action("delete_service"))
    }

    async fn add_server_target(&self, load_balancer: i64, server: i64) -> Result<Action> {
        let mut state = self.state.lock().unwrap();
        state.check("add_server_target")?;
        state.calls.push(Call::AddTarget {
            load_balancer,
            server,
        });
        state
            .load_balancer_mut(load_balancer)?
            .targets
            .push(Target::server(server));
        Ok(state.start_action("add_target"))
    }

    async fn remove_server_target(&self, load_balancer: i64, server: i64) -> Result<Action> {
        let mut state = self.state.lock().unwrap();
        state.check("remove_server_target")?;
        state.calls.push(Call::RemoveTarget {
            load_balancer,
            server,
        });
        state
            .load_balancer_mut(load_balancer)?
            .targets
            .retain(|t| t.server_id() != Some(server));
        Ok(state.start_action("remove_target"))
    }

    async fn network_by_id(&self, id: i64) -> Result<Option<Network>> {
        self.state.lock().unwrap().check("network_by_id")?;
        Ok(self.network(id))
    }

    async fn add_route(&self, network: i64, route: &NetworkRoute) -> Result<Action> {
        let mut state = self.state.lock().unwrap();
        state.check("add_route")?;
        state.calls.push(Call::AddRoute {
            network,
            route: *route,
        });
        let routes = &mut state.network_mut(network)?.routes;
        if !routes.contains(route) {
            routes.push(*route);
        }
        Ok(state.start_action("add_route"))
    }

    async fn delete_route(&self, network: i64, route: &NetworkRoute) -> Result<Action> {
        let mut state = self.state.lock().unwrap();
        state.check("delete_route")?;
        state.calls.push(Call::DeleteRoute {
            network,
            route: *route,
        });
        state.network_mut(network)?.routes.retain(|r| r != route);
        Ok(state.start_action("delete_route"))
    }

    async fn all_servers(&self) -> Result<Vec<Server>> {
        let state = self.state.lock().unwrap();
        state.check("all_servers")?;
        Ok(state.servers.clone())
    }

    async fn server_by_id(&self, id: i64) -> Result<Option<Server>> {
        let state = self.state.lock().unwrap();
        state.check("server_by_id")?;
        Ok(state.servers.iter().find(|s| s.id == id).cloned())
    }

    async fn server_by_name(&self, name: &str) -> Result<Option<Server>> {
        let state = self.state.lock().unwrap();
        state.check("server_by_name")?;
        Ok(state.servers.iter().find(|s| s.name == name).cloned())
    }

    fn watch_action(&self, id: i64) -> BoxStream<'static, Result<Action>> {
        let state = self.state.lock().unwrap();

        let Some(running) = state.actions.get(&id).cloned() else {
            return stream::iter([Err(CcmError::NotFound(format!("action {}", id)))]).boxed();
        };
        if state.hold_actions {
            return stream::iter([Ok(running)]).chain(stream::pending()).boxed();
        }

        let mut finished = running.clone();
        finished.progress = 100;
        match state.failing_actions.get(&running.command) {
            Some(reason) => {
                finished.status = ActionStatus::Error;
                finished.error = Some(ActionError {
                    code: "action_failed".to_string(),
                    message: reason.clone(),
                });
            }
            None => finished.status = ActionStatus::Success,
        }

        stream::iter([Ok(running), Ok(finished)]).boxed()
    }
}

/// A request received by [`ApiStub`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    /// Path including the query string
    pub target: String,
    pub authorization: Option<String>,
    pub body: String,
}

type Responses = HashMap<(String, String), VecDeque<(u16, String)>>;

/// An HTTP server on localhost answering with canned JSON responses.
///
/// Responses are keyed by method and either the full request target (path and
/// query) or the bare path. Several responses for the same key are served in
/// order, the last one repeating. Unmatched requests get a 404.
#[derive(Clone, Default)]
pub struct ApiStub {
    responses: Arc<Mutex<Responses>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ApiStub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, method: &str, target: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry((method.to_string(), target.to_string()))
            .or_default()
            .push_back((status, body.to_string()));
        self
    }

    pub fn on_get(self, target: &str, status: u16, body: &str) -> Self {
        self.on("GET", target, status, body)
    }

    pub fn on_post(self, target: &str, status: u16, body: &str) -> Self {
        self.on("POST", target, status, body)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Serve on an ephemeral port and return the API endpoint (`.../v1`)
    pub async fn start(self) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let stub = self.clone();
                tokio::spawn(async move { stub.handle(socket).await });
            }
        });

        Url::parse(&format!("http://{}/v1", address)).unwrap()
    }

    fn respond(&self, method: &str, target: &str) -> (u16, String) {
        let mut responses = self.responses.lock().unwrap();
        let path = target.split('?').next().unwrap_or(target);

        let key = [target, path]
            .into_iter()
            .map(|t| (method.to_string(), t.to_string()))
            .find(|k| responses.contains_key(k));

        match key.and_then(|k| responses.get_mut(&k)) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap(),
            None => (404, not_found_json(path)),
        }
    }

    async fn handle(&self, mut socket: TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.lines();
        let mut request_line = lines.next().unwrap_or_default().split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let target = request_line.next().unwrap_or_default().to_string();

        let headers: Vec<(String, String)> = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        let header = |name: &str| headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());
        let content_length = header("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.clone(),
            target: target.clone(),
            authorization: header("authorization"),
            body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
        });

        let (status, body) = self.respond(&method, &target);
        let reason = StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("");
        let response = format!(
            "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            reason,
            body.len(),
            body
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    }
}

/// hcloud error envelope
pub fn api_error_json(code: &str, message: &str) -> String {
    serde_json::json!({"error": {"code": code, "message": message}}).to_string()
}

pub fn not_found_json(path: &str) -> String {
    api_error_json("not_found", &format!("{} not found", path))
}

pub fn action_json(id: i64, command: &str, status: &str) -> String {
    let error = (status == "error")
        .then(|| serde_json::json!({"code": "action_failed", "message": "action failed"}));
    serde_json::json!({
        "action": {"id": id, "command": command, "status": status, "progress": 0, "error": error}
    })
    .to_string()
}

pub fn make_action(id: i64, command: &str, status: ActionStatus) -> Action {
    Action {
        id,
        command: command.to_string(),
        status,
        progress: 0,
        error: None,
    }
}

pub fn make_public_net(ipv4: &str, ipv6: &str, dns_ptr: Option<&str>) -> LoadBalancerPublicNet {
    LoadBalancerPublicNet {
        ipv4: PublicAddress {
            ip: Some(ipv4.parse().unwrap()),
            dns_ptr: dns_ptr.map(str::to_string),
        },
        ipv6: PublicAddress {
            ip: Some(ipv6.parse().unwrap()),
            dns_ptr: None,
        },
    }
}

pub fn make_load_balancer(
    id: i64,
    name: &str,
    services: &[(u16, u16)],
    targets: &[i64],
) -> LoadBalancer {
    LoadBalancer {
        id,
        name: name.to_string(),
        public_net: make_public_net("198.51.100.7", "2001:db8::7", Some("lb.example.com")),
        services: services
            .iter()
            .map(|(listen, dest)| ListenerBinding::tcp(*listen, *dest))
            .collect(),
        targets: targets.iter().map(|id| Target::server(*id)).collect(),
    }
}

pub fn make_network(id: i64, routes: &[(&str, &str)]) -> Network {
    Network {
        id,
        name: "kubernetes".to_string(),
        routes: routes
            .iter()
            .map(|(destination, gateway)| NetworkRoute {
                destination: destination.parse().unwrap(),
                gateway: gateway.parse().unwrap(),
            })
            .collect(),
    }
}

/// A running server, optionally attached to a network with a private IP
pub fn make_server(id: i64, name: &str, private_net: Option<(i64, &str)>) -> Server {
    Server {
        id,
        name: name.to_string(),
        status: ServerStatus::Running,
        public_net: ServerPublicNet {
            ipv4: Some(ServerIpv4 {
                ip: "192.0.2.1".parse().unwrap(),
            }),
            ipv6: None,
        },
        private_net: private_net
            .into_iter()
            .map(|(network, ip)| PrivateNet {
                network,
                ip: ip.parse().unwrap(),
            })
            .collect(),
        server_type: Some(ServerType {
            name: "cx22".to_string(),
        }),
        datacenter: Some(Datacenter {
            location: Location {
                name: "fsn1".to_string(),
                network_zone: "eu-central".to_string(),
            },
        }),
    }
}

/// A Service of type LoadBalancer with (port, nodePort) pairs
pub fn make_service(namespace: &str, name: &str, ports: &[(i32, i32)]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            ports: Some(
                ports
                    .iter()
                    .map(|(port, node_port)| ServicePort {
                        port: *port,
                        node_port: Some(*node_port),
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn make_node(name: &str, provider_id: Option<&str>, internal_ip: Option<&str>) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: provider_id.map(str::to_string),
            ..Default::default()
        }),
        status: Some(NodeStatus {
            addresses: Some(
                internal_ip
                    .into_iter()
                    .map(|ip| NodeAddress {
                        type_: "InternalIP".to_string(),
                        address: ip.to_string(),
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
    }
}
