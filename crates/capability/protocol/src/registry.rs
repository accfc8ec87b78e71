//! 协议注册表
//!
//! 按协议名登记协议模块，并按端口配置启动监听。

use crate::connection::ServerContext;
use crate::error::ProtocolError;
use crate::mobilogix::MobilogixProtocol;
use crate::module::ProtocolModule;
use crate::tcp_server::TcpServer;
use crate::types::TransportKind;
use crate::udp_server::UdpServer;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 内置协议模块
pub fn builtin_modules() -> Vec<Arc<dyn ProtocolModule>> {
    vec![Arc::new(MobilogixProtocol::new())]
}

/// 已启动的监听
pub struct RunningServer {
    pub protocol: &'static str,
    pub transport: TransportKind,
    pub local_addr: SocketAddr,
    pub handle: JoinHandle<Result<(), ProtocolError>>,
}

#[derive(Default)]
pub struct ProtocolRegistry {
    modules: BTreeMap<&'static str, Arc<dyn ProtocolModule>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 包含全部内置协议的注册表
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for module in builtin_modules() {
            registry.modules.insert(module.name(), module);
        }
        registry
    }

    pub fn register(&mut self, module: Arc<dyn ProtocolModule>) -> Result<(), ProtocolError> {
        let name = module.name();
        if self.modules.contains_key(name) {
            return Err(ProtocolError::Config(format!(
                "protocol already registered: {name}"
            )));
        }
        self.modules.insert(name, module);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProtocolModule>> {
        self.modules.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.modules.keys().copied().collect()
    }

    pub fn modules(&self) -> impl Iterator<Item = &Arc<dyn ProtocolModule>> {
        self.modules.values()
    }

    /// 为每个配置了端口的协议、按其声明的每种传输方式启动监听
    ///
    /// 配置中出现未注册的协议名视为配置错误，不启动任何监听。
    pub async fn start(
        &self,
        host: &str,
        ports: &BTreeMap<String, u16>,
        context: ServerContext,
        shutdown: CancellationToken,
    ) -> Result<Vec<RunningServer>, ProtocolError> {
        let mut planned = Vec::with_capacity(ports.len());
        for (name, port) in ports {
            let module = self
                .get(name)
                .ok_or_else(|| ProtocolError::Config(format!("unknown protocol: {name}")))?;
            planned.push((module, *port));
        }

        let mut running = Vec::new();
        for (module, port) in planned {
            for transport in module.transports() {
                let addr = (host, port);
                let server = match transport {
                    TransportKind::Tcp => {
                        let server =
                            TcpServer::bind(Arc::clone(&module), addr, context.clone()).await?;
                        let local_addr = server.local_addr()?;
                        RunningServer {
                            protocol: module.name(),
                            transport: *transport,
                            local_addr,
                            handle: tokio::spawn(server.run(shutdown.clone())),
                        }
                    }
                    TransportKind::Udp => {
                        let server =
                            UdpServer::bind(Arc::clone(&module), addr, context.clone()).await?;
                        let local_addr = server.local_addr()?;
                        RunningServer {
                            protocol: module.name(),
                            transport: *transport,
                            local_addr,
                            handle: tokio::spawn(server.run(shutdown.clone())),
                        }
                    }
                };
                info!(
                    target: "gateway.protocol",
                    protocol = server.protocol,
                    transport = %server.transport,
                    addr = %server.local_addr,
                    "protocol_listener_started"
                );
                running.push(server);
            }
        }
        Ok(running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_contains_mobilogix() {
        let registry = ProtocolRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["mobilogix"]);
        assert!(registry.get("mobilogix").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ProtocolRegistry::with_builtin();
        let result = registry.register(Arc::new(MobilogixProtocol::new()));
        assert!(matches!(result, Err(ProtocolError::Config(_))));
    }
}
