//! 设备会话注册表
//!
//! 维护 设备 → 当前连接 的映射，命令下发据此路由。
//!
//! ## 规则
//!
//! - 同一设备同一时刻最多一个会话，后绑定者覆盖（最后写入者胜出）
//! - 一个连接可以承载多个设备（多路复用协议）
//! - 连接关闭时只解绑仍指向该连接的会话，不会误删已被新连接接管的会话
//! - 查找到已关闭的连接视为无会话，并顺带清理

use crate::channel::{ChannelHandle, ChannelId};
use crate::module::ProtocolModule;
use crate::types::TransportKind;
use dashmap::DashMap;
use domain::now_epoch_ms;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

/// 已识别的设备会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSession {
    pub device_id: i64,
    pub unique_id: String,
    pub protocol: String,
}

/// 命令路由目标
#[derive(Clone)]
pub struct SessionRoute {
    pub session: DeviceSession,
    pub channel: ChannelHandle,
    pub module: Arc<dyn ProtocolModule>,
}

/// 会话快照（运维查询）
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub device_id: i64,
    pub unique_id: String,
    pub protocol: String,
    pub channel_id: ChannelId,
    pub remote: SocketAddr,
    pub transport: TransportKind,
    pub bound_at_ms: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no active session for device {0}")]
    NoActiveSession(i64),
}

struct SessionEntry {
    route: SessionRoute,
    bound_at_ms: i64,
}

#[derive(Default)]
pub struct SessionRegistry {
    by_device: DashMap<i64, SessionEntry>,
    by_channel: DashMap<ChannelId, HashSet<i64>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定设备到连接；若覆盖了其他连接上的会话，返回旧连接 ID
    pub fn bind(
        &self,
        session: DeviceSession,
        channel: ChannelHandle,
        module: Arc<dyn ProtocolModule>,
    ) -> Option<ChannelId> {
        let device_id = session.device_id;
        let channel_id = channel.id();
        self.by_channel
            .entry(channel_id)
            .or_default()
            .insert(device_id);

        let previous = self.by_device.insert(
            device_id,
            SessionEntry {
                route: SessionRoute {
                    session,
                    channel,
                    module,
                },
                bound_at_ms: now_epoch_ms(),
            },
        );
        let superseded = previous
            .map(|entry| entry.route.channel.id())
            .filter(|old| *old != channel_id)?;

        {
            if let Some(mut devices) = self.by_channel.get_mut(&superseded) {
                devices.remove(&device_id);
            }
        }
        self.by_channel
            .remove_if(&superseded, |_, devices| devices.is_empty());
        Some(superseded)
    }

    /// 查找设备的当前路由
    pub fn lookup(&self, device_id: i64) -> Result<SessionRoute, SessionError> {
        let route = self
            .by_device
            .get(&device_id)
            .map(|entry| entry.route.clone());
        match route {
            Some(route) if !route.channel.is_closed() => Ok(route),
            Some(stale) => {
                let stale_id = stale.channel.id();
                self.by_device
                    .remove_if(&device_id, |_, entry| entry.route.channel.id() == stale_id);
                Err(SessionError::NoActiveSession(device_id))
            }
            None => Err(SessionError::NoActiveSession(device_id)),
        }
    }

    /// 设备当前是否绑定在指定连接上
    pub fn is_bound_to(&self, device_id: i64, channel_id: ChannelId) -> bool {
        self.by_device
            .get(&device_id)
            .map(|entry| entry.route.channel.id() == channel_id)
            .unwrap_or(false)
    }

    /// 连接关闭：移除仍指向该连接的会话，返回被移除的设备 ID
    pub fn unbind(&self, channel_id: ChannelId) -> Vec<i64> {
        let Some((_, devices)) = self.by_channel.remove(&channel_id) else {
            return Vec::new();
        };
        let mut removed: Vec<i64> = devices
            .into_iter()
            .filter(|device_id| {
                self.by_device
                    .remove_if(device_id, |_, entry| entry.route.channel.id() == channel_id)
                    .is_some()
            })
            .collect();
        removed.sort_unstable();
        removed
    }

    pub fn len(&self) -> usize {
        self.by_device.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_device.is_empty()
    }

    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = self
            .by_device
            .iter()
            .map(|entry| {
                let route = &entry.route;
                SessionSnapshot {
                    device_id: route.session.device_id,
                    unique_id: route.session.unique_id.clone(),
                    protocol: route.session.protocol.clone(),
                    channel_id: route.channel.id(),
                    remote: route.channel.remote(),
                    transport: route.channel.transport(),
                    bound_at_ms: entry.bound_at_ms,
                }
            })
            .collect();
        sessions.sort_by_key(|session| session.device_id);
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::mobilogix::MobilogixProtocol;

    fn session(device_id: i64) -> DeviceSession {
        DeviceSession {
            device_id,
            unique_id: format!("dev-{device_id}"),
            protocol: "mobilogix".to_string(),
        }
    }

    fn open(port: u16) -> (ChannelHandle, MemoryChannel) {
        MemoryChannel::open(
            SocketAddr::from(([127, 0, 0, 1], port)),
            TransportKind::Tcp,
            4,
        )
    }

    fn module() -> Arc<dyn ProtocolModule> {
        Arc::new(MobilogixProtocol::new())
    }

    #[test]
    fn rebind_supersedes_previous_channel() {
        let registry = SessionRegistry::new();
        let (a, _ma) = open(1);
        let (b, _mb) = open(2);

        assert_eq!(registry.bind(session(7), a.clone(), module()), None);
        assert_eq!(registry.bind(session(7), a.clone(), module()), None);
        assert_eq!(registry.bind(session(7), b.clone(), module()), Some(a.id()));

        let route = registry.lookup(7).ok().expect("route");
        assert_eq!(route.channel.id(), b.id());
        // 旧连接关闭不能移除新会话
        assert!(registry.unbind(a.id()).is_empty());
        assert!(registry.is_bound_to(7, b.id()));
        assert_eq!(registry.unbind(b.id()), vec![7]);
        assert!(registry.is_empty());
    }

    #[test]
    fn one_channel_may_carry_several_devices() {
        let registry = SessionRegistry::new();
        let (a, _ma) = open(1);
        registry.bind(session(1), a.clone(), module());
        registry.bind(session(2), a.clone(), module());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.sessions()[1].unique_id, "dev-2");
        assert_eq!(registry.unbind(a.id()), vec![1, 2]);
    }

    #[test]
    fn lookup_evicts_closed_channel() {
        let registry = SessionRegistry::new();
        let (a, memory) = open(1);
        registry.bind(session(3), a.clone(), module());
        drop(memory);
        assert!(matches!(
            registry.lookup(3),
            Err(SessionError::NoActiveSession(3))
        ));
        assert!(registry.is_empty());
        assert!(matches!(
            registry.lookup(99),
            Err(SessionError::NoActiveSession(99))
        ));
    }
}
