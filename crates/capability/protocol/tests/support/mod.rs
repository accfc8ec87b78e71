//! 集成测试公共装配
#![allow(dead_code)]

use domain::{Device, Position};
use gateway_protocol::{ServerContext, SessionRegistry};
use gateway_storage::InMemoryDeviceDirectory;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct Fixture {
    pub context: ServerContext,
    pub sessions: Arc<SessionRegistry>,
    pub positions: mpsc::Receiver<Position>,
}

pub fn fixture() -> Fixture {
    fixture_with_capacity(64)
}

/// 位置通道容量可调的装配，用于模拟下游积压
pub fn fixture_with_capacity(capacity: usize) -> Fixture {
    let directory = InMemoryDeviceDirectory::new();
    directory
        .insert(Device::new(1, "ID123", "compact"))
        .expect("insert");
    directory
        .insert(Device::new(2, "201951132031", "full"))
        .expect("insert");
    let sessions = Arc::new(SessionRegistry::new());
    let (tx, positions) = mpsc::channel(capacity);
    let context = ServerContext::new(Arc::new(directory), Arc::clone(&sessions), tx);
    Fixture {
        context,
        sessions,
        positions,
    }
}

pub async fn next_position(rx: &mut mpsc::Receiver<Position>) -> Position {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("position timeout")
        .expect("position channel open")
}

/// 轮询直到条件成立（最多 2 秒）
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
