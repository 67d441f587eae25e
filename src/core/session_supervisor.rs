//! 会话监管：同一会话同一时刻只允许一个调用
//!
//! 每个 conversation_id 一把 tokio Mutex；try_lock 失败即返回 ConversationBusy，不排队等待。
//! 不同会话之间互不影响。

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::AgentError;

#[derive(Debug, Default)]
pub struct SessionSupervisor {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// 持有期间该会话被独占；drop 即释放
#[derive(Debug)]
pub struct SessionGuard {
    conversation_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl SessionGuard {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试独占会话；已被占用时返回 ConversationBusy
    pub fn acquire(&self, conversation_id: &str) -> Result<SessionGuard, AgentError> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| AgentError::ConversationBusy(conversation_id.to_string()))?;
            locks
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock
            .try_lock_owned()
            .map_err(|_| AgentError::ConversationBusy(conversation_id.to_string()))?;
        Ok(SessionGuard {
            conversation_id: conversation_id.to_string(),
            _guard: guard,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_per_conversation() {
        let supervisor = SessionSupervisor::new();
        let g1 = supervisor.acquire("t1").unwrap();
        assert_eq!(g1.conversation_id(), "t1");
        assert!(matches!(supervisor.acquire("t1"), Err(AgentError::ConversationBusy(_))));
        // 其他会话不受影响
        let _g2 = supervisor.acquire("t2").unwrap();
        drop(g1);
        assert!(supervisor.acquire("t1").is_ok());
    }
}
