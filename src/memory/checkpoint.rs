//! 检查点：恢复一段对话所需的全部状态的序列化快照
//!
//! 存储层只把 Checkpoint 当作不透明的值来保存与取回（按 conversation_id 最后写入者胜出）；
//! 内部布局由 Orchestrator 通过 capture / restore 解释。
//! 实现：InMemoryCheckpointStore（进程内）、FileCheckpointStore（每会话一个 JSON 文件，先写临时文件再 rename）。
//! SQLite 实现见 async_persistence（需要 async-sqlite feature）。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::AgentError;

/// 不透明快照
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub conversation_id: String,
    /// 每次成功推进 +1
    pub version: u64,
    /// 序列化后的会话状态
    pub state: String,
    /// RFC3339
    pub saved_at: String,
}

impl Checkpoint {
    pub fn capture<T: Serialize>(
        conversation_id: &str,
        version: u64,
        state: &T,
    ) -> Result<Self, AgentError> {
        let state = serde_json::to_string(state)
            .map_err(|e| AgentError::Persistence(format!("serialize checkpoint: {e}")))?;
        Ok(Self {
            conversation_id: conversation_id.to_string(),
            version,
            state,
            saved_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn restore<T: DeserializeOwned>(&self) -> Result<T, AgentError> {
        serde_json::from_str(&self.state).map_err(|e| {
            AgentError::Persistence(format!(
                "corrupt checkpoint for {}: {e}",
                self.conversation_id
            ))
        })
    }
}

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, conversation_id: &str, checkpoint: &Checkpoint) -> Result<(), AgentError>;

    async fn load(&self, conversation_id: &str) -> Result<Option<Checkpoint>, AgentError>;
}

/// 进程内存储：进程退出即丢失，适合测试与演示
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    inner: RwLock<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, conversation_id: &str, checkpoint: &Checkpoint) -> Result<(), AgentError> {
        self.inner
            .write()
            .await
            .insert(conversation_id.to_string(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        Ok(self.inner.read().await.get(conversation_id).cloned())
    }
}

/// 文件存储：<dir>/<编码后的 conversation_id>.json
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, conversation_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", encode_conversation_id(conversation_id)))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    /// 先写 .tmp 再 rename，崩溃时不会留下半截文件
    async fn save(&self, conversation_id: &str, checkpoint: &Checkpoint) -> Result<(), AgentError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AgentError::Persistence(format!("create {}: {e}", self.dir.display())))?;
        let path = self.path_for(conversation_id);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| AgentError::Persistence(e.to_string()))?;
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| AgentError::Persistence(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| AgentError::Persistence(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        let path = self.path_for(conversation_id);
        let data = match tokio::fs::read(&path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AgentError::Persistence(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| AgentError::Persistence(format!("parse {}: {e}", path.display())))
    }
}

/// conversation_id 转文件名：ASCII 字母数字与 '-' 原样保留，其余字节写成 `_XX`（两位十六进制）。
/// '_' 只作为转义前缀出现，所以不同的 id 一定得到不同的文件名
fn encode_conversation_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("_{b:02X}"));
        }
    }
    out
}
