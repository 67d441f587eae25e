//! 记忆层：对话日志、历史窗口、检查点持久化、长期记忆

pub mod async_persistence;
pub mod checkpoint;
pub mod conversation;
pub mod long_term;
pub mod window;

#[cfg(feature = "async-sqlite")]
pub use async_persistence::SqliteStore;
pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use conversation::{
    to_messages, ActionRequest, ConversationLog, ConversationTurn, Message, ResultStatus, Role,
};
pub use long_term::{
    extract_remember_content, load_long_term_memory, user_namespace, InMemoryLongTerm,
    LongTermMemory, NO_LONG_TERM_MEMORY,
};
pub use window::{window_from_config, HistoryWindow, KeepAll, LastTurns};
