//! 历史窗口：每次调用推理引擎前，决定把多少历史发给它
//!
//! 窗口只裁剪发送视图，不修改对话日志本身。
//! LastTurns 保留最近 N 条且窗口必须从一条用户消息开始；
//! 因为用户消息不会出现在调用记录与其结果之间，所以窗口不会把一对调用/结果拆开。

use crate::memory::ConversationTurn;

/// 历史裁剪策略
pub trait HistoryWindow: Send + Sync {
    fn window<'a>(&self, turns: &'a [ConversationTurn]) -> &'a [ConversationTurn];
}

/// 不裁剪
#[derive(Clone, Copy, Debug, Default)]
pub struct KeepAll;

impl HistoryWindow for KeepAll {
    fn window<'a>(&self, turns: &'a [ConversationTurn]) -> &'a [ConversationTurn] {
        turns
    }
}

/// 保留最近 max_turns 条，起点对齐到用户消息
#[derive(Clone, Copy, Debug)]
pub struct LastTurns {
    pub max_turns: usize,
}

impl LastTurns {
    pub fn new(max_turns: usize) -> Self {
        Self { max_turns }
    }
}

impl HistoryWindow for LastTurns {
    fn window<'a>(&self, turns: &'a [ConversationTurn]) -> &'a [ConversationTurn] {
        if self.max_turns == 0 || turns.len() <= self.max_turns {
            return align_to_user(turns, 0);
        }
        align_to_user(turns, turns.len() - self.max_turns)
    }
}

/// 从 start 起向后找第一条用户消息；窗口内没有用户消息时向前回退到最近的一条，
/// 宁可多发几条也不让推理引擎看不到当前问题
fn align_to_user(turns: &[ConversationTurn], start: usize) -> &[ConversationTurn] {
    if let Some(offset) = turns[start..].iter().position(|t| t.is_user()) {
        return &turns[start + offset..];
    }
    match turns[..start].iter().rposition(|t| t.is_user()) {
        Some(idx) => &turns[idx..],
        None => &turns[start..],
    }
}

/// 由配置构造：0 表示不裁剪
pub fn window_from_config(max_turns: usize) -> Box<dyn HistoryWindow> {
    if max_turns == 0 {
        Box::new(KeepAll)
    } else {
        Box::new(LastTurns::new(max_turns))
    }
}
