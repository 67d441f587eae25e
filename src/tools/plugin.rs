//! 外部程序动作：由配置 [[tools.plugins]] 声明，启动时显式构造并注册
//!
//! 取代运行期「远程工具发现」的全局客户端：每个插件就是一个「程序 + 参数模板」，
//! 模板中 {{key}} 从 ActionRequest.arguments 中取 key；执行时无 shell，直接 exec，带超时。
//! 审批策略随配置一起登记（requires_review / allowed_decisions）。

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::config::PluginEntry;
use crate::tools::Tool;

/// 从配置项构建的插件动作
pub struct PluginTool {
    name: String,
    description: String,
    program: String,
    args_template: Vec<String>,
    required: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout_secs: u64,
}

impl PluginTool {
    pub fn new(entry: &PluginEntry, timeout_secs: u64) -> Self {
        Self {
            name: entry.name.clone(),
            description: entry.description.clone(),
            program: entry.program.clone(),
            args_template: entry.args.clone(),
            required: placeholders(&entry.args),
            working_dir: entry.working_dir.clone(),
            timeout_secs,
        }
    }

    /// 替换模板中的 {{key}}；args 为 ActionRequest.arguments
    fn substitute(&self, args: &Value) -> Vec<String> {
        let empty = serde_json::Map::new();
        let obj = args.as_object().unwrap_or(&empty);
        self.args_template
            .iter()
            .map(|tpl| {
                let mut s = tpl.clone();
                for (k, v) in obj {
                    let placeholder = format!("{{{{{}}}}}", k);
                    let val: String = match v {
                        Value::String(x) => x.clone(),
                        _ => v.to_string(),
                    };
                    s = s.replace(&placeholder, &val);
                }
                s
            })
            .collect()
    }
}

/// 收集模板中出现的占位符名，作为必填参数
fn placeholders(templates: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for tpl in templates {
        let mut rest = tpl.as_str();
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else { break };
            let key = after[..end].trim().to_string();
            if !key.is_empty() && !out.contains(&key) {
                out.push(key);
            }
            rest = &after[end + 2..];
        }
    }
    out
}

#[async_trait]
impl Tool for PluginTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .required
            .iter()
            .map(|k| (k.clone(), serde_json::json!({ "type": ["string", "number", "boolean"] })))
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args_vec = self.substitute(&args);
        tracing::info!(tool = %self.name, program = %self.program, "plugin action invoke");
        let mut cmd = Command::new(&self.program);
        cmd.args(&args_vec)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        let child = cmd
            .spawn()
            .map_err(|e| format!("plugin spawn failed: {}", e))?;
        let timeout = std::time::Duration::from_secs(self.timeout_secs.max(1));
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("plugin timeout after {}s", self.timeout_secs))?
            .map_err(|e| format!("plugin wait failed: {}", e))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(format!(
                "exit {:?}: stderr {}",
                output.status.code(),
                stderr.trim()
            ));
        }
        Ok(stdout.trim().to_string())
    }
}
