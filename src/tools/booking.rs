//! 订票/订酒店演示动作
//!
//! 业务逻辑只是占位：按参数生成确认文本。参数结构体由 schemars 生成 JSON Schema，
//! 校验直接走 serde 反序列化，edit 决策的替换参数与 LLM 给出的参数走同一条路径。

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::tools::Tool;

fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: &Value) -> Result<T, String> {
    serde_json::from_value(args.clone()).map_err(|e| format!("invalid arguments: {e}"))
}

fn non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("argument '{field}' must not be empty"))
    } else {
        Ok(())
    }
}

/// book_hotel 参数
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BookHotelArgs {
    /// 酒店名称
    pub hotel_name: String,
    /// 入住日期（YYYY-MM-DD）
    #[serde(default)]
    pub check_in: Option<String>,
    /// 入住晚数
    #[serde(default)]
    pub nights: Option<u32>,
}

/// 预定酒店（需要人工审批）
pub struct BookHotelTool;

#[async_trait]
impl Tool for BookHotelTool {
    fn name(&self) -> &str {
        "book_hotel"
    }

    fn description(&self) -> &str {
        "Book a hotel stay. Requires human approval. Args: {\"hotel_name\": \"...\", \"check_in\": \"YYYY-MM-DD\"?, \"nights\": n?}"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<BookHotelArgs>()
    }

    fn validate_args(&self, args: &Value) -> Result<(), String> {
        let a: BookHotelArgs = parse_args(args)?;
        non_empty("hotel_name", &a.hotel_name)
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let a: BookHotelArgs = parse_args(&args)?;
        non_empty("hotel_name", &a.hotel_name)?;
        let mut confirmation = format!("Successfully booked a stay at {}.", a.hotel_name);
        if let Some(date) = a.check_in {
            confirmation.push_str(&format!(" Check-in: {date}."));
        }
        if let Some(n) = a.nights {
            confirmation.push_str(&format!(" Nights: {n}."));
        }
        Ok(confirmation)
    }
}

/// query_train_tickets 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryTrainArgs {
    pub from: String,
    pub to: String,
    pub date: String,
}

/// 查询车次（只读，无需审批）
pub struct QueryTrainTicketsTool;

#[async_trait]
impl Tool for QueryTrainTicketsTool {
    fn name(&self) -> &str {
        "query_train_tickets"
    }

    fn description(&self) -> &str {
        "Query high-speed train tickets. Args: {\"from\": \"...\", \"to\": \"...\", \"date\": \"YYYY-MM-DD\"}"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<QueryTrainArgs>()
    }

    fn validate_args(&self, args: &Value) -> Result<(), String> {
        parse_args::<QueryTrainArgs>(args).map(|_| ())
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let a: QueryTrainArgs = parse_args(&args)?;
        non_empty("from", &a.from)?;
        non_empty("to", &a.to)?;
        Ok(format!(
            "{} {} -> {}: G1 07:00-11:29 ¥553; G3 08:00-12:32 ¥553; G5 09:00-13:37 ¥553",
            a.date, a.from, a.to
        ))
    }
}

/// book_train_ticket 参数
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BookTrainArgs {
    pub train_number: String,
    pub date: String,
    #[serde(default)]
    pub seat_class: Option<String>,
}

/// 预定车票（需要人工审批）
pub struct BookTrainTicketTool;

#[async_trait]
impl Tool for BookTrainTicketTool {
    fn name(&self) -> &str {
        "book_train_ticket"
    }

    fn description(&self) -> &str {
        "Book a train ticket. Requires human approval. Args: {\"train_number\": \"G1\", \"date\": \"YYYY-MM-DD\", \"seat_class\": \"second\"?}"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<BookTrainArgs>()
    }

    fn validate_args(&self, args: &Value) -> Result<(), String> {
        let a: BookTrainArgs = parse_args(args)?;
        non_empty("train_number", &a.train_number)
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let a: BookTrainArgs = parse_args(&args)?;
        non_empty("train_number", &a.train_number)?;
        let seat = a.seat_class.unwrap_or_else(|| "second".to_string());
        Ok(format!(
            "Successfully booked train {} on {} ({} class).",
            a.train_number, a.date, seat
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_book_hotel_confirmation() {
        let out = BookHotelTool
            .execute(json!({"hotel_name": "汉庭酒店"}))
            .await
            .unwrap();
        assert_eq!(out, "Successfully booked a stay at 汉庭酒店.");
    }

    #[test]
    fn test_book_hotel_validation() {
        assert!(BookHotelTool.validate_args(&json!({"hotel_name": "AltHotel"})).is_ok());
        assert!(BookHotelTool.validate_args(&json!({"hotel": "AltHotel"})).is_err());
        assert!(BookHotelTool.validate_args(&json!({"hotel_name": "  "})).is_err());
        assert!(BookHotelTool.validate_args(&json!({"hotel_name": 7})).is_err());
    }

    #[test]
    fn test_schema_lists_required_field() {
        let schema = BookHotelTool.parameters_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "hotel_name"));
    }

    #[tokio::test]
    async fn test_train_tools() {
        let q = QueryTrainTicketsTool
            .execute(json!({"from": "北京", "to": "上海", "date": "2026-10-19"}))
            .await
            .unwrap();
        assert!(q.contains("G1"));
        let b = BookTrainTicketTool
            .execute(json!({"train_number": "G805", "date": "2026-10-19"}))
            .await
            .unwrap();
        assert!(b.contains("G805"));
        assert!(b.contains("second"));
    }
}
