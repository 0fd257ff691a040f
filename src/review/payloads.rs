// src/review/payloads.rs
// Wire payloads for the serial-number correction endpoint.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialNumberUpdate {
    pub row: u32,
    pub position: u32,
    pub serial_number: String,
    pub is_user_modified: bool,
    /// Always sent as a percentage string, e.g. `"100%"`.
    pub confidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialNumberUpdateRequest {
    pub image_id: String,
    pub project_id: String,
    pub updated_serials: Vec<SerialNumberUpdate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialNumberUpdateResponse {
    pub image_id: String,
    pub project_id: String,
    pub updated_count: u32,
    pub updated_at: Option<String>,
    pub message: String,
    pub success: bool,
}

impl Default for SerialNumberUpdateResponse {
    fn default() -> Self {
        Self {
            image_id: String::new(),
            project_id: String::new(),
            updated_count: 0,
            updated_at: None,
            message: String::new(),
            // Older backends answer with an empty body on success.
            success: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_snake_case_fields() {
        let req = SerialNumberUpdateRequest {
            image_id: "img".into(),
            project_id: "p".into(),
            updated_serials: vec![SerialNumberUpdate {
                row: 1,
                position: 2,
                serial_number: "B1".into(),
                is_user_modified: true,
                confidence: "100%".into(),
            }],
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["updated_serials"][0]["serial_number"], "B1");
        assert_eq!(value["updated_serials"][0]["is_user_modified"], true);
    }

    #[test]
    fn sparse_response_defaults_to_success() {
        let resp: SerialNumberUpdateResponse =
            serde_json::from_str(r#"{ "updated_count": 3 }"#).unwrap();
        assert!(resp.success);
        assert_eq!(resp.updated_count, 3);
        assert_eq!(resp.updated_at, None);
    }
}
