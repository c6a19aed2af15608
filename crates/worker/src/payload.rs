use serde::{Deserialize, Serialize};

pub const DETECT_PARSER_JOB: &str = "detectParser";
pub const PARSE_FILE_JOB: &str = "parse_file";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectParserPayload {
    pub statement_id: String,
    pub org_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseFilePayload {
    pub statement_id: String,
    pub org_id: String,
    /// Declared type as uploaded; validated by the handler, not here.
    pub file_type: String,
    pub file_name: String,
    pub s3_location: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detect_payload_uses_snake_case() {
        let payload: DetectParserPayload =
            serde_json::from_value(json!({"statement_id": "s1", "org_id": "o1"})).unwrap();
        assert_eq!(payload.statement_id, "s1");
    }

    #[test]
    fn parse_payload_uses_camel_case() {
        let payload = ParseFilePayload {
            statement_id: "s1".into(),
            org_id: "o1".into(),
            file_type: "pdf".into(),
            file_name: "march.pdf".into(),
            s3_location: "org1/march.pdf".into(),
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "statementId": "s1",
                "orgId": "o1",
                "fileType": "pdf",
                "fileName": "march.pdf",
                "s3Location": "org1/march.pdf",
            })
        );
    }
}
