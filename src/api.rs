use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;

use crate::attachments::ImageAttachment;
use crate::kb::KnowledgeBase;
use crate::status;

macro_rules! debug_eprintln {
    ($($arg:tt)*) => {
        if std::env::var("RAGDESK_DEBUG").is_ok() {
            eprintln!($($arg)*);
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("backend unreachable: {0}")]
    Network(String),
    #[error("{detail}")]
    Request { status: u16, detail: String },
    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    /// The backend reports an index that is still being built through its
    /// `detail` text; there is no structured code for it yet, so match the
    /// phrasing here and nowhere else.
    pub fn is_index_building(&self) -> bool {
        match self {
            ApiError::Request { detail, .. } => {
                detail.contains("Failed to build") || detail.contains("Building")
            }
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct KnowledgeBaseList {
    knowledge_bases: Vec<KnowledgeBase>,
}

/// Success bodies carry `response` or, in older deployments, `message`.
#[derive(Debug, Deserialize)]
struct QueryReply {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl QueryReply {
    fn into_text(self) -> String {
        self.response
            .or(self.message)
            .unwrap_or_else(|| "Response received".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        ApiClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBase>, ApiError> {
        let url = format!("{}/knowledge-bases", self.base_url);
        status::log_with(status::Kind::Http, format!("GET {}", url));

        let response = self.client.get(&url).send().await.map_err(network)?;
        let response = check_status(response).await?;
        let list: KnowledgeBaseList = response.json().await.map_err(network)?;

        debug_eprintln!("[api] loaded {} knowledge bases", list.knowledge_bases.len());
        Ok(list.knowledge_bases)
    }

    pub async fn query(
        &self,
        kb_id: &str,
        question: &str,
        images: &[ImageAttachment],
    ) -> Result<String, ApiError> {
        let url = format!("{}/query/{}", self.base_url, kb_id);
        let form = attach_images(Form::new().text("question", question.to_string()), images)?;
        self.post_form(&url, form).await
    }

    pub async fn review_code(
        &self,
        code: &str,
        question: &str,
        images: &[ImageAttachment],
    ) -> Result<String, ApiError> {
        if code.trim().is_empty() {
            return Err(ApiError::Validation(
                "Please provide code to review".to_string(),
            ));
        }

        let url = format!("{}/review/code", self.base_url);
        let form = attach_images(
            Form::new()
                .text("code", code.to_string())
                .text("question", question.to_string()),
            images,
        )?;
        self.post_form(&url, form).await
    }

    /// Best-effort: callers log failures instead of surfacing them.
    pub async fn clear_history(&self, kb_id: &str) -> Result<(), ApiError> {
        let url = format!("{}/clear-history/{}", self.base_url, kb_id);
        status::log_with(status::Kind::Http, format!("POST {}", url));

        let response = self.client.post(&url).send().await.map_err(network)?;
        check_status(response).await?;
        Ok(())
    }

    async fn post_form(&self, url: &str, form: Form) -> Result<String, ApiError> {
        status::log_with(status::Kind::Http, format!("POST {}", url));

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(network)?;
        let response = check_status(response).await?;
        let reply: QueryReply = response.json().await.map_err(network)?;
        Ok(reply.into_text())
    }
}

fn attach_images(mut form: Form, images: &[ImageAttachment]) -> Result<Form, ApiError> {
    for (index, image) in images.iter().enumerate() {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.filename.clone())
            .mime_str(image.mime)
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        form = form.part(format!("image_{}", index), part);
    }
    Ok(form)
}

fn network(e: reqwest::Error) -> ApiError {
    ApiError::Network(e.to_string())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.detail)
        .unwrap_or_else(|| format!("request failed with status {}", status));

    Err(ApiError::Request {
        status: status.as_u16(),
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_building_detail_is_classified() {
        let building = ApiError::Request {
            status: 503,
            detail: "Building index".to_string(),
        };
        let failed = ApiError::Request {
            status: 500,
            detail: "Failed to build vectorbt index".to_string(),
        };
        let other = ApiError::Request {
            status: 429,
            detail: "All API configurations are rate-limited".to_string(),
        };

        assert!(building.is_index_building());
        assert!(failed.is_index_building());
        assert!(!other.is_index_building());
        assert!(!ApiError::Network("connection refused".to_string()).is_index_building());
    }

    #[test]
    fn reply_prefers_response_over_message() {
        let both: QueryReply =
            serde_json::from_str(r#"{"response": "from response", "message": "from message"}"#)
                .unwrap();
        assert_eq!(both.into_text(), "from response");

        let message_only: QueryReply =
            serde_json::from_str(r#"{"message": "from message"}"#).unwrap();
        assert_eq!(message_only.into_text(), "from message");

        let neither: QueryReply = serde_json::from_str("{}").unwrap();
        assert_eq!(neither.into_text(), "Response received");
    }

    #[test]
    fn knowledge_base_list_parses() {
        let list: KnowledgeBaseList = serde_json::from_str(
            r#"{"knowledge_bases": [
                {"id": "vectorbt", "name": "VectorBT Documentation", "type": "vectorbt"},
                {"id": "review", "name": "Code Review", "type": "code_review", "available": false}
            ]}"#,
        )
        .unwrap();

        assert_eq!(list.knowledge_bases.len(), 2);
        assert!(list.knowledge_bases[1].is_code_review());
        assert!(!list.knowledge_bases[1].available);
    }

    #[test]
    fn empty_question_with_images_builds_a_form() {
        let images = vec![
            ImageAttachment {
                filename: "a.png".to_string(),
                mime: "image/png",
                bytes: vec![1, 2, 3],
            },
            ImageAttachment {
                filename: "b.png".to_string(),
                mime: "image/png",
                bytes: vec![4, 5, 6],
            },
        ];

        let form = attach_images(Form::new().text("question", String::new()), &images);
        assert!(form.is_ok());
    }

    #[tokio::test]
    async fn review_with_empty_code_is_a_validation_error() {
        let client = ApiClient::new("http://localhost:8000", Duration::from_secs(5));
        let result = client.review_code("   ", "why?", &[]).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }
}
