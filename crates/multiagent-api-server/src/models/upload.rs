use crate::services::session::IndexLifecycle;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Image,
    Document,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub size: usize,
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: UploadKind,
    /// Documents only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexLifecycle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    /// PDF page count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
}
