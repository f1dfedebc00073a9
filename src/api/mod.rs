pub mod certificates;
pub mod downloads;

use serde::Serialize;

pub use certificates::{
    handle_activities, handle_batch, handle_create, handle_delete, handle_get, handle_list,
    handle_regenerate, handle_update, BatchRequest, CertificateResponse, DeleteResponse,
    CONTENT_URL_PREFIX,
};
pub use downloads::{handle_download, handle_download_zip, ZipRequest};

/// Envelope of every successful JSON response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: &str, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            data,
        }
    }

    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }
}
