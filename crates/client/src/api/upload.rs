use circle_shared::{ApiError, UploadedFile};

use super::Api;

const UPLOAD: &str = "/api/upload/";

impl Api {
    /// Upload one file and return where the server put it.
    pub async fn upload(&self, file_name: &str, mime: &str, bytes: Vec<u8>) -> Result<UploadedFile, ApiError> {
        self.gateway.post_file(UPLOAD, file_name, mime, bytes).await
    }
}
