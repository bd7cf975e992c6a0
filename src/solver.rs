use crate::{
    credential::{Credential, CredentialResolver},
    error::{GatewayError, Result},
    inference::InferenceBackend,
    models::SolveResponse,
    payload::{DataUri, PayloadNormalizer},
};
use std::sync::Arc;

/// Normalize, pick a credential, make the one outbound call.
///
/// Shared read-only across all requests; nothing in here changes after
/// construction.
#[derive(Clone)]
pub struct Solver {
    normalizer: PayloadNormalizer,
    credentials: CredentialResolver,
    backend: Arc<dyn InferenceBackend>,
}

impl Solver {
    pub fn new(
        normalizer: PayloadNormalizer,
        credentials: CredentialResolver,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        Self {
            normalizer,
            credentials,
            backend,
        }
    }

    pub fn normalizer(&self) -> &PayloadNormalizer {
        &self.normalizer
    }

    /// Multipart path. Always uses the default credential.
    pub async fn solve_upload(
        &self,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<SolveResponse> {
        let credential = self.credentials.resolve(None)?;
        let image = self.normalizer.from_bytes(bytes, content_type)?;
        self.invoke(&image, &credential).await
    }

    /// JSON paths. `api_key` is `Some` only on the solve-with-key route.
    pub async fn solve_encoded(
        &self,
        image: &str,
        api_key: Option<&str>,
    ) -> Result<SolveResponse> {
        if image.trim().is_empty() {
            return Err(GatewayError::InvalidRequestShape(
                "Image must be a non-empty string".into(),
            ));
        }
        let credential = self.credentials.resolve(api_key)?;
        let image = self.normalizer.from_encoded(image)?;
        self.invoke(&image, &credential).await
    }

    async fn invoke(&self, image: &DataUri, credential: &Credential) -> Result<SolveResponse> {
        let answer = self.backend.solve(image, credential).await?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(GatewayError::EmptyModelResponse(
                "backend returned blank text".into(),
            ));
        }

        log::debug!("Solved {} image ({} chars)", image.mime_type(), answer.len());
        Ok(SolveResponse {
            answer: answer.to_string(),
        })
    }
}
