use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct SolveJsonRequest {
    pub image: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolveWithKeyRequest {
    pub image: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResponse {
    pub answer: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}
