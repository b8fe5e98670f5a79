//! MLflow REST client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::domain::metadata::{PRODUCTION_STAGE, TRAINING_DATE_TAG};
use crate::domain::{
    ArtifactMap, Classifier, DomainError, MetricMap, ModelArtifact, ParamMap, TrackedModel,
    TrackingClient,
};
use crate::infrastructure::classifier::decode_artifact_bytes;

pub const DEFAULT_EXPERIMENT_ID: &str = "0";

/// Artifact sub-directory holding the serialized model
const MODEL_ARTIFACT_PATH: &str = "model";
const MODEL_FILE_NAME: &str = "model.json";

const ARTIFACT_SCHEME: &str = "mlflow-artifacts:";
const MODELS_SCHEME: &str = "models:/";
const RUNS_SCHEME: &str = "runs:/";

/// Error codes meaning "no such entity" for lookups
const MISSING_CODES: &[&str] = &["RESOURCE_DOES_NOT_EXIST", "INVALID_PARAMETER_VALUE"];
const ALREADY_EXISTS_CODE: &str = "RESOURCE_ALREADY_EXISTS";

/// Tracking client for an MLflow-compatible REST server
#[derive(Debug, Clone)]
pub struct MlflowTrackingClient {
    client: reqwest::Client,
    base_url: String,
    model_name: String,
    experiment_id: String,
}

impl MlflowTrackingClient {
    pub fn new(
        base_url: impl Into<String>,
        model_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::tracking(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model_name: model_name.into(),
            experiment_id: DEFAULT_EXPERIMENT_ID.to_string(),
        })
    }

    pub fn with_experiment_id(mut self, experiment_id: impl Into<String>) -> Self {
        self.experiment_id = experiment_id.into();
        self
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base_url, endpoint)
    }

    fn artifact_url(&self, artifact_uri: &str, relative: &str) -> Result<String, DomainError> {
        let path = artifact_path(artifact_uri)?;
        Ok(format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{}/{}",
            self.base_url,
            path.trim_end_matches('/'),
            relative
        ))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let mut request = self.client.request(method, self.api_url(endpoint));

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| ApiError::transport(endpoint, e))?;
        let status = response.status();

        if !status.is_success() {
            let body: ApiErrorBody = response.json().await.unwrap_or_default();
            return Err(ApiError {
                endpoint: endpoint.to_string(),
                status: Some(status),
                error_code: body.error_code,
                message: body.message.unwrap_or_else(|| status.to_string()),
            });
        }

        response.json().await.map_err(|e| ApiError {
            endpoint: endpoint.to_string(),
            status: Some(status),
            error_code: None,
            message: format!("Failed to parse response: {}", e),
        })
    }

    async fn get_run(&self, run_id: &str) -> Result<RunDto, DomainError> {
        let response: RunResponse = self
            .call(Method::GET, "runs/get", &[("run_id", run_id)], None)
            .await?;
        Ok(response.run)
    }

    /// Combine a registry entry with its run's data
    async fn tracked_model(&self, version: ModelVersionDto) -> Result<TrackedModel, DomainError> {
        let data = if version.run_id.is_empty() {
            RunDataDto::default()
        } else {
            self.get_run(&version.run_id).await?.data
        };

        Ok(TrackedModel {
            model_uri: format!("{}{}/{}", MODELS_SCHEME, version.name, version.version),
            version: version.version,
            run_id: version.run_id,
            tags: data.tags.into_iter().map(|t| (t.key, t.value)).collect(),
            metrics: data.metrics.into_iter().map(|m| (m.key, m.value)).collect(),
            params: data.params.into_iter().map(|p| (p.key, p.value)).collect(),
            stage: version.current_stage.filter(|s| s != "None"),
        })
    }

    /// Resolve a model URI to the artifact directory holding the model file
    async fn resolve_artifact_uri(&self, model_uri: &str) -> Result<String, DomainError> {
        if let Some(rest) = model_uri.strip_prefix(MODELS_SCHEME) {
            let (name, version) = rest.split_once('/').ok_or_else(|| {
                DomainError::tracking(format!("Malformed model URI '{}'", model_uri))
            })?;

            let response: ModelVersionResponse = self
                .call(
                    Method::GET,
                    "model-versions/get",
                    &[("name", name), ("version", version)],
                    None,
                )
                .await
                .map_err(|e| e.missing_as_not_found(model_uri))?;
            return Ok(response.model_version.source);
        }

        if let Some(rest) = model_uri.strip_prefix(RUNS_SCHEME) {
            let (run_id, path) = rest.split_once('/').unwrap_or((rest, MODEL_ARTIFACT_PATH));
            let run = self.get_run(run_id).await?;
            return Ok(format!(
                "{}/{}",
                run.info.artifact_uri.trim_end_matches('/'),
                path
            ));
        }

        Ok(model_uri.to_string())
    }

    async fn upload(&self, url: &str, bytes: Vec<u8>) -> Result<(), DomainError> {
        let response = self
            .client
            .put(url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| DomainError::tracking(format!("Artifact upload failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::tracking(format!(
                "Artifact upload to {} failed: HTTP {}: {}",
                url, status, body
            )));
        }

        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, DomainError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DomainError::tracking(format!("Artifact download failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| DomainError::tracking(format!("Artifact download failed: {}", e))),
            StatusCode::NOT_FOUND => Err(DomainError::not_found(format!(
                "Artifact {} does not exist",
                url
            ))),
            status => Err(DomainError::tracking(format!(
                "Artifact download from {} failed: HTTP {}",
                url, status
            ))),
        }
    }

    async fn ensure_registered_model(&self) -> Result<(), DomainError> {
        let result: Result<Value, ApiError> = self
            .call(
                Method::POST,
                "registered-models/create",
                &[],
                Some(json!({ "name": self.model_name })),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.error_code.as_deref() == Some(ALREADY_EXISTS_CODE) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Everything after run creation; the caller finalizes the run status
    async fn record_run(
        &self,
        run: &RunInfoDto,
        model: &dyn Classifier,
        metrics: &MetricMap,
        params: &ParamMap,
        artifacts: &ArtifactMap,
    ) -> Result<(), DomainError> {
        let timestamp = Utc::now().timestamp_millis();

        let batch = json!({
            "run_id": run.run_id,
            "metrics": metrics
                .iter()
                .map(|(key, value)| json!({
                    "key": key,
                    "value": value,
                    "timestamp": timestamp,
                    "step": 0,
                }))
                .collect::<Vec<_>>(),
            "params": params
                .iter()
                .map(|(key, value)| json!({ "key": key, "value": param_string(value) }))
                .collect::<Vec<_>>(),
        });
        let _: Value = self
            .call(Method::POST, "runs/log-batch", &[], Some(batch))
            .await?;

        let model_key = format!("{}/{}", MODEL_ARTIFACT_PATH, MODEL_FILE_NAME);
        let artifact = ModelArtifact::from_classifier(model, None)?.to_bytes()?;
        let model_url = self.artifact_url(&run.artifact_uri, &model_key)?;
        self.upload(&model_url, artifact).await?;

        for (name, path) in artifacts {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(name.as_str());
            let key = format!("{}/{}", name, file_name);
            if key == model_key {
                debug!(path = %path.display(), "Skipping artifact already uploaded as the model");
                continue;
            }

            let bytes = tokio::fs::read(path).await.map_err(|e| {
                DomainError::tracking(format!("Failed to read artifact {}: {}", path.display(), e))
            })?;
            let url = self.artifact_url(&run.artifact_uri, &key)?;
            self.upload(&url, bytes).await?;
        }

        self.ensure_registered_model().await?;

        let source = format!(
            "{}/{}",
            run.artifact_uri.trim_end_matches('/'),
            MODEL_ARTIFACT_PATH
        );
        let registered: ModelVersionResponse = self
            .call(
                Method::POST,
                "model-versions/create",
                &[],
                Some(json!({
                    "name": self.model_name,
                    "source": source,
                    "run_id": run.run_id,
                })),
            )
            .await?;

        debug!(
            run_id = %run.run_id,
            registered_version = %registered.model_version.version,
            "Model version registered"
        );
        Ok(())
    }

    async fn finish_run(&self, run_id: &str, status: &str) -> Result<(), DomainError> {
        let _: Value = self
            .call(
                Method::POST,
                "runs/update",
                &[],
                Some(json!({
                    "run_id": run_id,
                    "status": status,
                    "end_time": Utc::now().timestamp_millis(),
                })),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TrackingClient for MlflowTrackingClient {
    async fn get_latest_production_model(&self) -> Result<Option<TrackedModel>, DomainError> {
        let result: Result<LatestVersionsResponse, ApiError> = self
            .call(
                Method::POST,
                "registered-models/get-latest-versions",
                &[],
                Some(json!({
                    "name": self.model_name,
                    "stages": [PRODUCTION_STAGE],
                })),
            )
            .await;

        let versions = match result {
            Ok(response) => response.model_versions,
            Err(e) if e.is_missing() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let Some(latest) = versions
            .into_iter()
            .max_by_key(|v| v.version.parse::<u64>().unwrap_or_default())
        else {
            return Ok(None);
        };

        self.tracked_model(latest).await.map(Some)
    }

    async fn get_model_by_version(
        &self,
        version: &str,
    ) -> Result<Option<TrackedModel>, DomainError> {
        let result: Result<ModelVersionResponse, ApiError> = self
            .call(
                Method::GET,
                "model-versions/get",
                &[("name", self.model_name.as_str()), ("version", version)],
                None,
            )
            .await;

        match result {
            Ok(response) => self.tracked_model(response.model_version).await.map(Some),
            Err(e) if e.is_missing() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_model(&self, model_uri: &str) -> Result<Arc<dyn Classifier>, DomainError> {
        let artifact_uri = self.resolve_artifact_uri(model_uri).await?;
        let url = self.artifact_url(&artifact_uri, MODEL_FILE_NAME)?;

        debug!(model_uri, url = %url, "Downloading model artifact");
        let bytes = self.download(&url).await?;

        decode_artifact_bytes(&bytes).map_err(|e| {
            DomainError::tracking(format!("Model at '{}' could not be decoded: {}", model_uri, e))
        })
    }

    async fn log_model_training(
        &self,
        model: &dyn Classifier,
        metrics: &MetricMap,
        params: &ParamMap,
        artifacts: &ArtifactMap,
    ) -> Result<String, DomainError> {
        let created: RunResponse = self
            .call(
                Method::POST,
                "runs/create",
                &[],
                Some(json!({
                    "experiment_id": self.experiment_id,
                    "start_time": Utc::now().timestamp_millis(),
                    "tags": [
                        { "key": TRAINING_DATE_TAG, "value": Utc::now().to_rfc3339() },
                        { "key": "model_type", "value": model.model_type() },
                    ],
                })),
            )
            .await?;
        let run = created.run.info;

        if let Err(e) = self.record_run(&run, model, metrics, params, artifacts).await {
            if let Err(finish) = self.finish_run(&run.run_id, "FAILED").await {
                warn!(run_id = %run.run_id, error = %finish, "Failed to mark run as failed");
            }
            return Err(e);
        }

        self.finish_run(&run.run_id, "FINISHED").await?;

        info!(run_id = %run.run_id, model_name = %self.model_name, "Training run logged");
        Ok(run.run_id)
    }
}

/// Path below the artifact proxy root for a `mlflow-artifacts:` URI
fn artifact_path(artifact_uri: &str) -> Result<&str, DomainError> {
    let rest = artifact_uri.strip_prefix(ARTIFACT_SCHEME).ok_or_else(|| {
        DomainError::tracking(format!(
            "Unsupported artifact location '{}': only {} URIs are served",
            artifact_uri, ARTIFACT_SCHEME
        ))
    })?;

    // mlflow-artifacts://host:port/path carries an authority segment
    let path = match rest.strip_prefix("//") {
        Some(with_host) => with_host.split_once('/').map(|(_, p)| p).unwrap_or(""),
        None => rest.trim_start_matches('/'),
    };
    Ok(path)
}

fn param_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

/// Failed REST call, before mapping into the domain
#[derive(Debug)]
struct ApiError {
    endpoint: String,
    status: Option<StatusCode>,
    error_code: Option<String>,
    message: String,
}

impl ApiError {
    fn transport(endpoint: &str, error: reqwest::Error) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            status: None,
            error_code: None,
            message: format!("Request failed: {}", error),
        }
    }

    fn is_missing(&self) -> bool {
        self.status == Some(StatusCode::NOT_FOUND)
            || self
                .error_code
                .as_deref()
                .is_some_and(|code| MISSING_CODES.contains(&code))
    }

    fn missing_as_not_found(self, what: &str) -> DomainError {
        if self.is_missing() {
            DomainError::not_found(format!("Model '{}' does not exist", what))
        } else {
            self.into()
        }
    }
}

impl From<ApiError> for DomainError {
    fn from(e: ApiError) -> Self {
        let status = e
            .status
            .map(|s| format!("HTTP {} ", s.as_u16()))
            .unwrap_or_default();
        let code = e.error_code.map(|c| format!("{}: ", c)).unwrap_or_default();
        DomainError::tracking(format!("{} {}{}{}", e.endpoint, status, code, e.message))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    error_code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatestVersionsResponse {
    #[serde(default)]
    model_versions: Vec<ModelVersionDto>,
}

#[derive(Debug, Deserialize)]
struct ModelVersionResponse {
    model_version: ModelVersionDto,
}

#[derive(Debug, Deserialize)]
struct ModelVersionDto {
    name: String,
    version: String,
    #[serde(default)]
    run_id: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    current_stage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: RunDto,
}

#[derive(Debug, Deserialize)]
struct RunDto {
    info: RunInfoDto,
    #[serde(default)]
    data: RunDataDto,
}

#[derive(Debug, Deserialize)]
struct RunInfoDto {
    run_id: String,
    #[serde(default)]
    artifact_uri: String,
}

#[derive(Debug, Default, Deserialize)]
struct RunDataDto {
    #[serde(default)]
    metrics: Vec<MetricDto>,
    #[serde(default)]
    params: Vec<KeyValueDto>,
    #[serde(default)]
    tags: Vec<KeyValueDto>,
}

#[derive(Debug, Deserialize)]
struct MetricDto {
    key: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct KeyValueDto {
    key: String,
    value: String,
}
