use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;

const API_ENDPOINT: &str = "https://easyeda.com/api/products/{lcsc_id}/components?version=6.4.19.5";
const ENDPOINT_3D_MODEL: &str = "https://modules.easyeda.com/3dmodel/{uuid}";
const ENDPOINT_3D_MODEL_STEP: &str = "https://modules.easyeda.com/qAxj6KHrDKw4blvCG8QJPs7Y/{uuid}";
const USER_AGENT: &str = "easyeda2kicad_rs/0.1.0";

#[derive(Deserialize, Debug)]
pub struct ApiResponse {
    pub success: bool,
    pub result: Option<Value>,
    pub code: Option<i32>,
    pub message: Option<String>,
}

/// Where component CAD data and model payloads come from.
///
/// The pipeline only talks to this trait, so tests can serve canned JSON
/// without a network.
pub trait CadSource: Sync {
    /// The `result` object of the components endpoint.
    fn get_cad_data_of_component(&self, lcsc_id: &str) -> impl Future<Output = Result<Value>> + Send;

    fn get_raw_3d_model_obj(&self, uuid: &str) -> impl Future<Output = Result<String>> + Send;

    fn get_step_3d_model(&self, uuid: &str) -> impl Future<Output = Result<bytes::Bytes>> + Send;
}

pub struct EasyedaApi {
    client: reqwest::Client,
}

impl EasyedaApi {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(EasyedaApi { client })
    }
}

/// Unwraps the `{success, result, message}` envelope of the components
/// endpoint.
fn unwrap_response(lcsc_id: &str, res: ApiResponse) -> Result<Value> {
    if !res.success {
        let reason = res.message.unwrap_or_else(|| match res.code {
            Some(code) => format!("API error code {}", code),
            None => "Unknown API error".to_string(),
        });
        return Err(Error::FetchFailure {
            lcsc_id: lcsc_id.to_string(),
            reason,
        });
    }
    match res.result {
        Some(Value::Null) | None => Err(Error::EmptyData(lcsc_id.to_string())),
        Some(Value::Object(map)) if map.is_empty() => Err(Error::EmptyData(lcsc_id.to_string())),
        Some(result) => Ok(result),
    }
}

impl CadSource for EasyedaApi {
    async fn get_cad_data_of_component(&self, lcsc_id: &str) -> Result<Value> {
        let url = API_ENDPOINT.replace("{lcsc_id}", lcsc_id);
        log::debug!("GET {}", url);
        let res = self
            .client
            .get(&url)
            .send()
            .await?
            .json::<ApiResponse>()
            .await?;
        unwrap_response(lcsc_id, res)
    }

    async fn get_raw_3d_model_obj(&self, uuid: &str) -> Result<String> {
        let url = ENDPOINT_3D_MODEL.replace("{uuid}", uuid);
        let res = self.client.get(&url).send().await?;
        if res.status().is_success() {
            Ok(res.text().await?)
        } else {
            Err(Error::MissingData(format!(
                "No raw 3D model (OBJ) found for uuid: {} (HTTP {})",
                uuid,
                res.status()
            )))
        }
    }

    async fn get_step_3d_model(&self, uuid: &str) -> Result<bytes::Bytes> {
        let url = ENDPOINT_3D_MODEL_STEP.replace("{uuid}", uuid);
        let res = self.client.get(&url).send().await?;
        if res.status().is_success() {
            Ok(res.bytes().await?)
        } else {
            Err(Error::MissingData(format!(
                "No STEP 3D model found for uuid: {} (HTTP {})",
                uuid,
                res.status()
            )))
        }
    }
}
