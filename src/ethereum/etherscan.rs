use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Etherscan-compatible API client for source verification
pub struct EtherscanClient {
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: String,
}

/// Source submission for a deployed contract
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub address: String,
    /// Solidity standard-JSON compiler input
    pub standard_json: String,
    /// Fully qualified name, e.g. `contracts/Factory.sol:Factory`
    pub contract_name: String,
    /// e.g. `v0.8.20+commit.a1b79de6`
    pub compiler_version: String,
    /// Hex-encoded constructor arguments without `0x`
    pub constructor_args: String,
}

/// Outcome of a verification status poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Pending,
    Verified,
    AlreadyVerified,
    Failed(String),
}

impl EtherscanClient {
    /// Create a client against `base_url` (the chain's `/api` endpoint)
    pub fn new(api_key: String, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            base_url: base_url.to_string(),
            client,
        })
    }

    /// Submit source code; returns the GUID to poll with `check_verification`
    pub async fn verify_contract(&self, request: &VerificationRequest) -> Result<String> {
        let form = [
            ("apikey", self.api_key.as_str()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", request.address.as_str()),
            ("sourceCode", request.standard_json.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", request.contract_name.as_str()),
            ("compilerversion", request.compiler_version.as_str()),
            // sic: the API spells it this way
            ("constructorArguements", request.constructor_args.as_str()),
        ];

        let response = self.client.post(&self.base_url).form(&form).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("Verification request failed: {}", response.status()));
        }

        let body: EtherscanResponse = response.json().await?;
        debug!("verifysourcecode: {} {}", body.status, body.message);

        if body.status != "1" {
            if body.result.to_lowercase().contains("already verified") {
                return Ok(String::new());
            }
            return Err(anyhow!("Explorer rejected verification: {}", body.result));
        }
        Ok(body.result)
    }

    /// Poll the status of a submitted verification
    pub async fn check_verification(&self, guid: &str) -> Result<VerificationStatus> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Status request failed: {}", response.status()));
        }

        let body: EtherscanResponse = response.json().await?;
        Ok(parse_status(&body.result))
    }
}

fn parse_status(result: &str) -> VerificationStatus {
    let lower = result.to_lowercase();
    if lower.contains("pending") {
        VerificationStatus::Pending
    } else if lower.contains("already verified") {
        VerificationStatus::AlreadyVerified
    } else if lower.contains("pass") {
        VerificationStatus::Verified
    } else {
        VerificationStatus::Failed(result.to_string())
    }
}
