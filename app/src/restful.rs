use async_trait::async_trait;
use engine::ChainClient;
use reqwest::Method;
use serde::{de, ser};
use shared::{
    errors::{MinerError, MinerResult},
    interaction::{
        AccountHandle,
        AddressRequest,
        GlobalStats,
        MinerStats,
        MiningRound,
        ProofReceipt,
        RestfulResponse,
        RoundResponse,
        Solution,
    },
    types::WalletAddress,
    utils::{retry, RETRY_DELAY, RETRY_TIMES},
};
use url::Url;

/// REST gateway in front of the ledger.
pub struct ServerAPI {
    pub url: String,
    client: reqwest::Client,
}

impl ServerAPI {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: reqwest::Client::new() }
    }

    pub async fn account(&self, identity: &WalletAddress) -> MinerResult<Option<AccountHandle>> {
        let endpoint = format!("/api/v1/account/{identity}");
        let resp = self.call::<_, AccountHandle>(&endpoint, Method::GET, ()).await?;
        match resp.code {
            200 => Ok(resp.data),
            404 => Ok(None),
            _ => Err(MinerError::Chain(message(resp.message))),
        }
    }

    pub async fn miner_stats(&self, identity: &WalletAddress) -> MinerResult<MinerStats> {
        let resp = self.call(&format!("/api/v1/stats/{identity}"), Method::GET, ()).await?;
        into_data(resp)
    }

    pub async fn global_stats(&self) -> MinerResult<GlobalStats> {
        let resp = self.call("/api/v1/stats", Method::GET, ()).await?;
        into_data(resp)
    }

    /// `request` with transport failures retried
    async fn call<T, R>(
        &self,
        endpoint: &str,
        method: Method,
        data: T,
    ) -> MinerResult<RestfulResponse<R>>
    where
        T: ser::Serialize + Clone + Send + Sync,
        R: de::DeserializeOwned + Send, {
        retry(|| self.request(endpoint, method.clone(), data.clone()), RETRY_TIMES, RETRY_DELAY)
            .await
            .map_err(|err| MinerError::Chain(format!("{endpoint}: {err:#}")))
    }

    /// base request
    async fn request<T, R>(
        &self,
        endpoint: &str,
        method: Method,
        data: T,
    ) -> anyhow::Result<RestfulResponse<R>>
    where
        T: ser::Serialize,
        R: de::DeserializeOwned, {
        let url = Url::parse(&self.url)?.join(endpoint)?;

        let response = match method {
            Method::GET => self.client.get(url).send().await,
            Method::POST => {
                self.client
                    .post(url)
                    .header("Content-Type", "application/json")
                    .json(&data)
                    .send()
                    .await
            }
            _ => anyhow::bail!("unsupported method: {method}"),
        };

        let response = match response {
            Ok(response) => response,
            Err(err) => anyhow::bail!("fail to send request: {err}"),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => anyhow::bail!("fail to read response content: {err:#}"),
        };

        if status.is_server_error() {
            anyhow::bail!("status code: {status}, response: {text}");
        }

        // client errors still carry a gateway message
        let response: RestfulResponse<R> = match serde_json::from_str(&text) {
            Ok(response) => response,
            Err(err) => {
                anyhow::bail!(
                    "fail to deserialize response: {err:#}, response: {text}, status: {status}"
                )
            }
        };

        Ok(response)
    }
}

fn message(message: Option<String>) -> String {
    message.unwrap_or_else(|| "no message".to_string())
}

fn into_data<R>(resp: RestfulResponse<R>) -> MinerResult<R> {
    if resp.code != 200 {
        return Err(MinerError::Chain(message(resp.message)));
    }
    resp.data.ok_or_else(|| MinerError::Chain("empty response".to_string()))
}

#[async_trait]
impl ChainClient for ServerAPI {
    async fn current_round(&self, identity: &WalletAddress) -> MinerResult<MiningRound> {
        let resp = self.call(&format!("/api/v1/round/{identity}"), Method::GET, ()).await?;
        let round: RoundResponse = into_data(resp)?;
        Ok(MiningRound::new(round.current_hash, *identity, round.difficulty))
    }

    async fn submit_proof(&self, solution: &Solution) -> MinerResult<ProofReceipt> {
        let resp = self.call("/api/v1/proof", Method::POST, *solution).await?;
        if resp.code != 200 {
            return Err(MinerError::SubmissionRejected(message(resp.message)));
        }
        resp.data.ok_or_else(|| MinerError::SubmissionRejected("empty receipt".to_string()))
    }

    async fn get_or_create_account(&self, identity: &WalletAddress) -> MinerResult<AccountHandle> {
        if let Some(account) = self.account(identity).await? {
            return Ok(account);
        }
        let payload = AddressRequest { address: *identity };
        let resp = self.call("/api/v1/account", Method::POST, payload).await?;
        into_data(resp).map_err(|err| MinerError::AccountUnavailable(err.to_string()))
    }

    async fn balance(&self, identity: &WalletAddress) -> MinerResult<u64> {
        let resp = self.call(&format!("/api/v1/balance/{identity}"), Method::GET, ()).await?;
        into_data(resp)
    }
}
