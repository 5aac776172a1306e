//! Scripted provider for unit tests

use super::abi::{self, Token};
use super::{Eip1193Provider, ProviderError, ProviderFactory};
use crate::types::{parse_address, NetworkDescriptor};
use crate::PaymentError;
use async_trait::async_trait;
use ethereum_types::{Address, U256};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    accounts: Vec<Address>,
    chain_id: u64,
    chain_id_script: VecDeque<Result<Value, ProviderError>>,
    accounts_error: Option<ProviderError>,
    balance: U256,
    calls: HashMap<(Address, String), Result<Value, ProviderError>>,
    call_delays: HashMap<String, Duration>,
    send_errors: HashMap<String, ProviderError>,
    pending_receipts: bool,
    receipt_failures: usize,
    reverted_receipts: HashSet<String>,
    known_chains: HashSet<u64>,
    requests: Vec<(String, Value)>,
    sent: Vec<Value>,
    next_hash: u64,
}

/// Provider answering from scripted responses and recording every request
pub struct MockProvider {
    label: String,
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new(chain_id: u64, account: Address) -> Self {
        let state = MockState {
            accounts: vec![account],
            chain_id,
            known_chains: [chain_id].into_iter().collect(),
            next_hash: 1,
            ..Default::default()
        };
        Self {
            label: "mock".to_string(),
            state: Mutex::new(state),
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.lock().accounts = accounts;
    }

    pub fn reject_accounts(&self, err: ProviderError) {
        self.lock().accounts_error = Some(err);
    }

    /// Answers returned by `eth_chainId` before falling back to the configured chain
    pub fn script_chain_ids(&self, answers: Vec<Result<Value, ProviderError>>) {
        self.lock().chain_id_script = answers.into();
    }

    pub fn set_balance(&self, balance: U256) {
        self.lock().balance = balance;
    }

    pub fn add_known_chain(&self, chain_id: u64) {
        self.lock().known_chains.insert(chain_id);
    }

    /// Script an `eth_call` answer for `signature` on contract `to`
    pub fn on_call(&self, to: Address, signature: &str, tokens: &[Token]) {
        let data = format!("0x{}", hex::encode(abi::encode(tokens)));
        self.lock()
            .calls
            .insert((to, hex::encode(abi::selector(signature))), Ok(json!(data)));
    }

    pub fn on_call_error(&self, to: Address, signature: &str, err: ProviderError) {
        self.lock()
            .calls
            .insert((to, hex::encode(abi::selector(signature))), Err(err));
    }

    pub fn delay_call(&self, signature: &str, delay: Duration) {
        self.lock()
            .call_delays
            .insert(hex::encode(abi::selector(signature)), delay);
    }

    /// Fail `eth_sendTransaction` for calls to `signature`
    pub fn fail_send(&self, signature: &str, err: ProviderError) {
        self.lock()
            .send_errors
            .insert(hex::encode(abi::selector(signature)), err);
    }

    pub fn keep_receipts_pending(&self, pending: bool) {
        self.lock().pending_receipts = pending;
    }

    /// Fail the next `count` receipt polls with a transport error
    pub fn fail_receipt_polls(&self, count: usize) {
        self.lock().receipt_failures = count;
    }

    pub fn revert_receipt(&self, hash: &str) {
        self.lock().reverted_receipts.insert(hash.to_string());
    }

    pub fn chain_id(&self) -> u64 {
        self.lock().chain_id
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.lock().requests.clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.lock().requests.iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.lock().requests.iter().filter(|(m, _)| m == method).count()
    }

    /// Transactions passed to `eth_sendTransaction`
    pub fn sent(&self) -> Vec<Value> {
        self.lock().sent.clone()
    }

    /// Selectors of submitted transactions, in order
    pub fn sent_selectors(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|tx| tx.get("data").and_then(Value::as_str).map(selector_of))
            .collect()
    }
}

fn selector_of(data: &str) -> String {
    data.trim_start_matches("0x").chars().take(8).collect()
}

fn hash_for(n: u64) -> String {
    format!("0x{:064x}", n)
}

#[async_trait]
impl Eip1193Provider for MockProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.lock().requests.push((method.to_string(), params.clone()));

        match method {
            "eth_chainId" => {
                let mut state = self.lock();
                match state.chain_id_script.pop_front() {
                    Some(answer) => answer,
                    None => Ok(json!(format!("0x{:x}", state.chain_id))),
                }
            }
            "eth_accounts" | "eth_requestAccounts" => {
                let state = self.lock();
                if let Some(err) = &state.accounts_error {
                    return Err(err.clone());
                }
                Ok(json!(state
                    .accounts
                    .iter()
                    .map(|a| format!("{:?}", a))
                    .collect::<Vec<_>>()))
            }
            "eth_getBalance" => Ok(json!(format!("0x{:x}", self.lock().balance))),
            "eth_call" => {
                let to: Address = params[0]["to"]
                    .as_str()
                    .and_then(|s| parse_address(s).ok())
                    .unwrap_or_default();
                let selector = params[0]["data"].as_str().map(selector_of).unwrap_or_default();
                let delay = self.lock().call_delays.get(&selector).copied();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                self.lock()
                    .calls
                    .get(&(to, selector))
                    .cloned()
                    .unwrap_or_else(|| Err(ProviderError::rpc(3, "execution reverted")))
            }
            "eth_sendTransaction" => {
                let mut state = self.lock();
                let tx = params[0].clone();
                let selector = tx["data"].as_str().map(selector_of).unwrap_or_default();
                if let Some(err) = state.send_errors.get(&selector) {
                    return Err(err.clone());
                }
                state.sent.push(tx);
                let hash = hash_for(state.next_hash);
                state.next_hash += 1;
                Ok(json!(hash))
            }
            "eth_getTransactionReceipt" => {
                let mut state = self.lock();
                if state.receipt_failures > 0 {
                    state.receipt_failures -= 1;
                    return Err(ProviderError::Transport("connection reset".to_string()));
                }
                if state.pending_receipts {
                    return Ok(Value::Null);
                }
                let hash = params[0].as_str().unwrap_or_default().to_string();
                let status = if state.reverted_receipts.contains(&hash) {
                    "0x0"
                } else {
                    "0x1"
                };
                Ok(json!({
                    "transactionHash": hash,
                    "blockNumber": "0x2a",
                    "status": status,
                }))
            }
            "wallet_switchEthereumChain" => {
                let mut state = self.lock();
                let requested = params[0]["chainId"]
                    .as_str()
                    .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
                    .unwrap_or_default();
                if !state.known_chains.contains(&requested) {
                    return Err(ProviderError::rpc(4902, "Unrecognized chain ID"));
                }
                state.chain_id = requested;
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                let mut state = self.lock();
                let added = params[0]["chainId"]
                    .as_str()
                    .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
                    .unwrap_or_default();
                state.known_chains.insert(added);
                state.chain_id = added;
                Ok(Value::Null)
            }
            other => Err(ProviderError::rpc(-32601, format!("method {} not mocked", other))),
        }
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

/// Factory handing out prepared mock providers per network key
#[derive(Default)]
pub struct MockFactory {
    providers: Mutex<HashMap<String, Arc<MockProvider>>>,
    built: Mutex<Vec<String>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, network_key: &str, provider: Arc<MockProvider>) -> Self {
        self.providers
            .lock()
            .unwrap()
            .insert(network_key.to_string(), provider);
        self
    }

    /// Network keys providers were built for, in order
    pub fn built(&self) -> Vec<String> {
        self.built.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderFactory for MockFactory {
    async fn provider_for(
        &self,
        network: &NetworkDescriptor,
    ) -> crate::Result<Arc<dyn Eip1193Provider>> {
        self.built
            .lock()
            .unwrap()
            .push(network.canonical_key.to_string());
        match self.providers.lock().unwrap().get(network.canonical_key) {
            Some(provider) => Ok(provider.clone() as Arc<dyn Eip1193Provider>),
            None => Err(PaymentError::rpc(format!(
                "No reachable RPC endpoint for {}",
                network.display_name
            ))),
        }
    }
}
