//! Contract calls shared by the payment, fee and escrow services
//!
//! [`ContractClient`] binds a provider to the sending account and chain, so every
//! write is stamped with the same `from` and `chainId` for the whole operation.

use crate::provider::abi::{self, Token};
use crate::provider::units::format_units;
use crate::provider::{EthClient, TransactionReceipt, TransactionRequest};
use crate::session::SessionSnapshot;
use crate::types::{format_address, format_hash, tokens, OWNER_ACCESSORS};
use crate::{PaymentError, Result};
use ethereum_types::{Address, H256, U256};
use std::time::Duration;

/// ERC-20 function signatures
pub mod erc20 {
    pub const DECIMALS: &str = "decimals()";
    pub const SYMBOL: &str = "symbol()";
    pub const BALANCE_OF: &str = "balanceOf(address)";
    pub const ALLOWANCE: &str = "allowance(address,address)";
    pub const APPROVE: &str = "approve(address,uint256)";
}

/// How long to wait for a confirmation and how often to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1500),
            timeout: Duration::from_secs(90),
        }
    }
}

/// Reads and writes against contracts on one chain as one account
#[derive(Debug, Clone)]
pub struct ContractClient {
    eth: EthClient,
    from: Address,
    chain_id: u64,
    policy: ConfirmPolicy,
}

impl ContractClient {
    pub fn new(eth: EthClient, from: Address, chain_id: u64) -> Self {
        Self {
            eth,
            from,
            chain_id,
            policy: ConfirmPolicy::default(),
        }
    }

    /// Client for the account and chain captured in a session snapshot
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        Self::new(
            snapshot.client(),
            snapshot.session.address,
            snapshot.session.chain_id,
        )
    }

    pub fn with_confirm_policy(mut self, policy: ConfirmPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn eth(&self) -> &EthClient {
        &self.eth
    }

    pub fn from(&self) -> Address {
        self.from
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn confirm_policy(&self) -> ConfirmPolicy {
        self.policy
    }

    /// `eth_call` returning raw return data
    pub async fn read(&self, contract: Address, signature: &str, args: &[Token]) -> Result<Vec<u8>> {
        self.eth
            .call(contract, abi::encode_call(signature, args))
            .await
    }

    pub async fn read_uint(&self, contract: Address, signature: &str, args: &[Token]) -> Result<U256> {
        let data = self.read(contract, signature, args).await?;
        abi::decode_uint(&data, 0)
    }

    pub async fn read_address(
        &self,
        contract: Address,
        signature: &str,
        args: &[Token],
    ) -> Result<Address> {
        let data = self.read(contract, signature, args).await?;
        abi::decode_address(&data, 0)
    }

    /// Submit a transaction without waiting for it
    pub async fn submit(
        &self,
        contract: Address,
        signature: &str,
        args: &[Token],
        value: U256,
    ) -> Result<H256> {
        let tx = TransactionRequest::new(contract)
            .with_from(self.from)
            .with_value(value)
            .with_data(abi::encode_call(signature, args))
            .with_chain_id(self.chain_id);
        tracing::debug!(
            contract = %format_address(&contract),
            function = signature,
            chain_id = self.chain_id,
            "Submitting transaction"
        );
        let hash = self.eth.send_transaction(&tx).await?;
        tracing::info!(tx = %format_hash(&hash), function = signature, "Transaction submitted");
        Ok(hash)
    }

    /// Wait for one confirmation under the confirm policy
    pub async fn confirm(&self, hash: H256) -> Result<TransactionReceipt> {
        self.eth
            .wait_for_receipt(hash, self.policy.poll_interval, self.policy.timeout)
            .await
    }

    /// Submit and wait for one confirmation
    pub async fn execute(
        &self,
        contract: Address,
        signature: &str,
        args: &[Token],
        value: U256,
    ) -> Result<TransactionReceipt> {
        let hash = self.submit(contract, signature, args, value).await?;
        self.confirm(hash).await
    }

    /// Contract owner from the first accessor that answers with a non-zero address
    pub async fn owner(&self, contract: Address) -> Result<Option<Address>> {
        for accessor in OWNER_ACCESSORS {
            let signature = format!("{}()", accessor);
            match self.read_address(contract, &signature, &[]).await {
                Ok(owner) if !owner.is_zero() => {
                    tracing::debug!(accessor, owner = %format_address(&owner), "Owner resolved");
                    return Ok(Some(owner));
                }
                Ok(_) => tracing::debug!(accessor, "Accessor returned the zero address"),
                Err(e) => tracing::debug!(accessor, error = %e, "Owner accessor unavailable"),
            }
        }
        Ok(None)
    }

    /// Fail with `PermissionDenied` unless the sending account owns `contract`
    pub async fn ensure_owner(&self, contract: Address) -> Result<()> {
        match self.owner(contract).await? {
            Some(owner) if owner == self.from => Ok(()),
            Some(owner) => {
                tracing::warn!(
                    caller = %format_address(&self.from),
                    owner = %format_address(&owner),
                    "Caller is not the contract owner"
                );
                Err(PaymentError::PermissionDenied(
                    "not the contract owner".to_string(),
                ))
            }
            None => Err(PaymentError::PermissionDenied(
                "contract owner could not be determined".to_string(),
            )),
        }
    }

    /// Token decimals, or the USDT default when the token is slow or silent
    pub async fn token_decimals(&self, token: Address, limit: Duration) -> u8 {
        match tokio::time::timeout(limit, self.read_uint(token, erc20::DECIMALS, &[])).await {
            Ok(Ok(decimals)) if decimals <= U256::from(u8::MAX) => decimals.low_u32() as u8,
            Ok(Ok(decimals)) => {
                tracing::warn!(%decimals, "Implausible token decimals, using fallback");
                tokens::FALLBACK_DECIMALS
            }
            Ok(Err(e)) => {
                tracing::warn!(token = %format_address(&token), error = %e, "decimals() failed, using fallback");
                tokens::FALLBACK_DECIMALS
            }
            Err(_) => {
                tracing::warn!(token = %format_address(&token), ?limit, "decimals() timed out, using fallback");
                tokens::FALLBACK_DECIMALS
            }
        }
    }

    pub async fn token_symbol(&self, token: Address) -> Result<String> {
        let data = self.read(token, erc20::SYMBOL, &[]).await?;
        abi::decode_string(&data, 0)
    }

    pub async fn token_balance(&self, token: Address, holder: Address) -> Result<U256> {
        self.read_uint(token, erc20::BALANCE_OF, &[Token::Address(holder)])
            .await
    }

    pub async fn allowance(&self, token: Address, spender: Address) -> Result<U256> {
        self.read_uint(
            token,
            erc20::ALLOWANCE,
            &[Token::Address(self.from), Token::Address(spender)],
        )
        .await
    }

    /// Fail with `InsufficientFunds` when the sender holds less than `required`
    pub async fn ensure_token_balance(
        &self,
        token: Address,
        required: U256,
        decimals: u8,
        symbol: &str,
    ) -> Result<()> {
        let available = self.token_balance(token, self.from).await?;
        if available < required {
            return Err(PaymentError::InsufficientFunds {
                required: format_units(required, decimals),
                available: format_units(available, decimals),
                symbol: symbol.to_string(),
            });
        }
        Ok(())
    }

    /// Approve `spender` for `amount` when the current allowance is short
    ///
    /// Returns the approval receipt, or `None` when no approval was needed.
    pub async fn ensure_allowance(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<Option<TransactionReceipt>> {
        let current = self.allowance(token, spender).await?;
        if current >= amount {
            tracing::debug!(%current, %amount, "Allowance sufficient");
            return Ok(None);
        }
        tracing::info!(spender = %format_address(&spender), %amount, "Approving token spend");
        let receipt = self
            .execute(
                token,
                erc20::APPROVE,
                &[Token::Address(spender), Token::Uint(amount)],
                U256::zero(),
            )
            .await?;
        Ok(Some(receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use crate::provider::ProviderError;
    use std::sync::Arc;

    fn account() -> Address {
        Address::from_low_u64_be(0xa11ce)
    }

    fn contract() -> Address {
        Address::from_low_u64_be(0xc0ffee)
    }

    fn client(mock: &Arc<MockProvider>) -> ContractClient {
        ContractClient::new(EthClient::new(mock.clone()), account(), 97).with_confirm_policy(
            ConfirmPolicy {
                poll_interval: Duration::from_millis(5),
                timeout: Duration::from_millis(200),
            },
        )
    }

    #[tokio::test]
    async fn test_owner_accessor_fallthrough() {
        let mock = Arc::new(MockProvider::new(97, account()));
        mock.on_call(contract(), "owner()", &[Token::Address(Address::zero())]);
        mock.on_call(contract(), "admin()", &[Token::Address(account())]);
        let client = client(&mock);

        assert_eq!(client.owner(contract()).await.unwrap(), Some(account()));
        assert!(client.ensure_owner(contract()).await.is_ok());
    }

    #[tokio::test]
    async fn test_not_owner() {
        let mock = Arc::new(MockProvider::new(97, account()));
        mock.on_call(
            contract(),
            "getOwner()",
            &[Token::Address(Address::from_low_u64_be(9))],
        );
        let client = client(&mock);
        assert!(matches!(
            client.ensure_owner(contract()).await,
            Err(PaymentError::PermissionDenied(_))
        ));

        let silent = Arc::new(MockProvider::new(97, account()));
        assert!(matches!(
            self::client(&silent).ensure_owner(contract()).await,
            Err(PaymentError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_token_decimals_fallback() {
        let token = Address::from_low_u64_be(0x7);
        let mock = Arc::new(MockProvider::new(97, account()));
        let client = client(&mock);

        // unscripted call reverts
        assert_eq!(client.token_decimals(token, Duration::from_secs(1)).await, 6);

        mock.on_call(token, erc20::DECIMALS, &[Token::Uint(U256::from(18))]);
        assert_eq!(client.token_decimals(token, Duration::from_secs(1)).await, 18);

        mock.delay_call(erc20::DECIMALS, Duration::from_millis(200));
        assert_eq!(
            client.token_decimals(token, Duration::from_millis(20)).await,
            6
        );
    }

    #[tokio::test]
    async fn test_ensure_allowance() {
        let token = Address::from_low_u64_be(0x7);
        let mock = Arc::new(MockProvider::new(97, account()));
        mock.on_call(token, erc20::ALLOWANCE, &[Token::Uint(U256::from(100))]);
        let client = client(&mock);

        assert!(client
            .ensure_allowance(token, contract(), U256::from(50))
            .await
            .unwrap()
            .is_none());
        assert!(mock.sent().is_empty());

        let receipt = client
            .ensure_allowance(token, contract(), U256::from(500))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(receipt.block_number, 42);
        assert_eq!(
            mock.sent_selectors(),
            vec![hex::encode(abi::selector(erc20::APPROVE))]
        );
        assert_eq!(mock.sent()[0]["chainId"], "0x61");
    }

    #[tokio::test]
    async fn test_insufficient_token_balance() {
        let token = Address::from_low_u64_be(0x7);
        let mock = Arc::new(MockProvider::new(97, account()));
        mock.on_call(token, erc20::BALANCE_OF, &[Token::Uint(U256::from(5_000_000u64))]);
        let client = client(&mock);

        let err = client
            .ensure_token_balance(token, U256::from(10_000_000u64), 6, "USDT")
            .await
            .unwrap_err();
        match err {
            PaymentError::InsufficientFunds {
                required,
                available,
                symbol,
            } => {
                assert_eq!(required, "10");
                assert_eq!(available, "5");
                assert_eq!(symbol, "USDT");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_reverted_receipt() {
        let mock = Arc::new(MockProvider::new(97, account()));
        mock.revert_receipt(&format!("0x{:064x}", 1));
        let client = client(&mock);

        let err = client
            .execute(contract(), "completeJob(string)", &[Token::String("j".into())], U256::zero())
            .await
            .unwrap_err();
        assert!(err.is_contract_level());

        mock.fail_send(
            "completeJob(string)",
            ProviderError::rpc(4001, "User denied transaction signature"),
        );
        assert!(matches!(
            client
                .submit(contract(), "completeJob(string)", &[], U256::zero())
                .await,
            Err(PaymentError::UserRejected)
        ));
    }
}
