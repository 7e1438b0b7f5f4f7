use async_trait::async_trait;
use log::trace;

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{Contract, ContractProvider, SledStorage},
};

#[async_trait]
impl ContractProvider for SledStorage {
    async fn get_contract(&self, address: &str) -> Result<Option<Contract>, IndexerError> {
        trace!("get contract {}", address);
        Self::load_optional_json(&self.contracts, address.as_bytes(), DiskContext::Contract)
    }

    async fn store_contract(&self, contract: &Contract) -> Result<(), IndexerError> {
        trace!(
            "store contract {} with code id {}",
            contract.address,
            contract.code_id
        );
        Self::insert_json(&self.contracts, contract.address.as_bytes(), contract)
    }
}
