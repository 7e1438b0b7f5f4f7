use std::collections::BTreeMap;

use async_trait::async_trait;
use log::trace;
use vantage_common::block::BlockHeight;

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{BankBalance, BankProvider, BankStateEvent, SledStorage},
};

// lp(address) || lp(denom); versions append be64(height)
fn denom_prefix(address: &str, denom: &str) -> Vec<u8> {
    SledStorage::len_prefixed_key(&[address.as_bytes(), denom.as_bytes()])
}

#[async_trait]
impl BankProvider for SledStorage {
    async fn get_bank_balance(
        &self,
        address: &str,
    ) -> Result<Option<BankBalance>, IndexerError> {
        trace!("get bank balance snapshot for {}", address);
        Self::load_optional_json(
            &self.bank_balances,
            address.as_bytes(),
            DiskContext::BankBalance,
        )
    }

    async fn set_bank_balance(&self, balance: &BankBalance) -> Result<(), IndexerError> {
        Self::insert_json(&self.bank_balances, balance.address.as_bytes(), balance)
    }

    async fn get_bank_state_at_maximum_height(
        &self,
        address: &str,
        denom: &str,
        height: BlockHeight,
    ) -> Result<Option<BankStateEvent>, IndexerError> {
        trace!(
            "get bank state for {} denom {} at maximum height {}",
            address,
            denom,
            height
        );
        let prefix = denom_prefix(address, denom);
        match Self::last_version_at_most(&self.bank_state, &prefix, height)? {
            Some(raw) => Ok(Some(Self::decode_row(&raw, DiskContext::BankState)?)),
            None => Ok(None),
        }
    }

    async fn get_bank_state_map_at_maximum_height(
        &self,
        address: &str,
        height: BlockHeight,
    ) -> Result<Vec<BankStateEvent>, IndexerError> {
        let prefix = SledStorage::len_prefixed_key(&[address.as_bytes()]);
        let mut best: BTreeMap<String, BankStateEvent> = BTreeMap::new();
        // Ascending (denom, height) order: a later hit for the same
        // denom always supersedes the previous one
        for entry in self.bank_state.scan_prefix(&prefix) {
            let (entry_key, raw) = entry?;
            let Some(entry_height) = Self::height_at_suffix(&entry_key, 8) else {
                continue;
            };
            if entry_height > height {
                continue;
            }
            let event: BankStateEvent = Self::decode_row(&raw, DiskContext::BankState)?;
            best.insert(event.denom.clone(), event);
        }
        Ok(best.into_values().collect())
    }

    async fn store_bank_state(&self, event: &BankStateEvent) -> Result<(), IndexerError> {
        let prefix = denom_prefix(&event.address, &event.denom);
        let key = Self::versioned_key(&prefix, event.block.height);
        Self::insert_json(&self.bank_state, &key, event)
    }
}
