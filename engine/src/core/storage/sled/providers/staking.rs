use async_trait::async_trait;
use log::trace;
use vantage_common::block::BlockHeight;

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{SlashEvent, SledStorage, StakingProvider, Validator},
};

#[async_trait]
impl StakingProvider for SledStorage {
    async fn get_validator(
        &self,
        operator_address: &str,
    ) -> Result<Option<Validator>, IndexerError> {
        trace!("get validator {}", operator_address);
        Self::load_optional_json(
            &self.validators,
            operator_address.as_bytes(),
            DiskContext::Validator,
        )
    }

    async fn store_validator(&self, validator: &Validator) -> Result<(), IndexerError> {
        Self::insert_json(
            &self.validators,
            validator.operator_address.as_bytes(),
            validator,
        )
    }

    async fn get_slash_events(
        &self,
        operator_address: &str,
        height: BlockHeight,
    ) -> Result<Vec<SlashEvent>, IndexerError> {
        trace!(
            "get slash events for {} at maximum height {}",
            operator_address,
            height
        );
        let prefix = SledStorage::len_prefixed_key(&[operator_address.as_bytes()]);
        let mut events = Vec::new();
        for entry in self.staking_slashes.scan_prefix(&prefix).rev() {
            let (entry_key, raw) = entry?;
            let Some(entry_height) = Self::height_at_suffix(&entry_key, 12) else {
                continue;
            };
            if entry_height > height {
                continue;
            }
            events.push(Self::decode_row(&raw, DiskContext::SlashEvent)?);
        }
        Ok(events)
    }

    async fn store_slash_event(&self, event: &SlashEvent) -> Result<(), IndexerError> {
        let prefix = SledStorage::len_prefixed_key(&[event
            .validator_operator_address
            .as_bytes()]);
        let versioned = Self::versioned_key(&prefix, event.registered_block.height);

        // Several slashes can land in one block; disambiguate with a
        // 4-byte sequence suffix
        let sequence = self.staking_slashes.scan_prefix(&versioned).count() as u32;
        let mut key = versioned;
        key.extend_from_slice(&sequence.to_be_bytes());
        Self::insert_json(&self.staking_slashes, &key, event)
    }
}
