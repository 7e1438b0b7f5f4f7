mod providers;

pub mod sled;

pub use self::providers::*;
pub use self::sled::SledStorage;

/// The full event-store contract the compute engine runs against. One
/// backend object implements every family provider; the evaluator only
/// ever sees this composition.
pub trait Storage:
    BlockProvider
    + StateProvider
    + ContractProvider
    + WasmStateProvider
    + TransformationProvider
    + WasmTxProvider
    + BankProvider
    + StakingProvider
    + GovProvider
    + CommunityPoolProvider
    + ExtractionProvider
    + FeegrantProvider
    + ComputationProvider
    + DependencyProvider
    + RawQueryProvider
    + Send
    + Sync
    + 'static
{
}

impl<T> Storage for T where
    T: BlockProvider
        + StateProvider
        + ContractProvider
        + WasmStateProvider
        + TransformationProvider
        + WasmTxProvider
        + BankProvider
        + StakingProvider
        + GovProvider
        + CommunityPoolProvider
        + ExtractionProvider
        + FeegrantProvider
        + ComputationProvider
        + DependencyProvider
        + RawQueryProvider
        + Send
        + Sync
        + 'static
{
}
