pub mod evm;
pub mod ticker;
