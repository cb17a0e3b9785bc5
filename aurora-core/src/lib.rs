pub mod block;
pub mod chain;
pub mod transaction;

pub use block::{Block, ValidatorSignatures};
pub use chain::{Account, Blockchain, BLOCK_REWARD};
pub use transaction::{AccountMeta, Instruction, Transaction};

pub type Address = String;
