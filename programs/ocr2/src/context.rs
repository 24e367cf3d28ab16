use crate::state::Address;

/// Who is calling and the environment the call executes in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Context {
    pub sender: Address,
    pub block_number: u64,
    pub timestamp: u64,
    /// Gas price paid by the calling transaction
    pub gas_price_wei: u128,
    /// Gas consumed by the call
    pub gas_used: u64,
}

impl Context {
    pub fn new(sender: Address) -> Self {
        Self {
            sender,
            ..Self::default()
        }
    }

    pub fn at(mut self, block_number: u64, timestamp: u64) -> Self {
        self.block_number = block_number;
        self.timestamp = timestamp;
        self
    }

    pub fn with_gas(mut self, gas_price_wei: u128, gas_used: u64) -> Self {
        self.gas_price_wei = gas_price_wei;
        self.gas_used = gas_used;
        self
    }
}
