use std::mem;

use static_assertions::const_assert;

use arrayvec::arrayvec;

use crate::state::{Address, Ownership};
use crate::Result;

pub const MAX_ADDRS: usize = 64;

#[derive(Clone, Copy)]
pub struct AccessList {
    xs: [Address; MAX_ADDRS],
    len: u64,
}
arrayvec!(AccessList, Address, u64);
const_assert!(
    mem::size_of::<AccessList>() == mem::size_of::<u64>() + mem::size_of::<Address>() * MAX_ADDRS
);

/// A sorted allow list that can be switched off, in which case everyone has access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessPolicy {
    access_list: AccessList,
    check_enabled: bool,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            access_list: AccessList::new(),
            check_enabled: true,
        }
    }
}

impl AccessPolicy {
    pub fn has_access(&self, address: &Address) -> bool {
        !self.check_enabled || self.is_listed(address)
    }

    pub fn is_listed(&self, address: &Address) -> bool {
        self.access_list.binary_search(address).is_ok()
    }

    pub fn check_enabled(&self) -> bool {
        self.check_enabled
    }

    pub fn listed(&self) -> &[Address] {
        &self.access_list
    }

    /// Returns whether the address was newly added.
    pub fn add(&mut self, address: Address) -> Result<bool> {
        match self.access_list.binary_search(&address) {
            // already present
            Ok(_) => Ok(false),
            // not found, insert
            Err(i) => {
                // if the len reaches array len, we're at capacity
                require!(self.access_list.remaining_capacity() > 0, Full);
                self.access_list.insert(i, address);
                Ok(true)
            }
        }
    }

    /// Returns whether the address was present.
    pub fn remove(&mut self, address: &Address) -> bool {
        match self.access_list.binary_search(address) {
            Ok(index) => {
                // still sorted after removal
                self.access_list.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    /// Returns whether the setting changed.
    pub fn set_check_enabled(&mut self, enabled: bool) -> bool {
        mem::replace(&mut self.check_enabled, enabled) != enabled
    }
}

/// A standalone, owner-managed access policy consulted by the aggregator for billing and
/// round request permissions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessController {
    address: Address,
    ownership: Ownership,
    policy: AccessPolicy,
}

impl AccessController {
    pub fn new(address: Address, owner: Address) -> Self {
        Self {
            address,
            ownership: Ownership::new(owner),
            policy: AccessPolicy::default(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.ownership.owner()
    }

    pub fn transfer_ownership(&mut self, authority: &Address, proposed_owner: Address) -> Result<()> {
        self.ownership.transfer(authority, proposed_owner)
    }

    pub fn accept_ownership(&mut self, authority: &Address) -> Result<Address> {
        self.ownership.accept(authority)
    }

    pub fn add_access(&mut self, authority: &Address, address: Address) -> Result<bool> {
        self.ownership.require_owner(authority)?;
        self.policy.add(address)
    }

    pub fn remove_access(&mut self, authority: &Address, address: &Address) -> Result<bool> {
        self.ownership.require_owner(authority)?;
        Ok(self.policy.remove(address))
    }

    pub fn enable_access_check(&mut self, authority: &Address) -> Result<bool> {
        self.ownership.require_owner(authority)?;
        Ok(self.policy.set_check_enabled(true))
    }

    pub fn disable_access_check(&mut self, authority: &Address) -> Result<bool> {
        self.ownership.require_owner(authority)?;
        Ok(self.policy.set_check_enabled(false))
    }

    /// Check if `address` is on the access control list.
    pub fn has_access(&self, address: &Address) -> bool {
        self.policy.has_access(address)
    }
}
