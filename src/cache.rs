//! Address-keyed caches shared by the resolver, the window builder and the
//! invalidation controller.

use std::collections::{HashMap, HashSet};

use crate::{Address, Instruction};

/// A map from address to value with an explicit "not present" answer.
#[derive(Debug, Clone)]
pub struct AddressCache<V> {
    entries: HashMap<Address, V>,
}

impl<V> Default for AddressCache<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> AddressCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: Address) -> Option<&V> {
        self.entries.get(&address)
    }

    /// Store `value`, returning what was there before.
    pub fn insert(&mut self, address: Address, value: V) -> Option<V> {
        self.entries.insert(address, value)
    }

    pub fn remove(&mut self, address: Address) -> Option<V> {
        self.entries.remove(&address)
    }

    pub fn contains(&self, address: Address) -> bool {
        self.entries.contains_key(&address)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.entries.keys().copied()
    }
}

impl AddressCache<bool> {
    /// Record a processor mode bit. An unknown bit forgets the address.
    pub fn set_bit(&mut self, address: Address, bit: Option<bool>) {
        match bit {
            Some(bit) => {
                self.entries.insert(address, bit);
            }
            None => {
                self.entries.remove(&address);
            }
        }
    }

    pub fn bit(&self, address: Address) -> Option<bool> {
        self.entries.get(&address).copied()
    }
}

/// Addresses the last window expects execution to reach next.
#[derive(Debug, Clone, Default)]
pub struct ForwardFrontier {
    addresses: HashSet<Address>,
}

impl ForwardFrontier {
    /// Replace the whole set, never merging with a previous window's.
    pub fn reset(&mut self, seed: Option<Address>) {
        self.addresses.clear();
        self.addresses.extend(seed);
    }

    pub fn add(&mut self, address: Address) {
        self.addresses.insert(address);
    }

    pub fn contains(&self, address: Address) -> bool {
        self.addresses.contains(&address)
    }

    pub fn clear(&mut self) {
        self.addresses.clear();
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Address> + '_ {
        self.addresses.iter().copied()
    }
}

/// Every piece of cached disassembly state for one debugging session.
#[derive(Debug, Clone, Default)]
pub struct DisasmCaches {
    /// Fully enhanced instructions. Entries are never modified in place.
    pub computed: AddressCache<Instruction>,
    /// address -> address of the instruction that executed just before it
    pub backward: AddressCache<Address>,
    /// address -> Thumb bit observed while emulating
    pub mode: AddressCache<bool>,
    pub frontier: ForwardFrontier,
}

impl DisasmCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything, including history.
    pub fn clear_all(&mut self) {
        self.computed.clear();
        self.backward.clear();
        self.mode.clear();
        self.frontier.clear();
    }
}
