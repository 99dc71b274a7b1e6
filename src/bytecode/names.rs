use std::collections::HashMap;

/// Human-readable names for addresses, built during one compilation.
///
/// Owned by the code generator and handed out with the finished program;
/// the disassembler and error messages borrow it.
#[derive(Debug, Clone, Default)]
pub struct AddressNames {
    names: HashMap<usize, String>,
}

impl AddressNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: usize, name: impl Into<String>) {
        self.names.insert(address, name.into());
    }

    pub fn get(&self, address: usize) -> Option<&str> {
        self.names.get(&address).map(String::as_str)
    }

    /// The recorded name, or the bare address.
    pub fn display(&self, address: usize) -> String {
        match self.get(address) {
            Some(name) => name.to_string(),
            None => address.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
