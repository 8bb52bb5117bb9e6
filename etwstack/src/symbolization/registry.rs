use log::debug;
use std::collections::HashMap;

use super::address_index::{AddressIndex, AddressRange};
use crate::domain::{CorrelationError, FunctionId, Lookup, ModuleId};

/// A loaded module (usually one source file)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub id: ModuleId,
    /// `None` when the module is not backed by a user file
    pub source_file: Option<String>,
    /// Created to hold functions that referenced this id before it was defined
    pub placeholder: bool,
}

/// A function body known to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub id: FunctionId,
    pub module_id: ModuleId,
    pub name: String,
    /// Code region of the compiled body (sampling backends only)
    pub range: Option<AddressRange>,
    seq: u64,
}

/// Registry of every module and function defined so far
///
/// Owns all definition records. Redefinition under an existing id replaces
/// the record; functions keep pointing at their module id and so follow a
/// reloaded module to its new record.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    modules: HashMap<ModuleId, Module>,
    functions: HashMap<FunctionId, Function>,
    index: AddressIndex,
    next_seq: u64,
}

impl SymbolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a module record
    pub fn define_module(&mut self, id: ModuleId, source_file: Option<String>) {
        let module = Module { id, source_file, placeholder: false };
        if let Some(previous) = self.modules.insert(id, module) {
            if previous.source_file != self.modules[&id].source_file {
                debug!(
                    "{id} redefined: {:?} -> {:?}",
                    previous.source_file, self.modules[&id].source_file
                );
            }
        }
    }

    /// Insert or replace a function record
    ///
    /// A function whose module is not registered is still recorded, under a
    /// placeholder module with no source file, so id and address lookups keep
    /// working. The anomaly is returned for the caller to report.
    ///
    /// # Errors
    /// Returns [`CorrelationError::UnknownModule`] if `module_id` was never defined
    pub fn define_function(
        &mut self,
        id: FunctionId,
        module_id: ModuleId,
        name: impl Into<String>,
        begin: Option<u64>,
        end: Option<u64>,
    ) -> Result<(), CorrelationError> {
        let name = name.into();
        let range = match (begin, end) {
            (Some(b), Some(e)) => {
                let range = AddressRange::new(b, e);
                if range.is_none() {
                    debug!("{id} ({name}) has inverted range 0x{b:x}..0x{e:x}, indexing by id only");
                }
                range
            }
            (None, None) => None,
            _ => {
                debug!("{id} ({name}) has a partial address range, indexing by id only");
                None
            }
        };

        self.next_seq += 1;
        let seq = self.next_seq;
        if let Some(range) = range {
            self.index.insert(id, range, seq);
        }
        self.functions.insert(id, Function { id, module_id, name, range, seq });

        // A placeholder stands in for a module that is still undefined
        match self.modules.get(&module_id) {
            Some(module) if !module.placeholder => return Ok(()),
            Some(_) => {}
            None => {
                self.modules
                    .insert(module_id, Module { id: module_id, source_file: None, placeholder: true });
            }
        }
        Err(CorrelationError::UnknownModule { function: id, module: module_id })
    }

    /// Look up a function by id
    ///
    /// # Errors
    /// Returns [`CorrelationError::NotFound`] if the id was never defined
    pub fn lookup_by_id(&self, id: FunctionId) -> Result<&Function, CorrelationError> {
        self.functions.get(&id).ok_or(CorrelationError::NotFound(Lookup::Function(id)))
    }

    /// Look up the function whose address range contains `addr`
    ///
    /// Overlapping ranges resolve to the most recently defined function.
    ///
    /// # Errors
    /// Returns [`CorrelationError::NotFound`] if no range contains `addr`
    pub fn lookup_by_address(&self, addr: u64) -> Result<&Function, CorrelationError> {
        self.index
            .lookup(addr, |id, seq| self.is_current(id, seq))
            .and_then(|id| self.functions.get(&id))
            .ok_or(CorrelationError::NotFound(Lookup::Address(addr)))
    }

    /// Merge pending address ranges into the sorted index
    ///
    /// Call after a burst of definitions and before a burst of lookups.
    /// Lookups stay correct without it, only slower.
    pub fn seal(&mut self) {
        let functions = &self.functions;
        self.index.seal(|id, seq| functions.get(&id).is_some_and(|f| f.seq == seq));
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(&id)
    }

    /// Module that owns `function`
    #[must_use]
    pub fn module_of(&self, function: &Function) -> Option<&Module> {
        self.modules.get(&function.module_id)
    }

    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    fn is_current(&self, id: FunctionId, seq: u64) -> bool {
        self.functions.get(&id).is_some_and(|f| f.seq == seq)
    }
}
