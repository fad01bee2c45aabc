//! Per-PC GC metadata: the side table §4.4 step 2 and §9 "Per-PC metadata"
//! describe as "a preexisting artifact produced by the code generator".
//!
//! This module owns the metadata record shape and the "greatest offset <=
//! query" lookup (§6: `map_function_gc_metadata` "enumerate metadata
//! entries in ascending PC-offset order; metadata lookup selects the entry
//! with greatest offset <= the query"). There is no direct teacher
//! counterpart — `fgc`'s stack scanner is watermark-based, not precise —
//! so this is new code, shaped to read like the rest of the crate's
//! small data-plus-accessors modules.

/// §4.4 step 8 / §4.5a: where the incoming-argument count is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingArguments {
    None,
    /// An integer stack-slot index holding the fixnum argument count.
    StackSlot(u32),
    /// `:rcx` — only legal in full-save frames (§4.4 step 3).
    Rcx,
}

/// §4.5a "extra_registers": which additional registers are live roots at
/// an interrupt-precise point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraRegisters {
    None,
    Rax,
    RaxRcx,
    RaxRcxRdx,
}

/// One entry of the per-PC metadata table: "the state effective just
/// before the return address" (§4.4 step 2).
#[derive(Debug, Clone, Copy)]
pub struct GcMetadata {
    pub pc_offset: u32,
    pub framep: bool,
    pub interruptp: bool,
    pub pushed_values: u32,
    pub pushed_values_register: bool,
    pub layout_addr: usize,
    pub layout_length: u32,
    pub multiple_values: u32,
    pub incoming_arguments: IncomingArguments,
    pub block_or_tagbody_thunk: bool,
    pub extra_registers: ExtraRegisters,
}

impl GcMetadata {
    /// §4.4 step 3: fields legal only in full-save frames (§4.5), never in
    /// an ordinary mid-call frame.
    pub fn full_save_only_fields_present(&self) -> bool {
        self.pushed_values_register
            || self.multiple_values != 0
            || self.block_or_tagbody_thunk
            || matches!(self.incoming_arguments, IncomingArguments::Rcx)
            || !matches!(self.extra_registers, ExtraRegisters::None)
    }
}

/// A function's metadata table: entries sorted ascending by `pc_offset`.
/// Constructed by the embedder's code generator and handed to this crate
/// read-only, per §9.
#[derive(Debug, Clone, Default)]
pub struct GcMetadataTable {
    entries: Vec<GcMetadata>,
}

impl GcMetadataTable {
    /// `entries` must already be sorted ascending by `pc_offset`; this is
    /// an embedder invariant, not something this crate re-validates on
    /// every lookup.
    pub fn new(entries: Vec<GcMetadata>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].pc_offset <= w[1].pc_offset));
        Self { entries }
    }

    /// §6: "metadata lookup selects the entry with greatest offset <= the
    /// query."
    pub fn lookup(&self, pc_offset: u32) -> Option<&GcMetadata> {
        match self.entries.binary_search_by_key(&pc_offset, |e| e.pc_offset) {
            Ok(idx) => Some(&self.entries[idx]),
            Err(0) => None,
            Err(idx) => Some(&self.entries[idx - 1]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(offset: u32) -> GcMetadata {
        GcMetadata {
            pc_offset: offset,
            framep: true,
            interruptp: false,
            pushed_values: 0,
            pushed_values_register: false,
            layout_addr: 0,
            layout_length: 0,
            multiple_values: 0,
            incoming_arguments: IncomingArguments::None,
            block_or_tagbody_thunk: false,
            extra_registers: ExtraRegisters::None,
        }
    }

    #[test]
    fn greatest_offset_le_query() {
        let table = GcMetadataTable::new(vec![entry(0), entry(10), entry(20)]);
        assert_eq!(table.lookup(0).unwrap().pc_offset, 0);
        assert_eq!(table.lookup(5).unwrap().pc_offset, 0);
        assert_eq!(table.lookup(10).unwrap().pc_offset, 10);
        assert_eq!(table.lookup(15).unwrap().pc_offset, 10);
        assert_eq!(table.lookup(25).unwrap().pc_offset, 20);
    }

    #[test]
    fn below_first_entry_is_none() {
        let table = GcMetadataTable::new(vec![entry(10)]);
        assert!(table.lookup(5).is_none());
    }

    #[test]
    fn full_save_only_fields() {
        let mut e = entry(0);
        assert!(!e.full_save_only_fields_present());
        e.multiple_values = 2;
        assert!(e.full_save_only_fields_present());
    }
}
