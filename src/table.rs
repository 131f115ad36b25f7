//! The assembled dispatch table.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::context::EntryPointSource;
use crate::types::TypeCode;

/// Immutable dispatch table: index-aligned parallel arrays of dtype codes,
/// entry-point addresses, and closure-data slots, plus the fixed arity.
///
/// The Nth assembled variant is the Nth entry; the consuming array runtime
/// is handed exactly this shape (codes flattened as `arg…arg, ret` per
/// entry, one output). The table holds a shared handle to the entry-point
/// source, so the native code stays alive at least as long as the table.
/// Rebuilding means assembling a new table; nothing here mutates.
pub struct DispatchTable {
    arity: usize,
    type_codes: Vec<TypeCode>,
    entry_points: Vec<NonNull<u8>>,
    user_data: Vec<Option<NonNull<c_void>>>,
    _context: Rc<dyn EntryPointSource>,
}

/// Borrowed view of one dispatch entry.
#[derive(Debug, Clone, Copy)]
pub struct DispatchEntry<'a> {
    /// Dtype codes of the arguments, in signature order
    pub arg_codes: &'a [TypeCode],
    /// Dtype code of the single output
    pub ret_code: TypeCode,
    /// Native entry point of the compiled variant
    pub fn_ptr: NonNull<u8>,
    /// Opaque per-variant closure data, if any
    pub data: Option<NonNull<c_void>>,
}

impl DispatchTable {
    pub(crate) fn new(
        arity: usize,
        type_codes: Vec<TypeCode>,
        entry_points: Vec<NonNull<u8>>,
        user_data: Vec<Option<NonNull<c_void>>>,
        context: Rc<dyn EntryPointSource>,
    ) -> Self {
        debug_assert_eq!(type_codes.len(), entry_points.len() * (arity + 1));
        debug_assert_eq!(user_data.len(), entry_points.len());
        Self {
            arity,
            type_codes,
            entry_points,
            user_data,
            _context: context,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entry_points.len()
    }

    /// Always false for an assembled table; assembly rejects empty batches.
    pub fn is_empty(&self) -> bool {
        self.entry_points.is_empty()
    }

    /// Argument count shared by every entry.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Output count; always exactly one.
    pub fn output_count(&self) -> usize {
        1
    }

    /// Flattened dtype codes, `arity + 1` per entry (arguments then return).
    pub fn type_codes(&self) -> &[TypeCode] {
        &self.type_codes
    }

    /// Entry-point addresses, one per entry.
    pub fn entry_points(&self) -> &[NonNull<u8>] {
        &self.entry_points
    }

    /// Closure-data slots, one per entry.
    pub fn user_data(&self) -> &[Option<NonNull<c_void>>] {
        &self.user_data
    }

    /// View of the `index`th entry.
    pub fn entry(&self, index: usize) -> Option<DispatchEntry<'_>> {
        if index >= self.len() {
            return None;
        }
        let stride = self.arity + 1;
        let row = &self.type_codes[index * stride..(index + 1) * stride];
        Some(DispatchEntry {
            arg_codes: &row[..self.arity],
            ret_code: row[self.arity],
            fn_ptr: self.entry_points[index],
            data: self.user_data[index],
        })
    }

    /// Iterate entries in dispatch order.
    pub fn entries(&self) -> impl Iterator<Item = DispatchEntry<'_>> {
        (0..self.len()).filter_map(move |i| self.entry(i))
    }

    /// Typed function pointer for the `index`th entry.
    ///
    /// # Safety
    ///
    /// The caller must ensure `F` is a function-pointer type whose ABI and
    /// parameter/return types match the entry's compiled signature.
    pub unsafe fn entry_as<F: Copy>(&self, index: usize) -> Option<F> {
        self.entry_points.get(index).map(|ptr| {
            let raw = ptr.as_ptr() as *const u8;
            std::mem::transmute_copy(&raw)
        })
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("arity", &self.arity)
            .field("entries", &self.len())
            .field("type_codes", &self.type_codes)
            .finish_non_exhaustive()
    }
}
