//! Memory usage snapshots.

use serde::Serialize;

use crate::prelude::*;
use crate::string::JsString;

/// Allocation counts and sizes of a runtime, broken out by category.
///
/// Produced by [`Runtime::memory_usage`](crate::Runtime::memory_usage).
/// Sizes are estimates of the bytes owned by each category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub malloc_size: usize,
    pub malloc_limit: usize,
    pub gc_threshold: usize,
    pub memory_used_count: usize,
    pub atom_count: usize,
    pub atom_size: usize,
    pub str_count: usize,
    pub str_size: usize,
    pub obj_count: usize,
    pub obj_size: usize,
    pub prop_count: usize,
    pub prop_size: usize,
    pub shape_count: usize,
    pub shape_size: usize,
    pub js_func_count: usize,
    pub js_func_size: usize,
    pub js_func_code_size: usize,
    pub c_func_count: usize,
    pub array_count: usize,
    pub fast_array_count: usize,
    pub fast_array_elements: usize,
    pub binary_object_count: usize,
    pub binary_object_size: usize,
    pub var_ref_count: usize,
    pub async_frame_count: usize,
    pub module_count: usize,
    pub realm_count: usize,
    #[serde(skip)]
    seen_strings: FxHashSet<usize>,
}

impl MemoryUsage {
    /// Count a string once, however many places reference it.
    pub(crate) fn add_string(&mut self, s: &JsString) {
        if self.seen_strings.insert(s.addr()) {
            self.str_count += 1;
            self.str_size += s.heap_size();
        }
    }

    /// JSON rendering of the snapshot
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<28}{:>10}{:>12}", "NAME", "COUNT", "SIZE")?;
        let rows = [
            ("memory allocated", self.memory_used_count, self.malloc_size),
            ("atoms", self.atom_count, self.atom_size),
            ("strings", self.str_count, self.str_size),
            ("objects", self.obj_count, self.obj_size),
            ("properties", self.prop_count, self.prop_size),
            ("shapes", self.shape_count, self.shape_size),
            ("bytecode functions", self.js_func_count, self.js_func_size),
            ("bytecode", self.js_func_count, self.js_func_code_size),
            ("binary objects", self.binary_object_count, self.binary_object_size),
        ];
        for (name, count, size) in rows {
            writeln!(f, "{name:<28}{count:>10}{size:>12}")?;
        }
        writeln!(f, "{:<28}{:>10}", "C functions", self.c_func_count)?;
        writeln!(f, "{:<28}{:>10}", "arrays", self.array_count)?;
        writeln!(f, "{:<28}{:>10}", "fast arrays", self.fast_array_count)?;
        writeln!(f, "{:<28}{:>10}", "fast array elements", self.fast_array_elements)?;
        writeln!(f, "{:<28}{:>10}", "var refs", self.var_ref_count)?;
        writeln!(f, "{:<28}{:>10}", "async frames", self.async_frame_count)?;
        writeln!(f, "{:<28}{:>10}", "modules", self.module_count)?;
        write!(f, "{:<28}{:>10}", "realms", self.realm_count)
    }
}
