//! VM configuration

/// Default operand stack capacity
pub const DEFAULT_STACK_MAX: usize = 2048;

/// Default call depth
pub const DEFAULT_FRAMES_MAX: usize = 64;

/// Heap object count that triggers the first collection
pub const DEFAULT_GC_THRESHOLD: usize = 256;

/// Tunables for a [`VM`](crate::vm::VM)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    pub stack_max: usize,
    pub frames_max: usize,
    pub gc_threshold: usize,
    /// Collect before every runtime allocation
    pub stress_gc: bool,
    /// File name used in runtime error locations
    pub file_name: String,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_max: DEFAULT_STACK_MAX,
            frames_max: DEFAULT_FRAMES_MAX,
            gc_threshold: DEFAULT_GC_THRESHOLD,
            stress_gc: false,
            file_name: "<script>".to_string(),
        }
    }
}

impl VmConfig {
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = threshold;
        self
    }

    pub fn with_stress_gc(mut self, stress: bool) -> Self {
        self.stress_gc = stress;
        self
    }
}
