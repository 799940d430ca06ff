/// Source of the current process memory figure used for ceiling checks.
pub trait MemoryProbe: Send + Sync {
    /// Resident memory in bytes, or `None` if the platform cannot report it.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads physical memory of this process via `memory-stats`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMemory;

impl MemoryProbe for ProcessMemory {
    fn resident_bytes(&self) -> Option<u64> {
        memory_stats::memory_stats().map(|stats| stats.physical_mem as u64)
    }
}

/// Reports a fixed figure. Handy for exercising ceiling handling.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub u64);

impl MemoryProbe for FixedMemory {
    fn resident_bytes(&self) -> Option<u64> {
        Some(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_memory_is_nonzero_when_available() {
        if let Some(bytes) = ProcessMemory.resident_bytes() {
            assert!(bytes > 0, "a running process uses some memory");
        }
    }
}
