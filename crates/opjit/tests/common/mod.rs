//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use opjit::{JitConfig, JitRuntime, OpcodeRegistry, OpcodeSpec, Status};
use tempfile::TempDir;

/// A host opcode table that records registrations.
#[derive(Debug, Default)]
pub struct FakeRegistry {
    pub opcodes: Vec<OpcodeSpec>,
    pub status: Status,
}

impl OpcodeRegistry for FakeRegistry {
    fn append_opcode(&mut self, spec: &OpcodeSpec) -> Status {
        self.opcodes.push(spec.clone());
        self.status
    }
}

/// A runtime writing its units into a private directory.
pub struct TestHost {
    pub runtime: JitRuntime,
    pub dir: TempDir,
}

impl TestHost {
    pub fn new() -> Self {
        Self::with_keep_files(false)
    }

    pub fn with_keep_files(keep: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = JitConfig::default()
            .with_temp_dir(dir.path())
            .with_keep_temp_files(keep);
        Self {
            runtime: JitRuntime::new(config).unwrap(),
            dir,
        }
    }

    pub fn unit_count(&self) -> usize {
        std::fs::read_dir(self.dir.path()).unwrap().count()
    }
}
