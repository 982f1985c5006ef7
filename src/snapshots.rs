use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::cpu::Cpu;
use crate::memory::Memory;

/// Point-in-time image of one machine: register file plus a run-length
/// encoded copy of the full 64KB address space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub id: String,
    pub name: String,
    pub description: String,
    pub machine_id: String,
    pub owner_id: String,
    pub cpu_state: CpuSnapshot,
    pub memory_image: Vec<u8>,
    pub metadata: SnapshotMetadata,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub pc: u16,
    pub sp: u8,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub status: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub machine_class: String,
    pub template_id: Option<String>,
    pub checkpoint_reason: CheckpointReason,
    pub cycles_spent: u64,
    pub instructions_retired: u64,
    pub compression_ratio: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CheckpointReason {
    Manual,
    Automatic,
    BeforeRun,
    Scheduled,
    BeforeShutdown,
    Fault,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSnapshotRequest {
    pub name: String,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreSnapshotRequest {
    pub snapshot_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotListResponse {
    pub snapshots: Vec<SnapshotSummary>,
    pub total_count: usize,
    pub total_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub checkpoint_reason: CheckpointReason,
    pub tags: Vec<String>,
}

pub type SnapshotStore = std::sync::Arc<std::sync::Mutex<HashMap<String, MachineSnapshot>>>;

impl MachineSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn create_from_machine(
        name: String,
        description: String,
        machine_id: String,
        owner_id: String,
        cpu: &Cpu,
        memory: &Memory,
        machine_class: String,
        template_id: Option<String>,
        reason: CheckpointReason,
        cycles_spent: u64,
        instructions_retired: u64,
        tags: Vec<String>,
    ) -> Self {
        let cpu_state = CpuSnapshot {
            pc: cpu.pc,
            sp: cpu.sp,
            a: cpu.a,
            x: cpu.x,
            y: cpu.y,
            status: cpu.status,
        };

        let mut memory_dump = Vec::with_capacity(65536);
        for address in 0..=0xFFFFu16 {
            memory_dump.push(memory.read(address));
        }

        let memory_image = compress_memory(&memory_dump);
        let compression_ratio = memory_image.len() as f32 / memory_dump.len() as f32;

        let metadata = SnapshotMetadata {
            machine_class,
            template_id,
            checkpoint_reason: reason,
            cycles_spent,
            instructions_retired,
            compression_ratio,
        };

        let mut snapshot = Self {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            machine_id,
            owner_id,
            cpu_state,
            memory_image,
            metadata,
            created_at: Utc::now(),
            size_bytes: 0,
            tags,
        };

        // Bill for the stored document, not just the raw image
        snapshot.size_bytes = serde_json::to_vec(&snapshot)
            .map(|doc| doc.len() as u64)
            .unwrap_or(0);

        snapshot
    }

    pub fn restore_to_machine(&self, cpu: &mut Cpu, memory: &mut Memory) -> Result<(), String> {
        let image = decompress_memory(&self.memory_image)?;

        cpu.pc = self.cpu_state.pc;
        cpu.sp = self.cpu_state.sp;
        cpu.a = self.cpu_state.a;
        cpu.x = self.cpu_state.x;
        cpu.y = self.cpu_state.y;
        cpu.status = self.cpu_state.status;

        for (address, &value) in image.iter().enumerate() {
            memory.write(address as u16, value);
        }

        Ok(())
    }

    pub fn can_user_access(&self, user_id: &str, is_admin: bool) -> bool {
        is_admin || self.owner_id == user_id
    }

    pub fn get_summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            size_bytes: self.size_bytes,
            checkpoint_reason: self.metadata.checkpoint_reason.clone(),
            tags: self.tags.clone(),
        }
    }
}

// Run-length encoding as (count, value) pairs. A mostly-zero 64KB image
// packs into a few hundred bytes, and every input decodes unambiguously.
fn compress_memory(memory: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    let mut i = 0;

    while i < memory.len() {
        let value = memory[i];
        let mut count = 1usize;

        while i + count < memory.len() && memory[i + count] == value && count < 255 {
            count += 1;
        }

        compressed.push(count as u8);
        compressed.push(value);
        i += count;
    }

    compressed
}

fn decompress_memory(compressed: &[u8]) -> Result<Vec<u8>, String> {
    if compressed.len() % 2 != 0 {
        return Err("truncated run-length pair".to_string());
    }

    let mut decompressed = Vec::with_capacity(65536);
    for pair in compressed.chunks(2) {
        let count = pair[0];
        let value = pair[1];

        if count == 0 {
            return Err("zero-length run".to_string());
        }

        decompressed.extend(std::iter::repeat(value).take(count as usize));
    }

    if decompressed.len() != 65536 {
        return Err(format!("decompressed size {} != 65536", decompressed.len()));
    }

    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_round_trips() {
        let mut memory = vec![0u8; 65536];
        memory[0x1000] = 0xFF;
        memory[0x1001] = 0xFF;
        memory[0x1002] = 0xFF;
        memory[0x2000] = 0xAA;
        memory[0x2001] = 0xBB;
        memory[0x2002] = 0xCC;

        let compressed = compress_memory(&memory);
        let decompressed = decompress_memory(&compressed).unwrap();

        assert_eq!(memory, decompressed);
        assert!(compressed.len() < memory.len());
    }

    #[test]
    fn long_runs_split_at_255() {
        let memory = vec![0x42u8; 65536];
        let compressed = compress_memory(&memory);
        let decompressed = decompress_memory(&compressed).unwrap();
        assert_eq!(memory, decompressed);
    }

    #[test]
    fn truncated_image_is_rejected() {
        assert!(decompress_memory(&[10]).is_err());
        assert!(decompress_memory(&[0, 0x42]).is_err());
        assert!(decompress_memory(&[1, 0x42]).is_err()); // only one byte of 65536
    }

    #[test]
    fn snapshot_restores_registers_and_memory() {
        let mut cpu = Cpu::new();
        let mut memory = Memory::new();
        cpu.reset(&mut memory);
        cpu.a = 0x42;
        cpu.pc = 0x1234;
        memory.write(0x2000, 0x99);

        let snapshot = MachineSnapshot::create_from_machine(
            "before-run".to_string(),
            String::new(),
            "machine-1".to_string(),
            "owner-1".to_string(),
            &cpu,
            &memory,
            "standard".to_string(),
            None,
            CheckpointReason::Manual,
            0,
            0,
            vec![],
        );

        let mut restored_cpu = Cpu::new();
        let mut restored_memory = Memory::new();
        snapshot
            .restore_to_machine(&mut restored_cpu, &mut restored_memory)
            .unwrap();

        assert_eq!(restored_cpu.a, 0x42);
        assert_eq!(restored_cpu.pc, 0x1234);
        assert_eq!(restored_memory.read(0x2000), 0x99);
        assert!(snapshot.size_bytes > 0);
    }

    #[test]
    fn access_control_honors_owner_and_admin() {
        let cpu = Cpu::new();
        let memory = Memory::new();
        let snapshot = MachineSnapshot::create_from_machine(
            "s".to_string(),
            String::new(),
            "m".to_string(),
            "owner-1".to_string(),
            &cpu,
            &memory,
            "micro".to_string(),
            None,
            CheckpointReason::Manual,
            0,
            0,
            vec![],
        );

        assert!(snapshot.can_user_access("owner-1", false));
        assert!(!snapshot.can_user_access("someone-else", false));
        assert!(snapshot.can_user_access("someone-else", true));
    }
}
