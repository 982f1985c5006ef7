use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use chrono::{DateTime, Utc};

use crate::cpu::ExecutionReport;

/// Service tier of a hosted machine. Memory is always the full 64KB address
/// space; tiers bound how many clock cycles one run may be granted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MachineClass {
    Micro,      // 10K cycles/run
    Small,      // 100K cycles/run
    Standard,   // 1M cycles/run
    Performance,// 10M cycles/run
    Turbo,      // 100M cycles/run
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSpecs {
    pub max_cycles_per_run: u32,
    pub run_timeout_ms: u64,
    pub pricing_tier: PricingTier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PricingTier {
    Free,
    Basic,
    Standard,
    Premium,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMachineRequest {
    pub template_id: Option<String>,
    pub class: MachineClass,
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// A prebuilt memory image. Programs are seeded at 0xFFFC because reset
/// parks the program counter there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub program: Vec<u8>,
    pub load_address: u16,
    pub initial_memory: HashMap<u16, u8>,
    pub class: MachineClass,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub is_public: bool,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineInstance {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub class: MachineClass,
    pub template_id: Option<String>,
    pub state: InstanceState,
    pub specs: ClassSpecs,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub tags: Vec<String>,
    pub usage_stats: UsageStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InstanceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Paused,
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub cycles_spent: u64,
    pub instructions_retired: u64,
    pub runs: u64,
    pub api_calls: u64,
    pub last_reset: DateTime<Utc>,
}

impl MachineClass {
    pub fn specs(&self) -> ClassSpecs {
        match self {
            MachineClass::Micro => ClassSpecs {
                max_cycles_per_run: 10_000,
                run_timeout_ms: 1000,
                pricing_tier: PricingTier::Free,
            },
            MachineClass::Small => ClassSpecs {
                max_cycles_per_run: 100_000,
                run_timeout_ms: 5000,
                pricing_tier: PricingTier::Basic,
            },
            MachineClass::Standard => ClassSpecs {
                max_cycles_per_run: 1_000_000,
                run_timeout_ms: 10000,
                pricing_tier: PricingTier::Standard,
            },
            MachineClass::Performance => ClassSpecs {
                max_cycles_per_run: 10_000_000,
                run_timeout_ms: 30000,
                pricing_tier: PricingTier::Standard,
            },
            MachineClass::Turbo => ClassSpecs {
                max_cycles_per_run: 100_000_000,
                run_timeout_ms: 60000,
                pricing_tier: PricingTier::Premium,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineClass::Micro => "micro",
            MachineClass::Small => "small",
            MachineClass::Standard => "standard",
            MachineClass::Performance => "performance",
            MachineClass::Turbo => "turbo",
        }
    }
}

impl Default for MachineClass {
    fn default() -> Self {
        MachineClass::Standard
    }
}

impl Default for UsageStats {
    fn default() -> Self {
        Self {
            cycles_spent: 0,
            instructions_retired: 0,
            runs: 0,
            api_calls: 0,
            last_reset: Utc::now(),
        }
    }
}

impl MachineTemplate {
    pub fn create_basic_templates() -> Vec<MachineTemplate> {
        vec![
            MachineTemplate {
                id: "clean".to_string(),
                name: "Clean Machine".to_string(),
                description: "Zero-filled memory, nothing preloaded".to_string(),
                program: vec![],
                load_address: 0xFFFC,
                initial_memory: HashMap::new(),
                class: MachineClass::Standard,
                created_by: "system".to_string(),
                created_at: Utc::now(),
                is_public: true,
                tags: vec!["basic".to_string(), "clean".to_string()],
            },
            MachineTemplate {
                id: "register-demo".to_string(),
                name: "Register Transfer Demo".to_string(),
                description: "LDA #$42 / TAX / TAY; 6 cycles fills all three registers"
                    .to_string(),
                program: vec![0xA9, 0x42, 0xAA, 0xA8],
                load_address: 0xFFFC,
                initial_memory: HashMap::new(),
                class: MachineClass::Micro,
                created_by: "system".to_string(),
                created_at: Utc::now(),
                is_public: true,
                tags: vec!["demo".to_string(), "transfers".to_string()],
            },
            MachineTemplate {
                id: "stack-demo".to_string(),
                name: "Stack Round-Trip Demo".to_string(),
                description: "LDA #$42 / PHA / LDA #$00 / PLA; 11 cycles round-trips \
                              the accumulator through the stack page"
                    .to_string(),
                program: vec![0xA9, 0x42, 0x48, 0xA9, 0x00, 0x68],
                load_address: 0xFFFC,
                initial_memory: HashMap::new(),
                class: MachineClass::Micro,
                created_by: "system".to_string(),
                created_at: Utc::now(),
                is_public: true,
                tags: vec!["demo".to_string(), "stack".to_string()],
            },
            MachineTemplate {
                id: "page-cross-demo".to_string(),
                name: "Page Crossing Demo".to_string(),
                description: "LDX #$01 / LDA $00FF,X; the indexed read lands on page 1 \
                              and bills one extra cycle"
                    .to_string(),
                program: vec![0xA2, 0x01, 0xBD, 0xFF, 0x00],
                load_address: 0xFFFC,
                initial_memory: {
                    let mut mem = HashMap::new();
                    mem.insert(0x0100, 0xFE);
                    mem
                },
                class: MachineClass::Micro,
                created_by: "system".to_string(),
                created_at: Utc::now(),
                is_public: true,
                tags: vec!["demo".to_string(), "timing".to_string()],
            },
        ]
    }
}

impl MachineInstance {
    pub fn new(
        owner_id: String,
        class: MachineClass,
        name: Option<String>,
        template_id: Option<String>,
        tags: Option<Vec<String>>,
    ) -> Self {
        let specs = class.specs();
        let instance_name = name.unwrap_or_else(|| {
            format!("{}-{}", class.as_str(), &uuid::Uuid::new_v4().to_string()[..8])
        });

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: instance_name,
            owner_id,
            class,
            template_id,
            state: InstanceState::Stopped,
            specs,
            created_at: Utc::now(),
            started_at: None,
            stopped_at: None,
            last_activity: Utc::now(),
            tags: tags.unwrap_or_default(),
            usage_stats: UsageStats::default(),
        }
    }

    pub fn start(&mut self) {
        self.state = InstanceState::Running;
        self.started_at = Some(Utc::now());
        self.last_activity = Utc::now();
    }

    pub fn stop(&mut self) {
        self.state = InstanceState::Stopped;
        self.stopped_at = Some(Utc::now());
        self.last_activity = Utc::now();
    }

    pub fn pause(&mut self) {
        self.state = InstanceState::Paused;
        self.last_activity = Utc::now();
    }

    /// The engine surfaced a fatal fault; the instance stays inspectable but
    /// will not run again until reset.
    pub fn fault(&mut self, message: String) {
        self.state = InstanceState::Error(message);
        self.stopped_at = Some(Utc::now());
        self.last_activity = Utc::now();
    }

    pub fn record_activity(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn record_run(&mut self, report: &ExecutionReport) {
        self.usage_stats.runs += 1;
        self.usage_stats.cycles_spent += report.cycles_spent;
        self.usage_stats.instructions_retired += report.instructions_retired;
        self.last_activity = Utc::now();
    }

    pub fn record_api_call(&mut self) {
        self.usage_stats.api_calls += 1;
    }

    pub fn get_runtime_seconds(&self) -> u64 {
        if let Some(started) = self.started_at {
            let end_time = if matches!(self.state, InstanceState::Running) {
                Utc::now()
            } else {
                self.stopped_at.unwrap_or_else(Utc::now)
            };

            (end_time - started).num_seconds() as u64
        } else {
            0
        }
    }

    pub fn is_idle(&self, idle_threshold_minutes: i64) -> bool {
        let idle_duration = Utc::now() - self.last_activity;
        idle_duration.num_minutes() > idle_threshold_minutes
    }

    pub fn can_user_access(&self, user_id: &str, is_admin: bool) -> bool {
        is_admin || self.owner_id == user_id
    }
}
