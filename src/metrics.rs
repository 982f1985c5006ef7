use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::time::{Duration, Instant};

use crate::cpu::{
    Cpu, ExecutionReport, CARRY_FLAG, DECIMAL_MODE, INTERRUPT_DISABLE, NEGATIVE_FLAG,
    OVERFLOW_FLAG, ZERO_FLAG,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Counter for instructions retired, by opcode and mnemonic
    pub static ref INSTRUCTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("machine_instructions_total", "Instructions retired by opcode"),
        &["opcode", "mnemonic"]
    ).expect("Failed to create instruction counter");

    /// Counter for clock cycles spent, page-crossing penalties included
    pub static ref CYCLES_TOTAL: Counter = Counter::new(
        "machine_cycles_total", "Clock cycles spent across all runs"
    ).expect("Failed to create cycle counter");

    /// Counter for unknown-opcode faults
    pub static ref UNKNOWN_OPCODES_TOTAL: Counter = Counter::new(
        "machine_unknown_opcodes_total", "Runs aborted on an unmapped opcode byte"
    ).expect("Failed to create unknown opcode counter");

    /// Histogram for wall-clock duration of execute calls
    pub static ref RUN_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("machine_run_duration_seconds", "Wall-clock time of execute calls")
            .buckets(vec![0.000001, 0.000005, 0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.01])
    ).expect("Failed to create run duration histogram");

    /// Counter for API requests by endpoint and method
    pub static ref API_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("api_requests_total", "Total number of API requests"),
        &["method", "endpoint", "status"]
    ).expect("Failed to create API requests counter");

    /// Histogram for API request duration
    pub static ref API_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("api_request_duration_seconds", "API request duration")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["method", "endpoint"]
    ).expect("Failed to create API request duration histogram");

    /// Gauge for active machine instances
    pub static ref ACTIVE_MACHINES: Gauge = Gauge::new(
        "active_machines_total", "Number of active machine instances"
    ).expect("Failed to create active machines gauge");

    /// Gauge for CPU register values by machine ID
    pub static ref CPU_REGISTER_VALUES: GaugeVec = GaugeVec::new(
        Opts::new("cpu_register_value", "Current CPU register values"),
        &["machine_id", "register"]
    ).expect("Failed to create CPU register values gauge");

    /// Gauge for CPU flags by machine ID
    pub static ref CPU_FLAGS: GaugeVec = GaugeVec::new(
        Opts::new("cpu_flags", "Current CPU flag states (0 or 1)"),
        &["machine_id", "flag"]
    ).expect("Failed to create CPU flags gauge");

    /// Counter for memory operations
    pub static ref MEMORY_OPERATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("memory_operations_total", "Total memory read/write operations"),
        &["operation", "machine_id"]
    ).expect("Failed to create memory operations counter");

    /// Counter for machine resets
    pub static ref MACHINE_RESETS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("machine_resets_total", "Total number of machine resets"),
        &["machine_id"]
    ).expect("Failed to create machine resets counter");

    /// Counter for program loads
    pub static ref PROGRAM_LOADS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("program_loads_total", "Total number of programs loaded"),
        &["machine_id"]
    ).expect("Failed to create program loads counter");
}

/// Initialize Prometheus metrics by registering them with the global registry
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(INSTRUCTIONS_TOTAL.clone()))
        .expect("Failed to register instruction counter");

    REGISTRY
        .register(Box::new(CYCLES_TOTAL.clone()))
        .expect("Failed to register cycle counter");

    REGISTRY
        .register(Box::new(UNKNOWN_OPCODES_TOTAL.clone()))
        .expect("Failed to register unknown opcode counter");

    REGISTRY
        .register(Box::new(RUN_DURATION.clone()))
        .expect("Failed to register run duration histogram");

    REGISTRY
        .register(Box::new(API_REQUESTS_TOTAL.clone()))
        .expect("Failed to register API requests counter");

    REGISTRY
        .register(Box::new(API_REQUEST_DURATION.clone()))
        .expect("Failed to register API request duration histogram");

    REGISTRY
        .register(Box::new(ACTIVE_MACHINES.clone()))
        .expect("Failed to register active machines gauge");

    REGISTRY
        .register(Box::new(CPU_REGISTER_VALUES.clone()))
        .expect("Failed to register CPU register values gauge");

    REGISTRY
        .register(Box::new(CPU_FLAGS.clone()))
        .expect("Failed to register CPU flags gauge");

    REGISTRY
        .register(Box::new(MEMORY_OPERATIONS_TOTAL.clone()))
        .expect("Failed to register memory operations counter");

    REGISTRY
        .register(Box::new(MACHINE_RESETS_TOTAL.clone()))
        .expect("Failed to register machine resets counter");

    REGISTRY
        .register(Box::new(PROGRAM_LOADS_TOTAL.clone()))
        .expect("Failed to register program loads counter");
}

/// Record one retired instruction
pub fn record_instruction(opcode: u8, mnemonic: &str) {
    INSTRUCTIONS_TOTAL
        .with_label_values(&[&format!("0x{:02X}", opcode), mnemonic])
        .inc();
}

/// Record a completed execute call
pub fn record_run(report: &ExecutionReport, duration: Duration) {
    CYCLES_TOTAL.inc_by(report.cycles_spent as f64);
    RUN_DURATION.observe(duration.as_secs_f64());
}

/// Record a run aborted on an unmapped opcode
pub fn record_unknown_opcode() {
    UNKNOWN_OPCODES_TOTAL.inc();
}

/// Record an API request
pub fn record_api_request(method: &str, endpoint: &str, status: u16, duration: Duration) {
    API_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    API_REQUEST_DURATION
        .with_label_values(&[method, endpoint])
        .observe(duration.as_secs_f64());
}

/// Update machine count
pub fn set_active_machines(count: usize) {
    ACTIVE_MACHINES.set(count as f64);
}

/// Update CPU register metrics for a machine
pub fn update_cpu_registers(machine_id: &str, cpu: &Cpu) {
    CPU_REGISTER_VALUES
        .with_label_values(&[machine_id, "A"])
        .set(cpu.a as f64);

    CPU_REGISTER_VALUES
        .with_label_values(&[machine_id, "X"])
        .set(cpu.x as f64);

    CPU_REGISTER_VALUES
        .with_label_values(&[machine_id, "Y"])
        .set(cpu.y as f64);

    CPU_REGISTER_VALUES
        .with_label_values(&[machine_id, "PC"])
        .set(cpu.pc as f64);

    CPU_REGISTER_VALUES
        .with_label_values(&[machine_id, "SP"])
        .set(cpu.sp as f64);

    CPU_REGISTER_VALUES
        .with_label_values(&[machine_id, "STATUS"])
        .set(cpu.status as f64);

    update_cpu_flags(machine_id, cpu.status);
}

/// Update CPU flag metrics for a machine
pub fn update_cpu_flags(machine_id: &str, status: u8) {
    let flags = [
        ("carry", CARRY_FLAG),
        ("zero", ZERO_FLAG),
        ("interrupt_disable", INTERRUPT_DISABLE),
        ("decimal_mode", DECIMAL_MODE),
        ("overflow", OVERFLOW_FLAG),
        ("negative", NEGATIVE_FLAG),
    ];

    for (name, mask) in flags {
        CPU_FLAGS
            .with_label_values(&[machine_id, name])
            .set(if status & mask != 0 { 1.0 } else { 0.0 });
    }
}

/// Record a memory operation
pub fn record_memory_operation(operation: &str, machine_id: &str) {
    MEMORY_OPERATIONS_TOTAL
        .with_label_values(&[operation, machine_id])
        .inc();
}

/// Record a machine reset
pub fn record_machine_reset(machine_id: &str) {
    MACHINE_RESETS_TOTAL
        .with_label_values(&[machine_id])
        .inc();
}

/// Record a program load
pub fn record_program_load(machine_id: &str) {
    PROGRAM_LOADS_TOTAL
        .with_label_values(&[machine_id])
        .inc();
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
