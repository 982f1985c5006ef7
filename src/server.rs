use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use serde::{Deserialize, Serialize};
use warp::Filter;
use prometheus::Encoder;

use crate::cpu::Cpu;
use crate::memory::Memory;
use crate::metrics::{
    init_metrics, record_api_request, record_machine_reset, record_memory_operation,
    record_program_load, record_run, set_active_machines, update_cpu_registers, Timer, REGISTRY,
};
use crate::auth::{
    create_jwt_token, init_default_users, with_auth, with_permission, AuthResponse, LoginRequest,
    Permission, User, UserInfo, UserStore,
};
use crate::instance_types::{
    CreateMachineRequest, InstanceState, MachineInstance, MachineTemplate, UsageStats,
};
use crate::snapshots::{
    CheckpointReason, CreateSnapshotRequest, MachineSnapshot, RestoreSnapshotRequest,
    SnapshotListResponse, SnapshotStore,
};

#[derive(Debug, Clone, Serialize)]
pub struct CpuState {
    pub pc: u16,
    pub sp: u8,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub status: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct MachineState {
    pub id: String,
    pub name: String,
    pub state: InstanceState,
    pub cpu: CpuState,
    pub usage: UsageStats,
}

#[derive(Debug, Deserialize)]
pub struct MemoryWrite {
    pub address: u16,
    pub value: u8,
}

#[derive(Debug, Deserialize)]
pub struct MemoryRead {
    pub address: u16,
    pub length: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct MemoryData {
    pub address: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Deserialize)]
pub struct ProgramLoad {
    pub address: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub cycles: u32,
}

#[derive(Debug, Serialize)]
pub struct RunResult {
    pub cycles_requested: u32,
    pub cycles_granted: u32,
    pub cycles_spent: u64,
    pub instructions_retired: u64,
    pub cpu: CpuState,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// One hosted machine: engine state plus the billing/lifecycle record.
pub struct Machine {
    pub cpu: Cpu,
    pub memory: Memory,
    pub template: Option<MachineTemplate>,
    pub instance: MachineInstance,
}

impl Machine {
    pub fn provision(
        owner_id: String,
        request: &CreateMachineRequest,
        template: Option<MachineTemplate>,
    ) -> Self {
        let instance = MachineInstance::new(
            owner_id,
            request.class.clone(),
            request.name.clone(),
            template.as_ref().map(|t| t.id.clone()),
            request.tags.clone(),
        );

        let mut machine = Self {
            cpu: Cpu::new(),
            memory: Memory::new(),
            template,
            instance,
        };
        machine.reset();
        machine.instance.start();
        machine
    }

    pub fn cpu_state(&self) -> CpuState {
        CpuState {
            pc: self.cpu.pc,
            sp: self.cpu.sp,
            a: self.cpu.a,
            x: self.cpu.x,
            y: self.cpu.y,
            status: self.cpu.status,
        }
    }

    pub fn machine_state(&self) -> MachineState {
        MachineState {
            id: self.instance.id.clone(),
            name: self.instance.name.clone(),
            state: self.instance.state.clone(),
            cpu: self.cpu_state(),
            usage: self.instance.usage_stats.clone(),
        }
    }

    /// Power-on reset, then re-seed the template image if one was applied.
    pub fn reset(&mut self) {
        self.cpu.reset(&mut self.memory);
        if let Some(template) = self.template.clone() {
            // Seed byte-by-byte with wrapping: a program longer than four
            // bytes continues at $0000, exactly where the program counter
            // lands after $FFFF.
            for (offset, &byte) in template.program.iter().enumerate() {
                self.memory
                    .write(template.load_address.wrapping_add(offset as u16), byte);
            }
            for (&address, &value) in &template.initial_memory {
                self.memory.write(address, value);
            }
        }
    }

    pub fn load_program(&mut self, address: u16, data: &[u8]) {
        self.memory.load_rom(data, address);
    }

    pub fn read_memory(&self, address: u16, length: u16) -> Vec<u8> {
        (0..length)
            .map(|i| self.memory.read(address.wrapping_add(i)))
            .collect()
    }

    pub fn write_memory(&mut self, address: u16, value: u8) {
        self.memory.write(address, value);
    }
}

type MachineMap = Arc<Mutex<HashMap<String, Machine>>>;
type TemplateMap = Arc<Mutex<HashMap<String, MachineTemplate>>>;

pub async fn run_server() {
    // Initialize Prometheus metrics
    init_metrics();

    // Initialize stores
    let machines: MachineMap = Arc::new(Mutex::new(HashMap::new()));
    let users: UserStore = Arc::new(Mutex::new(HashMap::new()));
    let snapshots: SnapshotStore = Arc::new(Mutex::new(HashMap::new()));
    let templates: TemplateMap = Arc::new(Mutex::new(HashMap::new()));

    init_default_users(users.clone());
    init_default_templates(templates.clone());

    println!("=== cycle65 machine service ===");
    println!("Hosted cycle-accurate 6502 machines starting...");

    // CORS
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization"])
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE"]);

    // Login, exchanges credentials for a JWT
    let login = warp::path("login")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_users(users.clone()))
        .and_then(login_handler);

    // Create new machine
    let create_machine = warp::path("machine")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_permission(users.clone(), Permission::CreateMachine))
        .and(warp::body::json())
        .and(with_machines(machines.clone()))
        .and(with_templates(templates.clone()))
        .and_then(create_machine_handler);

    // Get machine state
    let get_machine = warp::path!("machine" / String)
        .and(warp::get())
        .and(with_permission(users.clone(), Permission::ReadMachine))
        .and(with_machines(machines.clone()))
        .and_then(get_machine_handler);

    // Reset machine
    let reset_machine = warp::path!("machine" / String / "reset")
        .and(warp::post())
        .and(with_permission(users.clone(), Permission::WriteMachine))
        .and(with_machines(machines.clone()))
        .and_then(reset_handler);

    // Run with a cycle budget
    let run_machine = warp::path!("machine" / String / "run")
        .and(warp::post())
        .and(with_permission(users.clone(), Permission::RunMachine))
        .and(warp::body::json())
        .and(with_machines(machines.clone()))
        .and_then(run_handler);

    // Load program
    let load_program = warp::path!("machine" / String / "program")
        .and(warp::post())
        .and(with_permission(users.clone(), Permission::WriteMachine))
        .and(warp::body::json())
        .and(with_machines(machines.clone()))
        .and_then(load_program_handler);

    // Read memory
    let read_memory = warp::path!("machine" / String / "memory")
        .and(warp::get())
        .and(with_permission(users.clone(), Permission::ReadMachine))
        .and(warp::query::<MemoryRead>())
        .and(with_machines(machines.clone()))
        .and_then(read_memory_handler);

    // Write memory
    let write_memory = warp::path!("machine" / String / "memory")
        .and(warp::post())
        .and(with_permission(users.clone(), Permission::WriteMachine))
        .and(warp::body::json())
        .and(with_machines(machines.clone()))
        .and_then(write_memory_handler);

    // List machines visible to the caller
    let list_machines = warp::path("machines")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_auth(users.clone()))
        .and(with_machines(machines.clone()))
        .and_then(list_machines_handler);

    // Delete machine
    let delete_machine = warp::path!("machine" / String)
        .and(warp::delete())
        .and(with_permission(users.clone(), Permission::DeleteMachine))
        .and(with_machines(machines.clone()))
        .and_then(delete_machine_handler);

    // Snapshot a machine
    let create_snapshot = warp::path!("machine" / String / "snapshot")
        .and(warp::post())
        .and(with_permission(users.clone(), Permission::ManageSnapshots))
        .and(warp::body::json())
        .and(with_machines(machines.clone()))
        .and(with_snapshots(snapshots.clone()))
        .and_then(create_snapshot_handler);

    // List a machine's snapshots
    let list_snapshots = warp::path!("machine" / String / "snapshots")
        .and(warp::get())
        .and(with_permission(users.clone(), Permission::ReadMachine))
        .and(with_snapshots(snapshots.clone()))
        .and_then(list_snapshots_handler);

    // Restore a snapshot into a machine
    let restore_snapshot = warp::path!("machine" / String / "restore")
        .and(warp::post())
        .and(with_permission(users.clone(), Permission::ManageSnapshots))
        .and(warp::body::json())
        .and(with_machines(machines.clone()))
        .and(with_snapshots(snapshots.clone()))
        .and_then(restore_snapshot_handler);

    // Metrics endpoint
    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(metrics_handler);

    let routes = login
        .or(create_machine)
        .or(get_machine)
        .or(reset_machine)
        .or(run_machine)
        .or(load_program)
        .or(read_memory)
        .or(write_memory)
        .or(list_machines)
        .or(delete_machine)
        .or(create_snapshot)
        .or(list_snapshots)
        .or(restore_snapshot)
        .or(metrics)
        .with(cors);

    println!("cycle65 service starting on http://localhost:3030");
    println!("API Documentation:");
    println!("  POST   /login                    - Exchange credentials for a JWT");
    println!("  POST   /machine                  - Create new machine");
    println!("  GET    /machine/:id              - Get machine state");
    println!("  POST   /machine/:id/reset        - Reset machine (re-seeds template)");
    println!("  POST   /machine/:id/run          - Execute with a cycle budget");
    println!("  POST   /machine/:id/program      - Load program bytes");
    println!("  GET    /machine/:id/memory       - Read memory");
    println!("  POST   /machine/:id/memory       - Write memory");
    println!("  GET    /machines                 - List machines visible to the caller");
    println!("  DELETE /machine/:id              - Delete machine");
    println!("  POST   /machine/:id/snapshot     - Create snapshot");
    println!("  GET    /machine/:id/snapshots    - List snapshots");
    println!("  POST   /machine/:id/restore      - Restore snapshot");
    println!("  GET    /metrics                  - Prometheus metrics endpoint");

    warp::serve(routes)
        .run(([127, 0, 0, 1], 3030))
        .await;
}

fn with_machines(machines: MachineMap) -> impl Filter<Extract = (MachineMap,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || machines.clone())
}

fn with_users(users: UserStore) -> impl Filter<Extract = (UserStore,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || users.clone())
}

fn with_templates(templates: TemplateMap) -> impl Filter<Extract = (TemplateMap,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || templates.clone())
}

fn with_snapshots(snapshots: SnapshotStore) -> impl Filter<Extract = (SnapshotStore,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || snapshots.clone())
}

fn is_admin(user: &User) -> bool {
    user.has_permission(&Permission::Admin)
}

async fn login_handler(request: LoginRequest, users: UserStore) -> Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let users_lock = users.lock().unwrap();

    let found = users_lock
        .values()
        .find(|user| user.username == request.username && user.is_active);

    let response = match found {
        Some(user) if user.verify_password(&request.password) => {
            match create_jwt_token(user) {
                Ok(token) => ApiResponse::success(AuthResponse {
                    token,
                    user: UserInfo {
                        id: user.id.clone(),
                        username: user.username.clone(),
                        email: user.email.clone(),
                        quota: user.quota.clone(),
                        created_at: user.created_at,
                    },
                }),
                Err(_) => ApiResponse::error("Failed to issue token".to_string()),
            }
        }
        _ => ApiResponse::error("Invalid credentials".to_string()),
    };

    record_api_request("POST", "/login", 200, timer.elapsed());
    Ok(warp::reply::json(&response))
}

async fn create_machine_handler(
    user: User,
    request: CreateMachineRequest,
    machines: MachineMap,
    templates: TemplateMap,
) -> Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();

    let template = match &request.template_id {
        Some(template_id) => {
            let templates_lock = templates.lock().unwrap();
            match templates_lock.get(template_id) {
                Some(template) => Some(template.clone()),
                None => {
                    let response: ApiResponse<MachineState> =
                        ApiResponse::error(format!("Template '{}' not found", template_id));
                    return Ok(warp::reply::json(&response));
                }
            }
        }
        None => None,
    };

    let mut machines_lock = machines.lock().unwrap();

    let owned = machines_lock
        .values()
        .filter(|machine| machine.instance.owner_id == user.id)
        .count();
    if owned as u32 >= user.quota.max_machines {
        let response: ApiResponse<MachineState> =
            ApiResponse::error("Machine quota exceeded".to_string());
        return Ok(warp::reply::json(&response));
    }

    let machine = Machine::provision(user.id.clone(), &request, template);
    let id = machine.instance.id.clone();
    let state = machine.machine_state();

    update_cpu_registers(&id, &machine.cpu);
    machines_lock.insert(id, machine);
    set_active_machines(machines_lock.len());

    let response = ApiResponse::success(state);
    record_api_request("POST", "/machine", 200, timer.elapsed());
    Ok(warp::reply::json(&response))
}

async fn get_machine_handler(
    id: String,
    user: User,
    machines: MachineMap,
) -> Result<impl warp::Reply, warp::Rejection> {
    let machines_lock = machines.lock().unwrap();

    let response = match machines_lock.get(&id) {
        Some(machine) if machine.instance.can_user_access(&user.id, is_admin(&user)) => {
            ApiResponse::success(machine.machine_state())
        }
        _ => ApiResponse::error("Machine not found".to_string()),
    };

    Ok(warp::reply::json(&response))
}

async fn reset_handler(
    id: String,
    user: User,
    machines: MachineMap,
) -> Result<impl warp::Reply, warp::Rejection> {
    let mut machines_lock = machines.lock().unwrap();

    let response = match machines_lock.get_mut(&id) {
        Some(machine) if machine.instance.can_user_access(&user.id, is_admin(&user)) => {
            machine.reset();
            machine.instance.state = InstanceState::Running;
            machine.instance.record_activity();

            record_machine_reset(&id);
            update_cpu_registers(&id, &machine.cpu);

            ApiResponse::success(machine.machine_state())
        }
        _ => ApiResponse::error("Machine not found".to_string()),
    };

    Ok(warp::reply::json(&response))
}

async fn run_handler(
    id: String,
    user: User,
    request: RunRequest,
    machines: MachineMap,
) -> Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let mut machines_lock = machines.lock().unwrap();

    let result = match machines_lock.get_mut(&id) {
        Some(machine) if machine.instance.can_user_access(&user.id, is_admin(&user)) => {
            if let InstanceState::Error(message) = &machine.instance.state {
                let response: ApiResponse<RunResult> =
                    ApiResponse::error(format!("Machine is faulted ({}); reset it first", message));
                Ok(warp::reply::json(&response))
            } else {
                machine.instance.record_api_call();

                let granted = request
                    .cycles
                    .min(machine.instance.specs.max_cycles_per_run)
                    .min(user.quota.max_cycles_per_run);

                let run_timer = Timer::new();
                match machine.cpu.execute(granted, &mut machine.memory) {
                    Ok(report) => {
                        record_run(&report, run_timer.elapsed());
                        machine.instance.record_run(&report);
                        update_cpu_registers(&id, &machine.cpu);

                        let response = ApiResponse::success(RunResult {
                            cycles_requested: request.cycles,
                            cycles_granted: granted,
                            cycles_spent: report.cycles_spent,
                            instructions_retired: report.instructions_retired,
                            cpu: machine.cpu_state(),
                        });
                        Ok(warp::reply::json(&response))
                    }
                    Err(fault) => {
                        machine.instance.fault(fault.to_string());
                        update_cpu_registers(&id, &machine.cpu);

                        let response: ApiResponse<RunResult> =
                            ApiResponse::error(fault.to_string());
                        Ok(warp::reply::json(&response))
                    }
                }
            }
        }
        _ => {
            let response: ApiResponse<RunResult> =
                ApiResponse::error("Machine not found".to_string());
            Ok(warp::reply::json(&response))
        }
    };

    record_api_request("POST", "/machine/:id/run", 200, timer.elapsed());
    result
}

async fn load_program_handler(
    id: String,
    user: User,
    request: ProgramLoad,
    machines: MachineMap,
) -> Result<impl warp::Reply, warp::Rejection> {
    let mut machines_lock = machines.lock().unwrap();

    let response = match machines_lock.get_mut(&id) {
        Some(machine) if machine.instance.can_user_access(&user.id, is_admin(&user)) => {
            machine.load_program(request.address, &request.data);
            machine.instance.record_activity();
            machine.instance.record_api_call();
            record_program_load(&id);
            ApiResponse::success(format!(
                "Loaded {} bytes at address ${:04X}",
                request.data.len(),
                request.address
            ))
        }
        _ => ApiResponse::error("Machine not found".to_string()),
    };

    Ok(warp::reply::json(&response))
}

async fn read_memory_handler(
    id: String,
    user: User,
    query: MemoryRead,
    machines: MachineMap,
) -> Result<impl warp::Reply, warp::Rejection> {
    let machines_lock = machines.lock().unwrap();

    let response = match machines_lock.get(&id) {
        Some(machine) if machine.instance.can_user_access(&user.id, is_admin(&user)) => {
            let length = query.length.unwrap_or(1);
            let data = machine.read_memory(query.address, length);
            record_memory_operation("read", &id);
            ApiResponse::success(MemoryData {
                address: query.address,
                data,
            })
        }
        _ => ApiResponse::error("Machine not found".to_string()),
    };

    Ok(warp::reply::json(&response))
}

async fn write_memory_handler(
    id: String,
    user: User,
    request: MemoryWrite,
    machines: MachineMap,
) -> Result<impl warp::Reply, warp::Rejection> {
    let mut machines_lock = machines.lock().unwrap();

    let response = match machines_lock.get_mut(&id) {
        Some(machine) if machine.instance.can_user_access(&user.id, is_admin(&user)) => {
            machine.write_memory(request.address, request.value);
            machine.instance.record_activity();
            record_memory_operation("write", &id);
            ApiResponse::success(format!(
                "Wrote ${:02X} to address ${:04X}",
                request.value, request.address
            ))
        }
        _ => ApiResponse::error("Machine not found".to_string()),
    };

    Ok(warp::reply::json(&response))
}

async fn list_machines_handler(
    user: User,
    machines: MachineMap,
) -> Result<impl warp::Reply, warp::Rejection> {
    let machines_lock = machines.lock().unwrap();
    let admin = is_admin(&user);

    let machine_list: Vec<MachineState> = machines_lock
        .values()
        .filter(|machine| machine.instance.can_user_access(&user.id, admin))
        .map(|machine| machine.machine_state())
        .collect();

    let response = ApiResponse::success(machine_list);
    Ok(warp::reply::json(&response))
}

async fn delete_machine_handler(
    id: String,
    user: User,
    machines: MachineMap,
) -> Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let mut machines_lock = machines.lock().unwrap();

    let allowed = machines_lock
        .get(&id)
        .map(|machine| machine.instance.can_user_access(&user.id, is_admin(&user)))
        .unwrap_or(false);

    let result = if allowed {
        machines_lock.remove(&id);
        set_active_machines(machines_lock.len());
        let response = ApiResponse::success(format!("Machine {} deleted", id));
        Ok(warp::reply::json(&response))
    } else {
        let response: ApiResponse<String> = ApiResponse::error("Machine not found".to_string());
        Ok(warp::reply::json(&response))
    };

    record_api_request("DELETE", "/machine/:id", 200, timer.elapsed());
    result
}

async fn create_snapshot_handler(
    id: String,
    user: User,
    request: CreateSnapshotRequest,
    machines: MachineMap,
    snapshots: SnapshotStore,
) -> Result<impl warp::Reply, warp::Rejection> {
    let machines_lock = machines.lock().unwrap();

    let response = match machines_lock.get(&id) {
        Some(machine) if machine.instance.can_user_access(&user.id, is_admin(&user)) => {
            let mut snapshots_lock = snapshots.lock().unwrap();

            let owned = snapshots_lock
                .values()
                .filter(|snapshot| snapshot.owner_id == user.id)
                .count();
            if owned as u32 >= user.quota.max_snapshots {
                let response: ApiResponse<MachineSnapshot> =
                    ApiResponse::error("Snapshot quota exceeded".to_string());
                return Ok(warp::reply::json(&response));
            }

            let snapshot = MachineSnapshot::create_from_machine(
                request.name.clone(),
                request.description.clone().unwrap_or_default(),
                id.clone(),
                user.id.clone(),
                &machine.cpu,
                &machine.memory,
                machine.instance.class.as_str().to_string(),
                machine.instance.template_id.clone(),
                CheckpointReason::Manual,
                machine.instance.usage_stats.cycles_spent,
                machine.instance.usage_stats.instructions_retired,
                request.tags.clone().unwrap_or_default(),
            );

            let summary = snapshot.get_summary();
            snapshots_lock.insert(snapshot.id.clone(), snapshot);
            ApiResponse::success(summary)
        }
        _ => ApiResponse::error("Machine not found".to_string()),
    };

    Ok(warp::reply::json(&response))
}

async fn list_snapshots_handler(
    id: String,
    user: User,
    snapshots: SnapshotStore,
) -> Result<impl warp::Reply, warp::Rejection> {
    let snapshots_lock = snapshots.lock().unwrap();
    let admin = is_admin(&user);

    let visible: Vec<_> = snapshots_lock
        .values()
        .filter(|snapshot| snapshot.machine_id == id && snapshot.can_user_access(&user.id, admin))
        .collect();

    let total_size_bytes = visible.iter().map(|snapshot| snapshot.size_bytes).sum();
    let summaries: Vec<_> = visible.iter().map(|snapshot| snapshot.get_summary()).collect();

    let response = ApiResponse::success(SnapshotListResponse {
        total_count: summaries.len(),
        total_size_bytes,
        snapshots: summaries,
    });

    Ok(warp::reply::json(&response))
}

async fn restore_snapshot_handler(
    id: String,
    user: User,
    request: RestoreSnapshotRequest,
    machines: MachineMap,
    snapshots: SnapshotStore,
) -> Result<impl warp::Reply, warp::Rejection> {
    let snapshots_lock = snapshots.lock().unwrap();
    let admin = is_admin(&user);

    let snapshot = match snapshots_lock.get(&request.snapshot_id) {
        Some(snapshot) if snapshot.can_user_access(&user.id, admin) => snapshot.clone(),
        _ => {
            let response: ApiResponse<MachineState> =
                ApiResponse::error("Snapshot not found".to_string());
            return Ok(warp::reply::json(&response));
        }
    };
    drop(snapshots_lock);

    let mut machines_lock = machines.lock().unwrap();

    let response = match machines_lock.get_mut(&id) {
        Some(machine) if machine.instance.can_user_access(&user.id, admin) => {
            match snapshot.restore_to_machine(&mut machine.cpu, &mut machine.memory) {
                Ok(()) => {
                    // A restore clears any fault
                    machine.instance.state = InstanceState::Running;
                    machine.instance.record_activity();
                    update_cpu_registers(&id, &machine.cpu);
                    ApiResponse::success(machine.machine_state())
                }
                Err(message) => ApiResponse::error(message),
            }
        }
        _ => ApiResponse::error("Machine not found".to_string()),
    };

    Ok(warp::reply::json(&response))
}

async fn metrics_handler() -> Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics_text) => {
            record_api_request("GET", "/metrics", 200, timer.elapsed());
            Ok(warp::reply::with_header(
                metrics_text,
                "content-type",
                "text/plain; version=0.0.4",
            ))
        }
        Err(_) => {
            record_api_request("GET", "/metrics", 500, timer.elapsed());
            Ok(warp::reply::with_header(
                "Error encoding metrics".to_string(),
                "content-type",
                "text/plain",
            ))
        }
    }
}

fn init_default_templates(templates: TemplateMap) {
    let mut templates_lock = templates.lock().unwrap();
    let default_templates = MachineTemplate::create_basic_templates();

    for template in default_templates {
        templates_lock.insert(template.id.clone(), template);
    }

    println!("Initialized {} default machine templates", templates_lock.len());
}
