use cycle65::cpu::Cpu;
use cycle65::memory::Memory;
use cycle65::opcodes::decode;
use cycle65::server::run_server;

#[tokio::main]
async fn main() {
    if std::env::args().nth(1).as_deref() == Some("serve") {
        run_server().await;
        return;
    }

    let mut memory = Memory::new();
    let mut cpu = Cpu::new();
    cpu.reset(&mut memory);

    // Demo program at the reset entry point: LDA $AABB,X with X=1
    let opcode = 0xBD;
    memory.write(0xFFFC, opcode);
    memory.write(0xFFFD, 0xBB);
    memory.write(0xFFFE, 0xAA);
    memory.write(0xAABC, 0xFE);
    cpu.x = 0x01;

    let budget = decode(opcode)
        .map(|entry| entry.base_cycles as u32)
        .unwrap_or(0);

    match cpu.execute(budget, &mut memory) {
        Ok(report) => {
            println!(
                "Retired {} instruction(s) in {} cycle(s)",
                report.instructions_retired, report.cycles_spent
            );
            println!("CPU State:");
            println!("A: ${:02X}", cpu.a);
            println!("X: ${:02X}", cpu.x);
            println!("Y: ${:02X}", cpu.y);
            println!("PC: ${:04X}", cpu.pc);
            println!("SP: ${:02X}", cpu.sp);
            println!("Status: ${:02X}", cpu.status);
        }
        Err(fault) => {
            eprintln!("Execution fault: {}", fault);
            std::process::exit(1);
        }
    }
}
