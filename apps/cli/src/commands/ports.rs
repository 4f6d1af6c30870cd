//! 串口列表命令

use anyhow::Result;

pub fn list_ports() -> Result<()> {
    let ports = ucp_sdk::serial::available_ports()?;
    if ports.is_empty() {
        println!("未发现串口");
        return Ok(());
    }
    println!("可用串口:");
    for port in ports {
        match port.description {
            Some(desc) => println!("  {:<20} [{}] {}", port.name, port.kind, desc),
            None => println!("  {:<20} [{}]", port.name, port.kind),
        }
    }
    Ok(())
}
