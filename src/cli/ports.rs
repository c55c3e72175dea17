use anyhow::Result;

use super::Engine;
use crate::output;
use crate::ports::{PortAllocator, PORT_MAX, PORT_MIN};

pub fn list(engine: &Engine) -> Result<()> {
    let mut projects = engine.store.projects();
    projects.sort_by_key(|p| p.port);
    output::header(&format!("Ports {}-{}", PORT_MIN, PORT_MAX));

    if projects.is_empty() {
        output::info("No ports reserved");
        return Ok(());
    }
    for p in projects {
        let state = if p.status.is_live() { "in use" } else { "reserved" };
        println!("  {:<6} {:<9} {}", p.port, state, p.name);
    }
    Ok(())
}

pub fn suggest(engine: &Engine, count: usize) -> Result<()> {
    let ports = PortAllocator::new(engine.store.clone()).suggest(count);
    if ports.is_empty() {
        output::error("No free ports left");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

pub fn check(engine: &Engine, port: u16) -> Result<()> {
    let ports = PortAllocator::new(engine.store.clone());
    if !ports.is_in_use(port)? {
        output::success(&format!("Port {} is free", port));
        return Ok(());
    }
    output::warning(&format!("Port {} is taken", port));
    match ports.allocate(Some(port)) {
        Ok(free) => output::info(&format!("Next free port: {}", free)),
        Err(e) => output::error(&e.to_string()),
    }
    Ok(())
}
