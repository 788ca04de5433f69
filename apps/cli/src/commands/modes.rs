//! 列出控制模式

use anyhow::Result;
use armlink_protocol::ModeRegistry;

pub fn execute() -> Result<()> {
    let registry = ModeRegistry::standard();

    println!("{:<16} {:<8} {:<8} 准备动作", "模式", "长度", "可重发");
    for descriptor in registry.iter() {
        let arities = descriptor
            .allowed_arities
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join("|");
        let mut name = descriptor.name().to_string();
        if descriptor.mode.is_reserved() {
            name.push('*');
        }
        println!(
            "{:<16} {:<8} {:<8} {}",
            name,
            arities,
            if descriptor.resend_safe { "yes" } else { "no" },
            descriptor.setup_action
        );
    }
    println!("\n* 预留模式");
    Ok(())
}
