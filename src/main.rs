//! Sysdash Agent - 主机指标采集与维护任务代理
//!
//! Usage:
//! - Normal mode: `sysdash-agent`
//! - With custom port: `sysdash-agent --port 19999`

use sysdash_agent::RuntimeConfig;

/// 解析命令行参数
fn parse_args() -> RuntimeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                if config.port_override.is_none() {
                    eprintln!("Ignoring invalid port: {}", args[i + 1]);
                }
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    config
}

fn print_help() {
    println!("Sysdash Agent - 主机指标采集与维护任务代理");
    println!();
    println!("USAGE:");
    println!("    sysdash-agent [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>    Override the listening port");
    println!("    -h, --help       Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    PORT                   Listening port (default 8080)");
    println!("    DAEMON_API_KEY         Required x-api-key value; unset disables auth");
    println!("    COLLECT_INTERVAL_SECS  Sampling period (default 30)");
    println!("    RETENTION_DAYS         Sample retention (default 30)");
    println!("    RUST_LOG               Log filter (default sysdash_agent=info)");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = parse_args();
    sysdash_agent::init_and_run_agent_with_config(config).await
}
